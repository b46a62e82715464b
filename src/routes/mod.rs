//! HTTP route handlers grouped by resource.
//!
//! Every handler is annotated with `#[openapi]` so `rocket_okapi` can derive
//! the OpenAPI document; [`api_routes`] collects them for mounting under
//! `/api/v1`.

use rocket::Route;
use rocket_okapi::openapi_get_routes;

use crate::auth;

pub mod bookings;
pub mod health;
pub mod reviews;
pub mod tours;
pub mod users;

/// Every API route plus the generated `openapi.json`.
pub fn api_routes() -> Vec<Route> {
    openapi_get_routes![
        // Health
        health::health_check,
        // Tours
        tours::list_tours,
        tours::top_cheap_tours,
        tours::tour_stats,
        tours::monthly_plan,
        tours::tours_within,
        tours::tour_distances,
        tours::get_tour,
        tours::create_tour,
        tours::update_tour,
        tours::delete_tour,
        // Reviews
        reviews::list_reviews,
        reviews::list_tour_reviews,
        reviews::create_review,
        reviews::create_tour_review,
        reviews::get_review,
        reviews::update_review,
        reviews::delete_review,
        // Accounts
        auth::routes::signup,
        auth::routes::login,
        auth::routes::logout,
        auth::routes::update_password,
        users::get_me,
        users::update_me,
        users::delete_me,
        users::list_users,
        users::get_user,
        users::update_user,
        users::delete_user,
        // Bookings
        bookings::checkout_session,
        bookings::checkout_success,
        bookings::list_bookings,
        bookings::create_booking,
        bookings::get_booking,
        bookings::update_booking,
        bookings::delete_booking,
    ]
}
