//! Bookings: hosted checkout, the post-payment confirmation and staff-managed
//! booking records.

use rocket::State;
use rocket::http::Status;
use rocket::response::{Redirect, status};
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use serde_json::{Value, json};

use crate::auth::{AuthError, AuthUser, Role};
use crate::error::{ApiError, ApiResult};
use crate::handlers::parse_id;
use crate::models::{
    ApiResponse, CheckoutResponse, DocumentListResponse, DocumentResponse, document_response,
};
use crate::payments::{CheckoutItem, PaymentError};
use crate::query::{ID_FIELD, ParameterMap};
use crate::resources::number;
use crate::state::AppState;

const BOOKING_MANAGERS: &[Role] = &[Role::Admin, Role::LeadGuide];

/// Start a hosted checkout for one seat on a tour.
#[openapi(tag = "Bookings")]
#[get("/bookings/checkout-session/<tour_id>")]
pub async fn checkout_session(
    user: AuthUser,
    state: &State<AppState>,
    tour_id: &str,
) -> ApiResult<Json<CheckoutResponse>> {
    let client = state.payments.as_ref().ok_or(PaymentError::Disabled)?;
    let tour = state.tours().read(tour_id, &[]).await?;

    let text = |field: &str| tour.get(field).and_then(Value::as_str).map(str::to_string);
    let item = CheckoutItem {
        tour_id: tour
            .get(ID_FIELD)
            .and_then(Value::as_i64)
            .ok_or_else(|| ApiError::Internal("stored tour has no id".into()))?,
        tour_name: text("name").unwrap_or_default(),
        tour_slug: text("slug").unwrap_or_default(),
        image_cover: text("imageCover"),
        price: number(&tour, "price")
            .ok_or_else(|| ApiError::Internal("stored tour has no price".into()))?,
        user_id: user.id,
        customer_email: user
            .profile
            .get("email")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    };

    let session = client.create_session(&item).await?;
    Ok(Json(CheckoutResponse {
        status: "success".to_string(),
        session,
    }))
}

/// Where the payment provider sends the customer after paying: records the
/// booking for the caller, then redirects to the site root.
#[openapi(tag = "Bookings")]
#[get("/bookings/checkout-success?<tour>&<user>&<price>")]
pub async fn checkout_success(
    caller: AuthUser,
    state: &State<AppState>,
    tour: Option<&str>,
    user: Option<&str>,
    price: Option<&str>,
) -> ApiResult<Redirect> {
    let (Some(tour), Some(user), Some(price)) = (tour, user, price) else {
        return Err(ApiError::BadRequest(
            "Checkout confirmation needs tour, user and price".to_string(),
        ));
    };

    let user_id = parse_id(user)?;
    if user_id != caller.id {
        return Err(AuthError::Forbidden.into());
    }
    let price = price
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|price| price.is_finite())
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid price: {price}")))?;
    let booked = state.tours().read(tour, &[]).await?;

    let booking = state
        .bookings()
        .create(json!({ "tour": booked.get(ID_FIELD), "user": user_id, "price": price }))
        .await?;
    log::info!(
        "booking {} confirmed for user {user_id}",
        booking.get(ID_FIELD).cloned().unwrap_or_default()
    );
    Ok(Redirect::to("/"))
}

#[openapi(tag = "Bookings")]
#[get("/bookings")]
pub async fn list_bookings(
    user: AuthUser,
    state: &State<AppState>,
    params: ParameterMap,
) -> ApiResult<Json<DocumentListResponse>> {
    user.restrict_to(BOOKING_MANAGERS)?;
    let bookings = state.bookings().list(Vec::new(), &params).await?;
    Ok(Json(ApiResponse::listed(bookings)))
}

#[openapi(tag = "Bookings")]
#[post("/bookings", data = "<body>")]
pub async fn create_booking(
    user: AuthUser,
    state: &State<AppState>,
    body: Json<Value>,
) -> ApiResult<status::Created<Json<DocumentResponse>>> {
    user.restrict_to(BOOKING_MANAGERS)?;
    let booking = state.bookings().create(body.into_inner()).await?;
    let location = format!("/api/v1/bookings/{}", booking.get(ID_FIELD).cloned().unwrap_or_default());
    Ok(status::Created::new(location).body(Json(document_response(booking))))
}

#[openapi(tag = "Bookings")]
#[get("/bookings/<id>")]
pub async fn get_booking(
    user: AuthUser,
    state: &State<AppState>,
    id: &str,
) -> ApiResult<Json<DocumentResponse>> {
    user.restrict_to(BOOKING_MANAGERS)?;
    let booking = state.bookings().read(id, &[]).await?;
    Ok(Json(document_response(booking)))
}

#[openapi(tag = "Bookings")]
#[patch("/bookings/<id>", data = "<body>")]
pub async fn update_booking(
    user: AuthUser,
    state: &State<AppState>,
    id: &str,
    body: Json<Value>,
) -> ApiResult<Json<DocumentResponse>> {
    user.restrict_to(BOOKING_MANAGERS)?;
    let booking = state.bookings().update(id, body.into_inner()).await?;
    Ok(Json(document_response(booking)))
}

#[openapi(tag = "Bookings")]
#[delete("/bookings/<id>")]
pub async fn delete_booking(user: AuthUser, state: &State<AppState>, id: &str) -> ApiResult<Status> {
    user.restrict_to(BOOKING_MANAGERS)?;
    state.bookings().delete(id).await?;
    Ok(Status::NoContent)
}
