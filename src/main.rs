#[rocket::launch]
fn rocket() -> _ {
    log::info!("starting tour api");
    tour_api::rocket()
}
