use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::{Client, LocalResponse};
use serde_json::{Value, json};
use tour_api::auth::Role;
use tour_api::routes::api_routes;
use tour_api::test_support::{TestFixtures, TestRocketBuilder, memory_state};

struct Catalogue {
    client: Client,
    admin: String,
    lead_guide: String,
    user: String,
    forest_hiker: i64,
    hidden_valley: i64,
}

fn tour(name: &str, price: u32, difficulty: &str, duration: u32, rating: f64, created: &str) -> Value {
    json!({
        "name": name,
        "duration": duration,
        "maxGroupSize": 10,
        "difficulty": difficulty,
        "ratingsAverage": rating,
        "price": price,
        "summary": format!("{name} in a few words"),
        "imageCover": "cover.jpg",
        "createdAt": created,
    })
}

fn located(mut body: Value, lng: f64, lat: f64, starts: &[&str]) -> Value {
    body["startLocation"] = json!({ "type": "Point", "coordinates": [lng, lat] });
    body["startDates"] = json!(starts);
    body
}

async fn catalogue() -> Catalogue {
    let state = memory_state();
    let fixtures = TestFixtures::new(&state);

    let admin_id = fixtures.insert_user("Ada Admin", "admin@example.com", Role::Admin, "pass1234").await;
    let lead_id = fixtures.insert_user("Lea Lead", "lead@example.com", Role::LeadGuide, "pass1234").await;
    let user_id = fixtures.insert_user("Uma User", "uma@example.com", Role::User, "pass1234").await;

    let mut forest = located(
        tour("The Forest Hiker", 397, "easy", 5, 4.7, "2021-01-01T00:00:00.000Z"),
        -116.214531,
        51.417611,
        &["2021-04-25T09:00:00.000Z", "2021-07-20T09:00:00.000Z"],
    );
    forest["guides"] = json!([lead_id]);
    let forest = fixtures.insert_tour(forest).await.expect("forest hiker");

    fixtures
        .insert_tour(located(
            tour("The Sea Explorer", 497, "medium", 7, 4.8, "2021-01-02T00:00:00.000Z"),
            -80.185942,
            25.774772,
            &["2021-07-19T09:00:00.000Z"],
        ))
        .await
        .expect("sea explorer");
    fixtures
        .insert_tour(tour("The Snow Adventurer", 997, "difficult", 4, 4.5, "2021-01-03T00:00:00.000Z"))
        .await
        .expect("snow adventurer");
    fixtures
        .insert_tour(tour("The City Wanderer", 1197, "easy", 9, 4.6, "2021-01-04T00:00:00.000Z"))
        .await
        .expect("city wanderer");
    fixtures
        .insert_tour(tour("The Park Camper", 1497, "medium", 10, 4.9, "2021-01-05T00:00:00.000Z"))
        .await
        .expect("park camper");
    fixtures
        .insert_tour(located(
            tour("The Sports Lover", 2997, "difficult", 14, 4.7, "2021-01-06T00:00:00.000Z"),
            -118.803461,
            34.006072,
            &["2021-07-19T09:00:00.000Z"],
        ))
        .await
        .expect("sports lover");

    let mut hidden = tour("The Hidden Valley", 100, "easy", 3, 4.5, "2021-01-07T00:00:00.000Z");
    hidden["secretTour"] = json!(true);
    let hidden = fixtures.insert_tour(hidden).await.expect("hidden valley");

    let admin = fixtures.token_for(admin_id, Role::Admin);
    let lead_guide = fixtures.token_for(lead_id, Role::LeadGuide);
    let user = fixtures.token_for(user_id, Role::User);

    let client = TestRocketBuilder::new()
        .manage_state(state)
        .mount_api_routes(api_routes())
        .async_client()
        .await;

    Catalogue {
        client,
        admin,
        lead_guide,
        user,
        forest_hiker: forest["id"].as_i64().expect("id"),
        hidden_valley: hidden["id"].as_i64().expect("id"),
    }
}

fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {token}"))
}

async fn body(response: LocalResponse<'_>) -> Value {
    response.into_json::<Value>().await.expect("JSON body")
}

fn names(payload: &Value) -> Vec<String> {
    payload["data"]["data"]
        .as_array()
        .expect("document list")
        .iter()
        .map(|tour| tour["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn first_page_uses_the_default_limit_and_hides_secret_tours() {
    let catalogue = catalogue().await;

    let response = catalogue.client.get("/api/v1/tours?sort=price").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let payload = body(response).await;

    assert_eq!(payload["status"], "success");
    assert_eq!(payload["results"], 3);
    assert_eq!(
        names(&payload),
        vec!["The Forest Hiker", "The Sea Explorer", "The Snow Adventurer"]
    );
}

#[tokio::test]
async fn default_order_is_newest_first() {
    let catalogue = catalogue().await;

    let payload = body(catalogue.client.get("/api/v1/tours?limit=2").dispatch().await).await;
    assert_eq!(names(&payload), vec!["The Sports Lover", "The Park Camper"]);
}

#[tokio::test]
async fn comparison_operators_filter_numerically() {
    let catalogue = catalogue().await;

    let payload = body(
        catalogue
            .client
            .get("/api/v1/tours?price%5Blte%5D=1000&sort=-price&limit=10")
            .dispatch()
            .await,
    )
    .await;
    assert_eq!(
        names(&payload),
        vec!["The Snow Adventurer", "The Sea Explorer", "The Forest Hiker"]
    );

    let payload = body(
        catalogue
            .client
            .get("/api/v1/tours?difficulty=easy&duration%5Bgte%5D=6")
            .dispatch()
            .await,
    )
    .await;
    assert_eq!(names(&payload), vec!["The City Wanderer"]);
}

#[tokio::test]
async fn unknown_filter_fields_match_nothing() {
    let catalogue = catalogue().await;

    let payload = body(catalogue.client.get("/api/v1/tours?colour=blue").dispatch().await).await;
    assert_eq!(payload["results"], 0);
}

#[tokio::test]
async fn field_selection_limits_returned_keys() {
    let catalogue = catalogue().await;

    let payload = body(
        catalogue
            .client
            .get("/api/v1/tours?fields=name,price&sort=price&limit=1")
            .dispatch()
            .await,
    )
    .await;
    let first = &payload["data"]["data"][0];
    assert_eq!(first["name"], "The Forest Hiker");
    assert_eq!(first["price"], 397);
    assert!(first.get("summary").is_none());
    assert!(first.get("__v").is_none());

    let payload = body(
        catalogue
            .client
            .get("/api/v1/tours?fields=-summary&sort=price&limit=1")
            .dispatch()
            .await,
    )
    .await;
    let first = &payload["data"]["data"][0];
    assert!(first.get("summary").is_none());
    assert!(first.get("imageCover").is_some());
}

#[tokio::test]
async fn pages_through_sorted_results() {
    let catalogue = catalogue().await;

    let payload = body(
        catalogue
            .client
            .get("/api/v1/tours?sort=price&limit=2&page=2")
            .dispatch()
            .await,
    )
    .await;
    assert_eq!(names(&payload), vec!["The Snow Adventurer", "The City Wanderer"]);

    let payload = body(
        catalogue
            .client
            .get("/api/v1/tours?sort=price&limit=2&page=9")
            .dispatch()
            .await,
    )
    .await;
    assert_eq!(payload["results"], 0);
}

#[tokio::test]
async fn cheap_alias_returns_five_compact_tours() {
    let catalogue = catalogue().await;

    let payload = body(catalogue.client.get("/api/v1/tours/top-5-cheap").dispatch().await).await;
    assert_eq!(payload["results"], 5);
    let first = &payload["data"]["data"][0];
    assert_eq!(first["name"], "The Forest Hiker");
    assert_eq!(first["difficulty"], "easy");
    assert!(first.get("imageCover").is_none());
}

#[tokio::test]
async fn reading_a_tour_resolves_guides_and_reviews() {
    let catalogue = catalogue().await;
    let id = catalogue.forest_hiker;

    let response = catalogue
        .client
        .post(format!("/api/v1/tours/{id}/reviews"))
        .header(bearer(&catalogue.user))
        .header(ContentType::JSON)
        .body(json!({ "review": "Lovely lakes", "rating": 4 }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);

    let payload = body(catalogue.client.get(format!("/api/v1/tours/{id}")).dispatch().await).await;
    let tour = &payload["data"]["data"];
    assert_eq!(tour["slug"], "the-forest-hiker");
    assert_eq!(tour["durationWeeks"], "Week(s): 0, Days: 5");
    assert_eq!(tour["guides"][0]["name"], "Lea Lead");
    assert!(tour["guides"][0].get("password").is_none());
    assert_eq!(tour["reviews"].as_array().map(Vec::len), Some(1));
    assert_eq!(tour["reviews"][0]["user"]["name"], "Uma User");
    assert_eq!(tour["ratingsQuantity"], 1);
    assert_eq!(tour["ratingsAverage"].as_f64(), Some(4.0));
    assert!(tour.get("createdAt").is_none());
}

#[tokio::test]
async fn missing_and_malformed_ids_are_client_errors() {
    let catalogue = catalogue().await;

    let response = catalogue.client.get("/api/v1/tours/999").dispatch().await;
    assert_eq!(response.status(), Status::NotFound);
    let payload = body(response).await;
    assert_eq!(payload["status"], "fail");
    assert_eq!(payload["message"], "No tour found with that ID");

    let response = catalogue.client.get("/api/v1/tours/abc").dispatch().await;
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(body(response).await["message"], "Invalid id: abc");

    let hidden = catalogue.hidden_valley;
    let response = catalogue.client.get(format!("/api/v1/tours/{hidden}")).dispatch().await;
    assert_eq!(response.status(), Status::NotFound);
}

#[tokio::test]
async fn unmatched_paths_answer_with_json() {
    let catalogue = catalogue().await;

    let response = catalogue.client.get("/api/v1/nowhere").dispatch().await;
    assert_eq!(response.status(), Status::NotFound);
    let payload = body(response).await;
    assert_eq!(payload["status"], "fail");
    assert_eq!(payload["message"], "Can't find /api/v1/nowhere on this server");
}

#[tokio::test]
async fn only_managers_create_tours() {
    let catalogue = catalogue().await;
    let new_tour = tour("The Northern Lights", 1800, "medium", 6, 4.5, "2021-02-01T00:00:00.000Z");

    let response = catalogue
        .client
        .post("/api/v1/tours")
        .header(ContentType::JSON)
        .body(new_tour.to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
    assert_eq!(body(response).await["message"], "Please log in to get access.");

    let response = catalogue
        .client
        .post("/api/v1/tours")
        .header(bearer(&catalogue.user))
        .header(ContentType::JSON)
        .body(new_tour.to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
    assert_eq!(
        body(response).await["message"],
        "You do not have permission to perform this action"
    );

    let response = catalogue
        .client
        .post("/api/v1/tours")
        .header(bearer(&catalogue.lead_guide))
        .header(ContentType::JSON)
        .body(new_tour.to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);
    let created = body(response).await;
    assert_eq!(created["data"]["data"]["slug"], "the-northern-lights");

    let response = catalogue
        .client
        .post("/api/v1/tours")
        .header(bearer(&catalogue.admin))
        .header(ContentType::JSON)
        .body(new_tour.to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(
        body(response).await["message"],
        "Duplicate field value: The Northern Lights"
    );
}

#[tokio::test]
async fn invalid_tours_are_rejected_with_every_issue() {
    let catalogue = catalogue().await;

    let response = catalogue
        .client
        .post("/api/v1/tours")
        .header(bearer(&catalogue.admin))
        .header(ContentType::JSON)
        .body(json!({ "name": "Short", "difficulty": "extreme" }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    let message = body(response).await["message"].as_str().unwrap_or_default().to_string();
    assert!(message.starts_with("Invalid input data."), "{message}");
    assert!(message.contains("A tour must have a price"), "{message}");
    assert!(message.contains("Difficulty is either: easy, medium or difficult"), "{message}");
}

#[tokio::test]
async fn updates_and_deletes_tours() {
    let catalogue = catalogue().await;
    let id = catalogue.forest_hiker;

    let response = catalogue
        .client
        .patch(format!("/api/v1/tours/{id}"))
        .header(bearer(&catalogue.admin))
        .header(ContentType::JSON)
        .body(json!({ "price": 450 }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let updated = body(response).await;
    assert_eq!(updated["data"]["data"]["price"], 450);
    assert_eq!(updated["data"]["data"]["name"], "The Forest Hiker");

    let response = catalogue
        .client
        .patch(format!("/api/v1/tours/{id}"))
        .header(bearer(&catalogue.admin))
        .header(ContentType::JSON)
        .body(json!({ "priceDiscount": 500 }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);

    let response = catalogue
        .client
        .delete(format!("/api/v1/tours/{id}"))
        .header(bearer(&catalogue.admin))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NoContent);

    let response = catalogue.client.get(format!("/api/v1/tours/{id}")).dispatch().await;
    assert_eq!(response.status(), Status::NotFound);
}

#[tokio::test]
async fn stats_group_visible_tours_by_difficulty() {
    let catalogue = catalogue().await;

    let payload = body(catalogue.client.get("/api/v1/tours/tour-stats").dispatch().await).await;
    let stats = payload["data"]["stats"].as_array().expect("stats");
    let difficulties: Vec<&str> = stats.iter().filter_map(|group| group["difficulty"].as_str()).collect();
    assert_eq!(difficulties, vec!["easy", "medium", "difficult"]);
    assert_eq!(stats[0]["numTours"], 2);
    assert_eq!(stats[0]["avgPrice"].as_f64(), Some(797.0));
    assert_eq!(stats[0]["minPrice"].as_f64(), Some(397.0));
}

#[tokio::test]
async fn monthly_plan_is_for_guides_only() {
    let catalogue = catalogue().await;

    let response = catalogue
        .client
        .get("/api/v1/tours/monthly-plan/2021")
        .header(bearer(&catalogue.user))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);

    let response = catalogue
        .client
        .get("/api/v1/tours/monthly-plan/2021")
        .header(bearer(&catalogue.lead_guide))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let payload = body(response).await;
    let plan = &payload["data"]["plan"];
    assert_eq!(plan[0]["month"], 7);
    assert_eq!(plan[0]["numTours"], 3);
    assert_eq!(plan[1]["month"], 4);

    let response = catalogue
        .client
        .get("/api/v1/tours/monthly-plan/soon")
        .header(bearer(&catalogue.lead_guide))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
}

#[tokio::test]
async fn geo_queries_measure_from_the_centre() {
    let catalogue = catalogue().await;

    let payload = body(
        catalogue
            .client
            .get("/api/v1/tours/tours-within/400/center/34.111745,-118.113491/unit/mi")
            .dispatch()
            .await,
    )
    .await;
    assert_eq!(names(&payload), vec!["The Sports Lover"]);

    let payload = body(
        catalogue
            .client
            .get("/api/v1/tours/distances/34.111745,-118.113491/unit/km")
            .dispatch()
            .await,
    )
    .await;
    let distances = payload["data"]["data"].as_array().expect("distances");
    assert_eq!(distances.len(), 3);
    assert_eq!(distances[0]["name"], "The Sports Lover");

    let response = catalogue
        .client
        .get("/api/v1/tours/distances/somewhere/unit/km")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(
        body(response).await["message"],
        "Please provide latitude and longitude in the format: lat,lng"
    );
}

#[tokio::test]
async fn repeated_duration_matches_either_value() {
    let catalogue = catalogue().await;

    let response = catalogue
        .client
        .get("/api/v1/tours?duration=5&duration=9&sort=price")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(
        names(&body(response).await),
        vec!["The Forest Hiker", "The City Wanderer"]
    );

    let response = catalogue
        .client
        .get("/api/v1/tours?difficulty=easy&difficulty=medium&sort=price")
        .dispatch()
        .await;
    assert_eq!(
        names(&body(response).await),
        vec!["The Sea Explorer", "The Park Camper"]
    );
}
