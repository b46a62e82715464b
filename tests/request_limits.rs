use rocket::http::{ContentType, Status};
use rocket::local::blocking::Client;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::time::Duration;
use tour_api::rate_limit::{RATE_LIMITED_MESSAGE, RateLimitConfig};
use tour_api::routes::api_routes;
use tour_api::test_support::{TestRocketBuilder, memory_state};

fn client_with_budget(max_requests: u64) -> Client {
    TestRocketBuilder::new()
        .manage_state(memory_state())
        .mount_api_routes(api_routes())
        .rate_limit(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(1800),
        })
        .blocking_client()
}

fn from(ip: &str) -> SocketAddr {
    format!("{ip}:40000").parse().expect("socket address")
}

#[test]
fn api_requests_over_budget_get_429() {
    let client = client_with_budget(2);

    for remaining in [1, 0] {
        let response = client.get("/api/v1/health").remote(from("10.1.1.1")).dispatch();
        assert_eq!(response.status(), Status::Ok);
        let header = response.headers().get_one("RateLimit").expect("budget header");
        assert!(header.contains(&format!("remaining={remaining}")), "{header}");
    }

    let response = client.get("/api/v1/health").remote(from("10.1.1.1")).dispatch();
    assert_eq!(response.status(), Status::TooManyRequests);
    assert_eq!(response.headers().get_one("RateLimit-Policy"), Some("2;w=1800"));
    assert!(response.headers().get_one("Retry-After").is_some());
    let payload: Value = response.into_json().expect("JSON body");
    assert_eq!(payload["status"], "fail");
    assert_eq!(payload["message"], RATE_LIMITED_MESSAGE);

    let other = client.get("/api/v1/health").remote(from("10.1.1.2")).dispatch();
    assert_eq!(other.status(), Status::Ok);
}

#[test]
fn throttled_writes_never_reach_the_handler() {
    let client = client_with_budget(1);
    let signup = |email: &str| {
        client
            .post("/api/v1/users/signup")
            .remote(from("10.2.2.2"))
            .header(ContentType::JSON)
            .body(
                json!({
                    "name": "Tess Tripper",
                    "email": email,
                    "password": "pass1234",
                    "passwordConfirm": "pass1234"
                })
                .to_string(),
            )
            .dispatch()
            .status()
    };

    assert_eq!(signup("first@example.com"), Status::Created);
    assert_eq!(signup("second@example.com"), Status::TooManyRequests);

    let login = client
        .post("/api/v1/users/login")
        .remote(from("10.3.3.3"))
        .header(ContentType::JSON)
        .body(json!({ "email": "second@example.com", "password": "pass1234" }).to_string())
        .dispatch();
    assert_eq!(login.status(), Status::Unauthorized);
}

#[test]
fn json_bodies_over_ten_kib_are_rejected() {
    let client = TestRocketBuilder::new()
        .manage_state(memory_state())
        .mount_api_routes(api_routes())
        .blocking_client();

    let response = client
        .post("/api/v1/users/signup")
        .header(ContentType::JSON)
        .body(
            json!({
                "name": "x".repeat(11 * 1024),
                "email": "big@example.com",
                "password": "pass1234",
                "passwordConfirm": "pass1234"
            })
            .to_string(),
        )
        .dispatch();

    assert_eq!(response.status(), Status::PayloadTooLarge);
    let payload: Value = response.into_json().expect("JSON body");
    assert_eq!(payload["status"], "fail");
    assert_eq!(payload["message"], "Request body is too large");
}
