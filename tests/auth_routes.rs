use chrono::{Duration, Utc};
use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::{Client, LocalResponse};
use serde_json::{Value, json};
use tour_api::auth::Role;
use tour_api::resources::user;
use tour_api::routes::api_routes;
use tour_api::state::AppState;
use tour_api::test_support::{TestFixtures, TestRocketBuilder, memory_state};

async fn client_for(state: AppState) -> Client {
    TestRocketBuilder::new()
        .manage_state(state)
        .mount_api_routes(api_routes())
        .async_client()
        .await
}

fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {token}"))
}

async fn body(response: LocalResponse<'_>) -> Value {
    response.into_json::<Value>().await.expect("JSON body")
}

async fn post_json<'c>(client: &'c Client, uri: &str, payload: Value) -> LocalResponse<'c> {
    client
        .post(uri.to_string())
        .header(ContentType::JSON)
        .body(payload.to_string())
        .dispatch()
        .await
}

fn signup_body(email: &str) -> Value {
    json!({
        "name": "Sophie Traveller",
        "email": email,
        "password": "pass1234",
        "passwordConfirm": "pass1234",
        "role": "admin"
    })
}

#[tokio::test]
async fn signup_issues_a_token_and_never_grants_a_role() {
    let client = client_for(memory_state()).await;

    let response = post_json(&client, "/api/v1/users/signup", signup_body("Sophie@Example.com")).await;
    assert_eq!(response.status(), Status::Created);
    let cookie = response.cookies().get("jwt").map(|cookie| cookie.value().to_string());
    let payload = body(response).await;

    let token = payload["token"].as_str().expect("token").to_string();
    assert_eq!(cookie.as_deref(), Some(token.as_str()));
    let user = &payload["data"]["user"];
    assert_eq!(user["email"], "sophie@example.com");
    assert_eq!(user["role"], "user");
    assert!(user.get("password").is_none());
    assert!(user.get("active").is_none());

    let response = client
        .get("/api/v1/users/me")
        .header(bearer(&token))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(body(response).await["data"]["data"]["name"], "Sophie Traveller");
}

#[tokio::test]
async fn signup_reports_validation_and_duplicates() {
    let client = client_for(memory_state()).await;

    let mut mismatched = signup_body("sophie@example.com");
    mismatched["passwordConfirm"] = json!("pass4321");
    let response = post_json(&client, "/api/v1/users/signup", mismatched).await;
    assert_eq!(response.status(), Status::BadRequest);
    let message = body(response).await["message"].as_str().unwrap_or_default().to_string();
    assert!(message.contains("passwordConfirm: Invalid password."), "{message}");

    let response = post_json(&client, "/api/v1/users/signup", signup_body("sophie@example.com")).await;
    assert_eq!(response.status(), Status::Created);
    let response = post_json(&client, "/api/v1/users/signup", signup_body("SOPHIE@example.com")).await;
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(
        body(response).await["message"],
        "Duplicate field value: sophie@example.com"
    );
}

#[tokio::test]
async fn login_checks_credentials() {
    let state = memory_state();
    TestFixtures::new(&state)
        .insert_user("Uma User", "uma@example.com", Role::User, "pass1234")
        .await;
    let client = client_for(state).await;

    let response = post_json(&client, "/api/v1/users/login", json!({ "email": "uma@example.com" })).await;
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(body(response).await["message"], "Please provide email and password.");

    let response = post_json(
        &client,
        "/api/v1/users/login",
        json!({ "email": "uma@example.com", "password": "wrong-pass" }),
    )
    .await;
    assert_eq!(response.status(), Status::Unauthorized);
    assert_eq!(body(response).await["message"], "Incorrect email or password.");

    let response = post_json(
        &client,
        "/api/v1/users/login",
        json!({ "email": "nobody@example.com", "password": "pass1234" }),
    )
    .await;
    assert_eq!(response.status(), Status::Unauthorized);

    let response = post_json(
        &client,
        "/api/v1/users/login",
        json!({ "email": " UMA@example.com ", "password": "pass1234" }),
    )
    .await;
    assert_eq!(response.status(), Status::Ok);
    let payload = body(response).await;
    assert_eq!(payload["status"], "success");
    assert!(payload["token"].as_str().is_some_and(|token| !token.is_empty()));
    assert!(payload.get("data").is_none());
}

#[tokio::test]
async fn session_cookie_authenticates_until_logout() {
    let state = memory_state();
    TestFixtures::new(&state)
        .insert_user("Uma User", "uma@example.com", Role::User, "pass1234")
        .await;
    let client = client_for(state).await;

    let response = post_json(
        &client,
        "/api/v1/users/login",
        json!({ "email": "uma@example.com", "password": "pass1234" }),
    )
    .await;
    assert_eq!(response.status(), Status::Ok);

    let response = client.get("/api/v1/users/me").dispatch().await;
    assert_eq!(response.status(), Status::Ok);

    let response = client.get("/api/v1/users/logout").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let cleared = response.cookies().get("jwt").map(|cookie| cookie.value().to_string());
    assert_eq!(cleared.as_deref(), Some(""));
    assert_eq!(body(response).await["status"], "success");
}

#[tokio::test]
async fn bad_tokens_are_rejected_with_a_reason() {
    let state = memory_state();
    let fixtures = TestFixtures::new(&state);
    let id = fixtures
        .insert_user("Uma User", "uma@example.com", Role::User, "pass1234")
        .await;
    let expired = state
        .auth
        .jwt_service
        .issue_token_at(id, "user", Utc::now() - Duration::days(120))
        .expect("expired token")
        .token;
    let client = client_for(state).await;

    let response = client.get("/api/v1/users/me").dispatch().await;
    assert_eq!(response.status(), Status::Unauthorized);
    assert_eq!(body(response).await["message"], "Please log in to get access.");

    let response = client
        .get("/api/v1/users/me")
        .header(bearer("not-a-token"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
    assert_eq!(body(response).await["message"], "Invalid token. Please login again");

    let response = client.get("/api/v1/users/me").header(bearer(&expired)).dispatch().await;
    assert_eq!(response.status(), Status::Unauthorized);
    assert_eq!(body(response).await["message"], "Token has expired. Please login again");
}

#[tokio::test]
async fn tokens_issued_before_a_password_change_are_stale() {
    let state = memory_state();
    let fixtures = TestFixtures::new(&state);
    let id = fixtures
        .insert_user("Uma User", "uma@example.com", Role::User, "pass1234")
        .await;
    let token = fixtures.token_for(id, Role::User);
    let later = (Utc::now() + Duration::hours(1)).to_rfc3339();
    state
        .store
        .update_by_id(
            user::COLLECTION,
            id,
            &Vec::new(),
            json!({ "passwordChangedAt": later }).as_object().cloned().expect("object"),
        )
        .await
        .expect("update fixture");
    let client = client_for(state).await;

    let response = client.get("/api/v1/users/me").header(bearer(&token)).dispatch().await;
    assert_eq!(response.status(), Status::Unauthorized);
    assert_eq!(
        body(response).await["message"],
        "User recently changed password. Please log in again"
    );
}

#[tokio::test]
async fn password_update_requires_the_current_password() {
    let state = memory_state();
    let fixtures = TestFixtures::new(&state);
    let id = fixtures
        .insert_user("Uma User", "uma@example.com", Role::User, "pass1234")
        .await;
    let token = fixtures.token_for(id, Role::User);
    let client = client_for(state).await;

    let update = |payload: Value| {
        client
            .patch("/api/v1/users/update-password")
            .header(bearer(&token))
            .header(ContentType::JSON)
            .body(payload.to_string())
            .dispatch()
    };

    let response = update(json!({
        "currentPassword": "wrong-pass",
        "newPassword": "newpass99",
        "passwordConfirm": "newpass99"
    }))
    .await;
    assert_eq!(response.status(), Status::Unauthorized);
    assert_eq!(body(response).await["message"], "Invalid password");

    let response = update(json!({
        "currentPassword": "pass1234",
        "newPassword": "short",
        "passwordConfirm": "short"
    }))
    .await;
    assert_eq!(response.status(), Status::BadRequest);

    let response = update(json!({
        "currentPassword": "pass1234",
        "newPassword": "newpass99",
        "passwordConfirm": "newpass99"
    }))
    .await;
    assert_eq!(response.status(), Status::Ok);
    assert!(body(response).await["token"].is_string());

    let response = post_json(
        &client,
        "/api/v1/users/login",
        json!({ "email": "uma@example.com", "password": "pass1234" }),
    )
    .await;
    assert_eq!(response.status(), Status::Unauthorized);

    let response = post_json(
        &client,
        "/api/v1/users/login",
        json!({ "email": "uma@example.com", "password": "newpass99" }),
    )
    .await;
    assert_eq!(response.status(), Status::Ok);
}

#[tokio::test]
async fn users_edit_only_their_name_and_email() {
    let state = memory_state();
    let fixtures = TestFixtures::new(&state);
    let id = fixtures
        .insert_user("Uma User", "uma@example.com", Role::User, "pass1234")
        .await;
    let token = fixtures.token_for(id, Role::User);
    let client = client_for(state).await;

    let response = client
        .patch("/api/v1/users/update-me")
        .header(bearer(&token))
        .header(ContentType::JSON)
        .body(json!({ "password": "newpass99" }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(
        body(response).await["message"],
        "This route is not for password updates. Please use /update-password."
    );

    let response = client
        .patch("/api/v1/users/update-me")
        .header(bearer(&token))
        .header(ContentType::JSON)
        .body(json!({ "name": "Uma Renamed", "role": "admin" }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let user = body(response).await["data"]["user"].clone();
    assert_eq!(user["name"], "Uma Renamed");
    assert_eq!(user["role"], "user");
}

#[tokio::test]
async fn deactivated_accounts_disappear() {
    let state = memory_state();
    let fixtures = TestFixtures::new(&state);
    let id = fixtures
        .insert_user("Uma User", "uma@example.com", Role::User, "pass1234")
        .await;
    let admin_id = fixtures
        .insert_user("Ada Admin", "admin@example.com", Role::Admin, "pass1234")
        .await;
    let token = fixtures.token_for(id, Role::User);
    let admin = fixtures.token_for(admin_id, Role::Admin);
    let client = client_for(state).await;

    let response = client.get("/api/v1/users").header(bearer(&token)).dispatch().await;
    assert_eq!(response.status(), Status::Forbidden);

    let response = client.get("/api/v1/users").header(bearer(&admin)).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let payload = body(response).await;
    assert_eq!(payload["results"], 2);
    assert!(payload["data"]["data"][0].get("password").is_none());

    let response = client
        .delete("/api/v1/users/delete-me")
        .header(bearer(&token))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NoContent);

    let response = client.get("/api/v1/users/me").header(bearer(&token)).dispatch().await;
    assert_eq!(response.status(), Status::Unauthorized);
    assert_eq!(body(response).await["message"], "The user no longer exists.");

    let response = post_json(
        &client,
        "/api/v1/users/login",
        json!({ "email": "uma@example.com", "password": "pass1234" }),
    )
    .await;
    assert_eq!(response.status(), Status::Unauthorized);

    let response = client
        .get(format!("/api/v1/users/{id}"))
        .header(bearer(&admin))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NotFound);
    assert_eq!(body(response).await["message"], "No user found with that ID");
}
