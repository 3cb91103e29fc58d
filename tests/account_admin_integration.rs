//! Registration, profile, and Administrator user/role management

mod common;

use common::{raw_set_cookie, spawn_app, TestApp, ADMIN_EMAIL, ADMIN_PASSWORD};
use serde_json::{json, Value};
use useradmin::store::IdentityStore;

fn jane() -> Value {
    json!({
        "email": "jane@example.com",
        "password": "J@ne1234",
        "firstName": "Jane",
        "lastName": "Doe",
        "phoneNumber": "+1 555 0100"
    })
}

async fn user_id(app: &TestApp, token: &str, email: &str) -> String {
    let users: Value = app
        .client
        .get(app.url("/api/account"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    users
        .as_array()
        .expect("user array")
        .iter()
        .find(|u| u["email"] == email)
        .and_then(|u| u["id"].as_str())
        .expect("user present")
        .to_string()
}

// --- Registration ---

#[tokio::test]
async fn register_accepts_a_valid_account() {
    let app = spawn_app().await;

    let response = app.register(&jane(), None).await;
    assert_eq!(202, response.status().as_u16());

    let (token, _) = app.login_session("jane@example.com", "J@ne1234").await;
    assert!(!token.is_empty());
}

#[tokio::test]
async fn register_rejects_a_duplicate_email() {
    let app = spawn_app().await;
    app.register(&jane(), None).await;

    let mut duplicate = jane();
    duplicate["email"] = json!("JANE@example.com");
    let response = app.register(&duplicate, None).await;

    assert_eq!(409, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert!(body["errors"]["email"].is_array());
}

#[tokio::test]
async fn register_reports_every_invalid_field() {
    let app = spawn_app().await;

    let response = app
        .register(
            &json!({
                "email": "not-an-email",
                "password": "short",
                "firstName": "",
                "lastName": "Doe"
            }),
            None,
        )
        .await;

    assert_eq!(400, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert!(body["errors"]["email"].is_array());
    assert!(body["errors"]["password"].is_array());
    assert!(body["errors"]["firstName"].is_array());
    assert!(body["errors"]["lastName"].is_null());
}

#[tokio::test]
async fn register_with_malformed_json_is_bad_request() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/api/account/register"))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(400, response.status().as_u16());
}

#[tokio::test]
async fn register_with_roles_requires_an_administrator() {
    let app = spawn_app().await;
    let mut body = jane();
    body["roles"] = json!(["Administrator"]);

    let anonymous = app.register(&body, None).await;
    assert_eq!(403, anonymous.status().as_u16());

    app.register(
        &json!({
            "email": "bob@example.com",
            "password": "B0b!pass",
            "firstName": "Bob",
            "lastName": "Smith"
        }),
        None,
    )
    .await;
    let (bob_token, _) = app.login_session("bob@example.com", "B0b!pass").await;
    let as_user = app.register(&body, Some(&bob_token)).await;
    assert_eq!(403, as_user.status().as_u16());

    let admin_token = app.admin_token().await;
    let as_admin = app.register(&body, Some(&admin_token)).await;
    assert_eq!(202, as_admin.status().as_u16());

    let response = app.login("jane@example.com", "J@ne1234", &Default::default()).await;
    let session: Value = response.json().await.unwrap();
    assert_eq!(session["roles"], json!(["Administrator"]));
}

#[tokio::test]
async fn register_with_an_unknown_role_creates_nothing() {
    let app = spawn_app().await;
    let admin_token = app.admin_token().await;
    let mut body = jane();
    body["roles"] = json!(["Ghost"]);

    let response = app.register(&body, Some(&admin_token)).await;

    assert_eq!(400, response.status().as_u16());
    let login = app.login("jane@example.com", "J@ne1234", &Default::default()).await;
    assert_eq!(401, login.status().as_u16());
}

// --- Profile ---

#[tokio::test]
async fn profile_requires_a_bearer_token() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/api/account/profile"))
        .send()
        .await
        .unwrap();

    assert_eq!(401, response.status().as_u16());

    let garbage = app
        .client
        .get(app.url("/api/account/profile"))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();

    assert_eq!(401, garbage.status().as_u16());
}

#[tokio::test]
async fn profile_returns_the_signed_in_account() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let response = app
        .client
        .get(app.url("/api/account/profile"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], ADMIN_EMAIL);
    assert_eq!(body["userName"], ADMIN_EMAIL);
    assert_eq!(body["firstName"], "admin");
    assert!(body.get("passwordHash").is_none());
    assert!(body["roles"].as_array().unwrap().contains(&json!("Administrator")));
}

#[tokio::test]
async fn profile_update_changes_email_and_keeps_the_session() {
    let app = spawn_app().await;
    app.register(&jane(), None).await;
    let (token, mut jar) = app.login_session("jane@example.com", "J@ne1234").await;

    let response = app
        .client
        .put(app.url("/api/account/profile/update"))
        .bearer_auth(&token)
        .json(&json!({
            "email": "jane.doe@example.com",
            "firstName": "Janet",
            "lastName": "Doe"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(200, response.status().as_u16());
    assert!(raw_set_cookie(response.headers(), "userName").is_some());
    jar.update(response.headers());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], "jane.doe@example.com");
    assert_eq!(body["firstName"], "Janet");
    assert!(body["phoneNumber"].is_null());

    assert_eq!(202, app.refresh(&jar).await.status().as_u16());
    app.login_session("jane.doe@example.com", "J@ne1234").await;
}

#[tokio::test]
async fn profile_update_rejects_an_email_in_use() {
    let app = spawn_app().await;
    app.register(&jane(), None).await;
    let (token, _) = app.login_session("jane@example.com", "J@ne1234").await;

    let response = app
        .client
        .put(app.url("/api/account/profile/update"))
        .bearer_auth(&token)
        .json(&json!({ "email": ADMIN_EMAIL, "firstName": "Jane", "lastName": "Doe" }))
        .send()
        .await
        .unwrap();

    assert_eq!(409, response.status().as_u16());
}

#[tokio::test]
async fn profile_update_with_a_stale_stamp_is_a_conflict() {
    let app = spawn_app().await;
    app.register(&jane(), None).await;
    let (token, _) = app.login_session("jane@example.com", "J@ne1234").await;

    let profile: Value = app
        .client
        .get(app.url("/api/account/profile"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let stamp = profile["concurrencyStamp"].clone();

    let update = |first_name: &'static str| {
        app.client
            .put(app.url("/api/account/profile/update"))
            .bearer_auth(&token)
            .json(&json!({
                "email": "jane@example.com",
                "firstName": first_name,
                "lastName": "Doe",
                "concurrencyStamp": stamp
            }))
            .send()
    };

    assert_eq!(200, update("Janet").await.unwrap().status().as_u16());
    assert_eq!(409, update("Janine").await.unwrap().status().as_u16());
}

// --- User administration ---

#[tokio::test]
async fn user_administration_requires_the_administrator_role() {
    let app = spawn_app().await;
    app.register(&jane(), None).await;
    let (token, _) = app.login_session("jane@example.com", "J@ne1234").await;

    let anonymous = app.client.get(app.url("/api/account")).send().await.unwrap();
    assert_eq!(401, anonymous.status().as_u16());

    let as_user = app
        .client
        .get(app.url("/api/account"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(403, as_user.status().as_u16());
}

#[tokio::test]
async fn users_are_listed_newest_first_and_paginated() {
    let app = spawn_app().await;
    let token = app.admin_token().await;
    for i in 0..6 {
        let response = app
            .register(
                &json!({
                    "email": format!("user{}@example.com", i),
                    "password": "Us3r!pass",
                    "firstName": "User",
                    "lastName": format!("Number{}", i)
                }),
                None,
            )
            .await;
        assert_eq!(202, response.status().as_u16());
    }

    let all: Value = app
        .client
        .get(app.url("/api/account"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let all = all.as_array().unwrap();
    assert_eq!(7, all.len());
    assert_eq!(all[0]["email"], "user5@example.com");
    assert_eq!(all[6]["email"], ADMIN_EMAIL);
    assert_eq!(all[6]["roles"], json!(["Administrator"]));
    assert_eq!(all[6]["phoneNumber"], "0413662048");

    let page: Value = app
        .client
        .get(app.url("/api/account?pageNum=2"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["pageIndex"], 2);
    assert_eq!(page["totalPages"], 2);
    assert_eq!(page["hasPreviousPage"], true);
    assert_eq!(page["hasNextPage"], false);
    assert_eq!(page["dataList"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn a_page_number_far_past_the_end_returns_an_empty_page() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    for path in ["/api/account", "/api/roles"] {
        let response = app
            .client
            .get(app.url(&format!("{}?pageNum={}", path, i64::MAX)))
            .bearer_auth(&token)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(200, response.status().as_u16());
        let page: Value = response.json().await.unwrap();
        assert_eq!(page["pageIndex"], i64::MAX);
        assert_eq!(page["hasNextPage"], false);
        assert!(page["dataList"].as_array().unwrap().is_empty());
    }
}

#[tokio::test]
async fn administrator_reads_updates_and_deletes_a_user() {
    let app = spawn_app().await;
    let token = app.admin_token().await;
    app.register(&jane(), None).await;
    let id = user_id(&app, &token, "jane@example.com").await;

    let detail: Value = app
        .client
        .get(app.url(&format!("/api/account/{}", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["user"]["email"], "jane@example.com");
    assert_eq!(detail["roles"], json!([]));

    let update = app
        .client
        .put(app.url(&format!("/api/account/{}", id)))
        .bearer_auth(&token)
        .json(&json!({
            "email": "jane@example.com",
            "firstName": "Jane",
            "lastName": "Roe",
            "roles": ["User", "Administrator"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(204, update.status().as_u16());

    let narrowed = app
        .client
        .put(app.url(&format!("/api/account/{}", id)))
        .bearer_auth(&token)
        .json(&json!({
            "email": "jane@example.com",
            "firstName": "Jane",
            "lastName": "Roe",
            "roles": ["user"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(204, narrowed.status().as_u16());

    let detail: Value = app
        .client
        .get(app.url(&format!("/api/account/{}", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["user"]["lastName"], "Roe");
    assert_eq!(detail["roles"], json!(["User"]));

    let delete = app
        .client
        .delete(app.url(&format!("/api/account/{}", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(204, delete.status().as_u16());

    let gone = app
        .client
        .get(app.url(&format!("/api/account/{}", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(404, gone.status().as_u16());
}

#[tokio::test]
async fn deleted_user_cannot_refresh() {
    let app = spawn_app().await;
    let token = app.admin_token().await;
    app.register(&jane(), None).await;
    let (_, jar) = app.login_session("jane@example.com", "J@ne1234").await;
    let id = user_id(&app, &token, "jane@example.com").await;

    app.client
        .delete(app.url(&format!("/api/account/{}", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(400, app.refresh(&jar).await.status().as_u16());
}

#[tokio::test]
async fn unknown_user_id_is_not_found() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let response = app
        .client
        .delete(app.url(&format!("/api/account/{}", uuid::Uuid::new_v4())))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(404, response.status().as_u16());
}

// --- Roles ---

#[tokio::test]
async fn role_lifecycle() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let created = app
        .client
        .post(app.url("/api/roles"))
        .bearer_auth(&token)
        .json(&json!({ "name": "Editor" }))
        .send()
        .await
        .unwrap();
    assert_eq!(201, created.status().as_u16());
    let role: Value = created.json().await.unwrap();
    let id = role["id"].as_str().unwrap().to_string();
    assert_eq!(role["normalizedName"], "EDITOR");

    let duplicate = app
        .client
        .post(app.url("/api/roles"))
        .bearer_auth(&token)
        .json(&json!({ "name": "editor" }))
        .send()
        .await
        .unwrap();
    assert_eq!(409, duplicate.status().as_u16());

    let mismatch = app
        .client
        .put(app.url(&format!("/api/roles/{}", id)))
        .bearer_auth(&token)
        .json(&json!({
            "id": uuid::Uuid::new_v4(),
            "name": "Writer",
            "concurrencyStamp": role["concurrencyStamp"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(400, mismatch.status().as_u16());

    let renamed = app
        .client
        .put(app.url(&format!("/api/roles/{}", id)))
        .bearer_auth(&token)
        .json(&json!({
            "id": id,
            "name": "Writer",
            "concurrencyStamp": role["concurrencyStamp"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(204, renamed.status().as_u16());

    let stale = app
        .client
        .put(app.url(&format!("/api/roles/{}", id)))
        .bearer_auth(&token)
        .json(&json!({
            "id": id,
            "name": "Author",
            "concurrencyStamp": role["concurrencyStamp"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(409, stale.status().as_u16());

    let fetched: Value = app
        .client
        .get(app.url(&format!("/api/roles/{}", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["name"], "Writer");

    let roles: Value = app
        .client
        .get(app.url("/api/roles?pageNum=1"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(roles["dataList"].as_array().unwrap().len(), 3);
    assert_eq!(roles["totalPages"], 1);

    let deleted = app
        .client
        .delete(app.url(&format!("/api/roles/{}", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(204, deleted.status().as_u16());

    let missing = app
        .client
        .get(app.url(&format!("/api/roles/{}", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(404, missing.status().as_u16());
}

#[tokio::test]
async fn roles_require_the_administrator_role() {
    let app = spawn_app().await;

    let anonymous = app.client.get(app.url("/api/roles")).send().await.unwrap();

    assert_eq!(401, anonymous.status().as_u16());
}

#[tokio::test]
async fn admin_seed_survives_a_login_round_trip() {
    let app = spawn_app().await;

    let (token, jar) = app.login_session(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    assert!(!token.is_empty());
    assert!(jar.user_name.is_some());
    assert_eq!(2, app.store.count_roles().await.unwrap());
}

#[tokio::test]
async fn error_ids_match_the_request_id_header() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let unauthenticated = app
        .client
        .get(app.url("/api/account/profile"))
        .send()
        .await
        .expect("Failed to execute request.");
    let missing = app
        .client
        .get(app.url(&format!("/api/account/{}", uuid::Uuid::new_v4())))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request.");

    for (response, status) in [(unauthenticated, 401), (missing, 404)] {
        assert_eq!(status, response.status().as_u16());
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .expect("x-request-id header")
            .to_string();
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["errorId"], request_id.as_str());
    }
}
