//! Shared harness: an app on a random port backed by the in-memory store
#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;

use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use reqwest::Response;
use serde_json::Value;
use useradmin::configuration::{JwtSettings, PasswordSettings, SeedSettings};
use useradmin::seed::seed_identity;
use useradmin::startup::run;
use useradmin::store::{IdentityStore, MemoryIdentityStore};
use useradmin::telemetry::try_init_test_telemetry;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "P@ssw0rd1";

pub struct TestApp {
    pub address: String,
    pub store: Arc<MemoryIdentityStore>,
    pub client: reqwest::Client,
}

/// Session cookies as seen by a client that stores `Set-Cookie` values itself
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    pub user_name: Option<String>,
    pub refresh_token: Option<String>,
}

impl CookieJar {
    /// Apply every `Set-Cookie` of a response; removal cookies clear the entry
    pub fn update(&mut self, headers: &HeaderMap) {
        for (name, value) in set_cookies(headers) {
            let value = if value.is_empty() { None } else { Some(value) };
            match name.as_str() {
                "userName" => self.user_name = value,
                "refreshToken" => self.refresh_token = value,
                _ => {}
            }
        }
    }

    pub fn header(&self) -> String {
        let mut parts = Vec::new();
        if let Some(user_name) = &self.user_name {
            parts.push(format!("userName={}", user_name));
        }
        if let Some(refresh_token) = &self.refresh_token {
            parts.push(format!("refreshToken={}", refresh_token));
        }
        parts.join("; ")
    }
}

/// `(name, value)` of every `Set-Cookie` header
pub fn set_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| {
            let pair = v.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Raw `Set-Cookie` header for one cookie name
pub fn raw_set_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{}=", name)))
        .map(str::to_string)
}

pub fn jwt_settings() -> JwtSettings {
    JwtSettings {
        secret: "integration-test-secret-with-enough-entropy".to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 86400,
        issuer: "useradmin".to_string(),
    }
}

pub async fn spawn_app() -> TestApp {
    try_init_test_telemetry();

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let password = PasswordSettings { hash_cost: 4 };
    let store = Arc::new(MemoryIdentityStore::new());
    seed_identity(store.as_ref(), &SeedSettings::default(), &password)
        .await
        .expect("Failed to seed identity store");

    let dyn_store: Arc<dyn IdentityStore> = store.clone();
    let server = run(listener, dyn_store, jwt_settings(), password).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        store,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn login(&self, email: &str, password: &str, jar: &CookieJar) -> Response {
        let mut request = self
            .client
            .post(self.url("/api/account/login"))
            .json(&serde_json::json!({ "email": email, "password": password }));
        if !jar.header().is_empty() {
            request = request.header(COOKIE, jar.header());
        }
        request.send().await.expect("Failed to execute request.")
    }

    /// Log in, returning the bearer token and the session cookies
    pub async fn login_session(&self, email: &str, password: &str) -> (String, CookieJar) {
        let mut jar = CookieJar::default();
        let response = self.login(email, password, &jar).await;
        assert_eq!(202, response.status().as_u16(), "login of {} failed", email);
        jar.update(response.headers());

        let body: Value = response.json().await.expect("Failed to parse response");
        let token = body["token"].as_str().expect("token").to_string();
        (token, jar)
    }

    pub async fn admin_token(&self) -> String {
        self.login_session(ADMIN_EMAIL, ADMIN_PASSWORD).await.0
    }

    pub async fn get_with_cookies(&self, path: &str, jar: &CookieJar) -> Response {
        let mut request = self.client.get(self.url(path));
        if !jar.header().is_empty() {
            request = request.header(COOKIE, jar.header());
        }
        request.send().await.expect("Failed to execute request.")
    }

    pub async fn refresh(&self, jar: &CookieJar) -> Response {
        self.get_with_cookies("/api/account/refresh", jar).await
    }

    pub async fn logout(&self, jar: &CookieJar) -> Response {
        self.get_with_cookies("/api/account/logout", jar).await
    }

    pub async fn register(&self, body: &Value, token: Option<&str>) -> Response {
        let mut request = self.client.post(self.url("/api/account/register")).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request.")
    }
}
