//! Integration tests for the marketplace API.
//!
//! These run over real HTTP against a server started separately, so they
//! are `#[ignore]`d by default.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the API (memory storage needs no database)
//! MARKETPLACE_STORAGE=memory cargo run -p marketplace-api
//!
//! # Run the ignored tests
//! cargo test -p marketplace-integration-tests -- --ignored
//! ```
//!
//! `MARKETPLACE_TEST_URL` overrides the default `http://localhost:3000`.

use reqwest::{Client, Response, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

/// Password used for every account the tests register.
pub const TEST_PASSWORD: &str = "integration-test-password";

/// Base URL of the server under test.
#[must_use]
pub fn base_url() -> String {
    std::env::var("MARKETPLACE_TEST_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// An email address no earlier run has used.
#[must_use]
pub fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@test.local", Uuid::new_v4().simple())
}

/// One browser-like session: its own cookie jar against the server.
pub struct TestClient {
    pub client: Client,
    pub base_url: String,
}

impl TestClient {
    /// Build a client with an empty cookie jar.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> reqwest::Result<Self> {
        Ok(Self {
            client: Client::builder().cookie_store(true).build()?,
            base_url: base_url(),
        })
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// GET a path and decode the JSON body (`Null` when empty).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get(&self, path: &str) -> reqwest::Result<(StatusCode, Value)> {
        decode(self.client.get(self.url(path)).send().await?).await
    }

    /// POST a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn post(&self, path: &str, body: &Value) -> reqwest::Result<(StatusCode, Value)> {
        decode(self.client.post(self.url(path)).json(body).send().await?).await
    }

    /// PATCH a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn patch(&self, path: &str, body: &Value) -> reqwest::Result<(StatusCode, Value)> {
        decode(self.client.patch(self.url(path)).json(body).send().await?).await
    }

    /// Register a fresh account with `role` and keep its session.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn register(&self, role: &str) -> reqwest::Result<(StatusCode, Value)> {
        let email = unique_email(role);
        self.post(
            "/api/auth/register",
            &json!({
                "email": email,
                "password": TEST_PASSWORD,
                "display_name": format!("Test {role}"),
                "role": role,
            }),
        )
        .await
    }
}

async fn decode(response: Response) -> reqwest::Result<(StatusCode, Value)> {
    let status = response.status();
    let text = response.text().await?;
    Ok((status, serde_json::from_str(&text).unwrap_or(Value::Null)))
}
