//! Router tests over the in-memory store.
//!
//! Each test builds the full application (middleware included) and drives
//! it with `tower::ServiceExt::oneshot`, carrying the session cookie between
//! requests like a browser would.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use marketplace_api::config::MarketplaceConfig;
use marketplace_api::db::MemoryStore;
use marketplace_api::state::AppState;

fn app() -> Router {
    let config = MarketplaceConfig::for_memory("http://localhost:3000");
    let state = AppState::new(config, Arc::new(MemoryStore::new()));
    marketplace_api::app(state, tower_sessions::MemoryStore::default())
}

/// A client with its own cookie jar against a shared app.
struct Client {
    app: Router,
    cookie: Option<String>,
}

impl Client {
    fn new(app: &Router) -> Self {
        Self {
            app: app.clone(),
            cookie: None,
        }
    }

    async fn send(&mut self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
            self.cookie = Some(pair.to_string());
        }

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn get(&mut self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    async fn post(&mut self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body)).await
    }

    async fn register(&mut self, email: &str, role: &str) -> Value {
        let (status, user) = self
            .post(
                "/api/auth/register",
                json!({
                    "email": email,
                    "password": "long enough password",
                    "display_name": email.split('@').next().unwrap(),
                    "role": role,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{user}");
        user
    }

    async fn create_product(&mut self, title: &str, price: &str, stock: u32) -> Value {
        let (status, product) = self
            .post(
                "/api/products",
                json!({
                    "title": title,
                    "category": "Shirts",
                    "regular_price": price,
                    "stock": stock,
                    "colors": ["Red", "Blue"],
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{product}");
        product
    }
}

#[tokio::test]
async fn test_health_and_headers() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");

    let response = app()
        .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_session_lifecycle() {
    let app = app();
    let mut client = Client::new(&app);

    let (status, body) = client.get("/api/auth/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    client.register("ada@shop.io", "customer").await;
    let (status, me) = client.get("/api/auth/me").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "ada@shop.io");
    assert_eq!(me["role"], "customer");

    let (status, _) = client
        .send(
            Method::PUT,
            "/api/account/profile",
            Some(json!({ "phone": "555-0100", "display_name": "Ada L." })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, me) = client.get("/api/auth/me").await;
    assert_eq!(me["display_name"], "Ada L.");

    let (status, _) = client.post("/api/auth/logout", json!({})).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = client.get("/api/auth/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = client
        .post(
            "/api/auth/login",
            json!({ "email": "ada@shop.io", "password": "wrong password" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, user) = client
        .post(
            "/api/auth/login",
            json!({ "email": "ada@shop.io", "password": "long enough password" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["phone"], "555-0100");
}

#[tokio::test]
async fn test_registration_rules() {
    let app = app();
    let mut client = Client::new(&app);

    let (status, _) = client
        .post(
            "/api/auth/register",
            json!({ "email": "root@shop.io", "password": "long enough password",
                    "display_name": "Root", "role": "admin" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = client
        .post(
            "/api/auth/register",
            json!({ "email": "ada@shop.io", "password": "short", "display_name": "Ada" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    client.register("ada@shop.io", "customer").await;
    let (status, _) = Client::new(&app)
        .post(
            "/api/auth/register",
            json!({ "email": "ADA@shop.io", "password": "long enough password",
                    "display_name": "Other" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_product_permissions_and_listing() {
    let app = app();
    let mut anon = Client::new(&app);
    let mut customer = Client::new(&app);
    let mut seller = Client::new(&app);
    customer.register("cara@shop.io", "customer").await;
    seller.register("sam@shop.io", "seller").await;

    let draft = json!({ "title": "Tee", "category": "Shirts", "regular_price": "10.00" });
    assert_eq!(
        anon.post("/api/products", draft.clone()).await.0,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        customer.post("/api/products", draft).await.0,
        StatusCode::FORBIDDEN
    );

    // Prices beyond what a NUMERIC(14, 2) column holds never reach the store.
    let (status, _) = seller
        .post(
            "/api/products",
            json!({ "title": "Tee", "category": "Shirts",
                    "regular_price": "1000000000000.00" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let tee = seller.create_product("Tee", "10.00", 5).await;
    seller.create_product("Hoodie", "45.00", 0).await;
    seller.create_product("Cap", "15.00", 2).await;

    let (status, page) = anon.get("/api/products?sort=price_asc&per_page=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_items"], 3);
    assert_eq!(page["total_pages"], 2);
    assert_eq!(page["has_next"], true);
    assert_eq!(page["items"][0]["title"], "Tee");
    assert_eq!(page["items"][1]["title"], "Cap");
    assert_eq!(page["facets"]["categories"], json!(["Shirts"]));

    let (_, page) = anon.get("/api/products?price=20%2B&in_stock=true").await;
    assert_eq!(page["total_items"], 0);
    let (_, page) = anon.get("/api/products?q=hood&page=9").await;
    assert_eq!(page["page"], 1);
    assert_eq!(page["items"][0]["title"], "Hoodie");

    let (status, _) = anon.get("/api/products?price=cheap").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let id = tee["id"].as_str().unwrap();
    let (status, _) = customer
        .send(Method::DELETE, &format!("/api/products/{id}"), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = seller
        .send(
            Method::PUT,
            &format!("/api/products/{id}"),
            Some(json!({ "title": "Better Tee", "category": "Shirts",
                         "regular_price": "12.00", "stock": 5 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Better Tee");

    // Writes invalidate the catalog cache
    let (_, page) = anon.get("/api/products?q=better").await;
    assert_eq!(page["total_items"], 1);

    let (status, _) = seller
        .send(Method::DELETE, &format!("/api/products/{id}"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = anon.get(&format!("/api/products/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, own) = seller.get("/api/seller/products").await;
    assert_eq!(own["total_items"], 2);
}

#[tokio::test]
async fn test_claims_storefront_and_checkout() {
    let app = app();
    let mut seller = Client::new(&app);
    let mut affiliate = Client::new(&app);
    let mut buyer = Client::new(&app);
    seller.register("sam@shop.io", "seller").await;
    let aff = affiliate.register("alex@shop.io", "affiliate").await;
    buyer.register("bo@shop.io", "customer").await;

    let tee = seller.create_product("Tee", "20.00", 3).await;
    let tee_id = tee["id"].as_str().unwrap();

    // Markup rule
    let (status, _) = affiliate
        .post(
            "/api/affiliate/claims",
            json!({ "product_id": tee_id, "sale_price": "20.00" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, claim) = affiliate
        .post(
            "/api/affiliate/claims",
            json!({ "product_id": tee_id, "sale_price": "26.00", "title": "Staff pick tee" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{claim}");

    // One claim per product
    let (status, _) = affiliate
        .post(
            "/api/affiliate/claims",
            json!({ "product_id": tee_id, "sale_price": "30.00" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, available) = affiliate.get("/api/affiliate/available-products").await;
    assert_eq!(available["total_items"], 0);

    let aff_id = aff["id"].as_str().unwrap();
    let (status, storefront) = buyer.get(&format!("/api/storefronts/{aff_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(storefront["affiliate"]["display_name"], "alex");
    assert_eq!(storefront["items"][0]["display_title"], "Staff pick tee");
    assert_eq!(storefront["items"][0]["display_price"], "26.00");

    // Buy two through the storefront
    let (status, cart) = buyer
        .post(
            "/api/cart/items",
            json!({ "product_id": tee_id, "claim_id": claim["id"], "color": "red", "quantity": 2 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{cart}");
    assert_eq!(cart["subtotal"], "52.00");
    assert_eq!(cart["lines"][0]["color"], "Red");

    let (status, order) = buyer.post("/api/orders", json!({})).await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["status"], "pending");
    assert_eq!(order["total"], "52.00");

    let (_, cart) = buyer.get("/api/cart").await;
    assert_eq!(cart["item_count"], 0);

    let (_, detail) = buyer.get(&format!("/api/products/{tee_id}")).await;
    assert_eq!(detail["stock"], 1);
    assert_eq!(detail["sales"], 2);

    // Not enough left for two more
    buyer
        .post("/api/cart/items", json!({ "product_id": tee_id, "color": "Blue", "quantity": 2 }))
        .await;
    let (status, _) = buyer.post("/api/orders", json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, earned) = affiliate.get("/api/affiliate/orders").await;
    assert_eq!(earned[0]["commission"], "12.00");
    let (_, sold) = seller.get("/api/seller/orders").await;
    assert_eq!(sold.as_array().unwrap().len(), 1);
    let (_, mine) = buyer.get("/api/orders").await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_order_status_machine() {
    let app = app();
    let mut seller = Client::new(&app);
    let mut buyer = Client::new(&app);
    seller.register("sam@shop.io", "seller").await;
    buyer.register("bo@shop.io", "customer").await;

    let cap = seller.create_product("Cap", "15.00", 4).await;
    buyer
        .post(
            "/api/cart/items",
            json!({ "product_id": cap["id"], "color": "Blue" }),
        )
        .await;
    let (_, order) = buyer.post("/api/orders", json!({})).await;
    let status_uri = format!("/api/orders/{}/status", order["id"].as_str().unwrap());

    let (status, _) = buyer
        .send(Method::PATCH, &status_uri, Some(json!({ "status": "paid" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, paid) = seller
        .send(Method::PATCH, &status_uri, Some(json!({ "status": "paid" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "paid");

    let (status, _) = seller
        .send(Method::PATCH, &status_uri, Some(json!({ "status": "delivered" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Buyers may only cancel while pending
    let (status, _) = buyer
        .send(Method::PATCH, &status_uri, Some(json!({ "status": "cancelled" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = seller
        .send(Method::PATCH, &status_uri, Some(json!({ "status": "cancelled" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, detail) = buyer
        .get(&format!("/api/products/{}", cap["id"].as_str().unwrap()))
        .await;
    assert_eq!(detail["stock"], 4);
}

#[tokio::test]
async fn test_favorites_are_idempotent() {
    let app = app();
    let mut seller = Client::new(&app);
    let mut user = Client::new(&app);
    seller.register("sam@shop.io", "seller").await;
    user.register("fay@shop.io", "customer").await;
    let tee = seller.create_product("Tee", "10.00", 1).await;
    let uri = format!("/api/favorites/{}", tee["id"].as_str().unwrap());

    for _ in 0..2 {
        let (status, state) = user.send(Method::PUT, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state["favorited"], true);
    }
    let (_, page) = user.get("/api/favorites").await;
    assert_eq!(page["total_items"], 1);

    for _ in 0..2 {
        let (status, state) = user.send(Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state["favorited"], false);
    }
    let (_, page) = user.get("/api/favorites").await;
    assert_eq!(page["total_items"], 0);

    let (status, _) = user
        .send(
            Method::PUT,
            "/api/favorites/00000000-0000-4000-8000-000000000000",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reviews() {
    let app = app();
    let mut seller = Client::new(&app);
    let mut reviewer = Client::new(&app);
    seller.register("sam@shop.io", "seller").await;
    reviewer.register("rae@shop.io", "customer").await;
    let tee = seller.create_product("Tee", "10.00", 1).await;
    let uri = format!("/api/products/{}/reviews", tee["id"].as_str().unwrap());

    let (status, _) = reviewer.post(&uri, json!({ "rating": 6 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = seller.post(&uri, json!({ "rating": 5 })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, review) = reviewer
        .post(&uri, json!({ "rating": 4, "comment": " Soft fabric " }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(review["comment"], "Soft fabric");
    assert_eq!(review["author_name"], "rae");

    let (status, _) = reviewer.post(&uri, json!({ "rating": 2 })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, listed) = reviewer.get(&uri).await;
    assert_eq!(listed["rating"]["count"], 1);
    assert_eq!(listed["reviews"].as_array().unwrap().len(), 1);

    let (_, detail) = reviewer
        .get(&format!("/api/products/{}", tee["id"].as_str().unwrap()))
        .await;
    assert_eq!(detail["rating"]["count"], 1);
}

#[tokio::test]
async fn test_media_signature_requires_role_and_config() {
    let app = app();
    let mut customer = Client::new(&app);
    let mut seller = Client::new(&app);
    customer.register("cara@shop.io", "customer").await;
    seller.register("sam@shop.io", "seller").await;

    let (status, _) = customer.post("/api/media/signature", json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = seller.post("/api/media/signature", json!({})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "media uploads are not configured");
}
