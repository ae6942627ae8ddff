//! End-to-end flows over HTTP.
//!
//! Requires a running API server. Run with:
//! `cargo test -p marketplace-integration-tests -- --ignored`

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use marketplace_integration_tests::TestClient;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
#[ignore = "Requires running API server"]
async fn test_health() {
    let client = TestClient::new().unwrap();
    let (status, _) = client.get("/health").await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let (status, _) = client.get("/health/ready").await.unwrap();
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running API server"]
async fn test_register_me_logout() {
    let client = TestClient::new().unwrap();
    let (status, user) = client.register("customer").await.unwrap();
    assert_eq!(status, StatusCode::CREATED);

    let (status, me) = client.get("/api/auth/me").await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], user["id"]);

    let (status, _) = client.post("/api/auth/logout", &json!({})).await.unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = client.get("/api/auth/me").await.unwrap();
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running API server"]
async fn test_affiliate_sale_flow() {
    let seller = TestClient::new().unwrap();
    let affiliate = TestClient::new().unwrap();
    let buyer = TestClient::new().unwrap();
    seller.register("seller").await.unwrap();
    let (_, aff) = affiliate.register("affiliate").await.unwrap();
    buyer.register("customer").await.unwrap();

    let (status, product) = seller
        .post(
            "/api/products",
            &json!({ "title": "Integration Tee", "category": "Tops",
                     "regular_price": "20.00", "stock": 2 }),
        )
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CREATED);

    let (status, claim) = affiliate
        .post(
            "/api/affiliate/claims",
            &json!({ "product_id": product["id"], "sale_price": "25.00" }),
        )
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CREATED);

    let (status, storefront) = buyer
        .get(&format!("/api/storefronts/{}", aff["id"].as_str().unwrap()))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(storefront["items"][0]["display_price"], "25.00");

    let (status, _) = buyer
        .post(
            "/api/cart/items",
            &json!({ "product_id": product["id"], "claim_id": claim["id"], "quantity": 2 }),
        )
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    let (status, order) = buyer.post("/api/orders", &json!({})).await.unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["total"], "50.00");

    let (status, paid) = seller
        .patch(
            &format!("/api/orders/{}/status", order["id"].as_str().unwrap()),
            &json!({ "status": "paid" }),
        )
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "paid");

    let (_, earned) = affiliate.get("/api/affiliate/orders").await.unwrap();
    assert_eq!(earned[0]["commission"], "10.00");
}
