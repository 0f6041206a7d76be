mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use serde_json::json;

const GUEST: &str = "guest-5b1f0c";

#[tokio::test]
async fn guest_cart_is_keyed_by_header() {
    let app = TestApp::new().await;

    let response = app
        .request_with_headers(
            Method::POST,
            "/api/cart/items",
            Some(json!({ "productId": "1", "quantity": 2 })),
            None,
            &[("x-guest-id", GUEST)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cart = response_json(response).await;
    assert_eq!(cart["itemCount"], 2);
    assert_eq!(cart["total"].as_f64(), Some(49.98));
    assert_eq!(cart["items"][0]["name"], "Nebula Orb");

    // A different guest sees an empty cart.
    let response = app
        .request_with_headers(Method::GET, "/api/cart", None, None, &[("x-guest-id", "someone-else")])
        .await;
    let other = response_json(response).await;
    assert_eq!(other["itemCount"], 0);
    assert_eq!(other["items"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn cart_needs_a_user_or_guest_identity() {
    let app = TestApp::new().await;

    let (status, body) = app.call(Method::GET, "/api/cart", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].as_str().unwrap().contains("x-guest-id"));
}

#[tokio::test]
async fn cart_never_holds_more_than_stock() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;

    // Seeded "Pixel Heart" has 8 in stock.
    let (status, _) = app
        .call(
            Method::POST,
            "/api/cart/items",
            Some(json!({ "productId": "4", "quantity": 6 })),
            Some(&shopper.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/cart/items",
            Some(json!({ "productId": "4", "quantity": 3 })),
            Some(&shopper.token),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, body) = app
        .call(
            Method::PUT,
            "/api/cart/items/4",
            Some(json!({ "quantity": 9 })),
            Some(&shopper.token),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (_, cart) = app.call(Method::GET, "/api/cart", None, Some(&shopper.token)).await;
    assert_eq!(cart["itemCount"], 6);
}

#[tokio::test]
async fn quantity_updates_and_removal() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let token = shopper.token.as_str();

    app.call(
        Method::POST,
        "/api/cart/items",
        Some(json!({ "productId": "3" })),
        Some(token),
    )
    .await;
    app.call(
        Method::POST,
        "/api/cart/items",
        Some(json!({ "productId": "7", "quantity": 2 })),
        Some(token),
    )
    .await;

    let (status, cart) = app
        .call(Method::PUT, "/api/cart/items/3", Some(json!({ "quantity": 4 })), Some(token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["itemCount"], 6);

    let (status, cart) = app
        .call(Method::PUT, "/api/cart/items/7", Some(json!({ "quantity": 0 })), Some(token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"].as_array().map(Vec::len), Some(1));

    let (status, cart) = app
        .call(Method::DELETE, "/api/cart/items/3", None, Some(token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["itemCount"], 0);

    let (status, _) = app
        .call(Method::PUT, "/api/cart/items/3", Some(json!({ "quantity": 1 })), Some(token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn adding_rejects_bad_quantities_and_unknown_products() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;

    let (status, _) = app
        .call(
            Method::POST,
            "/api/cart/items",
            Some(json!({ "productId": "1", "quantity": 0 })),
            Some(&shopper.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/cart/items",
            Some(json!({ "productId": "nope", "quantity": 1 })),
            Some(&shopper.token),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn paid_order_empties_the_buyers_cart() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;

    app.call(
        Method::POST,
        "/api/cart/items",
        Some(json!({ "productId": "2", "quantity": 2 })),
        Some(&shopper.token),
    )
    .await;
    let (_, order) = app.place_order(&shopper.token, &[("2", 2)], 37.0).await;
    let order_id = order["id"].as_str().unwrap();

    // Placing the order alone leaves the cart alone.
    let (_, cart) = app.call(Method::GET, "/api/cart", None, Some(&shopper.token)).await;
    assert_eq!(cart["itemCount"], 2);

    let intent = app.open_intent(&shopper.token, order_id).await;
    let (status, _) = app
        .finalize(&shopper.token, order_id, &intent, "pay_cart")
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, cart) = app.call(Method::GET, "/api/cart", None, Some(&shopper.token)).await;
    assert_eq!(cart["itemCount"], 0);
}

#[tokio::test]
async fn clearing_the_cart() {
    let app = TestApp::new().await;

    let headers = [("x-guest-id", GUEST)];
    app.request_with_headers(
        Method::POST,
        "/api/cart/items",
        Some(json!({ "productId": "6", "quantity": 1 })),
        None,
        &headers,
    )
    .await;

    let response = app
        .request_with_headers(Method::DELETE, "/api/cart", None, None, &headers)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cart = response_json(response).await;
    assert_eq!(cart["itemCount"], 0);
    assert_eq!(cart["total"].as_f64(), Some(0.0));
}
