//! Wallet linking through the HTTP surface.

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use stellar_ticketing::auth::Role;
use stellar_ticketing::crypto::{generate_keypair_strkeys, sign_with_seed};

use common::*;

async fn challenge(app: &axum::Router, public_key: &str) -> String {
    let (status, _, body) = send_request(
        app,
        Method::POST,
        "/api/v1/wallet/challenge",
        Some(json!({ "publicKey": public_key })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["message"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_link_wallet_over_http() {
    let h = Harness::new();
    let app = h.router();
    let user = h.add_user("holder@example.com").await;
    let token = h.token(&user.id, Role::Attendee);
    let (public_key, seed) = generate_keypair_strkeys();

    let message = challenge(&app, &public_key).await;
    let signature = sign_with_seed(&seed, message.as_bytes()).unwrap();

    let (status, _, body) = send_request(
        &app,
        Method::POST,
        "/api/v1/wallet/verify",
        Some(json!({ "publicKey": public_key, "signature": signature })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["stellarPublicKey"], public_key.as_str());

    // The challenge was consumed
    let (status, code, _) = send_request(
        &app,
        Method::POST,
        "/api/v1/wallet/verify",
        Some(json!({ "publicKey": public_key, "signature": signature })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code.as_deref(), Some("INVALID_REQUEST"));
}

#[tokio::test]
async fn test_wallet_cannot_be_linked_twice() {
    let h = Harness::new();
    let app = h.router();
    let first = h.add_user("first@example.com").await;
    let second = h.add_user("second@example.com").await;
    let (public_key, seed) = generate_keypair_strkeys();

    let message = challenge(&app, &public_key).await;
    let signature = sign_with_seed(&seed, message.as_bytes()).unwrap();
    h.wallets
        .verify_and_link(&first.id, &public_key, &signature)
        .await
        .unwrap();

    let message = challenge(&app, &public_key).await;
    let signature = sign_with_seed(&seed, message.as_bytes()).unwrap();
    let (status, code, _) = send_request(
        &app,
        Method::POST,
        "/api/v1/wallet/verify",
        Some(json!({ "publicKey": public_key, "signature": signature })),
        Some(&h.token(&second.id, Role::Attendee)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(code.as_deref(), Some("CONFLICT"));
}

#[tokio::test]
async fn test_challenge_rejects_bad_key() {
    let h = Harness::new();
    let app = h.router();

    let (status, code, _) = send_request(
        &app,
        Method::POST,
        "/api/v1/wallet/challenge",
        Some(json!({ "publicKey": "GNOTAKEY" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code.as_deref(), Some("INVALID_REQUEST"));
}
