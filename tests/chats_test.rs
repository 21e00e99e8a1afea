//! Integration tests for DM chat creation and listing:
//! find-or-create semantics, participant listings, and the
//! unknown-user / self-chat error paths.

use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Helper: start the server on a random port and return (base_url, addr).
async fn start_test_server() -> (String, SocketAddr) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = parley_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = parley_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let state = parley_server::state::AppState {
        db,
        jwt_secret,
        hub: parley_server::ws::FanoutHub::new(),
        data_dir: data_dir.clone(),
        access_token_expire_minutes: 60,
        max_upload_size_mb: 10,
    };

    let app = parley_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    let base_url = format!("http://{}", addr);
    (base_url, addr)
}

/// Register a user and log them in, returning (user_id, access_token).
async fn register_and_login(base_url: &str, username: &str) -> (i64, String) {
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/register", base_url))
        .json(&json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "hunter2hunter2",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200, "Registration failed for {}", username);
    let body: serde_json::Value = resp.json().await.unwrap();
    let user_id = body["user"]["id"].as_i64().expect("Expected user id");

    let resp = client
        .post(format!("{}/login", base_url))
        .json(&json!({
            "username": username,
            "password": "hunter2hunter2",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200, "Login failed for {}", username);
    let body: serde_json::Value = resp.json().await.unwrap();
    let access_token = body["access_token"].as_str().unwrap().to_string();

    (user_id, access_token)
}

#[tokio::test]
async fn test_create_chat_returns_participants() {
    let (base_url, _addr) = start_test_server().await;
    let (alice_id, alice_token) = register_and_login(&base_url, "alice").await;
    let (bob_id, _bob_token) = register_and_login(&base_url, "bob").await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/chats", base_url))
        .header("Authorization", format!("Bearer {}", alice_token))
        .json(&json!({ "username": "bob" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 201, "Chat creation failed");
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["chat_id"].as_i64().unwrap() > 0);

    let participants = body["participants"].as_array().unwrap();
    assert_eq!(participants.len(), 2);
    let ids: Vec<i64> = participants
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert!(ids.contains(&alice_id));
    assert!(ids.contains(&bob_id));
}

#[tokio::test]
async fn test_existing_chat_returned_for_either_caller() {
    let (base_url, _addr) = start_test_server().await;
    let (_alice_id, alice_token) = register_and_login(&base_url, "alice").await;
    let (_bob_id, bob_token) = register_and_login(&base_url, "bob").await;

    let client = reqwest::Client::new();

    // First creation
    let resp = client
        .post(format!("{}/chats", base_url))
        .header("Authorization", format!("Bearer {}", alice_token))
        .json(&json!({ "username": "bob" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    let chat_id = body["chat_id"].as_i64().unwrap();

    // Same pair from the other side finds the existing chat
    let resp = client
        .post(format!("{}/chats", base_url))
        .header("Authorization", format!("Bearer {}", bob_token))
        .json(&json!({ "username": "alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["chat_id"].as_i64().unwrap(), chat_id);
    assert_eq!(body["message"].as_str().unwrap(), "Chat already exists");

    // And again from the original caller
    let resp = client
        .post(format!("{}/chats", base_url))
        .header("Authorization", format!("Bearer {}", alice_token))
        .json(&json!({ "username": "bob" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["chat_id"].as_i64().unwrap(), chat_id);
}

#[tokio::test]
async fn test_chat_with_unknown_user_is_404() {
    let (base_url, _addr) = start_test_server().await;
    let (_alice_id, alice_token) = register_and_login(&base_url, "alice").await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/chats", base_url))
        .header("Authorization", format!("Bearer {}", alice_token))
        .json(&json!({ "username": "ghost" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_chat_with_self_is_rejected() {
    let (base_url, _addr) = start_test_server().await;
    let (_alice_id, alice_token) = register_and_login(&base_url, "alice").await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/chats", base_url))
        .header("Authorization", format!("Bearer {}", alice_token))
        .json(&json!({ "username": "alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_chats_require_auth() {
    let (base_url, _addr) = start_test_server().await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/chats", base_url))
        .json(&json!({ "username": "bob" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(format!("{}/chats", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_list_chats_shows_participants_for_both_sides() {
    let (base_url, _addr) = start_test_server().await;
    let (_alice_id, alice_token) = register_and_login(&base_url, "alice").await;
    let (_bob_id, bob_token) = register_and_login(&base_url, "bob").await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/chats", base_url))
        .header("Authorization", format!("Bearer {}", alice_token))
        .json(&json!({ "username": "bob" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    let chat_id = body["chat_id"].as_i64().unwrap();

    for token in [&alice_token, &bob_token] {
        let resp = client
            .get(format!("{}/chats", base_url))
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        let chats = body["chats"].as_array().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0]["chat_id"].as_i64().unwrap(), chat_id);

        let usernames: Vec<&str> = chats[0]["participants"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["username"].as_str().unwrap())
            .collect();
        assert!(usernames.contains(&"alice"), "Missing alice in {:?}", usernames);
        assert!(usernames.contains(&"bob"), "Missing bob in {:?}", usernames);
    }
}
