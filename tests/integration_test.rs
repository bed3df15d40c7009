// Integration tests for the quiz live server
// In-process tests drive the real warp routes through `warp::test::ws()`;
// tests marked #[ignore] need a server running on 127.0.0.1:8080.

use std::sync::Arc;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::time::{timeout, Duration};
use warp::test::WsClient;

use quiz_live::api::game_routes;
use quiz_live::auth::{Claims, CredentialVerifier, JwtVerifier};
use quiz_live::game::GameCoordinator;

const SECRET: &str = "integration-secret";

fn token(user_id: Option<&str>, role: &str) -> String {
    let claims = Claims {
        id: user_id.map(str::to_string),
        role: Some(role.to_string()),
        school_id: Some("school-1".to_string()),
        exp: 4_102_444_800,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn server() -> (
    Arc<GameCoordinator>,
    impl warp::Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone + 'static,
) {
    let coordinator = GameCoordinator::new();
    let verifier: Arc<dyn CredentialVerifier> = Arc::new(JwtVerifier::new(SECRET));
    let routes = game_routes::routes(coordinator.clone(), verifier);
    (coordinator, routes)
}

async fn recv_event(client: &mut WsClient) -> Value {
    let message = timeout(Duration::from_secs(2), client.recv())
        .await
        .expect("timed out waiting for event")
        .expect("websocket closed");
    serde_json::from_str(message.to_str().expect("text frame")).unwrap()
}

/// Reads events until one named `name` arrives.
async fn recv_until(client: &mut WsClient, name: &str) -> Value {
    for _ in 0..32 {
        let event = recv_event(client).await;
        if event["event"] == name {
            return event;
        }
    }
    panic!("never received {}", name);
}

async fn send(client: &mut WsClient, event: Value) {
    client.send_text(event.to_string()).await;
}

#[tokio::test]
async fn test_handshake_without_credential_is_refused() {
    let (coordinator, routes) = server();

    let result = warp::test::ws().path("/game").handshake(routes).await;
    assert!(result.is_err(), "upgrade must be refused without a credential");
    assert_eq!(coordinator.stats().await.connections, 0);
}

#[tokio::test]
async fn test_handshake_with_forged_credential_is_refused() {
    let (_coordinator, routes) = server();
    let forged = encode(
        &Header::new(Algorithm::HS256),
        &json!({ "id": "mallory", "exp": 4_102_444_800u64 }),
        &EncodingKey::from_secret(b"wrong-secret"),
    )
    .unwrap();

    let result = warp::test::ws()
        .path(&format!("/game?token={}", forged))
        .handshake(routes)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_missing_credential_returns_401_over_http() {
    let (_coordinator, routes) = server();

    let resp = warp::test::request()
        .path("/game")
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
        .reply(&routes)
        .await;
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_bearer_header_is_accepted() {
    let (coordinator, routes) = server();

    let mut client = warp::test::ws()
        .path("/game")
        .header("authorization", format!("Bearer {}", token(Some("student-1"), "student")))
        .handshake(routes)
        .await
        .expect("handshake");

    send(&mut client, json!({ "event": "joinGame", "data": "R1" })).await;
    let list = recv_event(&mut client).await;
    assert_eq!(list["event"], "participantsList");
    assert_eq!(list["data"][0]["userId"], "student-1");
    assert_eq!(coordinator.stats().await.rooms, 1);
}

#[tokio::test]
async fn test_join_answer_validate_scenario() {
    let (coordinator, routes) = server();

    // Scenario A: first join creates the room.
    let mut student = warp::test::ws()
        .path(&format!("/game?token={}", token(Some("student-1"), "student")))
        .handshake(routes.clone())
        .await
        .expect("student handshake");
    send(&mut student, json!({ "event": "joinGame", "data": "R1" })).await;

    let participants = recv_event(&mut student).await;
    assert_eq!(participants["event"], "participantsList");
    assert_eq!(participants["data"].as_array().unwrap().len(), 1);
    let scores = recv_event(&mut student).await;
    assert_eq!(scores["data"], json!([{ "userId": "student-1", "score": 0 }]));
    let answers = recv_event(&mut student).await;
    assert_eq!(answers["event"], "answersList");
    let history = recv_event(&mut student).await;
    assert_eq!(history["event"], "chatHistory");
    assert_eq!(history["data"], json!([]));

    // Scenario B: a pending answer.
    send(
        &mut student,
        json!({ "event": "sendAnswer", "data": { "gameId": "R1", "answer": "42" } }),
    )
    .await;
    let new_answer = recv_event(&mut student).await;
    assert_eq!(new_answer["event"], "newAnswer");
    assert_eq!(new_answer["data"]["status"], "pending");
    let answers = recv_event(&mut student).await;
    assert_eq!(answers["data"].as_array().unwrap().len(), 1);
    let answer_id = new_answer["data"]["id"].as_str().unwrap().to_string();

    // Scenario C: the teacher validates it for 15 points.
    let mut teacher = warp::test::ws()
        .path(&format!("/game?token={}", token(Some("teacher-1"), "teacher")))
        .handshake(routes)
        .await
        .expect("teacher handshake");
    send(&mut teacher, json!({ "event": "joinGame", "data": "R1" })).await;
    let joined = recv_until(&mut student, "userJoined").await;
    assert_eq!(joined["data"]["userId"], "teacher-1");

    send(
        &mut teacher,
        json!({
            "event": "validateAnswer",
            "data": { "gameId": "R1", "answerId": answer_id, "isCorrect": true, "points": 15 }
        }),
    )
    .await;

    let update = recv_until(&mut student, "scoreUpdated").await;
    assert_eq!(update["data"]["userId"], "student-1");
    assert_eq!(update["data"]["totalScore"], 15);
    let validated = recv_event(&mut student).await;
    assert_eq!(validated["event"], "answerValidated");
    assert_eq!(validated["data"]["isCorrect"], true);
    let scores = recv_event(&mut student).await;
    assert_eq!(scores["event"], "scoresList");
    let answers = recv_event(&mut student).await;
    assert_eq!(answers["data"][0]["status"], "correct");

    let room = coordinator.registry().get("R1").await.unwrap();
    assert_eq!(room.lock().await.score("student-1"), Some(15));
}

#[tokio::test]
async fn test_disconnect_without_leave_is_swept() {
    let (coordinator, routes) = server();

    let mut first = warp::test::ws()
        .path(&format!("/game?token={}", token(Some("student-1"), "student")))
        .handshake(routes.clone())
        .await
        .expect("handshake");
    let mut second = warp::test::ws()
        .path(&format!("/game?token={}", token(Some("student-2"), "student")))
        .handshake(routes)
        .await
        .expect("handshake");

    send(&mut first, json!({ "event": "joinGame", "data": "R1" })).await;
    recv_until(&mut first, "chatHistory").await;
    send(&mut second, json!({ "event": "joinGame", "data": "R1" })).await;
    recv_until(&mut second, "chatHistory").await;

    // Scenario D: the first client drops without leaveGame.
    drop(first);

    let left = recv_until(&mut second, "userLeft").await;
    assert_eq!(left["data"]["userId"], "student-1");

    let room = coordinator.registry().get("R1").await.unwrap();
    let listed = room.lock().await.participants_list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].user_id, "student-2");
}

#[tokio::test]
async fn test_extreme_score_deltas_keep_connection_and_cleanup_intact() {
    let (coordinator, routes) = server();

    let mut observer = warp::test::ws()
        .path(&format!("/game?token={}", token(Some("observer"), "teacher")))
        .handshake(routes.clone())
        .await
        .expect("handshake");
    let mut scorer = warp::test::ws()
        .path(&format!("/game?token={}", token(Some("scorer"), "student")))
        .handshake(routes)
        .await
        .expect("handshake");

    send(&mut observer, json!({ "event": "joinGame", "data": "R4" })).await;
    recv_until(&mut observer, "chatHistory").await;
    send(&mut scorer, json!({ "event": "joinGame", "data": "R4" })).await;
    recv_until(&mut scorer, "chatHistory").await;

    let update = json!({
        "event": "updateScore",
        "data": { "gameId": "R4", "userId": "scorer", "score": i64::MAX }
    });
    send(&mut scorer, update.clone()).await;
    send(&mut scorer, update).await;

    recv_until(&mut scorer, "scoreUpdated").await;
    let second = recv_until(&mut scorer, "scoreUpdated").await;
    assert_eq!(second["data"]["totalScore"], i64::MAX);

    drop(scorer);
    let left = recv_until(&mut observer, "userLeft").await;
    assert_eq!(left["data"]["userId"], "scorer");

    let room = coordinator.registry().get("R4").await.unwrap();
    assert_eq!(room.lock().await.participants_list().len(), 1);

    let mut connections = coordinator.stats().await.connections;
    for _ in 0..50 {
        if connections == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        connections = coordinator.stats().await.connections;
    }
    assert_eq!(connections, 1);
}

#[tokio::test]
async fn test_anonymous_credential_gets_guest_identity() {
    let (_coordinator, routes) = server();

    let mut client = warp::test::ws()
        .path(&format!("/game?token={}", token(None, "guest")))
        .handshake(routes)
        .await
        .expect("handshake");

    send(&mut client, json!({ "event": "joinGame", "data": "R1" })).await;
    let list = recv_event(&mut client).await;
    let user_id = list["data"][0]["userId"].as_str().unwrap();
    assert!(user_id.starts_with("guest-"), "unexpected identity {}", user_id);
}

#[tokio::test]
async fn test_malformed_event_reports_error_and_keeps_connection() {
    let (_coordinator, routes) = server();

    let mut client = warp::test::ws()
        .path(&format!("/game?token={}", token(Some("student-1"), "student")))
        .handshake(routes)
        .await
        .expect("handshake");

    send(&mut client, json!({ "event": "sendAnswer", "data": { "answer": "no game" } })).await;
    let error = recv_event(&mut client).await;
    assert_eq!(error["event"], "error");
    assert!(error["data"]["message"].as_str().unwrap().contains("gameId"));

    send(&mut client, json!({ "event": "joinGame", "data": "R1" })).await;
    assert_eq!(recv_event(&mut client).await["event"], "participantsList");
}

#[tokio::test]
async fn test_chat_and_typing_round_trip() {
    let (_coordinator, routes) = server();

    let mut alice = warp::test::ws()
        .path(&format!("/game?token={}", token(Some("alice"), "student")))
        .handshake(routes.clone())
        .await
        .expect("handshake");
    let mut bob = warp::test::ws()
        .path(&format!("/game?token={}", token(Some("bob"), "student")))
        .handshake(routes)
        .await
        .expect("handshake");

    send(&mut alice, json!({ "event": "joinGame", "data": "R3" })).await;
    recv_until(&mut alice, "chatHistory").await;
    send(&mut bob, json!({ "event": "joinGame", "data": "R3" })).await;
    recv_until(&mut bob, "chatHistory").await;
    recv_until(&mut alice, "userJoined").await;

    send(&mut alice, json!({ "event": "typing", "data": { "gameId": "R3", "userId": "bob" } })).await;
    let typing = recv_event(&mut bob).await;
    assert_eq!(typing["event"], "userTyping");
    assert_eq!(typing["data"]["userId"], "alice");

    send(&mut alice, json!({ "event": "sendMessage", "data": { "gameId": "R3", "content": "hi" } }))
        .await;
    let message = recv_event(&mut bob).await;
    assert_eq!(message["event"], "newMessage");
    assert_eq!(message["data"]["content"], "hi");
    assert_eq!(message["data"]["status"], "sent");
    let message_id = message["data"]["id"].as_str().unwrap().to_string();
    recv_until(&mut alice, "newMessage").await;

    send(
        &mut bob,
        json!({ "event": "markMessageAsRead", "data": { "gameId": "R3", "messageId": message_id } }),
    )
    .await;
    let read = recv_event(&mut alice).await;
    assert_eq!(read["event"], "messageRead");
    assert_eq!(read["data"]["userId"], "bob");
}

/// Test HTTP health check endpoint against a running server
#[tokio::test]
#[ignore] // Requires running server
async fn test_health_endpoint_live() {
    let url = "http://127.0.0.1:8080/game/health";
    let client = reqwest::Client::new();

    match client.get(url).send().await {
        Ok(resp) => {
            assert_eq!(resp.status(), 200, "Health endpoint should return 200 OK");
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body["status"], "healthy");
        }
        Err(e) => {
            eprintln!("Server not running: {}. Start server with 'cargo run' before running integration tests.", e);
            panic!("Cannot connect to server");
        }
    }
}

/// Test that a live server refuses an unauthenticated upgrade
#[tokio::test]
#[ignore] // Requires running server
async fn test_websocket_requires_credential_live() {
    let result = tokio_tungstenite::connect_async("ws://127.0.0.1:8080/game").await;
    assert!(result.is_err(), "Upgrade without a credential should be refused");
}
