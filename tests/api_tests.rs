// tests/api_tests.rs

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use quizroom::{
    config::Config,
    models::{
        question::{Question, QuestionStatus},
        quiz::{Quiz, QuizState, UserProfile},
    },
    persistence::MemoryPersistence,
    routes,
    state::AppState,
    store::MemoryStore,
    utils::jwt::sign_jwt,
};
use serde_json::{Value, json};
use tokio_tungstenite::{connect_async, tungstenite::Message};

const SECRET: &str = "test_secret_for_integration_tests";

struct TestApp {
    address: String,
    ws_address: String,
}

/// Helper function to spawn the app on a random port for testing.
/// Uses the in-memory store and persistence, seeded with one quiz owned by `host`.
async fn spawn_app() -> TestApp {
    // 1. Seed persistence
    let db = MemoryPersistence::new();
    db.insert_quiz(Quiz {
        id: "quiz-1".to_string(),
        title: "Rust basics".to_string(),
        owner_id: "host".to_string(),
        state: QuizState::YetToStart,
        questions: vec![Question {
            id: "q1".to_string(),
            question: "Which keyword declares an immutable binding?".to_string(),
            options: vec!["var".to_string(), "let".to_string(), "mut".to_string()],
            answer_index: 1,
            marks: 10.0,
            time_limit: 2,
            status: QuestionStatus::Pending,
        }],
    })
    .await;
    for id in ["host", "alice"] {
        db.insert_user(UserProfile {
            id: id.to_string(),
            first_name: id.to_string(),
            last_name: "Tester".to_string(),
            email: format!("{id}@example.com"),
            avatar: None,
        })
        .await;
    }

    // 2. Create test configuration and state
    let config = Config {
        redis_url: String::new(),
        database_url: String::new(),
        jwt_secret: SECRET.to_string(),
        rust_log: "error".to_string(),
        port: 0,
        start_countdown_secs: 0,
        question_grace_secs: 0,
        leaderboard_top_n: 10,
        retention_secs: 60,
    };
    let state = AppState::new(Arc::new(MemoryStore::new()), Arc::new(db), config);

    // 3. Create the router with the app state
    let app = routes::create_router(state);

    // 4. Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    // 5. Spawn the server in the background
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        ws_address: format!("ws://127.0.0.1:{}/ws", port),
    }
}

fn token_for(user_id: &str) -> String {
    sign_jwt(user_id, "user", SECRET, 600).unwrap()
}

type Socket = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn open_socket(app: &TestApp, user_id: &str) -> Socket {
    let url = format!("{}?token={}", app.ws_address, token_for(user_id));
    let (socket, _) = connect_async(url).await.expect("WebSocket handshake failed");
    socket
}

async fn send_frame(socket: &mut Socket, frame: Value) {
    socket
        .send(Message::text(frame.to_string()))
        .await
        .expect("Failed to send frame");
}

/// Reads frames until one of type `kind` arrives.
async fn expect_frame(socket: &mut Socket, kind: &str) -> Value {
    let read = async {
        while let Some(message) = socket.next().await {
            let message = message.expect("WebSocket error");
            if let Ok(text) = message.to_text() {
                if text.is_empty() {
                    continue;
                }
                let frame: Value = serde_json::from_str(text).expect("Server sent invalid JSON");
                if frame["type"] == kind {
                    return frame;
                }
            }
        }
        panic!("Socket closed before {kind}");
    };
    tokio::time::timeout(Duration::from_secs(10), read)
        .await
        .unwrap_or_else(|_| panic!("Timed out waiting for {kind}"))
}

async fn join(socket: &mut Socket, user_id: &str) {
    send_frame(
        socket,
        json!({ "type": "JOIN_ROOM", "payload": { "quizId": "quiz-1", "userId": user_id } }),
    )
    .await;
}

#[tokio::test]
async fn health_check_404() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(&format!("{}/random_path_that_does_not_exist", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app().await;

    let response = reqwest::get(&format!("{}/api/health", app.address))
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn websocket_without_token_is_refused() {
    let app = spawn_app().await;

    let result = connect_async(app.ws_address.clone()).await;

    match result {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 401);
        }
        other => panic!("expected HTTP 401, got {:?}", other.map(|(_, r)| r.status())),
    }
}

#[tokio::test]
async fn websocket_with_bad_token_is_refused() {
    let app = spawn_app().await;
    let forged = sign_jwt("alice", "user", "some_other_secret", 600).unwrap();

    let result = connect_async(format!("{}?token={}", app.ws_address, forged)).await;

    match result {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 401);
        }
        other => panic!("expected HTTP 401, got {:?}", other.map(|(_, r)| r.status())),
    }
}

#[tokio::test]
async fn join_room_lists_members() {
    // Arrange
    let app = spawn_app().await;
    let mut host = open_socket(&app, "host").await;
    let mut alice = open_socket(&app, "alice").await;

    // Act
    join(&mut host, "host").await;
    expect_frame(&mut host, "USERS_IN_ROOM").await;
    join(&mut alice, "alice").await;

    // Assert
    let frame = expect_frame(&mut alice, "USERS_IN_ROOM").await;
    assert_eq!(frame["payload"]["roomId"], "quiz-1");
    let users = frame["payload"]["users"].as_array().unwrap();
    assert_eq!(users.len(), 2);

    let announced = expect_frame(&mut host, "NEW_USER").await;
    let announced = if announced["payload"]["user"]["id"] == "host" {
        expect_frame(&mut host, "NEW_USER").await
    } else {
        announced
    };
    assert_eq!(announced["payload"]["user"]["id"], "alice");
    assert_eq!(announced["payload"]["user"]["avatar"], "No-Avatar");
}

#[tokio::test]
async fn unknown_frames_are_ignored() {
    let app = spawn_app().await;
    let mut alice = open_socket(&app, "alice").await;

    send_frame(&mut alice, json!({ "type": "DANCE", "payload": {} })).await;
    alice
        .send(Message::text("not json at all"))
        .await
        .unwrap();
    join(&mut alice, "alice").await;

    // the connection survives and still answers
    expect_frame(&mut alice, "USERS_IN_ROOM").await;
}

#[tokio::test]
async fn single_question_quiz_runs_to_the_end() {
    // Arrange
    let app = spawn_app().await;
    let mut host = open_socket(&app, "host").await;
    let mut alice = open_socket(&app, "alice").await;
    join(&mut host, "host").await;
    expect_frame(&mut host, "USERS_IN_ROOM").await;
    join(&mut alice, "alice").await;
    expect_frame(&mut alice, "USERS_IN_ROOM").await;

    // Act
    send_frame(
        &mut host,
        json!({ "type": "START_QUIZ", "payload": { "quizId": "quiz-1" } }),
    )
    .await;

    let started = expect_frame(&mut alice, "QUIZ_STARTED").await;
    let attempt_id = started["payload"]["attemptId"]
        .as_str()
        .expect("participant gets an attempt id")
        .to_string();

    let question = expect_frame(&mut alice, "NEW_QUESTION").await;
    assert_eq!(question["payload"]["id"], "q1");
    assert!(question["payload"].get("answerIndex").is_none());

    send_frame(
        &mut alice,
        json!({
            "type": "ANSWER",
            "payload": {
                "quizId": "quiz-1",
                "attemptId": attempt_id,
                "userId": "alice",
                "questionId": "q1",
                "answer": 1
            }
        }),
    )
    .await;

    // Assert
    let received = expect_frame(&mut alice, "ANSWER_RECEIVED").await;
    assert_eq!(received["payload"]["status"], "ok");

    let board = expect_frame(&mut alice, "Leaderboard").await;
    assert_eq!(board["payload"]["topPlayers"][0]["participantId"], "alice");
    assert_eq!(board["payload"]["selfScore"]["rank"], 1);

    let end = expect_frame(&mut host, "QUIZ_END").await;
    assert_eq!(end["payload"]["quizId"], "quiz-1");
    expect_frame(&mut alice, "QUIZ_END").await;
}

#[tokio::test]
async fn caching_a_quiz_requires_its_owner() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/quiz/quiz-1/cache", app.address);

    // Act
    let anonymous = client.post(&url).send().await.unwrap();
    let stranger = client
        .post(&url)
        .bearer_auth(token_for("alice"))
        .send()
        .await
        .unwrap();
    let owner = client
        .post(&url)
        .bearer_auth(token_for("host"))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(anonymous.status().as_u16(), 401);
    assert_eq!(stranger.status().as_u16(), 403);
    assert_eq!(owner.status().as_u16(), 200);
    let body: Value = owner.json().await.unwrap();
    assert_eq!(body["cached"], true);
    assert_eq!(body["questions"], 1);
}
