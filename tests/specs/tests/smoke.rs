// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `leettutor` binary and
//! exercise the HTTP API and the `/ws/chat` protocol.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use leettutor::transport::ws::CLOSE_UNAUTHORIZED;
use leettutor_specs::{python_available, TutorProcess};

const TIMEOUT: Duration = Duration::from_secs(15);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn next_json(ws: &mut WsStream) -> anyhow::Result<serde_json::Value> {
    loop {
        let msg = tokio::time::timeout(TIMEOUT, ws.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("ws stream ended"))??;
        match msg {
            Message::Text(text) => return Ok(serde_json::from_str(&text)?),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => anyhow::bail!("expected text ws message, got: {other:?}"),
        }
    }
}

/// Read frames until an `assistant_message`, returning it.
async fn drain_turn(ws: &mut WsStream) -> anyhow::Result<serde_json::Value> {
    loop {
        let frame = next_json(ws).await?;
        match frame["type"].as_str() {
            Some("assistant_chunk") => continue,
            Some("assistant_message") => return Ok(frame),
            other => anyhow::bail!("unexpected frame mid-turn: {other:?}"),
        }
    }
}

// -- HTTP ---------------------------------------------------------------------

#[tokio::test]
async fn auth_status_reports_disabled() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let tutor = TutorProcess::start()?;
    tutor.wait_healthy(TIMEOUT).await?;

    let resp: serde_json::Value =
        reqwest::get(format!("{}/api/auth/status", tutor.base_url())).await?.json().await?;
    assert_eq!(resp["auth_required"], false);

    // With auth disabled, login succeeds with any password and the
    // (unused) token is empty.
    let login = reqwest::Client::new()
        .post(format!("{}/api/login", tutor.base_url()))
        .json(&serde_json::json!({"password": "anything"}))
        .send()
        .await?;
    assert_eq!(login.status().as_u16(), 200);
    let body: serde_json::Value = login.json().await?;
    assert_eq!(body["token"], "");
    Ok(())
}

#[tokio::test]
async fn auth_gates_api_routes() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let tutor = TutorProcess::build().password("hunter2").spawn()?;
    tutor.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();

    // Without a token the catalog is closed.
    let resp = client.get(format!("{}/api/problems", tutor.base_url())).send().await?;
    assert_eq!(resp.status().as_u16(), 401);
    let body: serde_json::Value = resp.json().await?;
    assert!(body["detail"].is_string());

    // Wrong password is rejected.
    let resp = client
        .post(format!("{}/api/login", tutor.base_url()))
        .json(&serde_json::json!({"password": "wrong"}))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 401);

    // Right password yields a token that opens the catalog.
    let login: serde_json::Value = client
        .post(format!("{}/api/login", tutor.base_url()))
        .json(&serde_json::json!({"password": "hunter2"}))
        .send()
        .await?
        .json()
        .await?;
    let token = login["token"].as_str().unwrap_or_default().to_owned();
    assert_eq!(token.len(), 64);

    let problems: serde_json::Value = client
        .get(format!("{}/api/problems", tutor.base_url()))
        .bearer_auth(&token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(problems[0]["id"], "two-sum");
    Ok(())
}

#[tokio::test]
async fn problem_detail_hides_hidden_cases() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let tutor = TutorProcess::start()?;
    tutor.wait_healthy(TIMEOUT).await?;

    let problem: serde_json::Value =
        reqwest::get(format!("{}/api/problems/two-sum", tutor.base_url())).await?.json().await?;
    assert_eq!(problem["title"], "Two Sum");
    assert!(problem["starter_code"].as_str().unwrap_or_default().contains("def twoSum"));
    assert_eq!(problem["test_cases"].as_array().map(Vec::len), Some(1));
    assert!(problem.get("hidden_test_cases").is_none());
    Ok(())
}

#[tokio::test]
async fn run_happy_path() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let tutor = TutorProcess::start()?;
    tutor.wait_healthy(TIMEOUT).await?;

    let code = "def twoSum(nums, target):\n    seen = {}\n    for i, n in enumerate(nums):\n        if target - n in seen:\n            return [seen[target - n], i]\n        seen[n] = i\n";
    let report: serde_json::Value = reqwest::Client::new()
        .post(format!("{}/api/run", tutor.base_url()))
        .json(&serde_json::json!({"code": code, "problem_id": "two-sum"}))
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(report["passed"], 1);
    assert_eq!(report["failed"], 0);
    assert_eq!(report["results"][0]["passed"], true);
    assert_eq!(report["results"][0]["actual"], serde_json::json!([0, 1]));
    assert!(report["results"][0]["runtime_ms"].as_f64().is_some_and(|ms| ms >= 0.0));
    Ok(())
}

#[tokio::test]
async fn submit_includes_hidden_cases() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let tutor = TutorProcess::start()?;
    tutor.wait_healthy(TIMEOUT).await?;

    let code = "def twoSum(nums, target):\n    seen = {}\n    for i, n in enumerate(nums):\n        if target - n in seen:\n            return [seen[target - n], i]\n        seen[n] = i\n";
    let report: serde_json::Value = reqwest::Client::new()
        .post(format!("{}/api/submit", tutor.base_url()))
        .json(&serde_json::json!({"code": code, "problem_id": "two-sum"}))
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(report["passed"], 2);
    assert_eq!(report["failed"], 0);
    Ok(())
}

#[tokio::test]
async fn infinite_loop_is_reported_as_failed_test() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let tutor = TutorProcess::build().sandbox_timeout(2).spawn()?;
    tutor.wait_healthy(TIMEOUT).await?;

    let code = "def twoSum(nums, target):\n    while True:\n        pass\n";
    let resp = reqwest::Client::new()
        .post(format!("{}/api/run", tutor.base_url()))
        .json(&serde_json::json!({"code": code, "problem_id": "two-sum"}))
        .send()
        .await?;
    // Still a 200: user-code failure is a test record, not an endpoint error.
    assert_eq!(resp.status().as_u16(), 200);
    let report: serde_json::Value = resp.json().await?;
    assert_eq!(report["results"][0]["passed"], false);
    let error = report["results"][0]["error"].as_str().unwrap_or_default();
    assert!(error.contains("Time Limit Exceeded"), "error was: {error}");
    Ok(())
}

#[tokio::test]
async fn oversized_code_is_rejected_with_detail() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let tutor = TutorProcess::start()?;
    tutor.wait_healthy(TIMEOUT).await?;

    let code = "#".repeat(50 * 1024 + 1);
    let resp = reqwest::Client::new()
        .post(format!("{}/api/run", tutor.base_url()))
        .json(&serde_json::json!({"code": code, "problem_id": "two-sum"}))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 413);
    let body: serde_json::Value = resp.json().await?;
    assert!(body["detail"].as_str().unwrap_or_default().contains("limit"));
    Ok(())
}

// -- WebSocket ----------------------------------------------------------------

#[tokio::test]
async fn ws_bad_auth_closes_with_4001() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let tutor = TutorProcess::build().password("hunter2").spawn()?;
    tutor.wait_healthy(TIMEOUT).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(tutor.ws_url()).await?;
    ws.send(Message::Text(r#"{"type":"auth","token":"wrong"}"#.into())).await?;

    let msg = tokio::time::timeout(TIMEOUT, ws.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("ws stream ended"))??;
    match msg {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::from(CLOSE_UNAUTHORIZED));
        }
        other => anyhow::bail!("expected close frame, got: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn ws_invalid_frame_reports_invalid_message() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let tutor = TutorProcess::start()?;
    tutor.wait_healthy(TIMEOUT).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(tutor.ws_url()).await?;
    ws.send(Message::Text(r#"{"type":"no_such_frame"}"#.into())).await?;

    let frame = next_json(&mut ws).await?;
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["code"], "INVALID_MESSAGE");
    Ok(())
}

#[tokio::test]
async fn ws_session_lifecycle_with_streaming() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let tutor = TutorProcess::start()?;
    tutor.wait_healthy(TIMEOUT).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(tutor.ws_url()).await?;
    ws.send(Message::Text(
        r#"{"type":"start_session","problem_id":"two-sum","mode":"learning"}"#.into(),
    ))
    .await?;

    let started = next_json(&mut ws).await?;
    assert_eq!(started["type"], "session_started");
    let session_id = started["session_id"].as_str().unwrap_or_default().to_owned();
    assert!(session_id.len() >= 8);

    // Greeting turn streams chunks then the full message.
    let greeting = drain_turn(&mut ws).await?;
    assert!(greeting["content"].as_str().unwrap_or_default().contains("tutor"));

    // One chat turn.
    ws.send(Message::Text(
        r#"{"type":"message","content":"where do I start?"}"#.into(),
    ))
    .await?;
    let reply = drain_turn(&mut ws).await?;
    assert!(!reply["content"].as_str().unwrap_or_default().is_empty());

    ws.send(Message::Text(r#"{"type":"end_session"}"#.into())).await?;

    // The ended session shows up in history with both sides of the chat.
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("session never finalized");
        }
        let doc: serde_json::Value =
            reqwest::get(format!("{}/api/sessions/{session_id}", tutor.base_url()))
                .await?
                .json()
                .await?;
        if doc["ended_at_ms"].is_u64() {
            let history = doc["chat_history"].as_array().cloned().unwrap_or_default();
            assert!(history.len() >= 3, "history: {history:?}");
            assert_eq!(history[1]["role"], "user");
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Ok(())
}

#[tokio::test]
async fn ws_disconnect_then_resume_preserves_history() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let tutor = TutorProcess::start()?;
    tutor.wait_healthy(TIMEOUT).await?;

    // First connection: start, chat once, disconnect without ending.
    let (mut ws, _) = tokio_tungstenite::connect_async(tutor.ws_url()).await?;
    ws.send(Message::Text(
        r#"{"type":"start_session","problem_id":"two-sum","mode":"learning"}"#.into(),
    ))
    .await?;
    let started = next_json(&mut ws).await?;
    let session_id = started["session_id"].as_str().unwrap_or_default().to_owned();
    drain_turn(&mut ws).await?;

    ws.send(Message::Text(r#"{"type":"message","content":"remember this"}"#.into())).await?;
    drain_turn(&mut ws).await?;
    drop(ws);

    // Give the server a moment to park the agent.
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Second connection resumes the same session.
    let (mut ws, _) = tokio_tungstenite::connect_async(tutor.ws_url()).await?;
    ws.send(Message::Text(
        format!(r#"{{"type":"resume_session","session_id":"{session_id}"}}"#).into(),
    ))
    .await?;

    let resumed = next_json(&mut ws).await?;
    assert_eq!(resumed["type"], "session_resumed");
    assert_eq!(resumed["session_id"], session_id.as_str());
    let history = resumed["chat_history"].as_array().cloned().unwrap_or_default();
    assert!(history.len() >= 3, "history: {history:?}");
    assert!(history.iter().any(|m| m["content"]
        .as_str()
        .unwrap_or_default()
        .contains("remember this")));

    // The resumed agent still answers.
    ws.send(Message::Text(r#"{"type":"message","content":"still with me?"}"#.into())).await?;
    let reply = drain_turn(&mut ws).await?;
    assert!(!reply["content"].as_str().unwrap_or_default().is_empty());
    Ok(())
}
