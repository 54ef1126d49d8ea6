//! WebSocket observers and session start.

use std::sync::Arc;
use std::time::Duration;

use elysia::config::ConversationConfig;
use elysia::pipeline::{AssistantState, StateMessage};
use elysia::{Transport, TurnLoop};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::helpers::{Harness, ScriptedCapture, ScriptedModel};

const WAIT: Duration = Duration::from_secs(10);

async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn client_starts_session_and_observes_states() {
    let h = Harness::new(ScriptedModel::new(&[&["Hi!"]]));
    let turns = Arc::new(TurnLoop::new(
        Arc::new(ScriptedCapture::new(&[Some("hi"), Some("bye")])),
        Arc::clone(&h.observers),
        Arc::clone(&h.processor),
        ConversationConfig::default(),
    ));
    let transport = Transport::new(Arc::clone(&h.observers), turns, h.cancel.child_token());
    let listener = Transport::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(Arc::clone(&transport).serve(listener));

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .unwrap();
    ws.send(Message::Text(r#"{"action":"start"}"#.to_owned()))
        .await
        .unwrap();
    // Ignored: a session is already running.
    ws.send(Message::Text(r#"{"action":"start"}"#.to_owned()))
        .await
        .unwrap();

    let mut trace = Vec::new();
    let mut audio = 0;
    let mut idles = 0;
    while idles < 2 {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("frame in time")
            .expect("socket open")
            .unwrap();
        let Message::Text(text) = frame else {
            continue;
        };
        let message: StateMessage = serde_json::from_str(&text).unwrap();
        if message.audio_chunk.is_some() {
            audio += 1;
            continue;
        }
        if message.state == AssistantState::Idle {
            idles += 1;
        }
        trace.push(match message.data.get("response").and_then(|v| v.as_str()) {
            Some(text) => format!("{}:{text}", message.state),
            None => message.state.to_string(),
        });
    }

    assert_eq!(
        trace,
        vec![
            "idle",
            "listening",
            "thinking",
            "speaking:Hi!",
            "listening",
            "speaking:Goodbye!",
            "idle",
        ]
    );
    assert_eq!(audio, 2);
    eventually(|| !transport.session_active()).await;

    ws.close(None).await.unwrap();
    eventually(|| h.observers.is_empty()).await;

    h.cancel.cancel();
    server.await.unwrap().unwrap();
    h.shutdown().await;
}

#[tokio::test]
async fn unknown_messages_are_ignored() {
    let h = Harness::new(ScriptedModel::new(&[]));
    let turns = Arc::new(TurnLoop::new(
        Arc::new(ScriptedCapture::new(&[])),
        Arc::clone(&h.observers),
        Arc::clone(&h.processor),
        ConversationConfig::default(),
    ));
    let transport = Transport::new(Arc::clone(&h.observers), turns, h.cancel.child_token());
    let listener = Transport::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(Arc::clone(&transport).serve(listener));

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .unwrap();
    for text in ["not json", r#"{"action":"dance"}"#] {
        ws.send(Message::Text(text.to_owned())).await.unwrap();
    }
    eventually(|| h.observers.len() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!transport.session_active());

    // Shutdown closes the connection from the server side.
    h.cancel.cancel();
    server.await.unwrap().unwrap();
    tokio::time::timeout(WAIT, async {
        while let Some(Ok(frame)) = ws.next().await {
            if frame.is_close() {
                break;
            }
        }
    })
    .await
    .expect("server closed the connection");
    h.shutdown().await;
}
