//! End-to-end turns: capture → processor → speech queue → observers.

use std::sync::Arc;
use std::time::Duration;

use elysia::TurnLoop;
use elysia::config::ConversationConfig;
use elysia::pipeline::StateMessage;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::helpers::{Harness, ScriptedCapture, ScriptedModel, drain};

/// States in order, with the spoken text for `speaking` announcements.
/// Audio chunks are left out.
fn trace(messages: &[StateMessage]) -> Vec<String> {
    messages
        .iter()
        .filter(|m| m.audio_chunk.is_none())
        .map(|m| match m.data.get("response").and_then(Value::as_str) {
            Some(text) => format!("{}:{text}", m.state),
            None => m.state.to_string(),
        })
        .collect()
}

fn turn_loop(h: &Harness, capture: ScriptedCapture) -> TurnLoop {
    TurnLoop::new(
        Arc::new(capture),
        Arc::clone(&h.observers),
        Arc::clone(&h.processor),
        ConversationConfig::default(),
    )
}

#[tokio::test]
async fn session_runs_turns_until_exit_phrase() {
    let h = Harness::new(ScriptedModel::new(&[&["Hello there. ", "How can I help?"]]));
    let (_, mut rx) = h.observers.subscribe();
    let capture = ScriptedCapture::new(&[Some("hello"), None, Some("   "), Some("Goodbye.")]);

    let turns = turn_loop(&h, capture)
        .run(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(turns, 1);

    let messages = drain(&mut rx);
    assert_eq!(
        trace(&messages),
        vec![
            "idle",
            "listening",
            "thinking",
            "speaking:Hello there.",
            "speaking:How can I help?",
            "listening",
            "listening",
            "listening",
            "speaking:Goodbye!",
            "idle",
        ]
    );
    let audio = messages.iter().filter(|m| m.audio_chunk.is_some()).count();
    assert_eq!(audio, 2 + 4 + 1);
    assert_eq!(h.spoken(), vec!["Hello there.", "How can I help?", "Goodbye!"]);

    h.shutdown().await;
}

#[tokio::test]
async fn capture_failure_ends_session_idle() {
    let h = Harness::new(ScriptedModel::new(&[]));
    let (_, mut rx) = h.observers.subscribe();

    let result = turn_loop(&h, ScriptedCapture::new(&[]))
        .run(CancellationToken::new())
        .await;
    assert!(result.is_err());
    assert_eq!(trace(&drain(&mut rx)), vec!["idle", "listening", "idle"]);

    h.shutdown().await;
}

#[tokio::test]
async fn tool_results_are_spoken_between_sentences() {
    let h = Harness::new(ScriptedModel::new(&[&[
        "I'll save that. ```tool_code\n",
        "create_file(filename='todo in workspace', content='milk')\n```\n",
        "Saved.",
    ]]));

    let summary = h.processor.handle("remember to buy milk").await;
    h.speech.join().await;

    assert_eq!(summary.tool_results, 1);
    assert_eq!(
        h.spoken(),
        vec![
            "I'll save that.",
            "OK: wrote 4 bytes to workspace/todo.txt",
            "Saved."
        ]
    );
    let written = std::fs::read_to_string(h.dir.path().join("workspace/todo.txt")).unwrap();
    assert_eq!(written, "milk");

    h.shutdown().await;
}

#[tokio::test]
async fn unknown_tool_is_reported_not_fatal() {
    let h = Harness::new(ScriptedModel::new(&[&[
        "```tool_code\nlaunch_rockets(count=3)\n```",
        "Anything else?",
    ]]));

    let summary = h.processor.handle("do something").await;
    h.speech.join().await;

    assert_eq!(
        h.spoken(),
        vec!["ERROR: unknown tool: launch_rockets", "Anything else?"]
    );
    assert_eq!(summary.units, 2);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn stalled_model_is_flushed_and_prior_text_spoken() {
    let h = Harness::new(
        ScriptedModel::new(&[&["Working on it. ", "Almost there"]]).stalling(),
    );

    let started = tokio::time::Instant::now();
    let summary = h.processor.handle("long task").await;
    h.speech.join().await;

    assert!(summary.timed_out);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(50));
    assert!(elapsed < Duration::from_secs(51), "{elapsed:?}");
    assert_eq!(h.spoken(), vec!["Working on it.", "Almost there"]);

    h.shutdown().await;
}
