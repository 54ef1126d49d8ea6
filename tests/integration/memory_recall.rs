//! Conversation memory feeding later turns.

use std::sync::Arc;

use elysia::memory::SqliteMemory;

use crate::helpers::{Harness, ScriptedModel};

#[tokio::test]
async fn earlier_exchange_is_recalled_into_the_prompt() {
    let db_dir = tempfile::tempdir().unwrap();
    let memory = SqliteMemory::open(&db_dir.path().join("memory.db"), 5).unwrap();
    let h = Harness::with_memory(
        ScriptedModel::new(&[
            &["Got it. ", "Your locker code is 4417."],
            &["It is 4417."],
        ]),
        Arc::new(memory.clone()),
    );

    let first = h.processor.handle("my locker code is 4417").await;
    assert_eq!(first.spoken, "Got it. Your locker code is 4417.");
    assert_eq!(
        memory.recent(10).unwrap(),
        vec![
            ("user".to_owned(), "my locker code is 4417".to_owned()),
            (
                "assistant".to_owned(),
                "Got it. Your locker code is 4417.".to_owned()
            ),
        ]
    );

    h.processor.handle("what is my locker code").await;
    h.speech.join().await;

    let requests = h.model.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].prompt.contains("Relevant memory:"));
    let prompt = &requests[1].prompt;
    assert!(prompt.starts_with("Relevant memory:\n"), "{prompt}");
    assert!(prompt.contains("[user] my locker code is 4417"), "{prompt}");
    assert!(prompt.ends_with("User: what is my locker code"), "{prompt}");
    assert_eq!(memory.len().unwrap(), 4);

    h.shutdown().await;
}

#[tokio::test]
async fn empty_response_is_still_remembered() {
    let db_dir = tempfile::tempdir().unwrap();
    let memory = SqliteMemory::open(&db_dir.path().join("memory.db"), 5).unwrap();
    // An empty script answers with an empty response.
    let h = Harness::with_memory(ScriptedModel::new(&[]), Arc::new(memory.clone()));

    let summary = h.processor.handle("anyone there").await;
    h.speech.join().await;

    assert_eq!(summary.units, 0);
    assert!(h.spoken().is_empty());
    let rows = memory.recent(10).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1], ("assistant".to_owned(), String::new()));

    h.shutdown().await;
}
