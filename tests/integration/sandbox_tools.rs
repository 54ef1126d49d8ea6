//! File tools and macros driven through tool-code text.

use elysia::macros::MacroStore;
use elysia::sandbox::ToolSandbox;
use elysia::tools::{ToolDispatcher, parse_call};

use crate::helpers::{Harness, ScriptedModel, sandbox_config};

fn dispatcher(max_macros: usize) -> (tempfile::TempDir, ToolDispatcher) {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    let sandbox = ToolSandbox::new(&config).unwrap();
    let macros = MacroStore::open(config.macro_path(), max_macros);
    (dir, ToolDispatcher::new(sandbox, macros))
}

#[test]
fn escapes_are_rejected_for_every_tool() {
    let (dir, d) = dispatcher(8);
    let probe = "elysia-escape-probe.txt";
    let lines = [
        format!("create_file(filename='../{probe}', content='x')"),
        format!("create_file(filename='{probe} in repo/../..', content='x')"),
        format!("create_file(filename='dot dot slash {probe}', content='x')"),
        "read_file(filename='../../etc/passwd')".to_owned(),
        "read_file(filename='/etc/passwd')".to_owned(),
        "list_dir(path='..')".to_owned(),
        "list_dir(path='in repo/../..')".to_owned(),
    ];
    for line in &lines {
        let out = d.execute_call(parse_call(line));
        assert!(
            out.starts_with("ERROR: sandbox violation"),
            "{line} -> {out}"
        );
    }
    let parent = dir.path().parent().unwrap();
    assert!(!parent.join(probe).exists());
}

#[test]
fn spoken_names_and_hints_resolve_inside_root() {
    let (dir, d) = dispatcher(8);
    std::fs::create_dir(dir.path().join("backend")).unwrap();

    let out = d.execute_call(parse_call(
        "create_file(filename='server notes dot md in repo/backend', content='port 8080')",
    ));
    assert_eq!(out, "OK: wrote 9 bytes to backend/server_notes.md");

    let out = d.execute_call(parse_call("read_file(filename='server_notes.md')"));
    assert_eq!(out, "port 8080");

    let out = d.execute_call(parse_call("find_file(name='NOTES')"));
    assert_eq!(out, "backend/server_notes.md");
}

#[test]
fn overwrite_keeps_backup() {
    let (dir, d) = dispatcher(8);
    d.execute_call(parse_call("create_file(filename='plan', content='v1')"));
    d.execute_call(parse_call("create_file(filename='plan', content='v2')"));

    let workspace = dir.path().join("workspace");
    assert_eq!(std::fs::read_to_string(workspace.join("plan.txt")).unwrap(), "v2");
    assert_eq!(std::fs::read_to_string(workspace.join("plan.txt.bak")).unwrap(), "v1");
}

#[test]
fn macro_limit_is_not_persisted_past_maximum() {
    let (dir, d) = dispatcher(2);
    let step = "[{'tool': 'list_macros'}]";
    for name in ["a", "b"] {
        let out = d.execute_call(parse_call(&format!("add_macro(name='{name}', steps={step})")));
        assert!(out.starts_with("OK:"), "{out}");
    }
    let out = d.execute_call(parse_call(&format!("add_macro(name='c', steps={step})")));
    assert!(out.starts_with("ERROR: macro error: macro limit reached"), "{out}");

    let config = sandbox_config(dir.path());
    let reopened = MacroStore::open(config.macro_path(), 2);
    assert_eq!(reopened.list(), vec!["a", "b"]);
    assert!(reopened.get("c").is_none());
}

#[tokio::test]
async fn greet_macro_through_model_text() {
    let h = Harness::new(ScriptedModel::new(&[&[
        "```tool_code\n",
        "add_macro(name='greet', steps=[{'tool': 'create_file', 'kwargs': {'filename': 'hello.txt', 'content': 'hi'}}])\n",
        "run_macro(name='greet')\n```",
    ]]));

    let summary = h.processor.handle("make a greet macro and run it").await;
    h.speech.join().await;

    assert_eq!(summary.tool_results, 2);
    assert_eq!(
        h.spoken(),
        vec![
            "OK: macro 'greet' saved with 1 step(s)",
            "OK: wrote 2 bytes to workspace/hello.txt",
        ]
    );
    let hello = std::fs::read_to_string(h.dir.path().join("workspace/hello.txt")).unwrap();
    assert_eq!(hello, "hi");

    h.shutdown().await;
}
