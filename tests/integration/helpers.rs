//! Shared fakes and fixtures for integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use elysia::config::{LlmConfig, SandboxConfig};
use elysia::error::{ElysiaError, Result};
use elysia::llm::{FragmentStream, LanguageModel, ModelRequest, ResponseStream};
use elysia::memory::{ConversationMemory, NoMemory};
use elysia::pipeline::StateMessage;
use elysia::stt::SpeechCapture;
use elysia::tools::ToolDispatcher;
use elysia::tts::{AudioBuffers, SpeechSynthesizer};
use elysia::{ObserverHub, ResponseProcessor, SpeechQueue};
use futures_util::{StreamExt, stream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Model that answers each request with the next scripted reply.
///
/// Each reply is one response made of the given fragments. Once the script
/// runs out, further requests get an empty response. Requests are recorded.
pub(crate) struct ScriptedModel {
    replies: Mutex<VecDeque<Vec<String>>>,
    stall_after: bool,
    pub(crate) requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub(crate) fn new(replies: &[&[&str]]) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .iter()
                    .map(|r| r.iter().map(|f| (*f).to_owned()).collect())
                    .collect(),
            ),
            stall_after: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// After the scripted fragments, never yield another one.
    pub(crate) fn stalling(mut self) -> Self {
        self.stall_after = true;
        self
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn respond(&self, request: &ModelRequest) -> Result<ResponseStream> {
        self.requests.lock().unwrap().push(request.clone());
        let fragments = self.replies.lock().unwrap().pop_front().unwrap_or_default();
        let items = stream::iter(fragments.into_iter().map(Ok::<String, ElysiaError>));
        let inner: FragmentStream = if self.stall_after {
            Box::pin(items.chain(stream::pending()))
        } else {
            Box::pin(items)
        };
        Ok(Box::pin(stream::iter(vec![inner])))
    }
}

/// Synthesizer that records every text and emits one buffer per word.
#[derive(Default)]
pub(crate) struct RecordingSynth {
    pub(crate) spoken: Mutex<Vec<String>>,
}

impl SpeechSynthesizer for RecordingSynth {
    fn sample_rate(&self) -> u32 {
        16_000
    }

    fn synthesize(&self, text: &str) -> Result<AudioBuffers> {
        self.spoken.lock().unwrap().push(text.to_owned());
        let buffers: Vec<Result<Vec<f32>>> = text
            .split_whitespace()
            .map(|_| Ok(vec![0.0_f32; 4]))
            .collect();
        Ok(Box::new(buffers.into_iter()))
    }
}

/// Capture that replays scripted utterances, then fails.
pub(crate) struct ScriptedCapture {
    lines: Mutex<VecDeque<Option<String>>>,
}

impl ScriptedCapture {
    pub(crate) fn new(lines: &[Option<&str>]) -> Self {
        Self {
            lines: Mutex::new(lines.iter().map(|l| l.map(str::to_owned)).collect()),
        }
    }
}

impl SpeechCapture for ScriptedCapture {
    fn listen(&self) -> Result<Option<String>> {
        self.lines
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ElysiaError::Stt("microphone unplugged".into()))
    }
}

/// A sandbox config rooted at `dir`.
pub(crate) fn sandbox_config(dir: &std::path::Path) -> SandboxConfig {
    SandboxConfig {
        fs_root: dir.to_path_buf(),
        ..SandboxConfig::default()
    }
}

/// Everything needed to run turns against fakes.
pub(crate) struct Harness {
    pub(crate) dir: tempfile::TempDir,
    pub(crate) observers: Arc<ObserverHub>,
    pub(crate) synth: Arc<RecordingSynth>,
    pub(crate) model: Arc<ScriptedModel>,
    pub(crate) processor: Arc<ResponseProcessor>,
    pub(crate) speech: SpeechQueue,
    pub(crate) worker: JoinHandle<()>,
    pub(crate) cancel: CancellationToken,
}

impl Harness {
    pub(crate) fn new(model: ScriptedModel) -> Self {
        Self::with_memory(model, Arc::new(NoMemory))
    }

    pub(crate) fn with_memory(model: ScriptedModel, memory: Arc<dyn ConversationMemory>) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let tools = ToolDispatcher::from_config(&sandbox_config(dir.path())).expect("sandbox");
        let observers = Arc::new(ObserverHub::new());
        let synth = Arc::new(RecordingSynth::default());
        let cancel = CancellationToken::new();
        let (speech, worker) = SpeechQueue::spawn(
            synth.clone(),
            Arc::clone(&observers),
            cancel.child_token(),
        );
        let model = Arc::new(model);
        let processor = Arc::new(ResponseProcessor::new(
            model.clone(),
            memory,
            Arc::new(tools),
            speech.clone(),
            &LlmConfig::default(),
        ));
        Self {
            dir,
            observers,
            synth,
            model,
            processor,
            speech,
            worker,
            cancel,
        }
    }

    /// Texts handed to the synthesizer so far.
    pub(crate) fn spoken(&self) -> Vec<String> {
        self.synth.spoken.lock().unwrap().clone()
    }

    pub(crate) async fn shutdown(self) {
        self.speech.shutdown();
        self.worker.await.expect("speech worker");
        self.cancel.cancel();
    }
}

/// Drain all pending messages from an observer channel.
pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<StateMessage>) -> Vec<StateMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}
