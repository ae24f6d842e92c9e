#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Turn engine against the real file-backed log, serializer and dispatcher.

use async_trait::async_trait;
use palaver_infra::infra::conversation_log::ConversationLog;
use palaver_infra::infra::turn_serializer::TurnSerializer;
use palaver_runtime::*;
use palaver_tools::tools::Tool;
use palaver_tools::{ExecutionContext, ToolDispatcherImpl, ToolError, ToolRegistryImpl};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct FakeListing;

#[async_trait]
impl Tool for FakeListing {
    fn name(&self) -> &'static str {
        "list_directory"
    }

    fn description(&self) -> &'static str {
        "List files"
    }

    fn schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {"path": {"type": "string"}}})
    }

    async fn execute(
        &self,
        _ctx: ExecutionContext,
        _input: serde_json::Value,
    ) -> Result<String, ToolError> {
        Ok("a.txt\nb.txt".to_string())
    }
}

/// Replies from a fixed script, in order.
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ModelResponse, RuntimeError>>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<ModelResponse, RuntimeError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
        })
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(
        &self,
        _system_prompt: &str,
        _history: &[Message],
        _tools: &[serde_json::Value],
    ) -> Result<ModelResponse, RuntimeError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RuntimeError::LLMError("script exhausted".into())))
    }
}

/// Asks for one listing after each user message, then answers. Sleeps
/// `delay` before every reply whose turn text contains "slow".
struct ListingThenAnswer {
    delay: Duration,
    calls: AtomicUsize,
}

#[async_trait]
impl ModelClient for ListingThenAnswer {
    async fn complete(
        &self,
        _system_prompt: &str,
        history: &[Message],
        _tools: &[serde_json::Value],
    ) -> Result<ModelResponse, RuntimeError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let last_user = history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text().to_string())
            .unwrap_or_default();
        if last_user.contains("slow") {
            tokio::time::sleep(self.delay).await;
        }

        match history.last().map(|m| m.role) {
            Some(Role::User) => Ok(ModelResponse::ToolCalls {
                content: None,
                calls: vec![ToolCall::new(format!("call_{}", n), "list_directory", json!({}))],
            }),
            _ => Ok(ModelResponse::Text(format!("answer to {}", last_user))),
        }
    }
}

/// Always requests the listing tool.
struct NeverDone;

#[async_trait]
impl ModelClient for NeverDone {
    async fn complete(
        &self,
        _system_prompt: &str,
        history: &[Message],
        _tools: &[serde_json::Value],
    ) -> Result<ModelResponse, RuntimeError> {
        Ok(ModelResponse::ToolCalls {
            content: None,
            calls: vec![ToolCall::new(
                format!("call_{}", history.len()),
                "list_directory",
                json!({}),
            )],
        })
    }
}

struct FixedSummary;

#[async_trait]
impl Summarizer for FixedSummary {
    async fn summarize(&self, _prompt: &str) -> Result<String, RuntimeError> {
        Ok("- earlier chat about files".to_string())
    }
}

struct Harness {
    _temp: TempDir,
    log: Arc<ConversationLog>,
    store: Arc<AsyncConversationLog>,
    dispatcher: Arc<ToolDispatcherImpl>,
}

impl Harness {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let log = Arc::new(ConversationLog::new(temp.path().join("sessions")).unwrap());
        let store = Arc::new(AsyncConversationLog::new(log.clone()));

        let mut registry = ToolRegistryImpl::new();
        registry.register(Arc::new(FakeListing)).unwrap();
        let dispatcher = Arc::new(ToolDispatcherImpl::new(Arc::new(registry), 5_000));

        Self {
            _temp: temp,
            log,
            store,
            dispatcher,
        }
    }

    fn engine<M: ModelClient>(
        &self,
        model: Arc<M>,
        threshold: usize,
    ) -> AgentLoop<AsyncConversationLog, ToolDispatcherImpl, M, FixedSummary> {
        AgentLoop::new(
            self.store.clone(),
            Arc::new(TurnSerializer::new()),
            self.dispatcher.clone(),
            model,
            Compactor::new(threshold, Arc::new(FixedSummary)),
            DEFAULT_MAX_ITERATIONS,
        )
    }

    fn records(&self, id: &str) -> Vec<Message> {
        self.log.load::<Message>(id).unwrap()
    }
}

#[tokio::test]
async fn test_end_to_end_listing_turn() {
    let h = Harness::new();
    let model = ScriptedModel::new(vec![
        Ok(ModelResponse::ToolCalls {
            content: None,
            calls: vec![ToolCall::new("call_1", "list_directory", json!({"path": "/tmp"}))],
        }),
        Ok(ModelResponse::Text("Files: a.txt, b.txt".into())),
    ]);

    let reply = h
        .engine(model, 100_000)
        .run("agent:main:repl:u1", "soul", "list files in /tmp")
        .await
        .unwrap();
    assert_eq!(reply, "Files: a.txt, b.txt");

    let records = h.records("agent:main:repl:u1");
    assert_eq!(records.len(), 4);
    assert_eq!(records[0], Message::user("list files in /tmp"));
    assert!(records[1].has_tool_calls());
    assert_eq!(records[1].tool_calls[0].arguments, json!({"path": "/tmp"}));
    assert_eq!(records[2], Message::tool_result("call_1", "a.txt\nb.txt"));
    assert_eq!(records[3], Message::assistant("Files: a.txt, b.txt"));
}

#[tokio::test]
async fn test_unknown_tool_result_goes_back_to_model() {
    let h = Harness::new();
    let model = ScriptedModel::new(vec![
        Ok(ModelResponse::ToolCalls {
            content: None,
            calls: vec![ToolCall::new("call_1", "teleport", json!({}))],
        }),
        Ok(ModelResponse::Text("I cannot do that".into())),
    ]);

    h.engine(model, 100_000).run("c1", "soul", "beam me up").await.unwrap();

    let records = h.records("c1");
    assert_eq!(records[2].text(), "Error: Unknown tool 'teleport'");
}

#[tokio::test]
async fn test_max_iterations_returns_sentinel() {
    let h = Harness::new();

    let reply = h
        .engine(Arc::new(NeverDone), 10_000_000)
        .run("loop", "soul", "keep going")
        .await
        .unwrap();
    assert_eq!(reply, MAX_ITERATIONS_SENTINEL);

    let records = h.records("loop");
    assert_eq!(records.len(), 1 + 2 * DEFAULT_MAX_ITERATIONS);
    for pair in records[1..].chunks(2) {
        assert!(pair[0].has_tool_calls());
        assert_eq!(pair[1].role, Role::Tool);
        assert_eq!(pair[1].tool_call_id.as_deref(), Some(pair[0].tool_calls[0].id.as_str()));
    }
}

#[tokio::test]
async fn test_model_failure_keeps_user_message() {
    let h = Harness::new();
    let model = ScriptedModel::new(vec![Err(RuntimeError::LLMError("503".into()))]);

    let result = h.engine(model, 100_000).run("c1", "soul", "are you there?").await;
    assert!(matches!(result, Err(RuntimeError::LLMError(_))));

    assert_eq!(h.records("c1"), vec![Message::user("are you there?")]);
}

#[tokio::test]
async fn test_orphaned_tool_call_repaired_on_disk() {
    let h = Harness::new();
    h.log.append_one("c1", &Message::user("first")).unwrap();
    h.log
        .append_one(
            "c1",
            &Message::assistant_tool_calls(
                None,
                vec![ToolCall::new("lost", "list_directory", json!({}))],
            ),
        )
        .unwrap();

    let model = ScriptedModel::new(vec![Ok(ModelResponse::Text("hello again".into()))]);
    h.engine(model, 100_000).run("c1", "soul", "second").await.unwrap();

    let records = h.records("c1");
    assert_eq!(
        records,
        vec![
            Message::user("first"),
            Message::user("second"),
            Message::assistant("hello again"),
        ]
    );
}

#[tokio::test]
async fn test_compaction_is_persisted() {
    let h = Harness::new();
    for i in 0..6 {
        let question = Message::user(format!("question {} {}", i, "x".repeat(200)));
        let answer = Message::assistant(format!("answer {} {}", i, "y".repeat(200)));
        h.log.append_one("big", &question).unwrap();
        h.log.append_one("big", &answer).unwrap();
    }
    let model = ScriptedModel::new(vec![Ok(ModelResponse::Text("noted".into()))]);

    h.engine(model, 100).run("big", "soul", "what now?").await.unwrap();

    let records = h.records("big");
    assert_eq!(
        records[0].text(),
        "[Conversation summary of 6 earlier messages]\n\n- earlier chat about files"
    );
    assert!(records[1].text().starts_with("question 3"));
    assert_eq!(records.len(), 1 + 6 + 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_conversations_do_not_block() {
    let h = Harness::new();
    let model = Arc::new(ListingThenAnswer {
        delay: Duration::from_millis(400),
        calls: AtomicUsize::new(0),
    });
    let engine = Arc::new(h.engine(model, 100_000));

    let slow = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run("slow-conv", "soul", "slow please").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    let fast = engine.run("fast-conv", "soul", "quick one").await.unwrap();
    assert_eq!(fast, "answer to quick one");
    assert!(started.elapsed() < Duration::from_millis(300));

    assert_eq!(slow.await.unwrap().unwrap(), "answer to slow please");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_conversation_turns_never_interleave() {
    let h = Harness::new();
    let model = Arc::new(ListingThenAnswer {
        delay: Duration::from_millis(30),
        calls: AtomicUsize::new(0),
    });
    let engine = Arc::new(h.engine(model, 100_000));

    let mut handles = Vec::new();
    for i in 0..3 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.run("shared", "soul", &format!("slow turn {}", i)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let records = h.records("shared");
    assert_eq!(records.len(), 12);
    for turn in records.chunks(4) {
        let roles: Vec<Role> = turn.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(turn[3].text(), format!("answer to {}", turn[0].text()));
        assert_eq!(turn[2].tool_call_id.as_deref(), Some(turn[1].tool_calls[0].id.as_str()));
    }
}
