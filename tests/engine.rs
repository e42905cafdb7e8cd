//! End-to-end turn execution against stub models and stores.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};

use colloquy::checkpoint::{Checkpoint, Checkpointer, CheckpointerError, InMemoryCheckpointer};
use colloquy::config::EngineConfig;
use colloquy::engine::{EngineError, TurnRunner};
use colloquy::message::{Message, Role, ToolCall};
use colloquy::models::{ChatModel, ModelError, ToolSpec};
use colloquy::tools::{Tool, ToolError, ToolRegistry};

/// One model invocation as observed by a stub.
#[derive(Clone, Debug)]
struct CallRecord {
    tools_offered: usize,
    system_count: usize,
    last_user: Option<String>,
}

/// Replays a fixed sequence of responses, recording what it was asked.
struct ScriptedModel {
    script: Mutex<VecDeque<Message>>,
    calls: Mutex<Vec<CallRecord>>,
}

impl ScriptedModel {
    fn new(responses: Vec<Message>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Message, ModelError> {
        self.calls.lock().unwrap().push(CallRecord {
            tools_offered: tools.len(),
            system_count: messages.iter().filter(|m| m.has_role(Role::System)).count(),
            last_user: messages
                .iter()
                .rev()
                .find(|m| m.has_role(Role::User))
                .map(|m| m.content.clone()),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ModelError::EmptyResponse)
    }
}

/// Requests a tool call on every invocation that offers tools; answers
/// plainly when none are bound.
struct ToolHungryModel {
    tool_bearing_calls: AtomicU32,
}

impl ToolHungryModel {
    fn new() -> Self {
        Self {
            tool_bearing_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ChatModel for ToolHungryModel {
    async fn invoke(
        &self,
        _messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Message, ModelError> {
        if tools.is_empty() {
            return Ok(Message::assistant("summary of everything gathered so far"));
        }
        let n = self.tool_bearing_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new(format!("call_{n}"), "echo", json!({"n": n}))],
        ))
    }
}

struct BrokenModel;

#[async_trait]
impl ChatModel for BrokenModel {
    async fn invoke(
        &self,
        _messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<Message, ModelError> {
        Err(ModelError::Request {
            message: "connection refused".to_string(),
        })
    }
}

struct Echo;

#[async_trait]
impl Tool for Echo {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "echoes its arguments"
    }
    async fn invoke(&self, arguments: Value) -> Result<String, ToolError> {
        Ok(arguments.to_string())
    }
}

/// Store whose writes always fail; reads delegate to an in-memory store.
struct UnwritableStore(InMemoryCheckpointer);

#[async_trait]
impl Checkpointer for UnwritableStore {
    async fn append(&self, _checkpoint: Checkpoint) -> Result<(), CheckpointerError> {
        Err(CheckpointerError::Backend {
            message: "disk full".to_string(),
        })
    }
    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointerError> {
        self.0.load_latest(thread_id).await
    }
    async fn list_threads(&self) -> Result<Vec<String>, CheckpointerError> {
        self.0.list_threads().await
    }
    async fn delete_thread(&self, thread_id: &str) -> Result<(), CheckpointerError> {
        self.0.delete_thread(thread_id).await
    }
}

fn runner_with(
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    store: Arc<dyn Checkpointer>,
    config: EngineConfig,
) -> TurnRunner {
    TurnRunner::new(model, tools, store, config)
}

#[tokio::test]
async fn plain_answer_takes_one_model_call() {
    let model = Arc::new(ScriptedModel::new(vec![Message::assistant(
        "Contractors accrue 15 days per year.",
    )]));
    let store = Arc::new(InMemoryCheckpointer::new());
    let runner = runner_with(
        model.clone(),
        ToolRegistry::new().register(Echo),
        store.clone(),
        EngineConfig::default(),
    );

    let outcome = runner
        .run_turn("t1", "what is the vacation policy for contractors")
        .await
        .unwrap();

    assert_eq!(outcome.answer, "Contractors accrue 15 days per year.");
    assert!(outcome.persistence.is_saved());
    assert_eq!(model.calls().len(), 1);

    let saved = store.load_latest("t1").await.unwrap().unwrap();
    assert_eq!(saved.seq, 1);
    assert_eq!(saved.state.messages.len(), 2);
}

#[tokio::test]
async fn tool_round_appends_results_in_request_order() {
    let model = Arc::new(ScriptedModel::new(vec![
        Message::assistant_with_tool_calls(
            "",
            vec![
                ToolCall::new("c1", "echo", json!({"n": 1})),
                ToolCall::new("c2", "echo", json!({"n": 2})),
            ],
        ),
        Message::assistant("both lookups done"),
    ]));
    let store = Arc::new(InMemoryCheckpointer::new());
    let runner = runner_with(
        model.clone(),
        ToolRegistry::new().register(Echo),
        store.clone(),
        EngineConfig::default(),
    );

    let outcome = runner
        .run_turn("t1", "please look up numbers one and two")
        .await
        .unwrap();
    assert_eq!(outcome.answer, "both lookups done");

    let saved = store.load_latest("t1").await.unwrap().unwrap();
    let roles: Vec<Role> = saved.state.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::User,
            Role::Assistant,
            Role::Tool,
            Role::Tool,
            Role::Assistant
        ]
    );
    assert_eq!(saved.state.messages[2].tool_call_id.as_deref(), Some("c1"));
    assert_eq!(saved.state.messages[3].tool_call_id.as_deref(), Some("c2"));
    saved.state.validate().unwrap();
}

#[tokio::test]
async fn iteration_guard_forces_a_reply() {
    let model = Arc::new(ToolHungryModel::new());
    let store = Arc::new(InMemoryCheckpointer::new());
    let runner = runner_with(
        model.clone(),
        ToolRegistry::new().register(Echo),
        store.clone(),
        EngineConfig::default().with_max_iterations(2),
    );

    let outcome = runner
        .run_turn("t1", "please research the quarterly revenue numbers")
        .await
        .unwrap();

    // With a budget of 2, the model is offered tools exactly 3 times; the
    // third request trips the guard instead of dispatching.
    assert_eq!(model.tool_bearing_calls.load(Ordering::SeqCst), 3);
    assert!(!outcome.answer.is_empty());
    assert_eq!(outcome.answer, "summary of everything gathered so far");

    // Only the first two tool requests were served.
    let saved = store.load_latest("t1").await.unwrap().unwrap();
    let tool_results = saved
        .state
        .messages
        .iter()
        .filter(|m| m.has_role(Role::Tool))
        .count();
    assert_eq!(tool_results, 2);
}

#[tokio::test]
async fn forced_reply_fallback_when_model_keeps_failing() {
    // Requests a tool once, then fails every later call, including the
    // forced-reply one. The turn must still produce an answer.
    struct OneToolThenBroken(AtomicU32);

    #[async_trait]
    impl ChatModel for OneToolThenBroken {
        async fn invoke(
            &self,
            _messages: &[Message],
            tools: &[ToolSpec],
        ) -> Result<Message, ModelError> {
            if tools.is_empty() {
                return Err(ModelError::EmptyResponse);
            }
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Message::assistant_with_tool_calls(
                "",
                vec![ToolCall::new("c", "echo", json!({}))],
            ))
        }
    }

    let runner = runner_with(
        Arc::new(OneToolThenBroken(AtomicU32::new(0))),
        ToolRegistry::new().register(Echo),
        Arc::new(InMemoryCheckpointer::new()),
        EngineConfig::default().with_max_iterations(1),
    );

    let outcome = runner
        .run_turn("t1", "please research the quarterly revenue numbers")
        .await
        .unwrap();
    assert!(!outcome.answer.is_empty());
}

#[tokio::test]
async fn rewrite_substitutes_window_but_not_history() {
    // First invocation is the tool-free rewrite call; second is the agent.
    let model = Arc::new(ScriptedModel::new(vec![
        Message::assistant("why is the sky blue during the day?"),
        Message::assistant("Rayleigh scattering."),
    ]));
    let store = Arc::new(InMemoryCheckpointer::new());
    let runner = runner_with(
        model.clone(),
        ToolRegistry::new().register(Echo),
        store.clone(),
        EngineConfig::default(),
    );

    let outcome = runner.run_turn("t1", "why?").await.unwrap();
    assert_eq!(outcome.answer, "Rayleigh scattering.");

    let calls = model.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].tools_offered, 0);
    assert!(calls[1].tools_offered > 0);
    // The agent saw the rewritten query.
    assert_eq!(
        calls[1].last_user.as_deref(),
        Some("why is the sky blue during the day?")
    );
    // The stored history keeps the user's original words.
    let saved = store.load_latest("t1").await.unwrap().unwrap();
    assert_eq!(saved.state.messages[0].content, "why?");
}

#[tokio::test]
async fn rewrite_failure_degrades_to_original_query() {
    struct RewriteFailsAgentAnswers;

    #[async_trait]
    impl ChatModel for RewriteFailsAgentAnswers {
        async fn invoke(
            &self,
            _messages: &[Message],
            tools: &[ToolSpec],
        ) -> Result<Message, ModelError> {
            if tools.is_empty() {
                Err(ModelError::EmptyResponse)
            } else {
                Ok(Message::assistant("answered from the original wording"))
            }
        }
    }

    let runner = runner_with(
        Arc::new(RewriteFailsAgentAnswers),
        ToolRegistry::new().register(Echo),
        Arc::new(InMemoryCheckpointer::new()),
        EngineConfig::default(),
    );

    let outcome = runner.run_turn("t1", "why?").await.unwrap();
    assert_eq!(outcome.answer, "answered from the original wording");
}

#[tokio::test]
async fn model_failure_commits_nothing() {
    let store = Arc::new(InMemoryCheckpointer::new());
    let runner = runner_with(
        Arc::new(BrokenModel),
        ToolRegistry::new().register(Echo),
        store.clone(),
        EngineConfig::default(),
    );

    let err = runner
        .run_turn("t1", "what is the vacation policy for contractors")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Model(_)));
    assert!(store.load_latest("t1").await.unwrap().is_none());
}

#[tokio::test]
async fn checkpoint_write_failure_still_returns_the_answer() {
    let runner = runner_with(
        Arc::new(ScriptedModel::new(vec![Message::assistant("the answer")])),
        ToolRegistry::new().register(Echo),
        Arc::new(UnwritableStore(InMemoryCheckpointer::new())),
        EngineConfig::default(),
    );

    let outcome = runner
        .run_turn("t1", "what is the vacation policy for contractors")
        .await
        .unwrap();
    assert_eq!(outcome.answer, "the answer");
    assert!(!outcome.persistence.is_saved());
}

#[tokio::test]
async fn turns_accumulate_in_the_same_thread() {
    let model = Arc::new(ScriptedModel::new(vec![
        Message::assistant("first answer"),
        Message::assistant("second answer"),
    ]));
    let store = Arc::new(InMemoryCheckpointer::new());
    let runner = runner_with(
        model,
        ToolRegistry::new().register(Echo),
        store.clone(),
        EngineConfig::default(),
    );

    runner
        .run_turn("t1", "what is the vacation policy for contractors")
        .await
        .unwrap();
    let second = runner
        .run_turn("t1", "how many days do full-time employees get")
        .await
        .unwrap();
    assert_eq!(second.answer, "second answer");

    let saved = store.load_latest("t1").await.unwrap().unwrap();
    assert_eq!(saved.seq, 2);
    assert_eq!(saved.state.messages.len(), 4);
    assert_eq!(saved.state.iteration_count, 0);
}

#[tokio::test]
async fn system_prompt_is_injected_once() {
    let model = Arc::new(ScriptedModel::new(vec![
        Message::assistant("first"),
        Message::assistant("second"),
    ]));
    let store = Arc::new(InMemoryCheckpointer::new());
    let runner = runner_with(
        model.clone(),
        ToolRegistry::new().register(Echo),
        store.clone(),
        EngineConfig::default().with_system_prompt("You answer from the document index."),
    );

    runner
        .run_turn("t1", "what is the vacation policy for contractors")
        .await
        .unwrap();
    runner
        .run_turn("t1", "how many days do full-time employees get")
        .await
        .unwrap();

    // Every model call sees exactly one system message, even though the
    // prompt is never written into the history.
    for call in model.calls() {
        assert_eq!(call.system_count, 1);
    }
    let saved = store.load_latest("t1").await.unwrap().unwrap();
    assert!(
        saved
            .state
            .messages
            .iter()
            .all(|m| !m.has_role(Role::System))
    );
}

#[tokio::test]
async fn thread_management_delegates_to_the_store() {
    let model = Arc::new(ScriptedModel::new(vec![
        Message::assistant("a"),
        Message::assistant("b"),
    ]));
    let runner = runner_with(
        model,
        ToolRegistry::new().register(Echo),
        Arc::new(InMemoryCheckpointer::new()),
        EngineConfig::default(),
    );

    runner
        .run_turn("alpha", "what is the vacation policy for contractors")
        .await
        .unwrap();
    runner
        .run_turn("beta", "how do i submit an expense report here")
        .await
        .unwrap();

    let mut threads = runner.threads().await.unwrap();
    threads.sort();
    assert_eq!(threads, vec!["alpha", "beta"]);

    runner.delete_thread("alpha").await.unwrap();
    assert_eq!(runner.threads().await.unwrap(), vec!["beta"]);
}
