use anyhow::{bail, Result};
use async_trait::async_trait;
use crmpilot_graph::{CircuitBreaker, Graph, LLMConfig, RunStatus, StreamEvent, TurnConfig, TurnInput};
use crmpilot_llm::{ChatClient, ChatRequest, ChatResponse, EventStream, Message};
use crmpilot_persist::{InMemoryStore, MessageRole, ThreadStore, UsageDelta, UsageStatus, UsageStore};
use crmpilot_tools::{CrmTool, ToolError, ToolOutput, ToolSet};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

type LlmEvent = crmpilot_llm::StreamEvent;

#[derive(Clone)]
enum Step {
    Events(Vec<LlmEvent>),
    Fail(String),
}

/// Plays back canned model replies; the last one repeats forever
struct ScriptedClient {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, n: usize) -> ChatRequest {
        self.requests.lock().unwrap()[n].clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
        bail!("not scripted")
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream> {
        self.requests.lock().unwrap().push(request);
        let step = {
            let mut steps = self.steps.lock().unwrap();
            if steps.len() > 1 { steps.pop_front() } else { steps.front().cloned() }
        };
        match step {
            Some(Step::Events(events)) => Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok)))),
            Some(Step::Fail(message)) => bail!(message),
            None => bail!("script exhausted"),
        }
    }
}

fn text_reply(text: &str) -> Step {
    let mut events: Vec<LlmEvent> = text
        .split_inclusive(' ')
        .map(|t| LlmEvent::Message { content: t.to_string() })
        .collect();
    events.push(LlmEvent::Done { finish_reason: Some("stop".into()) });
    Step::Events(events)
}

fn tool_reply(id: &str, name: &str, arguments: Value) -> Step {
    let arguments = arguments.to_string();
    let (head, tail) = arguments.split_at(arguments.len() / 2);
    Step::Events(vec![
        LlmEvent::ToolCall {
            index: 0,
            id: Some(id.into()),
            name: Some(name.into()),
            arguments: Some(head.into()),
        },
        LlmEvent::ToolCall { index: 0, id: None, name: None, arguments: Some(tail.into()) },
        LlmEvent::Done { finish_reason: Some("tool_calls".into()) },
    ])
}

/// Stands in for the Salesforce bulk update
struct FakeUpdateTool;

#[async_trait]
impl CrmTool for FakeUpdateTool {
    fn name(&self) -> &str {
        "update_records"
    }

    fn description(&self) -> &str {
        "Update records"
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let ids = arguments["records"]
            .as_array()
            .ok_or_else(|| ToolError::invalid("records must be an array"))?;
        Ok(ToolOutput::mutation(
            json!({ "success": true, "updated": ids.len() }),
            UsageDelta::updated(ids.len() as u64).with_progress(format!("Updated {} records", ids.len())),
        ))
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    client: Arc<ScriptedClient>,
    graph: Graph,
    thread_id: String,
}

async fn harness(steps: Vec<Step>, config: TurnConfig) -> Harness {
    harness_with_breaker(steps, config, Arc::new(CircuitBreaker::default())).await
}

async fn harness_with_breaker(steps: Vec<Step>, config: TurnConfig, breaker: Arc<CircuitBreaker>) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let client = ScriptedClient::new(steps);
    let graph = Graph::builder()
        .chat_client(client.clone())
        .thread_store(store.clone())
        .usage_store(store.clone())
        .config(config)
        .circuit_breaker(breaker)
        .build()
        .unwrap();
    let thread = store.create_thread("u1", "data-steward").await.unwrap();
    Harness { store, client, graph, thread_id: thread.id }
}

impl Harness {
    fn input(&self, text: &str) -> TurnInput {
        TurnInput::new(&self.thread_id, "u1", "data-steward", Message::human(text), LLMConfig::default())
            .with_system_prompt("You are a data steward.")
    }
}

async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn end_status(events: &[StreamEvent]) -> RunStatus {
    match events.last() {
        Some(StreamEvent::EndStream { status, .. }) => *status,
        other => panic!("stream did not end with end_stream: {other:?}"),
    }
}

fn errors(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Error { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_text_reply_streams_and_persists() {
    let h = harness(vec![text_reply("Hello there, how can I help?")], TurnConfig::default()).await;

    let events = collect(h.graph.spawn_run(h.input("hi"), ToolSet::new())).await;

    assert!(matches!(events.first(), Some(StreamEvent::InitStream { thread_id, .. }) if *thread_id == h.thread_id));
    let text: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Message { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Hello there, how can I help?");
    assert_eq!(end_status(&events), RunStatus::Success);

    let thread = h.store.get_thread(&h.thread_id, "u1").await.unwrap().unwrap();
    let roles: Vec<MessageRole> = thread.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![MessageRole::User, MessageRole::Assistant]);
    assert_eq!(thread.messages[1].content, "Hello there, how can I help?");

    // no tool call, no ledger entry
    assert!(h.store.list_usage("u1", None).await.unwrap().is_empty());

    // system prompt goes first, without tools advertised
    let request = h.client.request(0);
    assert_eq!(request.messages[0].role(), "system");
    assert!(request.options.tools.is_none());
}

#[tokio::test]
async fn test_update_three_accounts_records_usage() {
    let h = harness(
        vec![
            tool_reply(
                "call_1",
                "update_records",
                json!({ "object": "Account", "records": [{"id": "1"}, {"id": "2"}, {"id": "3"}] }),
            ),
            text_reply("Updated 3 accounts."),
        ],
        TurnConfig::default(),
    )
    .await;
    let tools = ToolSet::new().with_tool(Arc::new(FakeUpdateTool));

    let events = collect(h.graph.spawn_run(h.input("update 3 accounts"), tools)).await;
    assert_eq!(end_status(&events), RunStatus::Success);

    let result = events.iter().find_map(|e| match e {
        StreamEvent::ToolResult { tool_call_id, is_error, result, .. } => Some((tool_call_id, *is_error, result)),
        _ => None,
    });
    let (id, is_error, result) = result.unwrap();
    assert_eq!(id, "call_1");
    assert!(!is_error);
    assert!(result.contains("\"updated\":3"));

    let usage = h.store.list_usage("u1", None).await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].records_updated, 3);
    assert_eq!(usage[0].status, UsageStatus::Success);
    assert_eq!(usage[0].progress_message.as_deref(), Some("Updated 3 records"));

    let thread = h.store.get_thread(&h.thread_id, "u1").await.unwrap().unwrap();
    let roles: Vec<MessageRole> = thread.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![MessageRole::User, MessageRole::Assistant, MessageRole::Tool, MessageRole::Assistant]
    );
    let calls = thread.messages[1].tool_calls.as_ref().unwrap();
    assert_eq!(calls[0].name(), "update_records");
    assert_eq!(thread.messages[2].tool_call_id.as_deref(), Some("call_1"));

    // the second model call sees the tool result
    assert_eq!(h.client.calls(), 2);
    assert_eq!(h.client.request(1).messages.last().unwrap().role(), "tool");
}

#[tokio::test]
async fn test_tool_failure_is_fed_back_to_model() {
    let h = harness(
        vec![tool_reply("call_1", "delete_everything", json!({})), text_reply("I can't do that.")],
        TurnConfig::default(),
    )
    .await;

    let events = collect(h.graph.spawn_run(h.input("wipe it"), ToolSet::new())).await;
    assert_eq!(end_status(&events), RunStatus::Success);
    assert!(errors(&events).is_empty());

    let feedback = h.client.request(1).messages.last().unwrap().text();
    assert!(feedback.starts_with("Tool execution failed:"), "{feedback}");

    let usage = h.store.list_usage("u1", None).await.unwrap();
    assert_eq!(usage[0].error_count, 1);
    assert_eq!(usage[0].status, UsageStatus::Success);
}

#[tokio::test]
async fn test_malformed_arguments_are_a_tool_error() {
    let bad = Step::Events(vec![
        LlmEvent::ToolCall {
            index: 0,
            id: Some("call_1".into()),
            name: Some("update_records".into()),
            arguments: Some("{\"records\": [".into()),
        },
        LlmEvent::Done { finish_reason: Some("tool_calls".into()) },
    ]);
    let h = harness(vec![bad, text_reply("Sorry.")], TurnConfig::default()).await;
    let tools = ToolSet::new().with_tool(Arc::new(FakeUpdateTool));

    let events = collect(h.graph.spawn_run(h.input("update"), tools)).await;

    assert!(events.iter().any(|e| matches!(e, StreamEvent::ToolResult { is_error: true, .. })));
    assert_eq!(end_status(&events), RunStatus::Success);
}

#[tokio::test]
async fn test_step_cap_fails_turn_but_keeps_messages() {
    // the model never stops calling tools
    let h = harness(
        vec![tool_reply("call_x", "update_records", json!({ "records": [{"id": "1"}] }))],
        TurnConfig::new().with_max_steps(3),
    )
    .await;
    let tools = ToolSet::new().with_tool(Arc::new(FakeUpdateTool));

    let events = collect(h.graph.spawn_run(h.input("loop"), tools)).await;

    assert_eq!(errors(&events), vec!["Max steps (3) reached".to_string()]);
    assert_eq!(end_status(&events), RunStatus::Failed);
    // llm, tool, llm
    assert_eq!(h.client.calls(), 2);

    // the dangling call from the last model reply is closed off
    let thread = h.store.get_thread(&h.thread_id, "u1").await.unwrap().unwrap();
    assert_eq!(thread.messages.len(), 5);
    assert!(thread.messages[4].content.starts_with("Tool execution skipped"));

    let usage = h.store.list_usage("u1", None).await.unwrap();
    assert_eq!(usage[0].status, UsageStatus::Failed);
    assert_eq!(usage[0].records_updated, 1);
}

#[tokio::test]
async fn test_model_failure_ends_stream_failed() {
    let h = harness(vec![Step::Fail("OpenAI API error (500): boom".into())], TurnConfig::default()).await;

    let events = collect(h.graph.spawn_run(h.input("hi"), ToolSet::new())).await;

    let error = events.iter().find_map(|e| match e {
        StreamEvent::Error { message, node_id } => Some((message.clone(), node_id.clone())),
        _ => None,
    });
    assert_eq!(
        error,
        Some(("OpenAI API error (500): boom".to_string(), Some("llm".to_string())))
    );
    assert_eq!(end_status(&events), RunStatus::Failed);

    // the user message is still saved
    let thread = h.store.get_thread(&h.thread_id, "u1").await.unwrap().unwrap();
    assert_eq!(thread.messages.len(), 1);
    assert_eq!(thread.messages[0].content, "hi");
}

#[tokio::test]
async fn test_open_circuit_fails_fast() {
    let breaker = Arc::new(CircuitBreaker::new(1, Duration::from_secs(600)));
    let h = harness_with_breaker(vec![Step::Fail("upstream down".into())], TurnConfig::default(), breaker.clone()).await;

    let first = collect(h.graph.spawn_run(h.input("one"), ToolSet::new())).await;
    assert_eq!(end_status(&first), RunStatus::Failed);
    assert!(breaker.is_open("gpt-4o"));

    let second = collect(h.graph.spawn_run(h.input("two"), ToolSet::new())).await;
    assert_eq!(end_status(&second), RunStatus::Failed);
    assert!(errors(&second)[0].contains("temporarily unavailable"));
    assert_eq!(h.client.calls(), 1);
}

#[tokio::test]
async fn test_client_disconnect_still_persists() {
    let h = harness(
        vec![
            tool_reply("call_1", "update_records", json!({ "records": [{"id": "1"}, {"id": "2"}] })),
            text_reply("Done."),
        ],
        TurnConfig::default(),
    )
    .await;
    let tools = ToolSet::new().with_tool(Arc::new(FakeUpdateTool));

    drop(h.graph.spawn_run(h.input("update two"), tools));

    let mut finished = None;
    for _ in 0..100 {
        let usage = h.store.list_usage("u1", None).await.unwrap();
        if let Some(entry) = usage.into_iter().find(|e| e.status.is_terminal()) {
            finished = Some(entry);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let entry = finished.expect("run never finished");
    assert_eq!(entry.records_updated, 2);

    let thread = h.store.get_thread(&h.thread_id, "u1").await.unwrap().unwrap();
    assert_eq!(thread.messages.len(), 4);
}

#[tokio::test]
async fn test_turn_appends_after_existing_history() {
    let h = harness(vec![text_reply("first"), text_reply("second")], TurnConfig::default()).await;

    collect(h.graph.spawn_run(h.input("one"), ToolSet::new())).await;
    let stored = h.store.get_thread(&h.thread_id, "u1").await.unwrap().unwrap();
    let history: Vec<Message> = stored.messages.iter().cloned().map(Message::from).collect();

    collect(h.graph.spawn_run(h.input("two").with_history(history), ToolSet::new())).await;

    let thread = h.store.get_thread(&h.thread_id, "u1").await.unwrap().unwrap();
    let contents: Vec<&str> = thread.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "first", "two", "second"]);
    assert_eq!(h.client.request(1).messages.len(), 4);
}
