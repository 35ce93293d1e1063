use crate::circuit_breaker::CircuitBreaker;
use crate::fsm::TurnPhase;
use crate::node::{emit, EventSender, Node, NodeType};
use crate::nodes::{LLMNode, ToolNode};
use crate::router::{Router, SimpleRouter};
use crate::usage::UsageRecorder;
use crmpilot_llm::{ChatClient, Message};
use crmpilot_persist::{ThreadMessage, ThreadStore, UsageStore};
use crmpilot_tools::ToolSet;
use crmpilot_types::{RunStatus, StreamEvent, TurnConfig, TurnInput, TurnState};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Events buffered between the turn task and the HTTP response
const EVENT_BUFFER: usize = 1000;

/// Chat turn executor.
///
/// Cheap to clone; one instance serves every request. Each call to
/// [`Graph::spawn_run`] runs one turn on its own task.
#[derive(Clone)]
pub struct Graph {
    client: Arc<dyn ChatClient>,
    threads: Arc<dyn ThreadStore>,
    usage: Arc<dyn UsageStore>,
    config: TurnConfig,
    breaker: Arc<CircuitBreaker>,
}

/// Terminal phase of the loop and, on failure, the reason already sent to
/// the client
struct LoopOutcome {
    phase: TurnPhase,
    error: Option<String>,
}

impl LoopOutcome {
    fn failed(message: String) -> Self {
        Self {
            phase: TurnPhase::Failed,
            error: Some(message),
        }
    }
}

impl Graph {
    pub fn new(
        client: Arc<dyn ChatClient>,
        threads: Arc<dyn ThreadStore>,
        usage: Arc<dyn UsageStore>,
        config: TurnConfig,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self { client, threads, usage, config, breaker }
    }

    pub fn builder() -> crate::builder::GraphBuilder {
        crate::builder::GraphBuilder::new()
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Spawn the turn in the background and return its event stream.
    ///
    /// The stream starts with `init_stream` and always ends with
    /// `end_stream`. The thread and the usage entry are written before
    /// `end_stream` is sent.
    pub fn spawn_run(&self, input: TurnInput, tools: ToolSet) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let graph = self.clone();

        tokio::spawn(async move {
            graph.execute(input, tools, tx).await;
        });

        rx
    }

    async fn execute(&self, input: TurnInput, tools: ToolSet, event_tx: EventSender) {
        let start_time = Instant::now();
        let mut state = TurnState::from_input(input);

        tracing::info!(
            run_id = %state.run_id,
            thread_id = %state.thread_id,
            agent = %state.agent,
            tools = tools.len(),
            "turn started"
        );

        emit(
            &event_tx,
            StreamEvent::InitStream {
                run_id: state.run_id.clone(),
                thread_id: state.thread_id.clone(),
                timestamp: chrono::Utc::now().timestamp_millis(),
            },
        )
        .await;

        let recorder = UsageRecorder::new(self.usage.clone(), &state);
        let outcome = match self.config.execution_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.execute_loop(&mut state, tools, recorder.clone(), &event_tx)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        let message = format!("Turn timed out after {}s", limit.as_secs());
                        emit(&event_tx, StreamEvent::Error { message: message.clone(), node_id: None }).await;
                        LoopOutcome::failed(message)
                    }
                }
            }
            None => self.execute_loop(&mut state, tools, recorder.clone(), &event_tx).await,
        };

        let mut status = outcome.phase.status();
        let mut error = outcome.error;
        if status == RunStatus::Failed {
            close_unanswered_tool_calls(&mut state);
        }

        if let Err(e) = self.save_thread(&state).await {
            tracing::error!(run_id = %state.run_id, thread_id = %state.thread_id, error = %e, "failed to save thread");
            let message = format!("Failed to save conversation: {e}");
            emit(&event_tx, StreamEvent::Error { message: message.clone(), node_id: None }).await;
            status = RunStatus::Failed;
            error.get_or_insert(message);
        }

        recorder.finalize(status, error).await;

        let total_duration_ms = start_time.elapsed().as_millis() as u64;
        tracing::info!(run_id = %state.run_id, status = %status, total_duration_ms, "turn finished");

        emit(&event_tx, StreamEvent::EndStream { status, total_duration_ms }).await;
    }

    /// Drive the FSM until it reaches a terminal phase or the step cap
    async fn execute_loop(
        &self,
        state: &mut TurnState,
        tools: ToolSet,
        recorder: UsageRecorder,
        event_tx: &EventSender,
    ) -> LoopOutcome {
        let llm_node = LLMNode::new(self.client.clone(), tools.definitions(), self.breaker.clone());
        let tool_node = ToolNode::new(tools, recorder);
        let router = SimpleRouter;

        let mut phase = TurnPhase::AwaitingModel;
        let mut steps = 0;

        while let Some(node_type) = phase.node() {
            if steps >= self.config.max_steps {
                let message = format!("Max steps ({}) reached", self.config.max_steps);
                tracing::warn!(run_id = %state.run_id, steps, "step cap reached");
                emit(event_tx, StreamEvent::Error { message: message.clone(), node_id: None }).await;
                return LoopOutcome::failed(message);
            }

            let node: &dyn Node = match node_type {
                NodeType::LLM => &llm_node,
                NodeType::Tool => &tool_node,
            };

            let result = node.execute(state, event_tx.clone()).await;
            steps += 1;

            phase = match result {
                Ok(()) => phase.advance(router.next(state, node_type)),
                Err(e) => {
                    tracing::error!(run_id = %state.run_id, node = node_type.as_str(), error = %e, "turn step failed");
                    let message = e.to_string();
                    emit(
                        event_tx,
                        StreamEvent::Error {
                            message: message.clone(),
                            node_id: Some(node_type.as_str().to_string()),
                        },
                    )
                    .await;
                    return LoopOutcome::failed(message);
                }
            };
        }

        LoopOutcome { phase, error: None }
    }

    async fn save_thread(&self, state: &TurnState) -> crmpilot_persist::Result<()> {
        let messages: Vec<ThreadMessage> = state
            .new_messages()
            .iter()
            .filter_map(ThreadMessage::from_llm)
            .collect();
        if messages.is_empty() {
            return Ok(());
        }
        self.threads
            .append_messages(&state.thread_id, &state.user_id, messages)
            .await
    }
}

/// Give every tool call of the last assistant message a result, so the saved
/// history stays valid for the next model call after an interrupted turn.
fn close_unanswered_tool_calls(state: &mut TurnState) {
    let Some(pos) = state
        .messages
        .iter()
        .rposition(|m| matches!(m, Message::AI { .. }))
    else {
        return;
    };

    let answered: HashSet<&str> = state.messages[pos + 1..]
        .iter()
        .filter_map(|m| match m {
            Message::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
            _ => None,
        })
        .collect();
    let unanswered: Vec<String> = state.messages[pos]
        .tool_calls()
        .iter()
        .filter(|call| !answered.contains(call.id.as_str()))
        .map(|call| call.id.clone())
        .collect();

    for id in unanswered {
        state.add_tool_result(id, "Tool execution skipped: the turn ended early".to_string());
    }
}
