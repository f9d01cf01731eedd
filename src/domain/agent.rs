use crate::adapters::tools::{spawn_tool, ToolRegistry};
use crate::domain::context::ContextBuilder;
use crate::domain::error::AgentError;
use crate::domain::models::*;
use crate::domain::ports::{blocking, ModelAdapter, SettingsStore, ToolContext};
use chrono::Local;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub model: ModelId,
    /// Upper bound on model calls in one turn.
    pub max_turns: usize,
    pub request_timeout: Duration,
    pub stream_timeout: Duration,
    pub parallel_tool_calls: bool,
    pub max_tool_result_chars: usize,
    pub temperature: Option<f32>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            model: ModelId("google/gemini-2.5-flash".to_string()),
            max_turns: 6,
            request_timeout: Duration::from_secs(30),
            stream_timeout: Duration::from_secs(120),
            parallel_tool_calls: true,
            max_tool_result_chars: 50_000,
            temperature: None,
        }
    }
}

/// Result of one completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Assistant text of every round joined in order, which is exactly what a
    /// streaming client sees.
    pub content: String,
    /// Full conversation sent upstream, system prompt first, final answer last.
    pub messages: Vec<Message>,
    pub model_calls: usize,
    pub tool_calls: usize,
}

/// Drives the model/tool loop for a single user turn. Holds no per-turn
/// state, so one instance serves every request.
pub struct TrainerAgent {
    model: Arc<dyn ModelAdapter>,
    tools: Arc<ToolRegistry>,
    settings: Arc<dyn SettingsStore>,
    context: ContextBuilder,
    options: AgentOptions,
}

impl TrainerAgent {
    pub fn new(
        model: Arc<dyn ModelAdapter>,
        tools: Arc<ToolRegistry>,
        settings: Arc<dyn SettingsStore>,
        context: ContextBuilder,
        options: AgentOptions,
    ) -> Self {
        Self {
            model,
            tools,
            settings,
            context,
            options,
        }
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    pub async fn run(&self, user: UserId, history: Vec<Message>) -> Result<TurnOutcome, AgentError> {
        self.drive(user, history, None).await
    }

    /// Same loop as [`run`](Self::run), forwarding content deltas of every
    /// model call over `tx` as they arrive.
    pub async fn run_stream(
        &self,
        user: UserId,
        history: Vec<Message>,
        tx: Sender<String>,
    ) -> Result<TurnOutcome, AgentError> {
        self.drive(user, history, Some(tx)).await
    }

    async fn drive(
        &self,
        user: UserId,
        history: Vec<Message>,
        tx: Option<Sender<String>>,
    ) -> Result<TurnOutcome, AgentError> {
        let settings_store = self.settings.clone();
        let settings = blocking(move || settings_store.get_settings(user)).await?;
        let system = self.context.build(
            Local::now().date_naive(),
            settings.system_instructions.as_deref(),
        );

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(system));
        messages.extend(history);

        let schemas = self.tools.function_schemas();
        let mut tool_calls = 0;
        let mut content = String::new();

        for round in 1..=self.options.max_turns {
            let request = ChatRequest {
                messages: messages.clone(),
                model_id: self.options.model.clone(),
                temperature: self.options.temperature,
                tools: (!schemas.is_empty()).then(|| schemas.clone()),
            };

            debug!(user_id = %user, round, messages = messages.len(), "Calling model");
            let response = self.call_model(request, tx.as_ref()).await?;

            content.push_str(&response.content);
            let calls = response.requested_tools().to_vec();
            if calls.is_empty() {
                info!(user_id = %user, round, tool_calls, "Turn finished");
                messages.push(response.into_message());
                return Ok(TurnOutcome {
                    content,
                    messages,
                    model_calls: round,
                    tool_calls,
                });
            }

            info!(user_id = %user, round, requested = calls.len(), "Model requested tools");
            messages.push(response.into_message());

            let results = self.execute_tools(user, &calls).await;
            let failures = results.iter().filter(|r| !r.is_success()).count();
            if failures > 0 {
                warn!(user_id = %user, round, failures, "Some tool calls failed");
            }

            for (call, result) in calls.iter().zip(results) {
                let body = result.to_content(self.options.max_tool_result_chars);
                messages.push(Message::tool_result(call, body));
            }
            tool_calls += calls.len();
        }

        warn!(user_id = %user, max_turns = self.options.max_turns, "Turn ran out of rounds");
        Err(AgentError::MaxTurnsExceeded(self.options.max_turns))
    }

    async fn call_model(
        &self,
        request: ChatRequest,
        tx: Option<&Sender<String>>,
    ) -> Result<ChatResponse, AgentError> {
        let response = match tx {
            None => {
                let limit = self.options.request_timeout;
                timeout(limit, self.model.chat(request))
                    .await
                    .map_err(|_| AgentError::Timeout(limit.as_secs()))?
            }
            Some(tx) => {
                let limit = self.options.stream_timeout;
                timeout(limit, self.model.stream(request, tx.clone()))
                    .await
                    .map_err(|_| AgentError::Timeout(limit.as_secs()))?
            }
        };
        Ok(response?)
    }

    /// Runs every call and returns results in call order. Each call runs on
    /// its own task so it completes even if the turn is dropped mid-batch.
    async fn execute_tools(&self, user: UserId, calls: &[ToolCall]) -> Vec<ToolResult> {
        let ctx = ToolContext { user_id: user };

        if self.options.parallel_tool_calls {
            let handles: Vec<_> = calls
                .iter()
                .cloned()
                .map(|call| self.start_tool(ctx, call))
                .collect();
            return join_all(handles).await.into_iter().map(settle).collect();
        }

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(settle(self.start_tool(ctx, call.clone()).await));
        }
        results
    }

    fn start_tool(&self, ctx: ToolContext, call: ToolCall) -> JoinHandle<ToolResult> {
        let tools = self.tools.clone();
        spawn_tool(async move { tools.execute(&ctx, &call).await })
    }
}

fn settle(joined: Result<ToolResult, JoinError>) -> ToolResult {
    joined.unwrap_or_else(|e| {
        error!(error = %e, "Tool task did not complete");
        ToolResult::failure(ToolErrorKind::UnknownError, "Tool execution failed")
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::error::ModelError;
    use crate::domain::ports::{SettingsStore, WorkoutStore};
    use crate::storage::Storage;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Replays canned responses and records every request it receives.
    #[derive(Default)]
    pub(crate) struct ScriptedModel {
        replies: Mutex<VecDeque<Result<ChatResponse, ModelError>>>,
        requests: Mutex<Vec<ChatRequest>>,
        delay: Option<Duration>,
    }

    impl ScriptedModel {
        pub(crate) fn new(replies: Vec<ChatResponse>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(Ok).collect()),
                ..Default::default()
            }
        }

        pub(crate) fn failing(err: ModelError) -> Self {
            Self {
                replies: Mutex::new(VecDeque::from(vec![Err(err)])),
                ..Default::default()
            }
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub(crate) fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }

        async fn next(&self, req: ChatRequest) -> Result<ChatResponse, ModelError> {
            self.requests.lock().unwrap().push(req);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ModelError::EmptyResponse))
        }
    }

    #[async_trait]
    impl ModelAdapter for ScriptedModel {
        async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ModelError> {
            self.next(req).await
        }

        async fn stream(&self, req: ChatRequest, tx: Sender<String>) -> Result<ChatResponse, ModelError> {
            let response = self.next(req).await?;
            let chars: Vec<char> = response.content.chars().collect();
            for chunk in chars.chunks(4) {
                let _ = tx.send(chunk.iter().collect()).await;
            }
            Ok(response)
        }
    }

    pub(crate) fn text(content: &str) -> ChatResponse {
        ChatResponse {
            content: content.to_string(),
            role: Role::Assistant,
            tool_calls: None,
        }
    }

    pub(crate) fn tools(calls: Vec<ToolCall>) -> ChatResponse {
        ChatResponse {
            content: String::new(),
            role: Role::Assistant,
            tool_calls: Some(calls),
        }
    }

    pub(crate) fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args.to_string(),
        }
    }

    fn agent_with(model: Arc<ScriptedModel>, storage: Arc<Storage>, options: AgentOptions) -> TrainerAgent {
        TrainerAgent::new(
            model,
            Arc::new(ToolRegistry::standard(storage.clone())),
            storage,
            ContextBuilder::default(),
            options,
        )
    }

    fn setup(replies: Vec<ChatResponse>) -> (TrainerAgent, Arc<ScriptedModel>, Arc<Storage>, UserId) {
        let model = Arc::new(ScriptedModel::new(replies));
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let agent = agent_with(model.clone(), storage.clone(), AgentOptions::default());
        (agent, model, storage, UserId(Uuid::new_v4()))
    }

    fn tool_messages(messages: &[Message]) -> Vec<&Message> {
        messages.iter().filter(|m| m.role == Role::Tool).collect()
    }

    fn content_json(message: &Message) -> Value {
        serde_json::from_str(message.content.as_deref().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_plain_reply_ends_after_one_call() {
        let (agent, model, _, user) = setup(vec![text("Rest days matter too.")]);

        let outcome = agent
            .run(user, vec![Message::user("Should I train today?")])
            .await
            .unwrap();

        assert_eq!(outcome.content, "Rest days matter too.");
        assert_eq!(outcome.model_calls, 1);
        assert_eq!(model.requests().len(), 1);

        let request = &model.requests()[0];
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].content.as_deref(), Some("Should I train today?"));
        assert_eq!(request.tools.as_ref().unwrap().len(), 14);
    }

    #[tokio::test]
    async fn test_create_workout_round_trip() {
        let (agent, model, storage, user) = setup(vec![
            tools(vec![call(
                "call_1",
                "manage_workouts",
                json!({ "action": "create", "name": "Leg Day" }),
            )]),
            text("Leg Day is ready."),
        ]);

        let outcome = agent
            .run(user, vec![Message::user("create a workout called Leg Day")])
            .await
            .unwrap();

        assert_eq!(outcome.content, "Leg Day is ready.");
        assert_eq!(model.requests().len(), 2);

        let workouts = storage.list_workouts(user, None).unwrap();
        assert_eq!(workouts.len(), 1);
        assert_eq!(workouts[0].workout.name, "Leg Day");
        assert_eq!(workouts[0].workout.user_id, user);

        let second = &model.requests()[1];
        let tool_msg = second.messages.last().unwrap();
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_msg.name.as_deref(), Some("manage_workouts"));
        assert_eq!(content_json(tool_msg)["message"], "Created workout: Leg Day");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tools_run_off_runtime_workers() {
        let (agent, _, storage, user) = setup(vec![
            tools(vec![
                call("p", "manage_exercises", json!({ "action": "create", "name": "Pull-up" })),
                call("d", "manage_exercises", json!({ "action": "create", "name": "Dip" })),
            ]),
            text("Both added."),
        ]);

        let outcome = agent.run(user, vec![Message::user("add pull-ups and dips")]).await.unwrap();
        assert_eq!(outcome.content, "Both added.");
        assert_eq!(storage.list_exercises(user).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_every_call_gets_a_result_in_order() {
        let (agent, _, _, user) = setup(vec![
            tools(vec![
                call("a", "manage_workouts", json!({ "action": "get", "workout_id": Uuid::new_v4() })),
                call("b", "manage_exercises", json!({ "action": "create", "name": "Lunge" })),
                call("c", "bench_press_calculator", json!({})),
                call("d", "manage_workouts", json!({ "action": "get", "workout_id": "not-a-uuid" })),
            ]),
            text("Done."),
        ]);

        let outcome = agent.run(user, vec![Message::user("go")]).await.unwrap();
        assert_eq!(outcome.tool_calls, 4);

        let results = tool_messages(&outcome.messages);
        let ids: Vec<_> = results.iter().map(|m| m.tool_call_id.as_deref().unwrap()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);

        assert_eq!(content_json(results[0])["error_type"], "not_found");
        assert_eq!(content_json(results[1])["success"], true);
        assert_eq!(content_json(results[2])["error_type"], "unknown_tool");
        assert_eq!(content_json(results[3])["error_type"], "validation_error");
    }

    #[tokio::test]
    async fn test_sequential_mode_keeps_order() {
        let model = Arc::new(ScriptedModel::new(vec![
            tools(vec![
                call("1", "manage_exercises", json!({ "action": "create", "name": "Squat" })),
                call("2", "manage_exercises", json!({ "action": "list" })),
            ]),
            text("ok"),
        ]));
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let agent = agent_with(
            model,
            storage,
            AgentOptions {
                parallel_tool_calls: false,
                ..Default::default()
            },
        );

        let outcome = agent
            .run(UserId(Uuid::new_v4()), vec![Message::user("go")])
            .await
            .unwrap();

        let results = tool_messages(&outcome.messages);
        assert_eq!(content_json(results[1])["message"], "Found 1 exercises");
    }

    #[tokio::test]
    async fn test_invalid_argument_json() {
        let (agent, _, _, user) = setup(vec![
            tools(vec![ToolCall {
                id: "x".into(),
                name: "manage_workouts".into(),
                arguments: "{\"action\": ".into(),
            }]),
            text("Sorry."),
        ]);

        let outcome = agent.run(user, vec![Message::user("go")]).await.unwrap();
        let result = content_json(tool_messages(&outcome.messages)[0]);
        assert_eq!(result["error_type"], "validation_error");
    }

    #[tokio::test]
    async fn test_max_turns_exceeded() {
        let looping = (0..3)
            .map(|i| tools(vec![call(&i.to_string(), "manage_workouts", json!({ "action": "list" }))]))
            .collect();
        let model = Arc::new(ScriptedModel::new(looping));
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let agent = agent_with(
            model.clone(),
            storage,
            AgentOptions {
                max_turns: 3,
                ..Default::default()
            },
        );

        let err = agent
            .run(UserId(Uuid::new_v4()), vec![Message::user("loop")])
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::MaxTurnsExceeded(3)));
        assert_eq!(err.error_type(), "max_turns_exceeded");
        assert_eq!(model.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_upstream_error_fails_turn() {
        let model = Arc::new(ScriptedModel::failing(ModelError::Http {
            status: 429,
            message: "Rate limit exceeded".into(),
        }));
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let agent = agent_with(model, storage, AgentOptions::default());

        let err = agent
            .run(UserId(Uuid::new_v4()), vec![Message::user("hi")])
            .await
            .unwrap_err();

        assert_eq!(err.error_type(), "upstream_error");
        assert_eq!(err.to_string(), "AI service error (429): Rate limit exceeded");
    }

    #[tokio::test]
    async fn test_slow_model_times_out() {
        let model = Arc::new(ScriptedModel {
            replies: Mutex::new(VecDeque::from(vec![Ok(text("late"))])),
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let agent = agent_with(
            model,
            storage,
            AgentOptions {
                request_timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );

        let err = agent
            .run(UserId(Uuid::new_v4()), vec![Message::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout(0)));
        assert_eq!(err.error_type(), "timeout");
    }

    #[tokio::test]
    async fn test_custom_instructions_reach_the_prompt() {
        let (agent, model, storage, user) = setup(vec![text("ok")]);
        storage
            .update_settings(user, Some("Keep answers short".into()))
            .unwrap();

        agent.run(user, vec![Message::user("hi")]).await.unwrap();

        let system = model.requests()[0].messages[0].content.clone().unwrap();
        assert!(system.ends_with("Custom Instructions: Keep answers short"));
    }

    #[tokio::test]
    async fn test_large_results_are_truncated() {
        let model = Arc::new(ScriptedModel::new(vec![
            tools(vec![call("t", "manage_exercises", json!({ "action": "create", "name": "Plank" }))]),
            text("ok"),
        ]));
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let agent = agent_with(
            model,
            storage,
            AgentOptions {
                max_tool_result_chars: 10,
                ..Default::default()
            },
        );

        let outcome = agent
            .run(UserId(Uuid::new_v4()), vec![Message::user("go")])
            .await
            .unwrap();
        let content = tool_messages(&outcome.messages)[0].content.clone().unwrap();
        assert_eq!(content, "{\"success\"...[truncated]");
    }

    #[tokio::test]
    async fn test_streamed_deltas_match_final_text() {
        let answer = "Three sets of eight at 80 kg, then rest.";
        let replies = vec![
            tools(vec![call("s", "get_training_summary", json!({}))]),
            text(answer),
        ];

        let (agent, _, _, user) = setup(replies.clone());
        let plain = agent.run(user, vec![Message::user("plan?")]).await.unwrap();

        let (agent, _, _, user) = setup(replies);
        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        let streamed = agent
            .run_stream(user, vec![Message::user("plan?")], tx)
            .await
            .unwrap();

        let mut deltas = String::new();
        while let Some(delta) = rx.recv().await {
            deltas.push_str(&delta);
        }

        assert_eq!(deltas, plain.content);
        assert_eq!(streamed.content, plain.content);
    }

    #[tokio::test]
    async fn test_text_beside_tool_calls_reaches_both_transports() {
        let mut checking = tools(vec![call("h", "get_training_summary", json!({}))]);
        checking.content = "Let me check your history. ".into();
        let replies = vec![checking, text("Do 3x8.")];

        let (agent, _, _, user) = setup(replies.clone());
        let plain = agent.run(user, vec![Message::user("what next?")]).await.unwrap();
        assert_eq!(plain.content, "Let me check your history. Do 3x8.");

        let (agent, _, _, user) = setup(replies);
        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        let streamed = agent
            .run_stream(user, vec![Message::user("what next?")], tx)
            .await
            .unwrap();

        let mut deltas = String::new();
        while let Some(delta) = rx.recv().await {
            deltas.push_str(&delta);
        }
        assert_eq!(deltas, plain.content);
        assert_eq!(streamed.content, plain.content);

        let preamble = plain
            .messages
            .iter()
            .find(|m| m.tool_calls.is_some())
            .and_then(|m| m.content.as_deref());
        assert_eq!(preamble, Some("Let me check your history. "));
    }
}
