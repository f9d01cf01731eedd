pub mod args;
pub mod exercises;
pub mod plans;
pub mod sessions;
pub mod settings;
pub mod summary;
pub mod workouts;

use crate::domain::error::StoreResult;
use crate::domain::models::{ToolCall, ToolDefinition, ToolResult};
use crate::domain::ports::{Tool, ToolContext, TrainerStore};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Fixed set of tools built once at startup and shared read-only.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// Every trainer tool, backed by `store`.
    pub fn standard(store: Arc<dyn TrainerStore>) -> Self {
        Self::new(vec![
            Arc::new(workouts::ManageWorkoutsTool::new(store.clone())),
            Arc::new(workouts::ManageWorkoutDaysTool::new(store.clone())),
            Arc::new(workouts::ManageWorkoutGroupsTool::new(store.clone())),
            Arc::new(workouts::ManageWorkoutItemsTool::new(store.clone())),
            Arc::new(workouts::ImportWorkoutTool::new(store.clone())),
            Arc::new(exercises::ManageExercisesTool::new(store.clone())),
            Arc::new(plans::ManagePlansTool::new(store.clone())),
            Arc::new(sessions::ManageSessionsTool::new(store.clone())),
            Arc::new(sessions::ManageSessionGroupsTool::new(store.clone())),
            Arc::new(sessions::ManageSessionItemsTool::new(store.clone())),
            Arc::new(sessions::ManageSetsTool::new(store.clone())),
            Arc::new(sessions::LogSessionTool::new(store.clone())),
            Arc::new(settings::ManageSettingsTool::new(store.clone())),
            Arc::new(summary::TrainingSummaryTool::new(store)),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Definitions wrapped in the provider's function-calling envelope.
    pub fn function_schemas(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| t.definition().to_function_schema())
            .collect()
    }

    /// Runs one model-requested call. Never fails: unknown tools and bad
    /// argument strings come back as failure results for the model to read.
    pub async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolResult {
        let raw = call.arguments.trim();
        let input = if raw.is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(value) => value,
                Err(e) => {
                    warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool arguments are not valid JSON");
                    return ToolResult::validation(vec![format!("arguments: Invalid JSON: {}", e)]);
                }
            }
        };

        self.execute_value(ctx, &call.name, input).await
    }

    pub async fn execute_value(&self, ctx: &ToolContext, name: &str, input: Value) -> ToolResult {
        let Some(tool) = self.get(name) else {
            warn!(tool = %name, "Model requested an unknown tool");
            return ToolResult::unknown_tool(name);
        };

        debug!(tool = %name, user_id = %ctx.user_id, "Executing tool");
        let result = tool.execute(ctx, input).await;
        info!(
            tool = %name,
            user_id = %ctx.user_id,
            success = result.is_success(),
            error_type = ?result.error_type,
            "Tool finished"
        );
        result
    }
}

/// Drives a tool future to completion on the blocking pool. Tools only reach
/// the synchronous store, so they never hold a runtime worker, and a started
/// call finishes even if its caller is dropped.
pub fn spawn_tool<F>(execution: F) -> JoinHandle<ToolResult>
where
    F: Future<Output = ToolResult> + Send + 'static,
{
    let runtime = Handle::current();
    tokio::task::spawn_blocking(move || runtime.block_on(execution))
}

/// Wraps a store outcome as a tool result.
pub(crate) fn reply<T: Serialize>(outcome: StoreResult<T>) -> ToolResult {
    match outcome {
        Ok(data) => ToolResult::ok(data),
        Err(e) => ToolResult::from_store_error(&e),
    }
}

/// Like [`reply`], with a confirmation message built from the data.
pub(crate) fn reply_with<T, F>(outcome: StoreResult<T>, message: F) -> ToolResult
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match outcome {
        Ok(data) => {
            let message = message(&data);
            ToolResult::ok_with_message(data, message)
        }
        Err(e) => ToolResult::from_store_error(&e),
    }
}

pub(crate) fn reply_done(outcome: StoreResult<()>, message: &str) -> ToolResult {
    match outcome {
        Ok(()) => ToolResult::done(message),
        Err(e) => ToolResult::from_store_error(&e),
    }
}
