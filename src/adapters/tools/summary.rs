use super::args;
use crate::domain::fitness::TrainingSnapshot;
use crate::domain::models::{ToolDefinition, ToolResult};
use crate::domain::ports::{Tool, ToolContext, TrainerStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
enum Focus {
    Progression,
    Volume,
    Frequency,
    #[default]
    General,
}

impl Focus {
    fn guidance(&self) -> &'static str {
        match self {
            Focus::Progression => "Compare recent sessions of the same workout and suggest load or rep increases.",
            Focus::Volume => "Look at total volume per session and flag sudden jumps or drops.",
            Focus::Frequency => "Check how often the user trains against their active plans.",
            Focus::General => "Give a balanced overview and one or two concrete next steps.",
        }
    }
}

#[derive(Debug, Deserialize)]
struct SummaryRequest {
    #[serde(default)]
    focus: Focus,
}

#[derive(Serialize)]
struct TrainingSummary {
    focus: Focus,
    guidance: &'static str,
    sessions_considered: usize,
    finished_sessions: usize,
    total_volume: f64,
    average_volume: Option<f64>,
    #[serde(flatten)]
    snapshot: TrainingSnapshot,
}

impl TrainingSummary {
    fn new(focus: Focus, snapshot: TrainingSnapshot) -> Self {
        let volumes: Vec<f64> = snapshot
            .sessions
            .iter()
            .filter_map(|s| s.total_volume)
            .collect();
        let total_volume: f64 = volumes.iter().sum();

        Self {
            focus,
            guidance: focus.guidance(),
            sessions_considered: snapshot.sessions.len(),
            finished_sessions: snapshot
                .sessions
                .iter()
                .filter(|s| s.finished_at.is_some())
                .count(),
            total_volume,
            average_volume: (!volumes.is_empty()).then(|| total_volume / volumes.len() as f64),
            snapshot,
        }
    }
}

/// Read-only snapshot the model uses for recommendations.
pub struct TrainingSummaryTool {
    store: Arc<dyn TrainerStore>,
}

impl TrainingSummaryTool {
    pub fn new(store: Arc<dyn TrainerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for TrainingSummaryTool {
    fn name(&self) -> &'static str {
        "get_training_summary"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Summarise the user's recent sessions, workouts and plans to base \
                          training recommendations on."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "focus": {
                        "type": "string",
                        "enum": ["progression", "volume", "frequency", "general"],
                        "default": "general"
                    }
                }
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let request: SummaryRequest = match args::parse(input) {
            Ok(request) => request,
            Err(invalid) => return invalid,
        };

        match self.store.training_snapshot(ctx.user_id) {
            Ok(snapshot) => {
                let summary = TrainingSummary::new(request.focus, snapshot);
                let message = format!(
                    "Summarised {} recent sessions",
                    summary.sessions_considered
                );
                ToolResult::ok_with_message(summary, message)
            }
            Err(e) => ToolResult::from_store_error(&e),
        }
    }
}
