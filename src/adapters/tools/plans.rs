use super::args;
use super::{reply_done, reply_with};
use crate::domain::fitness::{NewPlan, PlanPatch};
use crate::domain::models::{ToolDefinition, ToolResult};
use crate::domain::ports::{Tool, ToolContext, TrainerStore};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub struct ManagePlansTool {
    store: Arc<dyn TrainerStore>,
}

impl ManagePlansTool {
    pub fn new(store: Arc<dyn TrainerStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum PlanCommand {
    List {
        #[serde(default)]
        active_only: bool,
    },
    Create {
        name: String,
        workout_id: Uuid,
        duration_weeks: u32,
        #[serde(default)]
        start_date: Option<String>,
    },
    Update {
        plan_id: Uuid,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        is_active: Option<bool>,
    },
    Delete {
        plan_id: Uuid,
    },
}

#[async_trait]
impl Tool for ManagePlansTool {
    fn name(&self) -> &'static str {
        "manage_plans"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Schedule a workout as a training plan over a number of weeks, list \
                          plans, activate or deactivate them, or delete one."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["list", "create", "update", "delete"] },
                    "plan_id": { "type": "string" },
                    "workout_id": { "type": "string" },
                    "name": { "type": "string" },
                    "duration_weeks": { "type": "integer", "minimum": 0 },
                    "start_date": { "type": "string", "description": "YYYY-MM-DD, defaults to today" },
                    "is_active": { "type": "boolean" },
                    "active_only": { "type": "boolean", "default": false }
                },
                "required": ["action"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let command: PlanCommand = match args::parse(input) {
            Ok(command) => command,
            Err(invalid) => return invalid,
        };
        let user = ctx.user_id;

        match command {
            PlanCommand::List { active_only } => reply_with(
                self.store.list_plans(user, active_only),
                |plans| format!("Found {} plans", plans.len()),
            ),
            PlanCommand::Create {
                name,
                workout_id,
                duration_weeks,
                start_date,
            } => reply_with(
                self.store.create_plan(
                    user,
                    NewPlan {
                        name,
                        workout_id,
                        duration_weeks,
                        start_date,
                    },
                ),
                |p| format!("Created plan: {} starting {}", p.name, p.start_date),
            ),
            PlanCommand::Update {
                plan_id,
                name,
                is_active,
            } => reply_with(
                self.store
                    .update_plan(user, plan_id, PlanPatch { name, is_active }),
                |p| format!("Updated plan: {}", p.name),
            ),
            PlanCommand::Delete { plan_id } => {
                reply_done(self.store.delete_plan(user, plan_id), "Plan deleted")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::tools::tests::fixture;
    use crate::domain::models::ToolErrorKind;
    use crate::domain::ports::WorkoutStore;
    use crate::domain::fitness::NewWorkout;

    #[tokio::test]
    async fn test_create_plan_for_workout() {
        let (storage, ctx) = fixture();
        let workout = storage
            .create_workout(
                ctx.user_id,
                NewWorkout {
                    name: "5x5".into(),
                    summary: None,
                },
            )
            .unwrap();
        let tool = ManagePlansTool::new(storage);

        let result = tool
            .execute(
                &ctx,
                json!({
                    "action": "create",
                    "name": "Winter block",
                    "workout_id": workout.id,
                    "duration_weeks": 12,
                    "start_date": "2026-11-02"
                }),
            )
            .await;
        assert_eq!(
            result.message.as_deref(),
            Some("Created plan: Winter block starting 2026-11-02")
        );

        let listed = tool
            .execute(&ctx, json!({ "action": "list", "active_only": true }))
            .await
            .data
            .unwrap();
        assert_eq!(listed[0]["workouts"]["name"], "5x5");
    }

    #[tokio::test]
    async fn test_bad_start_date() {
        let (storage, ctx) = fixture();
        let tool = ManagePlansTool::new(storage);

        let result = tool
            .execute(
                &ctx,
                json!({
                    "action": "create",
                    "name": "Block",
                    "workout_id": Uuid::new_v4(),
                    "duration_weeks": 4,
                    "start_date": "next monday"
                }),
            )
            .await;
        assert_eq!(result.error_type, Some(ToolErrorKind::ValidationError));
    }
}
