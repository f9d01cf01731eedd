use super::args;
use super::{reply_done, reply_with};
use crate::domain::fitness::{ExerciseCategory, ExercisePatch, NewExercise};
use crate::domain::models::{ToolDefinition, ToolResult};
use crate::domain::ports::{Tool, ToolContext, TrainerStore};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// The user's exercise library, referenced by workout items.
pub struct ManageExercisesTool {
    store: Arc<dyn TrainerStore>,
}

impl ManageExercisesTool {
    pub fn new(store: Arc<dyn TrainerStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ExerciseCommand {
    List,
    Create {
        name: String,
        #[serde(default)]
        category: ExerciseCategory,
        #[serde(default)]
        instructions: Option<String>,
    },
    Update {
        exercise_id: Uuid,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        category: Option<ExerciseCategory>,
        #[serde(default)]
        instructions: Option<String>,
    },
    Delete {
        exercise_id: Uuid,
    },
}

#[async_trait]
impl Tool for ManageExercisesTool {
    fn name(&self) -> &'static str {
        "manage_exercises"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "List, create, update or delete exercises in the user's library. \
                          Look up an exercise_id here before adding it to a workout."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["list", "create", "update", "delete"] },
                    "exercise_id": { "type": "string" },
                    "name": { "type": "string" },
                    "category": {
                        "type": "string",
                        "enum": ExerciseCategory::ALL.iter().map(|c| c.as_str()).collect::<Vec<_>>()
                    },
                    "instructions": { "type": "string" }
                },
                "required": ["action"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let command: ExerciseCommand = match args::parse(input) {
            Ok(command) => command,
            Err(invalid) => return invalid,
        };
        let user = ctx.user_id;

        match command {
            ExerciseCommand::List => reply_with(self.store.list_exercises(user), |list| {
                format!("Found {} exercises", list.len())
            }),
            ExerciseCommand::Create {
                name,
                category,
                instructions,
            } => reply_with(
                self.store.create_exercise(
                    user,
                    NewExercise {
                        name,
                        category,
                        instructions,
                    },
                ),
                |e| format!("Created exercise: {}", e.name),
            ),
            ExerciseCommand::Update {
                exercise_id,
                name,
                category,
                instructions,
            } => reply_with(
                self.store.update_exercise(
                    user,
                    exercise_id,
                    ExercisePatch {
                        name,
                        category,
                        instructions,
                    },
                ),
                |e| format!("Updated exercise: {}", e.name),
            ),
            ExerciseCommand::Delete { exercise_id } => reply_done(
                self.store.delete_exercise(user, exercise_id),
                "Exercise deleted",
            ),
        }
    }
}
