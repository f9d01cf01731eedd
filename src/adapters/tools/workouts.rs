use super::args::{self, first_position};
use super::{reply, reply_done, reply_with};
use crate::domain::fitness::*;
use crate::domain::models::{ToolDefinition, ToolResult};
use crate::domain::ports::{Tool, ToolContext, TrainerStore};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

// --- manage_workouts ---

pub struct ManageWorkoutsTool {
    store: Arc<dyn TrainerStore>,
}

impl ManageWorkoutsTool {
    pub fn new(store: Arc<dyn TrainerStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum WorkoutCommand {
    List {
        #[serde(default)]
        name: Option<String>,
    },
    Get {
        workout_id: Uuid,
    },
    Create {
        name: String,
        #[serde(default)]
        summary: Option<String>,
    },
    Update {
        workout_id: Uuid,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        summary: Option<String>,
    },
    Delete {
        workout_id: Uuid,
    },
}

#[async_trait]
impl Tool for ManageWorkoutsTool {
    fn name(&self) -> &'static str {
        "manage_workouts"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "List, read, create, rename or delete the user's workout programs. \
                          'get' returns the full tree of days, exercise groups and items."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["list", "get", "create", "update", "delete"] },
                    "workout_id": { "type": "string", "description": "Workout UUID (get, update, delete)" },
                    "name": { "type": "string", "description": "Workout name, or a substring filter for list" },
                    "summary": { "type": "string", "description": "Short description of the program" }
                },
                "required": ["action"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let command: WorkoutCommand = match args::parse(input) {
            Ok(command) => command,
            Err(invalid) => return invalid,
        };
        let user = ctx.user_id;

        match command {
            WorkoutCommand::List { name } => reply_with(
                self.store.list_workouts(user, name.as_deref()),
                |workouts| format!("Found {} workouts", workouts.len()),
            ),
            WorkoutCommand::Get { workout_id } => reply(self.store.get_workout(user, workout_id)),
            WorkoutCommand::Create { name, summary } => reply_with(
                self.store.create_workout(user, NewWorkout { name, summary }),
                |w| format!("Created workout: {}", w.name),
            ),
            WorkoutCommand::Update {
                workout_id,
                name,
                summary,
            } => reply_with(
                self.store
                    .update_workout(user, workout_id, WorkoutPatch { name, summary }),
                |w| format!("Updated workout: {}", w.name),
            ),
            WorkoutCommand::Delete { workout_id } => {
                reply_done(self.store.delete_workout(user, workout_id), "Workout deleted")
            }
        }
    }
}

// --- manage_workout_days ---

pub struct ManageWorkoutDaysTool {
    store: Arc<dyn TrainerStore>,
}

impl ManageWorkoutDaysTool {
    pub fn new(store: Arc<dyn TrainerStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum DayCommand {
    Create {
        workout_id: Uuid,
        dow: DayOfWeek,
        #[serde(default = "first_position")]
        position: u32,
    },
    Delete {
        workout_day_id: Uuid,
    },
}

#[async_trait]
impl Tool for ManageWorkoutDaysTool {
    fn name(&self) -> &'static str {
        "manage_workout_days"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Add a training day to a workout or remove one.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["create", "delete"] },
                    "workout_id": { "type": "string" },
                    "workout_day_id": { "type": "string", "description": "Day UUID (delete)" },
                    "dow": { "type": "string", "enum": ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"] },
                    "position": { "type": "integer", "minimum": 0, "default": 1 }
                },
                "required": ["action"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let command: DayCommand = match args::parse(input) {
            Ok(command) => command,
            Err(invalid) => return invalid,
        };

        match command {
            DayCommand::Create {
                workout_id,
                dow,
                position,
            } => reply_with(
                self.store.create_workout_day(
                    ctx.user_id,
                    NewWorkoutDay {
                        workout_id,
                        dow,
                        position,
                    },
                ),
                |day| format!("Added {} to workout", day.dow),
            ),
            DayCommand::Delete { workout_day_id } => reply_done(
                self.store.delete_workout_day(ctx.user_id, workout_day_id),
                "Workout day deleted",
            ),
        }
    }
}

// --- manage_workout_groups ---

pub struct ManageWorkoutGroupsTool {
    store: Arc<dyn TrainerStore>,
}

impl ManageWorkoutGroupsTool {
    pub fn new(store: Arc<dyn TrainerStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum GroupCommand {
    Create {
        workout_day_id: Uuid,
        name: String,
        group_type: GroupType,
        #[serde(default)]
        rest_seconds: Option<u32>,
        #[serde(default = "first_position")]
        position: u32,
    },
    Update {
        workout_group_id: Uuid,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        rest_seconds: Option<u32>,
    },
    Delete {
        workout_group_id: Uuid,
    },
}

#[async_trait]
impl Tool for ManageWorkoutGroupsTool {
    fn name(&self) -> &'static str {
        "manage_workout_groups"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Create, update or delete an exercise group (single exercise, superset, \
                          triset or circuit) on a workout day."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["create", "update", "delete"] },
                    "workout_day_id": { "type": "string" },
                    "workout_group_id": { "type": "string", "description": "Group UUID (update, delete)" },
                    "name": { "type": "string" },
                    "group_type": { "type": "string", "enum": ["single", "superset", "triset", "circuit"] },
                    "rest_seconds": { "type": "integer", "minimum": 0 },
                    "position": { "type": "integer", "minimum": 0, "default": 1 }
                },
                "required": ["action"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let command: GroupCommand = match args::parse(input) {
            Ok(command) => command,
            Err(invalid) => return invalid,
        };
        let user = ctx.user_id;

        match command {
            GroupCommand::Create {
                workout_day_id,
                name,
                group_type,
                rest_seconds,
                position,
            } => reply_with(
                self.store.create_workout_group(
                    user,
                    NewWorkoutGroup {
                        workout_day_id,
                        name,
                        group_type,
                        rest_seconds,
                        position,
                    },
                ),
                |g| format!("Created {} group: {}", g.group_type, g.name),
            ),
            GroupCommand::Update {
                workout_group_id,
                name,
                rest_seconds,
            } => reply_with(
                self.store.update_workout_group(
                    user,
                    workout_group_id,
                    WorkoutGroupPatch { name, rest_seconds },
                ),
                |g| format!("Updated group: {}", g.name),
            ),
            GroupCommand::Delete { workout_group_id } => reply_done(
                self.store.delete_workout_group(user, workout_group_id),
                "Exercise group deleted",
            ),
        }
    }
}

// --- manage_workout_items ---

pub struct ManageWorkoutItemsTool {
    store: Arc<dyn TrainerStore>,
}

impl ManageWorkoutItemsTool {
    pub fn new(store: Arc<dyn TrainerStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ItemCommand {
    Create {
        workout_group_id: Uuid,
        exercise_id: Uuid,
        #[serde(default = "first_position")]
        position: u32,
        #[serde(default)]
        target_sets: Option<u32>,
        #[serde(default)]
        target_reps: Option<u32>,
        #[serde(default)]
        target_weight: Option<f64>,
        #[serde(default)]
        rest_seconds_override: Option<u32>,
        #[serde(default)]
        notes: Option<String>,
    },
    Update {
        workout_item_id: Uuid,
        #[serde(default)]
        target_sets: Option<u32>,
        #[serde(default)]
        target_reps: Option<u32>,
        #[serde(default)]
        target_weight: Option<f64>,
        #[serde(default)]
        rest_seconds_override: Option<u32>,
        #[serde(default)]
        notes: Option<String>,
    },
    Delete {
        workout_item_id: Uuid,
    },
}

#[async_trait]
impl Tool for ManageWorkoutItemsTool {
    fn name(&self) -> &'static str {
        "manage_workout_items"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Add an exercise to a group with its set, rep and weight targets, \
                          change those targets, or remove the exercise."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["create", "update", "delete"] },
                    "workout_group_id": { "type": "string" },
                    "workout_item_id": { "type": "string", "description": "Item UUID (update, delete)" },
                    "exercise_id": { "type": "string", "description": "Exercise UUID from manage_exercises" },
                    "position": { "type": "integer", "minimum": 0, "default": 1 },
                    "target_sets": { "type": "integer", "minimum": 0 },
                    "target_reps": { "type": "integer", "minimum": 0 },
                    "target_weight": { "type": "number", "minimum": 0 },
                    "rest_seconds_override": { "type": "integer", "minimum": 0 },
                    "notes": { "type": "string" }
                },
                "required": ["action"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let command: ItemCommand = match args::parse(input) {
            Ok(command) => command,
            Err(invalid) => return invalid,
        };
        let user = ctx.user_id;

        match command {
            ItemCommand::Create {
                workout_group_id,
                exercise_id,
                position,
                target_sets,
                target_reps,
                target_weight,
                rest_seconds_override,
                notes,
            } => reply_with(
                self.store.create_workout_item(
                    user,
                    NewWorkoutItem {
                        workout_group_id,
                        exercise_id,
                        position,
                        targets: Targets {
                            sets: target_sets,
                            reps: target_reps,
                            weight: target_weight,
                        },
                        rest_seconds_override,
                        notes,
                    },
                ),
                |_| "Exercise added to group".to_string(),
            ),
            ItemCommand::Update {
                workout_item_id,
                target_sets,
                target_reps,
                target_weight,
                rest_seconds_override,
                notes,
            } => reply_with(
                self.store.update_workout_item(
                    user,
                    workout_item_id,
                    WorkoutItemPatch {
                        targets: Targets {
                            sets: target_sets,
                            reps: target_reps,
                            weight: target_weight,
                        },
                        rest_seconds_override,
                        notes,
                    },
                ),
                |_| "Exercise targets updated".to_string(),
            ),
            ItemCommand::Delete { workout_item_id } => reply_done(
                self.store.delete_workout_item(user, workout_item_id),
                "Exercise removed from group",
            ),
        }
    }
}

// --- import_workout ---

pub struct ImportWorkoutTool {
    store: Arc<dyn TrainerStore>,
}

impl ImportWorkoutTool {
    pub fn new(store: Arc<dyn TrainerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ImportWorkoutTool {
    fn name(&self) -> &'static str {
        "import_workout"
    }

    fn definition(&self) -> ToolDefinition {
        let item = json!({
            "type": "object",
            "properties": {
                "exercise_name": { "type": "string" },
                "category": { "type": "string", "enum": ["strength", "cardio", "flexibility", "balance", "sports"] },
                "target_sets": { "type": "integer", "minimum": 0 },
                "target_reps": { "type": "integer", "minimum": 0 },
                "target_weight": { "type": "number", "minimum": 0 },
                "rest_seconds_override": { "type": "integer", "minimum": 0 },
                "notes": { "type": "string" },
                "position": { "type": "integer", "minimum": 0 }
            },
            "required": ["exercise_name"]
        });
        let group = json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "group_type": { "type": "string", "enum": ["single", "superset", "triset", "circuit"] },
                "rest_seconds": { "type": "integer", "minimum": 0 },
                "position": { "type": "integer", "minimum": 0 },
                "workout_items": { "type": "array", "items": item }
            },
            "required": ["name", "group_type"]
        });

        ToolDefinition {
            name: self.name().to_string(),
            description: "Create a complete workout in one step: days, exercise groups and \
                          exercises with targets. Exercises are matched by name or created. \
                          Nothing is saved if any part fails."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "summary": { "type": "string" },
                    "workout_days": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "dow": { "type": "string", "enum": ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"] },
                                "position": { "type": "integer", "minimum": 0 },
                                "workout_groups": { "type": "array", "items": group }
                            },
                            "required": ["dow"]
                        }
                    }
                },
                "required": ["name", "workout_days"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let template: WorkoutTemplate = match args::parse(input) {
            Ok(template) => template,
            Err(invalid) => return invalid,
        };

        let problems = template.problems();
        if !problems.is_empty() {
            return ToolResult::validation(problems);
        }

        reply_with(self.store.import_workout(ctx.user_id, &template), |s| {
            format!(
                "Imported workout: {} ({} days, {} groups, {} exercises)",
                s.workout_name, s.days, s.groups, s.items
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::tools::tests::fixture;
    use crate::domain::models::ToolErrorKind;

    #[tokio::test]
    async fn test_create_and_list_workout() {
        let (storage, ctx) = fixture();
        let tool = ManageWorkoutsTool::new(storage);

        let created = tool
            .execute(&ctx, json!({ "action": "create", "name": "Leg Day" }))
            .await;
        assert!(created.success);
        assert_eq!(created.message.as_deref(), Some("Created workout: Leg Day"));
        assert_eq!(created.data.as_ref().unwrap()["user_id"], ctx.user_id.to_string());

        let listed = tool.execute(&ctx, json!({ "action": "list" })).await;
        assert_eq!(listed.data.unwrap().as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_workout_is_not_found() {
        let (storage, ctx) = fixture();
        let tool = ManageWorkoutsTool::new(storage);

        let result = tool
            .execute(&ctx, json!({ "action": "get", "workout_id": Uuid::new_v4() }))
            .await;
        assert!(!result.success);
        assert_eq!(result.error_type, Some(ToolErrorKind::NotFound));
        assert!(result.technical_details.is_some());
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected() {
        let (storage, ctx) = fixture();
        let tool = ManageWorkoutsTool::new(storage);

        let result = tool.execute(&ctx, json!({ "action": "create", "name": "   " })).await;
        assert_eq!(result.error_type, Some(ToolErrorKind::ValidationError));
        assert_eq!(result.validation_errors.unwrap(), vec!["name: Name cannot be empty"]);
    }

    #[tokio::test]
    async fn test_day_group_item_chain() {
        let (storage, ctx) = fixture();
        let workouts = ManageWorkoutsTool::new(storage.clone());
        let days = ManageWorkoutDaysTool::new(storage.clone());
        let groups = ManageWorkoutGroupsTool::new(storage.clone());
        let items = ManageWorkoutItemsTool::new(storage.clone());
        let exercises = crate::adapters::tools::exercises::ManageExercisesTool::new(storage);

        let workout = workouts
            .execute(&ctx, json!({ "action": "create", "name": "Upper" }))
            .await
            .data
            .unwrap();
        let day = days
            .execute(&ctx, json!({ "action": "create", "workout_id": workout["id"], "dow": "wednesday" }))
            .await;
        assert_eq!(day.message.as_deref(), Some("Added Wed to workout"));
        let day = day.data.unwrap();
        assert_eq!(day["position"], 1);

        let group = groups
            .execute(
                &ctx,
                json!({ "action": "create", "workout_day_id": day["id"], "name": "Press", "group_type": "superset" }),
            )
            .await
            .data
            .unwrap();
        let exercise = exercises
            .execute(&ctx, json!({ "action": "create", "name": "Overhead Press", "category": "strength" }))
            .await
            .data
            .unwrap();

        let item = items
            .execute(
                &ctx,
                json!({
                    "action": "create",
                    "workout_group_id": group["id"],
                    "exercise_id": exercise["id"],
                    "target_sets": 4,
                    "target_reps": 8,
                    "target_weight": 40
                }),
            )
            .await;
        assert!(item.success, "{:?}", item);

        let detail = workouts
            .execute(&ctx, json!({ "action": "get", "workout_id": workout["id"] }))
            .await
            .data
            .unwrap();
        let stored = &detail["workout_days"][0]["workout_groups"][0]["workout_items"][0];
        assert_eq!(stored["target_weight"], 40.0);
        assert_eq!(stored["exercises"]["name"], "Overhead Press");
    }

    #[tokio::test]
    async fn test_other_users_cannot_touch_workout() {
        let (storage, owner) = fixture();
        let stranger = ToolContext {
            user_id: crate::domain::models::UserId(Uuid::new_v4()),
        };
        let tool = ManageWorkoutsTool::new(storage);

        let workout = tool
            .execute(&owner, json!({ "action": "create", "name": "Private" }))
            .await
            .data
            .unwrap();

        let result = tool
            .execute(&stranger, json!({ "action": "delete", "workout_id": workout["id"] }))
            .await;
        assert_eq!(result.error_type, Some(ToolErrorKind::NotFound));

        let result = tool
            .execute(&stranger, json!({ "action": "update", "workout_id": workout["id"], "name": "Mine" }))
            .await;
        assert_eq!(result.error_type, Some(ToolErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_import_workout_tool() {
        let (storage, ctx) = fixture();
        let tool = ImportWorkoutTool::new(storage);

        let result = tool
            .execute(
                &ctx,
                json!({
                    "name": "PPL",
                    "workout_days": [
                        { "dow": "Mon", "workout_groups": [
                            { "name": "Push", "group_type": "single", "workout_items": [
                                { "exercise_name": "Bench Press", "target_sets": 5, "target_reps": 5 }
                            ]}
                        ]}
                    ]
                }),
            )
            .await;
        assert!(result.success);
        assert_eq!(
            result.message.as_deref(),
            Some("Imported workout: PPL (1 days, 1 groups, 1 exercises)")
        );

        let invalid = tool
            .execute(
                &ctx,
                json!({ "name": "Bad", "workout_days": [{ "dow": "Mon", "workout_groups": [
                    { "name": "A", "group_type": "single", "workout_items": [{ "target_sets": 3 }] }
                ]}]}),
            )
            .await;
        assert_eq!(invalid.error_type, Some(ToolErrorKind::ValidationError));
    }
}
