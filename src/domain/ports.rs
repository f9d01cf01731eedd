use crate::domain::error::{ModelError, StoreError, StoreResult};
use crate::domain::fitness::*;
use crate::domain::models::*;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::Sender;
use uuid::Uuid;

/// Per-call context handed to every tool. The user comes from the
/// authenticated request, never from model arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolContext {
    pub user_id: UserId,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn definition(&self) -> ToolDefinition;
    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult;
}

#[async_trait]
pub trait ModelAdapter: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ModelError>;
    /// Forwards content deltas over `tx` while accumulating the full response.
    async fn stream(&self, req: ChatRequest, tx: Sender<String>) -> Result<ChatResponse, ModelError>;
}

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> StoreResult<Option<UserId>>;
}

/// Workouts, their day/group/item tree, and the exercise library.
pub trait WorkoutStore: Send + Sync {
    fn list_workouts(&self, user: UserId, name_filter: Option<&str>) -> StoreResult<Vec<WorkoutDetail>>;
    fn get_workout(&self, user: UserId, workout_id: Uuid) -> StoreResult<WorkoutDetail>;
    fn create_workout(&self, user: UserId, new: NewWorkout) -> StoreResult<Workout>;
    fn update_workout(&self, user: UserId, workout_id: Uuid, patch: WorkoutPatch) -> StoreResult<Workout>;
    fn delete_workout(&self, user: UserId, workout_id: Uuid) -> StoreResult<()>;

    fn create_workout_day(&self, user: UserId, new: NewWorkoutDay) -> StoreResult<WorkoutDay>;
    fn delete_workout_day(&self, user: UserId, day_id: Uuid) -> StoreResult<()>;

    fn create_workout_group(&self, user: UserId, new: NewWorkoutGroup) -> StoreResult<WorkoutGroup>;
    fn update_workout_group(&self, user: UserId, group_id: Uuid, patch: WorkoutGroupPatch) -> StoreResult<WorkoutGroup>;
    fn delete_workout_group(&self, user: UserId, group_id: Uuid) -> StoreResult<()>;

    fn create_workout_item(&self, user: UserId, new: NewWorkoutItem) -> StoreResult<WorkoutItem>;
    fn update_workout_item(&self, user: UserId, item_id: Uuid, patch: WorkoutItemPatch) -> StoreResult<WorkoutItem>;
    fn delete_workout_item(&self, user: UserId, item_id: Uuid) -> StoreResult<()>;

    fn import_workout(&self, user: UserId, template: &WorkoutTemplate) -> StoreResult<ImportSummary>;

    fn list_exercises(&self, user: UserId) -> StoreResult<Vec<Exercise>>;
    fn create_exercise(&self, user: UserId, new: NewExercise) -> StoreResult<Exercise>;
    fn update_exercise(&self, user: UserId, exercise_id: Uuid, patch: ExercisePatch) -> StoreResult<Exercise>;
    fn delete_exercise(&self, user: UserId, exercise_id: Uuid) -> StoreResult<()>;
}

/// Plans, logged sessions and completed sets.
pub trait TrainingStore: Send + Sync {
    fn list_plans(&self, user: UserId, active_only: bool) -> StoreResult<Vec<PlanView>>;
    fn create_plan(&self, user: UserId, new: NewPlan) -> StoreResult<Plan>;
    fn update_plan(&self, user: UserId, plan_id: Uuid, patch: PlanPatch) -> StoreResult<Plan>;
    fn delete_plan(&self, user: UserId, plan_id: Uuid) -> StoreResult<()>;

    fn list_sessions(&self, user: UserId, filter: SessionFilter) -> StoreResult<Vec<Session>>;
    fn get_session(&self, user: UserId, session_id: Uuid) -> StoreResult<SessionDetail>;
    fn create_session(&self, user: UserId, new: NewSession) -> StoreResult<Session>;
    fn finish_session(&self, user: UserId, session_id: Uuid) -> StoreResult<Session>;
    fn delete_session(&self, user: UserId, session_id: Uuid) -> StoreResult<()>;
    fn create_session_group(&self, user: UserId, new: NewSessionGroup) -> StoreResult<SessionGroup>;
    fn create_session_item(&self, user: UserId, new: NewSessionItem) -> StoreResult<SessionItem>;
    fn log_set(&self, user: UserId, new: NewSet) -> StoreResult<CompletedSet>;
    fn update_set(&self, user: UserId, set_id: Uuid, patch: SetPatch) -> StoreResult<CompletedSet>;
    fn delete_set(&self, user: UserId, set_id: Uuid) -> StoreResult<()>;
    fn log_session(&self, user: UserId, log: &SessionLog) -> StoreResult<SessionLogSummary>;

    fn training_snapshot(&self, user: UserId) -> StoreResult<TrainingSnapshot>;
}

pub trait SettingsStore: Send + Sync {
    fn get_settings(&self, user: UserId) -> StoreResult<UserSettings>;
    fn update_settings(&self, user: UserId, system_instructions: Option<String>) -> StoreResult<UserSettings>;
}

/// User-scoped persistence for the trainer. Every method filters by `user`
/// and treats soft-deleted rows as absent.
pub trait TrainerStore: WorkoutStore + TrainingStore + SettingsStore {}

impl<T: WorkoutStore + TrainingStore + SettingsStore> TrainerStore for T {}

/// Runs a synchronous store call on the blocking pool so SQLite never stalls
/// a runtime worker.
pub async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Other(format!("Store task failed: {}", e)))?
}
