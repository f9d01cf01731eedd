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

fn default_limit() -> u32 {
    SessionFilter::default().limit
}

// --- manage_sessions ---

pub struct ManageSessionsTool {
    store: Arc<dyn TrainerStore>,
}

impl ManageSessionsTool {
    pub fn new(store: Arc<dyn TrainerStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum SessionCommand {
    List {
        #[serde(default = "default_limit")]
        limit: u32,
        #[serde(default)]
        finished_only: bool,
    },
    Get {
        session_id: Uuid,
    },
    Create {
        workout_id: Uuid,
        title: String,
        #[serde(default)]
        plan_id: Option<Uuid>,
        #[serde(default)]
        day_dow: Option<DayOfWeek>,
    },
    Finish {
        session_id: Uuid,
    },
    Delete {
        session_id: Uuid,
    },
}

#[async_trait]
impl Tool for ManageSessionsTool {
    fn name(&self) -> &'static str {
        "manage_sessions"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "List past training sessions, read one with its sets, start a session \
                          from a workout, finish it (computes total volume) or delete it."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["list", "get", "create", "finish", "delete"] },
                    "session_id": { "type": "string" },
                    "workout_id": { "type": "string" },
                    "plan_id": { "type": "string" },
                    "title": { "type": "string" },
                    "day_dow": { "type": "string", "enum": ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"] },
                    "limit": { "type": "integer", "minimum": 0, "default": 50 },
                    "finished_only": { "type": "boolean", "default": false }
                },
                "required": ["action"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let command: SessionCommand = match args::parse(input) {
            Ok(command) => command,
            Err(invalid) => return invalid,
        };
        let user = ctx.user_id;

        match command {
            SessionCommand::List {
                limit,
                finished_only,
            } => reply_with(
                self.store.list_sessions(
                    user,
                    SessionFilter {
                        limit,
                        finished_only,
                    },
                ),
                |sessions| format!("Found {} sessions", sessions.len()),
            ),
            SessionCommand::Get { session_id } => reply(self.store.get_session(user, session_id)),
            SessionCommand::Create {
                workout_id,
                title,
                plan_id,
                day_dow,
            } => reply_with(
                self.store.create_session(
                    user,
                    NewSession {
                        workout_id,
                        plan_id,
                        title,
                        day_dow,
                    },
                ),
                |s| format!("Started session: {}", s.title),
            ),
            SessionCommand::Finish { session_id } => {
                reply_with(self.store.finish_session(user, session_id), |s| {
                    format!(
                        "Finished session: {} (total volume {})",
                        s.title,
                        s.total_volume.unwrap_or_default()
                    )
                })
            }
            SessionCommand::Delete { session_id } => {
                reply_done(self.store.delete_session(user, session_id), "Session deleted")
            }
        }
    }
}

// --- manage_session_groups ---

pub struct ManageSessionGroupsTool {
    store: Arc<dyn TrainerStore>,
}

impl ManageSessionGroupsTool {
    pub fn new(store: Arc<dyn TrainerStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum SessionGroupCommand {
    Create {
        session_id: Uuid,
        name: String,
        group_type: GroupType,
        #[serde(default)]
        rest_seconds: Option<u32>,
        #[serde(default = "first_position")]
        position: u32,
    },
}

#[async_trait]
impl Tool for ManageSessionGroupsTool {
    fn name(&self) -> &'static str {
        "manage_session_groups"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Add an exercise group to a session in progress.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["create"] },
                    "session_id": { "type": "string" },
                    "name": { "type": "string" },
                    "group_type": { "type": "string", "enum": ["single", "superset", "triset", "circuit"] },
                    "rest_seconds": { "type": "integer", "minimum": 0 },
                    "position": { "type": "integer", "minimum": 0, "default": 1 }
                },
                "required": ["action", "session_id", "name", "group_type"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let SessionGroupCommand::Create {
            session_id,
            name,
            group_type,
            rest_seconds,
            position,
        } = match args::parse(input) {
            Ok(command) => command,
            Err(invalid) => return invalid,
        };

        reply_with(
            self.store.create_session_group(
                ctx.user_id,
                NewSessionGroup {
                    session_id,
                    name,
                    group_type,
                    rest_seconds,
                    position,
                },
            ),
            |g| format!("Added group: {}", g.name),
        )
    }
}

// --- manage_session_items ---

pub struct ManageSessionItemsTool {
    store: Arc<dyn TrainerStore>,
}

impl ManageSessionItemsTool {
    pub fn new(store: Arc<dyn TrainerStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum SessionItemCommand {
    Create {
        session_group_id: Uuid,
        exercise_name: String,
        #[serde(default = "first_position")]
        position: u32,
        #[serde(default)]
        target_sets: Option<u32>,
        #[serde(default)]
        target_reps: Option<u32>,
        #[serde(default)]
        target_weight: Option<f64>,
        #[serde(default)]
        notes: Option<String>,
    },
}

#[async_trait]
impl Tool for ManageSessionItemsTool {
    fn name(&self) -> &'static str {
        "manage_session_items"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Add an exercise to a session group.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["create"] },
                    "session_group_id": { "type": "string" },
                    "exercise_name": { "type": "string" },
                    "position": { "type": "integer", "minimum": 0, "default": 1 },
                    "target_sets": { "type": "integer", "minimum": 0 },
                    "target_reps": { "type": "integer", "minimum": 0 },
                    "target_weight": { "type": "number", "minimum": 0 },
                    "notes": { "type": "string" }
                },
                "required": ["action", "session_group_id", "exercise_name"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let SessionItemCommand::Create {
            session_group_id,
            exercise_name,
            position,
            target_sets,
            target_reps,
            target_weight,
            notes,
        } = match args::parse(input) {
            Ok(command) => command,
            Err(invalid) => return invalid,
        };

        reply_with(
            self.store.create_session_item(
                ctx.user_id,
                NewSessionItem {
                    session_group_id,
                    exercise_name,
                    position,
                    targets: Targets {
                        sets: target_sets,
                        reps: target_reps,
                        weight: target_weight,
                    },
                    notes,
                },
            ),
            |i| format!("Added exercise: {}", i.exercise_name),
        )
    }
}

// --- manage_sets ---

pub struct ManageSetsTool {
    store: Arc<dyn TrainerStore>,
}

impl ManageSetsTool {
    pub fn new(store: Arc<dyn TrainerStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum SetCommand {
    Log {
        session_item_id: Uuid,
        set_number: u32,
        weight: f64,
        reps: u32,
    },
    Update {
        set_id: Uuid,
        #[serde(default)]
        weight: Option<f64>,
        #[serde(default)]
        reps: Option<u32>,
    },
    Delete {
        set_id: Uuid,
    },
}

#[async_trait]
impl Tool for ManageSetsTool {
    fn name(&self) -> &'static str {
        "manage_sets"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Log a completed set (weight and reps) for a session exercise, \
                          correct a logged set, or delete it."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["log", "update", "delete"] },
                    "session_item_id": { "type": "string" },
                    "set_id": { "type": "string" },
                    "set_number": { "type": "integer", "minimum": 0 },
                    "weight": { "type": "number", "minimum": 0 },
                    "reps": { "type": "integer", "minimum": 0 }
                },
                "required": ["action"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let command: SetCommand = match args::parse(input) {
            Ok(command) => command,
            Err(invalid) => return invalid,
        };
        let user = ctx.user_id;

        match command {
            SetCommand::Log {
                session_item_id,
                set_number,
                weight,
                reps,
            } => reply_with(
                self.store.log_set(
                    user,
                    NewSet {
                        session_item_id,
                        set_number,
                        weight,
                        reps,
                    },
                ),
                |s| format!("Logged set {}: {} x {}", s.set_number, s.reps, s.weight),
            ),
            SetCommand::Update {
                set_id,
                weight,
                reps,
            } => reply_with(
                self.store.update_set(user, set_id, SetPatch { weight, reps }),
                |s| format!("Updated set {}", s.set_number),
            ),
            SetCommand::Delete { set_id } => {
                reply_done(self.store.delete_set(user, set_id), "Set deleted")
            }
        }
    }
}

// --- log_session ---

pub struct LogSessionTool {
    store: Arc<dyn TrainerStore>,
}

impl LogSessionTool {
    pub fn new(store: Arc<dyn TrainerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for LogSessionTool {
    fn name(&self) -> &'static str {
        "log_session"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Record a whole finished session in one step: groups, exercises and \
                          every completed set. Reports the total volume (sum of reps x weight)."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "started_at": { "type": "string", "description": "RFC 3339 timestamp" },
                    "finished_at": { "type": "string", "description": "RFC 3339 timestamp" },
                    "groups": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": { "type": "string" },
                                "group_type": { "type": "string", "enum": ["single", "superset", "triset", "circuit"] },
                                "rest_seconds": { "type": "integer", "minimum": 0 },
                                "exercises": {
                                    "type": "array",
                                    "items": {
                                        "type": "object",
                                        "properties": {
                                            "exercise_name": { "type": "string" },
                                            "target_sets": { "type": "integer", "minimum": 0 },
                                            "sets": {
                                                "type": "array",
                                                "items": {
                                                    "type": "object",
                                                    "properties": {
                                                        "set_number": { "type": "integer", "minimum": 0 },
                                                        "reps": { "type": "integer", "minimum": 0 },
                                                        "weight": { "type": "number", "minimum": 0 }
                                                    },
                                                    "required": ["set_number", "reps", "weight"]
                                                }
                                            }
                                        },
                                        "required": ["exercise_name", "sets"]
                                    }
                                }
                            },
                            "required": ["name", "group_type", "exercises"]
                        }
                    }
                },
                "required": ["title", "started_at", "groups"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let log: SessionLog = match args::parse(input) {
            Ok(log) => log,
            Err(invalid) => return invalid,
        };

        reply_with(self.store.log_session(ctx.user_id, &log), |s| {
            format!(
                "Logged session: {} ({} sets, total volume {})",
                s.title, s.sets_logged, s.total_volume
            )
        })
    }
}
