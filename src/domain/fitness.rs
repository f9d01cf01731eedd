//! Workout, plan and session records plus the input shapes the store accepts.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::UserId;

#[derive(Debug, Clone, Error, PartialEq)]
#[error("Invalid {kind} '{value}', expected one of: {expected}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

/// Generates a closed-set enum that (de)serialises as its canonical string and
/// parses case-insensitively, including any listed aliases.
macro_rules! closed_set {
    ($(#[$meta:meta])* $name:ident, $label:literal {
        $($variant:ident => $canon:literal $(| $alias:literal)*),+ $(,)?
    }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $canon),+
                }
            }

            pub fn expected() -> String {
                Self::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s.trim();
                $(
                    if value.eq_ignore_ascii_case($canon) $(|| value.eq_ignore_ascii_case($alias))* {
                        return Ok($name::$variant);
                    }
                )+
                Err(ParseEnumError {
                    kind: $label,
                    value: s.to_string(),
                    expected: Self::expected(),
                })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(de::Error::custom)
            }
        }
    };
}

closed_set!(DayOfWeek, "day of week" {
    Mon => "Mon" | "monday",
    Tue => "Tue" | "tuesday",
    Wed => "Wed" | "wednesday",
    Thu => "Thu" | "thursday",
    Fri => "Fri" | "friday",
    Sat => "Sat" | "saturday",
    Sun => "Sun" | "sunday",
});

closed_set!(
    /// How the exercises of a group are performed.
    GroupType, "group type" {
    Single => "single" | "straight_set",
    Superset => "superset",
    Triset => "triset",
    Circuit => "circuit",
});

closed_set!(ExerciseCategory, "category" {
    Strength => "strength",
    Cardio => "cardio",
    Flexibility => "flexibility",
    Balance => "balance",
    Sports => "sports",
});

impl Default for ExerciseCategory {
    fn default() -> Self {
        ExerciseCategory::Strength
    }
}

// --- Records ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workout {
    pub id: Uuid,
    pub user_id: UserId,
    pub name: String,
    pub summary: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutDay {
    pub id: Uuid,
    pub workout_id: Uuid,
    pub dow: DayOfWeek,
    pub position: u32,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutGroup {
    pub id: Uuid,
    pub workout_day_id: Uuid,
    pub name: String,
    pub group_type: GroupType,
    pub rest_seconds: Option<u32>,
    pub position: u32,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutItem {
    pub id: Uuid,
    pub workout_group_id: Uuid,
    pub exercise_id: Uuid,
    pub position: u32,
    pub target_sets: Option<u32>,
    pub target_reps: Option<u32>,
    pub target_weight: Option<f64>,
    pub rest_seconds_override: Option<u32>,
    pub notes: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    pub id: Uuid,
    pub user_id: UserId,
    pub name: String,
    pub category: ExerciseCategory,
    pub instructions: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub id: Uuid,
    pub user_id: UserId,
    pub workout_id: Uuid,
    pub name: String,
    pub start_date: String,
    pub duration_weeks: u32,
    pub is_active: bool,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: UserId,
    pub workout_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub title: String,
    pub day_dow: Option<DayOfWeek>,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub total_volume: Option<f64>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionGroup {
    pub id: Uuid,
    pub session_id: Uuid,
    pub name: String,
    pub group_type: GroupType,
    pub rest_seconds: Option<u32>,
    pub position: u32,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionItem {
    pub id: Uuid,
    pub session_group_id: Uuid,
    pub exercise_name: String,
    pub position: u32,
    pub target_sets: Option<u32>,
    pub target_reps: Option<u32>,
    pub target_weight: Option<f64>,
    pub rest_seconds: Option<u32>,
    pub notes: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedSet {
    pub id: Uuid,
    pub session_item_id: Uuid,
    pub set_number: u32,
    pub weight: f64,
    pub reps: u32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSettings {
    pub user_id: UserId,
    pub system_instructions: Option<String>,
    pub updated_at: Option<String>,
}

// --- Nested read views ---

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkoutDetail {
    #[serde(flatten)]
    pub workout: Workout,
    pub workout_days: Vec<WorkoutDayDetail>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkoutDayDetail {
    #[serde(flatten)]
    pub day: WorkoutDay,
    pub workout_groups: Vec<WorkoutGroupDetail>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkoutGroupDetail {
    #[serde(flatten)]
    pub group: WorkoutGroup,
    pub workout_items: Vec<WorkoutItemDetail>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkoutItemDetail {
    #[serde(flatten)]
    pub item: WorkoutItem,
    pub exercises: Option<Exercise>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkoutSummary {
    pub id: Uuid,
    pub name: String,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlanView {
    #[serde(flatten)]
    pub plan: Plan,
    pub workouts: Option<WorkoutSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    pub session_groups: Vec<SessionGroupDetail>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionGroupDetail {
    #[serde(flatten)]
    pub group: SessionGroup,
    pub session_items: Vec<SessionItemDetail>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionItemDetail {
    #[serde(flatten)]
    pub item: SessionItem,
    pub completed_sets: Vec<CompletedSet>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrainingSnapshot {
    pub sessions: Vec<Session>,
    pub workouts: Vec<WorkoutSummary>,
    pub plans: Vec<Plan>,
}

// --- Inputs ---

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewWorkout {
    pub name: String,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkoutPatch {
    pub name: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkoutDay {
    pub workout_id: Uuid,
    pub dow: DayOfWeek,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkoutGroup {
    pub workout_day_id: Uuid,
    pub name: String,
    pub group_type: GroupType,
    pub rest_seconds: Option<u32>,
    pub position: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkoutGroupPatch {
    pub name: Option<String>,
    pub rest_seconds: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Targets {
    pub sets: Option<u32>,
    pub reps: Option<u32>,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkoutItem {
    pub workout_group_id: Uuid,
    pub exercise_id: Uuid,
    pub position: u32,
    pub targets: Targets,
    pub rest_seconds_override: Option<u32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkoutItemPatch {
    pub targets: Targets,
    pub rest_seconds_override: Option<u32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExercise {
    pub name: String,
    pub category: ExerciseCategory,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExercisePatch {
    pub name: Option<String>,
    pub category: Option<ExerciseCategory>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPlan {
    pub name: String,
    pub workout_id: Uuid,
    pub duration_weeks: u32,
    /// `YYYY-MM-DD`; today when absent.
    pub start_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanPatch {
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub workout_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub title: String,
    pub day_dow: Option<DayOfWeek>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionFilter {
    pub limit: u32,
    pub finished_only: bool,
}

impl Default for SessionFilter {
    fn default() -> Self {
        Self {
            limit: 50,
            finished_only: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSessionGroup {
    pub session_id: Uuid,
    pub name: String,
    pub group_type: GroupType,
    pub rest_seconds: Option<u32>,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSessionItem {
    pub session_group_id: Uuid,
    pub exercise_name: String,
    pub position: u32,
    pub targets: Targets,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSet {
    pub session_item_id: Uuid,
    pub set_number: u32,
    pub weight: f64,
    pub reps: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetPatch {
    pub weight: Option<f64>,
    pub reps: Option<u32>,
}

// --- Nested templates (import cascade and session logging) ---

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WorkoutTemplate {
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, alias = "days")]
    pub workout_days: Vec<DayTemplate>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DayTemplate {
    pub dow: DayOfWeek,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default, alias = "groups")]
    pub workout_groups: Vec<GroupTemplate>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GroupTemplate {
    pub name: String,
    pub group_type: GroupType,
    #[serde(default)]
    pub rest_seconds: Option<u32>,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default, alias = "items")]
    pub workout_items: Vec<ItemTemplate>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ItemTemplate {
    #[serde(default)]
    pub exercise_name: Option<String>,
    /// Exported workouts nest the full exercise record here.
    #[serde(default)]
    pub exercises: Option<ExerciseTemplate>,
    #[serde(default)]
    pub category: Option<ExerciseCategory>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub target_sets: Option<u32>,
    #[serde(default)]
    pub target_reps: Option<u32>,
    #[serde(default)]
    pub target_weight: Option<f64>,
    #[serde(default)]
    pub rest_seconds_override: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub position: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExerciseTemplate {
    pub name: String,
    #[serde(default)]
    pub category: Option<ExerciseCategory>,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl ItemTemplate {
    pub fn exercise_name(&self) -> Option<&str> {
        self.exercise_name
            .as_deref()
            .or_else(|| self.exercises.as_ref().map(|e| e.name.as_str()))
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn category(&self) -> ExerciseCategory {
        self.category
            .or_else(|| self.exercises.as_ref().and_then(|e| e.category))
            .unwrap_or_default()
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions
            .as_deref()
            .or_else(|| self.exercises.as_ref().and_then(|e| e.instructions.as_deref()))
    }
}

impl WorkoutTemplate {
    /// Structural problems that would make the cascade fail half way.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("name: Name cannot be empty".to_string());
        }
        for (d, day) in self.workout_days.iter().enumerate() {
            for (g, group) in day.workout_groups.iter().enumerate() {
                if group.name.trim().is_empty() {
                    problems.push(format!(
                        "workout_days[{}].workout_groups[{}].name: Name cannot be empty",
                        d, g
                    ));
                }
                for (i, item) in group.workout_items.iter().enumerate() {
                    if item.exercise_name().is_none() {
                        problems.push(format!(
                            "workout_days[{}].workout_groups[{}].workout_items[{}]: exercise_name is required",
                            d, g, i
                        ));
                    }
                }
            }
        }
        problems
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImportSummary {
    pub workout_id: Uuid,
    pub workout_name: String,
    pub days: usize,
    pub groups: usize,
    pub items: usize,
    pub exercises_created: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SessionLog {
    pub title: String,
    pub started_at: String,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub groups: Vec<LoggedGroup>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggedGroup {
    pub name: String,
    pub group_type: GroupType,
    #[serde(default)]
    pub rest_seconds: Option<u32>,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub exercises: Vec<LoggedExercise>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggedExercise {
    pub exercise_name: String,
    #[serde(default)]
    pub target_sets: Option<u32>,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub sets: Vec<LoggedSet>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct LoggedSet {
    pub set_number: u32,
    pub reps: u32,
    pub weight: f64,
}

impl SessionLog {
    pub fn total_volume(&self) -> f64 {
        self.groups
            .iter()
            .flat_map(|g| &g.exercises)
            .flat_map(|e| &e.sets)
            .map(|s| f64::from(s.reps) * s.weight)
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionLogSummary {
    pub session_id: Uuid,
    pub title: String,
    pub total_volume: f64,
    pub sets_logged: usize,
}
