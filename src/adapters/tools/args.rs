//! Argument checks shared by every tool. The raw JSON is scanned for badly
//! shaped fields first so the model gets every problem at once, then it is
//! deserialised into the tool's typed command.

use crate::domain::fitness::{DayOfWeek, ExerciseCategory, GroupType};
use crate::domain::models::ToolResult;
use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::str::FromStr;

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("uuid pattern is valid")
});

const ID_FIELDS: &[&str] = &[
    "workout_id",
    "exercise_id",
    "workout_day_id",
    "workout_group_id",
    "workout_item_id",
    "plan_id",
    "session_id",
    "session_group_id",
    "session_item_id",
    "set_id",
];

const NAME_FIELDS: &[&str] = &["name", "title", "exercise_name"];

const NON_NEGATIVE_FIELDS: &[&str] = &[
    "target_sets",
    "target_reps",
    "target_weight",
    "rest_seconds",
    "rest_seconds_override",
    "duration_weeks",
    "position",
    "set_number",
    "weight",
    "reps",
    "limit",
];

pub(crate) fn first_position() -> u32 {
    1
}

/// Validates `input` and deserialises it into `T`. A failure comes back as a
/// ready-made `validation_error` result.
pub fn parse<T: DeserializeOwned>(input: Value) -> Result<T, ToolResult> {
    if !input.is_object() {
        return Err(ToolResult::validation(vec![
            "arguments: Expected a JSON object".to_string(),
        ]));
    }

    let problems = scan(&input);
    if !problems.is_empty() {
        return Err(ToolResult::validation(problems));
    }

    serde_json::from_value(input).map_err(|e| ToolResult::validation(vec![e.to_string()]))
}

/// Walks the whole argument tree, nested templates included, and reports
/// every field whose shape is wrong as `path: message`.
pub fn scan(input: &Value) -> Vec<String> {
    let mut problems = Vec::new();
    scan_value("", input, &mut problems);
    problems
}

fn scan_value(path: &str, value: &Value, problems: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, field) in map {
                let field_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                check_field(key, &field_path, field, problems);
                scan_value(&field_path, field, problems);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                scan_value(&format!("{}[{}]", path, i), item, problems);
            }
        }
        _ => {}
    }
}

fn check_field(key: &str, path: &str, value: &Value, problems: &mut Vec<String>) {
    if value.is_null() {
        return;
    }

    let problem = if ID_FIELDS.contains(&key) {
        match value.as_str() {
            Some(id) if UUID_RE.is_match(id) => None,
            _ => Some(format!("Invalid UUID format for {}", key)),
        }
    } else if NAME_FIELDS.contains(&key) {
        match value.as_str() {
            Some(name) if !name.trim().is_empty() => None,
            Some(_) => Some("Name cannot be empty".to_string()),
            None => Some("Expected a string".to_string()),
        }
    } else if NON_NEGATIVE_FIELDS.contains(&key) {
        match value.as_f64() {
            Some(n) if n >= 0.0 => None,
            Some(_) => Some("Must be a non-negative number".to_string()),
            None => Some("Expected a number".to_string()),
        }
    } else {
        match key {
            "category" => closed_set::<ExerciseCategory>(value),
            "group_type" => closed_set::<GroupType>(value),
            "dow" | "day_dow" => closed_set::<DayOfWeek>(value),
            "start_date" => match value.as_str() {
                Some(date) if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok() => None,
                _ => Some("Expected a date in YYYY-MM-DD format".to_string()),
            },
            "started_at" | "finished_at" => match value.as_str() {
                Some(ts) if DateTime::parse_from_rfc3339(ts).is_ok() => None,
                _ => Some("Expected an RFC 3339 timestamp".to_string()),
            },
            _ => None,
        }
    };

    if let Some(problem) = problem {
        problems.push(format!("{}: {}", path, problem));
    }
}

fn closed_set<T>(value: &Value) -> Option<String>
where
    T: FromStr,
    T::Err: ToString,
{
    match value.as_str() {
        Some(raw) => raw.parse::<T>().err().map(|e| e.to_string()),
        None => Some("Expected a string".to_string()),
    }
}
