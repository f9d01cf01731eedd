use super::{
    enum_col, fetch_all, fetch_one, now, require, soft_delete, user_col, uuid_col, Assignments,
    Storage,
};
use crate::domain::error::{StoreError, StoreResult};
use crate::domain::fitness::*;
use crate::domain::models::UserId;
use crate::domain::ports::WorkoutStore;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

const WORKOUT_COLS: &str = "id, user_id, name, summary, updated_at";
const DAY_COLS: &str = "id, workout_id, dow, position, updated_at";
const GROUP_COLS: &str = "id, workout_day_id, name, group_type, rest_seconds, position, updated_at";
const ITEM_COLS: &str = "id, workout_group_id, exercise_id, position, target_sets, target_reps, \
                         target_weight, rest_seconds_override, notes, updated_at";
const EXERCISE_COLS: &str = "id, user_id, name, category, instructions, updated_at";

pub(super) const OWN_WORKOUT: &str =
    "SELECT 1 FROM workouts WHERE id = ?1 AND user_id = ?2 AND deleted_at IS NULL";

const OWN_DAY: &str = "SELECT 1 FROM workout_days d
     JOIN workouts w ON w.id = d.workout_id
     WHERE d.id = ?1 AND w.user_id = ?2
       AND d.deleted_at IS NULL AND w.deleted_at IS NULL";

const OWN_GROUP: &str = "SELECT 1 FROM workout_groups g
     JOIN workout_days d ON d.id = g.workout_day_id
     JOIN workouts w ON w.id = d.workout_id
     WHERE g.id = ?1 AND w.user_id = ?2
       AND g.deleted_at IS NULL AND d.deleted_at IS NULL AND w.deleted_at IS NULL";

const OWN_ITEM: &str = "SELECT 1 FROM workout_items i
     JOIN workout_groups g ON g.id = i.workout_group_id
     JOIN workout_days d ON d.id = g.workout_day_id
     JOIN workouts w ON w.id = d.workout_id
     WHERE i.id = ?1 AND w.user_id = ?2
       AND i.deleted_at IS NULL AND g.deleted_at IS NULL
       AND d.deleted_at IS NULL AND w.deleted_at IS NULL";

const OWN_EXERCISE: &str =
    "SELECT 1 FROM exercises WHERE id = ?1 AND user_id = ?2 AND deleted_at IS NULL";

fn workout_row(row: &Row<'_>) -> rusqlite::Result<Workout> {
    Ok(Workout {
        id: uuid_col(row, 0)?,
        user_id: user_col(row, 1)?,
        name: row.get(2)?,
        summary: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn day_row(row: &Row<'_>) -> rusqlite::Result<WorkoutDay> {
    Ok(WorkoutDay {
        id: uuid_col(row, 0)?,
        workout_id: uuid_col(row, 1)?,
        dow: enum_col(row, 2)?,
        position: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn group_row(row: &Row<'_>) -> rusqlite::Result<WorkoutGroup> {
    Ok(WorkoutGroup {
        id: uuid_col(row, 0)?,
        workout_day_id: uuid_col(row, 1)?,
        name: row.get(2)?,
        group_type: enum_col(row, 3)?,
        rest_seconds: row.get(4)?,
        position: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn item_row(row: &Row<'_>) -> rusqlite::Result<WorkoutItem> {
    Ok(WorkoutItem {
        id: uuid_col(row, 0)?,
        workout_group_id: uuid_col(row, 1)?,
        exercise_id: uuid_col(row, 2)?,
        position: row.get(3)?,
        target_sets: row.get(4)?,
        target_reps: row.get(5)?,
        target_weight: row.get(6)?,
        rest_seconds_override: row.get(7)?,
        notes: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn exercise_row(row: &Row<'_>) -> rusqlite::Result<Exercise> {
    Ok(Exercise {
        id: uuid_col(row, 0)?,
        user_id: user_col(row, 1)?,
        name: row.get(2)?,
        category: enum_col(row, 3)?,
        instructions: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn load_workout(conn: &Connection, id: Uuid) -> StoreResult<Workout> {
    let sql = format!("SELECT {} FROM workouts WHERE id = ?1", WORKOUT_COLS);
    fetch_one(conn, &sql, params![id.to_string()], "Workout", workout_row)
}

fn load_day(conn: &Connection, id: Uuid) -> StoreResult<WorkoutDay> {
    let sql = format!("SELECT {} FROM workout_days WHERE id = ?1", DAY_COLS);
    fetch_one(conn, &sql, params![id.to_string()], "Workout day", day_row)
}

fn load_group(conn: &Connection, id: Uuid) -> StoreResult<WorkoutGroup> {
    let sql = format!("SELECT {} FROM workout_groups WHERE id = ?1", GROUP_COLS);
    fetch_one(conn, &sql, params![id.to_string()], "Workout group", group_row)
}

fn load_item(conn: &Connection, id: Uuid) -> StoreResult<WorkoutItem> {
    let sql = format!("SELECT {} FROM workout_items WHERE id = ?1", ITEM_COLS);
    fetch_one(conn, &sql, params![id.to_string()], "Workout item", item_row)
}

fn load_exercise(conn: &Connection, id: Uuid) -> StoreResult<Exercise> {
    let sql = format!("SELECT {} FROM exercises WHERE id = ?1", EXERCISE_COLS);
    fetch_one(conn, &sql, params![id.to_string()], "Exercise", exercise_row)
}

/// Builds the full day → group → item → exercise tree of a workout.
fn workout_detail(conn: &Connection, workout: Workout) -> StoreResult<WorkoutDetail> {
    let days_sql = format!(
        "SELECT {} FROM workout_days WHERE workout_id = ?1 AND deleted_at IS NULL ORDER BY position, updated_at",
        DAY_COLS
    );
    let groups_sql = format!(
        "SELECT {} FROM workout_groups WHERE workout_day_id = ?1 AND deleted_at IS NULL ORDER BY position, updated_at",
        GROUP_COLS
    );
    let items_sql = format!(
        "SELECT {} FROM workout_items WHERE workout_group_id = ?1 AND deleted_at IS NULL ORDER BY position, updated_at",
        ITEM_COLS
    );
    let exercise_sql = format!(
        "SELECT {} FROM exercises WHERE id = ?1 AND deleted_at IS NULL",
        EXERCISE_COLS
    );

    let mut workout_days = Vec::new();
    for day in fetch_all(conn, &days_sql, params![workout.id.to_string()], day_row)? {
        let mut workout_groups = Vec::new();
        for group in fetch_all(conn, &groups_sql, params![day.id.to_string()], group_row)? {
            let mut workout_items = Vec::new();
            for item in fetch_all(conn, &items_sql, params![group.id.to_string()], item_row)? {
                let exercises = conn
                    .query_row(&exercise_sql, params![item.exercise_id.to_string()], exercise_row)
                    .optional()?;
                workout_items.push(WorkoutItemDetail { item, exercises });
            }
            workout_groups.push(WorkoutGroupDetail {
                group,
                workout_items,
            });
        }
        workout_days.push(WorkoutDayDetail {
            day,
            workout_groups,
        });
    }

    Ok(WorkoutDetail {
        workout,
        workout_days,
    })
}

fn insert_workout(conn: &Connection, user: UserId, name: &str, summary: Option<&str>) -> StoreResult<Uuid> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO workouts (id, user_id, name, summary, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id.to_string(), user.to_string(), name.trim(), summary, now()],
    )?;
    Ok(id)
}

fn insert_day(conn: &Connection, workout_id: Uuid, dow: DayOfWeek, position: u32) -> StoreResult<Uuid> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO workout_days (id, workout_id, dow, position, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id.to_string(), workout_id.to_string(), dow.as_str(), position, now()],
    )?;
    Ok(id)
}

fn insert_group(
    conn: &Connection,
    day_id: Uuid,
    name: &str,
    group_type: GroupType,
    rest_seconds: Option<u32>,
    position: u32,
) -> StoreResult<Uuid> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO workout_groups (id, workout_day_id, name, group_type, rest_seconds, position, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id.to_string(),
            day_id.to_string(),
            name.trim(),
            group_type.as_str(),
            rest_seconds,
            position,
            now()
        ],
    )?;
    Ok(id)
}

fn insert_item(conn: &Connection, new: &NewWorkoutItem) -> StoreResult<Uuid> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO workout_items (id, workout_group_id, exercise_id, position, target_sets, target_reps,
                                    target_weight, rest_seconds_override, notes, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            id.to_string(),
            new.workout_group_id.to_string(),
            new.exercise_id.to_string(),
            new.position,
            new.targets.sets,
            new.targets.reps,
            new.targets.weight,
            new.rest_seconds_override,
            new.notes,
            now()
        ],
    )?;
    Ok(id)
}

fn insert_exercise(
    conn: &Connection,
    user: UserId,
    name: &str,
    category: ExerciseCategory,
    instructions: Option<&str>,
) -> StoreResult<Uuid> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO exercises (id, user_id, name, category, instructions, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id.to_string(),
            user.to_string(),
            name.trim(),
            category.as_str(),
            instructions,
            now()
        ],
    )?;
    Ok(id)
}

fn find_exercise_by_name(conn: &Connection, user: UserId, name: &str) -> StoreResult<Option<Uuid>> {
    let id: Option<String> = conn
        .query_row(
            "SELECT id FROM exercises
             WHERE user_id = ?1 AND lower(name) = lower(?2) AND deleted_at IS NULL
             ORDER BY updated_at LIMIT 1",
            params![user.to_string(), name.trim()],
            |row| row.get(0),
        )
        .optional()?;
    id.map(|raw| Uuid::parse_str(&raw).map_err(|e| StoreError::Other(e.to_string())))
        .transpose()
}

impl WorkoutStore for Storage {
    fn list_workouts(&self, user: UserId, name_filter: Option<&str>) -> StoreResult<Vec<WorkoutDetail>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM workouts
             WHERE user_id = ?1 AND deleted_at IS NULL
               AND (?2 IS NULL OR instr(lower(name), lower(?2)) > 0)
             ORDER BY updated_at DESC",
            WORKOUT_COLS
        );
        let filter = name_filter.map(str::trim).filter(|f| !f.is_empty());
        let workouts = fetch_all(&conn, &sql, params![user.to_string(), filter], workout_row)?;

        workouts
            .into_iter()
            .map(|workout| workout_detail(&conn, workout))
            .collect()
    }

    fn get_workout(&self, user: UserId, workout_id: Uuid) -> StoreResult<WorkoutDetail> {
        let conn = self.conn()?;
        require(&conn, OWN_WORKOUT, params![workout_id.to_string(), user.to_string()], "Workout")?;
        let workout = load_workout(&conn, workout_id)?;
        workout_detail(&conn, workout)
    }

    fn create_workout(&self, user: UserId, new: NewWorkout) -> StoreResult<Workout> {
        let conn = self.conn()?;
        let id = insert_workout(&conn, user, &new.name, new.summary.as_deref())?;
        info!(user_id = %user, workout_id = %id, "Created workout");
        load_workout(&conn, id)
    }

    fn update_workout(&self, user: UserId, workout_id: Uuid, patch: WorkoutPatch) -> StoreResult<Workout> {
        let conn = self.conn()?;
        require(&conn, OWN_WORKOUT, params![workout_id.to_string(), user.to_string()], "Workout")?;

        let mut changes = Assignments::default();
        changes.set_opt("name", patch.name.map(|n| n.trim().to_string()));
        changes.set_opt("summary", patch.summary);
        changes.apply(&conn, "workouts", workout_id)?;
        load_workout(&conn, workout_id)
    }

    fn delete_workout(&self, user: UserId, workout_id: Uuid) -> StoreResult<()> {
        let conn = self.conn()?;
        require(&conn, OWN_WORKOUT, params![workout_id.to_string(), user.to_string()], "Workout")?;
        soft_delete(&conn, "workouts", workout_id)?;
        info!(user_id = %user, workout_id = %workout_id, "Soft-deleted workout");
        Ok(())
    }

    fn create_workout_day(&self, user: UserId, new: NewWorkoutDay) -> StoreResult<WorkoutDay> {
        let conn = self.conn()?;
        require(&conn, OWN_WORKOUT, params![new.workout_id.to_string(), user.to_string()], "Workout")?;
        let id = insert_day(&conn, new.workout_id, new.dow, new.position)?;
        load_day(&conn, id)
    }

    fn delete_workout_day(&self, user: UserId, day_id: Uuid) -> StoreResult<()> {
        let conn = self.conn()?;
        require(&conn, OWN_DAY, params![day_id.to_string(), user.to_string()], "Workout day")?;
        soft_delete(&conn, "workout_days", day_id)
    }

    fn create_workout_group(&self, user: UserId, new: NewWorkoutGroup) -> StoreResult<WorkoutGroup> {
        let conn = self.conn()?;
        require(&conn, OWN_DAY, params![new.workout_day_id.to_string(), user.to_string()], "Workout day")?;
        let id = insert_group(
            &conn,
            new.workout_day_id,
            &new.name,
            new.group_type,
            new.rest_seconds,
            new.position,
        )?;
        load_group(&conn, id)
    }

    fn update_workout_group(
        &self,
        user: UserId,
        group_id: Uuid,
        patch: WorkoutGroupPatch,
    ) -> StoreResult<WorkoutGroup> {
        let conn = self.conn()?;
        require(&conn, OWN_GROUP, params![group_id.to_string(), user.to_string()], "Workout group")?;

        let mut changes = Assignments::default();
        changes.set_opt("name", patch.name.map(|n| n.trim().to_string()));
        changes.set_opt("rest_seconds", patch.rest_seconds);
        changes.apply(&conn, "workout_groups", group_id)?;
        load_group(&conn, group_id)
    }

    fn delete_workout_group(&self, user: UserId, group_id: Uuid) -> StoreResult<()> {
        let conn = self.conn()?;
        require(&conn, OWN_GROUP, params![group_id.to_string(), user.to_string()], "Workout group")?;
        soft_delete(&conn, "workout_groups", group_id)
    }

    fn create_workout_item(&self, user: UserId, new: NewWorkoutItem) -> StoreResult<WorkoutItem> {
        let conn = self.conn()?;
        let owner = user.to_string();
        require(&conn, OWN_GROUP, params![new.workout_group_id.to_string(), owner], "Workout group")?;
        require(&conn, OWN_EXERCISE, params![new.exercise_id.to_string(), owner], "Exercise")?;
        let id = insert_item(&conn, &new)?;
        load_item(&conn, id)
    }

    fn update_workout_item(&self, user: UserId, item_id: Uuid, patch: WorkoutItemPatch) -> StoreResult<WorkoutItem> {
        let conn = self.conn()?;
        require(&conn, OWN_ITEM, params![item_id.to_string(), user.to_string()], "Workout item")?;

        let mut changes = Assignments::default();
        changes.set_opt("target_sets", patch.targets.sets);
        changes.set_opt("target_reps", patch.targets.reps);
        changes.set_opt("target_weight", patch.targets.weight);
        changes.set_opt("rest_seconds_override", patch.rest_seconds_override);
        changes.set_opt("notes", patch.notes);
        changes.apply(&conn, "workout_items", item_id)?;
        load_item(&conn, item_id)
    }

    fn delete_workout_item(&self, user: UserId, item_id: Uuid) -> StoreResult<()> {
        let conn = self.conn()?;
        require(&conn, OWN_ITEM, params![item_id.to_string(), user.to_string()], "Workout item")?;
        soft_delete(&conn, "workout_items", item_id)
    }

    fn import_workout(&self, user: UserId, template: &WorkoutTemplate) -> StoreResult<ImportSummary> {
        let problems = template.problems();
        if !problems.is_empty() {
            return Err(StoreError::ConstraintViolation(problems.join("; ")));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let workout_id = insert_workout(&tx, user, &template.name, template.summary.as_deref())?;
        let mut summary = ImportSummary {
            workout_id,
            workout_name: template.name.trim().to_string(),
            days: 0,
            groups: 0,
            items: 0,
            exercises_created: 0,
        };
        let mut exercise_ids: HashMap<String, Uuid> = HashMap::new();

        for (d, day) in template.workout_days.iter().enumerate() {
            let day_position = day.position.unwrap_or(d as u32 + 1);
            let day_id = insert_day(&tx, workout_id, day.dow, day_position)?;
            summary.days += 1;

            for (g, group) in day.workout_groups.iter().enumerate() {
                let group_id = insert_group(
                    &tx,
                    day_id,
                    &group.name,
                    group.group_type,
                    group.rest_seconds,
                    group.position.unwrap_or(g as u32 + 1),
                )?;
                summary.groups += 1;

                for (i, item) in group.workout_items.iter().enumerate() {
                    let name = item
                        .exercise_name()
                        .ok_or_else(|| StoreError::ConstraintViolation("exercise_name is required".into()))?;
                    let key = name.to_lowercase();

                    let exercise_id = match exercise_ids.get(&key) {
                        Some(id) => *id,
                        None => {
                            let id = match find_exercise_by_name(&tx, user, name)? {
                                Some(id) => id,
                                None => {
                                    summary.exercises_created += 1;
                                    insert_exercise(&tx, user, name, item.category(), item.instructions())?
                                }
                            };
                            exercise_ids.insert(key, id);
                            id
                        }
                    };

                    insert_item(
                        &tx,
                        &NewWorkoutItem {
                            workout_group_id: group_id,
                            exercise_id,
                            position: item.position.unwrap_or(i as u32 + 1),
                            targets: Targets {
                                sets: item.target_sets,
                                reps: item.target_reps,
                                weight: item.target_weight,
                            },
                            rest_seconds_override: item.rest_seconds_override,
                            notes: item.notes.clone(),
                        },
                    )?;
                    summary.items += 1;
                }
            }
        }

        tx.commit()?;
        info!(
            user_id = %user,
            workout_id = %workout_id,
            days = summary.days,
            groups = summary.groups,
            items = summary.items,
            "Imported workout"
        );
        Ok(summary)
    }

    fn list_exercises(&self, user: UserId) -> StoreResult<Vec<Exercise>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM exercises WHERE user_id = ?1 AND deleted_at IS NULL ORDER BY name COLLATE NOCASE",
            EXERCISE_COLS
        );
        fetch_all(&conn, &sql, params![user.to_string()], exercise_row)
    }

    fn create_exercise(&self, user: UserId, new: NewExercise) -> StoreResult<Exercise> {
        let conn = self.conn()?;
        let id = insert_exercise(&conn, user, &new.name, new.category, new.instructions.as_deref())?;
        debug!(user_id = %user, exercise_id = %id, "Created exercise");
        load_exercise(&conn, id)
    }

    fn update_exercise(&self, user: UserId, exercise_id: Uuid, patch: ExercisePatch) -> StoreResult<Exercise> {
        let conn = self.conn()?;
        require(&conn, OWN_EXERCISE, params![exercise_id.to_string(), user.to_string()], "Exercise")?;

        let mut changes = Assignments::default();
        changes.set_opt("name", patch.name.map(|n| n.trim().to_string()));
        changes.set_opt("category", patch.category.map(|c| c.as_str().to_string()));
        changes.set_opt("instructions", patch.instructions);
        changes.apply(&conn, "exercises", exercise_id)?;
        load_exercise(&conn, exercise_id)
    }

    fn delete_exercise(&self, user: UserId, exercise_id: Uuid) -> StoreResult<()> {
        let conn = self.conn()?;
        require(&conn, OWN_EXERCISE, params![exercise_id.to_string(), user.to_string()], "Exercise")?;
        soft_delete(&conn, "exercises", exercise_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::user;
    use serde_json::json;

    fn leg_day(storage: &Storage, owner: UserId) -> Workout {
        storage
            .create_workout(
                owner,
                NewWorkout {
                    name: "Leg Day".to_string(),
                    summary: Some("Quads and glutes".to_string()),
                },
            )
            .unwrap()
    }

    #[test]
    fn test_workout_is_scoped_to_owner() {
        let storage = Storage::open_in_memory().unwrap();
        let owner = user();
        let stranger = user();
        let workout = leg_day(&storage, owner);

        assert_eq!(workout.user_id, owner);
        assert_eq!(storage.list_workouts(owner, None).unwrap().len(), 1);
        assert!(storage.list_workouts(stranger, None).unwrap().is_empty());

        let err = storage.get_workout(stranger, workout.id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let err = storage
            .update_workout(
                stranger,
                workout.id,
                WorkoutPatch {
                    name: Some("Hijacked".into()),
                    summary: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(storage.delete_workout(stranger, workout.id).is_err());
        assert_eq!(storage.get_workout(owner, workout.id).unwrap().workout.name, "Leg Day");
    }

    #[test]
    fn test_soft_deleted_workout_disappears() {
        let storage = Storage::open_in_memory().unwrap();
        let owner = user();
        let workout = leg_day(&storage, owner);

        storage.delete_workout(owner, workout.id).unwrap();

        assert!(storage.list_workouts(owner, None).unwrap().is_empty());
        assert!(matches!(
            storage.get_workout(owner, workout.id),
            Err(StoreError::NotFound(_))
        ));
        assert!(storage
            .update_workout(owner, workout.id, WorkoutPatch::default())
            .is_err());
        assert!(storage.delete_workout(owner, workout.id).is_err());
    }

    #[test]
    fn test_name_filter_is_case_insensitive() {
        let storage = Storage::open_in_memory().unwrap();
        let owner = user();
        leg_day(&storage, owner);
        storage
            .create_workout(
                owner,
                NewWorkout {
                    name: "Push".to_string(),
                    summary: None,
                },
            )
            .unwrap();

        let found = storage.list_workouts(owner, Some("leg")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].workout.name, "Leg Day");
        assert_eq!(storage.list_workouts(owner, Some("  ")).unwrap().len(), 2);
    }

    #[test]
    fn test_name_filter_treats_wildcards_literally() {
        let storage = Storage::open_in_memory().unwrap();
        let owner = user();
        leg_day(&storage, owner);
        for name in ["100% Effort", "Push_Pull"] {
            storage
                .create_workout(
                    owner,
                    NewWorkout {
                        name: name.to_string(),
                        summary: None,
                    },
                )
                .unwrap();
        }

        let percent = storage.list_workouts(owner, Some("%")).unwrap();
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].workout.name, "100% Effort");

        let underscore = storage.list_workouts(owner, Some("_")).unwrap();
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].workout.name, "Push_Pull");
    }

    #[test]
    fn test_build_tree_and_read_it_back() {
        let storage = Storage::open_in_memory().unwrap();
        let owner = user();
        let workout = leg_day(&storage, owner);

        let day = storage
            .create_workout_day(
                owner,
                NewWorkoutDay {
                    workout_id: workout.id,
                    dow: DayOfWeek::Mon,
                    position: 1,
                },
            )
            .unwrap();
        let group = storage
            .create_workout_group(
                owner,
                NewWorkoutGroup {
                    workout_day_id: day.id,
                    name: "Squats".into(),
                    group_type: GroupType::Single,
                    rest_seconds: Some(120),
                    position: 1,
                },
            )
            .unwrap();
        let squat = storage
            .create_exercise(
                owner,
                NewExercise {
                    name: "Back Squat".into(),
                    category: ExerciseCategory::Strength,
                    instructions: None,
                },
            )
            .unwrap();
        let item = storage
            .create_workout_item(
                owner,
                NewWorkoutItem {
                    workout_group_id: group.id,
                    exercise_id: squat.id,
                    position: 1,
                    targets: Targets {
                        sets: Some(5),
                        reps: Some(5),
                        weight: Some(100.0),
                    },
                    rest_seconds_override: None,
                    notes: None,
                },
            )
            .unwrap();

        let updated = storage
            .update_workout_item(
                owner,
                item.id,
                WorkoutItemPatch {
                    targets: Targets {
                        weight: Some(102.5),
                        ..Targets::default()
                    },
                    ..WorkoutItemPatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.target_weight, Some(102.5));
        assert_eq!(updated.target_sets, Some(5));

        let detail = storage.get_workout(owner, workout.id).unwrap();
        let items = &detail.workout_days[0].workout_groups[0].workout_items;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].exercises.as_ref().unwrap().name, "Back Squat");

        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["name"], "Leg Day");
        assert_eq!(value["workout_days"][0]["dow"], "Mon");
        assert_eq!(value["workout_days"][0]["workout_groups"][0]["group_type"], "single");

        storage.delete_workout_group(owner, group.id).unwrap();
        let detail = storage.get_workout(owner, workout.id).unwrap();
        assert!(detail.workout_days[0].workout_groups.is_empty());
        assert!(storage.delete_workout_item(owner, item.id).is_err());
    }

    #[test]
    fn test_items_cannot_reference_foreign_exercise() {
        let storage = Storage::open_in_memory().unwrap();
        let owner = user();
        let stranger = user();
        let workout = leg_day(&storage, owner);
        let day = storage
            .create_workout_day(
                owner,
                NewWorkoutDay {
                    workout_id: workout.id,
                    dow: DayOfWeek::Tue,
                    position: 1,
                },
            )
            .unwrap();
        let group = storage
            .create_workout_group(
                owner,
                NewWorkoutGroup {
                    workout_day_id: day.id,
                    name: "A".into(),
                    group_type: GroupType::Circuit,
                    rest_seconds: None,
                    position: 1,
                },
            )
            .unwrap();
        let foreign = storage
            .create_exercise(
                stranger,
                NewExercise {
                    name: "Row".into(),
                    category: ExerciseCategory::Strength,
                    instructions: None,
                },
            )
            .unwrap();

        let err = storage
            .create_workout_item(
                owner,
                NewWorkoutItem {
                    workout_group_id: group.id,
                    exercise_id: foreign.id,
                    position: 1,
                    targets: Targets::default(),
                    rest_seconds_override: None,
                    notes: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(ref e) if e == "Exercise"));
    }

    #[test]
    fn test_import_reuses_exercises_by_name() {
        let storage = Storage::open_in_memory().unwrap();
        let owner = user();
        storage
            .create_exercise(
                owner,
                NewExercise {
                    name: "Bench Press".into(),
                    category: ExerciseCategory::Strength,
                    instructions: None,
                },
            )
            .unwrap();

        let template: WorkoutTemplate = serde_json::from_value(json!({
            "name": "Push Pull",
            "workout_days": [
                { "dow": "monday", "workout_groups": [
                    { "name": "Chest", "group_type": "straight_set", "workout_items": [
                        { "exercise_name": "bench press", "target_sets": 3 },
                        { "exercise_name": "Dips", "category": "strength" }
                    ]}
                ]},
                { "dow": "Thu", "workout_groups": [
                    { "name": "Back", "group_type": "superset", "workout_items": [
                        { "exercises": { "name": "Dips" } },
                        { "exercise_name": "Pull Up" }
                    ]}
                ]}
            ]
        }))
        .unwrap();

        let summary = storage.import_workout(owner, &template).unwrap();
        assert_eq!(summary.days, 2);
        assert_eq!(summary.groups, 2);
        assert_eq!(summary.items, 4);
        assert_eq!(summary.exercises_created, 2);
        assert_eq!(storage.list_exercises(owner).unwrap().len(), 3);

        let detail = storage.get_workout(owner, summary.workout_id).unwrap();
        assert_eq!(detail.workout_days[1].day.position, 2);
        assert_eq!(detail.workout_days[0].workout_groups[0].group.group_type, GroupType::Single);
    }

    #[test]
    fn test_invalid_template_is_rejected_up_front() {
        let storage = Storage::open_in_memory().unwrap();
        let owner = user();

        let template: WorkoutTemplate = serde_json::from_value(json!({
            "name": "Broken",
            "workout_days": [{ "dow": "Mon", "workout_groups": [
                { "name": "Ok", "group_type": "single", "workout_items": [{ "exercise_name": "Lunge" }] },
                { "name": "  ", "group_type": "single", "workout_items": [] }
            ]}]
        }))
        .unwrap();
        assert!(storage.import_workout(owner, &template).is_err());

        let conn = storage.conn().unwrap();
        let count = |table: &str| -> i64 {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .unwrap()
        };
        assert_eq!(count("workouts"), 0);
        assert_eq!(count("workout_days"), 0);
        assert_eq!(count("exercises"), 0);
    }

    #[test]
    fn test_import_rolls_back_on_constraint_failure() {
        let storage = Storage::open_in_memory().unwrap();
        let owner = user();
        let template: WorkoutTemplate = serde_json::from_value(json!({
            "name": "Half",
            "workout_days": [
                { "dow": "Mon", "workout_groups": [
                    { "name": "A", "group_type": "single", "workout_items": [{ "exercise_name": "Curl" }] }
                ]}
            ]
        }))
        .unwrap();

        {
            let conn = storage.conn().unwrap();
            conn.execute_batch(
                "CREATE TRIGGER reject_items BEFORE INSERT ON workout_items
                 BEGIN SELECT RAISE(ABORT, 'constraint failed'); END;",
            )
            .unwrap();
        }
        assert!(storage.import_workout(owner, &template).is_err());
        assert!(storage.list_workouts(owner, None).unwrap().is_empty());
        assert!(storage.list_exercises(owner).unwrap().is_empty());
    }
}
