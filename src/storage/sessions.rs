use super::workouts::OWN_WORKOUT;
use super::{
    enum_col, fetch_all, fetch_one, now, opt_enum_col, opt_uuid_col, require, soft_delete, today,
    user_col, uuid_col, Assignments, Storage,
};
use crate::domain::error::StoreResult;
use crate::domain::fitness::*;
use crate::domain::models::UserId;
use crate::domain::ports::TrainingStore;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;
use uuid::Uuid;

const PLAN_COLS: &str = "id, user_id, workout_id, name, start_date, duration_weeks, is_active, updated_at";
const SESSION_COLS: &str = "id, user_id, workout_id, plan_id, title, day_dow, started_at, finished_at, \
                            total_volume, updated_at";
const SESSION_GROUP_COLS: &str = "id, session_id, name, group_type, rest_seconds, position, updated_at";
const SESSION_ITEM_COLS: &str = "id, session_group_id, exercise_name, position, target_sets, target_reps, \
                                 target_weight, rest_seconds, notes, updated_at";
const SET_COLS: &str = "id, session_item_id, set_number, weight, reps, created_at, updated_at";

/// Sessions recent enough to inform a training summary.
const SNAPSHOT_SESSIONS: u32 = 20;

const OWN_PLAN: &str = "SELECT 1 FROM plans WHERE id = ?1 AND user_id = ?2 AND deleted_at IS NULL";

const OWN_SESSION: &str = "SELECT 1 FROM sessions WHERE id = ?1 AND user_id = ?2";

const OWN_SESSION_GROUP: &str = "SELECT 1 FROM session_groups g
     JOIN sessions s ON s.id = g.session_id
     WHERE g.id = ?1 AND s.user_id = ?2";

const OWN_SESSION_ITEM: &str = "SELECT 1 FROM session_items i
     JOIN session_groups g ON g.id = i.session_group_id
     JOIN sessions s ON s.id = g.session_id
     WHERE i.id = ?1 AND s.user_id = ?2";

const OWN_SET: &str = "SELECT 1 FROM completed_sets c
     JOIN session_items i ON i.id = c.session_item_id
     JOIN session_groups g ON g.id = i.session_group_id
     JOIN sessions s ON s.id = g.session_id
     WHERE c.id = ?1 AND s.user_id = ?2";

fn plan_row(row: &Row<'_>) -> rusqlite::Result<Plan> {
    Ok(Plan {
        id: uuid_col(row, 0)?,
        user_id: user_col(row, 1)?,
        workout_id: uuid_col(row, 2)?,
        name: row.get(3)?,
        start_date: row.get(4)?,
        duration_weeks: row.get(5)?,
        is_active: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn session_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: uuid_col(row, 0)?,
        user_id: user_col(row, 1)?,
        workout_id: opt_uuid_col(row, 2)?,
        plan_id: opt_uuid_col(row, 3)?,
        title: row.get(4)?,
        day_dow: opt_enum_col(row, 5)?,
        started_at: row.get(6)?,
        finished_at: row.get(7)?,
        total_volume: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn session_group_row(row: &Row<'_>) -> rusqlite::Result<SessionGroup> {
    Ok(SessionGroup {
        id: uuid_col(row, 0)?,
        session_id: uuid_col(row, 1)?,
        name: row.get(2)?,
        group_type: enum_col(row, 3)?,
        rest_seconds: row.get(4)?,
        position: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn session_item_row(row: &Row<'_>) -> rusqlite::Result<SessionItem> {
    Ok(SessionItem {
        id: uuid_col(row, 0)?,
        session_group_id: uuid_col(row, 1)?,
        exercise_name: row.get(2)?,
        position: row.get(3)?,
        target_sets: row.get(4)?,
        target_reps: row.get(5)?,
        target_weight: row.get(6)?,
        rest_seconds: row.get(7)?,
        notes: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn set_row(row: &Row<'_>) -> rusqlite::Result<CompletedSet> {
    Ok(CompletedSet {
        id: uuid_col(row, 0)?,
        session_item_id: uuid_col(row, 1)?,
        set_number: row.get(2)?,
        weight: row.get(3)?,
        reps: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn workout_summary_row(row: &Row<'_>) -> rusqlite::Result<WorkoutSummary> {
    Ok(WorkoutSummary {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        summary: row.get(2)?,
    })
}

fn load_plan(conn: &Connection, id: Uuid) -> StoreResult<Plan> {
    let sql = format!("SELECT {} FROM plans WHERE id = ?1", PLAN_COLS);
    fetch_one(conn, &sql, params![id.to_string()], "Plan", plan_row)
}

fn load_session(conn: &Connection, id: Uuid) -> StoreResult<Session> {
    let sql = format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLS);
    fetch_one(conn, &sql, params![id.to_string()], "Session", session_row)
}

fn load_set(conn: &Connection, id: Uuid) -> StoreResult<CompletedSet> {
    let sql = format!("SELECT {} FROM completed_sets WHERE id = ?1", SET_COLS);
    fetch_one(conn, &sql, params![id.to_string()], "Set", set_row)
}

fn session_detail(conn: &Connection, session: Session) -> StoreResult<SessionDetail> {
    let groups_sql = format!(
        "SELECT {} FROM session_groups WHERE session_id = ?1 ORDER BY position, updated_at",
        SESSION_GROUP_COLS
    );
    let items_sql = format!(
        "SELECT {} FROM session_items WHERE session_group_id = ?1 ORDER BY position, updated_at",
        SESSION_ITEM_COLS
    );
    let sets_sql = format!(
        "SELECT {} FROM completed_sets WHERE session_item_id = ?1 ORDER BY set_number",
        SET_COLS
    );

    let mut session_groups = Vec::new();
    for group in fetch_all(conn, &groups_sql, params![session.id.to_string()], session_group_row)? {
        let mut session_items = Vec::new();
        for item in fetch_all(conn, &items_sql, params![group.id.to_string()], session_item_row)? {
            let completed_sets = fetch_all(conn, &sets_sql, params![item.id.to_string()], set_row)?;
            session_items.push(SessionItemDetail {
                item,
                completed_sets,
            });
        }
        session_groups.push(SessionGroupDetail {
            group,
            session_items,
        });
    }

    Ok(SessionDetail {
        session,
        session_groups,
    })
}

fn insert_session_group(
    conn: &Connection,
    session_id: Uuid,
    name: &str,
    group_type: GroupType,
    rest_seconds: Option<u32>,
    position: u32,
) -> StoreResult<Uuid> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO session_groups (id, session_id, name, group_type, rest_seconds, position, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id.to_string(),
            session_id.to_string(),
            name.trim(),
            group_type.as_str(),
            rest_seconds,
            position,
            now()
        ],
    )?;
    Ok(id)
}

fn insert_session_item(conn: &Connection, new: &NewSessionItem) -> StoreResult<Uuid> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO session_items (id, session_group_id, exercise_name, position, target_sets,
                                    target_reps, target_weight, notes, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            id.to_string(),
            new.session_group_id.to_string(),
            new.exercise_name.trim(),
            new.position,
            new.targets.sets,
            new.targets.reps,
            new.targets.weight,
            new.notes,
            now()
        ],
    )?;
    Ok(id)
}

fn insert_set(conn: &Connection, new: &NewSet) -> StoreResult<Uuid> {
    let id = Uuid::new_v4();
    let now = now();
    conn.execute(
        "INSERT INTO completed_sets (id, session_item_id, set_number, weight, reps, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            id.to_string(),
            new.session_item_id.to_string(),
            new.set_number,
            new.weight,
            new.reps,
            now
        ],
    )?;
    Ok(id)
}

impl TrainingStore for Storage {
    fn list_plans(&self, user: UserId, active_only: bool) -> StoreResult<Vec<PlanView>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM plans
             WHERE user_id = ?1 AND deleted_at IS NULL AND (?2 = 0 OR is_active = 1)
             ORDER BY start_date DESC",
            PLAN_COLS
        );
        let plans = fetch_all(&conn, &sql, params![user.to_string(), active_only], plan_row)?;

        plans
            .into_iter()
            .map(|plan| -> StoreResult<PlanView> {
                let workouts = conn
                    .query_row(
                        "SELECT id, name, summary FROM workouts WHERE id = ?1 AND deleted_at IS NULL",
                        params![plan.workout_id.to_string()],
                        workout_summary_row,
                    )
                    .optional()?;
                Ok(PlanView { plan, workouts })
            })
            .collect()
    }

    fn create_plan(&self, user: UserId, new: NewPlan) -> StoreResult<Plan> {
        let conn = self.conn()?;
        require(&conn, OWN_WORKOUT, params![new.workout_id.to_string(), user.to_string()], "Workout")?;

        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO plans (id, user_id, workout_id, name, start_date, duration_weeks, is_active, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
            params![
                id.to_string(),
                user.to_string(),
                new.workout_id.to_string(),
                new.name.trim(),
                new.start_date.unwrap_or_else(today),
                new.duration_weeks,
                now()
            ],
        )?;
        info!(user_id = %user, plan_id = %id, "Created plan");
        load_plan(&conn, id)
    }

    fn update_plan(&self, user: UserId, plan_id: Uuid, patch: PlanPatch) -> StoreResult<Plan> {
        let conn = self.conn()?;
        require(&conn, OWN_PLAN, params![plan_id.to_string(), user.to_string()], "Plan")?;

        let mut changes = Assignments::default();
        changes.set_opt("name", patch.name.map(|n| n.trim().to_string()));
        changes.set_opt("is_active", patch.is_active);
        changes.apply(&conn, "plans", plan_id)?;
        load_plan(&conn, plan_id)
    }

    fn delete_plan(&self, user: UserId, plan_id: Uuid) -> StoreResult<()> {
        let conn = self.conn()?;
        require(&conn, OWN_PLAN, params![plan_id.to_string(), user.to_string()], "Plan")?;
        soft_delete(&conn, "plans", plan_id)
    }

    fn list_sessions(&self, user: UserId, filter: SessionFilter) -> StoreResult<Vec<Session>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM sessions
             WHERE user_id = ?1 AND (?2 = 0 OR finished_at IS NOT NULL)
             ORDER BY started_at DESC LIMIT ?3",
            SESSION_COLS
        );
        fetch_all(
            &conn,
            &sql,
            params![user.to_string(), filter.finished_only, filter.limit],
            session_row,
        )
    }

    fn get_session(&self, user: UserId, session_id: Uuid) -> StoreResult<SessionDetail> {
        let conn = self.conn()?;
        require(&conn, OWN_SESSION, params![session_id.to_string(), user.to_string()], "Session")?;
        let session = load_session(&conn, session_id)?;
        session_detail(&conn, session)
    }

    fn create_session(&self, user: UserId, new: NewSession) -> StoreResult<Session> {
        let conn = self.conn()?;
        let owner = user.to_string();
        require(&conn, OWN_WORKOUT, params![new.workout_id.to_string(), owner], "Workout")?;
        if let Some(plan_id) = new.plan_id {
            require(&conn, OWN_PLAN, params![plan_id.to_string(), owner], "Plan")?;
        }

        let id = Uuid::new_v4();
        let now = now();
        conn.execute(
            "INSERT INTO sessions (id, user_id, workout_id, plan_id, title, day_dow, started_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id.to_string(),
                owner,
                new.workout_id.to_string(),
                new.plan_id.map(|p| p.to_string()),
                new.title.trim(),
                new.day_dow.map(|d| d.as_str()),
                now
            ],
        )?;
        info!(user_id = %user, session_id = %id, "Started session");
        load_session(&conn, id)
    }

    fn finish_session(&self, user: UserId, session_id: Uuid) -> StoreResult<Session> {
        let conn = self.conn()?;
        require(&conn, OWN_SESSION, params![session_id.to_string(), user.to_string()], "Session")?;

        let volume: f64 = conn.query_row(
            "SELECT COALESCE(SUM(c.reps * c.weight), 0.0) FROM completed_sets c
             JOIN session_items i ON i.id = c.session_item_id
             JOIN session_groups g ON g.id = i.session_group_id
             WHERE g.session_id = ?1",
            params![session_id.to_string()],
            |row| row.get(0),
        )?;

        let now = now();
        conn.execute(
            "UPDATE sessions SET finished_at = COALESCE(finished_at, ?1), total_volume = ?2, updated_at = ?1
             WHERE id = ?3",
            params![now, volume, session_id.to_string()],
        )?;
        info!(user_id = %user, session_id = %session_id, total_volume = volume, "Finished session");
        load_session(&conn, session_id)
    }

    fn delete_session(&self, user: UserId, session_id: Uuid) -> StoreResult<()> {
        let conn = self.conn()?;
        require(&conn, OWN_SESSION, params![session_id.to_string(), user.to_string()], "Session")?;
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id.to_string()])?;
        Ok(())
    }

    fn create_session_group(&self, user: UserId, new: NewSessionGroup) -> StoreResult<SessionGroup> {
        let conn = self.conn()?;
        require(&conn, OWN_SESSION, params![new.session_id.to_string(), user.to_string()], "Session")?;
        let id = insert_session_group(
            &conn,
            new.session_id,
            &new.name,
            new.group_type,
            new.rest_seconds,
            new.position,
        )?;
        let sql = format!("SELECT {} FROM session_groups WHERE id = ?1", SESSION_GROUP_COLS);
        fetch_one(&conn, &sql, params![id.to_string()], "Session group", session_group_row)
    }

    fn create_session_item(&self, user: UserId, new: NewSessionItem) -> StoreResult<SessionItem> {
        let conn = self.conn()?;
        require(
            &conn,
            OWN_SESSION_GROUP,
            params![new.session_group_id.to_string(), user.to_string()],
            "Session group",
        )?;
        let id = insert_session_item(&conn, &new)?;
        let sql = format!("SELECT {} FROM session_items WHERE id = ?1", SESSION_ITEM_COLS);
        fetch_one(&conn, &sql, params![id.to_string()], "Session item", session_item_row)
    }

    fn log_set(&self, user: UserId, new: NewSet) -> StoreResult<CompletedSet> {
        let conn = self.conn()?;
        require(
            &conn,
            OWN_SESSION_ITEM,
            params![new.session_item_id.to_string(), user.to_string()],
            "Session item",
        )?;
        let id = insert_set(&conn, &new)?;
        load_set(&conn, id)
    }

    fn update_set(&self, user: UserId, set_id: Uuid, patch: SetPatch) -> StoreResult<CompletedSet> {
        let conn = self.conn()?;
        require(&conn, OWN_SET, params![set_id.to_string(), user.to_string()], "Set")?;

        let mut changes = Assignments::default();
        changes.set_opt("weight", patch.weight);
        changes.set_opt("reps", patch.reps);
        changes.apply(&conn, "completed_sets", set_id)?;
        load_set(&conn, set_id)
    }

    fn delete_set(&self, user: UserId, set_id: Uuid) -> StoreResult<()> {
        let conn = self.conn()?;
        require(&conn, OWN_SET, params![set_id.to_string(), user.to_string()], "Set")?;
        conn.execute("DELETE FROM completed_sets WHERE id = ?1", params![set_id.to_string()])?;
        Ok(())
    }

    fn log_session(&self, user: UserId, log: &SessionLog) -> StoreResult<SessionLogSummary> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let session_id = Uuid::new_v4();
        let total_volume = log.total_volume();
        tx.execute(
            "INSERT INTO sessions (id, user_id, title, started_at, finished_at, total_volume, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session_id.to_string(),
                user.to_string(),
                log.title.trim(),
                log.started_at,
                log.finished_at,
                total_volume,
                now()
            ],
        )?;

        let mut sets_logged = 0;
        for (g, group) in log.groups.iter().enumerate() {
            let group_id = insert_session_group(
                &tx,
                session_id,
                &group.name,
                group.group_type,
                group.rest_seconds,
                group.position.unwrap_or(g as u32 + 1),
            )?;

            for (e, exercise) in group.exercises.iter().enumerate() {
                let item_id = insert_session_item(
                    &tx,
                    &NewSessionItem {
                        session_group_id: group_id,
                        exercise_name: exercise.exercise_name.clone(),
                        position: exercise.position.unwrap_or(e as u32 + 1),
                        targets: Targets {
                            sets: exercise.target_sets,
                            ..Targets::default()
                        },
                        notes: None,
                    },
                )?;

                for set in &exercise.sets {
                    insert_set(
                        &tx,
                        &NewSet {
                            session_item_id: item_id,
                            set_number: set.set_number,
                            weight: set.weight,
                            reps: set.reps,
                        },
                    )?;
                    sets_logged += 1;
                }
            }
        }

        tx.commit()?;
        info!(
            user_id = %user,
            session_id = %session_id,
            sets = sets_logged,
            total_volume,
            "Logged session"
        );
        Ok(SessionLogSummary {
            session_id,
            title: log.title.trim().to_string(),
            total_volume,
            sets_logged,
        })
    }

    fn training_snapshot(&self, user: UserId) -> StoreResult<TrainingSnapshot> {
        let conn = self.conn()?;
        let owner = user.to_string();

        let sessions_sql = format!(
            "SELECT {} FROM sessions WHERE user_id = ?1 ORDER BY started_at DESC LIMIT ?2",
            SESSION_COLS
        );
        let sessions = fetch_all(&conn, &sessions_sql, params![owner, SNAPSHOT_SESSIONS], session_row)?;

        let workouts = fetch_all(
            &conn,
            "SELECT id, name, summary FROM workouts
             WHERE user_id = ?1 AND deleted_at IS NULL ORDER BY updated_at DESC",
            params![owner],
            workout_summary_row,
        )?;

        let plans_sql = format!(
            "SELECT {} FROM plans WHERE user_id = ?1 AND deleted_at IS NULL ORDER BY start_date DESC",
            PLAN_COLS
        );
        let plans = fetch_all(&conn, &plans_sql, params![owner], plan_row)?;

        Ok(TrainingSnapshot {
            sessions,
            workouts,
            plans,
        })
    }
}
