//! Relational record store.
//!
//! Candidates are split across `candidates`, `comments` and `reminders`;
//! every write runs in one transaction and publishes change events after
//! commit.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

use super::{ChangeFeed, ChangeKind, Table};
use crate::models::{
    Candidate, CandidateStatus, Comment, CommentType, Reminder, ReminderPriority, Role, User,
};
use crate::store::{Mutation, Record, RecordStore, StoreError};

const CANDIDATE_COLUMNS: &str = "id, full_name, email, phone, position, location, source, status, \
     applied_at, start_date, notes, last_update, updated_by, extra";

const COMMENT_COLUMNS: &str =
    "candidate_id, id, text, author, comment_type, created_at, edited_at";

const REMINDER_COLUMNS: &str = "candidate_id, id, title, description, due_date, priority, \
     completed, created_by, created_at";

const USER_COLUMNS: &str =
    "id, username, email, full_name, role, active, password_hash, created_at, last_login";

/// SQLite-backed store for users and candidates.
#[derive(Clone)]
pub struct RelationalStore {
    pool: SqlitePool,
    changes: ChangeFeed,
}

impl RelationalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            changes: ChangeFeed::new(256),
        }
    }

    pub fn changes(&self) -> &ChangeFeed {
        &self.changes
    }

    fn publish_candidate(&self, kind: ChangeKind, before: Option<&Candidate>, after: &Candidate) {
        self.changes.publish(Table::Candidates, kind, &after.id);
        let comments_changed = before.map_or(!after.comments.is_empty(), |b| {
            b.comments != after.comments
        });
        if comments_changed {
            self.changes.publish(Table::Comments, kind, &after.id);
        }
        let reminders_changed = before.map_or(!after.reminders.is_empty(), |b| {
            b.reminders != after.reminders
        });
        if reminders_changed {
            self.changes.publish(Table::Reminders, kind, &after.id);
        }
    }
}

// ==================== CANDIDATES ====================

#[async_trait]
impl RecordStore<Candidate> for RelationalStore {
    async fn list(&self) -> Result<Vec<Candidate>, StoreError> {
        let mut conn = self.pool.acquire().await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM candidates ORDER BY applied_at, id",
            CANDIDATE_COLUMNS
        ))
        .fetch_all(&mut *conn)
        .await?;

        let mut comments: HashMap<String, Vec<Comment>> = HashMap::new();
        let comment_rows = sqlx::query(&format!(
            "SELECT {} FROM comments ORDER BY candidate_id, position",
            COMMENT_COLUMNS
        ))
        .fetch_all(&mut *conn)
        .await?;
        for row in &comment_rows {
            comments
                .entry(row.get("candidate_id"))
                .or_default()
                .push(comment_from_row(row));
        }

        let mut reminders: HashMap<String, Vec<Reminder>> = HashMap::new();
        let reminder_rows = sqlx::query(&format!(
            "SELECT {} FROM reminders ORDER BY candidate_id, position",
            REMINDER_COLUMNS
        ))
        .fetch_all(&mut *conn)
        .await?;
        for row in &reminder_rows {
            reminders
                .entry(row.get("candidate_id"))
                .or_default()
                .push(reminder_from_row(row));
        }

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                candidate_from_row(
                    row,
                    comments.remove(&id).unwrap_or_default(),
                    reminders.remove(&id).unwrap_or_default(),
                )
            })
            .collect()
    }

    async fn get(&self, id: &str) -> Result<Option<Candidate>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_candidate(&mut conn, id).await
    }

    async fn insert(&self, record: &Candidate) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM candidates WHERE id = ?")
            .bind(&record.id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if exists {
            return Err(StoreError::Rejected(format!(
                "{} {} already exists",
                Candidate::KIND,
                record.id
            )));
        }

        write_candidate(&mut tx, record).await?;
        tx.commit().await?;

        self.publish_candidate(ChangeKind::Insert, None, record);
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        mutation: Mutation<'_, Candidate>,
    ) -> Result<Candidate, StoreError> {
        let mut tx = self.pool.begin().await?;

        let before = fetch_candidate(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::RecordNotFound { id: id.to_string() })?;

        let mut candidate = before.clone();
        mutation(&mut candidate)?;

        write_candidate(&mut tx, &candidate).await?;
        tx.commit().await?;

        self.publish_candidate(ChangeKind::Update, Some(&before), &candidate);
        Ok(candidate)
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM comments WHERE candidate_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM reminders WHERE candidate_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM candidates WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        tx.commit().await?;
        self.changes
            .publish(Table::Candidates, ChangeKind::Delete, id);
        Ok(true)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

// ==================== USERS ====================

#[async_trait]
impl RecordStore<User> for RelationalStore {
    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users ORDER BY username",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn insert(&self, record: &User) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let taken = sqlx::query("SELECT id FROM users WHERE id = ? OR username = ?")
            .bind(&record.id)
            .bind(&record.username)
            .fetch_optional(&mut *tx)
            .await?;
        if taken.is_some() {
            return Err(StoreError::Rejected(format!(
                "{} {} already exists",
                User::KIND,
                record.username
            )));
        }

        write_user(&mut tx, record).await?;
        tx.commit().await?;

        self.changes
            .publish(Table::Users, ChangeKind::Insert, &record.id);
        Ok(())
    }

    async fn update(&self, id: &str, mutation: Mutation<'_, User>) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let mut user = match row {
            Some(row) => user_from_row(&row)?,
            None => return Err(StoreError::RecordNotFound { id: id.to_string() }),
        };

        mutation(&mut user)?;

        write_user(&mut tx, &user).await?;
        tx.commit().await?;

        self.changes.publish(Table::Users, ChangeKind::Update, id);
        Ok(user)
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        self.changes.publish(Table::Users, ChangeKind::Delete, id);
        Ok(true)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

// Helper functions for reads and writes inside a connection or transaction

async fn fetch_candidate(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Candidate>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM candidates WHERE id = ?",
        CANDIDATE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let comments = sqlx::query(&format!(
        "SELECT {} FROM comments WHERE candidate_id = ? ORDER BY position",
        COMMENT_COLUMNS
    ))
    .bind(id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(comment_from_row)
    .collect();

    let reminders = sqlx::query(&format!(
        "SELECT {} FROM reminders WHERE candidate_id = ? ORDER BY position",
        REMINDER_COLUMNS
    ))
    .bind(id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(reminder_from_row)
    .collect();

    candidate_from_row(&row, comments, reminders).map(Some)
}

async fn write_candidate(
    conn: &mut SqliteConnection,
    candidate: &Candidate,
) -> Result<(), StoreError> {
    let extra = if candidate.extra.is_empty() {
        None
    } else {
        Some(
            serde_json::to_string(&candidate.extra)
                .map_err(|e| StoreError::Database(format!("extra fields: {}", e)))?,
        )
    };

    sqlx::query(
        r#"INSERT INTO candidates (
            id, full_name, email, phone, position, location, source, status,
            applied_at, start_date, notes, last_update, updated_by, extra
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            full_name = excluded.full_name, email = excluded.email,
            phone = excluded.phone, position = excluded.position,
            location = excluded.location, source = excluded.source,
            status = excluded.status, applied_at = excluded.applied_at,
            start_date = excluded.start_date, notes = excluded.notes,
            last_update = excluded.last_update, updated_by = excluded.updated_by,
            extra = excluded.extra"#,
    )
    .bind(&candidate.id)
    .bind(&candidate.full_name)
    .bind(&candidate.email)
    .bind(&candidate.phone)
    .bind(&candidate.position)
    .bind(&candidate.location)
    .bind(&candidate.source)
    .bind(candidate.status.as_str())
    .bind(&candidate.applied_at)
    .bind(&candidate.start_date)
    .bind(&candidate.notes)
    .bind(&candidate.last_update)
    .bind(&candidate.updated_by)
    .bind(&extra)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM comments WHERE candidate_id = ?")
        .bind(&candidate.id)
        .execute(&mut *conn)
        .await?;
    for (position, comment) in candidate.comments.iter().enumerate() {
        sqlx::query(
            "INSERT INTO comments (candidate_id, id, position, text, author, comment_type, created_at, edited_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&candidate.id)
        .bind(&comment.id)
        .bind(position as i64)
        .bind(&comment.text)
        .bind(&comment.author)
        .bind(comment_type_str(comment.comment_type))
        .bind(&comment.created_at)
        .bind(&comment.edited_at)
        .execute(&mut *conn)
        .await?;
    }

    sqlx::query("DELETE FROM reminders WHERE candidate_id = ?")
        .bind(&candidate.id)
        .execute(&mut *conn)
        .await?;
    // Synthesized reminders are derived on read and never stored.
    for (position, reminder) in candidate
        .reminders
        .iter()
        .filter(|r| !r.automatic)
        .enumerate()
    {
        sqlx::query(
            "INSERT INTO reminders (candidate_id, id, position, title, description, due_date, priority, completed, created_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&candidate.id)
        .bind(&reminder.id)
        .bind(position as i64)
        .bind(&reminder.title)
        .bind(&reminder.description)
        .bind(&reminder.due_date)
        .bind(reminder.priority.as_str())
        .bind(reminder.completed as i32)
        .bind(&reminder.created_by)
        .bind(&reminder.created_at)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn write_user(conn: &mut SqliteConnection, user: &User) -> Result<(), StoreError> {
    sqlx::query(
        r#"INSERT INTO users (
            id, username, email, full_name, role, active, password_hash, created_at, last_login
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            username = excluded.username, email = excluded.email,
            full_name = excluded.full_name, role = excluded.role,
            active = excluded.active, password_hash = excluded.password_hash,
            last_login = excluded.last_login"#,
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.full_name)
    .bind(user.role.as_str())
    .bind(user.active as i32)
    .bind(&user.password_hash)
    .bind(&user.created_at)
    .bind(&user.last_login)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// Helper functions for row conversion

fn candidate_from_row(
    row: &SqliteRow,
    comments: Vec<Comment>,
    reminders: Vec<Reminder>,
) -> Result<Candidate, StoreError> {
    let id: String = row.get("id");
    let status = CandidateStatus::parse(row.get::<&str, _>("status"));
    let extra_str: Option<String> = row.get("extra");
    let extra = match extra_str {
        Some(s) => serde_json::from_str(&s)
            .map_err(|e| StoreError::Database(format!("candidate {} extra fields: {}", id, e)))?,
        None => serde_json::Map::new(),
    };

    Ok(Candidate {
        id,
        full_name: row.get("full_name"),
        email: row.get("email"),
        phone: row.get("phone"),
        position: row.get("position"),
        location: row.get("location"),
        source: row.get("source"),
        status,
        applied_at: row.get("applied_at"),
        start_date: row.get("start_date"),
        notes: row.get("notes"),
        comments,
        reminders,
        last_update: row.get("last_update"),
        updated_by: row.get("updated_by"),
        extra,
    })
}

fn comment_from_row(row: &SqliteRow) -> Comment {
    let comment_type: String = row.get("comment_type");
    Comment {
        id: row.get("id"),
        text: row.get("text"),
        author: row.get("author"),
        comment_type: match comment_type.as_str() {
            "status_change" => CommentType::StatusChange,
            _ => CommentType::General,
        },
        created_at: row.get("created_at"),
        edited_at: row.get("edited_at"),
    }
}

fn comment_type_str(comment_type: CommentType) -> &'static str {
    match comment_type {
        CommentType::General => "general",
        CommentType::StatusChange => "status_change",
    }
}

fn reminder_from_row(row: &SqliteRow) -> Reminder {
    let priority: String = row.get("priority");
    let completed: i32 = row.get("completed");
    Reminder {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        due_date: row.get("due_date"),
        priority: ReminderPriority::from_str(&priority).unwrap_or_default(),
        completed: completed != 0,
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        automatic: false,
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User, StoreError> {
    let id: String = row.get("id");
    let role_str: String = row.get("role");
    let role = Role::from_str(&role_str)
        .ok_or_else(|| StoreError::Database(format!("user {} has unknown role {}", id, role_str)))?;
    let active: i32 = row.get("active");

    Ok(User {
        id,
        username: row.get("username"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        role,
        active: active != 0,
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
        last_login: row.get("last_login"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_database, ChangeEvent};
    use serde_json::json;
    use tempfile::TempDir;

    async fn store() -> (RelationalStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("test.sqlite")).await.unwrap();
        (RelationalStore::new(pool), dir)
    }

    fn candidate(id: &str) -> Candidate {
        serde_json::from_value(json!({
            "id": id,
            "fullName": format!("Candidate {}", id),
            "email": format!("c{}@example.com", id),
            "status": "received",
            "appliedAt": "2024-01-10T09:00:00Z",
            "lastUpdate": "2024-01-10T09:00:00Z",
            "updatedBy": "maria",
            "comments": [
                {"id": "c1", "text": "CV looks good", "author": "maria", "createdAt": "2024-01-10T09:05:00Z"}
            ],
            "reminders": [
                {"id": "r1", "title": "Call back", "dueDate": "2024-01-15", "priority": "high",
                 "createdBy": "maria", "createdAt": "2024-01-10T09:06:00Z"}
            ],
            "referral": {"by": "ops"}
        }))
        .unwrap()
    }

    fn user(id: &str, username: &str) -> User {
        User {
            id: id.to_string(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            full_name: username.to_string(),
            role: Role::Recruiter,
            active: true,
            password_hash: "salt$digest".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            last_login: None,
        }
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<ChangeEvent>) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_candidate_round_trip_keeps_children_and_extra_fields() {
        let (store, _dir) = store().await;
        let original = candidate("42");

        RecordStore::<Candidate>::insert(&store, &original).await.unwrap();
        let loaded = RecordStore::<Candidate>::get(&store, "42")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(loaded, original);
        assert_eq!(loaded.extra["referral"], json!({"by": "ops"}));
        assert_eq!(loaded.reminders[0].priority, ReminderPriority::High);
    }

    #[tokio::test]
    async fn test_candidate_duplicate_insert_is_rejected() {
        let (store, _dir) = store().await;
        RecordStore::<Candidate>::insert(&store, &candidate("1")).await.unwrap();

        let result = RecordStore::<Candidate>::insert(&store, &candidate("1")).await;
        assert!(matches!(result, Err(StoreError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_candidate_update_rewrites_comments_and_emits_events() {
        let (store, _dir) = store().await;
        RecordStore::<Candidate>::insert(&store, &candidate("1")).await.unwrap();
        RecordStore::<Candidate>::insert(&store, &candidate("2")).await.unwrap();
        let mut rx = store.changes().subscribe();

        let updated = RecordStore::<Candidate>::update(&store, "1", &|c: &mut Candidate| {
            c.comments.push(Comment {
                id: "c2".into(),
                text: "Invited to interview".into(),
                author: "maria".into(),
                comment_type: CommentType::General,
                created_at: "2024-01-11T10:00:00Z".into(),
                edited_at: None,
            });
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(updated.comments.len(), 2);

        let reloaded = RecordStore::<Candidate>::get(&store, "1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.comments[1].text, "Invited to interview");

        let untouched = RecordStore::<Candidate>::get(&store, "2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(untouched, candidate("2"));

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                ChangeEvent {
                    table: Table::Candidates,
                    kind: ChangeKind::Update,
                    record_id: "1".into()
                },
                ChangeEvent {
                    table: Table::Comments,
                    kind: ChangeKind::Update,
                    record_id: "1".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_mutation_leaves_row_unchanged() {
        let (store, _dir) = store().await;
        RecordStore::<Candidate>::insert(&store, &candidate("1")).await.unwrap();

        let result = RecordStore::<Candidate>::update(&store, "1", &|c: &mut Candidate| {
            c.full_name = "Changed".into();
            Err(StoreError::Rejected("no".into()))
        })
        .await;
        assert!(matches!(result, Err(StoreError::Rejected(_))));

        let reloaded = RecordStore::<Candidate>::get(&store, "1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.full_name, "Candidate 1");
    }

    #[tokio::test]
    async fn test_candidate_update_and_remove_missing() {
        let (store, _dir) = store().await;

        let result = RecordStore::<Candidate>::update(&store, "9", &|_c: &mut Candidate| Ok(())).await;
        assert!(matches!(result, Err(StoreError::RecordNotFound { .. })));
        assert!(!RecordStore::<Candidate>::remove(&store, "9").await.unwrap());
    }

    #[tokio::test]
    async fn test_candidate_remove_deletes_children() {
        let (store, _dir) = store().await;
        RecordStore::<Candidate>::insert(&store, &candidate("1")).await.unwrap();

        assert!(RecordStore::<Candidate>::remove(&store, "1").await.unwrap());
        assert!(RecordStore::<Candidate>::list(&store).await.unwrap().is_empty());

        // Re-inserting the same id must not collide with orphaned children.
        RecordStore::<Candidate>::insert(&store, &candidate("1")).await.unwrap();
        let list = RecordStore::<Candidate>::list(&store).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].comments.len(), 1);
    }

    #[tokio::test]
    async fn test_user_crud() {
        let (store, _dir) = store().await;
        RecordStore::<User>::insert(&store, &user("u1", "maria")).await.unwrap();

        let duplicate = RecordStore::<User>::insert(&store, &user("u2", "maria")).await;
        assert!(matches!(duplicate, Err(StoreError::Rejected(_))));

        let updated = RecordStore::<User>::update(&store, "u1", &|u: &mut User| {
            u.role = Role::Admin;
            u.active = false;
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(updated.role, Role::Admin);

        let loaded = RecordStore::<User>::get(&store, "u1").await.unwrap().unwrap();
        assert!(!loaded.active);
        assert_eq!(loaded.role, Role::Admin);

        assert!(RecordStore::<User>::remove(&store, "u1").await.unwrap());
        assert!(RecordStore::<User>::list(&store).await.unwrap().is_empty());
    }
}
