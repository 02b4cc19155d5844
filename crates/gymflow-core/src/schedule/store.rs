//! SQLite operations on the `schedule_entries` table of one partition.

use std::sync::Arc;

use chrono::NaiveDate;
use sqlx::SqlitePool;

use super::{NewScheduleEntry, ScheduleEntry};
use crate::error::Result;

const ENTRY_COLUMNS: &str =
    "id, date, time, title, kind, duration, course_id, completed, details";

/// Result of an idempotent course-entry insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new entry was written with this id.
    Created(i64),
    /// An entry for the same (course, date) already existed.
    Skipped,
}

/// Schedule entry access for a single partition.
#[derive(Debug, Clone)]
pub struct ScheduleStore {
    pool: SqlitePool,
    // Keeps the registry from closing the partition under this store
    _lease: Option<Arc<()>>,
}

impl ScheduleStore {
    /// Wrap a partition pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, _lease: None }
    }

    pub(crate) fn leased(pool: SqlitePool, lease: Arc<()>) -> Self {
        Self {
            pool,
            _lease: Some(lease),
        }
    }

    /// Insert an entry unconditionally and return its id.
    pub async fn insert(&self, entry: &NewScheduleEntry) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO schedule_entries (date, time, title, kind, duration, course_id, completed, details)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(entry.date)
        .bind(&entry.time)
        .bind(&entry.title)
        .bind(entry.kind.as_str())
        .bind(entry.duration)
        .bind(&entry.course_id)
        .bind(&entry.details)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Look up the entry a course generated for `date`, if any.
    pub async fn find_course_entry(
        &self,
        course_id: &str,
        date: NaiveDate,
    ) -> Result<Option<ScheduleEntry>> {
        let entry = sqlx::query_as::<_, ScheduleEntry>(&format!(
            "SELECT {} FROM schedule_entries WHERE course_id = ? AND date = ?",
            ENTRY_COLUMNS
        ))
        .bind(course_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Insert a course-linked entry unless one already exists for its
    /// (course, date) key.
    ///
    /// The existence check is backed by a unique index, so a concurrent writer
    /// that wins the race turns this insert into [`InsertOutcome::Skipped`].
    pub async fn insert_course_entry_if_absent(
        &self,
        entry: &NewScheduleEntry,
    ) -> Result<InsertOutcome> {
        let Some(course_id) = entry.course_id.as_deref() else {
            return Ok(InsertOutcome::Created(self.insert(entry).await?));
        };

        if self.find_course_entry(course_id, entry.date).await?.is_some() {
            return Ok(InsertOutcome::Skipped);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO schedule_entries (date, time, title, kind, duration, course_id, completed, details)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(entry.date)
        .bind(&entry.time)
        .bind(&entry.title)
        .bind(entry.kind.as_str())
        .bind(entry.duration)
        .bind(course_id)
        .bind(&entry.details)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::Skipped)
        } else {
            Ok(InsertOutcome::Created(result.last_insert_rowid()))
        }
    }

    /// Fetch one entry.
    pub async fn get(&self, id: i64) -> Result<Option<ScheduleEntry>> {
        let entry = sqlx::query_as::<_, ScheduleEntry>(&format!(
            "SELECT {} FROM schedule_entries WHERE id = ?",
            ENTRY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Entries dated within `[from, to]`, ordered by date then time.
    pub async fn list_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<ScheduleEntry>> {
        let entries = sqlx::query_as::<_, ScheduleEntry>(&format!(
            r#"
            SELECT {} FROM schedule_entries
            WHERE date >= ? AND date <= ?
            ORDER BY date ASC, time ASC, id ASC
            "#,
            ENTRY_COLUMNS
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Every entry generated by a course, ordered by date.
    pub async fn list_for_course(&self, course_id: &str) -> Result<Vec<ScheduleEntry>> {
        let entries = sqlx::query_as::<_, ScheduleEntry>(&format!(
            r#"
            SELECT {} FROM schedule_entries
            WHERE course_id = ?
            ORDER BY date ASC, id ASC
            "#,
            ENTRY_COLUMNS
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Mark an entry as done (or undo it). Returns false when the id is unknown.
    pub async fn set_completed(&self, id: i64, completed: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE schedule_entries SET completed = ? WHERE id = ?")
            .bind(completed)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete one entry. Returns false when the id is unknown.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM schedule_entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a course's entries dated `today` or later that are not completed.
    ///
    /// Past and completed entries are left untouched.
    pub async fn delete_future_course_entries(
        &self,
        course_id: &str,
        today: NaiveDate,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM schedule_entries
            WHERE course_id = ? AND date >= ? AND completed = 0
            "#,
        )
        .bind(course_id)
        .bind(today)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations;
    use crate::schedule::EntryKind;
    use sqlx::sqlite::SqlitePoolOptions;

    /// Create an in-memory SQLite pool with the partition schema.
    async fn test_store() -> ScheduleStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");

        migrations::run_partition(&pool)
            .await
            .expect("Failed to run migrations");

        ScheduleStore::new(pool)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn course_entry(course_id: &str, on: NaiveDate) -> NewScheduleEntry {
        NewScheduleEntry {
            date: on,
            time: "09:00".to_string(),
            title: "Spin".to_string(),
            kind: EntryKind::Course,
            duration: 45,
            course_id: Some(course_id.to_string()),
            details: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = test_store().await;

        let id = store
            .insert(
                &NewScheduleEntry::personal(date(2024, 3, 1), "18:30", "Physio")
                    .duration(30)
                    .details("{\"room\":2}"),
            )
            .await
            .unwrap();

        let entry = store.get(id).await.unwrap().expect("entry should exist");
        assert_eq!(entry.date, date(2024, 3, 1));
        assert_eq!(entry.time, "18:30");
        assert_eq!(entry.entry_kind(), EntryKind::Personal);
        assert_eq!(entry.duration, 30);
        assert_eq!(entry.course_id, None);
        assert!(!entry.completed);
        assert_eq!(entry.details.as_deref(), Some("{\"room\":2}"));
    }

    #[tokio::test]
    async fn test_course_insert_is_idempotent() {
        let store = test_store().await;
        let entry = course_entry("course-1", date(2024, 1, 8));

        let first = store.insert_course_entry_if_absent(&entry).await.unwrap();
        let second = store.insert_course_entry_if_absent(&entry).await.unwrap();

        assert!(matches!(first, InsertOutcome::Created(_)));
        assert_eq!(second, InsertOutcome::Skipped);
        assert_eq!(store.list_for_course("course-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unique_index_rejects_blind_duplicate() {
        let store = test_store().await;
        let entry = course_entry("course-1", date(2024, 1, 8));

        store.insert(&entry).await.unwrap();
        assert!(store.insert(&entry).await.is_err());
    }

    #[tokio::test]
    async fn test_unlinked_entries_may_share_a_date() {
        let store = test_store().await;
        let entry = NewScheduleEntry::personal(date(2024, 1, 8), "07:00", "Run");

        store.insert(&entry).await.unwrap();
        store.insert(&entry).await.unwrap();

        let entries = store
            .list_range(date(2024, 1, 8), date(2024, 1, 8))
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_future_keeps_past_and_completed() {
        let store = test_store().await;
        let today = date(2024, 1, 10);

        let past = store
            .insert(&course_entry("c", date(2024, 1, 3)))
            .await
            .unwrap();
        let done_future = store
            .insert(&course_entry("c", date(2024, 1, 17)))
            .await
            .unwrap();
        store.set_completed(done_future, true).await.unwrap();
        store.insert(&course_entry("c", today)).await.unwrap();
        store
            .insert(&course_entry("c", date(2024, 1, 24)))
            .await
            .unwrap();
        store
            .insert(&course_entry("other", date(2024, 1, 24)))
            .await
            .unwrap();

        let deleted = store.delete_future_course_entries("c", today).await.unwrap();
        assert_eq!(deleted, 2);

        let remaining: Vec<i64> = store
            .list_for_course("c")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(remaining, vec![past, done_future]);
        assert_eq!(store.list_for_course("other").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_completed_and_delete_unknown_ids() {
        let store = test_store().await;

        assert!(!store.set_completed(999, true).await.unwrap());
        assert!(!store.delete(999).await.unwrap());

        let id = store
            .insert(&NewScheduleEntry::personal(date(2024, 1, 1), "10:00", "Stretch"))
            .await
            .unwrap();
        assert!(store.delete(id).await.unwrap());
        assert!(store.get(id).await.unwrap().is_none());
    }
}
