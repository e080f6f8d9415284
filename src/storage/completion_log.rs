//! 任务完成记录数据库操作模块
//!
//! 完成记录只追加不修改，按完成时间排序读取。

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

use crate::models::{CompletionRecord, TaskKind};
use crate::storage::{StorageError, StorageResult};

/// 完成记录仓储
pub struct CompletionLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CompletionLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_connection(&self) -> StorageResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }

    /// 获取全部完成记录（按完成时间升序）
    pub fn list(&self) -> StorageResult<Vec<CompletionRecord>> {
        let conn = self.get_connection()?;
        Self::list_in(&conn)
    }

    pub fn append_in(conn: &Connection, record: &CompletionRecord) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT INTO completion_log (
                id, task_id, topic, kind, xp_awarded, level_after, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.id,
                record.task_id,
                record.topic,
                record.kind.as_str(),
                i64::try_from(record.xp_awarded).unwrap_or(i64::MAX),
                record.level_after,
                // 固定宽度，保证按字符串排序即按时间排序
                record.completed_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            ],
        )?;
        Ok(())
    }

    pub fn list_in(conn: &Connection) -> StorageResult<Vec<CompletionRecord>> {
        let mut stmt = conn.prepare(
            "SELECT id, task_id, topic, kind, xp_awarded, level_after, completed_at
             FROM completion_log ORDER BY completed_at ASC, rowid ASC",
        )?;

        let records = stmt
            .query_map([], record_from_row)?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(records)
    }
}

// list_in 查询中的列序号
const KIND_COLUMN: usize = 3;
const XP_AWARDED_COLUMN: usize = 4;
const COMPLETED_AT_COLUMN: usize = 6;

fn conversion_error(column: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, ty, message.into())
}

fn record_from_row(row: &Row) -> SqliteResult<CompletionRecord> {
    let kind: String = row.get(KIND_COLUMN)?;
    let kind = TaskKind::parse(&kind).ok_or_else(|| {
        conversion_error(KIND_COLUMN, Type::Text, format!("未知的任务类型: {kind}"))
    })?;

    let completed_at: String = row.get(COMPLETED_AT_COLUMN)?;
    let completed_at = DateTime::parse_from_rfc3339(&completed_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            conversion_error(
                COMPLETED_AT_COLUMN,
                Type::Text,
                format!("无法解析完成时间 {completed_at}: {e}"),
            )
        })?;

    let xp_awarded: i64 = row.get(XP_AWARDED_COLUMN)?;
    let xp_awarded = u64::try_from(xp_awarded).map_err(|e| {
        conversion_error(XP_AWARDED_COLUMN, Type::Integer, e.to_string())
    })?;

    Ok(CompletionRecord {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        topic: row.get("topic")?,
        kind,
        xp_awarded,
        level_after: row.get("level_after")?,
        completed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudyTask;
    use crate::storage::Storage;
    use chrono::TimeZone;

    fn record(task_id: &str, minute: u32) -> CompletionRecord {
        let task = StudyTask {
            id: task_id.to_string(),
            day: 0,
            description: "d".to_string(),
            topic: "Trees".to_string(),
            kind: TaskKind::Review,
            is_completed: true,
            estimated_minutes: 15,
        };
        let mut record = CompletionRecord::new(&task, 10, 1);
        record.completed_at = Utc.with_ymd_and_hms(2026, 4, 1, 8, minute, 0).unwrap();
        record
    }

    fn append(storage: &Storage, record: &CompletionRecord) {
        storage
            .transaction(|conn| CompletionLogRepository::append_in(conn, record))
            .unwrap();
    }

    #[test]
    fn test_append_and_list() {
        let storage = Storage::in_memory().unwrap();

        append(&storage, &record("late", 30));
        append(&storage, &record("early", 5));

        let records = storage.completion_log().list().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].task_id, "early");
        assert_eq!(records[1].task_id, "late");
        assert_eq!(records[0].kind, TaskKind::Review);
        assert_eq!(records[0].xp_awarded, 10);
    }

    #[test]
    fn test_round_trip_preserves_record() {
        let storage = Storage::in_memory().unwrap();
        let original = record("t1", 0);

        append(&storage, &original);

        assert_eq!(storage.completion_log().list().unwrap(), vec![original]);
    }

    fn insert_raw(storage: &Storage, kind: &str, completed_at: &str) {
        let conn = storage.get_connection().unwrap();
        conn.execute(
            "INSERT INTO completion_log (id, task_id, topic, kind, xp_awarded, level_after, completed_at)
             VALUES ('r1', 't1', 'Trees', ?1, 10, 1, ?2)",
            params![kind, completed_at],
        )
        .unwrap();
    }

    #[test]
    fn test_unknown_kind_is_an_error() {
        let storage = Storage::in_memory().unwrap();
        insert_raw(&storage, "quiz", "2026-04-01T08:00:00Z");

        let err = storage.completion_log().list().unwrap_err();
        assert!(matches!(
            err,
            StorageError::Database(rusqlite::Error::FromSqlConversionFailure(KIND_COLUMN, _, _))
        ));
    }

    #[test]
    fn test_bad_timestamp_is_an_error() {
        let storage = Storage::in_memory().unwrap();
        insert_raw(&storage, "review", "yesterday-ish");

        let err = storage.completion_log().list().unwrap_err();
        assert!(matches!(
            err,
            StorageError::Database(rusqlite::Error::FromSqlConversionFailure(
                COMPLETED_AT_COLUMN,
                _,
                _
            ))
        ));
    }
}
