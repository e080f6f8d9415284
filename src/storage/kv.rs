//! 键值文档存储
//!
//! 每个键保存一个 JSON 字符串。键不存在是合法的"从未写入"状态。

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use crate::storage::{StorageError, StorageResult};

/// 批量写入中的单个操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvWrite {
    Put { key: String, value: String },
    Delete { key: String },
}

impl KvWrite {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }
}

/// 键值仓储
pub struct KvRepository {
    conn: Arc<Mutex<Connection>>,
}

impl KvRepository {
    /// 创建新的仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_connection(&self) -> StorageResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }

    // ========== 单键操作 ==========

    /// 读取键值
    pub fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.get_connection()?;
        Self::get_in(&conn, key)
    }

    /// 写入键值（插入或覆盖）
    pub fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.get_connection()?;
        Self::put_in(&conn, key, value)
    }

    // ========== 批量操作 ==========

    /// 在同一事务中执行多个写入，任意一个失败则全部回滚
    pub fn apply(&self, writes: &[KvWrite]) -> StorageResult<()> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        Self::apply_in(&tx, writes)?;
        tx.commit()?;
        Ok(())
    }

    // ========== 基于已有连接/事务的操作 ==========

    pub fn get_in(conn: &Connection, key: &str) -> StorageResult<Option<String>> {
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn put_in(conn: &Connection, key: &str, value: &str) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete_in(conn: &Connection, key: &str) -> StorageResult<bool> {
        let affected = conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    pub fn apply_in(conn: &Connection, writes: &[KvWrite]) -> StorageResult<()> {
        for write in writes {
            match write {
                KvWrite::Put { key, value } => Self::put_in(conn, key, value)?,
                KvWrite::Delete { key } => {
                    Self::delete_in(conn, key)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn repo() -> (Storage, KvRepository) {
        let storage = Storage::in_memory().expect("Failed to create in-memory storage");
        let kv = storage.kv();
        (storage, kv)
    }

    #[test]
    fn test_get_missing_key() {
        let (_storage, kv) = repo();
        assert_eq!(kv.get("xenia-syllabus").unwrap(), None);
    }

    #[test]
    fn test_set_get_overwrite() {
        let (_storage, kv) = repo();

        kv.set("xenia-userProgress", "{\"xp\":1}").unwrap();
        assert_eq!(
            kv.get("xenia-userProgress").unwrap().as_deref(),
            Some("{\"xp\":1}")
        );

        kv.set("xenia-userProgress", "{\"xp\":2}").unwrap();
        assert_eq!(
            kv.get("xenia-userProgress").unwrap().as_deref(),
            Some("{\"xp\":2}")
        );
    }

    #[test]
    fn test_delete_missing_key_is_ok() {
        let (_storage, kv) = repo();
        kv.set("k", "v").unwrap();

        kv.apply(&[KvWrite::delete("k")]).unwrap();
        kv.apply(&[KvWrite::delete("k")]).unwrap();
        assert_eq!(kv.get("k").unwrap(), None);
    }

    #[test]
    fn test_apply_batch() {
        let (_storage, kv) = repo();
        kv.set("old", "x").unwrap();

        kv.apply(&[
            KvWrite::put("a", "1"),
            KvWrite::put("b", "2"),
            KvWrite::delete("old"),
        ])
        .unwrap();

        assert_eq!(kv.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(kv.get("b").unwrap().as_deref(), Some("2"));
        assert_eq!(kv.get("old").unwrap(), None);
    }

    #[test]
    fn test_apply_batch_is_atomic() {
        let (storage, kv) = repo();
        {
            let conn = storage.get_connection().unwrap();
            conn.execute_batch(
                "CREATE TRIGGER reject_b BEFORE INSERT ON kv_store WHEN NEW.key = 'b'
                 BEGIN SELECT RAISE(ABORT, 'quota exceeded'); END;",
            )
            .unwrap();
        }

        let result = kv.apply(&[KvWrite::put("a", "1"), KvWrite::put("b", "2")]);

        assert!(result.is_err());
        assert_eq!(kv.get("a").unwrap(), None);
    }
}
