//! 数据库迁移
//!
//! 迁移按版本号顺序执行，每个迁移连同其版本记录在同一事务中提交，
//! 已记录在 `schema_migrations` 中的版本不会再次执行。

use rusqlite::{params, Connection};

use crate::storage::{StorageError, StorageResult};

/// 当前数据库 schema 版本
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// 迁移定义
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i32,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    // 大纲、计划、用户进度各存一行 JSON 文档
    Migration {
        version: 1,
        name: "键值文档表",
        sql: "CREATE TABLE IF NOT EXISTS kv_store (
                  key        TEXT PRIMARY KEY NOT NULL,
                  value      TEXT NOT NULL,
                  updated_at TEXT NOT NULL DEFAULT (datetime('now'))
              );",
    },
    Migration {
        version: 2,
        name: "任务完成记录",
        sql: "CREATE TABLE IF NOT EXISTS completion_log (
                  id           TEXT PRIMARY KEY NOT NULL,
                  task_id      TEXT NOT NULL,
                  topic        TEXT NOT NULL,
                  kind         TEXT NOT NULL,
                  xp_awarded   INTEGER NOT NULL,
                  level_after  INTEGER NOT NULL,
                  completed_at TEXT NOT NULL
              );
              CREATE INDEX IF NOT EXISTS idx_completion_log_completed_at
                  ON completion_log(completed_at);",
    },
];

fn ensure_migrations_table(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
             version    INTEGER PRIMARY KEY,
             name       TEXT NOT NULL,
             applied_at INTEGER NOT NULL
         );",
    )
    .map_err(|e| StorageError::Migration(format!("创建迁移表失败: {}", e)))
}

/// 当前数据库版本，没有迁移记录时为 0
pub fn get_current_version(conn: &Connection) -> i32 {
    if ensure_migrations_table(conn).is_err() {
        return 0;
    }

    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .unwrap_or(0)
}

/// 执行所有未应用的迁移，返回最终版本号
pub fn run_migrations(conn: &Connection) -> StorageResult<i32> {
    apply_pending(conn, MIGRATIONS)
}

fn apply_pending(conn: &Connection, migrations: &[Migration]) -> StorageResult<i32> {
    ensure_migrations_table(conn)?;

    let current = get_current_version(conn);
    let pending: Vec<&Migration> = migrations.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        return Ok(current);
    }

    tracing::debug!(current, pending = pending.len(), "检查数据库版本");

    let mut version = current;
    for migration in pending {
        tracing::info!(version = migration.version, name = migration.name, "运行迁移");
        apply_one(conn, migration).map_err(|e| {
            tracing::error!(version = migration.version, error = %e, "迁移失败");
            e
        })?;
        version = migration.version;
    }

    Ok(version)
}

/// 迁移脚本与版本记录一起提交，失败时整体回滚
fn apply_one(conn: &Connection, migration: &Migration) -> StorageResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(migration.sql).map_err(|e| {
        StorageError::Migration(format!("迁移 v{} 执行失败: {}", migration.version, e))
    })?;
    tx.execute(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
        params![
            migration.version,
            migration.name,
            chrono::Utc::now().timestamp()
        ],
    )?;

    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, table: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count > 0)
        .unwrap_or(false)
    }

    #[test]
    fn test_migrations_sorted_and_complete() {
        assert_eq!(MIGRATIONS.len(), CURRENT_SCHEMA_VERSION as usize);
        assert!(MIGRATIONS.windows(2).all(|w| w[0].version < w[1].version));
    }

    #[test]
    fn test_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_current_version(&conn), 0);

        let version = run_migrations(&conn).unwrap();

        assert_eq!(version, CURRENT_SCHEMA_VERSION);
        assert!(table_exists(&conn, "kv_store"));
        assert!(table_exists(&conn, "completion_log"));
    }

    #[test]
    fn test_rerun_is_noop() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        let first: String = conn
            .query_row(
                "SELECT name FROM schema_migrations WHERE version = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(rows, 2);
        assert_eq!(first, "键值文档表");
        assert_eq!(get_current_version(&conn), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_failed_migration_rolls_back() {
        let conn = Connection::open_in_memory().unwrap();
        let broken = [
            MIGRATIONS[0],
            Migration {
                version: 2,
                name: "半途失败",
                sql: "CREATE TABLE half_done (id INTEGER); INSERT INTO missing_table VALUES (1);",
            },
        ];

        let err = apply_pending(&conn, &broken).unwrap_err();

        assert!(matches!(err, StorageError::Migration(_)));
        assert_eq!(get_current_version(&conn), 1);
        assert!(!table_exists(&conn, "half_done"));

        // 修复后的迁移可以继续执行
        assert_eq!(run_migrations(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }
}
