//! SQLite 本地存储模块
//!
//! 提供本地 SQLite 持久化能力，支持：
//! - 按键存储 JSON 文档（大纲、计划、用户进度各占一个键）
//! - 任务完成记录的追加写入
//! - 多个写入在同一事务中提交

// ============================================================
// 子模块声明
// ============================================================

pub mod completion_log;
pub mod kv;
pub mod migrations;

// ============================================================
// 重新导出主要类型
// ============================================================

pub use completion_log::CompletionLogRepository;
pub use kv::{KvRepository, KvWrite};
pub use migrations::run_migrations;

// ============================================================
// 依赖导入
// ============================================================

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

// ============================================================
// 错误类型定义
// ============================================================

/// 存储模块错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("文件错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("迁移错误: {0}")]
    Migration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("锁获取失败: {0}")]
    LockError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

// ============================================================
// Storage - 统一存储结构体
// ============================================================

/// 统一存储结构体
///
/// 持有共享的数据库连接，提供对各 Repository 的便捷访问。克隆开销很小，
/// 所有克隆共享同一个连接。
#[derive(Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
    db_path: String,
}

impl Storage {
    /// 打开（必要时创建）数据库文件
    ///
    /// 自动创建父目录、启用 WAL 模式，并运行数据库迁移。
    pub fn new<P: AsRef<Path>>(db_path: P) -> StorageResult<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let connection = Connection::open(path)?;

        // 启用 WAL 模式以提高并发性能
        connection.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;

        Self::with_connection(connection, path.to_string_lossy().to_string())
    }

    /// 创建内存数据库（用于测试和临时会话）
    pub fn in_memory() -> StorageResult<Self> {
        let connection = Connection::open_in_memory()?;
        connection.execute_batch("PRAGMA foreign_keys=ON;")?;

        Self::with_connection(connection, ":memory:".to_string())
    }

    fn with_connection(connection: Connection, db_path: String) -> StorageResult<Self> {
        let conn = Arc::new(Mutex::new(connection));

        // 运行迁移
        {
            let guard = conn
                .lock()
                .map_err(|e| StorageError::LockError(e.to_string()))?;
            migrations::run_migrations(&guard)?;
        }

        Ok(Self { conn, db_path })
    }

    /// 获取数据库连接的锁
    pub fn get_connection(&self) -> StorageResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }

    /// 获取数据库路径
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// 获取键值仓库
    pub fn kv(&self) -> KvRepository {
        KvRepository::new(Arc::clone(&self.conn))
    }

    /// 获取完成记录仓库
    pub fn completion_log(&self) -> CompletionLogRepository {
        CompletionLogRepository::new(Arc::clone(&self.conn))
    }

    /// 执行事务
    ///
    /// 闭包返回错误时整个事务回滚，任何写入都不会生效。
    ///
    /// # Example
    /// ```ignore
    /// storage.transaction(|conn| {
    ///     KvRepository::put_in(conn, "xenia-studyPlan", &plan_json)?;
    ///     KvRepository::put_in(conn, "xenia-userProgress", &progress_json)?;
    ///     Ok(())
    /// })?;
    /// ```
    pub fn transaction<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T>,
    {
        let mut conn = self.get_connection()?;

        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;

        Ok(result)
    }
}

// ============================================================
// 测试
// ============================================================
