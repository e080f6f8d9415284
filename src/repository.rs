//! 进度持久化端口
//!
//! `ProgressRepository` 把三个独立的持久化键（大纲、计划、用户进度）
//! 抽象成按实体的 load/save 操作，另外提供一次性写入计划 + 进度 + 完成记录
//! 的 `save_completion`，保证任务完成不会被写一半。
//!
//! 提供两个实现：
//! - [`SqliteProgressRepository`]: 基于本地 SQLite 的持久化实现
//! - [`MemoryProgressRepository`]: 进程内实现，用于临时会话和测试

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::DEFAULT_KEY_PREFIX;
use crate::models::{CompletionRecord, StudyPlan, Syllabus, UserProgress};
use crate::storage::{KvRepository, KvWrite, Storage, StorageError, StorageResult};
use crate::validation::{parse_document, Validate};

// ============================================================
// DurableKey - 持久化键
// ============================================================

/// 持久化键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DurableKey {
    Syllabus,
    StudyPlan,
    UserProgress,
}

impl DurableKey {
    pub const ALL: [DurableKey; 3] = [Self::Syllabus, Self::StudyPlan, Self::UserProgress];

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Syllabus => "syllabus",
            Self::StudyPlan => "studyPlan",
            Self::UserProgress => "userProgress",
        }
    }

    /// 带命名空间的完整键名，例如 `xenia-studyPlan`
    pub fn key(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.suffix())
    }
}

// ============================================================
// ProgressRepository - 持久化端口
// ============================================================

/// 进度持久化端口
///
/// load 系列方法在键不存在时返回 `Ok(None)`；内容损坏或不满足结构约定时返回
/// `StorageError::Serialization`。各键互不影响。
pub trait ProgressRepository: Send + Sync {
    fn load_syllabus(&self) -> StorageResult<Option<Syllabus>>;
    fn load_study_plan(&self) -> StorageResult<Option<StudyPlan>>;
    fn load_user_progress(&self) -> StorageResult<Option<UserProgress>>;

    /// 写入大纲，`None` 表示删除该键
    fn save_syllabus(&self, syllabus: Option<&Syllabus>) -> StorageResult<()>;
    /// 写入计划，`None` 表示删除该键
    fn save_study_plan(&self, plan: Option<&StudyPlan>) -> StorageResult<()>;
    fn save_user_progress(&self, progress: &UserProgress) -> StorageResult<()>;

    /// 原子写入一次任务完成：计划、进度和完成记录要么全部生效，要么都不生效
    fn save_completion(
        &self,
        plan: &StudyPlan,
        progress: &UserProgress,
        record: &CompletionRecord,
    ) -> StorageResult<()>;

    /// 原子删除大纲和计划
    fn clear_session(&self) -> StorageResult<()>;

    fn load_completion_history(&self) -> StorageResult<Vec<CompletionRecord>>;
}

impl<R: ProgressRepository + ?Sized> ProgressRepository for Arc<R> {
    fn load_syllabus(&self) -> StorageResult<Option<Syllabus>> {
        (**self).load_syllabus()
    }

    fn load_study_plan(&self) -> StorageResult<Option<StudyPlan>> {
        (**self).load_study_plan()
    }

    fn load_user_progress(&self) -> StorageResult<Option<UserProgress>> {
        (**self).load_user_progress()
    }

    fn save_syllabus(&self, syllabus: Option<&Syllabus>) -> StorageResult<()> {
        (**self).save_syllabus(syllabus)
    }

    fn save_study_plan(&self, plan: Option<&StudyPlan>) -> StorageResult<()> {
        (**self).save_study_plan(plan)
    }

    fn save_user_progress(&self, progress: &UserProgress) -> StorageResult<()> {
        (**self).save_user_progress(progress)
    }

    fn save_completion(
        &self,
        plan: &StudyPlan,
        progress: &UserProgress,
        record: &CompletionRecord,
    ) -> StorageResult<()> {
        (**self).save_completion(plan, progress, record)
    }

    fn clear_session(&self) -> StorageResult<()> {
        (**self).clear_session()
    }

    fn load_completion_history(&self) -> StorageResult<Vec<CompletionRecord>> {
        (**self).load_completion_history()
    }
}

// ========== 编解码辅助 ==========

fn encode<T: Serialize + Validate>(value: &T) -> StorageResult<String> {
    value
        .validate()
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(serde_json::to_string(value)?)
}

fn decode<T: DeserializeOwned + Validate>(key: &str, raw: Option<String>) -> StorageResult<Option<T>> {
    match raw {
        None => Ok(None),
        Some(raw) => parse_document(&raw)
            .map(Some)
            .map_err(|e| StorageError::Serialization(format!("{key}: {e}"))),
    }
}

fn optional_write<T: Serialize + Validate>(key: String, value: Option<&T>) -> StorageResult<KvWrite> {
    match value {
        Some(value) => Ok(KvWrite::put(key, encode(value)?)),
        None => Ok(KvWrite::delete(key)),
    }
}

// ============================================================
// SqliteProgressRepository - SQLite 实现
// ============================================================

/// 基于 SQLite 的进度仓储
pub struct SqliteProgressRepository {
    storage: Storage,
    prefix: String,
}

impl SqliteProgressRepository {
    pub fn new(storage: Storage, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
        }
    }

    /// 使用默认前缀 `xenia`
    pub fn with_default_prefix(storage: Storage) -> Self {
        Self::new(storage, DEFAULT_KEY_PREFIX)
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn key(&self, key: DurableKey) -> String {
        key.key(&self.prefix)
    }

    fn kv(&self) -> KvRepository {
        self.storage.kv()
    }

    fn load<T: DeserializeOwned + Validate>(&self, key: DurableKey) -> StorageResult<Option<T>> {
        let key = self.key(key);
        let raw = self.kv().get(&key)?;
        decode(&key, raw)
    }
}

impl ProgressRepository for SqliteProgressRepository {
    fn load_syllabus(&self) -> StorageResult<Option<Syllabus>> {
        self.load(DurableKey::Syllabus)
    }

    fn load_study_plan(&self) -> StorageResult<Option<StudyPlan>> {
        self.load(DurableKey::StudyPlan)
    }

    fn load_user_progress(&self) -> StorageResult<Option<UserProgress>> {
        self.load(DurableKey::UserProgress)
    }

    fn save_syllabus(&self, syllabus: Option<&Syllabus>) -> StorageResult<()> {
        let write = optional_write(self.key(DurableKey::Syllabus), syllabus)?;
        self.kv().apply(&[write])
    }

    fn save_study_plan(&self, plan: Option<&StudyPlan>) -> StorageResult<()> {
        let write = optional_write(self.key(DurableKey::StudyPlan), plan)?;
        self.kv().apply(&[write])
    }

    fn save_user_progress(&self, progress: &UserProgress) -> StorageResult<()> {
        self.kv()
            .set(&self.key(DurableKey::UserProgress), &encode(progress)?)
    }

    fn save_completion(
        &self,
        plan: &StudyPlan,
        progress: &UserProgress,
        record: &CompletionRecord,
    ) -> StorageResult<()> {
        let writes = [
            KvWrite::put(self.key(DurableKey::StudyPlan), encode(plan)?),
            KvWrite::put(self.key(DurableKey::UserProgress), encode(progress)?),
        ];

        self.storage.transaction(|conn| {
            KvRepository::apply_in(conn, &writes)?;
            crate::storage::CompletionLogRepository::append_in(conn, record)
        })
    }

    fn clear_session(&self) -> StorageResult<()> {
        self.kv().apply(&[
            KvWrite::delete(self.key(DurableKey::Syllabus)),
            KvWrite::delete(self.key(DurableKey::StudyPlan)),
        ])
    }

    fn load_completion_history(&self) -> StorageResult<Vec<CompletionRecord>> {
        self.storage.completion_log().list()
    }
}

// ============================================================
// MemoryProgressRepository - 内存实现
// ============================================================

#[derive(Default)]
struct MemoryInner {
    blobs: HashMap<String, String>,
    history: Vec<CompletionRecord>,
}

/// 进程内进度仓储
///
/// 与 SQLite 实现一样以 JSON 字符串保存各键，因此解析与损坏处理的行为一致。
/// 所有写入都在同一把锁内完成，天然原子。
pub struct MemoryProgressRepository {
    prefix: String,
    inner: Mutex<MemoryInner>,
}

impl Default for MemoryProgressRepository {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl MemoryProgressRepository {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            inner: Mutex::new(MemoryInner::default()),
        }
    }

    pub fn key(&self, key: DurableKey) -> String {
        key.key(&self.prefix)
    }

    /// 读取某个键的原始内容
    pub fn raw(&self, key: DurableKey) -> Option<String> {
        self.inner.lock().blobs.get(&self.key(key)).cloned()
    }

    /// 直接写入原始内容，不做校验
    pub fn put_raw(&self, key: DurableKey, raw: impl Into<String>) {
        let key = self.key(key);
        self.inner.lock().blobs.insert(key, raw.into());
    }

    fn load<T: DeserializeOwned + Validate>(&self, key: DurableKey) -> StorageResult<Option<T>> {
        let key = self.key(key);
        let raw = self.inner.lock().blobs.get(&key).cloned();
        decode(&key, raw)
    }

    fn store(&self, write: KvWrite) {
        let mut inner = self.inner.lock();
        match write {
            KvWrite::Put { key, value } => {
                inner.blobs.insert(key, value);
            }
            KvWrite::Delete { key } => {
                inner.blobs.remove(&key);
            }
        }
    }
}

impl ProgressRepository for MemoryProgressRepository {
    fn load_syllabus(&self) -> StorageResult<Option<Syllabus>> {
        self.load(DurableKey::Syllabus)
    }

    fn load_study_plan(&self) -> StorageResult<Option<StudyPlan>> {
        self.load(DurableKey::StudyPlan)
    }

    fn load_user_progress(&self) -> StorageResult<Option<UserProgress>> {
        self.load(DurableKey::UserProgress)
    }

    fn save_syllabus(&self, syllabus: Option<&Syllabus>) -> StorageResult<()> {
        let write = optional_write(self.key(DurableKey::Syllabus), syllabus)?;
        self.store(write);
        Ok(())
    }

    fn save_study_plan(&self, plan: Option<&StudyPlan>) -> StorageResult<()> {
        let write = optional_write(self.key(DurableKey::StudyPlan), plan)?;
        self.store(write);
        Ok(())
    }

    fn save_user_progress(&self, progress: &UserProgress) -> StorageResult<()> {
        let write = KvWrite::put(self.key(DurableKey::UserProgress), encode(progress)?);
        self.store(write);
        Ok(())
    }

    fn save_completion(
        &self,
        plan: &StudyPlan,
        progress: &UserProgress,
        record: &CompletionRecord,
    ) -> StorageResult<()> {
        let plan_json = encode(plan)?;
        let progress_json = encode(progress)?;

        let mut inner = self.inner.lock();
        inner.blobs.insert(self.key(DurableKey::StudyPlan), plan_json);
        inner
            .blobs
            .insert(self.key(DurableKey::UserProgress), progress_json);
        inner.history.push(record.clone());
        Ok(())
    }

    fn clear_session(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.blobs.remove(&self.key(DurableKey::Syllabus));
        inner.blobs.remove(&self.key(DurableKey::StudyPlan));
        Ok(())
    }

    fn load_completion_history(&self) -> StorageResult<Vec<CompletionRecord>> {
        let mut history = self.inner.lock().history.clone();
        history.sort_by_key(|r| r.completed_at);
        Ok(history)
    }
}

// ============================================================
// 测试
// ============================================================
