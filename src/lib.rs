//! Xenia 学习进度引擎
//!
//! 本地持久化的学习进度存储：大纲、学习计划、用户进度（经验、等级、
//! 连续次数、成就），以及基于它们的只读统计。

pub mod achievements;
pub mod analytics;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod repository;
pub mod storage;
pub mod store;
pub mod validation;

pub use error::{StoreError, StoreResult};
pub use models::{
    CompletionRecord, ProgressPatch, StudyPlan, StudyTask, Syllabus, TaskKind, Topic,
    UserProgress,
};
pub use repository::{MemoryProgressRepository, ProgressRepository, SqliteProgressRepository};
pub use store::{
    CompletionOutcome, CompletionReport, HydrationReport, HydrationStatus, ProgressStore,
    SharedProgressStore, StoreState,
};
