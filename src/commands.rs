//! 命令行命令
//!
//! 把命令行参数映射到进度存储操作：
//! - 查看进度、今日任务与计划统计
//! - 导入大纲、学习计划（JSON 文件，经过边界校验）
//! - 对照当前计划查看薄弱主题（只读，不写入存储）
//! - 完成任务、调整进度、清除当前会话
//!
//! 每个命令的结果都是一个 JSON 值，由调用方负责输出。

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};

use crate::achievements::AchievementProgress;
use crate::analytics::{completions_per_day, PlanSummary, TaskCounts, XpBar};
use crate::error::StoreError;
use crate::models::{ProgressPatch, StudyTask, UserProgress};
use crate::repository::ProgressRepository;
use crate::storage::StorageError;
use crate::store::ProgressStore;
use crate::validation::{parse_study_plan, parse_syllabus, parse_topics};

// ============================================================
// 参数定义
// ============================================================

#[derive(Debug, Parser)]
#[command(name = "xenia-progress", version, about = "学习进度与游戏化引擎")]
pub struct Cli {
    /// 数据库文件路径，覆盖 XENIA_DB_PATH
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// 当前进度、今日任务与计划统计
    Status,
    /// 导入大纲分析结果
    ImportSyllabus { file: PathBuf },
    /// 导入学习计划（替换当前计划）
    ImportPlan { file: PathBuf },
    /// 对照当前计划查看薄弱主题识别结果
    WeakTopics { file: PathBuf },
    /// 完成任务
    Complete { task_id: String },
    /// 设置主题掌握度 (0-100)
    Mastery { topic: String, mastery: f64 },
    /// 连续次数归零
    ResetStreak,
    /// 清除大纲与计划，保留进度
    Clear,
    /// 任务完成记录与每日完成数
    History,
}

// ============================================================
// 响应类型
// ============================================================

/// `status` 命令的输出
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub course_name: Option<String>,
    pub user_progress: UserProgress,
    pub xp_bar: XpBar,
    /// 按日历计算的连续学习天数
    pub calendar_streak: u32,
    /// 今天是计划的第几天，计划未开始或已结束时为空
    pub current_day: Option<u32>,
    pub today_tasks: Vec<StudyTask>,
    pub plan_summary: Option<PlanSummary>,
    pub achievements: Vec<AchievementProgress>,
}

/// `weak-topics` 命令中的单个主题
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakTopicView {
    pub name: String,
    pub mastery: Option<f64>,
    /// 当前计划中该主题的任务数，没有计划或计划中没有该主题时为空
    pub planned: Option<TaskCounts>,
}

// ============================================================
// 错误转换
// ============================================================

pub fn map_storage_error(e: StorageError) -> String {
    match e {
        StorageError::Database(e) => format!("数据库错误: {}", e),
        StorageError::Io(e) => format!("文件错误: {}", e),
        StorageError::Migration(e) => format!("数据库迁移错误: {}", e),
        StorageError::Serialization(e) => format!("序列化错误: {}", e),
        StorageError::LockError(e) => format!("锁错误: {}", e),
    }
}

pub fn map_store_error(e: StoreError) -> String {
    match e {
        StoreError::Persistence(e) => format!("保存失败，请重试: {}", map_storage_error(e)),
        StoreError::Validation(e) => format!("数据校验失败: {}", e),
    }
}

fn read_input(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("读取文件失败 {}: {}", path.display(), e))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| format!("序列化错误: {}", e))
}

// ============================================================
// 命令执行
// ============================================================

pub fn status_view<R: ProgressRepository>(
    store: &ProgressStore<R>,
    today: NaiveDate,
) -> Result<StatusView, String> {
    Ok(StatusView {
        course_name: store.syllabus().map(|s| s.course_name.clone()),
        user_progress: store.user_progress().clone(),
        xp_bar: store.xp_bar(),
        calendar_streak: store.calendar_streak(today).map_err(map_store_error)?,
        current_day: store.study_plan().and_then(|p| p.current_day(today)),
        today_tasks: store.today_tasks(today),
        plan_summary: store.plan_summary(),
        achievements: store.achievement_progress(),
    })
}

pub fn execute<R: ProgressRepository>(
    store: &mut ProgressStore<R>,
    command: &Command,
    today: NaiveDate,
) -> Result<Value, String> {
    match command {
        Command::Status => to_json(&status_view(store, today)?),

        Command::ImportSyllabus { file } => {
            let syllabus =
                parse_syllabus(&read_input(file)?).map_err(|e| format!("大纲格式无效: {}", e))?;
            store.set_syllabus(Some(syllabus)).map_err(map_store_error)?;
            to_json(&store.syllabus())
        }

        Command::ImportPlan { file } => {
            let plan =
                parse_study_plan(&read_input(file)?).map_err(|e| format!("计划格式无效: {}", e))?;
            store.set_study_plan(Some(plan)).map_err(map_store_error)?;
            to_json(&store.plan_summary())
        }

        Command::WeakTopics { file } => {
            let topics =
                parse_topics(&read_input(file)?).map_err(|e| format!("主题格式无效: {}", e))?;
            let summary = store.plan_summary();
            let views: Vec<WeakTopicView> = topics
                .into_iter()
                .map(|topic| WeakTopicView {
                    planned: summary
                        .as_ref()
                        .and_then(|s| s.by_topic.get(&topic.name).copied()),
                    name: topic.name,
                    mastery: topic.mastery,
                })
                .collect();
            to_json(&views)
        }

        Command::Complete { task_id } => {
            let outcome = store.complete_task(task_id).map_err(map_store_error)?;
            to_json(&outcome)
        }

        Command::Mastery { topic, mastery } => {
            let updated = store
                .update_topic_mastery(topic, *mastery)
                .map_err(map_store_error)?;
            Ok(json!({ "topic": topic, "updated": updated }))
        }

        Command::ResetStreak => {
            let progress = store
                .update_user_progress(ProgressPatch {
                    streak: Some(0),
                    ..ProgressPatch::default()
                })
                .map_err(map_store_error)?;
            to_json(&progress)
        }

        Command::Clear => {
            store.clear_session().map_err(map_store_error)?;
            Ok(json!({ "cleared": true }))
        }

        Command::History => {
            let history = store.completion_history().map_err(map_store_error)?;
            let per_day = completions_per_day(&history);
            Ok(json!({ "records": to_json(&history)?, "perDay": to_json(&per_day)? }))
        }
    }
}
