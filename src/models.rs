//! 数据模型定义
//!
//! 定义大纲、学习计划、学习任务与用户进度的数据结构，以及经验值/等级规则。
//! 所有结构的 JSON 字段均为 camelCase，与持久化文档格式一致。

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// 每完成一个任务奖励的经验值
pub const XP_PER_TASK: u64 = 10;

/// 等级系数：从 L 级升到 L+1 级需要累计经验达到 L * 100
pub const XP_LEVEL_FACTOR: u64 = 100;

// ============================================================
// Topic / Syllabus - 课程大纲
// ============================================================

/// 大纲主题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    /// 主题名称
    pub name: String,
    /// 子主题列表
    pub sub_topics: Vec<String>,
    /// 掌握度 (0-100)，允许小数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mastery: Option<f64>,
}

impl Topic {
    pub fn new(name: impl Into<String>, sub_topics: Vec<String>) -> Self {
        Self {
            name: name.into(),
            sub_topics,
            mastery: None,
        }
    }
}

/// 课程大纲
///
/// 每次上传整体替换，不做局部修改（主题掌握度除外）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Syllabus {
    /// 课程名称
    pub course_name: String,
    /// 有序主题列表
    pub topics: Vec<Topic>,
}

// ============================================================
// StudyTask / StudyPlan - 学习计划
// ============================================================

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Review,
    Practice,
    Read,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Practice => "practice",
            Self::Read => "read",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "review" => Some(Self::Review),
            "practice" => Some(Self::Practice),
            "read" => Some(Self::Read),
            _ => None,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 学习任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyTask {
    /// 任务 ID，计划内唯一，是完成操作唯一的查找依据
    pub id: String,
    /// 计划中的第几天 (从 0 开始)
    pub day: u32,
    /// 任务描述
    pub description: String,
    /// 所属主题
    pub topic: String,
    /// 任务类型
    #[serde(rename = "type", alias = "kind")]
    pub kind: TaskKind,
    /// 是否已完成（只会从 false 变为 true）
    pub is_completed: bool,
    /// 预计耗时 (分钟)
    pub estimated_minutes: u32,
}

/// 学习计划
///
/// 计划拥有其全部任务；替换计划即丢弃旧任务及其完成状态。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyPlan {
    /// 开始日期，ISO-8601 日期或 RFC 3339 时间戳，原样保存
    pub start_date: String,
    /// 计划天数
    pub duration_days: u32,
    /// 任务列表
    pub tasks: Vec<StudyTask>,
}

impl StudyPlan {
    /// 解析开始日期
    ///
    /// 同时接受 `2026-01-05` 与 `2026-01-05T08:00:00Z` 两种写法。
    pub fn start_day(&self) -> Option<NaiveDate> {
        parse_plan_date(&self.start_date)
    }

    /// 按 ID 查找任务，ID 重复时取第一个
    pub fn find_task(&self, task_id: &str) -> Option<&StudyTask> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn task_position(&self, task_id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == task_id)
    }

    /// 获取某一天的任务
    pub fn tasks_for_day(&self, day: u32) -> Vec<&StudyTask> {
        self.tasks.iter().filter(|t| t.day == day).collect()
    }

    /// 计算 `today` 对应计划中的第几天
    ///
    /// 计划开始前或结束后返回 None。
    pub fn current_day(&self, today: NaiveDate) -> Option<u32> {
        let start = self.start_day()?;
        let elapsed = (today - start).num_days();
        if elapsed < 0 || elapsed >= i64::from(self.duration_days) {
            return None;
        }
        u32::try_from(elapsed).ok()
    }

    /// 获取 `today` 当天的任务
    pub fn today_tasks(&self, today: NaiveDate) -> Vec<&StudyTask> {
        match self.current_day(today) {
            Some(day) => self.tasks_for_day(day),
            None => Vec::new(),
        }
    }
}

/// ISO-8601 日期写法：日历日期、周日期、序数日期（扩展与基本格式）
const ISO_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y%m%d",
    "%G-W%V-%u",
    "%GW%V%u",
    "%Y-%j",
];

/// ISO-8601 日期时间（不带时区）
const ISO_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

pub(crate) fn parse_plan_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    if let Some(date) = ISO_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
    {
        return Some(date);
    }
    ISO_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.date())
}

// ============================================================
// UserProgress - 用户进度
// ============================================================

/// 用户进度
///
/// 生命周期内累计，不随计划重新生成而重置。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    /// 累计经验值（只增不减）
    pub xp: u64,
    /// 当前等级 (>= 1)
    pub level: u32,
    /// 连续完成次数，每完成一个任务 +1，与日历天数无关
    pub streak: u32,
    /// 累计完成任务数
    pub tasks_completed: u32,
    /// 已解锁成就
    #[serde(default)]
    pub achievements: BTreeSet<String>,
}

impl Default for UserProgress {
    fn default() -> Self {
        Self {
            xp: 0,
            level: 1,
            streak: 0,
            tasks_completed: 0,
            achievements: BTreeSet::new(),
        }
    }
}

impl UserProgress {
    /// 升到下一级所需的累计经验阈值
    pub fn xp_for_next_level(&self) -> u64 {
        u64::from(self.level.max(1)) * XP_LEVEL_FACTOR
    }

    /// 当前等级内的经验（xp mod level*100）
    pub fn xp_into_level(&self) -> u64 {
        self.xp % self.xp_for_next_level()
    }

    /// 增加经验并逐级检查升级，返回本次提升的级数
    ///
    /// 一次奖励可能跨越多个阈值，必须循环逐级推进。
    pub fn award_xp(&mut self, amount: u64) -> u32 {
        self.xp = self.xp.saturating_add(amount);
        self.level = self.level.max(1);

        let mut gained = 0;
        while self.xp >= self.xp_for_next_level() && self.level < u32::MAX {
            self.level += 1;
            gained += 1;
        }
        gained
    }

    /// 记录一次任务完成：完成数 +1、连续次数 +1、奖励经验
    pub fn record_completion(&mut self) -> u32 {
        self.tasks_completed = self.tasks_completed.saturating_add(1);
        self.streak = self.streak.saturating_add(1);
        self.award_xp(XP_PER_TASK)
    }

    /// 合并部分字段（不是整体替换）
    pub fn apply_patch(&mut self, patch: &ProgressPatch) {
        if let Some(xp) = patch.xp {
            self.xp = xp;
        }
        if let Some(level) = patch.level {
            self.level = level;
        }
        if let Some(streak) = patch.streak {
            self.streak = streak;
        }
        if let Some(tasks_completed) = patch.tasks_completed {
            self.tasks_completed = tasks_completed;
        }
        if let Some(achievements) = &patch.achievements {
            self.achievements = achievements.clone();
        }
    }
}

/// 用户进度的部分更新
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streak: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks_completed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievements: Option<BTreeSet<String>>,
}

impl ProgressPatch {
    pub fn is_empty(&self) -> bool {
        self.xp.is_none()
            && self.level.is_none()
            && self.streak.is_none()
            && self.tasks_completed.is_none()
            && self.achievements.is_none()
    }
}

// ============================================================
// CompletionRecord - 任务完成记录
// ============================================================

/// 任务完成记录
///
/// 与任务完成在同一事务中追加写入，替换计划不会清除。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    /// 记录 ID (UUID)
    pub id: String,
    pub task_id: String,
    pub topic: String,
    pub kind: TaskKind,
    /// 本次奖励的经验值
    pub xp_awarded: u64,
    /// 完成后的等级
    pub level_after: u32,
    pub completed_at: DateTime<Utc>,
}

impl CompletionRecord {
    pub fn new(task: &StudyTask, xp_awarded: u64, level_after: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task.id.clone(),
            topic: task.topic.clone(),
            kind: task.kind,
            xp_awarded,
            level_after,
            completed_at: Utc::now(),
        }
    }
}

// ============================================================
// 测试
// ============================================================
