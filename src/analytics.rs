//! 学习统计（只读派生数据）
//!
//! 计划完成度、经验条、按日历计算的连续学习天数。这些值都从现有状态
//! 即时计算，不会被持久化。

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{CompletionRecord, StudyPlan, UserProgress};

/// 任务计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCounts {
    pub total: u32,
    pub completed: u32,
}

impl TaskCounts {
    fn add(&mut self, completed: bool) {
        self.total += 1;
        if completed {
            self.completed += 1;
        }
    }
}

/// 计划统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    /// 总任务数
    pub total_tasks: u32,
    /// 已完成任务数
    pub completed_tasks: u32,
    /// 完成率 (0-1)
    pub completion_rate: f64,
    /// 预计总时长 (分钟)
    pub total_minutes: u64,
    /// 已完成任务的预计时长
    pub completed_minutes: u64,
    /// 剩余任务的预计时长
    pub remaining_minutes: u64,
    /// 按任务类型统计
    pub by_kind: BTreeMap<String, TaskCounts>,
    /// 按主题统计
    pub by_topic: BTreeMap<String, TaskCounts>,
}

pub fn summarize_plan(plan: &StudyPlan) -> PlanSummary {
    let mut summary = PlanSummary::default();

    for task in &plan.tasks {
        let minutes = u64::from(task.estimated_minutes);
        summary.total_tasks += 1;
        summary.total_minutes += minutes;
        if task.is_completed {
            summary.completed_tasks += 1;
            summary.completed_minutes += minutes;
        }

        summary
            .by_kind
            .entry(task.kind.as_str().to_string())
            .or_default()
            .add(task.is_completed);
        summary
            .by_topic
            .entry(task.topic.clone())
            .or_default()
            .add(task.is_completed);
    }

    summary.remaining_minutes = summary.total_minutes - summary.completed_minutes;
    summary.completion_rate = if summary.total_tasks == 0 {
        0.0
    } else {
        f64::from(summary.completed_tasks) / f64::from(summary.total_tasks)
    };

    summary
}

/// 经验条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpBar {
    pub level: u32,
    pub xp: u64,
    /// 当前等级内的经验 (xp mod level*100)
    pub xp_into_level: u64,
    /// 升级阈值 (level*100)
    pub xp_for_next_level: u64,
    /// 百分比 (0-100)
    pub percentage: f64,
}

pub fn xp_bar(progress: &UserProgress) -> XpBar {
    let xp_into_level = progress.xp_into_level();
    let xp_for_next_level = progress.xp_for_next_level();
    XpBar {
        level: progress.level,
        xp: progress.xp,
        xp_into_level,
        xp_for_next_level,
        percentage: xp_into_level as f64 / xp_for_next_level as f64 * 100.0,
    }
}

/// 按日历计算的连续学习天数
///
/// 从今天（今天没有完成记录时从昨天）往前数，统计每天至少完成一个任务的
/// 连续天数。与 `UserProgress::streak` 的按次计数互相独立。
pub fn calendar_streak(records: &[CompletionRecord], today: NaiveDate) -> u32 {
    let days: BTreeSet<NaiveDate> = records
        .iter()
        .map(|r| r.completed_at.date_naive())
        .collect();

    let mut cursor = if days.contains(&today) {
        today
    } else {
        match today.pred_opt() {
            Some(yesterday) if days.contains(&yesterday) => yesterday,
            _ => return 0,
        }
    };

    let mut streak = 0;
    loop {
        streak += 1;
        match cursor.pred_opt() {
            Some(prev) if days.contains(&prev) => cursor = prev,
            _ => break,
        }
    }
    streak
}

/// 每日完成数（按完成日期分组）
pub fn completions_per_day(records: &[CompletionRecord]) -> BTreeMap<NaiveDate, u32> {
    let mut per_day = BTreeMap::new();
    for record in records {
        *per_day.entry(record.completed_at.date_naive()).or_insert(0) += 1;
    }
    per_day
}
