//! 成就规则
//!
//! 每次完成任务后用新的用户进度评估规则表，满足条件且尚未获得的成就被加入
//! `achievements`。成就一经获得不会被引擎移除。

use serde::{Deserialize, Serialize};

use crate::models::UserProgress;

/// 成就条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AchievementCondition {
    TasksCompleted(u32),
    Streak(u32),
    Level(u32),
}

impl AchievementCondition {
    pub fn current_value(&self, progress: &UserProgress) -> u32 {
        match self {
            Self::TasksCompleted(_) => progress.tasks_completed,
            Self::Streak(_) => progress.streak,
            Self::Level(_) => progress.level,
        }
    }

    pub fn target_value(&self) -> u32 {
        match self {
            Self::TasksCompleted(v) | Self::Streak(v) | Self::Level(v) => *v,
        }
    }

    pub fn is_met(&self, progress: &UserProgress) -> bool {
        self.current_value(progress) >= self.target_value()
    }
}

/// 成就规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AchievementRule {
    pub id: &'static str,
    pub condition: AchievementCondition,
}

pub const ACHIEVEMENT_RULES: &[AchievementRule] = &[
    AchievementRule {
        id: "first-task",
        condition: AchievementCondition::TasksCompleted(1),
    },
    AchievementRule {
        id: "tasks-10",
        condition: AchievementCondition::TasksCompleted(10),
    },
    AchievementRule {
        id: "tasks-50",
        condition: AchievementCondition::TasksCompleted(50),
    },
    AchievementRule {
        id: "tasks-100",
        condition: AchievementCondition::TasksCompleted(100),
    },
    AchievementRule {
        id: "streak-7",
        condition: AchievementCondition::Streak(7),
    },
    AchievementRule {
        id: "streak-30",
        condition: AchievementCondition::Streak(30),
    },
    AchievementRule {
        id: "level-5",
        condition: AchievementCondition::Level(5),
    },
    AchievementRule {
        id: "level-10",
        condition: AchievementCondition::Level(10),
    },
];

/// 成就进度（用于展示）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementProgress {
    pub id: String,
    pub unlocked: bool,
    pub current_value: u32,
    pub target_value: u32,
    pub percentage: f64,
}

/// 满足条件但尚未获得的成就
pub fn newly_unlocked(progress: &UserProgress) -> Vec<&'static str> {
    ACHIEVEMENT_RULES
        .iter()
        .filter(|rule| !progress.achievements.contains(rule.id) && rule.condition.is_met(progress))
        .map(|rule| rule.id)
        .collect()
}

/// 把新满足的成就写入进度，返回本次解锁的成就
pub fn unlock_achievements(progress: &mut UserProgress) -> Vec<String> {
    let unlocked: Vec<String> = newly_unlocked(progress)
        .into_iter()
        .map(str::to_string)
        .collect();
    progress.achievements.extend(unlocked.iter().cloned());
    unlocked
}

/// 全部成就的当前进度
pub fn achievement_progress(progress: &UserProgress) -> Vec<AchievementProgress> {
    ACHIEVEMENT_RULES
        .iter()
        .map(|rule| {
            let current_value = rule.condition.current_value(progress);
            let target_value = rule.condition.target_value();
            let percentage = if target_value == 0 {
                100.0
            } else {
                (f64::from(current_value) / f64::from(target_value) * 100.0).min(100.0)
            };
            AchievementProgress {
                id: rule.id.to_string(),
                unlocked: progress.achievements.contains(rule.id),
                current_value,
                target_value,
                percentage,
            }
        })
        .collect()
}
