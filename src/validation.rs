//! 外部数据校验
//!
//! 大纲分析、薄弱主题识别、计划生成的结果都以松散 JSON 形式到达。
//! 这里把它们解析成强类型的值，或者明确拒绝；存储层在写入前也会再次校验。
//!
//! 只拒绝缺失或类型错误的必填字段，以及以下约束：
//! - `estimatedMinutes > 0`，`day >= 0`（由无符号类型保证）
//! - `mastery` 在 0-100 之间（允许小数）
//! - `startDate` 是 ISO-8601 日期或日期时间
//! - `level >= 1`
//!
//! 空字符串和 `durationDays == 0` 都是合法值。

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::{parse_plan_date, StudyPlan, StudyTask, Syllabus, Topic, UserProgress};

/// 校验错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("JSON 结构不符合约定: {0}")]
    Malformed(String),

    #[error("任务 {task_id} 的预计时长必须大于 0")]
    InvalidMinutes { task_id: String },

    #[error("主题 {topic} 的掌握度 {mastery} 超出 0-100 范围")]
    InvalidMastery { topic: String, mastery: f64 },

    #[error("无法解析的开始日期: {0}")]
    InvalidDate(String),

    #[error("用户进度非法: {0}")]
    InvalidProgress(String),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// 结构校验
pub trait Validate {
    fn validate(&self) -> ValidationResult<()>;
}

/// 掌握度必须是 0-100 之间的有限数
pub fn validate_mastery(topic: &str, mastery: f64) -> ValidationResult<()> {
    if !(0.0..=100.0).contains(&mastery) {
        return Err(ValidationError::InvalidMastery {
            topic: topic.to_string(),
            mastery,
        });
    }
    Ok(())
}

impl Validate for Topic {
    fn validate(&self) -> ValidationResult<()> {
        match self.mastery {
            Some(mastery) => validate_mastery(&self.name, mastery),
            None => Ok(()),
        }
    }
}

impl Validate for Syllabus {
    fn validate(&self) -> ValidationResult<()> {
        self.topics.iter().try_for_each(Validate::validate)
    }
}

impl Validate for StudyTask {
    fn validate(&self) -> ValidationResult<()> {
        if self.estimated_minutes == 0 {
            return Err(ValidationError::InvalidMinutes {
                task_id: self.id.clone(),
            });
        }
        Ok(())
    }
}

impl Validate for StudyPlan {
    fn validate(&self) -> ValidationResult<()> {
        if parse_plan_date(&self.start_date).is_none() {
            return Err(ValidationError::InvalidDate(self.start_date.clone()));
        }
        self.tasks.iter().try_for_each(Validate::validate)
    }
}

impl Validate for UserProgress {
    fn validate(&self) -> ValidationResult<()> {
        if self.level == 0 {
            return Err(ValidationError::InvalidProgress(
                "level 必须大于等于 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self) -> ValidationResult<()> {
        self.iter().try_for_each(Validate::validate)
    }
}

/// 解析并校验一个 JSON 文档
pub fn parse_document<T>(json: &str) -> ValidationResult<T>
where
    T: DeserializeOwned + Validate,
{
    let value: T =
        serde_json::from_str(json).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    value.validate()?;
    Ok(value)
}

/// 解析大纲分析结果
pub fn parse_syllabus(json: &str) -> ValidationResult<Syllabus> {
    parse_document(json)
}

/// 解析计划生成结果
pub fn parse_study_plan(json: &str) -> ValidationResult<StudyPlan> {
    parse_document(json)
}

/// 解析薄弱主题识别结果
pub fn parse_topics(json: &str) -> ValidationResult<Vec<Topic>> {
    parse_document(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskKind;

    const PLAN_JSON: &str = r#"{
        "startDate": "2026-02-01",
        "durationDays": 2,
        "tasks": [
            {"id": "t1", "day": 0, "description": "Read chapter 1", "topic": "Sorting",
             "type": "read", "isCompleted": false, "estimatedMinutes": 25},
            {"id": "t2", "day": 1, "description": "Practice quicksort", "topic": "Sorting",
             "type": "practice", "isCompleted": false, "estimatedMinutes": 40}
        ]
    }"#;

    #[test]
    fn test_parse_valid_plan() {
        let plan = parse_study_plan(PLAN_JSON).expect("plan should parse");
        assert_eq!(plan.duration_days, 2);
        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[1].kind, TaskKind::Practice);
    }

    #[test]
    fn test_missing_field_rejected() {
        let json = r#"{"startDate": "2026-02-01", "tasks": []}"#;
        let err = parse_study_plan(json).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)));
    }

    #[test]
    fn test_unknown_task_kind_rejected() {
        let json = PLAN_JSON.replace("\"practice\"", "\"quiz\"");
        assert!(matches!(
            parse_study_plan(&json),
            Err(ValidationError::Malformed(_))
        ));
    }

    #[test]
    fn test_zero_minutes_rejected() {
        let json = PLAN_JSON.replace("\"estimatedMinutes\": 25", "\"estimatedMinutes\": 0");
        assert_eq!(
            parse_study_plan(&json).unwrap_err(),
            ValidationError::InvalidMinutes {
                task_id: "t1".to_string()
            }
        );
    }

    #[test]
    fn test_negative_day_rejected() {
        let json = PLAN_JSON.replace("\"day\": 1", "\"day\": -1");
        assert!(parse_study_plan(&json).is_err());
    }

    #[test]
    fn test_bad_start_date_rejected() {
        let json = PLAN_JSON.replace("2026-02-01", "soon");
        assert_eq!(
            parse_study_plan(&json).unwrap_err(),
            ValidationError::InvalidDate("soon".to_string())
        );
    }

    #[test]
    fn test_zero_duration_accepted() {
        let json = PLAN_JSON.replace("\"durationDays\": 2", "\"durationDays\": 0");
        let plan = parse_study_plan(&json).expect("zero duration is a valid integer");
        assert_eq!(plan.duration_days, 0);
    }

    #[test]
    fn test_iso_start_date_variants_accepted() {
        for date in ["2026-W05-7", "2026-032", "20260201", "2026-02-01T00:00:00"] {
            let json = PLAN_JSON.replace("2026-02-01", date);
            let plan = parse_study_plan(&json).unwrap_or_else(|e| panic!("{date}: {e}"));
            assert_eq!(plan.start_date, date);
        }
    }

    #[test]
    fn test_empty_task_id_accepted() {
        let json = PLAN_JSON.replace("\"id\": \"t1\"", "\"id\": \"\"");
        assert_eq!(parse_study_plan(&json).unwrap().tasks[0].id, "");
    }

    #[test]
    fn test_parse_syllabus() {
        let json = r#"{"courseName": "Algorithms", "topics": [
            {"name": "Graphs", "subTopics": ["BFS", "DFS"]},
            {"name": "DP", "subTopics": [], "mastery": 40}
        ]}"#;
        let syllabus = parse_syllabus(json).expect("syllabus should parse");
        assert_eq!(syllabus.topics.len(), 2);
        assert_eq!(syllabus.topics[0].mastery, None);
        assert_eq!(syllabus.topics[1].mastery, Some(40.0));
    }

    #[test]
    fn test_empty_names_accepted() {
        let json = r#"{"courseName": "", "topics": [{"name": "", "subTopics": []}]}"#;
        let syllabus = parse_syllabus(json).expect("empty strings are valid");
        assert_eq!(syllabus.course_name, "");
        assert_eq!(syllabus.topics[0].name, "");
    }

    #[test]
    fn test_fractional_mastery_accepted() {
        let json = r#"{"courseName": "Algorithms", "topics": [
            {"name": "Graphs", "subTopics": [], "mastery": 72.5},
            {"name": "Heaps", "subTopics": [], "mastery": 100}
        ]}"#;
        let syllabus = parse_syllabus(json).expect("fractional mastery is valid");
        assert_eq!(syllabus.topics[0].mastery, Some(72.5));
        assert_eq!(syllabus.topics[1].mastery, Some(100.0));
    }

    #[test]
    fn test_mastery_out_of_range_rejected() {
        for mastery in ["140", "100.5", "-1"] {
            let json = format!(
                r#"{{"courseName": "Algorithms", "topics": [
                    {{"name": "Graphs", "subTopics": [], "mastery": {mastery}}}
                ]}}"#
            );
            assert!(
                matches!(
                    parse_syllabus(&json),
                    Err(ValidationError::InvalidMastery { .. })
                ),
                "{mastery}"
            );
        }
        assert!(validate_mastery("Graphs", f64::NAN).is_err());
    }

    #[test]
    fn test_parse_weak_topics() {
        let json = r#"[{"name": "Recursion", "subTopics": ["base cases"]}]"#;
        let topics = parse_topics(json).expect("topics should parse");
        assert_eq!(topics[0].name, "Recursion");
    }

    #[test]
    fn test_progress_level_zero_rejected() {
        let json = r#"{"xp": 0, "level": 0, "streak": 0, "tasksCompleted": 0}"#;
        assert!(matches!(
            parse_document::<UserProgress>(json),
            Err(ValidationError::InvalidProgress(_))
        ));
    }
}
