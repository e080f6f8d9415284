//! 集成测试共享的测试数据

#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;

use xenia_progress::models::{StudyPlan, StudyTask, Syllabus, TaskKind, Topic};
use xenia_progress::repository::SqliteProgressRepository;
use xenia_progress::storage::Storage;

pub fn sample_syllabus() -> Syllabus {
    Syllabus {
        course_name: "Operating Systems".to_string(),
        topics: vec![
            Topic::new("Scheduling", vec!["Round robin".to_string(), "CFS".to_string()]),
            Topic::new("Virtual Memory", vec!["Paging".to_string()]),
            Topic::new("File Systems", vec![]),
        ],
    }
}

pub fn sample_task(id: &str, day: u32, kind: TaskKind) -> StudyTask {
    StudyTask {
        id: id.to_string(),
        day,
        description: format!("Study session {id}"),
        topic: "Scheduling".to_string(),
        kind,
        is_completed: false,
        estimated_minutes: 25,
    }
}

pub fn sample_plan(task_count: usize) -> StudyPlan {
    let kinds = [TaskKind::Read, TaskKind::Practice, TaskKind::Review];
    StudyPlan {
        start_date: "2026-10-01T08:00:00Z".to_string(),
        duration_days: 14,
        tasks: (0..task_count)
            .map(|i| sample_task(&format!("task-{i}"), (i % 14) as u32, kinds[i % 3]))
            .collect(),
    }
}

/// 临时目录中的数据库，`TempDir` 被丢弃时文件一并删除
pub struct TestDb {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("progress").join("xenia.db");
        Self { dir, path }
    }

    pub fn storage(&self) -> Storage {
        Storage::new(&self.path).expect("failed to open storage")
    }

    pub fn repository(&self) -> SqliteProgressRepository {
        SqliteProgressRepository::with_default_prefix(self.storage())
    }
}
