//! 学习进度存储（Progress Store）
//!
//! 大纲、学习计划、用户进度以及界面临时状态的唯一数据源：
//! - 启动时从持久化存储恢复，三个键各自独立，一个损坏不影响其他两个
//! - 每次变更先写持久化存储，写入成功后才提交到内存并通知订阅者
//! - 写入失败时内存状态保持不变，只设置可重试的错误提示
//! - 任务完成时计划、进度与完成记录在同一次写入中提交
//!
//! 存储本身不做任何网络请求；大纲分析和计划生成的结果由调用方拿到后
//! 通过 `set_syllabus` / `set_study_plan` 交给存储。

use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tokio::sync::watch;

use crate::achievements::{self, AchievementProgress};
use crate::analytics::{self, PlanSummary, XpBar};
use crate::error::{StoreError, StoreResult};
use crate::models::{CompletionRecord, ProgressPatch, StudyPlan, StudyTask, Syllabus, UserProgress};
use crate::repository::ProgressRepository;
use crate::storage::StorageResult;
use crate::validation::{validate_mastery, Validate};

// ============================================================
// 状态与结果类型
// ============================================================

/// 存储状态快照
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    pub syllabus: Option<Syllabus>,
    pub study_plan: Option<StudyPlan>,
    pub user_progress: UserProgress,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// 单个键的恢复结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydrationStatus {
    /// 成功读取
    Loaded,
    /// 键不存在（从未写入）
    Missing,
    /// 内容损坏或读取失败，已回退到默认值
    Recovered(String),
}

/// `initialize` 的恢复报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydrationReport {
    pub syllabus: HydrationStatus,
    pub study_plan: HydrationStatus,
    pub user_progress: HydrationStatus,
}

impl HydrationReport {
    /// 是否没有任何键需要回退
    pub fn is_clean(&self) -> bool {
        ![&self.syllabus, &self.study_plan, &self.user_progress]
            .iter()
            .any(|s| matches!(s, HydrationStatus::Recovered(_)))
    }
}

/// 一次成功完成任务的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub task_id: String,
    pub xp_awarded: u64,
    pub levels_gained: u32,
    pub level: u32,
    pub xp: u64,
    pub unlocked_achievements: Vec<String>,
}

/// `complete_task` 的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CompletionOutcome {
    /// 任务被标记完成并发放奖励
    Completed(CompletionReport),
    /// 任务此前已完成，未做任何修改
    AlreadyCompleted,
    /// 当前计划中没有该任务，未做任何修改
    UnknownTask,
}

impl CompletionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CompletionOutcome::Completed(_))
    }
}

fn hydrate<T>(key: &'static str, result: StorageResult<Option<T>>) -> (Option<T>, HydrationStatus) {
    match result {
        Ok(Some(value)) => (Some(value), HydrationStatus::Loaded),
        Ok(None) => (None, HydrationStatus::Missing),
        Err(e) => {
            tracing::warn!(key, error = %e, "持久化数据无法恢复，使用默认值");
            (None, HydrationStatus::Recovered(e.to_string()))
        }
    }
}

// ============================================================
// ProgressStore
// ============================================================

/// 学习进度存储
pub struct ProgressStore<R: ProgressRepository> {
    repo: R,
    state: StoreState,
    notifier: watch::Sender<StoreState>,
}

impl<R: ProgressRepository> ProgressStore<R> {
    /// 创建空的存储（尚未从持久化存储恢复）
    pub fn new(repo: R) -> Self {
        let state = StoreState::default();
        let (notifier, _) = watch::channel(state.clone());
        Self {
            repo,
            state,
            notifier,
        }
    }

    /// 创建存储并立即恢复持久化数据
    pub fn open(repo: R) -> Self {
        let mut store = Self::new(repo);
        store.initialize();
        store
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    // ========== 初始化 ==========

    /// 从持久化存储恢复状态
    ///
    /// 不会返回错误：缺失或损坏的键对应的实体回退到默认值并记录日志。
    pub fn initialize(&mut self) -> HydrationReport {
        self.state.is_loading = true;
        self.notify();

        let (syllabus, syllabus_status) = hydrate("syllabus", self.repo.load_syllabus());
        let (study_plan, plan_status) = hydrate("studyPlan", self.repo.load_study_plan());
        let (user_progress, progress_status) =
            hydrate("userProgress", self.repo.load_user_progress());

        self.state.syllabus = syllabus;
        self.state.study_plan = study_plan;
        self.state.user_progress = user_progress.unwrap_or_default();
        self.state.is_loading = false;
        self.notify();

        let report = HydrationReport {
            syllabus: syllabus_status,
            study_plan: plan_status,
            user_progress: progress_status,
        };

        tracing::info!(
            syllabus = ?report.syllabus,
            study_plan = ?report.study_plan,
            user_progress = ?report.user_progress,
            "进度存储初始化完成"
        );

        report
    }

    // ========== 变更操作 ==========

    /// 整体替换大纲，`None` 表示清除
    pub fn set_syllabus(&mut self, syllabus: Option<Syllabus>) -> StoreResult<()> {
        if let Some(syllabus) = &syllabus {
            syllabus.validate()?;
        }

        let result = self.repo.save_syllabus(syllabus.as_ref());
        self.check_persisted("set_syllabus", result)?;

        self.state.syllabus = syllabus;
        self.commit();
        Ok(())
    }

    /// 整体替换学习计划，`None` 表示清除
    ///
    /// 旧计划中的任务及其完成状态随之丢弃，旧任务 ID 不再能被完成。
    pub fn set_study_plan(&mut self, plan: Option<StudyPlan>) -> StoreResult<()> {
        if let Some(plan) = &plan {
            plan.validate()?;
        }

        let result = self.repo.save_study_plan(plan.as_ref());
        self.check_persisted("set_study_plan", result)?;

        if let Some(plan) = &plan {
            tracing::info!(
                tasks = plan.tasks.len(),
                duration_days = plan.duration_days,
                "学习计划已替换"
            );
        }
        self.state.study_plan = plan;
        self.commit();
        Ok(())
    }

    /// 完成任务
    ///
    /// 任务不存在或已完成时不做任何修改并返回成功，重复调用不会重复发放经验。
    /// 否则标记完成、完成数 +1、经验 +10、连续次数 +1、逐级检查升级、评估成就，
    /// 计划与进度在同一次写入中持久化。
    pub fn complete_task(&mut self, task_id: &str) -> StoreResult<CompletionOutcome> {
        let Some(plan) = self.state.study_plan.as_ref() else {
            tracing::debug!(task_id, "当前没有学习计划，忽略完成请求");
            return Ok(CompletionOutcome::UnknownTask);
        };
        let Some(index) = plan.task_position(task_id) else {
            tracing::debug!(task_id, "任务不存在，忽略完成请求");
            return Ok(CompletionOutcome::UnknownTask);
        };
        if plan.tasks[index].is_completed {
            return Ok(CompletionOutcome::AlreadyCompleted);
        }

        let mut next_plan = plan.clone();
        next_plan.tasks[index].is_completed = true;

        let mut next_progress = self.state.user_progress.clone();
        let xp_before = next_progress.xp;
        let levels_gained = next_progress.record_completion();
        let unlocked_achievements = achievements::unlock_achievements(&mut next_progress);
        let xp_awarded = next_progress.xp - xp_before;

        let record = CompletionRecord::new(&next_plan.tasks[index], xp_awarded, next_progress.level);
        let result = self
            .repo
            .save_completion(&next_plan, &next_progress, &record);
        self.check_persisted("complete_task", result)?;

        let report = CompletionReport {
            task_id: task_id.to_string(),
            xp_awarded,
            levels_gained,
            level: next_progress.level,
            xp: next_progress.xp,
            unlocked_achievements,
        };

        self.state.study_plan = Some(next_plan);
        self.state.user_progress = next_progress;
        self.commit();

        tracing::info!(
            task_id,
            xp = report.xp,
            level = report.level,
            levels_gained,
            "任务完成"
        );
        if !report.unlocked_achievements.is_empty() {
            tracing::info!(achievements = ?report.unlocked_achievements, "解锁成就");
        }

        Ok(CompletionOutcome::Completed(report))
    }

    /// 合并更新用户进度（不是整体替换），用于重置连续次数等非任务完成的调整
    pub fn update_user_progress(&mut self, patch: ProgressPatch) -> StoreResult<UserProgress> {
        let mut next = self.state.user_progress.clone();
        next.apply_patch(&patch);
        next.validate()?;

        let result = self.repo.save_user_progress(&next);
        self.check_persisted("update_user_progress", result)?;

        self.state.user_progress = next.clone();
        self.commit();
        Ok(next)
    }

    /// 清除大纲与学习计划，保留用户进度与完成记录
    pub fn clear_session(&mut self) -> StoreResult<()> {
        let result = self.repo.clear_session();
        self.check_persisted("clear_session", result)?;

        self.state.syllabus = None;
        self.state.study_plan = None;
        self.commit();
        Ok(())
    }

    /// 更新同名主题的掌握度，返回是否有主题被更新
    pub fn update_topic_mastery(&mut self, topic_name: &str, mastery: f64) -> StoreResult<bool> {
        validate_mastery(topic_name, mastery)?;

        let Some(syllabus) = self.state.syllabus.as_ref() else {
            return Ok(false);
        };

        let mut next = syllabus.clone();
        let mut matched = false;
        for topic in next.topics.iter_mut().filter(|t| t.name == topic_name) {
            topic.mastery = Some(mastery);
            matched = true;
        }
        if !matched {
            return Ok(false);
        }

        let result = self.repo.save_syllabus(Some(&next));
        self.check_persisted("update_topic_mastery", result)?;

        self.state.syllabus = Some(next);
        self.commit();
        Ok(true)
    }

    // ========== 界面临时状态 ==========

    pub fn set_loading(&mut self, is_loading: bool) {
        self.state.is_loading = is_loading;
        self.notify();
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.state.error = error;
        self.notify();
    }

    pub fn clear_error(&mut self) {
        self.set_error(None);
    }

    // ========== 读取 ==========

    /// 当前状态的不可变快照
    pub fn snapshot(&self) -> StoreState {
        self.state.clone()
    }

    pub fn syllabus(&self) -> Option<&Syllabus> {
        self.state.syllabus.as_ref()
    }

    pub fn study_plan(&self) -> Option<&StudyPlan> {
        self.state.study_plan.as_ref()
    }

    pub fn user_progress(&self) -> &UserProgress {
        &self.state.user_progress
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    /// 订阅状态变化，每次提交后收到新的快照
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.notifier.subscribe()
    }

    /// 读取持久化的完成记录
    pub fn completion_history(&self) -> StoreResult<Vec<CompletionRecord>> {
        Ok(self.repo.load_completion_history()?)
    }

    /// `today` 当天的任务
    pub fn today_tasks(&self, today: NaiveDate) -> Vec<StudyTask> {
        self.state
            .study_plan
            .as_ref()
            .map(|plan| plan.today_tasks(today).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 计划第 `day` 天的任务
    pub fn tasks_for_day(&self, day: u32) -> Vec<StudyTask> {
        self.state
            .study_plan
            .as_ref()
            .map(|plan| plan.tasks_for_day(day).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn plan_summary(&self) -> Option<PlanSummary> {
        self.state.study_plan.as_ref().map(analytics::summarize_plan)
    }

    pub fn xp_bar(&self) -> XpBar {
        analytics::xp_bar(&self.state.user_progress)
    }

    pub fn achievement_progress(&self) -> Vec<AchievementProgress> {
        achievements::achievement_progress(&self.state.user_progress)
    }

    /// 按日历计算的连续学习天数
    pub fn calendar_streak(&self, today: NaiveDate) -> StoreResult<u32> {
        let history = self.completion_history()?;
        Ok(analytics::calendar_streak(&history, today))
    }

    // ========== 内部辅助 ==========

    /// 持久化失败时设置错误提示并返回错误，内存中的实体保持不变
    fn check_persisted(&mut self, operation: &'static str, result: StorageResult<()>) -> StoreResult<()> {
        if let Err(e) = result {
            tracing::error!(operation, error = %e, "持久化写入失败，内存状态保持不变");
            self.state.error = Some(format!("保存失败，请重试: {e}"));
            self.notify();
            return Err(StoreError::Persistence(e));
        }
        Ok(())
    }

    fn commit(&mut self) {
        self.state.error = None;
        self.notify();
    }

    fn notify(&self) {
        self.notifier.send_replace(self.state.clone());
    }
}

// ============================================================
// SharedProgressStore - 多线程共享包装
// ============================================================

/// 多线程环境下的共享句柄
///
/// 所有操作经由同一把锁串行执行，`complete_task` 与 `set_study_plan`
/// 不会交错。
pub struct SharedProgressStore<R: ProgressRepository> {
    inner: Arc<Mutex<ProgressStore<R>>>,
}

impl<R: ProgressRepository> Clone for SharedProgressStore<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: ProgressRepository> SharedProgressStore<R> {
    pub fn new(store: ProgressStore<R>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// 获取存储的锁，持有期间其他线程的操作会等待
    pub fn lock(&self) -> MutexGuard<'_, ProgressStore<R>> {
        self.inner.lock()
    }

    pub fn complete_task(&self, task_id: &str) -> StoreResult<CompletionOutcome> {
        self.inner.lock().complete_task(task_id)
    }

    pub fn set_study_plan(&self, plan: Option<StudyPlan>) -> StoreResult<()> {
        self.inner.lock().set_study_plan(plan)
    }

    pub fn snapshot(&self) -> StoreState {
        self.inner.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.inner.lock().subscribe()
    }
}

// ============================================================
// 测试
// ============================================================
