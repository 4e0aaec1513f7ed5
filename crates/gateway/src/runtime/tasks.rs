//! Task service — CRUD, lifecycle transitions, workflow submission, and
//! the cancel/pause/resume signal entry points.
//!
//! The task row is mutated only here: the workflow reports progress
//! through the service's update path and never writes rows directly.
//! Tasks are kept in a bounded in-memory map mirrored to a JSONL file so
//! snapshots survive restarts.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Semaphore;
use uuid::Uuid;

use ah_domain::config::{AgentDefinition, WorkflowConfig};
use ah_domain::error::{Error, Result};
use ah_domain::task::{Task, TaskError, TaskResult, TaskStatus, UserContext};

use super::activities::Activities;
use super::events::EventPublisher;
use super::signals::SignalHub;
use super::workflow::{self, ExecutionRequest};

const MAX_TASKS_IN_MEMORY: usize = 2000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-memory task rows with a JSONL mirror (latest row per task wins on
/// reload).
pub struct TaskStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
    log_path: Option<PathBuf>,
}

impl TaskStore {
    pub fn new(state_path: &Path) -> Self {
        let dir = state_path.join("tasks");
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(path = %dir.display(), error = %e, "failed to create task store dir");
        }
        let log_path = dir.join("tasks.jsonl");

        let mut tasks: HashMap<Uuid, Task> = HashMap::new();
        if let Ok(content) = std::fs::read_to_string(&log_path) {
            for line in content.lines() {
                match serde_json::from_str::<Task>(line) {
                    Ok(task) => {
                        tasks.insert(task.id, task);
                    }
                    Err(e) => tracing::warn!(error = %e, "skipping unparseable task log line"),
                }
            }
        }

        // Bound the reload: keep only the most recently updated rows.
        if tasks.len() > MAX_TASKS_IN_MEMORY {
            let mut rows: Vec<Task> = tasks.into_values().collect();
            rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            rows.truncate(MAX_TASKS_IN_MEMORY);
            tasks = rows.into_iter().map(|t| (t.id, t)).collect();
        }

        Self {
            tasks: RwLock::new(tasks),
            log_path: Some(log_path),
        }
    }

    /// In-memory only (tests).
    pub fn ephemeral() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            log_path: None,
        }
    }

    pub fn insert(&self, task: Task) {
        self.tasks.write().insert(task.id, task);
    }

    pub fn get(&self, task_id: &Uuid) -> Option<Task> {
        self.tasks.read().get(task_id).cloned()
    }

    /// Update a task in-place. Returns the updated row if found.
    pub fn update<F>(&self, task_id: &Uuid, f: F) -> Option<Task>
    where
        F: FnOnce(&mut Task),
    {
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(task_id)?;
        f(task);
        Some(task.clone())
    }

    /// List tasks in a workspace, newest first, with optional filters.
    pub fn list(
        &self,
        workspace_id: &str,
        status: Option<TaskStatus>,
        agent_id: Option<Uuid>,
        limit: usize,
        offset: usize,
    ) -> (Vec<Task>, usize) {
        let tasks = self.tasks.read();

        let filter = |t: &&Task| -> bool {
            if t.workspace_id != workspace_id {
                return false;
            }
            if let Some(s) = status {
                if t.status != s {
                    return false;
                }
            }
            if let Some(aid) = agent_id {
                if t.agent_id != aid {
                    return false;
                }
            }
            true
        };

        let mut matching: Vec<&Task> = tasks.values().filter(filter).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        (page, total)
    }

    /// Append the row to the JSONL mirror.
    pub fn persist(&self, task: &Task) {
        let Some(path) = &self.log_path else { return };
        if let Ok(line) = serde_json::to_string(task) {
            match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(mut file) => {
                    if let Err(e) = writeln!(file, "{line}") {
                        tracing::warn!(error = %e, "failed to append task to JSONL");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to open task JSONL for append"),
            }
        }
    }

    /// Remove terminal tasks older than the TTL; returns the evicted ids.
    pub fn evict_terminal(&self, older_than: chrono::Duration) -> Vec<Uuid> {
        let cutoff = Utc::now() - older_than;
        let mut tasks = self.tasks.write();
        let evicted: Vec<Uuid> = tasks
            .values()
            .filter(|t| {
                t.status.is_terminal() && t.completed_at.map_or(false, |ts| ts < cutoff)
            })
            .map(|t| t.id)
            .collect();
        for id in &evicted {
            tasks.remove(id);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TaskService {
    store: Arc<TaskStore>,
    publisher: Arc<EventPublisher>,
    signals: Arc<SignalHub>,
    activities: Arc<dyn Activities>,
    config: WorkflowConfig,
    /// Per-workspace workflow concurrency clamps.
    workspace_slots: RwLock<HashMap<String, Arc<Semaphore>>>,
}

impl TaskService {
    pub fn new(
        store: Arc<TaskStore>,
        publisher: Arc<EventPublisher>,
        signals: Arc<SignalHub>,
        activities: Arc<dyn Activities>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            signals,
            activities,
            config,
            workspace_slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn publisher(&self) -> &Arc<EventPublisher> {
        &self.publisher
    }

    pub fn signals(&self) -> &Arc<SignalHub> {
        &self.signals
    }

    pub(crate) fn activities(&self) -> &Arc<dyn Activities> {
        &self.activities
    }

    /// The concurrency semaphore for a workspace (created on first use).
    pub(crate) fn workspace_semaphore(&self, workspace_id: &str) -> Arc<Semaphore> {
        {
            let slots = self.workspace_slots.read();
            if let Some(sem) = slots.get(workspace_id) {
                return sem.clone();
            }
        }
        let permits = self.config.max_concurrent_per_workspace.clamp(1, 50);
        self.workspace_slots
            .write()
            .entry(workspace_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(permits)))
            .clone()
    }

    // ── Submission ─────────────────────────────────────────────────

    /// Create the task row, publish `TaskCreated`, and start the workflow.
    pub fn submit(
        self: Arc<Self>,
        agent: &AgentDefinition,
        user: &UserContext,
        query: String,
        parameters: Value,
        budget_usd: Option<f64>,
    ) -> Result<Task> {
        if query.trim().is_empty() {
            return Err(Error::Other("task query must not be empty".into()));
        }

        let task = Task::new(
            agent.id,
            &user.user_id,
            &user.workspace_id,
            query,
            parameters,
            budget_usd.unwrap_or(agent.default_budget_usd),
        );
        let task_id = task.id;

        self.store.insert(task.clone());
        self.store.persist(&task);
        self.publisher.task_created(&task);

        let request = ExecutionRequest {
            task_id,
            agent_id: agent.id,
            user: user.clone(),
            task_query: task.query.clone(),
            parameters: task.parameters.clone(),
            budget_usd: task.budget_usd,
        };
        let execution_id = workflow::spawn(self.clone(), request);

        tracing::info!(
            %task_id,
            agent_id = %agent.id,
            %execution_id,
            workspace_id = %user.workspace_id,
            "task submitted"
        );

        // Snapshot may already reflect the running transition.
        Ok(self.store.get(&task_id).unwrap_or(task))
    }

    // ── Reads (workspace-scoped) ───────────────────────────────────

    pub fn get(&self, task_id: &Uuid, user: &UserContext) -> Result<Task> {
        self.store
            .get(task_id)
            .filter(|t| t.workspace_id == user.workspace_id)
            .ok_or(Error::TaskNotFound(*task_id))
    }

    pub fn list(
        &self,
        user: &UserContext,
        status: Option<TaskStatus>,
        agent_id: Option<Uuid>,
        limit: usize,
        offset: usize,
    ) -> (Vec<Task>, usize) {
        self.store
            .list(&user.workspace_id, status, agent_id, limit, offset)
    }

    // ── Signals ────────────────────────────────────────────────────

    /// Request cancellation. The workflow exits at its next check; the
    /// returned snapshot may still show the task running.
    pub fn cancel(&self, task_id: &Uuid, user: &UserContext) -> Result<Task> {
        let task = self.get(task_id, user)?;
        if task.status.is_terminal() {
            return Ok(task);
        }
        if !self.signals.cancel(task_id) {
            tracing::warn!(%task_id, "cancel requested but no active workflow signals");
        }
        Ok(task)
    }

    pub fn pause(&self, task_id: &Uuid, user: &UserContext) -> Result<Task> {
        let task = self.get(task_id, user)?;
        if task.status != TaskStatus::Running {
            return Err(Error::InvalidTransition {
                from: task.status.as_str().into(),
                to: TaskStatus::Paused.as_str().into(),
            });
        }
        self.signals.pause(task_id);
        Ok(task)
    }

    pub fn resume(&self, task_id: &Uuid, user: &UserContext) -> Result<Task> {
        let task = self.get(task_id, user)?;
        if task.status != TaskStatus::Paused {
            return Err(Error::InvalidTransition {
                from: task.status.as_str().into(),
                to: TaskStatus::Running.as_str().into(),
            });
        }
        self.signals.resume(task_id);
        Ok(task)
    }

    // ── Workflow update path ───────────────────────────────────────

    pub(crate) fn mark_running(&self, task_id: &Uuid, execution_id: Uuid) {
        self.apply_transition(task_id, TaskStatus::Running, |task| {
            task.execution_id = Some(execution_id);
        });
    }

    pub(crate) fn mark_paused(&self, task_id: &Uuid) {
        self.apply_transition(task_id, TaskStatus::Paused, |_| {});
    }

    pub(crate) fn mark_resumed(&self, task_id: &Uuid) {
        self.apply_transition(task_id, TaskStatus::Running, |_| {});
    }

    /// Keep the row's accrued cost current (non-decreasing).
    pub(crate) fn record_cost(&self, task_id: &Uuid, accrued_usd: f64) {
        self.store.update(task_id, |task| {
            if accrued_usd > task.cost_accrued {
                task.cost_accrued = accrued_usd;
                task.updated_at = Utc::now();
            }
        });
    }

    pub(crate) fn finish_completed(
        &self,
        task_id: &Uuid,
        final_response: Option<String>,
        total_cost: f64,
    ) {
        self.finish(task_id, TaskStatus::Completed, total_cost, |task| {
            task.result = final_response.map(TaskResult::text);
        });
    }

    pub(crate) fn finish_failed(
        &self,
        task_id: &Uuid,
        error_kind: &str,
        message: &str,
        final_response: Option<String>,
        total_cost: f64,
    ) {
        let error = TaskError {
            error_kind: error_kind.to_string(),
            message: message.to_string(),
        };
        self.finish(task_id, TaskStatus::Failed, total_cost, |task| {
            task.result = final_response.map(TaskResult::text);
            task.error = Some(error);
        });
    }

    pub(crate) fn finish_cancelled(
        &self,
        task_id: &Uuid,
        partial_response: Option<String>,
        total_cost: f64,
    ) {
        self.finish(task_id, TaskStatus::Cancelled, total_cost, |task| {
            task.result = partial_response.map(TaskResult::text);
        });
    }

    fn finish<F>(&self, task_id: &Uuid, status: TaskStatus, total_cost: f64, fill: F)
    where
        F: FnOnce(&mut Task),
    {
        let updated = self.apply_transition(task_id, status, |task| {
            if total_cost > task.cost_accrued {
                task.cost_accrued = total_cost;
            }
            fill(task);
        });
        if let Some(task) = updated {
            self.store.persist(&task);
        }
    }

    fn apply_transition<F>(&self, task_id: &Uuid, to: TaskStatus, fill: F) -> Option<Task>
    where
        F: FnOnce(&mut Task),
    {
        let mut transitioned = false;
        let updated = self.store.update(task_id, |task| {
            match task.transition(to) {
                Ok(()) => {
                    fill(task);
                    transitioned = true;
                }
                Err(e) => {
                    tracing::warn!(%task_id, error = %e, "rejected task transition");
                }
            }
        });
        if transitioned {
            updated
        } else {
            None
        }
    }

    // ── Maintenance ────────────────────────────────────────────────

    /// Evict terminal tasks past the TTL, and their in-memory events.
    pub fn evict_terminal(&self) {
        let ttl = chrono::Duration::seconds(self.config.terminal_task_ttl_secs as i64);
        let evicted = self.store.evict_terminal(ttl);
        if !evicted.is_empty() {
            self.publisher.log().evict(&evicted);
            tracing::debug!(count = evicted.len(), "evicted terminal tasks");
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_task(workspace: &str) -> Task {
        Task::new(Uuid::new_v4(), "u1", workspace, "query", json!({}), 1.0)
    }

    #[test]
    fn store_insert_get_update() {
        let store = TaskStore::ephemeral();
        let task = make_task("ws1");
        let id = task.id;
        store.insert(task);

        assert!(store.get(&id).is_some());
        let updated = store.update(&id, |t| t.cost_accrued = 0.5).unwrap();
        assert_eq!(updated.cost_accrued, 0.5);
        assert!(store.update(&Uuid::new_v4(), |_| {}).is_none());
    }

    #[test]
    fn store_list_scopes_by_workspace() {
        let store = TaskStore::ephemeral();
        store.insert(make_task("alpha"));
        store.insert(make_task("alpha"));
        store.insert(make_task("beta"));

        let (page, total) = store.list("alpha", None, None, 50, 0);
        assert_eq!(total, 2);
        assert!(page.iter().all(|t| t.workspace_id == "alpha"));

        let (_, beta_total) = store.list("beta", None, None, 50, 0);
        assert_eq!(beta_total, 1);
    }

    #[test]
    fn store_list_filters_and_paginates() {
        let store = TaskStore::ephemeral();
        let agent = Uuid::new_v4();
        for i in 0..5 {
            let mut task = make_task("ws");
            if i < 2 {
                task.agent_id = agent;
            }
            store.insert(task);
        }

        let (page, total) = store.list("ws", None, Some(agent), 50, 0);
        assert_eq!(total, 2);
        assert_eq!(page.len(), 2);

        let (page, total) = store.list("ws", None, None, 2, 4);
        assert_eq!(total, 5);
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn store_persistence_latest_row_wins() {
        let dir = tempfile::tempdir().unwrap();
        let task = make_task("ws1");
        let id = task.id;

        {
            let store = TaskStore::new(dir.path());
            store.insert(task.clone());
            store.persist(&task);

            let mut finished = task.clone();
            finished.transition(TaskStatus::Running).unwrap();
            finished.transition(TaskStatus::Completed).unwrap();
            store.persist(&finished);
        }

        let reloaded = TaskStore::new(dir.path());
        let row = reloaded.get(&id).unwrap();
        assert_eq!(row.status, TaskStatus::Completed);
    }

    #[test]
    fn store_evicts_only_old_terminal_tasks() {
        let store = TaskStore::ephemeral();

        let mut old_done = make_task("ws");
        old_done.transition(TaskStatus::Running).unwrap();
        old_done.transition(TaskStatus::Completed).unwrap();
        old_done.completed_at = Some(Utc::now() - chrono::Duration::hours(2));
        let old_id = old_done.id;
        store.insert(old_done);

        let mut fresh_done = make_task("ws");
        fresh_done.transition(TaskStatus::Running).unwrap();
        fresh_done.transition(TaskStatus::Completed).unwrap();
        store.insert(fresh_done);

        let running = make_task("ws");
        store.insert(running);

        let evicted = store.evict_terminal(chrono::Duration::hours(1));
        assert_eq!(evicted, vec![old_id]);
        assert_eq!(store.len(), 2);
    }
}
