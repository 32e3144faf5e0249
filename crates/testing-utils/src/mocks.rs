//! In-memory implementations of the collaborator ports
//!
//! `InMemoryTaskStore` plays the role of the live task runtime plus the
//! decision table. Each unit of work operates on a snapshot of the store and
//! writes it back on commit, so rollback simply discards the snapshot.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use task_assigning_domain::{
    AssignmentDecision, FindTasksQuery, OrganizationalEntity, PersistenceContext, TaskData,
    TaskDataSummary, TaskLifecycleService, TaskQueryService, TaskStatus, UnitOfWork,
    UnitOfWorkFactory,
};
use task_assigning_errors::{TaskAssigningError, TaskAssigningResult};

#[derive(Debug, Clone, Default)]
struct StoreState {
    tasks: BTreeMap<i64, TaskData>,
    decisions: BTreeMap<i64, AssignmentDecision>,
}

impl StoreState {
    fn task_mut(&mut self, task_id: i64) -> TaskAssigningResult<&mut TaskData> {
        self.tasks
            .get_mut(&task_id)
            .ok_or_else(|| TaskAssigningError::task_not_found(task_id))
    }

    /// Task record joined with its decision, the way a query would return it
    fn joined(&self, task: &TaskData) -> TaskData {
        let mut task = task.clone();
        task.planning_task = self
            .decisions
            .get(&task.task_id)
            .map(AssignmentDecision::to_planning_task);
        task
    }
}

/// Counts every call made against the persistence and lifecycle ports
#[derive(Debug, Default)]
pub struct CallCounters {
    pub find: AtomicUsize,
    pub persist: AtomicUsize,
    pub merge: AtomicUsize,
    pub remove: AtomicUsize,
    pub delegate: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
}

impl CallCounters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// persist + merge + remove
    pub fn writes(&self) -> usize {
        Self::get(&self.persist) + Self::get(&self.merge) + Self::get(&self.remove)
    }
}

/// In-memory task runtime and decision table
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<Mutex<StoreState>>,
    calls: Arc<CallCounters>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<TaskData>) -> Self {
        let store = Self::new();
        for task in tasks {
            store.insert_task(task);
        }
        store
    }

    /// A `planning_task` on the given record is stored as a decision
    pub fn insert_task(&self, mut task: TaskData) {
        let mut state = self.state.lock().unwrap();
        if let Some(planning_task) = task.planning_task.take() {
            state.decisions.insert(
                task.task_id,
                AssignmentDecision::new(
                    task.task_id,
                    planning_task.assigned_user,
                    planning_task.index,
                    planning_task.published,
                ),
            );
        }
        state.tasks.insert(task.task_id, task);
    }

    pub fn insert_decision(&self, decision: AssignmentDecision) {
        let mut state = self.state.lock().unwrap();
        state.decisions.insert(decision.task_id, decision);
    }

    pub fn task(&self, task_id: i64) -> Option<TaskData> {
        let state = self.state.lock().unwrap();
        state.tasks.get(&task_id).map(|t| state.joined(t))
    }

    pub fn decision(&self, task_id: i64) -> Option<AssignmentDecision> {
        self.state.lock().unwrap().decisions.get(&task_id).cloned()
    }

    pub fn decision_count(&self) -> usize {
        self.state.lock().unwrap().decisions.len()
    }

    pub fn calls(&self) -> &CallCounters {
        &self.calls
    }

    /// Unit of work with a concrete type, for tests that call commands directly
    pub fn unit_of_work(&self) -> InMemoryUnitOfWork {
        let snapshot = self.state.lock().unwrap().clone();
        InMemoryUnitOfWork {
            working: Mutex::new(snapshot),
            store: Arc::clone(&self.state),
            calls: Arc::clone(&self.calls),
        }
    }
}

#[async_trait]
impl UnitOfWorkFactory for InMemoryTaskStore {
    async fn begin(&self) -> TaskAssigningResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(self.unit_of_work()))
    }
}

#[async_trait]
impl TaskQueryService for InMemoryTaskStore {
    async fn find_tasks(&self, query: &FindTasksQuery) -> TaskAssigningResult<Vec<TaskData>> {
        let state = self.state.lock().unwrap();
        let tasks = state
            .tasks
            .values()
            .filter(|t| query.from_task_id.map_or(true, |from| t.task_id >= from))
            .filter(|t| query.to_task_id.map_or(true, |to| t.task_id <= to))
            .filter(|t| query.statuses.is_empty() || query.statuses.contains(&t.status))
            .filter(|t| {
                query.from_last_modification_date.map_or(true, |from| {
                    t.last_modification_date.is_some_and(|date| date >= from)
                })
            })
            .skip(query.offset() as usize)
            .take(query.page_size as usize)
            .map(|t| {
                let mut task = state.joined(t);
                if !query.input_variables_mode.should_read(&task) {
                    task.input_data = None;
                }
                task
            })
            .collect();
        Ok(tasks)
    }

    async fn read_tasks_data_summary(
        &self,
        from_task_id: i64,
        statuses: &[TaskStatus],
        _page_size: u32,
    ) -> TaskAssigningResult<Vec<TaskDataSummary>> {
        let state = self.state.lock().unwrap();
        let summaries = state
            .tasks
            .values()
            .filter(|t| t.task_id >= from_task_id && statuses.contains(&t.status))
            .map(|t| {
                let task = state.joined(t);
                TaskDataSummary {
                    task_id: task.task_id,
                    status: task.status,
                    actual_owner: task.actual_owner,
                    container_id: task.container_id,
                    planning_task: task.planning_task,
                }
            })
            .collect();
        Ok(summaries)
    }
}

/// Snapshot-based unit of work over an `InMemoryTaskStore`
#[derive(Debug)]
pub struct InMemoryUnitOfWork {
    working: Mutex<StoreState>,
    store: Arc<Mutex<StoreState>>,
    calls: Arc<CallCounters>,
}

impl InMemoryUnitOfWork {
    /// Applies the working copy to the store
    pub fn commit_now(self) {
        CallCounters::bump(&self.calls.commits);
        let working = self.working.into_inner().unwrap();
        *self.store.lock().unwrap() = working;
    }
}

#[async_trait]
impl PersistenceContext for InMemoryUnitOfWork {
    async fn find_decision(&self, task_id: i64) -> TaskAssigningResult<Option<AssignmentDecision>> {
        CallCounters::bump(&self.calls.find);
        Ok(self.working.lock().unwrap().decisions.get(&task_id).cloned())
    }

    async fn persist_decision(&self, decision: &AssignmentDecision) -> TaskAssigningResult<()> {
        CallCounters::bump(&self.calls.persist);
        let mut working = self.working.lock().unwrap();
        if working.decisions.contains_key(&decision.task_id) {
            return Err(TaskAssigningError::Internal(format!(
                "duplicate decision for task {}",
                decision.task_id
            )));
        }
        working.decisions.insert(decision.task_id, decision.clone());
        Ok(())
    }

    async fn merge_decision(&self, decision: &AssignmentDecision) -> TaskAssigningResult<()> {
        CallCounters::bump(&self.calls.merge);
        let mut working = self.working.lock().unwrap();
        working.decisions.insert(decision.task_id, decision.clone());
        Ok(())
    }

    async fn remove_decision(&self, decision: &AssignmentDecision) -> TaskAssigningResult<()> {
        CallCounters::bump(&self.calls.remove);
        let mut working = self.working.lock().unwrap();
        working.decisions.remove(&decision.task_id);
        Ok(())
    }
}

#[async_trait]
impl TaskLifecycleService for InMemoryUnitOfWork {
    async fn task_status(&self, task_id: i64) -> TaskAssigningResult<TaskStatus> {
        let mut working = self.working.lock().unwrap();
        Ok(working.task_mut(task_id)?.status)
    }

    async fn delegate(
        &self,
        task_id: i64,
        _user_id: &str,
        target_user: &str,
    ) -> TaskAssigningResult<()> {
        CallCounters::bump(&self.calls.delegate);
        let mut working = self.working.lock().unwrap();
        let task = working.task_mut(task_id)?;
        task.actual_owner = Some(target_user.to_string());
        task.status = TaskStatus::Reserved;
        Ok(())
    }

    async fn potential_owners(
        &self,
        task_id: i64,
    ) -> TaskAssigningResult<BTreeSet<OrganizationalEntity>> {
        let mut working = self.working.lock().unwrap();
        Ok(working.task_mut(task_id)?.potential_owners.clone())
    }

    async fn add_potential_owner(
        &self,
        task_id: i64,
        owner: &OrganizationalEntity,
    ) -> TaskAssigningResult<bool> {
        let mut working = self.working.lock().unwrap();
        Ok(working
            .task_mut(task_id)?
            .potential_owners
            .insert(owner.clone()))
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> TaskAssigningResult<()> {
        (*self).commit_now();
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> TaskAssigningResult<()> {
        CallCounters::bump(&self.calls.rollbacks);
        Ok(())
    }
}
