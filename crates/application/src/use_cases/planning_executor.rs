use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use task_assigning_domain::{
    PlanningItem, TaskDataSummary, TaskQueryService, TaskStatus, UnitOfWorkFactory,
};
use task_assigning_errors::{TaskAssigningError, TaskAssigningResult};

use super::commands::PlanningCommand;

/// 计划执行失败的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanningErrorCode {
    /// 任务在计划计算之后被外部操作修改，等待下一个计划即可
    TaskModifiedSincePlanCalculation,
    UnexpectedError,
}

/// 计划执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutePlanningResult {
    pub error: Option<PlanningErrorCode>,
    pub error_message: Option<String>,
    pub container_id: Option<String>,
}

impl ExecutePlanningResult {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    fn from_error(err: TaskAssigningError, container_id: Option<String>) -> Self {
        let (code, container_id) = match err {
            TaskAssigningError::TaskModified {
                ref container_id, ..
            } => (
                PlanningErrorCode::TaskModifiedSincePlanCalculation,
                Some(container_id.clone()),
            ),
            TaskAssigningError::StatusMismatch { .. } => {
                (PlanningErrorCode::TaskModifiedSincePlanCalculation, container_id)
            }
            _ => (PlanningErrorCode::UnexpectedError, container_id),
        };
        Self {
            error: Some(code),
            error_message: Some(err.to_string()),
            container_id,
        }
    }
}

/// 把求解器的计划落地到任务运行时
pub struct PlanningExecutor {
    query_service: Arc<dyn TaskQueryService>,
    uow_factory: Arc<dyn UnitOfWorkFactory>,
    summary_page_size: u32,
}

impl PlanningExecutor {
    pub fn new(
        query_service: Arc<dyn TaskQueryService>,
        uow_factory: Arc<dyn UnitOfWorkFactory>,
        summary_page_size: u32,
    ) -> Self {
        // 页大小为 0 时读不到任何摘要
        if summary_page_size == 0 {
            warn!("摘要分页大小为 0，改用 1");
        }
        Self {
            query_service,
            uow_factory,
            summary_page_size: summary_page_size.max(1),
        }
    }

    /// 执行计划，遇到第一个错误即停止
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn execute_planning(
        &self,
        items: &[PlanningItem],
        user_id: &str,
    ) -> ExecutePlanningResult {
        let live = match self
            .query_service
            .read_tasks_data_summary(0, &TaskStatus::ACTIVE, self.summary_page_size)
            .await
        {
            Ok(live) => live,
            Err(err) => {
                error!("读取任务摘要失败: {}", err);
                return ExecutePlanningResult::from_error(err, None);
            }
        };

        let commands_by_container = match calculate_commands(items, live, user_id) {
            Ok(commands) => commands,
            Err(err) => {
                debug!("计划计算阶段出错: {}", err);
                return ExecutePlanningResult::from_error(err, None);
            }
        };

        for (container_id, commands) in commands_by_container {
            if let Err(err) = self.execute_container_commands(&container_id, commands).await {
                if err.is_programming_error() || err.is_retryable() {
                    error!("容器 {} 执行计划命令失败: {}", container_id, err);
                } else {
                    debug!("容器 {} 执行计划命令失败: {}", container_id, err);
                }
                return ExecutePlanningResult::from_error(err, Some(container_id));
            }
        }

        info!("计划执行完成: {} 个计划项", items.len());
        ExecutePlanningResult::success()
    }

    /// 委派逐个在独立的工作单元中执行，其余命令在同一个工作单元中执行
    async fn execute_container_commands(
        &self,
        container_id: &str,
        commands: Vec<PlanningCommand>,
    ) -> TaskAssigningResult<()> {
        let (delegations, db_only): (Vec<_>, Vec<_>) =
            commands.into_iter().partition(PlanningCommand::is_delegation);
        debug!(
            "执行容器 {} 的计划命令: {} 个委派, {} 个决策写入",
            container_id,
            delegations.len(),
            db_only.len()
        );

        for delegation in &delegations {
            self.run_in_unit_of_work(std::slice::from_ref(delegation)).await?;
        }
        if !db_only.is_empty() {
            self.run_in_unit_of_work(&db_only).await?;
        }
        Ok(())
    }

    async fn run_in_unit_of_work(&self, commands: &[PlanningCommand]) -> TaskAssigningResult<()> {
        let uow = self.uow_factory.begin().await?;
        for command in commands {
            if let Err(err) = command.execute(&*uow).await {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!("回滚工作单元失败: {}", rollback_err);
                }
                return Err(err);
            }
        }
        uow.commit().await
    }
}

/// 根据计划项与任务现状计算需要执行的命令，按容器分组
///
/// 计划中没有出现、仍处于 Ready/Reserved/Suspended 且带有决策的任务会得到删除命令。
pub fn calculate_commands(
    items: &[PlanningItem],
    live: Vec<TaskDataSummary>,
    user_id: &str,
) -> TaskAssigningResult<BTreeMap<String, Vec<PlanningCommand>>> {
    let mut live_by_id: HashMap<i64, TaskDataSummary> =
        live.into_iter().map(|t| (t.task_id, t)).collect();
    let mut commands: BTreeMap<String, Vec<PlanningCommand>> = BTreeMap::new();

    for item in items {
        let planned = &item.planning_task;
        let task = live_by_id.remove(&item.task_id).ok_or_else(|| {
            task_modified(
                item,
                format!(
                    "任务不再处于期望的状态 {:?} 之一",
                    TaskStatus::ACTIVE.map(|s| s.as_str())
                ),
            )
        })?;

        let actual_owner = task.actual_owner.as_deref().filter(|o| !o.is_empty());
        let stored = task.planning_task.as_ref();

        if let (Some(owner), Some(stored)) = (actual_owner, stored) {
            if owner == stored.assigned_user && stored == planned {
                continue;
            }
        }

        let delegate = match task.status {
            TaskStatus::Ready => true,
            TaskStatus::Reserved => match stored {
                None => true,
                Some(stored)
                    if actual_owner != Some(stored.assigned_user.as_str())
                        && actual_owner != Some(planned.assigned_user.as_str()) =>
                {
                    return Err(task_modified(
                        item,
                        format!(
                            "实际所有者为 {:?}，但上一次分配的用户为 {}",
                            actual_owner, stored.assigned_user
                        ),
                    ));
                }
                Some(_) => true,
            },
            TaskStatus::InProgress | TaskStatus::Suspended => {
                if actual_owner != Some(planned.assigned_user.as_str()) {
                    return Err(task_modified(
                        item,
                        format!(
                            "实际所有者为 {:?}，但期望的用户为 {}",
                            actual_owner, planned.assigned_user
                        ),
                    ));
                }
                false
            }
            other => {
                return Err(task_modified(item, format!("当前状态为 {other}，不在期望的状态之中")));
            }
        };

        let command = if delegate {
            PlanningCommand::DelegateAndSave {
                task_id: item.task_id,
                acting_user: user_id.to_string(),
                target_user: planned.assigned_user.clone(),
                index: planned.index,
                published: planned.published,
            }
        } else {
            PlanningCommand::SaveDecision {
                task_id: item.task_id,
                assigned_user: planned.assigned_user.clone(),
                index: planned.index,
                published: planned.published,
            }
        };
        commands.entry(item.container_id.clone()).or_default().push(command);
    }

    let mut stale: Vec<&TaskDataSummary> = live_by_id
        .values()
        .filter(|t| {
            matches!(
                t.status,
                TaskStatus::Ready | TaskStatus::Reserved | TaskStatus::Suspended
            ) && t.planning_task.is_some()
        })
        .collect();
    stale.sort_by_key(|t| t.task_id);
    for task in stale {
        commands
            .entry(task.container_id.clone())
            .or_default()
            .push(PlanningCommand::DeleteDecision {
                task_id: task.task_id,
            });
    }

    Ok(commands)
}

fn task_modified(item: &PlanningItem, message: String) -> TaskAssigningError {
    TaskAssigningError::TaskModified {
        task_id: item.task_id,
        container_id: item.container_id.clone(),
        message,
    }
}
