//! 外部协作者端口
//!
//! 持久化上下文、任务生命周期服务与任务查询服务都由基础设施层实现，
//! 领域与应用层只依赖这里的抽象。

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::entities::{
    AssignmentDecision, FindTasksQuery, OrganizationalEntity, TaskData, TaskDataSummary, TaskStatus,
};
use task_assigning_errors::TaskAssigningResult;

/// 分配决策持久化上下文
#[async_trait]
pub trait PersistenceContext: Send + Sync {
    async fn find_decision(&self, task_id: i64) -> TaskAssigningResult<Option<AssignmentDecision>>;
    async fn persist_decision(&self, decision: &AssignmentDecision) -> TaskAssigningResult<()>;
    async fn merge_decision(&self, decision: &AssignmentDecision) -> TaskAssigningResult<()>;
    async fn remove_decision(&self, decision: &AssignmentDecision) -> TaskAssigningResult<()>;
}

/// 任务生命周期服务
#[async_trait]
pub trait TaskLifecycleService: Send + Sync {
    /// 任务不存在时返回 `TaskNotFound`
    async fn task_status(&self, task_id: i64) -> TaskAssigningResult<TaskStatus>;

    /// 以 `user_id` 的身份把任务认领转交给 `target_user`
    async fn delegate(&self, task_id: i64, user_id: &str, target_user: &str)
        -> TaskAssigningResult<()>;

    async fn potential_owners(
        &self,
        task_id: i64,
    ) -> TaskAssigningResult<BTreeSet<OrganizationalEntity>>;

    /// 返回实体此前是否不存在
    async fn add_potential_owner(
        &self,
        task_id: i64,
        owner: &OrganizationalEntity,
    ) -> TaskAssigningResult<bool>;
}

/// 一次事务范围内的持久化上下文与生命周期服务
#[async_trait]
pub trait UnitOfWork: PersistenceContext + TaskLifecycleService {
    async fn commit(self: Box<Self>) -> TaskAssigningResult<()>;
    async fn rollback(self: Box<Self>) -> TaskAssigningResult<()>;
}

#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    async fn begin(&self) -> TaskAssigningResult<Box<dyn UnitOfWork>>;
}

/// 任务查询服务：查询结果行来源加物化
#[async_trait]
pub trait TaskQueryService: Send + Sync {
    async fn find_tasks(&self, query: &FindTasksQuery) -> TaskAssigningResult<Vec<TaskData>>;

    /// 从 `from_task_id`（含）开始按任务ID分页读取，直到读到空页
    async fn read_tasks_data_summary(
        &self,
        from_task_id: i64,
        statuses: &[TaskStatus],
        page_size: u32,
    ) -> TaskAssigningResult<Vec<TaskDataSummary>>;
}
