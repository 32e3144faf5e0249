use tracing::{debug, info, instrument};

use task_assigning_domain::{
    AssignmentDecision, OrganizationalEntity, PersistenceContext, TaskLifecycleService, TaskStatus,
};
use task_assigning_errors::{TaskAssigningError, TaskAssigningResult};

/// 只有尚未开始的任务允许委派
pub const DELEGATION_ALLOWED_STATUSES: [TaskStatus; 2] = [TaskStatus::Ready, TaskStatus::Reserved];

/// 分配决策同步命令
///
/// 所有命令都在调用方提供的工作单元内执行，重复投递是安全的。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanningCommand {
    SaveDecision {
        task_id: i64,
        assigned_user: String,
        index: i32,
        published: bool,
    },
    DeleteDecision {
        task_id: i64,
    },
    DelegateAndSave {
        task_id: i64,
        acting_user: String,
        target_user: String,
        index: i32,
        published: bool,
    },
}

impl PlanningCommand {
    pub fn task_id(&self) -> i64 {
        match self {
            PlanningCommand::SaveDecision { task_id, .. }
            | PlanningCommand::DeleteDecision { task_id }
            | PlanningCommand::DelegateAndSave { task_id, .. } => *task_id,
        }
    }

    pub fn is_delegation(&self) -> bool {
        matches!(self, PlanningCommand::DelegateAndSave { .. })
    }

    pub async fn execute<C>(&self, ctx: &C) -> TaskAssigningResult<()>
    where
        C: PersistenceContext + TaskLifecycleService + ?Sized,
    {
        match self {
            PlanningCommand::SaveDecision {
                task_id,
                assigned_user,
                index,
                published,
            } => save_decision(ctx, *task_id, assigned_user, *index, *published).await,
            PlanningCommand::DeleteDecision { task_id } => delete_decision(ctx, *task_id).await,
            PlanningCommand::DelegateAndSave {
                task_id,
                acting_user,
                target_user,
                index,
                published,
            } => {
                delegate_and_save(ctx, *task_id, acting_user, target_user, *index, *published)
                    .await
            }
        }
    }
}

/// 查找后更新或新建分配决策
#[instrument(skip(ctx))]
pub async fn save_decision<C>(
    ctx: &C,
    task_id: i64,
    assigned_user: &str,
    index: i32,
    published: bool,
) -> TaskAssigningResult<()>
where
    C: PersistenceContext + ?Sized,
{
    match ctx.find_decision(task_id).await? {
        Some(mut decision) => {
            decision.assigned_user = assigned_user.to_string();
            decision.index = index;
            decision.published = published;
            decision.last_modification_date = chrono::Utc::now();
            ctx.merge_decision(&decision).await?;
            debug!("更新分配决策: 任务 {}, 用户 {}, 位置 {}", task_id, assigned_user, index);
        }
        None => {
            let decision =
                AssignmentDecision::new(task_id, assigned_user.to_string(), index, published);
            ctx.persist_decision(&decision).await?;
            debug!("新建分配决策: 任务 {}, 用户 {}, 位置 {}", task_id, assigned_user, index);
        }
    }
    Ok(())
}

/// 决策不存在时什么也不做
#[instrument(skip(ctx))]
pub async fn delete_decision<C>(ctx: &C, task_id: i64) -> TaskAssigningResult<()>
where
    C: PersistenceContext + ?Sized,
{
    if let Some(decision) = ctx.find_decision(task_id).await? {
        ctx.remove_decision(&decision).await?;
        debug!("删除分配决策: 任务 {}", task_id);
    }
    Ok(())
}

/// 委派任务并保存决策
///
/// 状态校验失败时不产生任何副作用。委派与决策写入依赖调用方的工作单元一起提交。
#[instrument(skip(ctx))]
pub async fn delegate_and_save<C>(
    ctx: &C,
    task_id: i64,
    acting_user: &str,
    target_user: &str,
    index: i32,
    published: bool,
) -> TaskAssigningResult<()>
where
    C: PersistenceContext + TaskLifecycleService + ?Sized,
{
    let status = ctx.task_status(task_id).await?;
    if !DELEGATION_ALLOWED_STATUSES.contains(&status) {
        let allowed: Vec<&str> = DELEGATION_ALLOWED_STATUSES.iter().map(|s| s.as_str()).collect();
        return Err(TaskAssigningError::status_mismatch(task_id, status.as_str(), &allowed));
    }

    ctx.delegate(task_id, acting_user, target_user).await?;
    let added = ctx
        .add_potential_owner(task_id, &OrganizationalEntity::user(target_user))
        .await?;
    if added {
        debug!("用户 {} 被加入任务 {} 的候选所有者", target_user, task_id);
    }

    save_decision(ctx, task_id, target_user, index, published).await?;
    info!("任务 {} 已由 {} 委派给 {}", task_id, acting_user, target_user);
    Ok(())
}
