use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use task_assigning_domain::{
    AssignmentDecision, OrganizationalEntity, PersistenceContext, TaskLifecycleService,
    TaskStatus, UnitOfWork, UnitOfWorkFactory,
};
use task_assigning_errors::{TaskAssigningError, TaskAssigningResult};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument, warn};

use crate::{
    error_handling::{RepositoryErrorHelpers, RepositoryOperation},
    task_context,
};

pub struct SqliteUnitOfWorkFactory {
    pool: SqlitePool,
}

impl SqliteUnitOfWorkFactory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnitOfWorkFactory for SqliteUnitOfWorkFactory {
    async fn begin(&self) -> TaskAssigningResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(SqliteUnitOfWork::begin(&self.pool).await?))
    }
}

/// 一个SQLite事务内的决策持久化与任务生命周期操作
///
/// 提交或回滚之前的所有写入对其他连接不可见；未提交就被丢弃时由sqlx回滚。
pub struct SqliteUnitOfWork {
    tx: Mutex<Option<Transaction<'static, Sqlite>>>,
}

impl SqliteUnitOfWork {
    pub async fn begin(pool: &SqlitePool) -> TaskAssigningResult<Self> {
        let tx = pool.begin().await.map_err(|e| {
            RepositoryErrorHelpers::database_error(task_context!(RepositoryOperation::Commit), e)
        })?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
        })
    }

    async fn transaction(&self) -> TaskAssigningResult<TransactionGuard<'_>> {
        Ok(TransactionGuard {
            guard: self.tx.lock().await,
        })
    }

    async fn ensure_task_exists(
        conn: &mut SqliteConnection,
        task_id: i64,
    ) -> TaskAssigningResult<()> {
        let context = task_context!(RepositoryOperation::Read, task_id = task_id);
        let found = sqlx::query("SELECT 1 FROM tasks WHERE task_id = ?")
            .bind(task_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;
        match found {
            Some(_) => Ok(()),
            None => Err(RepositoryErrorHelpers::task_not_found(context)),
        }
    }
}

struct TransactionGuard<'a> {
    guard: MutexGuard<'a, Option<Transaction<'static, Sqlite>>>,
}

impl TransactionGuard<'_> {
    fn conn(&mut self) -> TaskAssigningResult<&mut SqliteConnection> {
        match self.guard.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(TaskAssigningError::Internal("工作单元已结束".to_string())),
        }
    }
}

#[async_trait]
impl PersistenceContext for SqliteUnitOfWork {
    #[instrument(skip(self))]
    async fn find_decision(&self, task_id: i64) -> TaskAssigningResult<Option<AssignmentDecision>> {
        let context = task_context!(RepositoryOperation::Read, task_id = task_id);
        let mut tx = self.transaction().await?;

        let row = sqlx::query(
            "SELECT task_id, assigned_user, task_index, published, last_modification_date \
             FROM assignment_decisions WHERE task_id = ?",
        )
        .bind(task_id)
        .fetch_optional(tx.conn()?)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        let decision = match row {
            Some(row) => Some(AssignmentDecision {
                task_id: row.try_get("task_id")?,
                assigned_user: row.try_get("assigned_user")?,
                index: row.try_get("task_index")?,
                published: row.try_get("published")?,
                last_modification_date: row.try_get("last_modification_date")?,
            }),
            None => None,
        };
        debug!("查询分配决策: 任务 {}, 存在: {}", task_id, decision.is_some());
        Ok(decision)
    }

    #[instrument(skip(self, decision), fields(task_id = decision.task_id))]
    async fn persist_decision(&self, decision: &AssignmentDecision) -> TaskAssigningResult<()> {
        let context = task_context!(
            RepositoryOperation::Create,
            task_id = decision.task_id,
            user_id = decision.assigned_user
        );
        let mut tx = self.transaction().await?;

        sqlx::query(
            "INSERT INTO assignment_decisions \
             (task_id, assigned_user, task_index, published, last_modification_date) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(decision.task_id)
        .bind(&decision.assigned_user)
        .bind(decision.index)
        .bind(decision.published)
        .bind(decision.last_modification_date)
        .execute(tx.conn()?)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;
        Ok(())
    }

    #[instrument(skip(self, decision), fields(task_id = decision.task_id))]
    async fn merge_decision(&self, decision: &AssignmentDecision) -> TaskAssigningResult<()> {
        let context = task_context!(
            RepositoryOperation::Update,
            task_id = decision.task_id,
            user_id = decision.assigned_user
        );
        let mut tx = self.transaction().await?;

        sqlx::query(
            "INSERT INTO assignment_decisions \
             (task_id, assigned_user, task_index, published, last_modification_date) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(task_id) DO UPDATE SET \
                assigned_user = excluded.assigned_user, \
                task_index = excluded.task_index, \
                published = excluded.published, \
                last_modification_date = excluded.last_modification_date",
        )
        .bind(decision.task_id)
        .bind(&decision.assigned_user)
        .bind(decision.index)
        .bind(decision.published)
        .bind(decision.last_modification_date)
        .execute(tx.conn()?)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;
        Ok(())
    }

    #[instrument(skip(self, decision), fields(task_id = decision.task_id))]
    async fn remove_decision(&self, decision: &AssignmentDecision) -> TaskAssigningResult<()> {
        let context = task_context!(RepositoryOperation::Delete, task_id = decision.task_id);
        let mut tx = self.transaction().await?;

        let result = sqlx::query("DELETE FROM assignment_decisions WHERE task_id = ?")
            .bind(decision.task_id)
            .execute(tx.conn()?)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;
        if result.rows_affected() == 0 {
            warn!("分配决策已不存在: 任务 {}", decision.task_id);
        }
        Ok(())
    }
}

#[async_trait]
impl TaskLifecycleService for SqliteUnitOfWork {
    #[instrument(skip(self))]
    async fn task_status(&self, task_id: i64) -> TaskAssigningResult<TaskStatus> {
        let context = task_context!(RepositoryOperation::Read, task_id = task_id);
        let mut tx = self.transaction().await?;

        let row = sqlx::query("SELECT status FROM tasks WHERE task_id = ?")
            .bind(task_id)
            .fetch_optional(tx.conn()?)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;
        match row {
            Some(row) => Ok(row.try_get("status")?),
            None => Err(RepositoryErrorHelpers::task_not_found(context)),
        }
    }

    #[instrument(skip(self))]
    async fn delegate(
        &self,
        task_id: i64,
        user_id: &str,
        target_user: &str,
    ) -> TaskAssigningResult<()> {
        let context =
            task_context!(RepositoryOperation::Delegate, task_id = task_id, user_id = user_id);
        let mut tx = self.transaction().await?;

        let result = sqlx::query(
            "UPDATE tasks SET actual_owner = ?, status = ?, last_modification_date = ? \
             WHERE task_id = ?",
        )
        .bind(target_user)
        .bind(TaskStatus::Reserved)
        .bind(Utc::now())
        .bind(task_id)
        .execute(tx.conn()?)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryErrorHelpers::task_not_found(context));
        }
        RepositoryErrorHelpers::log_operation_success(
            &context,
            Some(&format!("新所有者 {}", target_user)),
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn potential_owners(
        &self,
        task_id: i64,
    ) -> TaskAssigningResult<BTreeSet<OrganizationalEntity>> {
        let context = task_context!(RepositoryOperation::Read, task_id = task_id);
        let mut tx = self.transaction().await?;
        let conn = tx.conn()?;
        Self::ensure_task_exists(conn, task_id).await?;

        let rows = sqlx::query(
            "SELECT entity_id, entity_type FROM potential_owners WHERE task_id = ?",
        )
        .bind(task_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        let mut owners = BTreeSet::new();
        for row in rows {
            let entity_id: String = row.try_get("entity_id")?;
            let entity_type: String = row.try_get("entity_type")?;
            let owner = OrganizationalEntity::from_columns(&entity_id, &entity_type).ok_or_else(
                || {
                    TaskAssigningError::invalid_row(format!(
                        "任务 {} 的所有者 {} 类型未知: {}",
                        task_id, entity_id, entity_type
                    ))
                },
            )?;
            owners.insert(owner);
        }
        Ok(owners)
    }

    #[instrument(skip(self))]
    async fn add_potential_owner(
        &self,
        task_id: i64,
        owner: &OrganizationalEntity,
    ) -> TaskAssigningResult<bool> {
        let context =
            task_context!(RepositoryOperation::Create, task_id = task_id, user_id = owner.id());
        let mut tx = self.transaction().await?;
        let conn = tx.conn()?;
        Self::ensure_task_exists(conn, task_id).await?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO potential_owners (task_id, entity_id, entity_type) \
             VALUES (?, ?, ?)",
        )
        .bind(task_id)
        .bind(owner.id())
        .bind(owner.entity_type())
        .execute(&mut *conn)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn commit(self: Box<Self>) -> TaskAssigningResult<()> {
        let this = *self;
        let tx = this
            .tx
            .into_inner()
            .ok_or_else(|| TaskAssigningError::Internal("工作单元已结束".to_string()))?;
        tx.commit().await.map_err(|e| {
            RepositoryErrorHelpers::database_error(task_context!(RepositoryOperation::Commit), e)
        })?;
        debug!("工作单元已提交");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> TaskAssigningResult<()> {
        let this = *self;
        let tx = this
            .tx
            .into_inner()
            .ok_or_else(|| TaskAssigningError::Internal("工作单元已结束".to_string()))?;
        tx.rollback().await.map_err(|e| {
            RepositoryErrorHelpers::database_error(task_context!(RepositoryOperation::Rollback), e)
        })?;
        debug!("工作单元已回滚");
        Ok(())
    }
}
