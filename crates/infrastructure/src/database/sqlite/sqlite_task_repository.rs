use chrono::Utc;
use sqlx::SqlitePool;
use task_assigning_domain::{TaskData, TaskStatus};
use task_assigning_errors::TaskAssigningResult;
use tracing::{debug, instrument};

use crate::{
    error_handling::{RepositoryErrorHelpers, RepositoryOperation},
    task_context,
};

/// 任务运行时记录的写入端
///
/// 分配服务本身只读取任务，这里用于导入任务数据以及模拟运行时的状态变化。
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 写入任务记录并整体替换其候选所有者，任务上的决策字段被忽略
    #[instrument(skip(self, task), fields(task_id = task.task_id))]
    pub async fn save(&self, task: &TaskData) -> TaskAssigningResult<()> {
        let context = task_context!(RepositoryOperation::Create, task_id = task.task_id);
        let input_data = task
            .input_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryErrorHelpers::serialization_error(context.clone(), e))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        sqlx::query(
            "INSERT INTO tasks \
             (task_id, created_on, process_instance_id, process_id, container_id, name, \
              priority, status, actual_owner, last_modification_date, input_data) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(task_id) DO UPDATE SET \
                created_on = excluded.created_on, \
                process_instance_id = excluded.process_instance_id, \
                process_id = excluded.process_id, \
                container_id = excluded.container_id, \
                name = excluded.name, \
                priority = excluded.priority, \
                status = excluded.status, \
                actual_owner = excluded.actual_owner, \
                last_modification_date = excluded.last_modification_date, \
                input_data = excluded.input_data",
        )
        .bind(task.task_id)
        .bind(task.created_on)
        .bind(task.process_instance_id)
        .bind(&task.process_id)
        .bind(&task.container_id)
        .bind(&task.name)
        .bind(task.priority)
        .bind(task.status)
        .bind(&task.actual_owner)
        .bind(task.last_modification_date)
        .bind(input_data)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        sqlx::query("DELETE FROM potential_owners WHERE task_id = ?")
            .bind(task.task_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        for owner in &task.potential_owners {
            sqlx::query(
                "INSERT INTO potential_owners (task_id, entity_id, entity_type) VALUES (?, ?, ?)",
            )
            .bind(task.task_id)
            .bind(owner.id())
            .bind(owner.entity_type())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;
        debug!(
            "保存任务 {} 成功，候选所有者 {} 个",
            task.task_id,
            task.potential_owners.len()
        );
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn update_status(&self, task_id: i64, status: TaskStatus) -> TaskAssigningResult<()> {
        let context = task_context!(RepositoryOperation::Update, task_id = task_id);
        let result = sqlx::query(
            "UPDATE tasks SET status = ?, last_modification_date = ? WHERE task_id = ?",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryErrorHelpers::task_not_found(context));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, task_id: i64) -> TaskAssigningResult<bool> {
        let context = task_context!(RepositoryOperation::Delete, task_id = task_id);
        let result = sqlx::query("DELETE FROM tasks WHERE task_id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;
        Ok(result.rows_affected() > 0)
    }
}
