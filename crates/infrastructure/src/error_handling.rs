//! Repository error helpers with operation context
//!
//! Every SQLite operation carries a small context describing what it was doing,
//! so database failures are logged with the task and user they concern before
//! being handed back as `TaskAssigningError`.

use chrono::{DateTime, Utc};
use sqlx::Error as SqlxError;
use std::fmt;
use task_assigning_errors::TaskAssigningError;
use tracing::{error, info, instrument, warn};

/// Operation context for repository operations
#[derive(Debug, Clone)]
pub enum RepositoryOperation {
    Create,
    Read,
    Update,
    Delete,
    Query,
    BatchRead,
    Delegate,
    Migrate,
    Commit,
    Rollback,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryOperation::Create => write!(f, "创建"),
            RepositoryOperation::Read => write!(f, "查询"),
            RepositoryOperation::Update => write!(f, "更新"),
            RepositoryOperation::Delete => write!(f, "删除"),
            RepositoryOperation::Query => write!(f, "查询"),
            RepositoryOperation::BatchRead => write!(f, "批量查询"),
            RepositoryOperation::Delegate => write!(f, "委派"),
            RepositoryOperation::Migrate => write!(f, "迁移"),
            RepositoryOperation::Commit => write!(f, "提交"),
            RepositoryOperation::Rollback => write!(f, "回滚"),
        }
    }
}

/// Context information for task and decision operations
#[derive(Debug, Clone)]
pub struct TaskOperationContext {
    pub operation: RepositoryOperation,
    pub task_id: Option<i64>,
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub additional_info: Option<String>,
}

impl TaskOperationContext {
    pub fn new(operation: RepositoryOperation) -> Self {
        Self {
            operation,
            task_id: None,
            user_id: None,
            timestamp: Utc::now(),
            additional_info: None,
        }
    }

    pub fn with_task_id(mut self, task_id: i64) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_additional_info(mut self, info: String) -> Self {
        self.additional_info = Some(info);
        self
    }

    pub fn entity_description(&self) -> String {
        match (&self.task_id, &self.user_id) {
            (Some(id), Some(user)) => format!("任务 (ID: {}, 用户: {})", id, user),
            (Some(id), None) => format!("任务 (ID: {})", id),
            (None, Some(user)) => format!("用户 '{}' 的任务", user),
            (None, None) => "任务".to_string(),
        }
    }
}

pub struct RepositoryErrorHelpers;

impl RepositoryErrorHelpers {
    /// 记录上下文后原样返回数据库错误
    #[instrument(skip_all, fields(
        operation = %context.operation,
        task_id = ?context.task_id,
        user_id = ?context.user_id,
        timestamp = %context.timestamp,
    ))]
    pub fn database_error(context: TaskOperationContext, error: SqlxError) -> TaskAssigningError {
        let entity_desc = context.entity_description();
        let operation_desc = context.operation.to_string();

        let error_msg = match &error {
            SqlxError::Database(db_error) if db_error.is_unique_violation() => {
                format!("{}{}时发生唯一约束冲突: {}", operation_desc, entity_desc, db_error)
            }
            SqlxError::Database(db_error) if db_error.is_foreign_key_violation() => {
                format!("{}{}时发生外键约束冲突: {}", operation_desc, entity_desc, db_error)
            }
            SqlxError::PoolClosed => {
                format!("{}{}时数据库连接池已关闭", operation_desc, entity_desc)
            }
            SqlxError::PoolTimedOut => {
                format!("{}{}时数据库连接池超时", operation_desc, entity_desc)
            }
            SqlxError::ColumnDecode { index, source } => {
                format!("{}{}时解析列 {} 失败: {}", operation_desc, entity_desc, index, source)
            }
            _ => format!("{}{}时发生数据库错误: {}", operation_desc, entity_desc, error),
        };

        match &context.additional_info {
            Some(info) => error!(error = %error, info = %info, "{}", error_msg),
            None => error!(error = %error, "{}", error_msg),
        }
        TaskAssigningError::Database(error)
    }

    pub fn serialization_error(
        context: TaskOperationContext,
        error: impl fmt::Display,
    ) -> TaskAssigningError {
        let error_msg = format!(
            "{}{}时序列化失败: {}",
            context.operation,
            context.entity_description(),
            error
        );
        error!("{}", error_msg);
        TaskAssigningError::Serialization(error_msg)
    }

    /// 找不到任务时记录并返回 `TaskNotFound`
    pub fn task_not_found(context: TaskOperationContext) -> TaskAssigningError {
        warn!(
            "{}{}时未找到: 任务不存在",
            context.operation,
            context.entity_description()
        );
        TaskAssigningError::task_not_found(context.task_id.unwrap_or(0))
    }

    pub fn log_operation_success(context: &TaskOperationContext, additional_info: Option<&str>) {
        let base_msg = format!("{}{}成功", context.operation, context.entity_description());
        if let Some(info) = additional_info {
            info!("{}: {}", base_msg, info);
        } else {
            info!("{}", base_msg);
        }
    }
}

/// Macro for creating task operation context easily
#[macro_export]
macro_rules! task_context {
    ($operation:expr) => {
        $crate::error_handling::TaskOperationContext::new($operation)
    };
    ($operation:expr, task_id = $task_id:expr) => {
        $crate::error_handling::TaskOperationContext::new($operation).with_task_id($task_id)
    };
    ($operation:expr, task_id = $task_id:expr, user_id = $user_id:expr) => {
        $crate::error_handling::TaskOperationContext::new($operation)
            .with_task_id($task_id)
            .with_user_id($user_id.to_string())
    };
}
