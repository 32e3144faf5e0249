use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskAssigningError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("任务未找到: {id}")]
    TaskNotFound { id: i64 },
    #[error("链节点未找到: {node}")]
    UnknownChainNode { node: String },
    #[error("不可变实体不允许修改: {entity}")]
    ImmutableEntity { entity: String },
    #[error("链不变量被破坏: {0}")]
    InvariantViolation(String),
    #[error("任务 {task_id} 的当前状态为 {status}，但期望的状态应为 {allowed:?} 之一")]
    StatusMismatch {
        task_id: i64,
        status: String,
        allowed: Vec<String>,
    },
    #[error("任务 {task_id} 自上次计划计算后已被外部操作修改 (容器: {container_id}): {message}")]
    TaskModified {
        task_id: i64,
        container_id: String,
        message: String,
    },
    #[error("查询结果行未按任务分组: 任务 {task_id} 在其他任务之后再次出现")]
    MalformedRowGrouping { task_id: i64 },
    #[error("无效的查询结果行: {0}")]
    InvalidRow(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type TaskAssigningResult<T> = Result<T, TaskAssigningError>;

impl TaskAssigningError {
    pub fn task_not_found(id: i64) -> Self {
        Self::TaskNotFound { id }
    }
    pub fn immutable<S: Into<String>>(entity: S) -> Self {
        Self::ImmutableEntity {
            entity: entity.into(),
        }
    }
    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        Self::InvariantViolation(msg.into())
    }
    pub fn invalid_row<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRow(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn status_mismatch<S: Into<String>>(task_id: i64, status: S, allowed: &[&str]) -> Self {
        Self::StatusMismatch {
            task_id,
            status: status.into(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }
    /// 编程错误，不应被恢复
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            TaskAssigningError::ImmutableEntity { .. }
                | TaskAssigningError::InvariantViolation(_)
                | TaskAssigningError::UnknownChainNode { .. }
        )
    }
    /// 本层从不重试，调用方可以据此决定是否重新提交
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskAssigningError::Database(_))
    }
    pub fn user_message(&self) -> &str {
        match self {
            TaskAssigningError::TaskNotFound { .. } => "请求的任务不存在",
            TaskAssigningError::StatusMismatch { .. } => "任务状态已变化，无法委派",
            TaskAssigningError::TaskModified { .. } => "任务已被外部修改，请等待新的计划",
            TaskAssigningError::MalformedRowGrouping { .. } | TaskAssigningError::InvalidRow(_) => {
                "查询结果格式错误"
            }
            TaskAssigningError::Configuration(_) => "配置有误",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for TaskAssigningError {
    fn from(err: serde_json::Error) -> Self {
        TaskAssigningError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for TaskAssigningError {
    fn from(err: anyhow::Error) -> Self {
        TaskAssigningError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests;
