use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::materializer::OwnerMode;

/// 任务生命周期状态
///
/// 与任务运行时保存的状态字符串一一对应。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskStatus {
    Created,
    Ready,
    Reserved,
    InProgress,
    Suspended,
    Completed,
    Failed,
    Error,
    Exited,
    Obsolete,
}

impl TaskStatus {
    /// 分配模型关心的活跃状态
    pub const ACTIVE: [TaskStatus; 4] = [
        TaskStatus::Ready,
        TaskStatus::Reserved,
        TaskStatus::InProgress,
        TaskStatus::Suspended,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Created => "Created",
            TaskStatus::Ready => "Ready",
            TaskStatus::Reserved => "Reserved",
            TaskStatus::InProgress => "InProgress",
            TaskStatus::Suspended => "Suspended",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
            TaskStatus::Error => "Error",
            TaskStatus::Exited => "Exited",
            TaskStatus::Obsolete => "Obsolete",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskStatus::Created
                | TaskStatus::Ready
                | TaskStatus::Reserved
                | TaskStatus::InProgress
                | TaskStatus::Suspended
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(TaskStatus::Created),
            "Ready" => Ok(TaskStatus::Ready),
            "Reserved" => Ok(TaskStatus::Reserved),
            "InProgress" => Ok(TaskStatus::InProgress),
            "Suspended" => Ok(TaskStatus::Suspended),
            "Completed" => Ok(TaskStatus::Completed),
            "Failed" => Ok(TaskStatus::Failed),
            "Error" => Ok(TaskStatus::Error),
            "Exited" => Ok(TaskStatus::Exited),
            "Obsolete" => Ok(TaskStatus::Obsolete),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for TaskStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(s.parse::<TaskStatus>()?)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 组织实体：用户或用户组
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(tag = "type", content = "id")]
pub enum OrganizationalEntity {
    User(String),
    Group(String),
}

impl OrganizationalEntity {
    pub const USER_TYPE: &'static str = "User";
    pub const GROUP_TYPE: &'static str = "Group";

    pub fn user<S: Into<String>>(id: S) -> Self {
        OrganizationalEntity::User(id.into())
    }

    pub fn group<S: Into<String>>(id: S) -> Self {
        OrganizationalEntity::Group(id.into())
    }

    pub fn id(&self) -> &str {
        match self {
            OrganizationalEntity::User(id) | OrganizationalEntity::Group(id) => id,
        }
    }

    pub fn entity_type(&self) -> &'static str {
        match self {
            OrganizationalEntity::User(_) => Self::USER_TYPE,
            OrganizationalEntity::Group(_) => Self::GROUP_TYPE,
        }
    }

    /// 由 (实体ID, 实体类型) 列对还原实体，未知类型返回 None
    pub fn from_columns(entity_id: &str, entity_type: &str) -> Option<Self> {
        match entity_type {
            Self::USER_TYPE => Some(OrganizationalEntity::User(entity_id.to_string())),
            Self::GROUP_TYPE => Some(OrganizationalEntity::Group(entity_id.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for OrganizationalEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.entity_type(), self.id())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LabelType {
    Skill,
    Affinity,
}

/// 带类型的标签，用于描述资源能力和任务需求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypedLabel {
    pub label_type: LabelType,
    pub value: String,
}

impl TypedLabel {
    pub fn skill<S: Into<String>>(value: S) -> Self {
        Self {
            label_type: LabelType::Skill,
            value: value.into(),
        }
    }

    pub fn affinity<S: Into<String>>(value: S) -> Self {
        Self {
            label_type: LabelType::Affinity,
            value: value.into(),
        }
    }
}

/// 求解器为任务做出的分配决策（随任务数据一起读取）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanningTask {
    pub task_id: i64,
    pub assigned_user: String,
    pub index: i32,
    pub published: bool,
}

/// 持久化的分配决策记录
///
/// 与任务记录的生命周期相互独立，只由同步命令创建、更新和删除。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignmentDecision {
    pub task_id: i64,
    pub assigned_user: String,
    pub index: i32,
    pub published: bool,
    pub last_modification_date: DateTime<Utc>,
}

impl AssignmentDecision {
    pub fn new(task_id: i64, assigned_user: String, index: i32, published: bool) -> Self {
        Self {
            task_id,
            assigned_user,
            index,
            published,
            last_modification_date: Utc::now(),
        }
    }

    pub fn to_planning_task(&self) -> PlanningTask {
        PlanningTask {
            task_id: self.task_id,
            assigned_user: self.assigned_user.clone(),
            index: self.index,
            published: self.published,
        }
    }
}

/// 由查询结果行物化得到的任务记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskData {
    pub task_id: i64,
    pub created_on: Option<DateTime<Utc>>,
    pub process_instance_id: i64,
    pub process_id: String,
    pub container_id: String,
    pub name: String,
    pub priority: i32,
    pub status: TaskStatus,
    pub actual_owner: Option<String>,
    pub last_modification_date: Option<DateTime<Utc>>,
    pub input_data: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub potential_owners: BTreeSet<OrganizationalEntity>,
    pub planning_task: Option<PlanningTask>,
}

/// 高频轮询使用的任务摘要
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDataSummary {
    pub task_id: i64,
    pub status: TaskStatus,
    pub actual_owner: Option<String>,
    pub container_id: String,
    pub planning_task: Option<PlanningTask>,
}

/// 求解器计划中的一项，需要在任务运行时中落地
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanningItem {
    pub container_id: String,
    pub task_id: i64,
    pub process_instance_id: i64,
    pub planning_task: PlanningTask,
}

/// 任务输入变量读取模式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TaskInputVariablesReadMode {
    #[default]
    DontRead,
    ReadForAll,
    ReadForActiveTasksWithNoPlanningEntity,
}

impl TaskInputVariablesReadMode {
    pub fn should_read(&self, task: &TaskData) -> bool {
        match self {
            TaskInputVariablesReadMode::DontRead => false,
            TaskInputVariablesReadMode::ReadForAll => true,
            TaskInputVariablesReadMode::ReadForActiveTasksWithNoPlanningEntity => {
                task.planning_task.is_none() && task.status.is_active()
            }
        }
    }
}

/// 任务查询条件
#[derive(Debug, Clone, Default)]
pub struct FindTasksQuery {
    pub from_task_id: Option<i64>,
    pub to_task_id: Option<i64>,
    pub statuses: Vec<TaskStatus>,
    pub from_last_modification_date: Option<DateTime<Utc>>,
    pub page: u32,
    pub page_size: u32,
    pub input_variables_mode: TaskInputVariablesReadMode,
    /// 为真时不连接候选所有者表，结果中的所有者集合为空
    pub skip_potential_owners: bool,
}

impl FindTasksQuery {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    pub fn with_statuses(mut self, statuses: &[TaskStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn with_task_range(mut self, from: Option<i64>, to: Option<i64>) -> Self {
        self.from_task_id = from;
        self.to_task_id = to;
        self
    }

    pub fn with_modified_since(mut self, date: DateTime<Utc>) -> Self {
        self.from_last_modification_date = Some(date);
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_input_variables_mode(mut self, mode: TaskInputVariablesReadMode) -> Self {
        self.input_variables_mode = mode;
        self
    }

    pub fn without_potential_owners(mut self) -> Self {
        self.skip_potential_owners = true;
        self
    }

    pub fn owner_mode(&self) -> OwnerMode {
        if self.skip_potential_owners {
            OwnerMode::Skip
        } else {
            OwnerMode::Read
        }
    }

    pub fn offset(&self) -> i64 {
        self.page as i64 * self.page_size as i64
    }
}
