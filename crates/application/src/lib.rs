//! 任务分配应用层
//!
//! 同步命令是分配决策表的唯一写入口，计划执行器把求解器的计划转换为命令并按容器执行。

pub mod use_cases;

pub use use_cases::commands::{
    delegate_and_save, delete_decision, save_decision, PlanningCommand,
    DELEGATION_ALLOWED_STATUSES,
};
pub use use_cases::planning_executor::{
    calculate_commands, ExecutePlanningResult, PlanningErrorCode, PlanningExecutor,
};
