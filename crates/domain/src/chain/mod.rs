//! 分配链模型
//!
//! 每个资源（链的锚点）拥有零条或一条由工作项组成的链。`previous` 是唯一的决策字段，
//! `next`、`owner`、`start_time`、`end_time` 都由传播器根据 `previous` 重新计算。
//!
//! 链节点存放在 [`ChainSolution`] 的arena中，节点之间只通过索引引用，`next` 反向指针
//! 只用于查找，不表示所有权。

pub mod model;
pub mod propagator;
pub mod sentinels;
pub mod solution;

pub use model::{ChainNode, Resource, ResourceKey, TaskKey, WorkItem, DEFAULT_DURATION};
pub use sentinels::{
    is_sentinel, placeholder_resource, sentinel_tasks, PLANNING_USER_ENTITY_ID,
    PLANNING_USER_ID, SECONDARY_SENTINEL_TASK_ID, SENTINEL_TASK_ID,
};
pub use solution::{ChainIter, ChainSolution};
