use std::collections::BTreeSet;

use super::model::{Resource, WorkItem};
use crate::entities::OrganizationalEntity;

/// 占位资源：任何工作项都接受它作为所有者
pub const PLANNING_USER_ID: i64 = -1;
pub const PLANNING_USER_ENTITY_ID: &str = "planning_user";

/// 两个固定的哨兵工作项，保证求解器面对的链结构非空
pub const SENTINEL_TASK_ID: i64 = -1;
pub const SECONDARY_SENTINEL_TASK_ID: i64 = -2;

pub fn placeholder_resource() -> Resource {
    Resource::new_immutable(PLANNING_USER_ID, PLANNING_USER_ENTITY_ID)
}

/// 哨兵工作项永久固定，唯一的候选所有者是占位资源
pub fn sentinel_tasks() -> [WorkItem; 2] {
    let owners: BTreeSet<OrganizationalEntity> =
        [OrganizationalEntity::user(PLANNING_USER_ENTITY_ID)].into();
    [
        WorkItem::new_immutable(SENTINEL_TASK_ID, "sentinel", owners.clone()),
        WorkItem::new_immutable(SECONDARY_SENTINEL_TASK_ID, "secondary-sentinel", owners),
    ]
}

pub fn is_sentinel(task_id: i64) -> bool {
    task_id == SENTINEL_TASK_ID || task_id == SECONDARY_SENTINEL_TASK_ID
}
