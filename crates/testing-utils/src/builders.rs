//! Test data builders for creating test entities
//!
//! This module provides builder patterns for creating test data with
//! sensible defaults and easy customization.

use chrono::Utc;

use crate::helpers::timestamp_with_offset;
use std::collections::BTreeSet;

use task_assigning_domain::{
    OrganizationalEntity, PlanningItem, PlanningTask, TaskData, TaskStatus,
};

/// Builder for `TaskData` records
pub struct TaskDataBuilder {
    task: TaskData,
}

impl TaskDataBuilder {
    pub fn new(task_id: i64) -> Self {
        Self {
            task: TaskData {
                task_id,
                created_on: Some(Utc::now()),
                process_instance_id: task_id,
                process_id: "test_process".to_string(),
                container_id: "test_container".to_string(),
                name: format!("task_{task_id}"),
                priority: 0,
                status: TaskStatus::Ready,
                actual_owner: None,
                last_modification_date: Some(Utc::now()),
                input_data: None,
                potential_owners: BTreeSet::new(),
                planning_task: None,
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_container(mut self, container_id: &str) -> Self {
        self.task.container_id = container_id.to_string();
        self
    }

    pub fn with_process_instance(mut self, process_instance_id: i64) -> Self {
        self.task.process_instance_id = process_instance_id;
        self
    }

    pub fn with_actual_owner(mut self, owner: &str) -> Self {
        self.task.actual_owner = Some(owner.to_string());
        self
    }

    /// 最后修改时间相对当前时间的偏移（秒）
    pub fn modified_at_offset(mut self, offset_seconds: i64) -> Self {
        self.task.last_modification_date = Some(timestamp_with_offset(offset_seconds));
        self
    }

    pub fn with_potential_owner(mut self, owner: OrganizationalEntity) -> Self {
        self.task.potential_owners.insert(owner);
        self
    }

    pub fn with_input_data(mut self, input_data: serde_json::Value) -> Self {
        self.task.input_data = input_data.as_object().cloned();
        self
    }

    pub fn with_planning_task(mut self, assigned_user: &str, index: i32, published: bool) -> Self {
        self.task.planning_task = Some(PlanningTask {
            task_id: self.task.task_id,
            assigned_user: assigned_user.to_string(),
            index,
            published,
        });
        self
    }

    pub fn build(self) -> TaskData {
        self.task
    }
}

/// Builder for solver `PlanningItem`s
pub struct PlanningItemBuilder {
    item: PlanningItem,
}

impl PlanningItemBuilder {
    pub fn new(task_id: i64, assigned_user: &str) -> Self {
        Self {
            item: PlanningItem {
                container_id: "test_container".to_string(),
                task_id,
                process_instance_id: task_id,
                planning_task: PlanningTask {
                    task_id,
                    assigned_user: assigned_user.to_string(),
                    index: 0,
                    published: true,
                },
            },
        }
    }

    pub fn with_container(mut self, container_id: &str) -> Self {
        self.item.container_id = container_id.to_string();
        self
    }

    pub fn with_index(mut self, index: i32) -> Self {
        self.item.planning_task.index = index;
        self
    }

    pub fn with_published(mut self, published: bool) -> Self {
        self.item.planning_task.published = published;
        self
    }

    pub fn build(self) -> PlanningItem {
        self.item
    }
}
