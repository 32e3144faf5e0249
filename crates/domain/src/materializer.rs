//! 查询结果行物化
//!
//! 查询每返回一行代表一个 (任务, 候选所有者) 组合，同一任务的行必须相邻。
//! 物化时按出现顺序为每个任务生成一条记录，并把所有者合并为集合。

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};

use crate::entities::{OrganizationalEntity, PlanningTask, TaskData, TaskDataSummary, TaskStatus};
use task_assigning_errors::{TaskAssigningError, TaskAssigningResult};

/// 分配决策相关列，任务没有决策时整体为空
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionColumns {
    pub assigned_user: String,
    pub index: i32,
    pub published: bool,
}

/// 一行扁平的查询结果
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRow {
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
    pub decision: Option<DecisionColumns>,
    pub owner_id: Option<String>,
    pub owner_type: Option<String>,
}

impl TaskRow {
    fn planning_task(&self) -> Option<PlanningTask> {
        self.decision.as_ref().map(|d| PlanningTask {
            task_id: self.task_id,
            assigned_user: d.assigned_user.clone(),
            index: d.index,
            published: d.published,
        })
    }

    /// 行上携带的所有者，ID 或类型为空时视为没有所有者
    fn owner(&self) -> TaskAssigningResult<Option<OrganizationalEntity>> {
        match (self.owner_id.as_deref(), self.owner_type.as_deref()) {
            (Some(id), Some(entity_type)) if !id.is_empty() && !entity_type.is_empty() => {
                OrganizationalEntity::from_columns(id, entity_type)
                    .map(Some)
                    .ok_or_else(|| {
                        TaskAssigningError::invalid_row(format!(
                            "任务 {} 的所有者 {} 类型未知: {}",
                            self.task_id, id, entity_type
                        ))
                    })
            }
            _ => Ok(None),
        }
    }

    fn to_task_data(&self) -> TaskData {
        TaskData {
            task_id: self.task_id,
            created_on: self.created_on,
            process_instance_id: self.process_instance_id,
            process_id: self.process_id.clone(),
            container_id: self.container_id.clone(),
            name: self.name.clone(),
            priority: self.priority,
            status: self.status,
            actual_owner: self.actual_owner.clone(),
            last_modification_date: self.last_modification_date,
            input_data: None,
            potential_owners: BTreeSet::new(),
            planning_task: self.planning_task(),
        }
    }

    fn to_summary(&self) -> TaskDataSummary {
        TaskDataSummary {
            task_id: self.task_id,
            status: self.status,
            actual_owner: self.actual_owner.clone(),
            container_id: self.container_id.clone(),
            planning_task: self.planning_task(),
        }
    }
}

/// 是否读取所有者列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerMode {
    Read,
    Skip,
}

/// 物化任务记录
pub fn materialize_tasks(rows: &[TaskRow], mode: OwnerMode) -> TaskAssigningResult<Vec<TaskData>> {
    group_rows(rows, TaskRow::to_task_data, |task: &mut TaskData, row: &TaskRow| {
        if mode == OwnerMode::Read {
            if let Some(owner) = row.owner()? {
                task.potential_owners.insert(owner);
            }
        }
        Ok(())
    })
}

/// 只保留摘要字段，所有者列被忽略
pub fn materialize_summaries(rows: &[TaskRow]) -> TaskAssigningResult<Vec<TaskDataSummary>> {
    group_rows(rows, TaskRow::to_summary, |_, _| Ok(()))
}

fn group_rows<T, B, A>(rows: &[TaskRow], mut build: B, mut attach: A) -> TaskAssigningResult<Vec<T>>
where
    B: FnMut(&TaskRow) -> T,
    A: FnMut(&mut T, &TaskRow) -> TaskAssigningResult<()>,
{
    let mut records: Vec<T> = Vec::new();
    let mut seen = HashSet::new();
    let mut last_id = None;

    for row in rows {
        if last_id != Some(row.task_id) {
            if !seen.insert(row.task_id) {
                return Err(TaskAssigningError::MalformedRowGrouping {
                    task_id: row.task_id,
                });
            }
            records.push(build(row));
            last_id = Some(row.task_id);
        }
        if let Some(current) = records.last_mut() {
            attach(current, row)?;
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(task_id: i64, owner: Option<(&str, &str)>) -> TaskRow {
        TaskRow {
            task_id,
            created_on: None,
            process_instance_id: task_id * 10,
            process_id: "hiring".to_string(),
            container_id: "hr-container".to_string(),
            name: format!("task-{task_id}"),
            priority: 0,
            status: TaskStatus::Ready,
            actual_owner: None,
            last_modification_date: None,
            decision: None,
            owner_id: owner.map(|(id, _)| id.to_string()),
            owner_type: owner.map(|(_, t)| t.to_string()),
        }
    }

    #[test]
    fn test_grouped_rows_produce_one_record_per_task() {
        let rows = vec![
            row(1, Some(("alice", "User"))),
            row(1, Some(("hr", "Group"))),
            row(2, None),
            row(3, Some(("bob", "User"))),
            row(3, Some(("it", "Group"))),
            row(3, Some(("bob", "User"))),
        ];

        let tasks = materialize_tasks(&rows, OwnerMode::Read).unwrap();

        assert_eq!(tasks.iter().map(|t| t.task_id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(tasks[0].potential_owners.len(), 2);
        assert!(tasks[1].potential_owners.is_empty());
        assert_eq!(
            tasks[2].potential_owners,
            BTreeSet::from([
                OrganizationalEntity::user("bob"),
                OrganizationalEntity::group("it"),
            ])
        );
    }

    #[test]
    fn test_owner_order_does_not_matter() {
        let forward = vec![row(5, Some(("a", "User"))), row(5, Some(("g", "Group")))];
        let backward = vec![row(5, Some(("g", "Group"))), row(5, Some(("a", "User")))];

        assert_eq!(
            materialize_tasks(&forward, OwnerMode::Read).unwrap(),
            materialize_tasks(&backward, OwnerMode::Read).unwrap()
        );
    }

    #[test]
    fn test_skip_mode_ignores_owner_columns() {
        let rows = vec![row(1, Some(("alice", "User"))), row(1, Some(("bad", "Role")))];
        let tasks = materialize_tasks(&rows, OwnerMode::Skip).unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].potential_owners.is_empty());
    }

    #[test]
    fn test_decision_columns_become_planning_task() {
        let mut with_decision = row(7, None);
        with_decision.decision = Some(DecisionColumns {
            assigned_user: "alice".to_string(),
            index: 2,
            published: true,
        });

        let tasks = materialize_tasks(&[with_decision, row(8, None)], OwnerMode::Read).unwrap();
        assert_eq!(
            tasks[0].planning_task,
            Some(PlanningTask {
                task_id: 7,
                assigned_user: "alice".to_string(),
                index: 2,
                published: true,
            })
        );
        assert_eq!(tasks[1].planning_task, None);
    }

    #[test]
    fn test_non_contiguous_rows_are_rejected() {
        let rows = vec![row(1, None), row(2, None), row(1, None)];
        let err = materialize_tasks(&rows, OwnerMode::Read).unwrap_err();
        assert!(matches!(err, TaskAssigningError::MalformedRowGrouping { task_id: 1 }));

        let err = materialize_summaries(&rows).unwrap_err();
        assert!(matches!(err, TaskAssigningError::MalformedRowGrouping { task_id: 1 }));
    }

    #[test]
    fn test_unknown_owner_type_is_invalid() {
        let rows = vec![row(1, Some(("admins", "Role")))];
        let err = materialize_tasks(&rows, OwnerMode::Read).unwrap_err();
        assert!(matches!(err, TaskAssigningError::InvalidRow(_)));
    }

    #[test]
    fn test_summaries_keep_summary_fields() {
        let mut first = row(1, Some(("alice", "User")));
        first.status = TaskStatus::Reserved;
        first.actual_owner = Some("alice".to_string());
        let rows = vec![first.clone(), first, row(2, None)];

        let summaries = materialize_summaries(&rows).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(
            summaries[0],
            TaskDataSummary {
                task_id: 1,
                status: TaskStatus::Reserved,
                actual_owner: Some("alice".to_string()),
                container_id: "hr-container".to_string(),
                planning_task: None,
            }
        );
    }

    #[test]
    fn test_empty_rows() {
        assert!(materialize_tasks(&[], OwnerMode::Read).unwrap().is_empty());
        assert!(materialize_summaries(&[]).unwrap().is_empty());
    }
}
