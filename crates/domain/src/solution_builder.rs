use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::chain::{
    ChainNode, ChainSolution, Resource, ResourceKey, TaskKey, WorkItem, PLANNING_USER_ENTITY_ID,
};
use crate::entities::{TaskData, TaskStatus};
use task_assigning_errors::TaskAssigningResult;

/// 链上的一个待放置工作项
#[derive(Debug)]
struct Placement {
    key: TaskKey,
    pinned: bool,
    index: i32,
    task_id: i64,
}

/// 由任务记录与已知资源构建初始工作解
#[derive(Debug, Default)]
pub struct SolutionBuilder {
    tasks: Vec<TaskData>,
    resources: Vec<Resource>,
}

impl SolutionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(mut self, tasks: Vec<TaskData>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_resources(mut self, resources: Vec<Resource>) -> Self {
        self.resources = resources;
        self
    }

    pub fn build(self) -> TaskAssigningResult<ChainSolution> {
        let mut solution = ChainSolution::new();
        for resource in self.resources {
            solution.add_resource(resource)?;
        }

        let mut chains: BTreeMap<ResourceKey, Vec<Placement>> = BTreeMap::new();
        let mut skipped = 0usize;

        for task in self.tasks {
            if !TaskStatus::ACTIVE.contains(&task.status) {
                skipped += 1;
                continue;
            }

            let assignment = match task.status {
                TaskStatus::Ready => task
                    .planning_task
                    .as_ref()
                    .and_then(|p| solution.find_resource(&p.assigned_user))
                    .map(|resource| (resource, false)),
                _ => match task.actual_owner.as_deref() {
                    Some(owner) => {
                        let resource = resolve_resource(&mut solution, owner)?;
                        Some((resource, is_pinned(&task, owner)))
                    }
                    None => None,
                },
            };

            let published = task.planning_task.as_ref().is_some_and(|p| p.published);
            let index = task
                .planning_task
                .as_ref()
                .filter(|p| {
                    assignment
                        .is_some_and(|(r, _)| solution.resource(r).entity_id() == p.assigned_user)
                })
                .map_or(i32::MAX, |p| p.index);

            let item = WorkItem::new(task.task_id, task.name, task.priority)
                .with_process(task.process_instance_id, task.process_id, task.container_id)
                .with_status(task.status)
                .with_input_data(task.input_data.unwrap_or_default())
                .with_eligible_owners(task.potential_owners)
                .with_published(published)
                .with_pinned(assignment.is_some_and(|(_, pinned)| pinned));
            let key = solution.add_task(item)?;

            if let Some((resource, pinned)) = assignment {
                chains.entry(resource).or_default().push(Placement {
                    key,
                    pinned,
                    index,
                    task_id: task.task_id,
                });
            }
        }

        for (resource, mut placements) in chains {
            placements.sort_by_key(|p| (!p.pinned, p.index, p.task_id));

            let mut previous = solution
                .chain_of(resource)
                .last()
                .map_or(ChainNode::Resource(resource), ChainNode::WorkItem);
            for placement in &placements {
                solution.set_previous(placement.key, Some(previous))?;
                previous = ChainNode::WorkItem(placement.key);
            }
            debug!(
                resource = solution.resource(resource).entity_id(),
                tasks = placements.len(),
                "资源链构建完成"
            );
        }

        solution.propagate();
        solution.verify()?;
        info!(
            tasks = solution.task_count(),
            resources = solution.resources().count(),
            skipped,
            "工作解构建完成"
        );
        Ok(solution)
    }
}

/// 已开始或已认领的任务是否固定在当前所有者上
///
/// 分配给占位资源的已认领任务不固定；已认领任务的决策仍指向当前所有者时，
/// 只有已发布的决策才固定。
fn is_pinned(task: &TaskData, owner: &str) -> bool {
    match task.status {
        TaskStatus::InProgress | TaskStatus::Suspended => true,
        TaskStatus::Reserved if owner == PLANNING_USER_ENTITY_ID => false,
        TaskStatus::Reserved => match &task.planning_task {
            Some(planning_task) if planning_task.assigned_user == owner => planning_task.published,
            _ => true,
        },
        _ => false,
    }
}

/// 未知用户按约定新建资源，ID 取现有最大值加一
fn resolve_resource(solution: &mut ChainSolution, entity_id: &str) -> TaskAssigningResult<ResourceKey> {
    if let Some(key) = solution.find_resource(entity_id) {
        return Ok(key);
    }
    let next_id = solution.resources().map(|(_, r)| r.id()).max().unwrap_or(0).max(0) + 1;
    debug!(entity_id, id = next_id, "为未知所有者新建资源");
    solution.add_resource(Resource::new(next_id, entity_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{SECONDARY_SENTINEL_TASK_ID, SENTINEL_TASK_ID};
    use crate::entities::{OrganizationalEntity, PlanningTask};
    use std::collections::BTreeSet;

    fn task(task_id: i64, status: TaskStatus, actual_owner: Option<&str>) -> TaskData {
        TaskData {
            task_id,
            created_on: None,
            process_instance_id: 1,
            process_id: "hiring".to_string(),
            container_id: "hr".to_string(),
            name: format!("task-{task_id}"),
            priority: 0,
            status,
            actual_owner: actual_owner.map(str::to_string),
            last_modification_date: None,
            input_data: None,
            potential_owners: BTreeSet::from([OrganizationalEntity::group("hr")]),
            planning_task: None,
        }
    }

    fn with_decision(mut task: TaskData, user: &str, index: i32, published: bool) -> TaskData {
        task.planning_task = Some(PlanningTask {
            task_id: task.task_id,
            assigned_user: user.to_string(),
            index,
            published,
        });
        task
    }

    fn chain_ids(solution: &ChainSolution, entity_id: &str) -> Vec<i64> {
        let resource = solution.find_resource(entity_id).unwrap();
        solution
            .chain_of(resource)
            .map(|k| solution.task(k).id())
            .collect()
    }

    fn pinned(solution: &ChainSolution, task_id: i64) -> bool {
        solution.task(solution.find_task(task_id).unwrap()).is_pinned()
    }

    fn build(tasks: Vec<TaskData>) -> ChainSolution {
        SolutionBuilder::new()
            .with_resources(vec![
                Resource::new(1, "alice").with_groups(["hr"]),
                Resource::new(2, "bob").with_groups(["hr"]),
            ])
            .with_tasks(tasks)
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_build_contains_only_fixed_entities() {
        let solution = SolutionBuilder::new().build().unwrap();
        assert_eq!(solution.task_count(), 2);
        assert_eq!(solution.resources().count(), 1);
        assert_eq!(
            chain_ids(&solution, PLANNING_USER_ENTITY_ID),
            vec![SENTINEL_TASK_ID, SECONDARY_SENTINEL_TASK_ID]
        );
    }

    #[test]
    fn test_ready_tasks_follow_decisions() {
        let solution = build(vec![
            with_decision(task(1, TaskStatus::Ready, None), "alice", 1, false),
            with_decision(task(2, TaskStatus::Ready, None), "alice", 0, false),
            task(3, TaskStatus::Ready, None),
            with_decision(task(4, TaskStatus::Ready, None), "nobody", 0, false),
        ]);

        assert_eq!(chain_ids(&solution, "alice"), vec![2, 1]);
        assert!(!pinned(&solution, 1));
        let unassigned: Vec<i64> = solution
            .unassigned_tasks()
            .map(|k| solution.task(k).id())
            .collect();
        assert_eq!(unassigned, vec![3, 4]);
        assert!(solution.find_resource("nobody").is_none());
    }

    #[test]
    fn test_pinned_tasks_come_first() {
        let solution = build(vec![
            with_decision(task(1, TaskStatus::Ready, None), "alice", 0, false),
            task(2, TaskStatus::InProgress, Some("alice")),
            with_decision(task(3, TaskStatus::Reserved, Some("alice")), "alice", 1, true),
        ]);

        assert_eq!(chain_ids(&solution, "alice"), vec![3, 2, 1]);
        assert!(pinned(&solution, 2));
        assert!(pinned(&solution, 3));
        assert!(!pinned(&solution, 1));

        let alice = solution.find_resource("alice").unwrap();
        let last = solution.find_task(1).unwrap();
        assert_eq!(solution.owner(last), Some(alice));
        assert_eq!(solution.start_time(last), Some(2));
    }

    #[test]
    fn test_reserved_pinning_rules() {
        let solution = build(vec![
            task(1, TaskStatus::Reserved, Some("alice")),
            with_decision(task(2, TaskStatus::Reserved, Some("bob")), "bob", 0, false),
            with_decision(task(3, TaskStatus::Reserved, Some("bob")), "alice", 0, false),
            task(4, TaskStatus::Suspended, Some("bob")),
            with_decision(task(5, TaskStatus::Reserved, Some(PLANNING_USER_ENTITY_ID)), "alice", 0, true),
        ]);

        assert!(pinned(&solution, 1));
        assert!(!pinned(&solution, 2));
        assert!(pinned(&solution, 3));
        assert!(pinned(&solution, 4));
        assert!(!pinned(&solution, 5));
        assert_eq!(
            chain_ids(&solution, PLANNING_USER_ENTITY_ID),
            vec![SENTINEL_TASK_ID, SECONDARY_SENTINEL_TASK_ID, 5]
        );
        assert_eq!(chain_ids(&solution, "bob"), vec![3, 4, 2]);
    }

    #[test]
    fn test_unknown_owner_becomes_resource() {
        let solution = build(vec![task(1, TaskStatus::InProgress, Some("carol"))]);

        let carol = solution.find_resource("carol").unwrap();
        assert_eq!(solution.resource(carol).id(), 3);
        assert_eq!(chain_ids(&solution, "carol"), vec![1]);
        // carol 不在候选组中，但已开始的任务仍固定在该用户名下
        assert!(!solution.accepts_current_owner(solution.find_task(1).unwrap()));
    }

    #[test]
    fn test_inactive_tasks_are_skipped() {
        let solution = build(vec![
            task(1, TaskStatus::Completed, Some("alice")),
            task(2, TaskStatus::Created, None),
            task(3, TaskStatus::Ready, None),
        ]);
        assert!(solution.find_task(1).is_none());
        assert!(solution.find_task(2).is_none());
        assert!(solution.find_task(3).is_some());
        assert!(solution.verify().is_ok());
    }
}
