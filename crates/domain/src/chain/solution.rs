use std::collections::HashMap;

use tracing::debug;

use super::model::{ChainNode, Resource, ResourceKey, TaskKey, WorkItem};
use super::sentinels::{placeholder_resource, sentinel_tasks};
use task_assigning_errors::{TaskAssigningError, TaskAssigningResult};

/// 一次 `previous` 改写，等待下一次传播处理
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingEdit {
    pub(crate) task: TaskKey,
    pub(crate) old_previous: Option<ChainNode>,
}

/// 持有所有资源与工作项的工作解
///
/// 占位资源与两个哨兵工作项总是存在，哨兵位于占位资源链的最前面。
#[derive(Debug, Clone)]
pub struct ChainSolution {
    pub(crate) resources: Vec<Resource>,
    pub(crate) tasks: Vec<WorkItem>,
    resource_by_entity: HashMap<String, ResourceKey>,
    task_by_id: HashMap<i64, TaskKey>,
    placeholder: ResourceKey,
    pub(crate) pending: Vec<PendingEdit>,
}

impl Default for ChainSolution {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainSolution {
    pub fn new() -> Self {
        let placeholder = placeholder_resource();
        let placeholder_key = ResourceKey(0);
        let mut solution = Self {
            resource_by_entity: HashMap::from([(
                placeholder.entity_id().to_string(),
                placeholder_key,
            )]),
            resources: vec![placeholder],
            tasks: Vec::new(),
            task_by_id: HashMap::new(),
            placeholder: placeholder_key,
            pending: Vec::new(),
        };

        // 哨兵在构造时锚定，之后不可再改写
        let mut previous = ChainNode::Resource(placeholder_key);
        for mut sentinel in sentinel_tasks() {
            let key = TaskKey(solution.tasks.len());
            sentinel.previous = Some(previous);
            solution.task_by_id.insert(sentinel.id(), key);
            solution.tasks.push(sentinel);
            previous = ChainNode::WorkItem(key);
        }
        for key in 0..solution.tasks.len() {
            solution.propagate_from(TaskKey(key));
        }
        solution
    }

    pub fn add_resource(&mut self, resource: Resource) -> TaskAssigningResult<ResourceKey> {
        if self.resource_by_entity.contains_key(resource.entity_id()) {
            return Err(TaskAssigningError::invariant(format!(
                "资源 {} 已存在",
                resource.entity_id()
            )));
        }
        let key = ResourceKey(self.resources.len());
        self.resource_by_entity
            .insert(resource.entity_id().to_string(), key);
        self.resources.push(resource);
        Ok(key)
    }

    /// 新加入的工作项未分配，需要通过 [`ChainSolution::set_previous`] 放入链中
    pub fn add_task(&mut self, task: WorkItem) -> TaskAssigningResult<TaskKey> {
        if self.task_by_id.contains_key(&task.id()) {
            return Err(TaskAssigningError::invariant(format!(
                "工作项 {} 已存在",
                task.id()
            )));
        }
        let key = TaskKey(self.tasks.len());
        let mut task = task;
        task.previous = None;
        task.next = None;
        task.owner = None;
        task.start_time = None;
        task.end_time = None;
        self.task_by_id.insert(task.id(), key);
        self.tasks.push(task);
        Ok(key)
    }

    pub fn placeholder(&self) -> ResourceKey {
        self.placeholder
    }

    pub fn find_resource(&self, entity_id: &str) -> Option<ResourceKey> {
        self.resource_by_entity.get(entity_id).copied()
    }

    pub fn find_task(&self, task_id: i64) -> Option<TaskKey> {
        self.task_by_id.get(&task_id).copied()
    }

    pub fn resource(&self, key: ResourceKey) -> &Resource {
        &self.resources[key.0]
    }

    pub fn task(&self, key: TaskKey) -> &WorkItem {
        &self.tasks[key.0]
    }

    /// 只允许修改属性，链结构字段只能通过 `set_previous` 与传播器修改
    pub fn task_mut(&mut self, key: TaskKey) -> &mut WorkItem {
        &mut self.tasks[key.0]
    }

    pub fn resource_mut(&mut self, key: ResourceKey) -> &mut Resource {
        &mut self.resources[key.0]
    }

    pub fn resources(&self) -> impl Iterator<Item = (ResourceKey, &Resource)> {
        self.resources
            .iter()
            .enumerate()
            .map(|(i, r)| (ResourceKey(i), r))
    }

    pub fn tasks(&self) -> impl Iterator<Item = (TaskKey, &WorkItem)> {
        self.tasks.iter().enumerate().map(|(i, t)| (TaskKey(i), t))
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn unassigned_tasks(&self) -> impl Iterator<Item = TaskKey> + '_ {
        self.tasks()
            .filter(|(_, t)| t.previous().is_none())
            .map(|(k, _)| k)
    }

    /// 唯一允许外部执行的结构性写操作
    ///
    /// 不修正 `next` 和派生字段，调用方在完成一组改写后必须调用
    /// [`ChainSolution::propagate`]。
    pub fn set_previous(
        &mut self,
        task: TaskKey,
        previous: Option<ChainNode>,
    ) -> TaskAssigningResult<()> {
        self.check_task_key(task)?;
        if let Some(node) = previous {
            self.check_node(node)?;
            if node == ChainNode::WorkItem(task) {
                return Err(TaskAssigningError::invariant(format!(
                    "工作项 {} 不能以自身为前驱",
                    self.tasks[task.0].id()
                )));
            }
        }
        self.tasks[task.0].check_mutable()?;

        let old_previous = self.tasks[task.0].previous;
        self.tasks[task.0].previous = previous;
        self.pending.push(PendingEdit { task, old_previous });
        debug!(
            task_id = self.tasks[task.0].id(),
            "工作项前驱已改写，等待传播"
        );
        Ok(())
    }

    pub fn previous(&self, task: TaskKey) -> Option<ChainNode> {
        self.tasks[task.0].previous
    }

    pub fn next_of(&self, node: ChainNode) -> Option<TaskKey> {
        match node {
            ChainNode::Resource(r) => self.resources[r.0].next,
            ChainNode::WorkItem(t) => self.tasks[t.0].next,
        }
    }

    pub fn owner(&self, task: TaskKey) -> Option<ResourceKey> {
        self.tasks[task.0].owner
    }

    pub fn start_time(&self, task: TaskKey) -> Option<i32> {
        self.tasks[task.0].start_time
    }

    pub fn end_time(&self, task: TaskKey) -> Option<i32> {
        self.tasks[task.0].end_time
    }

    pub fn is_first_in_chain(&self, task: TaskKey) -> bool {
        self.tasks[task.0].is_first_in_chain()
    }

    /// 当前所有者是占位资源，或是工作项的候选所有者
    pub fn accepts_current_owner(&self, task: TaskKey) -> bool {
        match self.tasks[task.0].owner {
            None => false,
            Some(owner) if owner == self.placeholder => true,
            Some(owner) => self.tasks[task.0].is_eligible_owner(&self.resources[owner.0]),
        }
    }

    /// 按顺序遍历资源的链
    pub fn chain_of(&self, resource: ResourceKey) -> ChainIter<'_> {
        ChainIter {
            solution: self,
            previous: ChainNode::Resource(resource),
            current: self.resources[resource.0].next,
            remaining: self.tasks.len(),
        }
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// 检查整个工作解上链不变量是否成立
    pub fn verify(&self) -> TaskAssigningResult<()> {
        for (key, task) in self.tasks() {
            let (expected_owner, expected_start) = match task.previous {
                None => (None, None),
                Some(node) => {
                    if self.next_of(node) != Some(key) {
                        return Err(TaskAssigningError::invariant(format!(
                            "工作项 {} 的前驱没有指回它",
                            task.id()
                        )));
                    }
                    match node {
                        ChainNode::Resource(r) => (Some(r), Some(0)),
                        ChainNode::WorkItem(p) => (self.tasks[p.0].owner, self.tasks[p.0].end_time),
                    }
                }
            };
            if task.owner != expected_owner {
                return Err(TaskAssigningError::invariant(format!(
                    "工作项 {} 的所有者与链锚点不一致",
                    task.id()
                )));
            }
            if task.start_time != expected_start {
                return Err(TaskAssigningError::invariant(format!(
                    "工作项 {} 的开始时间 {:?} 应为 {:?}",
                    task.id(),
                    task.start_time,
                    expected_start
                )));
            }
            if task.end_time != task.start_time.map(|s| task.end_time_from(s)) {
                return Err(TaskAssigningError::invariant(format!(
                    "工作项 {} 的结束时间不等于开始时间加耗时",
                    task.id()
                )));
            }
        }

        let dangling = self
            .resources()
            .map(|(k, r)| (ChainNode::Resource(k), r.next))
            .chain(self.tasks().map(|(k, t)| (ChainNode::WorkItem(k), t.next)))
            .find(|(node, next)| matches!(next, Some(n) if self.tasks[n.0].previous != Some(*node)));
        if let Some((node, _)) = dangling {
            return Err(TaskAssigningError::invariant(format!(
                "{} 的 next 指向的工作项并不以它为前驱",
                self.describe(node)
            )));
        }
        Ok(())
    }

    pub(crate) fn set_next(&mut self, node: ChainNode, next: Option<TaskKey>) {
        match node {
            ChainNode::Resource(r) => self.resources[r.0].next = next,
            ChainNode::WorkItem(t) => self.tasks[t.0].next = next,
        }
    }

    fn describe(&self, node: ChainNode) -> String {
        match node {
            ChainNode::Resource(r) => format!("资源 {}", self.resources[r.0].entity_id()),
            ChainNode::WorkItem(t) => format!("工作项 {}", self.tasks[t.0].id()),
        }
    }

    fn check_task_key(&self, task: TaskKey) -> TaskAssigningResult<()> {
        if task.0 >= self.tasks.len() {
            return Err(TaskAssigningError::UnknownChainNode {
                node: format!("{task:?}"),
            });
        }
        Ok(())
    }

    fn check_node(&self, node: ChainNode) -> TaskAssigningResult<()> {
        let exists = match node {
            ChainNode::Resource(r) => r.0 < self.resources.len(),
            ChainNode::WorkItem(t) => t.0 < self.tasks.len(),
        };
        if !exists {
            return Err(TaskAssigningError::UnknownChainNode {
                node: format!("{node:?}"),
            });
        }
        Ok(())
    }
}

/// 沿 `next` 遍历一条链，遇到不一致的反向指针即停止
pub struct ChainIter<'a> {
    solution: &'a ChainSolution,
    previous: ChainNode,
    current: Option<TaskKey>,
    remaining: usize,
}

impl Iterator for ChainIter<'_> {
    type Item = TaskKey;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        if self.remaining == 0 || self.solution.tasks[current.0].previous != Some(self.previous) {
            self.current = None;
            return None;
        }
        self.remaining -= 1;
        self.previous = ChainNode::WorkItem(current);
        self.current = self.solution.tasks[current.0].next;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::sentinels::{SECONDARY_SENTINEL_TASK_ID, SENTINEL_TASK_ID};
    use crate::entities::OrganizationalEntity;

    #[test]
    fn test_new_solution_anchors_sentinels_on_placeholder() {
        let solution = ChainSolution::new();
        let chain: Vec<i64> = solution
            .chain_of(solution.placeholder())
            .map(|k| solution.task(k).id())
            .collect();
        assert_eq!(chain, vec![SENTINEL_TASK_ID, SECONDARY_SENTINEL_TASK_ID]);

        for key in solution.chain_of(solution.placeholder()) {
            assert!(solution.accepts_current_owner(key));
        }
        assert!(solution.verify().is_ok());
        assert!(!solution.has_pending_changes());
    }

    #[test]
    fn test_sentinel_previous_cannot_be_reassigned() {
        let mut solution = ChainSolution::new();
        let sentinel = solution.find_task(SENTINEL_TASK_ID).unwrap();
        let err = solution.set_previous(sentinel, None).unwrap_err();
        assert!(matches!(err, TaskAssigningError::ImmutableEntity { .. }));
        assert!(!solution.has_pending_changes());
    }

    #[test]
    fn test_duplicate_entities_are_rejected() {
        let mut solution = ChainSolution::new();
        solution.add_resource(Resource::new(1, "alice")).unwrap();
        assert!(solution.add_resource(Resource::new(2, "alice")).is_err());
        assert!(solution
            .add_task(WorkItem::new(SENTINEL_TASK_ID, "clash", 0))
            .is_err());
    }

    #[test]
    fn test_self_loop_is_rejected() {
        let mut solution = ChainSolution::new();
        let a = solution.add_task(WorkItem::new(1, "A", 0)).unwrap();
        assert!(solution
            .set_previous(a, Some(ChainNode::WorkItem(a)))
            .is_err());
    }

    #[test]
    fn test_unknown_node_is_rejected() {
        let mut solution = ChainSolution::new();
        let a = solution.add_task(WorkItem::new(1, "A", 0)).unwrap();
        let err = solution
            .set_previous(a, Some(ChainNode::Resource(ResourceKey(99))))
            .unwrap_err();
        assert!(matches!(err, TaskAssigningError::UnknownChainNode { .. }));
    }

    #[test]
    fn test_accepts_current_owner() {
        let mut solution = ChainSolution::new();
        let alice = solution.add_resource(Resource::new(1, "alice")).unwrap();
        let bob = solution
            .add_resource(Resource::new(2, "bob").with_groups(["hr"]))
            .unwrap();
        let a = solution
            .add_task(
                WorkItem::new(1, "A", 0).with_eligible_owners([OrganizationalEntity::user("alice")]),
            )
            .unwrap();
        let b = solution
            .add_task(
                WorkItem::new(2, "B", 0).with_eligible_owners([OrganizationalEntity::group("hr")]),
            )
            .unwrap();
        let c = solution.add_task(WorkItem::new(3, "C", 0)).unwrap();

        assert!(!solution.accepts_current_owner(a));

        solution.set_previous(a, Some(ChainNode::Resource(alice))).unwrap();
        solution.set_previous(b, Some(ChainNode::Resource(bob))).unwrap();
        let last_sentinel = solution.find_task(SECONDARY_SENTINEL_TASK_ID).unwrap();
        solution
            .set_previous(c, Some(ChainNode::WorkItem(last_sentinel)))
            .unwrap();
        solution.propagate();

        assert!(solution.accepts_current_owner(a));
        assert!(solution.accepts_current_owner(b));
        assert_eq!(solution.owner(c), Some(solution.placeholder()));
        assert!(solution.accepts_current_owner(c));

        solution.set_previous(a, Some(ChainNode::Resource(bob))).unwrap();
        solution.set_previous(b, Some(ChainNode::WorkItem(a))).unwrap();
        solution.propagate();
        assert!(!solution.accepts_current_owner(a));
        assert!(solution.accepts_current_owner(b));
    }

    #[test]
    fn test_verify_detects_unpropagated_edit() {
        let mut solution = ChainSolution::new();
        let alice = solution.add_resource(Resource::new(1, "alice")).unwrap();
        let a = solution.add_task(WorkItem::new(1, "A", 0)).unwrap();
        solution.set_previous(a, Some(ChainNode::Resource(alice))).unwrap();

        let err = solution.verify().unwrap_err();
        assert!(matches!(err, TaskAssigningError::InvariantViolation(_)));

        solution.propagate();
        assert!(solution.verify().is_ok());
        assert!(solution.is_first_in_chain(a));
    }

    #[test]
    fn test_verify_handles_saturated_end_times() {
        let mut solution = ChainSolution::new();
        let alice = solution.add_resource(Resource::new(1, "alice")).unwrap();
        let a = solution
            .add_task(WorkItem::new(1, "A", 0).with_duration(i32::MAX).unwrap())
            .unwrap();
        let b = solution
            .add_task(WorkItem::new(2, "B", 0).with_duration(i32::MAX).unwrap())
            .unwrap();
        solution.set_previous(a, Some(ChainNode::Resource(alice))).unwrap();
        solution.set_previous(b, Some(ChainNode::WorkItem(a))).unwrap();
        solution.propagate();

        assert!(solution.verify().is_ok());

        // 结束时间被改写后不再等于开始时间加耗时
        solution.tasks[b.0].end_time = Some(0);
        assert!(solution.verify().is_err());
    }
}
