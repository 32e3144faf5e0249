//! 派生字段传播
//!
//! `previous` 改写后，沿链向下重新计算 `owner`、`start_time`、`end_time`，
//! 并修正前驱的 `next` 指针。某个工作项的派生值没有变化时停止。

use tracing::{debug, warn};

use super::model::{ChainNode, TaskKey};
use super::solution::ChainSolution;

impl ChainSolution {
    /// 处理自上次传播以来记录的全部 `previous` 改写
    ///
    /// 返回派生值发生变化的工作项数量。
    pub fn propagate(&mut self) -> usize {
        let edits = std::mem::take(&mut self.pending);
        if edits.is_empty() {
            return 0;
        }

        // 旧前驱如果仍指向已移走的工作项，先断开
        for edit in &edits {
            if let Some(old) = edit.old_previous {
                if self.next_of(old) == Some(edit.task)
                    && self.tasks[edit.task.0].previous != Some(old)
                {
                    self.set_next(old, None);
                }
            }
        }

        let updated: usize = edits
            .iter()
            .map(|edit| self.propagate_from(edit.task))
            .sum();
        debug!(edits = edits.len(), updated, "链传播完成");
        updated
    }

    /// 从给定工作项开始向下游传播
    ///
    /// 只处理这一个工作项所在的链，不会断开旧前驱的 `next`，也不清空待处理的改写记录。
    pub fn propagate_from(&mut self, task: TaskKey) -> usize {
        let mut current = task;
        let mut updated = 0;
        let mut steps = 0;

        loop {
            steps += 1;
            if steps > self.tasks.len() {
                warn!(
                    task_id = self.tasks[task.0].id(),
                    "传播步数超过工作项总数，链中可能存在环"
                );
                break;
            }

            let previous = self.tasks[current.0].previous;
            let (owner, start_time) = match previous {
                None => (None, None),
                Some(node) => {
                    self.set_next(node, Some(current));
                    match node {
                        ChainNode::Resource(resource) => (Some(resource), Some(0)),
                        ChainNode::WorkItem(p) => {
                            (self.tasks[p.0].owner, self.tasks[p.0].end_time)
                        }
                    }
                }
            };

            let item = &mut self.tasks[current.0];
            let end_time = start_time.map(|start| item.end_time_from(start));
            if item.owner == owner && item.start_time == start_time && item.end_time == end_time {
                break;
            }
            item.owner = owner;
            item.start_time = start_time;
            item.end_time = end_time;
            updated += 1;

            let next = item.next;
            match next {
                Some(next) if self.tasks[next.0].previous == Some(ChainNode::WorkItem(current)) => {
                    current = next;
                }
                Some(_) => {
                    self.tasks[current.0].next = None;
                    break;
                }
                None => break,
            }
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use crate::chain::model::{ChainNode, Resource, ResourceKey, TaskKey, WorkItem};
    use crate::chain::solution::ChainSolution;

    fn chain_ids(solution: &ChainSolution, resource: ResourceKey) -> Vec<i64> {
        solution
            .chain_of(resource)
            .map(|k| solution.task(k).id())
            .collect()
    }

    fn times(solution: &ChainSolution, tasks: &[TaskKey]) -> Vec<(Option<i32>, Option<i32>)> {
        tasks
            .iter()
            .map(|k| (solution.start_time(*k), solution.end_time(*k)))
            .collect()
    }

    /// R -> A -> B -> C
    fn build_chain() -> (ChainSolution, ResourceKey, [TaskKey; 3]) {
        let mut solution = ChainSolution::new();
        let r = solution.add_resource(Resource::new(1, "alice")).unwrap();
        let a = solution.add_task(WorkItem::new(1, "A", 0)).unwrap();
        let b = solution.add_task(WorkItem::new(2, "B", 0)).unwrap();
        let c = solution.add_task(WorkItem::new(3, "C", 0)).unwrap();
        solution.set_previous(a, Some(ChainNode::Resource(r))).unwrap();
        solution.set_previous(b, Some(ChainNode::WorkItem(a))).unwrap();
        solution.set_previous(c, Some(ChainNode::WorkItem(b))).unwrap();
        solution.propagate();
        (solution, r, [a, b, c])
    }

    #[test]
    fn test_chain_timing() {
        let (solution, r, tasks) = build_chain();

        assert_eq!(chain_ids(&solution, r), vec![1, 2, 3]);
        assert_eq!(
            times(&solution, &tasks),
            vec![(Some(0), Some(1)), (Some(1), Some(2)), (Some(2), Some(3))]
        );
        for task in tasks {
            assert_eq!(solution.owner(task), Some(r));
        }
        assert!(solution.verify().is_ok());
    }

    #[test]
    fn test_insert_in_middle_shifts_downstream() {
        let (mut solution, r, [a, b, c]) = build_chain();
        let x = solution.add_task(WorkItem::new(4, "X", 0)).unwrap();

        solution.set_previous(x, Some(ChainNode::WorkItem(a))).unwrap();
        solution.set_previous(b, Some(ChainNode::WorkItem(x))).unwrap();
        solution.propagate();

        assert_eq!(chain_ids(&solution, r), vec![1, 4, 2, 3]);
        assert_eq!(
            times(&solution, &[a, x, b, c]),
            vec![
                (Some(0), Some(1)),
                (Some(1), Some(2)),
                (Some(2), Some(3)),
                (Some(3), Some(4))
            ]
        );
        assert_eq!(solution.owner(x), Some(r));
        assert!(solution.verify().is_ok());
    }

    #[test]
    fn test_insert_in_middle_is_order_independent() {
        let (mut solution, r, [_, b, c]) = build_chain();
        let a = solution.find_task(1).unwrap();
        let x = solution.add_task(WorkItem::new(4, "X", 0)).unwrap();

        solution.set_previous(b, Some(ChainNode::WorkItem(x))).unwrap();
        solution.set_previous(x, Some(ChainNode::WorkItem(a))).unwrap();
        solution.propagate();

        assert_eq!(chain_ids(&solution, r), vec![1, 4, 2, 3]);
        assert_eq!(solution.end_time(c), Some(4));
        assert!(solution.verify().is_ok());
    }

    #[test]
    fn test_unassign_first_task() {
        let (mut solution, r, [a, b, c]) = build_chain();

        solution.set_previous(a, None).unwrap();
        solution.set_previous(b, Some(ChainNode::Resource(r))).unwrap();
        solution.propagate();

        assert_eq!(chain_ids(&solution, r), vec![2, 3]);
        assert_eq!(solution.owner(a), None);
        assert_eq!(solution.start_time(a), None);
        assert_eq!(solution.end_time(a), None);
        assert_eq!(
            times(&solution, &[b, c]),
            vec![(Some(0), Some(1)), (Some(1), Some(2))]
        );
        assert!(solution.unassigned_tasks().any(|k| k == a));
        assert!(solution.verify().is_ok());
    }

    #[test]
    fn test_move_tail_to_other_resource() {
        let (mut solution, r, [a, b, c]) = build_chain();
        let bob = solution.add_resource(Resource::new(2, "bob")).unwrap();

        solution.set_previous(b, Some(ChainNode::Resource(bob))).unwrap();
        solution.propagate();

        assert_eq!(chain_ids(&solution, r), vec![1]);
        assert_eq!(chain_ids(&solution, bob), vec![2, 3]);
        assert_eq!(solution.task(a).next(), None);
        assert_eq!(solution.owner(c), Some(bob));
        assert_eq!(times(&solution, &[b, c]), vec![(Some(0), Some(1)), (Some(1), Some(2))]);
        assert!(solution.verify().is_ok());
    }

    #[test]
    fn test_duration_drives_end_time() {
        let mut solution = ChainSolution::new();
        let r = solution.add_resource(Resource::new(1, "alice")).unwrap();
        let a = solution
            .add_task(WorkItem::new(1, "A", 0).with_duration(5).unwrap())
            .unwrap();
        let b = solution.add_task(WorkItem::new(2, "B", 0)).unwrap();
        solution.set_previous(a, Some(ChainNode::Resource(r))).unwrap();
        solution.set_previous(b, Some(ChainNode::WorkItem(a))).unwrap();
        solution.propagate();

        assert_eq!(times(&solution, &[a, b]), vec![(Some(0), Some(5)), (Some(5), Some(6))]);
    }

    #[test]
    fn test_huge_duration_saturates_downstream_times() {
        let mut solution = ChainSolution::new();
        let r = solution.add_resource(Resource::new(1, "alice")).unwrap();
        let a = solution
            .add_task(WorkItem::new(1, "A", 0).with_duration(i32::MAX).unwrap())
            .unwrap();
        let b = solution.add_task(WorkItem::new(2, "B", 0)).unwrap();
        solution.set_previous(a, Some(ChainNode::Resource(r))).unwrap();
        solution.set_previous(b, Some(ChainNode::WorkItem(a))).unwrap();
        solution.propagate();

        assert_eq!(
            times(&solution, &[a, b]),
            vec![(Some(0), Some(i32::MAX)), (Some(i32::MAX), Some(i32::MAX))]
        );
        assert!(solution.verify().is_ok());
    }

    #[test]
    fn test_propagate_from_single_item() {
        let mut solution = ChainSolution::new();
        let r = solution.add_resource(Resource::new(1, "alice")).unwrap();
        let a = solution
            .add_task(WorkItem::new(1, "A", 0).with_duration(3).unwrap())
            .unwrap();
        let b = solution.add_task(WorkItem::new(2, "B", 0)).unwrap();
        solution.set_previous(a, Some(ChainNode::Resource(r))).unwrap();
        solution.set_previous(b, Some(ChainNode::WorkItem(a))).unwrap();

        assert_eq!(solution.propagate_from(a), 1);
        assert_eq!(solution.start_time(b), None);

        assert_eq!(solution.propagate_from(b), 1);
        assert_eq!(times(&solution, &[a, b]), vec![(Some(0), Some(3)), (Some(3), Some(4))]);
        assert_eq!(chain_ids(&solution, r), vec![1, 2]);

        // 改写记录仍在，批量传播时已无变化
        assert_eq!(solution.propagate(), 0);
        assert!(solution.verify().is_ok());
    }

    #[test]
    fn test_unchanged_edit_updates_nothing() {
        let (mut solution, r, [a, _, _]) = build_chain();
        solution.set_previous(a, Some(ChainNode::Resource(r))).unwrap();
        assert_eq!(solution.propagate(), 0);
        assert_eq!(solution.propagate(), 0);
        assert!(solution.verify().is_ok());
    }

    #[test]
    fn test_cycle_terminates() {
        let (mut solution, _, [a, b, c]) = build_chain();
        // 人为构造环：A 以 C 为前驱
        solution.set_previous(a, Some(ChainNode::WorkItem(c))).unwrap();
        solution.propagate();

        assert!(solution.verify().is_err());
        assert_eq!(solution.previous(b), Some(ChainNode::WorkItem(a)));
    }
}
