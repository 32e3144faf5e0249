use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::entities::{OrganizationalEntity, TaskStatus, TypedLabel};
use task_assigning_errors::{TaskAssigningError, TaskAssigningResult};

/// 所有工作项默认耗时1分钟
pub const DEFAULT_DURATION: i32 = 1;

/// 资源在 arena 中的索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(pub(crate) usize);

/// 工作项在 arena 中的索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey(pub(crate) usize);

/// 链上可导航的节点：锚点资源或工作项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainNode {
    Resource(ResourceKey),
    WorkItem(TaskKey),
}

/// 链的锚点
#[derive(Debug, Clone)]
pub struct Resource {
    id: i64,
    entity_id: String,
    groups: BTreeSet<String>,
    labels: BTreeSet<TypedLabel>,
    immutable: bool,
    pub(crate) next: Option<TaskKey>,
}

impl Resource {
    pub fn new<S: Into<String>>(id: i64, entity_id: S) -> Self {
        Self {
            id,
            entity_id: entity_id.into(),
            groups: BTreeSet::new(),
            labels: BTreeSet::new(),
            immutable: false,
            next: None,
        }
    }

    pub(crate) fn new_immutable<S: Into<String>>(id: i64, entity_id: S) -> Self {
        Self {
            immutable: true,
            ..Self::new(id, entity_id)
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_labels<I: IntoIterator<Item = TypedLabel>>(mut self, labels: I) -> Self {
        self.labels = labels.into_iter().collect();
        self
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    pub fn labels(&self) -> &BTreeSet<TypedLabel> {
        &self.labels
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// 链上第一个工作项
    pub fn next(&self) -> Option<TaskKey> {
        self.next
    }

    pub fn add_group<S: Into<String>>(&mut self, group: S) -> TaskAssigningResult<()> {
        self.check_mutable()?;
        self.groups.insert(group.into());
        Ok(())
    }

    fn check_mutable(&self) -> TaskAssigningResult<()> {
        if self.immutable {
            return Err(TaskAssigningError::immutable(format!(
                "资源 {}",
                self.entity_id
            )));
        }
        Ok(())
    }
}

/// 链上的工作项
#[derive(Debug, Clone)]
pub struct WorkItem {
    id: i64,
    process_instance_id: i64,
    process_id: String,
    container_id: String,
    name: String,
    priority: i32,
    status: TaskStatus,
    input_data: Map<String, Value>,
    pinned: bool,
    published: bool,
    eligible_owners: BTreeSet<OrganizationalEntity>,
    labels: BTreeSet<TypedLabel>,
    duration: i32,
    immutable: bool,
    pub(crate) previous: Option<ChainNode>,
    pub(crate) next: Option<TaskKey>,
    pub(crate) owner: Option<ResourceKey>,
    pub(crate) start_time: Option<i32>,
    pub(crate) end_time: Option<i32>,
}

impl WorkItem {
    pub fn new<S: Into<String>>(id: i64, name: S, priority: i32) -> Self {
        Self {
            id,
            process_instance_id: 0,
            process_id: String::new(),
            container_id: String::new(),
            name: name.into(),
            priority,
            status: TaskStatus::Ready,
            input_data: Map::new(),
            pinned: false,
            published: false,
            eligible_owners: BTreeSet::new(),
            labels: BTreeSet::new(),
            duration: DEFAULT_DURATION,
            immutable: false,
            previous: None,
            next: None,
            owner: None,
            start_time: None,
            end_time: None,
        }
    }

    pub(crate) fn new_immutable<S: Into<String>>(
        id: i64,
        name: S,
        eligible_owners: BTreeSet<OrganizationalEntity>,
    ) -> Self {
        Self {
            pinned: true,
            eligible_owners,
            immutable: true,
            ..Self::new(id, name, 0)
        }
    }

    pub fn with_process(
        mut self,
        process_instance_id: i64,
        process_id: impl Into<String>,
        container_id: impl Into<String>,
    ) -> Self {
        self.process_instance_id = process_instance_id;
        self.process_id = process_id.into();
        self.container_id = container_id.into();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_input_data(mut self, input_data: Map<String, Value>) -> Self {
        self.input_data = input_data;
        self
    }

    pub fn with_pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    pub fn with_published(mut self, published: bool) -> Self {
        self.published = published;
        self
    }

    pub fn with_eligible_owners<I: IntoIterator<Item = OrganizationalEntity>>(
        mut self,
        owners: I,
    ) -> Self {
        self.eligible_owners = owners.into_iter().collect();
        self
    }

    pub fn with_labels<I: IntoIterator<Item = TypedLabel>>(mut self, labels: I) -> Self {
        self.labels = labels.into_iter().collect();
        self
    }

    /// 耗时必须为正数
    pub fn with_duration(mut self, duration: i32) -> TaskAssigningResult<Self> {
        if duration <= 0 {
            return Err(TaskAssigningError::invariant(format!(
                "工作项 {} 的耗时必须为正数: {}",
                self.id, duration
            )));
        }
        self.duration = duration;
        Ok(self)
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn process_instance_id(&self) -> i64 {
        self.process_instance_id
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn input_data(&self) -> &Map<String, Value> {
        &self.input_data
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn is_published(&self) -> bool {
        self.published
    }

    pub fn eligible_owners(&self) -> &BTreeSet<OrganizationalEntity> {
        &self.eligible_owners
    }

    pub fn labels(&self) -> &BTreeSet<TypedLabel> {
        &self.labels
    }

    pub fn duration(&self) -> i32 {
        self.duration
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// 从 `start` 开始执行时的结束时间，溢出时取 `i32::MAX`
    pub fn end_time_from(&self, start: i32) -> i32 {
        start.saturating_add(self.duration)
    }

    pub fn previous(&self) -> Option<ChainNode> {
        self.previous
    }

    pub fn next(&self) -> Option<TaskKey> {
        self.next
    }

    pub fn owner(&self) -> Option<ResourceKey> {
        self.owner
    }

    pub fn start_time(&self) -> Option<i32> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<i32> {
        self.end_time
    }

    /// 前驱为资源时即为链上第一个工作项
    pub fn is_first_in_chain(&self) -> bool {
        matches!(self.previous, Some(ChainNode::Resource(_)))
    }

    pub fn set_priority(&mut self, priority: i32) -> TaskAssigningResult<()> {
        self.check_mutable()?;
        self.priority = priority;
        Ok(())
    }

    pub fn set_status(&mut self, status: TaskStatus) -> TaskAssigningResult<()> {
        self.check_mutable()?;
        self.status = status;
        Ok(())
    }

    pub fn set_pinned(&mut self, pinned: bool) -> TaskAssigningResult<()> {
        self.check_mutable()?;
        self.pinned = pinned;
        Ok(())
    }

    pub fn set_published(&mut self, published: bool) -> TaskAssigningResult<()> {
        self.check_mutable()?;
        self.published = published;
        Ok(())
    }

    /// 返回实体此前是否不存在
    pub fn add_eligible_owner(&mut self, owner: OrganizationalEntity) -> TaskAssigningResult<bool> {
        self.check_mutable()?;
        Ok(self.eligible_owners.insert(owner))
    }

    /// 资源本身或其所属的任一用户组是否为候选所有者
    pub fn is_eligible_owner(&self, resource: &Resource) -> bool {
        self.eligible_owners.iter().any(|entity| match entity {
            OrganizationalEntity::User(id) => id == resource.entity_id(),
            OrganizationalEntity::Group(group) => resource.groups().contains(group),
        })
    }

    pub(crate) fn check_mutable(&self) -> TaskAssigningResult<()> {
        if self.immutable {
            return Err(TaskAssigningError::immutable(format!(
                "工作项 {} ({})",
                self.name, self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_item_defaults() {
        let item = WorkItem::new(1, "review", 3);
        assert_eq!(item.duration(), DEFAULT_DURATION);
        assert!(!item.is_pinned());
        assert!(!item.is_first_in_chain());
        assert_eq!(item.owner(), None);
        assert_eq!(item.start_time(), None);
    }

    #[test]
    fn test_is_eligible_owner_by_user_or_group() {
        let item = WorkItem::new(1, "review", 0).with_eligible_owners([
            OrganizationalEntity::user("alice"),
            OrganizationalEntity::group("hr"),
        ]);

        assert!(item.is_eligible_owner(&Resource::new(1, "alice")));
        assert!(item.is_eligible_owner(&Resource::new(2, "bob").with_groups(["hr"])));
        assert!(!item.is_eligible_owner(&Resource::new(3, "carol").with_groups(["it"])));
    }

    #[test]
    fn test_immutable_work_item_rejects_mutation() {
        let mut item = WorkItem::new_immutable(-1, "sentinel", BTreeSet::new());
        assert!(item.set_priority(5).is_err());
        assert!(item.set_pinned(false).is_err());
        assert!(item
            .add_eligible_owner(OrganizationalEntity::user("alice"))
            .is_err());
        assert_eq!(item.priority(), 0);
        assert!(item.is_pinned());
    }

    #[test]
    fn test_add_eligible_owner_is_idempotent() {
        let mut item = WorkItem::new(1, "review", 0);
        assert!(item.add_eligible_owner(OrganizationalEntity::user("alice")).unwrap());
        assert!(!item.add_eligible_owner(OrganizationalEntity::user("alice")).unwrap());
        assert_eq!(item.eligible_owners().len(), 1);
    }

    #[test]
    fn test_with_duration_rejects_non_positive() {
        assert!(WorkItem::new(1, "review", 0).with_duration(0).is_err());
        assert!(WorkItem::new(1, "review", 0).with_duration(-3).is_err());
        let item = WorkItem::new(1, "review", 0).with_duration(4).unwrap();
        assert_eq!(item.duration(), 4);
    }

    #[test]
    fn test_end_time_saturates() {
        let item = WorkItem::new(1, "review", 0).with_duration(i32::MAX).unwrap();
        assert_eq!(item.end_time_from(0), i32::MAX);
        assert_eq!(item.end_time_from(10), i32::MAX);
    }

    #[test]
    fn test_immutable_resource_rejects_mutation() {
        let mut resource = Resource::new_immutable(-1, "planning_user");
        let err = resource.add_group("hr").unwrap_err();
        assert!(err.is_programming_error());
        assert!(resource.groups().is_empty());
    }
}
