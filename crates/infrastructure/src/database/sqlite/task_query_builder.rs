use chrono::{DateTime, Utc};
use sqlx::sqlite::{Sqlite, SqliteArguments};
use task_assigning_domain::{FindTasksQuery, TaskStatus};

const TASK_COLUMNS: &str = "t.task_id, t.created_on, t.process_instance_id, t.process_id, \
     t.container_id, t.name, t.priority, t.status, t.actual_owner, t.last_modification_date, \
     t.input_data, d.assigned_user, d.task_index, d.published";

/// 任务查询SQL构建
///
/// 分页作用在任务上而不是结果行上：子查询先选出一页任务ID，外层再连接所有者
/// 和决策。结果按任务ID排序，同一任务的行保持相邻。
pub struct TaskQueryBuilder;

impl TaskQueryBuilder {
    pub fn build_find_tasks_query(query: &FindTasksQuery) -> (String, Vec<TaskQueryParam>) {
        let mut params = Vec::new();
        let mut filter = "SELECT task_id FROM tasks WHERE 1=1".to_string();

        if let Some(from) = query.from_task_id {
            filter.push_str(" AND task_id >= ?");
            params.push(TaskQueryParam::Int64(from));
        }
        if let Some(to) = query.to_task_id {
            filter.push_str(" AND task_id <= ?");
            params.push(TaskQueryParam::Int64(to));
        }
        Self::push_status_filter(&mut filter, &mut params, &query.statuses);
        if let Some(date) = query.from_last_modification_date {
            filter.push_str(" AND last_modification_date >= ?");
            params.push(TaskQueryParam::DateTime(date));
        }

        filter.push_str(" ORDER BY task_id LIMIT ? OFFSET ?");
        params.push(TaskQueryParam::Int64(query.page_size as i64));
        params.push(TaskQueryParam::Int64(query.offset()));

        let sql = if query.skip_potential_owners {
            format!(
                "SELECT {TASK_COLUMNS} \
                 FROM tasks t \
                 LEFT JOIN assignment_decisions d ON d.task_id = t.task_id \
                 WHERE t.task_id IN ({filter}) \
                 ORDER BY t.task_id"
            )
        } else {
            format!(
                "SELECT {TASK_COLUMNS}, po.entity_id, po.entity_type \
                 FROM tasks t \
                 LEFT JOIN assignment_decisions d ON d.task_id = t.task_id \
                 LEFT JOIN potential_owners po ON po.task_id = t.task_id \
                 WHERE t.task_id IN ({filter}) \
                 ORDER BY t.task_id, po.entity_type, po.entity_id"
            )
        };
        (sql, params)
    }

    /// 摘要分页按任务ID游标推进，不读取所有者
    pub fn build_summary_query(
        from_task_id: i64,
        statuses: &[TaskStatus],
        page_size: u32,
    ) -> (String, Vec<TaskQueryParam>) {
        let mut params = vec![TaskQueryParam::Int64(from_task_id)];
        let mut filter = "SELECT task_id FROM tasks WHERE task_id >= ?".to_string();
        Self::push_status_filter(&mut filter, &mut params, statuses);
        filter.push_str(" ORDER BY task_id LIMIT ?");
        params.push(TaskQueryParam::Int64(page_size as i64));

        let sql = format!(
            "SELECT {TASK_COLUMNS} \
             FROM tasks t \
             LEFT JOIN assignment_decisions d ON d.task_id = t.task_id \
             WHERE t.task_id IN ({filter}) \
             ORDER BY t.task_id"
        );
        (sql, params)
    }

    fn push_status_filter(
        filter: &mut String,
        params: &mut Vec<TaskQueryParam>,
        statuses: &[TaskStatus],
    ) {
        if statuses.is_empty() {
            return;
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        filter.push_str(&format!(" AND status IN ({placeholders})"));
        params.extend(statuses.iter().copied().map(TaskQueryParam::Status));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskQueryParam {
    Int64(i64),
    Status(TaskStatus),
    DateTime(DateTime<Utc>),
}

pub fn bind_query_params<'q>(
    mut query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [TaskQueryParam],
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            TaskQueryParam::Int64(value) => query.bind(*value),
            TaskQueryParam::Status(status) => query.bind(status.as_str()),
            TaskQueryParam::DateTime(date) => query.bind(*date),
        };
    }
    query
}
