use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use task_assigning_domain::{
    materialize_summaries, materialize_tasks, FindTasksQuery, OwnerMode, TaskData,
    TaskDataSummary, TaskInputVariablesReadMode, TaskQueryService, TaskRow, TaskStatus,
};
use task_assigning_errors::TaskAssigningResult;
use tracing::{debug, instrument};

use super::task_query_builder::{bind_query_params, TaskQueryBuilder};
use crate::{
    database::mapping::MappingHelpers,
    error_handling::{RepositoryErrorHelpers, RepositoryOperation},
    task_context,
};

/// 基于SQLite的任务查询：读取扁平结果行后交给物化器
pub struct SqliteTaskQueryHelper {
    pool: SqlitePool,
}

impl SqliteTaskQueryHelper {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn read_summary_page(
        &self,
        from_task_id: i64,
        statuses: &[TaskStatus],
        page_size: u32,
    ) -> TaskAssigningResult<Vec<TaskDataSummary>> {
        let context = task_context!(RepositoryOperation::BatchRead)
            .with_additional_info(format!("从任务 {} 开始读取摘要", from_task_id));
        let (sql, params) = TaskQueryBuilder::build_summary_query(from_task_id, statuses, page_size);

        let rows = bind_query_params(sqlx::query(&sql), &params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        let task_rows = rows
            .iter()
            .map(|row| MappingHelpers::row_to_task_row(row, false))
            .collect::<TaskAssigningResult<Vec<TaskRow>>>()?;
        materialize_summaries(&task_rows)
    }
}

#[async_trait]
impl TaskQueryService for SqliteTaskQueryHelper {
    #[instrument(skip(self), fields(page = query.page, page_size = query.page_size))]
    async fn find_tasks(&self, query: &FindTasksQuery) -> TaskAssigningResult<Vec<TaskData>> {
        let context = task_context!(RepositoryOperation::Query);
        let (sql, params) = TaskQueryBuilder::build_find_tasks_query(query);

        let rows = bind_query_params(sqlx::query(&sql), &params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        let owner_mode = query.owner_mode();
        let mut task_rows = Vec::with_capacity(rows.len());
        let mut raw_inputs: HashMap<i64, Option<String>> = HashMap::new();
        for row in &rows {
            let task_row = MappingHelpers::row_to_task_row(row, owner_mode == OwnerMode::Read)?;
            if query.input_variables_mode != TaskInputVariablesReadMode::DontRead
                && !raw_inputs.contains_key(&task_row.task_id)
            {
                raw_inputs.insert(task_row.task_id, row.try_get("input_data")?);
            }
            task_rows.push(task_row);
        }

        let mut tasks = materialize_tasks(&task_rows, owner_mode)?;
        for task in tasks.iter_mut() {
            if !query.input_variables_mode.should_read(task) {
                continue;
            }
            let raw = raw_inputs.get(&task.task_id).and_then(|raw| raw.as_deref());
            task.input_data = MappingHelpers::parse_input_data_sqlite(raw).map_err(|e| {
                RepositoryErrorHelpers::serialization_error(
                    task_context!(RepositoryOperation::Read, task_id = task.task_id),
                    e,
                )
            })?;
        }

        debug!("查询任务成功: {} 行结果，{} 个任务", rows.len(), tasks.len());
        Ok(tasks)
    }

    #[instrument(skip(self, statuses))]
    async fn read_tasks_data_summary(
        &self,
        from_task_id: i64,
        statuses: &[TaskStatus],
        page_size: u32,
    ) -> TaskAssigningResult<Vec<TaskDataSummary>> {
        let mut summaries = Vec::new();
        let mut next_from = from_task_id;
        let mut pages = 0;

        loop {
            let page = self.read_summary_page(next_from, statuses, page_size).await?;
            let Some(last) = page.last() else {
                break;
            };
            next_from = last.task_id + 1;
            pages += 1;
            summaries.extend(page);
        }

        debug!("读取任务摘要完成: {} 页，{} 个任务", pages, summaries.len());
        Ok(summaries)
    }
}
