//! 查询结果行到领域行结构的映射

use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use task_assigning_domain::{DecisionColumns, TaskRow};
use task_assigning_errors::{TaskAssigningError, TaskAssigningResult};

pub struct MappingHelpers;

impl MappingHelpers {
    /// 决策列全部来自 LEFT JOIN，`assigned_user` 为空表示没有决策
    pub fn parse_decision_sqlite(row: &SqliteRow) -> TaskAssigningResult<Option<DecisionColumns>> {
        let assigned_user: Option<String> = row.try_get("assigned_user")?;
        match assigned_user {
            Some(assigned_user) => Ok(Some(DecisionColumns {
                assigned_user,
                index: row.try_get::<Option<i32>, _>("task_index")?.unwrap_or(0),
                published: row.try_get::<Option<bool>, _>("published")?.unwrap_or(false),
            })),
            None => Ok(None),
        }
    }

    /// 摘要查询不连接所有者表，此时所有者列不存在
    pub fn row_to_task_row(row: &SqliteRow, with_owner: bool) -> TaskAssigningResult<TaskRow> {
        let (owner_id, owner_type) = if with_owner {
            (row.try_get("entity_id")?, row.try_get("entity_type")?)
        } else {
            (None, None)
        };

        Ok(TaskRow {
            task_id: row.try_get("task_id")?,
            created_on: row.try_get("created_on")?,
            process_instance_id: row.try_get("process_instance_id")?,
            process_id: row.try_get("process_id")?,
            container_id: row.try_get("container_id")?,
            name: row.try_get("name")?,
            priority: row.try_get("priority")?,
            status: row.try_get("status")?,
            actual_owner: row.try_get("actual_owner")?,
            last_modification_date: row.try_get("last_modification_date")?,
            decision: Self::parse_decision_sqlite(row)?,
            owner_id,
            owner_type,
        })
    }

    /// 解析输入变量，只保留字符串、数字和布尔值
    pub fn parse_input_data_sqlite(
        json_str: Option<&str>,
    ) -> TaskAssigningResult<Option<Map<String, Value>>> {
        let Some(json_str) = json_str.filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };

        let value: Value = serde_json::from_str(json_str)
            .map_err(|e| TaskAssigningError::Serialization(format!("解析输入变量失败: {e}")))?;
        match value {
            Value::Object(map) => Ok(Some(Self::simple_values(map))),
            Value::Null => Ok(None),
            other => Err(TaskAssigningError::Serialization(format!(
                "输入变量必须是JSON对象: {other}"
            ))),
        }
    }

    pub fn simple_values(map: Map<String, Value>) -> Map<String, Value> {
        map.into_iter()
            .filter(|(_, v)| matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_)))
            .collect()
    }
}
