use sqlx::SqlitePool;
use task_assigning_errors::TaskAssigningResult;
use tracing::{debug, instrument};

use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};
use crate::task_context;

const CREATE_TASKS: &str = r#"
    CREATE TABLE IF NOT EXISTS tasks (
        task_id INTEGER PRIMARY KEY,
        created_on DATETIME,
        process_instance_id INTEGER NOT NULL,
        process_id TEXT NOT NULL,
        container_id TEXT NOT NULL,
        name TEXT NOT NULL,
        priority INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL,
        actual_owner TEXT,
        last_modification_date DATETIME,
        input_data TEXT
    )
"#;

const CREATE_POTENTIAL_OWNERS: &str = r#"
    CREATE TABLE IF NOT EXISTS potential_owners (
        task_id INTEGER NOT NULL,
        entity_id TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        PRIMARY KEY (task_id, entity_id, entity_type),
        FOREIGN KEY (task_id) REFERENCES tasks(task_id) ON DELETE CASCADE
    )
"#;

// 决策与任务记录生命周期独立，不加外键
const CREATE_ASSIGNMENT_DECISIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS assignment_decisions (
        task_id INTEGER PRIMARY KEY,
        assigned_user TEXT NOT NULL,
        task_index INTEGER NOT NULL,
        published INTEGER NOT NULL DEFAULT 0,
        last_modification_date DATETIME NOT NULL
    )
"#;

const INDEXES: [&str; 4] = [
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_container_id ON tasks(container_id)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_last_modification_date ON tasks(last_modification_date)",
    "CREATE INDEX IF NOT EXISTS idx_assignment_decisions_user ON assignment_decisions(assigned_user)",
];

/// 创建全部表与索引，可重复执行
#[instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> TaskAssigningResult<()> {
    debug!("开始执行SQLite数据库迁移");

    let statements = [CREATE_TASKS, CREATE_POTENTIAL_OWNERS, CREATE_ASSIGNMENT_DECISIONS]
        .into_iter()
        .chain(INDEXES);

    for statement in statements {
        sqlx::query(statement).execute(pool).await.map_err(|e| {
            RepositoryErrorHelpers::database_error(task_context!(RepositoryOperation::Migrate), e)
        })?;
    }

    debug!("SQLite数据库迁移完成");
    Ok(())
}
