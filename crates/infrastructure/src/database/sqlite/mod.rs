pub mod sqlite_task_query_helper;
pub mod sqlite_task_repository;
pub mod sqlite_unit_of_work;
pub mod task_query_builder;

pub use sqlite_task_query_helper::SqliteTaskQueryHelper;
pub use sqlite_task_repository::SqliteTaskRepository;
pub use sqlite_unit_of_work::{SqliteUnitOfWork, SqliteUnitOfWorkFactory};
