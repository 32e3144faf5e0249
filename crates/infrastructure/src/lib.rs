//! 基于SQLite的基础设施实现
//!
//! 实现领域层定义的持久化上下文、任务生命周期服务和任务查询服务端口。

pub mod database;
pub mod error_handling;

pub use database::sqlite::{
    SqliteTaskQueryHelper, SqliteTaskRepository, SqliteUnitOfWork, SqliteUnitOfWorkFactory,
};
pub use database::{DatabaseManager, DbPool};
