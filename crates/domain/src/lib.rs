//! 任务分配领域模型
//!
//! 包含分配链模型、链时间传播、查询结果行物化、解决方案构建以及外部协作者端口。

pub mod chain;
pub mod entities;
pub mod materializer;
pub mod ports;
pub mod solution_builder;

pub use chain::*;
pub use entities::*;
pub use materializer::*;
pub use ports::*;
pub use solution_builder::SolutionBuilder;
pub use task_assigning_errors::{TaskAssigningError, TaskAssigningResult};
