//! 任务分配服务
//!
//! 命令行程序使用的应用组装层，集成测试也通过这里驱动整个系统。

pub mod app;

pub use app::{known_resources, render_chains, Application};
