//! # Task Assigning Testing Utils
//!
//! Shared testing utilities for the task assigning workspace.
//!
//! ## Features
//!
//! - **In-memory store**: implements the task query service, the unit of work
//!   factory and, through its units of work, the persistence context and the
//!   task lifecycle service, with call counters for persistence assertions
//! - **Test Data Builders**: `TaskData` and `PlanningItem` with sensible defaults
//! - **Helpers**: test logging setup and time utilities
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! task-assigning-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
