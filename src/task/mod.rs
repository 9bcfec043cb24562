//! Task definitions: model, cron helpers, and validation.

pub mod cron_expr;
pub mod model;
pub mod validate;

pub use model::{AlertMode, SelectorSet, Task};
pub use validate::{FieldError, NewTask, ParseResult, TaskDraft};
