//! tsgate Tasks: bucket lifecycle and periodic task registration.

pub mod bucket;
pub mod registrar;

pub use bucket::BucketLifecycle;
pub use registrar::{render_task_script, TaskRegistrar, TaskRequest};
