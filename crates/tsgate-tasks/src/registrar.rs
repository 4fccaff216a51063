//! Periodic downsampling/alerting task registration.
//!
//! A task script has no runtime parameters, so the tenant-derived values
//! are declared once in a `params` record of escaped string literals and
//! the pipeline below it only ever refers to `params.*`.

use std::sync::Arc;

use tracing::{debug, info};
use tsgate_core::{Error, FluxDuration, Result, TaskCollisionPolicy};
use tsgate_engine::{flux, EngineClient, TaskDefinition};
use tsgate_query::Predicate;

use crate::bucket::BucketLifecycle;

/// Pipeline shared by every tenant task. `{predicate}` is the only
/// substitution.
const TASK_PIPELINE: &str = "from(bucket: params.source)
  |> range(start: -task.every)
  |> filter(fn: (r) => r.tenant_id == params.tenant_id)
  |> filter(fn: (r) => {predicate})
  |> to(bucket: params.sink)";

/// One registration request.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub tenant_id: String,
    pub source_bucket: String,
    pub sink_bucket: String,
    pub schedule: FluxDuration,
    pub predicate: Predicate,
}

/// Name of the task owned by `tenant_id`.
pub fn task_name(tenant_id: &str) -> String {
    format!("{}_task", tenant_id)
}

/// Render the complete task script, `option task` header included.
pub fn render_task_script(request: &TaskRequest) -> Result<String> {
    let predicate = request.predicate.render_literal()?;
    let header = format!(
        "option task = {{name: {}, every: {}}}",
        flux::string_literal(&task_name(&request.tenant_id)),
        request.schedule
    );
    let params = format!(
        "params = {{tenant_id: {}, source: {}, sink: {}}}",
        flux::string_literal(&request.tenant_id),
        flux::string_literal(&request.source_bucket),
        flux::string_literal(&request.sink_bucket)
    );
    let pipeline = TASK_PIPELINE.replace("{predicate}", &predicate);
    Ok(format!("{}\n\n{}\n\n{}\n", header, params, pipeline))
}

pub struct TaskRegistrar {
    engine: Arc<dyn EngineClient>,
    buckets: Arc<BucketLifecycle>,
    policy: TaskCollisionPolicy,
}

impl TaskRegistrar {
    pub fn new(
        engine: Arc<dyn EngineClient>,
        buckets: Arc<BucketLifecycle>,
        policy: TaskCollisionPolicy,
    ) -> Self {
        Self {
            engine,
            buckets,
            policy,
        }
    }

    /// Validate, make sure the sink bucket exists, then create (or update)
    /// the tenant's task. Returns the task id.
    pub async fn register(&self, request: &TaskRequest) -> Result<String> {
        if request.tenant_id.trim().is_empty() {
            return Err(Error::validation("tenant_id is required"));
        }
        if request.source_bucket.trim().is_empty() || request.sink_bucket.trim().is_empty() {
            return Err(Error::validation("source and sink buckets are required"));
        }
        let script = render_task_script(request)?;

        self.buckets.ensure(&request.sink_bucket).await?;

        let definition = TaskDefinition {
            name: task_name(&request.tenant_id),
            every: request.schedule.clone(),
            flux: script,
            description: Some(format!(
                "{} from {} to {} for {}",
                request.schedule, request.source_bucket, request.sink_bucket, request.tenant_id
            )),
        };

        if self.policy == TaskCollisionPolicy::Upsert {
            if let Some(task) = self.engine.find_task_by_name(&definition.name).await? {
                debug!("Task {} exists as {}, updating", definition.name, task.id);
                let updated = self.engine.update_task(&task.id, &definition).await?;
                info!("Updated task {} ({})", updated.name, updated.id);
                return Ok(updated.id);
            }
        }

        let task = self.engine.create_task(&definition).await?;
        info!("Created task {} ({}) every {}", task.name, task.id, request.schedule);
        Ok(task.id)
    }
}
