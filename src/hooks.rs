// src/hooks.rs
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::Result;
use crate::identity::JobId;
use crate::job::JobType;
use crate::job_metadata::Metadata;
use crate::meta_store::MetaStore;


/// What a hook gets to see about the job it fires for.
pub struct HookContext<'a> {
    pub store: &'a MetaStore,
    pub job_type: &'a JobType,
    pub job_id: &'a JobId,
    pub args: &'a Value,
}

/// Callbacks run around enqueue and execution. Every method defaults to a
/// no-op so a hook only implements the points it cares about.
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs before the job is pushed. An error aborts the enqueue.
    async fn before_enqueue(&self, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn before_perform(&self, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn after_perform(&self, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn on_failure(&self, _err: &anyhow::Error, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }
}


/// Drives the metadata record through enqueued, working and finished.
/// Hooks that find no record do nothing.
pub struct MetaHooks;

#[async_trait]
impl LifecycleHook for MetaHooks {
    fn name(&self) -> &'static str {
        "meta"
    }

    async fn before_enqueue(&self, ctx: &HookContext<'_>) -> Result<()> {
        let meta = Metadata::new(ctx.job_id.clone(), *ctx.job_type, ctx.store.policy());
        ctx.store.save(&meta).await
    }

    async fn before_perform(&self, ctx: &HookContext<'_>) -> Result<()> {
        if let Some(mut meta) = ctx.store.get(ctx.job_id, Some(ctx.job_type)).await? {
            if meta.start() {
                ctx.store.save(&meta).await?;
            }
        }
        Ok(())
    }

    async fn after_perform(&self, ctx: &HookContext<'_>) -> Result<()> {
        if let Some(mut meta) = ctx.store.get(ctx.job_id, Some(ctx.job_type)).await? {
            if meta.finish() {
                ctx.store.save(&meta).await?;
            }
        }
        Ok(())
    }

    async fn on_failure(&self, _err: &anyhow::Error, ctx: &HookContext<'_>) -> Result<()> {
        if let Some(mut meta) = ctx.store.get(ctx.job_id, Some(ctx.job_type)).await? {
            if meta.fail() {
                ctx.store.save(&meta).await?;
            }
        }
        Ok(())
    }
}


pub fn default_hooks() -> Vec<Arc<dyn LifecycleHook>> {
    vec![Arc::new(MetaHooks)]
}

/// Runs the before-enqueue hooks in order, stopping at the first error.
pub async fn run_before_enqueue(hooks: &[Arc<dyn LifecycleHook>], ctx: &HookContext<'_>) -> Result<()> {
    for hook in hooks {
        debug!(hook = hook.name(), job_id = %ctx.job_id, "before_enqueue");
        hook.before_enqueue(ctx).await?;
    }
    Ok(())
}

// Execution-time hooks never fail the job; errors are only logged.

pub async fn run_before_perform(hooks: &[Arc<dyn LifecycleHook>], ctx: &HookContext<'_>) {
    for hook in hooks {
        if let Err(e) = hook.before_perform(ctx).await {
            error!(hook = hook.name(), job_id = %ctx.job_id, error = %e, "before_perform hook failed");
        }
    }
}

pub async fn run_after_perform(hooks: &[Arc<dyn LifecycleHook>], ctx: &HookContext<'_>) {
    for hook in hooks {
        if let Err(e) = hook.after_perform(ctx).await {
            error!(hook = hook.name(), job_id = %ctx.job_id, error = %e, "after_perform hook failed");
        }
    }
}

pub async fn run_on_failure(hooks: &[Arc<dyn LifecycleHook>], err: &anyhow::Error, ctx: &HookContext<'_>) {
    for hook in hooks {
        if let Err(e) = hook.on_failure(err, ctx).await {
            error!(hook = hook.name(), job_id = %ctx.job_id, error = %e, "on_failure hook failed");
        }
    }
}
