//! Renderers: the handlers that turn a queued job into a printed document.
//!
//! The drain loop routes each job by workflow kind to a [`RenderHandler`].
//! A handler reports `Ok(true)` when the job is done and its row may be
//! deleted, `Ok(false)` to leave the row for the next cycle, and `Err` for
//! a failure (the row is also left).

pub mod hook;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::model::QueuedTask;
use crate::workflow::WorkflowRegistry;

pub use hook::CommandRenderer;

/// What a renderer is asked to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderJob {
    pub instance_id: String,
    pub workflow_kind: String,
    pub status: String,
    pub title: String,
    /// Produce the document but do not send it to a printer.
    pub no_print: bool,
}

impl RenderJob {
    pub fn from_task(task: &QueuedTask, no_print: bool) -> Self {
        Self {
            instance_id: task.instance_id.clone(),
            workflow_kind: task.workflow_kind.clone(),
            status: task.status.clone(),
            title: task.title.clone(),
            no_print,
        }
    }
}

#[async_trait]
pub trait RenderHandler: Send + Sync {
    /// Render one job. `Ok(true)` means delivered.
    async fn handle(&self, job: &RenderJob) -> Result<bool>;
}

/// Handlers keyed by workflow kind.
#[derive(Clone, Default)]
pub struct RendererRegistry {
    handlers: HashMap<String, Arc<dyn RenderHandler>>,
}

impl RendererRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn RenderHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn RenderHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// One [`CommandRenderer`] per `[render]` section in the workflow files.
    /// Scratch directories for each run go under `scratch_root`.
    pub fn from_workflows(workflows: &WorkflowRegistry, scratch_root: &Path) -> Self {
        let mut registry = Self::empty();
        for (kind, hook) in workflows.hooks() {
            registry.register(
                kind,
                Arc::new(CommandRenderer::new(hook.clone(), scratch_root.to_path_buf())),
            );
        }
        registry
    }
}
