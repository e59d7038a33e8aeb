//! Workflow policies and their registry.
//!
//! A workflow is a remote approval process we watch. Each one is described
//! by a TOML file: which statuses and results make an instance printable,
//! which renderer kind handles it, and optionally how that renderer runs.
//!
//! ```toml
//! [workflow]
//! name = "expense-claim"
//! code = "PROC-C7373528-790F-4A9A-B5FE-FD9564658B4E"
//! kind = "expense-claim"
//! statuses = ["COMPLETED"]
//! results = ["agree"]
//!
//! [render]
//! command = "hooks/expense-claim.sh"
//! fallback = "hooks/expense-claim-libreoffice.sh"
//! timeout_secs = 120
//! attempts = 2
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{STATUS_COMPLETED, STATUS_TERMINATED};

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct WorkflowFile {
    workflow: WorkflowPolicy,
    render: Option<RenderHook>,
}

/// What makes an instance of one workflow worth a print job.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowPolicy {
    pub name: String,
    /// Remote process code.
    pub code: String,
    /// Renderer selector for jobs from this workflow.
    pub kind: String,
    /// Statuses that may produce a job. Also the listing filter.
    #[serde(default = "default_statuses")]
    pub statuses: BTreeSet<String>,
    /// Results that make a matching status printable.
    pub results: BTreeSet<String>,
    /// Status that permanently retires an instance without a job.
    #[serde(default = "default_abort_status")]
    pub abort_status: String,
}

fn default_statuses() -> BTreeSet<String> {
    BTreeSet::from([STATUS_COMPLETED.to_string()])
}

fn default_abort_status() -> String {
    STATUS_TERMINATED.to_string()
}

impl WorkflowPolicy {
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        kind: impl Into<String>,
        statuses: impl IntoIterator<Item = &'static str>,
        results: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            kind: kind.into(),
            statuses: statuses.into_iter().map(String::from).collect(),
            results: results.into_iter().map(String::from).collect(),
            abort_status: default_abort_status(),
        }
    }

    /// Statuses as an ordered list, for the listing call.
    pub fn status_filter(&self) -> Vec<String> {
        self.statuses.iter().cloned().collect()
    }
}

/// How the hook-command renderer runs for one workflow kind.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderHook {
    pub command: PathBuf,
    /// Alternate converter tried once after `attempts` primary failures.
    pub fallback: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_attempts() -> u32 {
    2
}

/// Loaded workflows in file-name order, plus render hooks keyed by kind.
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    policies: Vec<WorkflowPolicy>,
    hooks: HashMap<String, RenderHook>,
}

impl WorkflowRegistry {
    /// Create an empty registry with no workflows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a registry from in-memory policies (no render hooks).
    pub fn from_policies(policies: Vec<WorkflowPolicy>) -> Self {
        Self {
            policies,
            hooks: HashMap::new(),
        }
    }

    /// Load all `.toml` files from a directory and build the registry.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::Config(format!("cannot read workflow dir {}: {e}", dir.display()))
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut registry = Self::empty();
        for path in paths {
            let content = std::fs::read_to_string(&path)?;
            let file: WorkflowFile = toml::from_str(&content).map_err(|e| {
                Error::Config(format!("bad workflow config {}: {e}", path.display()))
            })?;
            registry.insert(file.workflow, file.render, &path)?;
        }
        Ok(registry)
    }

    fn insert(
        &mut self,
        policy: WorkflowPolicy,
        hook: Option<RenderHook>,
        path: &Path,
    ) -> Result<()> {
        if policy.results.is_empty() {
            return Err(Error::Config(format!(
                "workflow {} in {} accepts no results",
                policy.name,
                path.display()
            )));
        }
        if self.policies.iter().any(|p| p.name == policy.name) {
            return Err(Error::Config(format!(
                "duplicate workflow name {} in {}",
                policy.name,
                path.display()
            )));
        }
        if let Some(hook) = hook {
            if self.hooks.contains_key(&policy.kind) {
                return Err(Error::Config(format!(
                    "render hook for kind {} defined twice (again in {})",
                    policy.kind,
                    path.display()
                )));
            }
            self.hooks.insert(policy.kind.clone(), hook);
        }
        self.policies.push(policy);
        Ok(())
    }

    pub fn policies(&self) -> &[WorkflowPolicy] {
        &self.policies
    }

    /// Look up a workflow by name.
    pub fn get(&self, name: &str) -> Option<&WorkflowPolicy> {
        self.policies.iter().find(|p| p.name == name)
    }

    /// Render hooks by workflow kind.
    pub fn hooks(&self) -> impl Iterator<Item = (&str, &RenderHook)> {
        self.hooks.iter().map(|(kind, hook)| (kind.as_str(), hook))
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
