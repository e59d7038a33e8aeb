//! In-process fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use approval_relay::error::{Error, Result};
use approval_relay::model::InstanceDetail;
use approval_relay::render::{RenderHandler, RenderJob};
use approval_relay::source::{InstancePage, InstanceSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Build a detail record the way the gateway would report it.
pub fn detail(
    id: &str,
    status: &str,
    result: Option<&str>,
    created_at: DateTime<Utc>,
) -> InstanceDetail {
    InstanceDetail {
        instance_id: id.to_string(),
        status: status.to_string(),
        result: result.map(String::from),
        title: format!("Title {id}"),
        created_at: Some(created_at),
        business_id: None,
        form_values: Vec::new(),
    }
}

/// Scripted instance source.
///
/// Pages are keyed by the cursor that requests them (`None` for the first
/// page). An unscripted cursor yields an empty final page.
#[derive(Default)]
pub struct FakeSource {
    pages: Mutex<HashMap<Option<String>, InstancePage>>,
    /// Remaining failures per cursor before the page is served.
    page_failures: Mutex<HashMap<Option<String>, u32>>,
    details: Mutex<HashMap<String, InstanceDetail>>,
    failing_details: Mutex<HashSet<String>>,
    endless: Mutex<bool>,
    list_calls: AtomicUsize,
    detail_calls: Mutex<Vec<String>>,
    last_since_ms: Mutex<Option<i64>>,
    last_statuses: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `ids` for `cursor`, pointing to `next`.
    pub fn page(&self, cursor: Option<&str>, ids: &[&str], next: Option<&str>) {
        self.pages.lock().unwrap().insert(
            cursor.map(String::from),
            InstancePage {
                ids: ids.iter().map(|s| s.to_string()).collect(),
                next_cursor: next.map(String::from),
            },
        );
    }

    /// Fail the request for `cursor` the next `times` times.
    pub fn fail_page(&self, cursor: Option<&str>, times: u32) {
        self.page_failures
            .lock()
            .unwrap()
            .insert(cursor.map(String::from), times);
    }

    /// Every page returns one new ID and a further cursor, forever.
    pub fn set_endless(&self) {
        *self.endless.lock().unwrap() = true;
    }

    pub fn set_detail(&self, detail: InstanceDetail) {
        self.details
            .lock()
            .unwrap()
            .insert(detail.instance_id.clone(), detail);
    }

    pub fn remove_detail(&self, id: &str) {
        self.details.lock().unwrap().remove(id);
    }

    pub fn fail_detail(&self, id: &str) {
        self.failing_details.lock().unwrap().insert(id.to_string());
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> Vec<String> {
        self.detail_calls.lock().unwrap().clone()
    }

    pub fn reset_calls(&self) {
        self.list_calls.store(0, Ordering::SeqCst);
        self.detail_calls.lock().unwrap().clear();
    }

    pub fn last_since_ms(&self) -> Option<i64> {
        *self.last_since_ms.lock().unwrap()
    }

    pub fn last_statuses(&self) -> Vec<String> {
        self.last_statuses.lock().unwrap().clone()
    }
}

#[async_trait]
impl InstanceSource for FakeSource {
    async fn list_instance_ids(
        &self,
        _workflow_code: &str,
        statuses: &[String],
        since_ms: i64,
        cursor: Option<&str>,
        _page_size: u32,
    ) -> Result<InstancePage> {
        let n = self.list_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_since_ms.lock().unwrap() = Some(since_ms);
        *self.last_statuses.lock().unwrap() = statuses.to_vec();

        let key = cursor.map(String::from);
        if let Some(remaining) = self.page_failures.lock().unwrap().get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::TransientFetch(format!("scripted failure for {key:?}")));
            }
        }

        if *self.endless.lock().unwrap() {
            return Ok(InstancePage {
                ids: Vec::new(),
                next_cursor: Some(format!("c{}", n + 1)),
            });
        }

        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_detail(&self, instance_id: &str) -> Result<Option<InstanceDetail>> {
        self.detail_calls
            .lock()
            .unwrap()
            .push(instance_id.to_string());
        if self.failing_details.lock().unwrap().contains(instance_id) {
            return Err(Error::TransientFetch(format!("scripted failure for {instance_id}")));
        }
        Ok(self.details.lock().unwrap().get(instance_id).cloned())
    }
}

/// What the fake renderer does with one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    Deliver,
    Decline,
    Fail,
}

/// Renderer that records every job and answers from a per-instance script.
/// Unscripted jobs are delivered.
#[derive(Default)]
pub struct FakeRenderer {
    script: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<RenderJob>>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, instance_id: &str, outcomes: &[Scripted]) {
        self.script
            .lock()
            .unwrap()
            .insert(instance_id.to_string(), outcomes.iter().copied().collect());
    }

    pub fn calls(&self) -> Vec<RenderJob> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|job| job.instance_id)
            .collect()
    }
}

#[async_trait]
impl RenderHandler for FakeRenderer {
    async fn handle(&self, job: &RenderJob) -> Result<bool> {
        self.calls.lock().unwrap().push(job.clone());
        let next = self
            .script
            .lock()
            .unwrap()
            .get_mut(&job.instance_id)
            .and_then(|q| q.pop_front())
            .unwrap_or(Scripted::Deliver);
        match next {
            Scripted::Deliver => Ok(true),
            Scripted::Decline => Ok(false),
            Scripted::Fail => Err(Error::Render(format!("scripted failure for {}", job.instance_id))),
        }
    }
}
