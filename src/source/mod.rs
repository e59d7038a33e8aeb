//! Remote instance source: where approval instances come from.
//!
//! The core only depends on the [`InstanceSource`] trait. Authentication and
//! vendor transport live behind an implementation; the one shipped here
//! talks to a JSON gateway over HTTP.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::InstanceDetail;

pub use http::HttpInstanceSource;

/// One page of instance IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancePage {
    pub ids: Vec<String>,
    /// Token for the next page. `None` means the listing is exhausted.
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait InstanceSource: Send + Sync {
    /// List instance IDs of `workflow_code` in one of `statuses`, changed
    /// since `since_ms` (unix millis). `cursor` is `None` for the first page.
    ///
    /// # Errors
    /// Any transport or API failure, as [`crate::error::Error::TransientFetch`].
    async fn list_instance_ids(
        &self,
        workflow_code: &str,
        statuses: &[String],
        since_ms: i64,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<InstancePage>;

    /// Fetch the current detail of one instance. `Ok(None)` if the remote
    /// side does not know the ID.
    async fn get_detail(&self, instance_id: &str) -> Result<Option<InstanceDetail>>;
}
