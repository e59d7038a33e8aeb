//! JSON-over-HTTP gateway client.
//!
//! Endpoints:
//! - `GET {base}/workflows/{code}/instances?since_ms=&page_size=&status=&cursor=`
//!   returns `{"ids": [...], "next_cursor": "..." | null}`
//! - `GET {base}/instances/{id}` returns the vendor detail JSON, 404 if absent

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::{InstancePage, InstanceSource};
use crate::error::{Error, Result};
use crate::model::InstanceDetail;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpInstanceSource {
    client: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpInstanceSource {
    /// Build a client for the gateway at `base_url`, authenticating with an
    /// optional bearer token.
    pub fn new(base_url: impl Into<String>, token: Option<SecretString>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }
}

#[async_trait]
impl InstanceSource for HttpInstanceSource {
    async fn list_instance_ids(
        &self,
        workflow_code: &str,
        statuses: &[String],
        since_ms: i64,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<InstancePage> {
        let url = format!("{}/workflows/{workflow_code}/instances", self.base_url);

        let mut query: Vec<(&str, String)> = vec![
            ("since_ms", since_ms.to_string()),
            ("page_size", page_size.to_string()),
        ];
        query.extend(statuses.iter().map(|s| ("status", s.clone())));
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let page: InstancePage = self
            .get(&url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(
            workflow_code,
            ids = page.ids.len(),
            has_next = page.next_cursor.is_some(),
            "fetched instance page"
        );
        Ok(page)
    }

    async fn get_detail(&self, instance_id: &str) -> Result<Option<InstanceDetail>> {
        let url = format!("{}/instances/{instance_id}", self.base_url);
        let response = self.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: serde_json::Value = response.error_for_status()?.json().await?;
        InstanceDetail::from_json(instance_id, body).map(Some)
    }
}
