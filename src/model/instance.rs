//! Typed view of a remote instance detail record.
//!
//! The gateway returns the vendor's JSON shape. Only the fields the core
//! reads are decoded; everything else is ignored.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Terminal approval status. A dedup record under this status short-circuits
/// every later evaluation of the instance.
pub const STATUS_COMPLETED: &str = "COMPLETED";

/// Status of an instance withdrawn or cancelled before completion.
pub const STATUS_TERMINATED: &str = "TERMINATED";

/// Vendor shorthand for creation times, e.g. `2026-03-01T08:15Z`.
const VENDOR_MINUTE_FORMAT: &str = "%Y-%m-%dT%H:%MZ";

/// A remote approval instance as seen by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDetail {
    pub instance_id: String,

    /// Workflow status, e.g. "RUNNING", "COMPLETED", "TERMINATED".
    pub status: String,

    /// Approval result, e.g. "agree" or "refuse". Absent while running.
    pub result: Option<String>,

    pub title: String,

    /// When the instance was created on the remote side.
    pub created_at: Option<DateTime<Utc>>,

    pub business_id: Option<String>,

    /// Form fields in display order.
    pub form_values: Vec<FormValue>,
}

/// One filled-in form component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormValue {
    pub id: Option<String>,
    pub name: Option<String>,
    pub component_type: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDetail {
    status: Option<String>,
    result: Option<String>,
    title: Option<String>,
    create_time: Option<String>,
    business_id: Option<String>,
    #[serde(default)]
    form_component_values: Vec<RawFormValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFormValue {
    id: Option<String>,
    name: Option<String>,
    component_type: Option<String>,
    value: Option<String>,
}

impl InstanceDetail {
    /// Decode a detail payload.
    ///
    /// A missing or empty `status` is a [`Error::DataIntegrity`]: the
    /// dispatch rules cannot classify an instance without one. A present
    /// but unparsable `createTime` is rejected the same way.
    pub fn from_json(instance_id: &str, value: serde_json::Value) -> Result<Self> {
        let raw: RawDetail = serde_json::from_value(value)
            .map_err(|e| Error::integrity(instance_id, format!("malformed detail: {e}")))?;

        let status = raw
            .status
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::integrity(instance_id, "detail has no status"))?;

        let created_at = raw
            .create_time
            .as_deref()
            .map(|s| {
                parse_create_time(s).ok_or_else(|| {
                    Error::integrity(instance_id, format!("unparsable createTime {s:?}"))
                })
            })
            .transpose()?;

        Ok(Self {
            instance_id: instance_id.to_string(),
            status,
            result: raw.result,
            title: raw.title.unwrap_or_else(|| "Unknown".to_string()),
            created_at,
            business_id: raw.business_id,
            form_values: raw
                .form_component_values
                .into_iter()
                .map(|f| FormValue {
                    id: f.id,
                    name: f.name,
                    component_type: f.component_type,
                    value: f.value,
                })
                .collect(),
        })
    }

    /// Creation time, required when the instance is first cached.
    pub fn require_created_at(&self) -> Result<DateTime<Utc>> {
        self.created_at
            .ok_or_else(|| Error::integrity(&self.instance_id, "detail has no createTime"))
    }

    /// Value of the first form field with the given display name.
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form_values
            .iter()
            .find(|f| f.name.as_deref() == Some(name))
            .and_then(|f| f.value.as_deref())
    }
}

fn parse_create_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, VENDOR_MINUTE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
