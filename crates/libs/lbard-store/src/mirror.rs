//! Store-mirror poll loop: long-polls the bundle listing at a
//! bounded interval and parses each row into a plain [`BundleRow`] for the
//! engine to fold into its own bundle table. This crate never holds the
//! bundle table itself — that stays the engine's exclusively-owned state.

use std::time::Duration;

use crate::client::RhizomeClient;
use crate::error::StoreError;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
const MIN_LOAD_TIMEOUT_MS: u64 = 500;
const MAX_LOAD_TIMEOUT_MS: u64 = 1_500;
const FIELDS_PER_ROW: usize = 14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRow {
    pub token: String,
    pub service: String,
    pub bid_hex: String,
    pub version: u64,
    pub date_ms: u64,
    pub insert_time_ms: u64,
    pub author: Option<String>,
    pub originated_here: bool,
    pub filesize: u64,
    pub filehash: String,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub name: Option<String>,
    pub bk: Option<String>,
}

/// Journal bundles carry an append-only message thread and are exempt
/// from the `min_version` age filter.
pub const JOURNAL_SERVICE: &str = "MeshMS2";

pub struct StoreMirror {
    client: RhizomeClient,
    since_token: Option<String>,
    poll_interval_ms: u64,
}

impl StoreMirror {
    pub fn new(client: RhizomeClient) -> Self {
        Self { client, since_token: None, poll_interval_ms: DEFAULT_POLL_INTERVAL_MS }
    }

    /// Clamps a requested load timeout into [500ms, 1500ms] so a slow
    /// store never starves inbound radio packets.
    pub fn clamp_load_timeout_ms(requested_ms: u64) -> u64 {
        requested_ms.clamp(MIN_LOAD_TIMEOUT_MS, MAX_LOAD_TIMEOUT_MS)
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    pub fn set_poll_interval_ms(&mut self, interval_ms: u64) {
        self.poll_interval_ms = interval_ms;
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Fetches and parses the next batch of rows, advancing the
    /// continuation token on success.
    pub fn poll(&mut self) -> Result<Vec<BundleRow>, StoreError> {
        let body = self.client.bundle_list(self.since_token.as_deref())?;
        let rows = parse_rows(&body)?;
        if let Some(last) = rows.last() {
            self.since_token = Some(last.token.clone());
        }
        Ok(rows)
    }
}

fn parse_rows(body: &str) -> Result<Vec<BundleRow>, StoreError> {
    let mut rows = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|err| StoreError::MalformedRow(format!("{err}: {line}")))?;
        let fields = value
            .as_array()
            .ok_or_else(|| StoreError::MalformedRow(format!("row is not an array: {line}")))?;
        if fields.len() != FIELDS_PER_ROW {
            return Err(StoreError::MalformedRow(format!(
                "expected {FIELDS_PER_ROW} fields, got {}: {line}",
                fields.len()
            )));
        }
        rows.push(row_from_fields(fields)?);
    }
    Ok(rows)
}

fn row_from_fields(fields: &[serde_json::Value]) -> Result<BundleRow, StoreError> {
    let string_at = |idx: usize| -> Option<String> {
        fields[idx].as_str().map(str::to_owned).filter(|s| !s.is_empty())
    };
    let required_string = |idx: usize| -> Result<String, StoreError> {
        string_at(idx).ok_or_else(|| StoreError::MalformedRow(format!("field {idx} missing or empty")))
    };
    let u64_at = |idx: usize| -> Result<u64, StoreError> {
        fields[idx]
            .as_u64()
            .or_else(|| fields[idx].as_str().and_then(|s| s.parse().ok()))
            .ok_or_else(|| StoreError::MalformedRow(format!("field {idx} is not a u64")))
    };

    Ok(BundleRow {
        token: required_string(0)?,
        service: required_string(1)?,
        bid_hex: required_string(2)?,
        version: u64_at(3)?,
        date_ms: u64_at(4)?,
        insert_time_ms: u64_at(5)?,
        author: string_at(6),
        originated_here: fields[7].as_bool().unwrap_or(false),
        filesize: u64_at(8)?,
        filehash: required_string(9)?,
        sender: string_at(10),
        recipient: string_at(11),
        name: string_at(12),
        bk: string_at(13),
    })
}
