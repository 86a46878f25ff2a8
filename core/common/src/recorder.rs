// core/common/src/recorder.rs
// In-memory recorder for structured run data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::RecorderError;

/// Position in a run at which a record was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timestamp {
    pub epoch: u64,
    pub batch: u64,
    pub recorded_at: DateTime<Utc>,
}

impl Timestamp {
    pub fn new(epoch: u64, batch: u64) -> Self {
        Self {
            epoch,
            batch,
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogPayload {
    Metrics(BTreeMap<String, f64>),
    /// Must be a JSON object; the tag is merged into it.
    Hyperparameters(serde_json::Value),
    Text { text: String },
    /// Raw numeric data. Accepted by the recorder but never sent as JSON.
    Tensor { shape: Vec<usize>, values: Vec<f32> },
    /// Reference to a rich media file. Accepted but never sent as JSON.
    Media { kind: String, path: String },
}

impl LogPayload {
    pub fn text(text: impl Into<String>) -> Self {
        LogPayload::Text { text: text.into() }
    }

    /// Tensors and media have their own upload path and skip the JSON check.
    pub fn is_json_exempt(&self) -> bool {
        matches!(self, LogPayload::Tensor { .. } | LogPayload::Media { .. })
    }
}

/// Keeps every logged record in memory, keyed by name.
#[derive(Debug, Default)]
pub struct InMemoryLogger {
    data: HashMap<String, Vec<(Timestamp, LogPayload)>>,
}

impl InMemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&mut self, name: impl Into<String>, timestamp: Timestamp, payload: LogPayload) {
        self.data
            .entry(name.into())
            .or_default()
            .push((timestamp, payload));
    }

    pub fn log_metrics<I, K>(&mut self, timestamp: Timestamp, metrics: I)
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let metrics = metrics.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.log("metrics", timestamp, LogPayload::Metrics(metrics));
    }

    pub fn records(&self, name: &str) -> &[(Timestamp, LogPayload)] {
        self.data.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.data.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Total number of records across all names.
    pub fn len(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Checks that every non-exempt record encodes as strict JSON.
    pub fn check_json_serializable(&self) -> Result<(), RecorderError> {
        for name in self.names() {
            for (index, (_, payload)) in self.records(name).iter().enumerate() {
                if payload.is_json_exempt() {
                    continue;
                }
                check_payload(name, index, payload)?;
            }
        }
        Ok(())
    }
}

fn check_payload(name: &str, index: usize, payload: &LogPayload) -> Result<(), RecorderError> {
    if let LogPayload::Metrics(metrics) = payload {
        if let Some((key, _)) = metrics.iter().find(|(_, v)| !v.is_finite()) {
            return Err(RecorderError::NonFiniteValue {
                name: name.to_string(),
                index,
                key: key.clone(),
            });
        }
    }

    serde_json::to_string(payload)
        .map(|_| ())
        .map_err(|e| RecorderError::NotSerializable {
            name: name.to_string(),
            index,
            reason: e.to_string(),
        })
}
