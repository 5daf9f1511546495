//! Directory and analytics data contract.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of the user directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    pub username: String,
    #[serde(default)]
    pub latest_emotion: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    /// Timestamp of `latest_emotion`, when the service reports it.
    #[serde(default)]
    pub emotion_time: Option<String>,
}

/// Chart-ready emotion history for the last `days` days.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EmotionHistory {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub datasets: Vec<EmotionDataset>,
    #[serde(default)]
    pub stats: Option<EmotionStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionDataset {
    pub label: String,
    #[serde(default)]
    pub data: Vec<f64>,
    /// Chart styling (colours, fill) passed through untouched.
    #[serde(flatten)]
    pub style: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionStats {
    #[serde(default)]
    pub main_emotion: Option<String>,
    #[serde(default)]
    pub emotion_variation: Option<f64>,
    #[serde(default)]
    pub record_count: Option<u64>,
}

impl EmotionHistory {
    /// Total per emotion across the whole window, largest first.
    pub fn totals(&self) -> Vec<(String, f64)> {
        let mut totals: Vec<(String, f64)> = self
            .datasets
            .iter()
            .map(|d| (d.label.clone(), d.data.iter().sum()))
            .collect();
        totals.sort_by(|a, b| b.1.total_cmp(&a.1));
        totals
    }
}
