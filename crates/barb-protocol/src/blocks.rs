//! Structured result attachments.
//!
//! A [`DataBlock`] is what a tool invocation produces for display: a titled
//! group of tables and charts. While the tool is still running the session
//! controller holds a `loading` placeholder in its slot.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle of a data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockStatus {
    Loading,
    Success,
    Error,
}

/// A structured attachment on an assistant message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataBlock {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub blocks: Vec<Block>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BlockStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Server fields this client does not interpret (`tool`, `input`,
    /// `result`, `rows`, `chart`, ...), kept so the block round-trips.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DataBlock {
    /// Placeholder shown while a tool runs.
    pub fn loading(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: Some(BlockStatus::Loading),
            ..Self::default()
        }
    }

    /// The same block marked as successfully resolved.
    pub fn into_success(mut self) -> Self {
        self.status = Some(BlockStatus::Success);
        self.error = None;
        self
    }

    /// Mark this block as failed with a message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = Some(BlockStatus::Error);
        self.error = Some(message.into());
    }

    pub fn is_loading(&self) -> bool {
        self.status == Some(BlockStatus::Loading)
    }
}

/// One renderable element of a data block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Block {
    Table {
        columns: Vec<String>,
        rows: Vec<Map<String, Value>>,
    },
    BarChart {
        category_key: String,
        value_key: String,
        rows: Vec<Map<String, Value>>,
    },
    MetricsGrid {
        items: Vec<MetricItem>,
    },
    AreaChart {
        x_key: String,
        series: Vec<ChartSeries>,
        data: Vec<Map<String, Value>>,
    },
    HorizontalBar {
        items: Vec<BarItem>,
    },
    /// A block type introduced by a newer server.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricItem {
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesStyle {
    Line,
    Area,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub key: String,
    pub label: String,
    pub style: SeriesStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarItem {
    pub label: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
