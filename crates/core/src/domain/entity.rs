use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const METRIC_TOTAL_VALUE: &str = "total_value";
pub const METRIC_CASH: &str = "cash";
pub const METRIC_PE_RATIO: &str = "pe_ratio";
pub const METRIC_PRICE: &str = "price";
pub const METRIC_CHANGE_PERCENT: &str = "change_percent";
pub const METRIC_MARKET_CAP: &str = "market_cap";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Fund,
    Stock,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "US")]
    Us,
    #[serde(rename = "HK")]
    Hk,
}

/// What to fetch: one fund (by CIK) or one ticker symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySpec {
    pub identifier: &'static str,
    pub display_name: &'static str,
    pub kind: EntityKind,
    pub region: Option<Region>,
}

impl EntitySpec {
    pub const fn fund(cik: &'static str, display_name: &'static str) -> Self {
        Self {
            identifier: cik,
            display_name,
            kind: EntityKind::Fund,
            region: None,
        }
    }

    pub const fn stock(symbol: &'static str, display_name: &'static str, region: Region) -> Self {
        Self {
            identifier: symbol,
            display_name,
            kind: EntityKind::Stock,
            region: Some(region),
        }
    }

    pub const fn index(symbol: &'static str, display_name: &'static str) -> Self {
        Self {
            identifier: symbol,
            display_name,
            kind: EntityKind::Index,
            region: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub value: f64,
    pub shares: f64,
}

/// Numeric metrics of one entity. Fund records additionally carry their positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positions: Vec<Position>,
}

impl Metrics {
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).copied()
    }

    /// Stores a sanitized value: non-finite becomes 0, level metrics are clamped at 0.
    pub fn set(&mut self, metric: &str, value: f64) {
        self.values.insert(metric.to_string(), sanitize(metric, value));
    }

    /// Like [`Metrics::set`] but treats a missing provider field as 0.
    pub fn set_or_zero(&mut self, metric: &str, value: Option<f64>) {
        self.set(metric, value.unwrap_or(0.0));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub identifier: String,

    /// Mirrors the snapshot key; filled in when a snapshot is loaded.
    #[serde(skip)]
    pub display_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntityKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,

    #[serde(
        rename = "filing_date",
        alias = "timestamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub as_of_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accession_number: Option<String>,

    #[serde(rename = "holdings", alias = "metrics", default)]
    pub metrics: Metrics,
}

impl EntityRecord {
    pub fn from_spec(spec: &EntitySpec) -> Self {
        Self {
            identifier: spec.identifier.to_string(),
            display_name: spec.display_name.to_string(),
            kind: Some(spec.kind),
            region: spec.region,
            as_of_date: None,
            accession_number: None,
            metrics: Metrics::default(),
        }
    }

    pub fn metric(&self, metric: &str) -> Option<f64> {
        self.metrics.get(metric)
    }
}

fn sanitize(metric: &str, value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    if metric == METRIC_CHANGE_PERCENT {
        value
    } else {
        value.max(0.0)
    }
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
