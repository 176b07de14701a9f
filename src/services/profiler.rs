use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use serde_json::{json, Map, Value};
use smallvec::SmallVec;

use crate::services::row_source::{Row, RowSet};

pub const EXAMPLE_VALUES: usize = 3;
pub const PREVIEW_ROWS: usize = 5;
pub const PROMPT_SAMPLE_ROWS: usize = 2;

/// A column is numeric when strictly more than this share of its non-empty
/// values survive numeric extraction. Pinned by tests; documented behavior.
pub const NUMERIC_RATIO_THRESHOLD: f64 = 0.8;

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"-?\d+(\.\d+)?").expect("numeric extraction regex is valid")
});

/// Pull the first signed decimal out of a raw cell value. Source data
/// routinely embeds numbers inside units or currency ("$1,200", "45kg");
/// taking the first match recovers the common case. Multi-number cells use
/// only the first number, a known precision limitation.
pub fn extract_number(value: &str) -> Option<f64> {
    if value.is_empty() {
        return None;
    }
    NUMBER_RE
        .find(value)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Unknown,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Numeric => "number",
            ColumnKind::Categorical => "string",
            ColumnKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std_dev: Option<f64>,
    pub unique_count: Option<usize>,
    pub example_values: SmallVec<[String; EXAMPLE_VALUES]>,
}

impl ColumnProfile {
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::Unknown,
            count: 0,
            min: None,
            max: None,
            mean: None,
            median: None,
            std_dev: None,
            unique_count: None,
            example_values: SmallVec::new(),
        }
    }
}

/// Per-column types and statistics for one table, re-derived on every
/// analysis request and never cached across requests.
#[derive(Debug, Clone, Default)]
pub struct TableProfile {
    pub row_count: usize,
    pub column_names: Vec<String>,
    pub columns: HashMap<String, ColumnProfile>,
    pub preview: Vec<Row>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 != 0 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    // Population standard deviation.
    let avg_square_diff = values
        .iter()
        .map(|v| (v - mean).powi(2))
        .sum::<f64>()
        / values.len() as f64;
    avg_square_diff.sqrt()
}

/// Classify one column and compute its statistics. Never fails on dirty
/// data: values that don't extract are simply left out of the numeric stats.
pub fn profile_column(name: &str, values: &[String]) -> ColumnProfile {
    let raw_values: Vec<&str> = values
        .iter()
        .map(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .collect();

    if raw_values.is_empty() {
        return ColumnProfile::empty(name);
    }

    let mut cleaned: Vec<f64> = raw_values
        .iter()
        .filter_map(|v| extract_number(v))
        .filter(|v| v.is_finite())
        .collect();

    let is_numeric = cleaned.len() as f64 / raw_values.len() as f64 > NUMERIC_RATIO_THRESHOLD;

    if is_numeric {
        cleaned.sort_by(|a, b| a.total_cmp(b));
        let min = cleaned[0];
        let max = cleaned[cleaned.len() - 1];
        let mean = cleaned.iter().sum::<f64>() / cleaned.len() as f64;

        ColumnProfile {
            name: name.to_string(),
            kind: ColumnKind::Numeric,
            count: cleaned.len(),
            min: Some(min),
            max: Some(max),
            mean: Some(round2(mean)),
            median: Some(round2(median(&cleaned))),
            std_dev: Some(round2(std_dev(&cleaned, mean))),
            unique_count: None,
            example_values: SmallVec::new(),
        }
    } else {
        let unique: HashSet<&str> = raw_values.iter().copied().collect();
        let example_values: SmallVec<[String; EXAMPLE_VALUES]> = raw_values
            .iter()
            .take(EXAMPLE_VALUES)
            .map(|v| v.to_string())
            .collect();

        ColumnProfile {
            name: name.to_string(),
            kind: ColumnKind::Categorical,
            count: raw_values.len(),
            min: None,
            max: None,
            mean: None,
            median: None,
            std_dev: None,
            unique_count: Some(unique.len()),
            example_values,
        }
    }
}

/// Profile every column of a table. Columns are independent, so they are
/// profiled in parallel; output order follows the source column order.
pub fn profile_table(rows: &RowSet) -> TableProfile {
    if rows.rows.is_empty() {
        return TableProfile::default();
    }

    let profiles: Vec<ColumnProfile> = rows
        .columns
        .par_iter()
        .map(|name| {
            let values: Vec<String> = rows
                .rows
                .iter()
                .map(|row| row.get(name).cloned().unwrap_or_default())
                .collect();
            profile_column(name, &values)
        })
        .collect();

    let columns = profiles
        .into_iter()
        .map(|profile| (profile.name.clone(), profile))
        .collect();

    TableProfile {
        row_count: rows.rows.len(),
        column_names: rows.columns.clone(),
        columns,
        preview: rows.rows.iter().take(PREVIEW_ROWS).cloned().collect(),
    }
}

/// Bounded view forwarded into the agent prompt: type for every column, plus
/// min/max for numeric ones. Keeps prompt size flat no matter the table.
pub fn summary_for_prompt(profile: &TableProfile) -> Value {
    let mut columns = Map::new();
    for name in &profile.column_names {
        if let Some(col) = profile.columns.get(name) {
            let mut entry = Map::new();
            entry.insert("type".to_string(), Value::String(col.kind.as_str().to_string()));
            if col.kind == ColumnKind::Numeric {
                if let Some(min) = col.min {
                    entry.insert("min".to_string(), json!(min));
                }
                if let Some(max) = col.max {
                    entry.insert("max".to_string(), json!(max));
                }
            }
            columns.insert(name.clone(), Value::Object(entry));
        }
    }

    json!({
        "rowCount": profile.row_count,
        "columns": columns,
    })
}

/// The 2-row sample forwarded alongside the summary, smaller than the full
/// preview for the same prompt-size reason.
pub fn sample_for_prompt(profile: &TableProfile) -> Value {
    let sample: Vec<&Row> = profile.preview.iter().take(PROMPT_SAMPLE_ROWS).collect();
    json!(sample)
}
