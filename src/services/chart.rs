use std::collections::HashMap;

use serde_json::{Map, Number, Value};

use crate::services::profiler::extract_number;
use crate::services::row_source::{Row, RowSet};

/// Hard cap on rendered rows, to bound payload size for the frontend.
pub const MAX_CHART_ROWS: usize = 2000;

const MIN_BINS: usize = 5;
const MAX_BINS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartType {
    Bar,
    Line,
    Scatter,
    Pie,
    Histogram,
    Area,
}

impl ChartType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "bar" => Some(ChartType::Bar),
            "line" => Some(ChartType::Line),
            "scatter" => Some(ChartType::Scatter),
            "pie" => Some(ChartType::Pie),
            "histogram" => Some(ChartType::Histogram),
            "area" => Some(ChartType::Area),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Scatter => "scatter",
            ChartType::Pie => "pie",
            ChartType::Histogram => "histogram",
            ChartType::Area => "area",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl FilterOp {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            ">" => Some(FilterOp::Gt),
            "<" => Some(FilterOp::Lt),
            ">=" => Some(FilterOp::Ge),
            "<=" => Some(FilterOp::Le),
            "==" => Some(FilterOp::Eq),
            "!=" => Some(FilterOp::Ne),
            _ => None,
        }
    }

    fn apply(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            FilterOp::Gt => lhs > rhs,
            FilterOp::Lt => lhs < rhs,
            FilterOp::Ge => lhs >= rhs,
            FilterOp::Le => lhs <= rhs,
            FilterOp::Eq => lhs == rhs,
            FilterOp::Ne => lhs != rhs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChartFilter {
    pub column: String,
    pub operator: FilterOp,
    pub value: String,
}

/// Validated chart request, normalized from agent arguments by the tool
/// adapter before it ever reaches the compiler.
#[derive(Debug, Clone)]
pub struct ChartRequest {
    pub file_path: String,
    pub chart_type: ChartType,
    pub x_column: String,
    pub series_columns: Vec<String>,
    pub filters: Vec<ChartFilter>,
    pub title: String,
    pub description: String,
}

/// Shape rows into a chart-ready dataset. Pure: same inputs, same output.
/// Empty results are valid (empty chart), never an error.
pub fn compile_chart(rows: &RowSet, request: &ChartRequest) -> Vec<Value> {
    if rows.rows.is_empty() {
        return Vec::new();
    }

    let filtered: Vec<&Row> = if request.filters.is_empty() {
        rows.rows.iter().collect()
    } else {
        rows.rows
            .iter()
            .filter(|row| request.filters.iter().all(|f| filter_matches(row, f)))
            .collect()
    };

    // Count aggregation wins when the agent asked for a "Count" series that
    // isn't a real column, or gave no series for a bar/pie chart.
    let requested_count = request
        .series_columns
        .iter()
        .any(|col| col.eq_ignore_ascii_case("count") && !rows.columns.contains(col))
        || (request.series_columns.is_empty()
            && matches!(request.chart_type, ChartType::Bar | ChartType::Pie));

    let mut results = if requested_count {
        count_by_key(&filtered, &request.x_column)
    } else if request.chart_type == ChartType::Histogram {
        histogram_bins(&filtered, &request.x_column)
    } else {
        raw_rows(&filtered, request)
    };

    results.truncate(MAX_CHART_ROWS);
    results
}

/// A filter holds only when both sides parse and the comparison passes;
/// ambiguous rows are excluded, not passed through.
fn filter_matches(row: &Row, filter: &ChartFilter) -> bool {
    let lhs = match row.get(&filter.column).and_then(|v| extract_number(v)) {
        Some(v) => v,
        None => return false,
    };
    let rhs = match filter.value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => return false,
    };
    filter.operator.apply(lhs, rhs)
}

fn count_by_key(filtered: &[&Row], x_column: &str) -> Vec<Value> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, u64> = HashMap::new();

    for row in filtered {
        let key = row
            .get(x_column)
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .unwrap_or("Unknown")
            .to_string();
        if !counts.contains_key(&key) {
            order.push(key.clone());
        }
        *counts.entry(key).or_insert(0) += 1;
    }

    order
        .into_iter()
        .map(|key| {
            let count = counts[&key];
            let mut obj = Map::new();
            obj.insert(x_column.to_string(), Value::String(key));
            obj.insert("Count".to_string(), Value::Number(count.into()));
            Value::Object(obj)
        })
        .collect()
}

fn histogram_bins(filtered: &[&Row], x_column: &str) -> Vec<Value> {
    let values: Vec<f64> = filtered
        .iter()
        .filter_map(|row| row.get(x_column))
        .filter_map(|v| extract_number(v))
        .filter(|v| v.is_finite())
        .collect();

    if values.is_empty() {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let bin_count = (values.len() as f64).sqrt().round() as usize;
    let bin_count = bin_count.clamp(MIN_BINS, MAX_BINS);

    let step = (max - min) / bin_count as f64;
    // All-identical values collapse the range; fall back to unit-wide bins.
    let width = if step == 0.0 { 1.0 } else { step };

    let mut bins = vec![0u64; bin_count];
    for value in &values {
        // The max value lands exactly on the upper edge; clamp it into the
        // last bin.
        let index = ((value - min) / width).floor() as isize;
        let index = index.clamp(0, bin_count as isize - 1) as usize;
        bins[index] += 1;
    }

    (0..bin_count)
        .map(|i| {
            let low = min + i as f64 * width;
            let high = min + (i + 1) as f64 * width;
            let label = format!("{}-{}", format_edge(low), format_edge(high));
            let mut obj = Map::new();
            obj.insert(x_column.to_string(), Value::String(label));
            obj.insert("Frequency".to_string(), Value::Number(bins[i].into()));
            Value::Object(obj)
        })
        .collect()
}

fn format_edge(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

/// One output row per filtered input row. The x value stays in its raw
/// string form (axes are frequently categorical); series values are coerced
/// to numbers with a 0 default since a Y-axis series must render numerically.
fn raw_rows(filtered: &[&Row], request: &ChartRequest) -> Vec<Value> {
    filtered
        .iter()
        .map(|row| {
            let mut obj = Map::new();
            obj.insert(
                request.x_column.clone(),
                Value::String(row.get(&request.x_column).cloned().unwrap_or_default()),
            );
            for col in &request.series_columns {
                let value = row
                    .get(col)
                    .and_then(|v| extract_number(v))
                    .filter(|v| v.is_finite())
                    .unwrap_or(0.0);
                obj.insert(col.clone(), json_number(value));
            }
            Value::Object(obj)
        })
        .collect()
}

fn json_number(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or_else(|| Value::Number(0.into()))
}
