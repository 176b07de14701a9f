use serde_json::{json, Value};

use crate::error::AppError;
use crate::models::ChartPayload;
use crate::services::chart::{self, ChartFilter, ChartRequest, ChartType, FilterOp};
use crate::services::row_source;

pub const CHART_TOOL_NAME: &str = "generate_chart";

pub const CHART_TOOL_DESCRIPTION: &str =
    "Generates a chart/graph from the CSV data. Use this tool when the user asks to visualize data.";

/// JSON schema for the tool declaration. Kept deliberately relaxed: the
/// agent may omit fields or mistype them, and the adapter reports problems
/// back as tool output rather than letting schema validation reject the call.
pub fn chart_tool_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "file_path": {
                "type": "string",
                "description": "The absolute path to the CSV file to analyze"
            },
            "chart_type": {
                "type": "string",
                "description": "The type of chart to generate (bar, line, scatter, pie, histogram, area)"
            },
            "x_column": {
                "type": "string",
                "description": "The column name for the X-axis"
            },
            "series_columns": {
                "description": "Array of column names for the Y-axis/Series."
            },
            "filters": {
                "description": "Optional array of {column, operator, value} numeric filters."
            },
            "title": {
                "type": "string",
                "description": "A descriptive title for the chart"
            },
            "description": {
                "type": "string",
                "description": "A brief explanation of what the chart shows"
            }
        }
    })
}

/// Run the chart tool against loosely-typed agent arguments. Always returns
/// a string: either a serialized ChartPayload, a JSON error object, or an
/// error sentence the agent can read and retry from. The agent loop must
/// never crash because one tool call failed.
pub async fn generate_chart(args: &Value) -> String {
    tracing::info!(raw_input = %args, "generate_chart invoked");

    match run_chart_tool(args).await {
        Ok(output) => output,
        Err(err) => {
            tracing::error!("Chart tool failure: {}", err);
            format!("System Error generating chart: {}", err)
        }
    }
}

async fn run_chart_tool(args: &Value) -> Result<String, AppError> {
    let file_path = string_field(args, "file_path");
    let chart_type_raw = string_field(args, "chart_type");
    let x_column = string_field(args, "x_column");

    let (Some(file_path), Some(chart_type_raw), Some(x_column)) =
        (file_path, chart_type_raw, x_column)
    else {
        return Ok(format!(
            "Error: Missing required fields (file_path, chart_type, or x_column). Received Input: {}",
            args
        ));
    };

    let Some(chart_type) = ChartType::parse(&chart_type_raw) else {
        return Ok(format!(
            "Error: Unsupported chart_type '{}'. Expected one of: bar, line, scatter, pie, histogram, area.",
            chart_type_raw
        ));
    };

    let series_columns = coerce_series_columns(args.get("series_columns"));
    let filters = match coerce_filters(args.get("filters")) {
        Ok(filters) => filters,
        Err(message) => return Ok(message),
    };

    let request = ChartRequest {
        file_path,
        chart_type,
        x_column,
        series_columns,
        filters,
        title: string_field(args, "title").unwrap_or_else(|| "Chart".to_string()),
        description: string_field(args, "description").unwrap_or_default(),
    };

    let rows = row_source::load_rows(&request.file_path).await?;
    let data = chart::compile_chart(&rows, &request);

    if data.is_empty() {
        return Ok(json!({ "error": "No data generated. Check column names or filters." }).to_string());
    }

    // Key inference: count and histogram outputs carry their own series
    // field, so an empty series list still renders correctly.
    let mut series_keys = request.series_columns.clone();
    if series_keys.is_empty() {
        if let Some(sample) = data.first() {
            if sample.get("Count").is_some() {
                series_keys = vec!["Count".to_string()];
            } else if sample.get("Frequency").is_some() {
                series_keys = vec!["Frequency".to_string()];
            }
        }
    }

    let payload = ChartPayload {
        chart_type: chart_type.as_str().to_string(),
        data,
        x_key: request.x_column,
        series_keys,
        title: request.title,
        description: request.description,
    };

    Ok(serde_json::to_string(&payload)?)
}

fn string_field(args: &Value, field: &str) -> Option<String> {
    args.get(field)
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

/// The agent frequently passes a bare string where a sequence is expected;
/// wrap it rather than reject it.
fn coerce_series_columns(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|v| v.to_string())
            .collect(),
        Some(Value::String(single)) if !single.is_empty() => vec![single.clone()],
        _ => Vec::new(),
    }
}

fn coerce_filters(value: Option<&Value>) -> Result<Vec<ChartFilter>, String> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(format!(
                "Error: 'filters' must be an array of {{column, operator, value}} objects. Received: {}",
                other
            ))
        }
    };

    let mut filters = Vec::with_capacity(items.len());
    for item in items {
        let column = item.get("column").and_then(|v| v.as_str());
        let operator = item
            .get("operator")
            .and_then(|v| v.as_str())
            .and_then(FilterOp::parse);
        let threshold = match item.get("value") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        match (column, operator, threshold) {
            (Some(column), Some(operator), Some(value)) => filters.push(ChartFilter {
                column: column.to_string(),
                operator,
                value,
            }),
            _ => {
                return Err(format!(
                    "Error: Invalid filter entry. Expected {{column, operator (>,<,>=,<=,==,!=), value}}. Received: {}",
                    item
                ))
            }
        }
    }

    Ok(filters)
}
