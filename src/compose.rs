//! Builds the request object for the hosted charting API.
//!
//! The template's published state is the starting point. Control row settings
//! then overwrite individual fields of that state, never whole subtrees.

use crate::control::ControlRow;
use crate::sheet::DataRow;
use crate::template::TemplateConfig;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};

lazy_static! {
    static ref PLACEHOLDER_REGEX: Regex = Regex::new(r"\{([^{}]+)\}").unwrap();
}

/// Class of the region the API chart is drawn into
pub const BASE_CHART_REGION: &str = "viz-base-chart";

/// Class of the region iframes are embedded into
pub const DIRECT_CHART_REGION: &str = "viz-direct-chart";

/// Column bindings for the template's `data` dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataBindings {
    pub label: Option<String>,
    pub value: Vec<String>,
    pub metadata: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bindings {
    pub data: DataBindings,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Datasets {
    pub data: Vec<DataRow>,
}

/// Everything `Flourish.Live` needs to draw or redraw one chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiOptions {
    pub api_key: String,
    pub template: String,
    pub version: Value,
    pub container: String,
    pub state: Value,
    pub bindings: Bindings,
    pub data: Datasets,
    pub metadata: Map<String, Value>,
}

/// Replaces `{column}` placeholders with values from the first data row.
///
/// When the text holds placeholders, the result is only the looked up values
/// (each distinct column once, in order of appearance) joined by a space; any
/// literal text around them is dropped. Text without placeholders comes back
/// untouched. Missing columns, or no rows at all, produce a blank token and a
/// warning.
///
/// # Examples
/// ```
/// use sheetviz::compose::resolve_columns;
/// use sheetviz::sheet::DataRow;
///
/// let mut row = DataRow::new();
/// row.insert("q1".to_string(), "Do you like X?".to_string());
/// row.insert("q2".to_string(), "survey".to_string());
///
/// assert_eq!(resolve_columns("{q1} {q2}", &[row.clone()]), "Do you like X? survey");
/// assert_eq!(resolve_columns("Plain title", &[row]), "Plain title");
/// ```
pub fn resolve_columns(text: &str, rows: &[DataRow]) -> String {
    let mut columns: Vec<&str> = Vec::new();
    for capture in PLACEHOLDER_REGEX.captures_iter(text) {
        let column = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
        if !columns.contains(&column) {
            columns.push(column);
        }
    }

    if columns.is_empty() {
        return text.to_string();
    }

    let first = rows.first();
    columns
        .iter()
        .map(|column| match first.and_then(|row| row.get(*column)) {
            Some(value) => value.as_str(),
            None => {
                warn!("column `{}` referenced in `{}` has no value", column, text);
                ""
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sets `value` at `path`, creating (or replacing non-object) parents.
fn set_path(state: &mut Value, path: &[&str], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        *state = value;
        return;
    };
    if !state.is_object() {
        *state = Value::Object(Map::new());
    }
    if let Value::Object(object) = state {
        let child = object.entry(first.to_string()).or_insert(Value::Null);
        set_path(child, rest, value);
    }
}

/// Applies the control row's settings to a template state.
pub fn apply_overrides(row: &ControlRow, state: &mut Value, rows: &[DataRow]) {
    if let Some(chart_type) = &row.chart_type {
        set_path(state, &["chart_type"], json!(chart_type));
    }

    if row.facet {
        set_path(state, &["facet_layout"], json!("facets"));
    }

    let title = row.title.as_deref().map(|t| resolve_columns(t, rows));
    let subtitle = row.subtitle.as_deref().map(|t| resolve_columns(t, rows));
    set_path(state, &["layout", "title"], json!(title));
    set_path(state, &["layout", "subtitle"], json!(subtitle));

    set_path(
        state,
        &["x", "title"],
        json!(row.x_label.clone().unwrap_or_default()),
    );
    set_path(
        state,
        &["y", "title"],
        json!(row.y_label.clone().unwrap_or_default()),
    );

    if let Some(legend) = row.legend {
        set_path(state, &["legend_mode"], json!("on"));
        set_path(state, &["legend_filter_mode"], json!(legend.filter_mode()));
    }

    if let Some(palette) = &row.color_overrides {
        set_path(state, &["color", "categorical_custom_palette"], json!(palette));
    }
}

/// Composes the API request for one control row.
///
/// `rows` must already be filtered for the row. The template state is copied,
/// so the template itself is never modified.
pub fn compose_options(
    row: &ControlRow,
    template: &TemplateConfig,
    rows: Vec<DataRow>,
    api_key: &str,
) -> ApiOptions {
    let mut state = template.fresh_state();
    apply_overrides(row, &mut state, &rows);

    let options = ApiOptions {
        api_key: api_key.to_string(),
        template: template.template.clone(),
        version: template.version.clone(),
        container: format!("{} .{}", row.container, BASE_CHART_REGION),
        state,
        bindings: Bindings {
            data: DataBindings {
                label: row.label.clone(),
                value: row.value.clone(),
                metadata: Vec::new(),
            },
        },
        data: Datasets { data: rows },
        metadata: Map::new(),
    };

    debug!(
        "composed options for `{}` / `{}` with {} rows",
        row.section,
        row.chart_label,
        options.data.data.len()
    );
    options
}
