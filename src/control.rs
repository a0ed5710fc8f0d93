use crate::error::{VizError, VizResult};
use crate::filter::{Filter, parse_filter};
use crate::sheet::ControlLine;
use log::warn;
use serde::Serialize;

/// Which remote visualisation backs a control row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ChartSource {
    /// Rendered through the charting API from a template id
    Base(String),

    /// Embedded as an iframe by visualisation id
    Direct(String),
}

/// How the legend behaves when a series is clicked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegendMode {
    /// Clicking a legend entry shows only that series
    Single,

    /// Clicking a legend entry hides that series
    Multi,
}

impl LegendMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "single" => Some(LegendMode::Single),
            "multi" => Some(LegendMode::Multi),
            _ => None,
        }
    }

    pub fn filter_mode(&self) -> &'static str {
        match self {
            LegendMode::Single => "filter-in",
            LegendMode::Multi => "filter-out",
        }
    }
}

/// One validated chart variant from the control sheet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlRow {
    pub line: usize,
    pub section: String,
    pub chart_label: String,
    pub chart_index: String,
    pub source: ChartSource,
    pub container: String,
    pub label: Option<String>,
    pub value: Vec<String>,
    pub filter: Option<Filter>,
    pub chart_type: Option<String>,
    pub facet: bool,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub x_label: Option<String>,
    pub y_label: Option<String>,
    pub legend: Option<LegendMode>,
    pub color_overrides: Option<String>,
}

impl ControlRow {
    pub fn base_chart(&self) -> Option<&str> {
        match &self.source {
            ChartSource::Base(id) => Some(id),
            ChartSource::Direct(_) => None,
        }
    }

    pub fn direct_chart(&self) -> Option<&str> {
        match &self.source {
            ChartSource::Direct(id) => Some(id),
            ChartSource::Base(_) => None,
        }
    }
}

/// A control sheet line that failed validation
#[derive(Debug, Clone, Serialize)]
pub struct RejectedRow {
    pub line: usize,
    pub section: Option<String>,
    pub reason: String,
}

/// Result of normalising a whole control sheet
#[derive(Debug, Clone, Default)]
pub struct ControlSheet {
    pub rows: Vec<ControlRow>,
    pub rejected: Vec<RejectedRow>,
}

impl ControlSheet {
    /// Distinct template ids in first-seen order
    pub fn base_chart_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for id in self.rows.iter().filter_map(ControlRow::base_chart) {
            if !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        }
        ids
    }
}

/// Splits a delimited `value` cell into column names.
pub fn split_columns(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|column| !column.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_truthy(value: &str) -> bool {
    !matches!(
        value.to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no"
    )
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

/// Validates one control line and expands its delimited fields.
pub fn normalize_row(line: &ControlLine) -> VizResult<ControlRow> {
    let record = &line.record;
    let config_error = |message: &str| VizError::Config {
        line: line.line,
        message: message.to_string(),
    };

    let section = non_empty(&record.section).ok_or_else(|| config_error("missing section"))?;
    let container =
        non_empty(&record.container).ok_or_else(|| config_error("missing container selector"))?;

    let source = match (non_empty(&record.base_chart), non_empty(&record.direct_chart)) {
        (Some(base), None) => ChartSource::Base(base),
        (None, Some(direct)) => ChartSource::Direct(direct),
        (Some(_), Some(_)) => {
            return Err(config_error(
                "assign either a base_chart or a direct_chart visualisation id, not both",
            ));
        }
        (None, None) => {
            return Err(config_error(
                "assign either a base_chart or a direct_chart visualisation id",
            ));
        }
    };

    let filter = match non_empty(&record.filter) {
        Some(raw) => Some(parse_filter(&raw).map_err(|source| VizError::Filter {
            line: line.line,
            source,
        })?),
        None => None,
    };

    let legend = match non_empty(&record.legend) {
        Some(raw) => Some(LegendMode::parse(&raw).ok_or_else(|| VizError::Config {
            line: line.line,
            message: format!("legend must be `single` or `multi`, got `{}`", raw),
        })?),
        None => None,
    };

    Ok(ControlRow {
        line: line.line,
        section,
        chart_label: record.chart_label.clone().unwrap_or_default(),
        chart_index: record.chart_index.clone().unwrap_or_default(),
        source,
        container,
        label: non_empty(&record.label),
        value: record.value.as_deref().map(split_columns).unwrap_or_default(),
        filter,
        chart_type: non_empty(&record.chart_type),
        facet: record.facet.as_deref().map(is_truthy).unwrap_or(false),
        title: non_empty(&record.title),
        subtitle: non_empty(&record.subtitle),
        x_label: non_empty(&record.x_label),
        y_label: non_empty(&record.y_label),
        legend,
        color_overrides: non_empty(&record.color_overrides),
    })
}

/// Normalises every control line; invalid lines are logged and set aside.
pub fn normalize_control_sheet(lines: &[ControlLine]) -> ControlSheet {
    let mut sheet = ControlSheet::default();

    for line in lines {
        match normalize_row(line) {
            Ok(row) => sheet.rows.push(row),
            Err(e) => {
                warn!("rejected control row: {}", e);
                sheet.rejected.push(RejectedRow {
                    line: line.line,
                    section: non_empty(&line.record.section),
                    reason: e.to_string(),
                });
            }
        }
    }

    sheet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterClause, Operator};
    use crate::sheet::ControlRecord;

    fn line(record: ControlRecord) -> ControlLine {
        ControlLine { line: 2, record }
    }

    fn base_record() -> ControlRecord {
        ControlRecord {
            section: Some("S1".to_string()),
            chart_label: Some("First".to_string()),
            chart_index: Some("1".to_string()),
            base_chart: Some("T1".to_string()),
            container: Some("#viz".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn expands_value_and_filter() {
        let row = normalize_row(&line(ControlRecord {
            value: Some("q1, q2 ,,q3".to_string()),
            filter: Some("region::neq::North".to_string()),
            ..base_record()
        }))
        .unwrap();

        assert_eq!(row.value, vec!["q1", "q2", "q3"]);
        assert_eq!(
            row.filter.unwrap().clauses(),
            &[FilterClause::new("region", Operator::NotEquals, Some("North"))]
        );
        assert_eq!(row.source, ChartSource::Base("T1".to_string()));
    }

    #[test]
    fn needs_exactly_one_chart_source() {
        let neither = normalize_row(&line(ControlRecord {
            base_chart: None,
            ..base_record()
        }));
        assert!(matches!(neither, Err(VizError::Config { line: 2, .. })));

        let both = normalize_row(&line(ControlRecord {
            direct_chart: Some("D1".to_string()),
            ..base_record()
        }));
        assert!(matches!(both, Err(VizError::Config { .. })));

        let direct = normalize_row(&line(ControlRecord {
            base_chart: None,
            direct_chart: Some("D1".to_string()),
            ..base_record()
        }))
        .unwrap();
        assert_eq!(direct.direct_chart(), Some("D1"));
    }

    #[test]
    fn rejects_unknown_legend_and_operator() {
        let legend = normalize_row(&line(ControlRecord {
            legend: Some("both".to_string()),
            ..base_record()
        }));
        assert!(matches!(legend, Err(VizError::Config { .. })));

        for raw in ["Single", "MULTI"] {
            let legend = normalize_row(&line(ControlRecord {
                legend: Some(raw.to_string()),
                ..base_record()
            }));
            assert!(matches!(legend, Err(VizError::Config { line: 2, .. })), "{raw}");
        }
        assert_eq!(LegendMode::parse("multi"), Some(LegendMode::Multi));

        let filter = normalize_row(&line(ControlRecord {
            filter: Some("a::like::b".to_string()),
            ..base_record()
        }));
        assert!(matches!(filter, Err(VizError::Filter { line: 2, .. })));
    }

    #[test]
    fn facet_flag_reads_common_spellings() {
        for (raw, expected) in [("x", true), ("TRUE", true), ("0", false), ("No", false)] {
            let row = normalize_row(&line(ControlRecord {
                facet: Some(raw.to_string()),
                ..base_record()
            }))
            .unwrap();
            assert_eq!(row.facet, expected, "facet `{}`", raw);
        }
    }

    #[test]
    fn sheet_keeps_valid_rows_and_reports_the_rest() {
        let lines = vec![
            line(base_record()),
            ControlLine {
                line: 3,
                record: ControlRecord {
                    base_chart: None,
                    ..base_record()
                },
            },
            ControlLine {
                line: 4,
                record: ControlRecord {
                    base_chart: Some("T2".to_string()),
                    ..base_record()
                },
            },
            ControlLine {
                line: 5,
                record: base_record(),
            },
        ];

        let sheet = normalize_control_sheet(&lines);
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.rejected.len(), 1);
        assert_eq!(sheet.rejected[0].line, 3);
        assert_eq!(sheet.base_chart_ids(), vec!["T1", "T2"]);
    }
}
