use crate::error::{VizError, VizResult};
use indexmap::IndexMap;
use log::{debug, info};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One data sheet row: column name to cell text, in sheet column order
pub type DataRow = IndexMap<String, String>;

/// Data rows grouped by their `chart_index` column
pub type ChartData = IndexMap<String, Vec<DataRow>>;

/// Column joining data rows to control rows
pub const CHART_INDEX_COLUMN: &str = "chart_index";

/// Where a sheet is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSource {
    File(PathBuf),
    Url(String),
}

impl SheetSource {
    /// Treats anything starting with `http://` or `https://` as a URL and
    /// everything else as a local path.
    pub fn parse(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            SheetSource::Url(value.to_string())
        } else {
            SheetSource::File(PathBuf::from(value))
        }
    }

    pub fn name(&self) -> String {
        match self {
            SheetSource::File(path) => path.display().to_string(),
            SheetSource::Url(url) => url.clone(),
        }
    }

    /// Reads the whole sheet as text.
    ///
    /// Remote sheets get a timestamp query parameter so intermediate caches
    /// never serve a stale copy.
    pub async fn read(&self, client: &reqwest::Client) -> VizResult<String> {
        match self {
            SheetSource::File(path) => Ok(tokio::fs::read_to_string(path).await?),
            SheetSource::Url(url) => {
                let separator = if url.contains('?') { '&' } else { '?' };
                let busted = format!(
                    "{}{}{}",
                    url,
                    separator,
                    chrono::Utc::now().timestamp_millis()
                );
                debug!("fetching sheet {}", busted);

                let response = client.get(&busted).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(VizError::Sheet {
                        source_name: url.clone(),
                        reason: format!("server answered {}", status),
                    });
                }
                Ok(response.text().await?)
            }
        }
    }
}

/// Control sheet record exactly as written in the sheet.
///
/// Every column is optional here; the normaliser decides what is required.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControlRecord {
    pub section: Option<String>,
    pub chart_label: Option<String>,
    pub chart_index: Option<String>,
    pub base_chart: Option<String>,
    pub direct_chart: Option<String>,
    pub container: Option<String>,
    pub label: Option<String>,
    pub value: Option<String>,
    pub filter: Option<String>,
    pub chart_type: Option<String>,
    pub facet: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub x_label: Option<String>,
    pub y_label: Option<String>,
    pub legend: Option<String>,
    pub color_overrides: Option<String>,
}

/// A control record together with the sheet line it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlLine {
    pub line: usize,
    pub record: ControlRecord,
}

/// Parses control sheet CSV text.
///
/// Unknown columns are ignored and blank cells read as missing.
pub fn parse_control_sheet(text: &str) -> VizResult<Vec<ControlLine>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();

    let mut lines = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record
            .position()
            .map(|p| line_at(text, p.byte() as usize))
            .unwrap_or(0);
        let record: ControlRecord = record.deserialize(Some(&headers))?;
        lines.push(ControlLine { line, record });
    }

    Ok(lines)
}

/// 1-based line of the record starting at `byte`.
///
/// The reader skips blank lines without counting them, and a record's
/// position can point at the blank lines in front of it.
fn line_at(text: &str, byte: usize) -> usize {
    let bytes = text.as_bytes();
    let mut start = byte.min(bytes.len());
    while start < bytes.len() && matches!(bytes[start], b'\r' | b'\n') {
        start += 1;
    }
    1 + bytes[..start].iter().filter(|&&b| b == b'\n').count()
}

/// Parses data sheet CSV text into rows keyed by header.
///
/// Cell text is kept verbatim; only header names are trimmed.
pub fn parse_data_sheet(text: &str) -> VizResult<Vec<DataRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let row: DataRow = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| (header.to_string(), cell.to_string()))
            .collect();
        rows.push(row);
    }

    Ok(rows)
}

/// Groups data rows by `chart_index`, keeping sheet order inside each group.
///
/// Rows without the column are grouped under the empty key.
pub fn group_by_chart_index(rows: Vec<DataRow>) -> ChartData {
    let mut groups = ChartData::new();
    for row in rows {
        let key = row.get(CHART_INDEX_COLUMN).cloned().unwrap_or_default();
        groups.entry(key).or_default().push(row);
    }
    groups
}

/// Both sheets, freshly read
#[derive(Debug, Clone)]
pub struct Sheets {
    pub control: Vec<ControlLine>,
    pub data: Vec<DataRow>,
}

/// Reads the control and data sheets concurrently.
pub async fn load_sheets(
    client: &reqwest::Client,
    control: &SheetSource,
    data: &SheetSource,
) -> VizResult<Sheets> {
    let (control_text, data_text) = tokio::try_join!(
        read_named(client, control),
        read_named(client, data)
    )?;

    let control_lines = parse_control_sheet(&control_text).map_err(|e| VizError::Sheet {
        source_name: control.name(),
        reason: e.to_string(),
    })?;
    let data_rows = parse_data_sheet(&data_text).map_err(|e| VizError::Sheet {
        source_name: data.name(),
        reason: e.to_string(),
    })?;

    info!(
        "loaded {} control rows and {} data rows",
        control_lines.len(),
        data_rows.len()
    );

    Ok(Sheets {
        control: control_lines,
        data: data_rows,
    })
}

async fn read_named(client: &reqwest::Client, source: &SheetSource) -> VizResult<String> {
    source.read(client).await.map_err(|e| match e {
        VizError::Sheet { .. } => e,
        other => VizError::Sheet {
            source_name: source.name(),
            reason: other.to_string(),
        },
    })
}

/// Convenience for callers that only have paths.
pub async fn load_sheet_files(control: impl AsRef<Path>, data: impl AsRef<Path>) -> VizResult<Sheets> {
    let client = reqwest::Client::new();
    load_sheets(
        &client,
        &SheetSource::File(control.as_ref().to_path_buf()),
        &SheetSource::File(data.as_ref().to_path_buf()),
    )
    .await
}
