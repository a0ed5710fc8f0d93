use crate::compose::{ApiOptions, compose_options};
use crate::control::{ControlRow, ControlSheet, RejectedRow, normalize_control_sheet};
use crate::embed::{DEFAULT_EMBED_BASE_URL, EmbedFrame};
use crate::error::{VizError, VizResult};
use crate::filter::filter_rows;
use crate::settings::Settings;
use crate::sheet::{ChartData, DataRow, group_by_chart_index, load_sheets};
use crate::template::{TemplateFailure, TemplateResolver, TemplateStore};
use indexmap::IndexMap;
use log::{info, warn};
use serde::Serialize;

/// Control rows sharing a section key, in sheet order
#[derive(Debug, Clone)]
pub struct SectionDef {
    pub key: String,
    /// Mount point of the section; taken from its first row
    pub container: String,
    pub rows: Vec<ControlRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ButtonSummary {
    pub index: usize,
    pub label: String,
    pub kind: &'static str,
    pub visualisation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionSummary {
    pub key: String,
    pub container: String,
    pub buttons: Vec<ButtonSummary>,
}

/// Everything loaded at startup. Never modified afterwards.
#[derive(Debug)]
pub struct Catalog {
    sections: IndexMap<String, SectionDef>,
    chart_data: ChartData,
    templates: TemplateStore,
    rejected: Vec<RejectedRow>,
    api_key: String,
    embed_base_url: String,
}

impl Catalog {
    pub fn new(sheet: ControlSheet, data: Vec<DataRow>, templates: TemplateStore) -> Self {
        let chart_data = group_by_chart_index(data);

        let mut sections: IndexMap<String, SectionDef> = IndexMap::new();
        for row in sheet.rows {
            if row.base_chart().is_some() && !chart_data.contains_key(&row.chart_index) {
                warn!(
                    "control sheet line {}: chart_index `{}` matches no data rows",
                    row.line, row.chart_index
                );
            }
            sections
                .entry(row.section.clone())
                .or_insert_with(|| SectionDef {
                    key: row.section.clone(),
                    container: row.container.clone(),
                    rows: Vec::new(),
                })
                .rows
                .push(row);
        }

        Self {
            sections,
            chart_data,
            templates,
            rejected: sheet.rejected,
            api_key: String::new(),
            embed_base_url: DEFAULT_EMBED_BASE_URL.to_string(),
        }
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = api_key.to_string();
        self
    }

    pub fn with_embed_base_url(mut self, embed_base_url: &str) -> Self {
        self.embed_base_url = embed_base_url.to_string();
        self
    }

    pub fn sections(&self) -> impl Iterator<Item = &SectionDef> {
        self.sections.values()
    }

    pub fn section(&self, key: &str) -> VizResult<&SectionDef> {
        self.sections
            .get(key)
            .ok_or_else(|| VizError::UnknownSection(key.to_string()))
    }

    pub fn chart(&self, section: &str, index: usize) -> VizResult<&ControlRow> {
        self.section(section)?
            .rows
            .get(index)
            .ok_or_else(|| VizError::UnknownChart {
                section: section.to_string(),
                index,
            })
    }

    pub fn rejected(&self) -> &[RejectedRow] {
        &self.rejected
    }

    pub fn template_failures(&self) -> &[TemplateFailure] {
        self.templates.failures()
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    /// Rejected rows followed by failed templates, one message each.
    ///
    /// Empty when every control row and template loaded cleanly.
    pub fn problems(&self) -> Vec<String> {
        self.rejected
            .iter()
            .map(|row| row.reason.clone())
            .chain(
                self.templates
                    .failures()
                    .iter()
                    .map(|failure| format!("template `{}`: {}", failure.id, failure.reason)),
            )
            .collect()
    }

    /// Data rows joined to a control row, after its filter
    pub fn chart_rows(&self, row: &ControlRow) -> Vec<DataRow> {
        let rows = self
            .chart_data
            .get(&row.chart_index)
            .map(Vec::as_slice)
            .unwrap_or_default();
        filter_rows(rows, row.filter.as_ref())
    }

    /// API options for a base chart row
    pub fn compose(&self, row: &ControlRow) -> VizResult<ApiOptions> {
        let id = row.base_chart().ok_or_else(|| VizError::Config {
            line: row.line,
            message: "row is not a base chart".to_string(),
        })?;
        let template = self.templates.require(id)?;
        Ok(compose_options(
            row,
            template,
            self.chart_rows(row),
            &self.api_key,
        ))
    }

    pub fn embed_frame(&self, id: &str) -> EmbedFrame {
        EmbedFrame::new(&self.embed_base_url, id)
    }

    pub fn summaries(&self) -> Vec<SectionSummary> {
        self.sections()
            .map(|section| SectionSummary {
                key: section.key.clone(),
                container: section.container.clone(),
                buttons: section
                    .rows
                    .iter()
                    .enumerate()
                    .map(|(index, row)| {
                        let (kind, visualisation) = match (row.base_chart(), row.direct_chart()) {
                            (Some(id), _) => ("base", id),
                            (_, Some(id)) => ("direct", id),
                            _ => ("none", ""),
                        };
                        ButtonSummary {
                            index,
                            label: row.chart_label.clone(),
                            kind,
                            visualisation: visualisation.to_string(),
                        }
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Loads both sheets, fetches every referenced template and builds the catalog.
pub async fn load_catalog(settings: &Settings) -> VizResult<Catalog> {
    load_catalog_with(reqwest::Client::new(), settings).await
}

pub async fn load_catalog_with(client: reqwest::Client, settings: &Settings) -> VizResult<Catalog> {
    let sheets = load_sheets(&client, &settings.control, &settings.data).await?;

    let control = normalize_control_sheet(&sheets.control);
    let resolver = TemplateResolver::new(
        client,
        &settings.template_base_url,
        settings.fetch_timeout,
    );
    let ids = control.base_chart_ids();
    let templates = if settings.strict {
        resolver.resolve_strict(&ids).await?
    } else {
        resolver.resolve(&ids).await
    };

    let catalog = Catalog::new(control, sheets.data, templates)
        .with_api_key(&settings.api_key)
        .with_embed_base_url(&settings.embed_base_url);

    info!(
        "catalog ready: {} sections, {} templates, {} rejected rows",
        catalog.sections.len(),
        catalog.templates.len(),
        catalog.rejected.len()
    );
    Ok(catalog)
}
