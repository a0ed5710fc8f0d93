//! Navigation state of one page view.
//!
//! Each section shows one chart variant at a time. Clicking a navigation
//! button produces a batch of [`Command`]s that the browser applies in order.
//! A section's API chart is created once and only updated afterwards, even
//! while an embedded chart is shown in its place.

use crate::catalog::{Catalog, SectionSummary};
use crate::compose::{ApiOptions, DIRECT_CHART_REGION};
use crate::control::ChartSource;
use crate::embed::EmbedFrame;
use crate::error::{VizError, VizResult};
use indexmap::IndexMap;
use log::{debug, warn};
use serde::Serialize;
use std::sync::Arc;

/// Caller-held reference to one live `Flourish.Live` instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ChartHandle(pub u64);

/// What a section has built so far
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SectionVisual {
    #[default]
    Unbuilt,

    /// The API chart is built and visible
    ApiChart(ChartHandle),

    /// An embed is visible; `chart` is the API chart hidden behind it, if any
    Embed {
        embed_id: String,
        chart: Option<ChartHandle>,
    },
}

impl SectionVisual {
    pub fn chart(&self) -> Option<ChartHandle> {
        match self {
            SectionVisual::Unbuilt => None,
            SectionVisual::ApiChart(handle) => Some(*handle),
            SectionVisual::Embed { chart, .. } => *chart,
        }
    }
}

/// The two chart regions of a section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Base,
    Direct,
}

/// One step for the browser to apply
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    /// Mark `index` as the only selected button of the section
    Select { section: String, index: usize },

    /// Build a new chart instance
    Create {
        section: String,
        handle: ChartHandle,
        options: Box<ApiOptions>,
    },

    /// Feed new options to an existing chart instance
    Update {
        section: String,
        handle: ChartHandle,
        options: Box<ApiOptions>,
    },

    /// Replace the embed region's contents with an iframe
    Embed {
        section: String,
        container: String,
        html: String,
        frame: EmbedFrame,
    },

    /// Make one region visible and hide the other
    Show { section: String, region: Region },

    /// The chart could not be built
    Failed {
        section: String,
        index: usize,
        message: String,
    },
}

#[derive(Debug, Clone, Default)]
struct SectionState {
    selected: Option<usize>,
    visual: SectionVisual,
    /// Visualisation currently loaded in the embed region
    embedded: Option<String>,
}

/// Section summary plus the view's current selection
#[derive(Debug, Clone, Serialize)]
pub struct SectionView {
    #[serde(flatten)]
    pub summary: SectionSummary,
    pub selected: Option<usize>,
}

/// Per-view state over a shared catalog
#[derive(Debug)]
pub struct Session {
    catalog: Arc<Catalog>,
    states: IndexMap<String, SectionState>,
    next_handle: u64,
}

impl Session {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        let states = catalog
            .sections()
            .map(|section| (section.key.clone(), SectionState::default()))
            .collect();
        Self {
            catalog,
            states,
            next_handle: 0,
        }
    }

    /// Creates a session and activates the first chart of every section.
    pub fn open(catalog: Arc<Catalog>) -> (Self, Vec<Command>) {
        let mut session = Session::new(catalog);
        let keys: Vec<String> = session.states.keys().cloned().collect();

        let mut commands = Vec::new();
        for key in keys {
            match session.activate(&key, 0) {
                Ok(batch) => commands.extend(batch),
                Err(e) => warn!("section `{}` could not be opened: {}", key, e),
            }
        }
        (session, commands)
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn visual(&self, section: &str) -> Option<&SectionVisual> {
        self.states.get(section).map(|state| &state.visual)
    }

    pub fn selected(&self, section: &str) -> Option<usize> {
        self.states.get(section).and_then(|state| state.selected)
    }

    pub fn views(&self) -> Vec<SectionView> {
        self.catalog
            .summaries()
            .into_iter()
            .map(|summary| {
                let selected = self.selected(&summary.key);
                SectionView { summary, selected }
            })
            .collect()
    }

    fn allocate_handle(&mut self) -> ChartHandle {
        self.next_handle += 1;
        ChartHandle(self.next_handle)
    }

    /// Handles a click on button `index` of `section`.
    ///
    /// Unknown sections or indexes are errors. A chart that cannot be built
    /// yields a [`Command::Failed`] instead, leaving other sections untouched.
    pub fn activate(&mut self, section: &str, index: usize) -> VizResult<Vec<Command>> {
        let catalog = Arc::clone(&self.catalog);
        let row = catalog.chart(section, index)?;
        let (current, embedded) = self
            .states
            .get(section)
            .map(|state| (state.visual.clone(), state.embedded.clone()))
            .ok_or_else(|| VizError::UnknownSection(section.to_string()))?;
        let mut embedded_now = embedded.clone();

        let mut commands = vec![Command::Select {
            section: section.to_string(),
            index,
        }];

        let visual = match &row.source {
            ChartSource::Base(_) => match catalog.compose(row) {
                Ok(options) => {
                    let options = Box::new(options);
                    let handle = match current.chart() {
                        Some(handle) => {
                            commands.push(Command::Update {
                                section: section.to_string(),
                                handle,
                                options,
                            });
                            handle
                        }
                        None => {
                            let handle = self.allocate_handle();
                            commands.push(Command::Create {
                                section: section.to_string(),
                                handle,
                                options,
                            });
                            handle
                        }
                    };
                    SectionVisual::ApiChart(handle)
                }
                Err(e) => {
                    warn!("section `{}` chart {}: {}", section, index, e);
                    commands.push(Command::Failed {
                        section: section.to_string(),
                        index,
                        message: e.to_string(),
                    });
                    current
                        .chart()
                        .map(SectionVisual::ApiChart)
                        .unwrap_or_default()
                }
            },
            ChartSource::Direct(id) => {
                // The iframe is kept while hidden, so re-selecting it needs no rebuild.
                if embedded.as_deref() != Some(id.as_str()) {
                    let frame = catalog.embed_frame(id);
                    commands.push(Command::Embed {
                        section: section.to_string(),
                        container: format!("{} .{}", row.container, DIRECT_CHART_REGION),
                        html: frame.html(),
                        frame,
                    });
                    embedded_now = Some(id.clone());
                }
                SectionVisual::Embed {
                    embed_id: id.clone(),
                    chart: current.chart(),
                }
            }
        };

        let region = match row.source {
            ChartSource::Base(_) => Region::Base,
            ChartSource::Direct(_) => Region::Direct,
        };
        commands.push(Command::Show {
            section: section.to_string(),
            region,
        });

        if let Some(state) = self.states.get_mut(section) {
            state.selected = Some(index);
            state.visual = visual;
            state.embedded = embedded_now;
        }

        debug!(
            "section `{}` chart {} -> {} commands",
            section,
            index,
            commands.len()
        );
        Ok(commands)
    }
}
