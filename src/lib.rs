/*!
# Sheet Charts

Builds pages of interactive charts from two spreadsheets.

## Overview

A *control sheet* lists chart variants: which section of the page they belong
to, where the section is mounted, which published visualisation backs them
and how to tweak it. A *data sheet* holds the rows those charts plot, joined
to control rows by `chart_index`.

Each variant is either a **base chart**, drawn through the hosted charting
API from a published template plus the control row's overrides and data, or
a **direct chart**, embedded as a sandboxed iframe.

## Pipeline

1. `sheet` reads both sheets (local files or URLs) concurrently.
2. `control` validates each control row and expands its `value` list and
   `filter` string (see `filter`). Invalid rows are set aside, not fatal.
3. `template` fetches one template per distinct base chart id, in parallel,
   each bounded by a timeout.
4. `catalog` groups rows into sections and joins them with their data.
5. `session` tracks what each page view has built and turns navigation clicks
   into render commands; `compose` and `embed` build the payloads.
6. `app` (feature `web`) serves the page and answers clicks over HTTP.

## Modules

- **filter**: filter grammar, predicates and row filtering
- **sheet**: CSV loading and grouping by chart index
- **control**: control row validation and normalisation
- **template**: template fetching and storage
- **compose**: `{column}` title templating and API option composition
- **embed**: iframe embeds
- **catalog**: startup product shared by every page view
- **session**: per-view navigation state machine
- **app**: routing and page rendering
*/

pub mod catalog;
pub mod compose;
pub mod control;
pub mod embed;
pub mod error;
pub mod filter;
pub mod session;
pub mod settings;
pub mod sheet;
pub mod template;

#[cfg(feature = "web")]
pub mod app;

pub use catalog::{Catalog, SectionDef, load_catalog, load_catalog_with};
pub use compose::{ApiOptions, compose_options, resolve_columns};
pub use control::{ChartSource, ControlRow, LegendMode, normalize_control_sheet};
pub use error::{FilterError, VizError, VizResult};
pub use filter::{Filter, FilterClause, Operator, filter_rows, parse_filter};
pub use session::{ChartHandle, Command, Region, SectionVisual, Session};
pub use settings::Settings;
pub use sheet::{DataRow, SheetSource};
pub use template::{TemplateConfig, TemplateResolver, TemplateStore};
