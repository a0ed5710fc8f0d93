use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use handlebars::Handlebars;
use indexmap::IndexMap;
use log::{debug, info};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;

use crate::catalog::Catalog;
use crate::control::RejectedRow;
use crate::error::{VizError, VizResult};
use crate::session::{Command, SectionView, Session};
use crate::template::TemplateFailure;

/// Script providing `Flourish.Live`
pub const LIVE_SCRIPT_URL: &str = "https://cdn.flourish.rocks/flourish-live-v4.0.0.min.js";

/// Page views kept before the least recently used is dropped
const MAX_VIEWS: usize = 1024;

const PAGE_TEMPLATE: &str = "page";

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub bind: String,
    /// Handlebars file used instead of the built-in page
    pub page_template: Option<PathBuf>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            page_template: None,
        }
    }
}

pub struct AppState {
    catalog: Arc<Catalog>,
    /// Live views, least recently used first
    views: Mutex<IndexMap<String, Session>>,
    max_views: usize,
    pages: Handlebars<'static>,
}

impl AppState {
    pub fn new(catalog: Catalog, page_template: Option<&std::path::Path>) -> VizResult<Self> {
        let mut pages = Handlebars::new();
        pages.set_strict_mode(false);
        match page_template {
            Some(path) => pages
                .register_template_file(PAGE_TEMPLATE, path)
                .map_err(|e| VizError::Page(e.to_string()))?,
            None => pages
                .register_template_string(PAGE_TEMPLATE, include_str!("./static/page.hbs"))
                .map_err(|e| VizError::Page(e.to_string()))?,
        }

        Ok(Self {
            catalog: Arc::new(catalog),
            views: Mutex::new(IndexMap::new()),
            max_views: MAX_VIEWS,
            pages,
        })
    }

    pub fn with_max_views(mut self, max_views: usize) -> Self {
        self.max_views = max_views.max(1);
        self
    }

    pub fn view_count(&self) -> usize {
        self.views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    message: Option<String>,
}

/// Maps library errors onto HTTP responses
pub struct ApiError(VizError);

impl From<VizError> for ApiError {
    fn from(e: VizError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            VizError::UnknownSession(_)
            | VizError::UnknownSection(_)
            | VizError::UnknownChart { .. } => StatusCode::NOT_FOUND,
            VizError::TemplateFetch { .. } | VizError::TemplateUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }
            VizError::Config { .. } | VizError::Filter { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(StatusResponse {
                status: "error".to_string(),
                message: Some(self.0.to_string()),
            }),
        )
            .into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_page))
        .route("/assets/sections.js", get(serve_script))
        .route("/assets/sections.css", get(serve_styles))
        .route("/api/sections", get(list_sections))
        .route(
            "/api/views/:view/sections/:section/charts/:index",
            post(activate_chart),
        )
        .route(
            "/api/sections/:section/charts/:index/options",
            get(preview_options),
        )
        .with_state(state)
}

pub async fn run(catalog: Catalog, options: ServerOptions) -> VizResult<()> {
    let state = Arc::new(AppState::new(catalog, options.page_template.as_deref())?);
    let app = router(state);

    let listener = TcpListener::bind(&options.bind).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Element created on the page for a simple `#id` or `.class` selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mount {
    pub attribute: &'static str,
    pub value: String,
}

/// Host element for a container selector, when it is a single id or class
pub fn mount_for(selector: &str) -> Option<Mount> {
    let (attribute, name) = if let Some(name) = selector.strip_prefix('#') {
        ("id", name)
    } else if let Some(name) = selector.strip_prefix('.') {
        ("class", name)
    } else {
        return None;
    };

    let simple = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    simple.then(|| Mount {
        attribute,
        value: name.to_string(),
    })
}

#[derive(Serialize)]
struct BootPayload<'a> {
    view: &'a str,
    sections: Vec<SectionView>,
    commands: Vec<Command>,
}

#[derive(Serialize)]
struct PageContext<'a> {
    view: &'a str,
    live_script: &'a str,
    mounts: Vec<Mount>,
    rejected: &'a [RejectedRow],
    failures: &'a [TemplateFailure],
    boot: String,
}

async fn serve_page(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    let view = uuid::Uuid::new_v4().to_string();
    let (session, commands) = Session::open(Arc::clone(&state.catalog));

    let boot = serde_json::to_string(&BootPayload {
        view: &view,
        sections: session.views(),
        commands,
    })
    .map_err(VizError::from)?
    .replace("</", "<\\/");

    let mut mounts: Vec<Mount> = Vec::new();
    for section in state.catalog.sections() {
        if let Some(mount) = mount_for(&section.container) {
            if !mounts.contains(&mount) {
                mounts.push(mount);
            }
        }
    }

    let page = state
        .pages
        .render(
            PAGE_TEMPLATE,
            &PageContext {
                view: &view,
                live_script: LIVE_SCRIPT_URL,
                mounts,
                rejected: state.catalog.rejected(),
                failures: state.catalog.template_failures(),
                boot,
            },
        )
        .map_err(|e| VizError::Page(e.to_string()))?;

    let mut views = state.views.lock().unwrap_or_else(PoisonError::into_inner);
    views.insert(view.clone(), session);
    while views.len() > state.max_views {
        if let Some((evicted, _)) = views.shift_remove_index(0) {
            debug!("dropped idle view {}", evicted);
        }
    }
    debug!("opened view {} ({} live)", view, views.len());

    Ok(Html(page))
}

async fn serve_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript")],
        include_str!("./static/sections.js"),
    )
}

async fn serve_styles() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/css")],
        include_str!("./static/sections.css"),
    )
}

async fn list_sections(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.catalog.summaries())
}

async fn activate_chart(
    Path((view, section, index)): Path<(String, String, usize)>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Command>>, ApiError> {
    let mut views = state.views.lock().unwrap_or_else(PoisonError::into_inner);
    let position = views
        .get_index_of(&view)
        .ok_or_else(|| VizError::UnknownSession(view.clone()))?;
    let last = views.len() - 1;
    views.move_index(position, last);

    let (_, session) = views
        .get_index_mut(last)
        .ok_or_else(|| VizError::UnknownSession(view.clone()))?;
    Ok(Json(session.activate(&section, index)?))
}

async fn preview_options(
    Path((section, index)): Path<(String, usize)>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state.catalog.chart(&section, index)?;
    Ok(Json(state.catalog.compose(row)?))
}
