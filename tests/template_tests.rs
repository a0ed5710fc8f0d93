use axum::{
    Json, Router,
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use sheetviz::sheet::load_sheets;
use sheetviz::{Settings, SheetSource, TemplateResolver, VizError, load_catalog_with};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::net::TcpListener;

async fn serve_template(Path(id): Path<String>) -> Response {
    match id.as_str() {
        "missing" => StatusCode::NOT_FOUND.into_response(),
        "broken" => "not json".into_response(),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            StatusCode::OK.into_response()
        }
        _ => Json(json!({
            "name": format!("Chart {}", id),
            "template": "@flourish/line-bar-pie",
            "version": 24,
            "state": {"layout": {"title": id}, "chart_type": "line"},
        }))
        .into_response(),
    }
}

/// Starts a template host on a free port and returns its base URL
async fn spawn_template_server() -> String {
    let app = Router::new().route("/visualisation/:id/visualisation.json", get(serve_template));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/visualisation", addr)
}

fn local_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn resolver(base_url: &str) -> TemplateResolver {
    TemplateResolver::new(local_client(), base_url, Duration::from_millis(500))
}

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn fetches_every_template() {
    let base_url = spawn_template_server().await;
    let store = resolver(&base_url).resolve(&ids(&["111", "222"])).await;

    assert_eq!(store.len(), 2);
    assert!(store.failures().is_empty());

    let config = store.get("222").unwrap();
    assert_eq!(config.name, "Chart 222");
    assert_eq!(config.template, "@flourish/line-bar-pie");
    assert_eq!(config.version, json!(24));
    assert_eq!(config.fresh_state()["layout"]["title"], json!("222"));
    println!("✓ templates fetched concurrently");
}

#[tokio::test]
async fn failures_are_reported_per_template() {
    let base_url = spawn_template_server().await;
    let store = resolver(&base_url)
        .resolve(&ids(&["111", "missing", "broken", "slow"]))
        .await;

    assert_eq!(store.len(), 1);
    let failed: Vec<&str> = store.failures().iter().map(|f| f.id.as_str()).collect();
    assert_eq!(failed, vec!["missing", "broken", "slow"]);
    assert!(store.failure("missing").unwrap().reason.contains("404"));
    assert!(store.failure("slow").unwrap().reason.contains("timed out"));
    println!("✓ failing templates do not block the others");
}

#[tokio::test]
async fn strict_resolution_names_the_failing_id() {
    let base_url = spawn_template_server().await;
    let err = resolver(&base_url)
        .resolve_strict(&ids(&["111", "missing"]))
        .await
        .unwrap_err();

    assert!(matches!(err, VizError::TemplateFetch { ref id, .. } if id == "missing"));
    assert!(err.to_string().contains("`missing`"));
}

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn startup_builds_a_catalog_from_sheets_and_templates() {
    let base_url = spawn_template_server().await;
    let control = write_temp(
        "\
section,chart_label,chart_index,base_chart,direct_chart,container,label,value,title
Trends,Line,1,111,,#trends,year,\"a, b\",{series}
Trends,Gone,1,missing,,#trends,year,a,
Trends,Embed,,,999,#trends,,,
",
    );
    let data = write_temp(
        "\
chart_index,year,a,b,series
1,2020,1,2,Sales
1,2021,3,4,Sales
",
    );

    let mut settings = Settings::new(
        SheetSource::File(control.path().to_path_buf()),
        SheetSource::File(data.path().to_path_buf()),
    );
    settings.template_base_url = base_url;
    settings.api_key = "key".to_string();
    settings.fetch_timeout = Duration::from_secs(2);

    let catalog = load_catalog_with(local_client(), &settings).await.unwrap();
    assert_eq!(catalog.template_failures().len(), 1);

    let section = catalog.section("Trends").unwrap();
    assert_eq!(section.rows.len(), 3);

    let options = catalog.compose(&section.rows[0]).unwrap();
    assert_eq!(options.template, "@flourish/line-bar-pie");
    assert_eq!(options.bindings.data.value, vec!["a", "b"]);
    assert_eq!(options.state["layout"]["title"], json!("Sales"));
    assert_eq!(options.state["chart_type"], json!("line"));
    assert_eq!(options.data.data.len(), 2);

    assert!(matches!(
        catalog.compose(&section.rows[1]),
        Err(VizError::TemplateFetch { .. })
    ));

    let problems = catalog.problems();
    assert_eq!(problems.len(), 1);
    assert!(problems[0].contains("`missing`"));

    settings.strict = true;
    assert!(load_catalog_with(local_client(), &settings).await.is_err());
}

const REMOTE_CONTROL: &str = "\
section,chart_label,chart_index,base_chart,direct_chart,container,label,value
Trends,Line,1,111,,#trends,year,a
Trends,Embed,,,999,#trends,,
";

const REMOTE_DATA: &str = "\
chart_index,year,a
1,2020,1
1,2021,3
";

/// Query strings seen by the sheet host, in arrival order
#[derive(Clone, Default)]
struct SheetHost {
    queries: Arc<Mutex<Vec<String>>>,
}

impl SheetHost {
    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

async fn serve_sheet(
    Path(name): Path<String>,
    RawQuery(query): RawQuery,
    State(host): State<SheetHost>,
) -> Response {
    host.queries.lock().unwrap().push(query.unwrap_or_default());
    match name.as_str() {
        "control.csv" => REMOTE_CONTROL.into_response(),
        "data.csv" => REMOTE_DATA.into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Starts a sheet host on a free port and returns its base URL
async fn spawn_sheet_server() -> (String, SheetHost) {
    let host = SheetHost::default();
    let app = Router::new()
        .route("/sheets/:name", get(serve_sheet))
        .with_state(host.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/sheets", addr), host)
}

fn is_timestamp(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

#[tokio::test]
async fn remote_sheets_are_fetched_with_a_cache_buster() {
    let (base_url, host) = spawn_sheet_server().await;
    let control = SheetSource::parse(&format!("{}/control.csv", base_url));
    let data = SheetSource::parse(&format!("{}/data.csv?gid=0", base_url));
    assert!(matches!(control, SheetSource::Url(_)));

    let sheets = load_sheets(&local_client(), &control, &data).await.unwrap();
    assert_eq!(sheets.control.len(), 2);
    assert_eq!(sheets.control[1].line, 3);
    assert_eq!(sheets.data.len(), 2);

    let queries = host.queries();
    assert_eq!(queries.len(), 2);
    assert!(queries.iter().any(|q| is_timestamp(q)));
    assert!(
        queries
            .iter()
            .filter_map(|q| q.strip_prefix("gid=0&"))
            .any(is_timestamp)
    );
    println!("✓ remote sheets carry a millisecond cache buster");
}

#[tokio::test]
async fn remote_sheet_errors_name_the_url() {
    let (base_url, _host) = spawn_sheet_server().await;
    let missing = format!("{}/gone.csv", base_url);

    let err = load_sheets(
        &local_client(),
        &SheetSource::parse(&missing),
        &SheetSource::parse(&format!("{}/data.csv", base_url)),
    )
    .await
    .unwrap_err();

    match err {
        VizError::Sheet {
            source_name,
            reason,
        } => {
            assert_eq!(source_name, missing);
            assert!(reason.contains("404"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn clean_remote_sheets_leave_nothing_to_report() {
    let (sheet_url, _host) = spawn_sheet_server().await;
    let template_url = spawn_template_server().await;

    let mut settings = Settings::new(
        SheetSource::parse(&format!("{}/control.csv", sheet_url)),
        SheetSource::parse(&format!("{}/data.csv", sheet_url)),
    );
    settings.template_base_url = template_url;
    settings.fetch_timeout = Duration::from_secs(2);

    let catalog = load_catalog_with(local_client(), &settings).await.unwrap();
    assert!(catalog.problems().is_empty());
    assert_eq!(catalog.section("Trends").unwrap().rows.len(), 2);
}
