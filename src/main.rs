use clap::{Args, Parser, Subcommand};
use log::{error, info};
use serde::Serialize;
use sheetviz::app::{self, ServerOptions};
use sheetviz::embed::DEFAULT_EMBED_BASE_URL;
use sheetviz::template::DEFAULT_TEMPLATE_BASE_URL;
use sheetviz::{Catalog, Settings, SheetSource, load_catalog};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "sheetviz", version, about = "Interactive chart pages from a control sheet and a data sheet")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct SourceArgs {
    /// Control sheet (path or http(s) URL)
    #[arg(long, default_value = "data/control-sheet.csv")]
    control: String,

    /// Data sheet (path or http(s) URL)
    #[arg(long, default_value = "data/data-sheet.csv")]
    data: String,

    /// Key for the charting API
    #[arg(long, env = "FLOURISH_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    #[arg(long, default_value = DEFAULT_TEMPLATE_BASE_URL)]
    template_base_url: String,

    #[arg(long, default_value = DEFAULT_EMBED_BASE_URL)]
    embed_base_url: String,

    /// Seconds allowed for each template request
    #[arg(long, default_value_t = 30)]
    fetch_timeout_secs: u64,

    /// Abort when any template cannot be fetched
    #[arg(long)]
    strict: bool,
}

impl SourceArgs {
    fn settings(&self) -> Settings {
        Settings {
            control: SheetSource::parse(&self.control),
            data: SheetSource::parse(&self.data),
            api_key: self.api_key.clone(),
            template_base_url: self.template_base_url.clone(),
            embed_base_url: self.embed_base_url.clone(),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            strict: self.strict,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the chart page
    Serve {
        #[command(flatten)]
        sources: SourceArgs,

        #[arg(long, default_value = "127.0.0.1:3000")]
        bind: String,

        /// Handlebars page used instead of the built-in one
        #[arg(long)]
        page_template: Option<PathBuf>,
    },

    /// Print the composed API options of every base chart as JSON
    Compose {
        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Validate both sheets and every referenced template
    Check {
        #[command(flatten)]
        sources: SourceArgs,
    },
}

#[derive(Serialize)]
struct ComposedChart {
    section: String,
    chart_label: String,
    line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<sheetviz::ApiOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn compose_all(catalog: &Catalog) -> Vec<ComposedChart> {
    catalog
        .sections()
        .flat_map(|section| section.rows.iter())
        .filter(|row| row.base_chart().is_some())
        .map(|row| {
            let (options, error) = match catalog.compose(row) {
                Ok(options) => (Some(options), None),
                Err(e) => (None, Some(e.to_string())),
            };
            ComposedChart {
                section: row.section.clone(),
                chart_label: row.chart_label.clone(),
                line: row.line,
                options,
                error,
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            sources,
            bind,
            page_template,
        } => {
            let catalog = load_catalog(&sources.settings()).await?;
            app::run(catalog, ServerOptions { bind, page_template }).await?;
        }
        Commands::Compose { sources } => {
            let catalog = load_catalog(&sources.settings()).await?;
            println!("{}", serde_json::to_string_pretty(&compose_all(&catalog))?);
        }
        Commands::Check { sources } => {
            let catalog = load_catalog(&sources.settings()).await?;
            let problems = catalog.problems();
            for problem in &problems {
                error!("{}", problem);
            }
            if !problems.is_empty() {
                error!("{} problem(s) found", problems.len());
                std::process::exit(1);
            }
            info!("control sheet and templates are valid");
        }
    }

    Ok(())
}
