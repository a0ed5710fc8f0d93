use crate::embed::DEFAULT_EMBED_BASE_URL;
use crate::sheet::SheetSource;
use crate::template::DEFAULT_TEMPLATE_BASE_URL;
use std::time::Duration;

/// Startup configuration shared by every subcommand
#[derive(Debug, Clone)]
pub struct Settings {
    pub control: SheetSource,
    pub data: SheetSource,
    pub api_key: String,
    pub template_base_url: String,
    pub embed_base_url: String,
    /// Upper bound for each template request
    pub fetch_timeout: Duration,
    /// Abort startup on the first template failure
    pub strict: bool,
}

impl Settings {
    pub fn new(control: SheetSource, data: SheetSource) -> Self {
        Self {
            control,
            data,
            api_key: String::new(),
            template_base_url: DEFAULT_TEMPLATE_BASE_URL.to_string(),
            embed_base_url: DEFAULT_EMBED_BASE_URL.to_string(),
            fetch_timeout: Duration::from_secs(30),
            strict: false,
        }
    }
}
