use crate::error::{VizError, VizResult};
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_TEMPLATE_BASE_URL: &str = "https://public.flourish.studio/visualisation";

/// Published configuration of a base chart.
///
/// `state` is the chart's settings tree. It is never handed out directly;
/// see [`TemplateConfig::fresh_state`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default)]
    pub name: String,
    pub template: String,
    pub version: Value,
    #[serde(default)]
    state: Value,
}

impl TemplateConfig {
    pub fn new(name: &str, template: &str, version: Value, state: Value) -> Self {
        Self {
            name: name.to_string(),
            template: template.to_string(),
            version,
            state,
        }
    }

    /// Independent copy of the settings tree for one chart build
    pub fn fresh_state(&self) -> Value {
        match &self.state {
            Value::Null => Value::Object(Default::default()),
            state => state.clone(),
        }
    }
}

/// A template that could not be fetched
#[derive(Debug, Clone, Serialize)]
pub struct TemplateFailure {
    pub id: String,
    pub reason: String,
}

/// Fetched templates keyed by base chart id
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: HashMap<String, TemplateConfig>,
    failures: Vec<TemplateFailure>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: &str, config: TemplateConfig) {
        self.templates.insert(id.to_string(), config);
    }

    pub fn get(&self, id: &str) -> Option<&TemplateConfig> {
        self.templates.get(id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn failures(&self) -> &[TemplateFailure] {
        &self.failures
    }

    pub fn failure(&self, id: &str) -> Option<&TemplateFailure> {
        self.failures.iter().find(|f| f.id == id)
    }

    /// Template for a chart build, or why there is none
    pub fn require(&self, id: &str) -> VizResult<&TemplateConfig> {
        if let Some(config) = self.get(id) {
            return Ok(config);
        }
        match self.failure(id) {
            Some(failure) => Err(VizError::TemplateFetch {
                id: failure.id.clone(),
                reason: failure.reason.clone(),
            }),
            None => Err(VizError::TemplateUnavailable(id.to_string())),
        }
    }
}

/// Fetches base chart templates over HTTP
#[derive(Debug, Clone)]
pub struct TemplateResolver {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl TemplateResolver {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn template_url(&self, id: &str) -> String {
        format!(
            "{}/{}/visualisation.json",
            self.base_url,
            urlencoding::encode(id)
        )
    }

    /// Fetches a single template, bounded by the resolver timeout.
    pub async fn fetch(&self, id: &str) -> VizResult<TemplateConfig> {
        let url = self.template_url(id);
        debug!("fetching template {} from {}", id, url);

        let fetch_error = |reason: String| VizError::TemplateFetch {
            id: id.to_string(),
            reason,
        };

        let request = async {
            let response = self.client.get(&url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(fetch_error(format!("server answered {}", status)));
            }
            Ok::<_, VizError>(response.json::<TemplateConfig>().await?)
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(config)) => Ok(config),
            Ok(Err(VizError::TemplateFetch { id, reason })) => {
                Err(VizError::TemplateFetch { id, reason })
            }
            Ok(Err(other)) => Err(fetch_error(other.to_string())),
            Err(_) => Err(fetch_error(format!(
                "timed out after {}s",
                self.timeout.as_secs_f32()
            ))),
        }
    }

    /// Fetches every id concurrently and waits for all of them.
    ///
    /// Failures are recorded in the store instead of aborting, so charts
    /// using other templates still render.
    pub async fn resolve(&self, ids: &[String]) -> TemplateStore {
        let results = join_all(ids.iter().map(|id| self.fetch(id))).await;

        let mut store = TemplateStore::new();
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(config) => store.insert(id, config),
                Err(e) => {
                    warn!("{}", e);
                    store.failures.push(TemplateFailure {
                        id: id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "resolved {} of {} templates",
            store.len(),
            ids.len()
        );
        store
    }

    /// Like [`resolve`](Self::resolve) but fails on the first template error.
    pub async fn resolve_strict(&self, ids: &[String]) -> VizResult<TemplateStore> {
        let store = self.resolve(ids).await;
        if let Some(failure) = store.failures.first() {
            return Err(VizError::TemplateFetch {
                id: failure.id.clone(),
                reason: failure.reason.clone(),
            });
        }
        Ok(store)
    }
}
