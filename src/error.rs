use thiserror::Error;

pub type VizResult<T> = Result<T, VizError>;

/// Errors raised while reading filter strings from the control sheet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("unknown operator `{operator}` in filter clause `{clause}`")]
    UnknownOperator { clause: String, operator: String },

    #[error("filter clause `{0}` has no variable name")]
    MissingVariable(String),

    #[error("filter clause `{0}` has more than three `::` parts")]
    TooManyParts(String),
}

#[derive(Debug, Error)]
pub enum VizError {
    #[error("control sheet line {line}: {message}")]
    Config { line: usize, message: String },

    #[error("control sheet line {line}: {source}")]
    Filter {
        line: usize,
        #[source]
        source: FilterError,
    },

    #[error("failed to fetch template `{id}`: {reason}")]
    TemplateFetch { id: String, reason: String },

    #[error("template `{0}` is not available")]
    TemplateUnavailable(String),

    #[error("failed to load sheet `{source_name}`: {reason}")]
    Sheet { source_name: String, reason: String },

    #[error("unknown view `{0}`")]
    UnknownSession(String),

    #[error("unknown section `{0}`")]
    UnknownSection(String),

    #[error("section `{section}` has no chart at index {index}")]
    UnknownChart { section: String, index: usize },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "web")]
    #[error("page template error: {0}")]
    Page(String),
}
