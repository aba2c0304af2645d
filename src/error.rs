use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Synchronous precondition failures reported before any job exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("prediction dataset name already exists: {0}")]
    DuplicateOutput(String),

    #[error("invalid input dataset name: {0}")]
    UnknownDataset(String),

    #[error("invalid classifier name: {0}")]
    UnknownVariant(String),

    #[error("unfinished processing in input dataset: {0}")]
    InputNotReady(String),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::DuplicateOutput(_) => "duplicate-output",
            ValidationError::UnknownDataset(_) => "unknown-dataset",
            ValidationError::UnknownVariant(_) => "unknown-variant",
            ValidationError::InputNotReady(_) => "input-not-ready",
        }
    }

    /// Status a transport layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            ValidationError::DuplicateOutput(_) => 409,
            _ => 406,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Variant {variant} failed: {message}")]
    Variant { variant: String, message: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Worker pool is shutting down")]
    Shutdown,
}

impl Error {
    pub fn error_code(&self) -> i32 {
        match self {
            Error::Validation(_) => -1,
            Error::Pipeline(_) => -2,
            Error::Variant { .. } => -3,
            Error::Store(_) => -4,
            Error::Engine(_) => -5,
            Error::InvalidDocument(_) => -6,
            Error::Config(_) => -7,
            Error::Io(_) => -8,
            Error::Serialization(_) => -9,
            Error::Timeout(_) => -10,
            Error::Shutdown => -11,
        }
    }

    /// Taxonomy bucket recorded on job metadata when work fails in the background.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation-error",
            Error::Pipeline(_) => "pipeline-error",
            Error::Variant { .. } | Error::Engine(_) => "variant-error",
            Error::Store(_) | Error::InvalidDocument(_) => "store-error",
            Error::Config(_) => "config-error",
            Error::Io(_) | Error::Serialization(_) => "io-error",
            Error::Timeout(_) | Error::Shutdown => "scheduler-error",
        }
    }

    pub fn variant(variant: impl ToString, message: impl ToString) -> Self {
        Error::Variant {
            variant: variant.to_string(),
            message: message.to_string(),
        }
    }
}
