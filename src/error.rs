use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeagueTableError {
    #[error("Malformed keyword input: expected {expected} comma-separated fields, got {found}")]
    MalformedInput { expected: usize, found: usize },

    #[error("Invalid value in field '{field}': {details}")]
    InvalidField { field: String, details: String },

    #[error("'{text}' matches more than one organization equally well: {candidates:?}")]
    AmbiguousIntent {
        text: String,
        candidates: Vec<String>,
    },

    #[error("Could not resolve a required field: {0}")]
    UnderspecifiedQuery(String),

    #[error("No league table data for product {0}")]
    UnknownProduct(String),

    #[error("Metric {metric} is not available for product {product}")]
    InvalidMetric { product: String, metric: String },

    #[error("No {product} data for {year}")]
    NoDataForYear { product: String, year: i32 },

    #[error("Organization '{0}' was not found")]
    OrganizationNotFound(String),

    #[error("Comparison of {product} needs data for both {year1} and {year2}")]
    InsufficientYears {
        product: String,
        year1: i32,
        year2: i32,
    },

    #[error("External intent parser failed: {0}")]
    ExternalParserFailure(String),

    #[error("Invalid league table for {product} {year}: {details}")]
    InvalidTable {
        product: String,
        year: i32,
        details: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, LeagueTableError>;
