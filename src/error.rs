use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Invalid fiscal year end month {0}: must be between 1 and 12")]
    InvalidFiscalYearEndMonth(u32),

    #[error("Season {season} processed after season {last}: seasons must be strictly ascending")]
    SeasonsOutOfOrder { season: u32, last: u32 },

    #[error("Invalid season comparison: current season {current} must differ from previous season {previous}")]
    InvalidComparison { current: u32, previous: u32 },

    #[error("Invalid point value {value} for {context}: points must be finite and non-negative")]
    InvalidPoints { context: String, value: f64 },

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
