use thiserror::Error;

#[derive(Error, Debug)]
pub enum StressError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Verification failed in round {round}: {reason}")]
    Verification { round: u32, reason: String },

    #[error("{role} thread {index} panicked")]
    WorkerPanicked { role: &'static str, index: usize },
}

pub type Result<T> = std::result::Result<T, StressError>;
