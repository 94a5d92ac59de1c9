/// Shared error type used across all orchestration-core crates.
///
/// Local recovery is preferred throughout this codebase — most of the
/// variants below are carried in an `Ok` outcome by the component that
/// raises them (see the `*Outcome` enums in `orc-orchestrator`,
/// `orc-concurrency`, etc.) rather than returned as `Err`. `Error` is
/// reserved for conditions a caller cannot locally route around.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("sqlite: {0}")]
    Sqlite(String),

    #[error("queue full: {0}")]
    QueueFull(String),

    #[error("lane cleared: {0}")]
    LaneCleared(String),

    #[error("pool full for agent {agent} ({busy}/{max} busy)")]
    PoolFull { agent: String, busy: usize, max: usize },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("subprocess busy: {0}")]
    SubprocessBusy(String),

    #[error("subprocess crashed: {0}")]
    SubprocessCrash(String),

    #[error("dependency failed: {0}")]
    DependencyFailed(String),

    #[error("file conflict: {0}")]
    FileConflict(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("memory service unavailable: {0}")]
    MamaUnavailable(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
