use lens_engine::{ConfigError, ControllerError};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("dump '{path}' line {line}: {detail}")]
    Dump { path: String, line: usize, detail: String },

    #[error("{0}")]
    Settings(#[from] ConfigError),

    #[error("{0}")]
    Controller(#[from] ControllerError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("output: {0}")]
    Output(#[from] serde_json::Error),
}
