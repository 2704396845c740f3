use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("No node at path: {0}")]
    PathNotFound(String),

    #[error("Cannot convert value {value:?} at {path}: {reason}")]
    Conversion {
        path: String,
        value: String,
        reason: String,
    },

    #[error("Index {index} out of range for node with {len} children")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Failed to read source: {0}")]
    Io(#[from] std::io::Error),
}

pub type TreeResult<T> = Result<T, TreeError>;
