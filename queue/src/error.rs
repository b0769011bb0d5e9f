#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    #[error("JSON Serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Queue backend error: {0}")]
    Backend(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}
