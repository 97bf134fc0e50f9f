use thiserror::Error;

/// Failures that end a report stream.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Task description must be at least {min} characters")]
    TaskTooShort { min: usize },
    #[error("Failed to reach report service: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Report service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Report service returned no response body")]
    NoBody,
    #[error("Response stream interrupted: {0}")]
    Interrupted(String),
}

/// A frame that could not be turned into an event. Recovered locally by
/// skipping the frame.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame has no event line")]
    MissingEvent,
    #[error("frame `{event}` has no data line")]
    MissingData { event: String },
    #[error("frame `{event}` carries invalid JSON: {source}")]
    InvalidJson {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}
