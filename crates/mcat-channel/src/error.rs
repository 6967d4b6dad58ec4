use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request rejected by channel: {0}")]
    Rejected(String),

    #[error("malformed payload for {context}: {source}")]
    MalformedPayload {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("remote payload is missing `{0}`")]
    MissingField(&'static str),

    #[error("unexpected batch status code {0}")]
    UnexpectedBatchStatus(i64),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
