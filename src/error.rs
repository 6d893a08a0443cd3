use thiserror::Error;

// --------------------------------------------------------------------------------------------------------------

/// Envelope and payload (de)serialisation failures.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Malformed JSON, or an envelope missing `type` / `id`.
    #[error("envelope decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The payload did not fit the schema expected for its event type.
    #[error("payload does not match {schema}: {source}")]
    PayloadShape {
        schema: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("envelope encode failed: {0}")]
    Encode(#[source] serde_json::Error),
}

// --------------------------------------------------------------------------------------------------------------

/// Failures talking to the message queue.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Transport, timeout, unreadable response or service fault reported by the SDK.
    #[error("queue call {action} failed: {message}")]
    Sdk {
        action:  &'static str,
        message: String,
    },

    #[error("queue '{0}' does not exist")]
    UnknownQueue(String),

    /// Delete called with a stale or unknown receipt handle.
    #[error("invalid receipt handle: {0}")]
    InvalidReceipt(String),
}

// --------------------------------------------------------------------------------------------------------------

/// Everything that can go wrong while routing and handling one message.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// No route registered for the declared type. Logged, never fatal.
    #[error("no handler registered for type '{0}'")]
    UnknownType(String),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

// --------------------------------------------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
