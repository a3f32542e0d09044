use thiserror::Error;

/// Raised when an adapter is built with unusable arguments.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConstructionError {
    #[error("Invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },
}

impl ConstructionError {
    pub fn empty(argument: &'static str) -> Self {
        ConstructionError::InvalidArgument {
            argument,
            reason: "must not be empty".to_string(),
        }
    }
}

/// Why a single diagnostic payload could not be turned into a metric point.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("Payload is not a counter record: {reason}")]
    Malformed { reason: String },

    #[error("Malformed metadata segment `{segment}` in `{metadata}`")]
    MalformedMetadata { metadata: String, segment: String },

    #[error("Metadata `{metadata}` has no `{key}` tag")]
    MissingTag { metadata: String, key: String },

    #[error("Counter {counter} carries neither an increment nor a mean value")]
    MissingValue { counter: String },

    #[error("Counter {counter} has a non-finite value")]
    NonFiniteValue { counter: String },

    #[error("Source {source_name} is not tracked")]
    UntrackedSource { source_name: String },
}

/// Errors related to delivering a batch to a metrics destination.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Destination rejected batch with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid sink endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("Failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sink unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Raised by a push-path backend that cannot record a value.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend rejected {metric}: {reason}")]
    Rejected { metric: String, reason: String },

    #[error("Unknown metric {metric}")]
    UnknownMetric { metric: String },
}
