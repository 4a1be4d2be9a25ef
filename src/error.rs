//! Error types for worker connections and run dispatch

use thiserror::Error;

/// Failure to establish a worker connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("invalid metadata from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Failure while submitting a job or opening its result stream
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("job submission to {url} failed: {source}")]
    Submit {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("invalid submit response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("could not open result stream {url}: {source}")]
    StreamOpen {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failure of a `run_cells` request before any result arrives
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no worker endpoint available for distributed run")]
    NoEndpoint,
    #[error("no source text for cell {0}")]
    UnknownCell(String),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ConnectionError::Status {
            url: "http://w1/metadata".into(),
            status: 503,
        };
        assert_eq!(err.to_string(), "http://w1/metadata returned HTTP 503");

        let err = DispatchError::UnknownCell("c9".into());
        assert_eq!(err.to_string(), "no source text for cell c9");
    }
}
