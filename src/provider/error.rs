//! Shared error type for provider adapters.

use thiserror::Error;

/// Failure of a single provider call. The fallback chain collects these per
/// provider before moving to the next one.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("No API key configured for {provider}. Set {env_var} or the matching config key.")]
    MissingCredential {
        provider: &'static str,
        env_var: &'static str,
    },

    #[error("{provider} request timed out after {secs}s")]
    Timeout { provider: &'static str, secs: u64 },

    #[error("{provider} returned HTTP {status}: {message}")]
    Http {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("Network error calling {provider}: {source}")]
    Network {
        provider: &'static str,
        source: reqwest::Error,
    },

    #[error("{provider} returned an unparsable response: {reason}")]
    Malformed {
        provider: &'static str,
        reason: String,
    },

    #[error("{provider} returned empty content")]
    Empty { provider: &'static str },

    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: &'static str,
        operation: &'static str,
    },
}
