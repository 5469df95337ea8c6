//! Bridge error taxonomy.
//!
//! Only `Bootstrap` (and the explicit startup entrypoint path) propagates
//! across the public API. Everything past a ready runtime is contained:
//! caught, logged with enough identity to locate the failing script, and
//! surfaced as a `None` return.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::EngineError;

#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// The embedded runtime could not be bootstrapped. Fatal: continuing
    /// without a runtime would corrupt everything downstream.
    #[error("failed to bootstrap script runtime")]
    Bootstrap(#[source] EngineError),

    /// A module or function could not be resolved.
    #[error("failed to resolve {target}")]
    Resolution {
        target: String,
        #[source]
        source: EngineError,
    },

    /// The script raised (or panicked) during execution.
    #[error("error invoking {module}/{function} with {argc} arg(s)")]
    Invocation {
        module: String,
        function: String,
        argc: usize,
        #[source]
        source: EngineError,
    },

    /// A path could not be watched for changes. The path is skipped;
    /// other watch roots are unaffected.
    #[error("failed to watch {}: {reason}", .path.display())]
    Watch { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_display_carries_call_identity() {
        let err = BridgeError::Invocation {
            module: "hooks".into(),
            function: "on-join".into(),
            argc: 1,
            source: EngineError::Raised("boom".into()),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("hooks/on-join"));
        assert!(rendered.contains("1 arg"));
    }

    #[test]
    fn test_resolution_display_names_target() {
        let err = BridgeError::Resolution {
            target: "hooks/missing".into(),
            source: EngineError::FunctionNotFound("hooks/missing".into()),
        };
        assert!(err.to_string().contains("hooks/missing"));
    }
}
