//! Top-level error for the orchestration loop.
//!
//! Per-module errors ([`DirectiveError`], [`GatewayError`], …) carry the precise
//! failure; this enum is what aborts a run and lands in `Run::error`.

use thiserror::Error;

use crate::directive::DirectiveError;
use crate::gateway::GatewayError;

/// Error that aborts a run.
///
/// Agent failures are *not* represented here: they are contained in the
/// offending task's `TaskResult` and the loop continues.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Thinker output could not be parsed or failed directive validation.
    #[error(transparent)]
    Directive(#[from] DirectiveError),

    /// Gateway failure while consulting the thinker.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The injected thinker itself raised.
    #[error("thinker error: {0}")]
    Thinker(String),

    /// Missing or unusable configuration.
    #[error("config error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_error_display_is_transparent() {
        let err = OrchestratorError::from(DirectiveError::NoTasks);
        assert!(err.to_string().contains("no tasks"), "{}", err);
    }

    #[test]
    fn gateway_error_display_is_transparent() {
        let err = OrchestratorError::from(GatewayError::NoGateways);
        assert_eq!(err.to_string(), "No gateways configured");
    }
}
