use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CapitalError {
    /// Fatal tranche, tier or equity-class configuration problem. Raised
    /// before any period is computed.
    #[error("Configuration error in {field}: {reason}")]
    Configuration { field: String, reason: String },

    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    /// A pipeline run inside a simulation iteration failed; the whole run is
    /// aborted and no partial statistics are reported.
    #[error("Simulation failed at iteration {iteration}: {message}")]
    SimulationFailure { iteration: usize, message: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl CapitalError {
    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CapitalError::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for the fatal configuration class of errors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CapitalError::Configuration { .. })
    }
}

impl From<serde_json::Error> for CapitalError {
    fn from(e: serde_json::Error) -> Self {
        CapitalError::SerializationError(e.to_string())
    }
}
