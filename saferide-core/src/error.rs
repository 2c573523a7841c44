use thiserror::Error;

/// Engine-wide error taxonomy.
///
/// Every state-machine entry point surfaces one of these. Validation,
/// authorization and not-found failures never mutate state; conflict errors
/// come out of the conditional-update primitives, which guarantee the
/// check-then-write was atomic, so a conflict also implies no partial state.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authorization: {0}")]
    Authorization(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("external dependency: {0}")]
    ExternalDependency(String),

    /// A webhook reported an amount that does not match the engine's own
    /// computation. Security-relevant: logged distinctly and never applied.
    #[error("amount mismatch: expected {expected_cents} cents, gateway reported {reported_cents} cents")]
    AmountMismatch {
        expected_cents: i64,
        reported_cents: i64,
    },
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
