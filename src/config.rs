//! Expansion settings.

/// Configuration for an [`Expander`](crate::Expander).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpanderConfig {
    /// Maximum number of splices in one scanning pass; also bounds how often
    /// a looping macro may re-apply its inner macro.
    pub recursion_limit: usize,
    /// Operator that marks an invocation, as in `name!(...)`.
    pub invocation_operator: String,
}

impl Default for ExpanderConfig {
    fn default() -> Self {
        ExpanderConfig {
            recursion_limit: 10_000,
            invocation_operator: "!".to_string(),
        }
    }
}

impl ExpanderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recursion_limit(self, recursion_limit: usize) -> Self {
        ExpanderConfig {
            recursion_limit,
            ..self
        }
    }

    pub fn with_invocation_operator(self, operator: impl Into<String>) -> Self {
        ExpanderConfig {
            invocation_operator: operator.into(),
            ..self
        }
    }
}
