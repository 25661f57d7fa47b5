//! Log prefixes for a run.
//!

use core::fmt::Display;

/// Holds the context for the current run. Used for prefixing logs.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    /// The flow being run.
    pub flow: &'static str,
    /// The current state of the flow.
    pub current_context: &'static str,
}

impl Context {
    /// A context at the start of `flow`.
    pub fn new(flow: &'static str) -> Self {
        Self {
            flow,
            current_context: "Idle",
        }
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{}] [{}] ", self.flow, self.current_context)
    }
}
