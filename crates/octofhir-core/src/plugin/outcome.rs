use serde_json::Value;

/// Outcome of a `BEFORE` plugin invocation (§4.3). Only sync plugins run in
/// this phase, so a plugin can still influence the operation that is about
/// to run — later phases cannot.
#[derive(Debug, Clone)]
pub enum BeforeOutcome {
    /// Proceed to the next plugin (or the core operation) unchanged.
    Continue,
    /// Proceed, but replace the resource seen by subsequent plugins and by
    /// the core operation.
    ContinueWithModifiedResource(Value),
    /// Stop the BEFORE phase immediately. No later plugin runs and the core
    /// operation is skipped; this outcome becomes the HTTP response.
    Abort { status: u16, outcome: Value },
    /// Stop running further BEFORE plugins, but still invoke the core
    /// operation with the resource as last seen.
    SkipRemaining,
    /// Like `SkipRemaining`, but also replaces the resource for the core
    /// operation.
    SkipRemainingWithModifiedResource(Value),
}

impl BeforeOutcome {
    pub fn is_abort(&self) -> bool {
        matches!(self, BeforeOutcome::Abort { .. })
    }

    pub fn is_skip_remaining(&self) -> bool {
        matches!(
            self,
            BeforeOutcome::SkipRemaining | BeforeOutcome::SkipRemainingWithModifiedResource(_)
        )
    }

    pub fn modified_resource(&self) -> Option<&Value> {
        match self {
            BeforeOutcome::ContinueWithModifiedResource(v)
            | BeforeOutcome::SkipRemainingWithModifiedResource(v) => Some(v),
            _ => None,
        }
    }
}

/// Result of running the BEFORE phase to completion: either the pipeline
/// should proceed to the core operation (with whatever resource survived
/// plugin modifications), it should short-circuit with a deliberate abort
/// outcome, or a plugin itself failed (timed out, panicked, returned an
/// error) — which is an ON_ERROR cause, not an abort.
#[derive(Debug, Clone)]
pub enum BeforePhaseResult {
    Proceed { resource: Option<Value> },
    Aborted { status: u16, outcome: Value },
    Failed { plugin_name: String, message: String },
}
