pub mod escalations;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod pricing;
pub mod providers;

use crate::error::EngineError;

/// Map request-body validation failures onto the engine's input error.
pub(crate) fn reject_invalid<T: garde::Validate<Context = ()>>(req: &T) -> Result<(), EngineError> {
    req.validate()
        .map_err(|report| EngineError::InvalidInput(report.to_string()))
}
