use thiserror::Error;

use crate::config::Environment;
use crate::envelope::Envelope;

/// Every way a request can fail inside the dispatcher.
///
/// Each kind maps to a fixed application status. None is retried; the
/// dispatcher turns it into exactly one envelope and moves on.
///
/// | Kind               | Status | Envelope fields                   |
/// |--------------------|--------|-----------------------------------|
/// | `MalformedRequest` | 400    | message, error, stack (non-prod)  |
/// | `HandlerFailure`   | 500    | message, error, stack (non-prod)  |
/// | `RouteUnresolved`  | 404    | message                           |
/// | `MethodMismatch`   | 405    | message                           |
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The body is not valid JSON, or it could not be read off the connection.
    #[error("Bad Request")]
    MalformedRequest { cause: anyhow::Error },

    /// The route handler returned an error or panicked.
    #[error("Internal server error")]
    HandlerFailure { cause: anyhow::Error },

    #[error("Not Found")]
    RouteUnresolved,

    #[error("Method Not Allowed")]
    MethodMismatch,
}

impl DispatchError {
    /// Application-level status carried in the envelope.
    pub fn status(&self) -> u16 {
        match self {
            Self::MalformedRequest { .. } => 400,
            Self::HandlerFailure { .. } => 500,
            Self::RouteUnresolved => 404,
            Self::MethodMismatch => 405,
        }
    }

    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            Self::MalformedRequest { cause } | Self::HandlerFailure { cause } => Some(cause),
            Self::RouteUnresolved | Self::MethodMismatch => None,
        }
    }

    /// Builds the response envelope.
    ///
    /// `error` is the cause's own message; `stack` is its full debug rendering
    /// (cause chain, and a backtrace when one was captured) and is left out in
    /// production.
    pub fn to_envelope(&self, environment: Environment) -> Envelope {
        let envelope = Envelope::new(self.status(), self.to_string());
        match self.cause() {
            Some(cause) => {
                let stack = environment
                    .exposes_stack()
                    .then(|| format!("{cause:?}"));
                envelope.with_error(cause.to_string(), stack)
            }
            None => envelope,
        }
    }
}
