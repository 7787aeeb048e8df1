//! User-facing failure notices.

use std::fmt;

use serde::Serialize;

use metabatch_types::{MetabatchError, Stage};

/// One discrete notification for a failed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub stage: String,
    pub message: String,
    /// The batch has to be composed again from scratch.
    pub restart: bool,
    pub retryable: bool,
}

impl Notice {
    pub fn stage(&self) -> &str {
        &self.stage
    }
}

impl From<&MetabatchError> for Notice {
    fn from(err: &MetabatchError) -> Self {
        let stage: Stage = err.stage();
        Self {
            stage: stage.to_string(),
            message: err.to_string(),
            restart: err.requires_restart(),
            retryable: err.retryable(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.message)?;
        if self.restart {
            f.write_str(" (start over from composing)")?;
        } else if self.retryable {
            f.write_str(" (retry)")?;
        }
        Ok(())
    }
}
