//! Batch lifecycle state machine.
//!
//! Composing -> Negotiated -> Built -> Signing -> Submitted -> {Mined | Failed}
//!
//! Every step moves forward by exactly one stage. Until the batch is
//! submitted the lifecycle can be reset to `Composing`; after that it is
//! fixed and a retry starts a new lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

use metabatch_types::{MetabatchError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Composing,
    Negotiated,
    Built,
    Signing,
    Submitted,
    Mined,
    Failed,
}

impl LifecycleState {
    fn can_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Composing, Negotiated)
                | (Negotiated, Built)
                | (Built, Signing)
                | (Signing, Submitted)
                | (Submitted, Mined)
                | (Submitted, Failed)
        )
    }

    /// Whether the batch has been handed to the relayer.
    pub fn is_relayed(self) -> bool {
        matches!(self, LifecycleState::Submitted | LifecycleState::Mined | LifecycleState::Failed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Mined | LifecycleState::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self { state: LifecycleState::Composing }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn advance(&mut self, next: LifecycleState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(MetabatchError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// Back to `Composing`. Refused once the batch has been relayed.
    pub fn reset(&mut self) -> Result<()> {
        if self.state.is_relayed() {
            return Err(MetabatchError::InvalidTransition {
                from: self.state.to_string(),
                to: LifecycleState::Composing.to_string(),
            });
        }
        self.state = LifecycleState::Composing;
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    const ALL: [LifecycleState; 7] = [Composing, Negotiated, Built, Signing, Submitted, Mined, Failed];

    #[test]
    fn test_happy_path() {
        let mut lc = Lifecycle::new();
        for next in [Negotiated, Built, Signing, Submitted, Mined] {
            lc.advance(next).unwrap();
        }
        assert!(lc.state().is_terminal());
    }

    #[test]
    fn test_only_single_forward_steps() {
        let order = [Composing, Negotiated, Built, Signing, Submitted];
        for (i, from) in order.iter().enumerate() {
            for to in ALL {
                let mut lc = Lifecycle { state: *from };
                let expected = match *from {
                    Submitted => matches!(to, Mined | Failed),
                    _ => order.get(i + 1) == Some(&to),
                };
                assert_eq!(lc.advance(to).is_ok(), expected, "{} -> {}", from, to);
            }
        }
        for terminal in [Mined, Failed] {
            for to in ALL {
                assert!(Lifecycle { state: terminal }.advance(to).is_err());
            }
        }
    }

    #[test]
    fn test_reset_before_submission_only() {
        for state in ALL {
            let mut lc = Lifecycle { state };
            assert_eq!(lc.reset().is_ok(), !state.is_relayed(), "reset from {}", state);
            if !state.is_relayed() {
                assert_eq!(lc.state(), Composing);
            }
        }
    }
}
