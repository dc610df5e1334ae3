//! Non-local exits out of statement evaluation.

use crate::error::EvalError;

/// Why evaluation of a block stopped early.
///
/// Travels on the `Err` side of [`Flow`] so `?` unwinds through nested
/// blocks until a loop (or the top level) handles it.
#[derive(Debug)]
pub enum Signal {
    /// `break N`: leave `N` enclosing loops.
    Break { levels: i64 },
    /// `continue N`: leave `N - 1` loops, then start the next pass of the next.
    Continue { levels: i64 },
    /// A failure that ends the program.
    Error(EvalError),
}

/// Result of evaluating something that may break, continue, or fail.
pub type Flow<T = ()> = Result<T, Signal>;

impl From<EvalError> for Signal {
    fn from(error: EvalError) -> Self {
        Signal::Error(error)
    }
}

impl Signal {
    /// Account for one loop boundary.
    ///
    /// Returns true when the enclosing loop should handle the signal itself,
    /// false when it must pass the (decremented) signal outward.
    pub fn decrement_level(&mut self) -> bool {
        match self {
            Signal::Break { levels } | Signal::Continue { levels } => {
                if *levels <= 1 {
                    true
                } else {
                    *levels -= 1;
                    false
                }
            }
            Signal::Error(_) => false,
        }
    }

    /// The error to report when the signal escapes every loop.
    pub fn into_error(self) -> EvalError {
        match self {
            Signal::Error(error) => error,
            Signal::Break { .. } | Signal::Continue { .. } => EvalError::InvalidFlowControl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_level_is_handled_here() {
        let mut signal = Signal::Break { levels: 1 };
        assert!(signal.decrement_level());
    }

    #[test]
    fn multi_level_propagates_decremented() {
        let mut signal = Signal::Continue { levels: 3 };
        assert!(!signal.decrement_level());
        assert!(matches!(signal, Signal::Continue { levels: 2 }));
        assert!(!signal.decrement_level());
        assert!(signal.decrement_level());
    }

    #[test]
    fn errors_always_propagate() {
        let mut signal = Signal::from(EvalError::InvalidFlowControl);
        assert!(!signal.decrement_level());
        assert!(matches!(signal.into_error(), EvalError::InvalidFlowControl));
    }

    #[test]
    fn escaped_loop_signals_are_invalid() {
        assert!(matches!(
            Signal::Break { levels: 1 }.into_error(),
            EvalError::InvalidFlowControl
        ));
    }
}
