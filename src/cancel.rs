//! Session-wide signals shared by the capture tasks
//!
//! One cancel token and one fault slot are created per recording session.
//! Any task may set the token; once set it stays set for the lifetime of the
//! session. Tasks poll it between device calls, so cancellation is
//! cooperative rather than preemptive. Device and write failures go into the
//! fault slot, which the coordinator reads when the session finalizes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Shared stop flag for one recording session
///
/// Cloning is cheap; all clones observe the same underlying flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request a stop. Monotonic: there is no way to clear the flag.
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Shared slot holding the first capture failure of a session
///
/// Tasks report errors here in addition to setting the cancel token; reports
/// after the first are dropped. Cloning is cheap; all clones observe the
/// same slot.
#[derive(Clone, Debug, Default)]
pub struct FaultSlot {
    inner: Arc<Mutex<Option<String>>>,
}

impl FaultSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure. Only the first report sticks.
    pub fn report(&self, message: String) {
        let mut slot = self.inner.lock().unwrap();
        if slot.is_none() {
            *slot = Some(message);
        }
    }

    pub fn get(&self) -> Option<String> {
        self.inner.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_unset() {
        assert!(!CancelToken::new().is_set());
    }

    #[test]
    fn test_set_is_visible_to_clones() {
        let token = CancelToken::new();
        let observer = token.clone();
        token.set();
        assert!(observer.is_set());
    }

    #[test]
    fn test_set_is_idempotent() {
        let token = CancelToken::new();
        token.set();
        token.set();
        assert!(token.is_set());
    }

    #[test]
    fn test_fault_slot_starts_empty() {
        assert!(FaultSlot::new().get().is_none());
    }

    #[test]
    fn test_fault_slot_keeps_first_report() {
        let fault = FaultSlot::new();
        let reporter = fault.clone();
        reporter.report("microphone gone".to_string());
        reporter.report("later noise".to_string());
        assert_eq!(fault.get().as_deref(), Some("microphone gone"));
    }
}
