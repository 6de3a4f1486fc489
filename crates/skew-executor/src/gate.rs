//! One-shot execution gate.
//!
//! Set by the operator (config or `/toggle_risk on`), consumed by the
//! executor when it fires.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

/// Enabled flag with compare-and-swap consumption.
///
/// # Thread Safety
///
/// The flag is atomic; `try_consume` succeeds for exactly one caller per
/// `false -> true` transition.
#[derive(Debug)]
pub struct ExecutionGate {
    enabled: AtomicBool,
}

impl ExecutionGate {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Set the flag. Returns the previous value.
    pub fn set(&self, enabled: bool) -> bool {
        let old = self.enabled.swap(enabled, Ordering::SeqCst);
        if old != enabled {
            info!(enabled, "Execution gate changed");
        }
        old
    }

    /// Atomically flip `true -> false`.
    ///
    /// Returns `true` only for the caller that observed the gate enabled.
    pub fn try_consume(&self) -> bool {
        let consumed = self
            .enabled
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if consumed {
            info!("Execution gate consumed");
        }
        consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_consume_once_per_enable() {
        let gate = ExecutionGate::new(true);
        assert!(gate.try_consume());
        assert!(!gate.try_consume());
        assert!(!gate.is_enabled());

        assert!(!gate.set(true));
        assert!(gate.try_consume());
    }

    #[test]
    fn test_disabled_gate_never_consumes() {
        let gate = ExecutionGate::new(false);
        assert!(!gate.try_consume());
        gate.set(false);
        assert!(!gate.try_consume());
    }

    #[test]
    fn test_concurrent_consumers_fire_once() {
        let gate = Arc::new(ExecutionGate::new(true));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || gate.try_consume())
            })
            .collect();
        let fired = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|fired| *fired)
            .count();
        assert_eq!(fired, 1);
    }
}
