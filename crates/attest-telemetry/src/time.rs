// Path: crates/attest-telemetry/src/time.rs
use std::time::Instant;

/// RAII scope timer: records elapsed wall time into `observe` on drop.
///
/// Used where a single closure-based `observe_duration` would awkwardly
/// wrap early returns (`?`), e.g. RPC call sites in `attest-chain-client`.
pub struct ScopeTimer<F: FnMut(f64)> {
    start: Instant,
    observe: F,
}

impl<F: FnMut(f64)> ScopeTimer<F> {
    pub fn new(observe: F) -> Self {
        Self {
            start: Instant::now(),
            observe,
        }
    }
}

impl<F: FnMut(f64)> Drop for ScopeTimer<F> {
    fn drop(&mut self) {
        (self.observe)(self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn records_on_drop() {
        let recorded = Arc::new(Mutex::new(None));
        let r = recorded.clone();
        {
            let _t = ScopeTimer::new(move |secs| *r.lock().unwrap() = Some(secs));
        }
        assert!(recorded.lock().unwrap().is_some());
    }
}
