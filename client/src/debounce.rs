/// Recolor passes are delayed this long after the last viewport change.
pub const DEFAULT_WINDOW_MS: f64 = 250.0;

/// Trailing-edge debouncer driven by explicit timestamps.
///
/// `push` restarts the window and replaces the pending value; `poll` hands the
/// latest value back once the window has elapsed without another push. Time is
/// supplied by the caller so the same state machine runs under a browser timer
/// or in a test.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    window_ms: f64,
    pending: Option<T>,
    last_push_at: f64,
}

impl<T> Debouncer<T> {
    pub fn new(window_ms: f64) -> Self {
        Self {
            window_ms: window_ms.max(0.0),
            pending: None,
            last_push_at: 0.0,
        }
    }

    pub fn push(&mut self, value: T, now_ms: f64) {
        self.pending = Some(value);
        self.last_push_at = now_ms;
    }

    /// When the pending value becomes due, if any.
    pub fn deadline_ms(&self) -> Option<f64> {
        self.pending
            .as_ref()
            .map(|_| self.last_push_at + self.window_ms)
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn poll(&mut self, now_ms: f64) -> Option<T> {
        let due = self.deadline_ms()?;
        if now_ms < due {
            return None;
        }
        self.pending.take()
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take()
    }
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS)
    }
}
