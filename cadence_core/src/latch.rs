//! One-shot rising-edge detector.

/// Reports `true` exactly once per false → true transition of its input.
///
/// ```rust
/// use cadence_core::latch::ChangeLatch;
///
/// let mut latch = ChangeLatch::new();
/// assert!(latch.update(true));
/// assert!(!latch.update(true));
/// assert!(!latch.update(false));
/// assert!(latch.update(true));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeLatch {
    last: bool,
}

impl ChangeLatch {
    pub const fn new() -> Self {
        Self { last: false }
    }

    /// Feed the current condition. Returns `true` only on a rising edge.
    #[inline]
    pub fn update(&mut self, condition: bool) -> bool {
        let rising = condition && !self.last;
        self.last = condition;
        rising
    }

    /// Same as `update(false)`.
    #[inline]
    pub fn reset(&mut self) {
        self.last = false;
    }

    /// Last observed condition.
    #[inline]
    pub const fn is_set(&self) -> bool {
        self.last
    }
}
