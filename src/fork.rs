//! Protocol upgrades keyed by activation height
//!
//! A `ForkValue` is a default plus an ordered list of `(height, value)`
//! changes; the value in force at a height is the most recent activation at
//! or below it. The engine consults the schedule as a pure read-only lookup,
//! so upgrades never require code paths keyed on wall-clock time.

/// A consensus value that changes at fixed activation heights.
#[derive(Debug, Clone)]
pub struct ForkValue<T> {
    default: T,
    changes: Vec<(u64, T)>,
}

impl<T: Copy> ForkValue<T> {
    /// `changes` may arrive in any order; they are kept sorted by height.
    pub fn new(default: T, mut changes: Vec<(u64, T)>) -> Self {
        changes.sort_by_key(|(height, _)| *height);
        Self { default, changes }
    }

    pub fn constant(default: T) -> Self {
        Self { default, changes: Vec::new() }
    }

    /// Value in force at `height`: most recent activation <= height wins.
    pub fn value_at(&self, height: u64) -> T {
        self.changes
            .iter()
            .rev()
            .find(|(activation, _)| *activation <= height)
            .map(|(_, value)| *value)
            .unwrap_or(self.default)
    }
}

impl ForkValue<bool> {
    pub fn is_active(&self, height: u64) -> bool {
        self.value_at(height)
    }
}

/// The protocol upgrades this engine consults.
#[derive(Debug, Clone)]
pub struct ForkSchedule {
    /// Windowed base-target smoothing instead of the single-step rule.
    pub smoothed_difficulty: ForkValue<bool>,

    /// Expected block format version.
    pub block_version: ForkValue<u32>,

    /// Maximum total payload bytes per block.
    pub max_payload_length: ForkValue<u32>,
}

impl Default for ForkSchedule {
    fn default() -> Self {
        Self {
            smoothed_difficulty: ForkValue::new(false, vec![(2_700, true)]),
            block_version: ForkValue::new(3, vec![(1_000_000, 4)]),
            max_payload_length: ForkValue::new(44_880, vec![(1_000_000, 179_520)]),
        }
    }
}
