//! Breakpoint table: future time points the transient driver must land on
//! exactly (source discontinuities such as pulse edges).

/// Ordered set of pending breakpoints.
///
/// Entries closer together than `min_spacing` are merged; points at or
/// before the current time are dropped as the simulation advances past
/// them.
#[derive(Debug, Clone)]
pub struct Breakpoints {
    points: Vec<f64>,
    min_spacing: f64,
}

impl Breakpoints {
    pub fn new(min_spacing: f64) -> Self {
        Self {
            points: Vec::new(),
            min_spacing,
        }
    }

    pub fn min_spacing(&self) -> f64 {
        self.min_spacing
    }

    /// Register a breakpoint at `t`. Ignored when `t` is not beyond
    /// `now + min_spacing` or duplicates an existing point within
    /// `min_spacing`.
    pub fn set_breakpoint(&mut self, t: f64, now: f64) {
        if t <= now + self.min_spacing {
            return;
        }
        match self
            .points
            .binary_search_by(|p| p.partial_cmp(&t).expect("breakpoints are finite"))
        {
            Ok(_) => {}
            Err(pos) => {
                let near_prev = pos > 0 && (t - self.points[pos - 1]).abs() <= self.min_spacing;
                let near_next =
                    pos < self.points.len() && (self.points[pos] - t).abs() <= self.min_spacing;
                if !near_prev && !near_next {
                    self.points.insert(pos, t);
                }
            }
        }
    }

    /// The next breakpoint strictly beyond `t`.
    pub fn next_after(&self, t: f64) -> Option<f64> {
        self.points
            .iter()
            .copied()
            .find(|&p| p > t + self.min_spacing)
    }

    /// Drop every breakpoint at or before `t` (within `min_spacing`).
    pub fn clear_passed(&mut self, t: f64) {
        self.points.retain(|&p| p > t + self.min_spacing);
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().copied()
    }
}
