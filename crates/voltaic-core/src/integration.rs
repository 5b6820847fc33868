//! Multistep integration for transient analysis.
//!
//! The integrator owns per-state history (value and derivative pairs over
//! the last `max_order + 2` accepted points) and the coefficients `ag[..]`
//! that turn state values into a derivative approximation at the current
//! time. Devices declare states once, then call [`Integrator::integrate`]
//! during every transient load; `ag[0]` is the Jacobian multiplier that
//! turns a charge into a companion conductance.

use nalgebra::{DMatrix, DVector};

/// Handle to one integration state (a charge or flux).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateId(usize);

/// Integration formula family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Trapezoidal rule, order ≤ 2, A-stable.
    Trapezoidal,
    /// Gear/BDF, order ≤ 6, stiffly stable.
    Gear,
}

/// Consecutive accepted steps required before the order is raised.
const ORDER_RAISE_STREAK: usize = 3;

#[derive(Debug, Clone)]
pub struct Integrator {
    method: Method,
    max_order: usize,
    order: usize,
    /// Last accepted time.
    time: f64,
    /// Current attempted step size.
    delta: f64,
    /// Step-size history; `deltas[0]` is the current step.
    deltas: Vec<f64>,
    /// Integration coefficients for the current order and step sizes.
    ag: [f64; 7],
    /// `history[0]` is the slice being built at the attempted time point;
    /// `history[i]` is the i-th previous accepted point. Each slice stores
    /// interleaved (value, derivative) pairs per state.
    history: Vec<Vec<f64>>,
    n_states: usize,
    accepted_streak: usize,
}

impl Integrator {
    pub fn new(method: Method) -> Self {
        let max_order = match method {
            Method::Trapezoidal => 2,
            Method::Gear => 6,
        };
        Self {
            method,
            max_order,
            order: 1,
            time: 0.0,
            delta: 0.0,
            deltas: Vec::new(),
            ag: [0.0; 7],
            history: vec![Vec::new()],
            n_states: 0,
            accepted_streak: 0,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn max_order(&self) -> usize {
        self.max_order
    }

    /// Reset the order to 1 (waveform discontinuity at a breakpoint).
    pub fn reset_order(&mut self) {
        self.order = 1;
        self.accepted_streak = 0;
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Current attempted step size.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Step size of the previously accepted step.
    pub fn prev_delta(&self) -> f64 {
        self.deltas.get(1).copied().unwrap_or(self.delta)
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    /// Declare a new state variable. Every history slot is zero-initialized
    /// so early reads before transient init are well-defined.
    pub fn create_state(&mut self) -> StateId {
        let id = StateId(self.n_states);
        self.n_states += 1;
        for slice in &mut self.history {
            slice.push(0.0);
            slice.push(0.0);
        }
        id
    }

    /// Prepare for a transient run starting at `start` with initial step
    /// `delta`. Call after the devices have written their DC state values;
    /// the current slice is propagated across the whole history so the
    /// multistep formulas see a consistent past.
    pub fn initialize(&mut self, start: f64, delta: f64) {
        self.time = start;
        self.delta = delta;
        self.deltas = vec![delta; self.max_order + 2];
        self.order = 1;
        self.accepted_streak = 0;
        let current = self.history[0].clone();
        self.history = vec![current; self.max_order + 2];
        self.compute_coefficients();
    }

    /// Begin an attempt at a step of the given size.
    pub fn begin_step(&mut self, delta: f64) {
        self.delta = delta;
        self.deltas[0] = delta;
        self.compute_coefficients();
    }

    /// The Jacobian multiplier `ag[0]`: conductance per unit ∂q/∂v.
    pub fn slope(&self) -> f64 {
        self.ag[0]
    }

    pub fn value(&self, s: StateId) -> f64 {
        self.history[0][2 * s.0]
    }

    pub fn set_value(&mut self, s: StateId, v: f64) {
        self.history[0][2 * s.0] = v;
    }

    pub fn derivative(&self, s: StateId) -> f64 {
        self.history[0][2 * s.0 + 1]
    }

    /// State value `back` accepted points ago (`back = 1` is the most
    /// recently accepted).
    pub fn prev_value(&self, s: StateId, back: usize) -> f64 {
        self.history[back][2 * s.0]
    }

    pub fn prev_derivative(&self, s: StateId, back: usize) -> f64 {
        self.history[back][2 * s.0 + 1]
    }

    /// Compute the derivative of state `s` at the current time from the
    /// value just written and the history, and store it in the current
    /// slice. Returns the derivative.
    pub fn integrate(&mut self, s: StateId) -> f64 {
        let i = 2 * s.0;
        let deriv = match (self.method, self.order) {
            (Method::Trapezoidal, 2) => {
                self.ag[0] * self.history[0][i]
                    + self.ag[1] * self.history[1][i]
                    - self.history[1][i + 1]
            }
            _ => {
                let mut d = 0.0;
                for k in 0..=self.order {
                    d += self.ag[k] * self.history[k][i];
                }
                d
            }
        };
        self.history[0][i + 1] = deriv;
        deriv
    }

    /// Integration coefficients for the current order and step history.
    ///
    /// Orders 1 and trapezoidal-2 have closed forms; Gear orders solve the
    /// Taylor moment system for the (possibly non-uniform) step history.
    fn compute_coefficients(&mut self) {
        let h = self.delta;
        self.ag = [0.0; 7];
        match (self.method, self.order) {
            (_, 0 | 1) => {
                self.ag[0] = 1.0 / h;
                self.ag[1] = -1.0 / h;
            }
            (Method::Trapezoidal, _) => {
                self.ag[0] = 2.0 / h;
                self.ag[1] = -2.0 / h;
            }
            (Method::Gear, m) => {
                // τ_i: distance from the attempted time back to history
                // point i; τ_0 = 0.
                let mut tau = [0.0f64; 7];
                for i in 1..=m {
                    tau[i] = tau[i - 1] + self.deltas[i - 1];
                }
                // Σ_i a_i (−τ_i)^k = δ_{k,1}  for k = 0..=m.
                let mat = DMatrix::from_fn(m + 1, m + 1, |k, i| (-tau[i]).powi(k as i32));
                let mut rhs = DVector::zeros(m + 1);
                rhs[1] = 1.0;
                let coeffs = mat
                    .lu()
                    .solve(&rhs)
                    .expect("moment system is nonsingular for distinct step times");
                for i in 0..=m {
                    self.ag[i] = coeffs[i];
                }
            }
        }
    }

    /// Polynomial predictor: extrapolate state `s` to the attempted time
    /// through the last `order + 1` accepted values.
    pub fn predict(&self, s: StateId) -> f64 {
        let p = self.order + 1;
        let mut tau = [0.0f64; 8];
        for i in 1..=p {
            tau[i] = tau[i - 1] + self.deltas[i - 1];
        }
        let mut pred = 0.0;
        for i in 1..=p {
            let mut coeff = 1.0;
            for j in 1..=p {
                if j != i {
                    coeff *= tau[j] / (tau[j] - tau[i]);
                }
            }
            pred += coeff * self.prev_value(s, i);
        }
        pred
    }

    /// Normalized local truncation error of state `s`: the ratio of the
    /// corrector/predictor difference to the configured tolerance. Values
    /// above 1 mean the step must be rejected.
    pub fn local_error(&self, s: StateId, reltol: f64, chgtol: f64, trtol: f64) -> f64 {
        let q = self.value(s);
        let qp = self.predict(s);
        let tol = trtol * (reltol * q.abs().max(qp.abs()) + chgtol);
        (q - qp).abs() / tol
    }

    /// Aggregate LTE ratio over every state.
    pub fn max_local_error(&self, reltol: f64, chgtol: f64, trtol: f64) -> f64 {
        (0..self.n_states)
            .map(|i| self.local_error(StateId(i), reltol, chgtol, trtol))
            .fold(0.0f64, f64::max)
    }

    /// Commit the attempted point: advance time, rotate the history ring and
    /// shift the step-size history. The new current slice starts as a copy
    /// of the accepted point. May raise the integration order after a
    /// streak of accepted steps.
    pub fn accept(&mut self) {
        self.time += self.delta;
        let mut recycled = self
            .history
            .pop()
            .expect("history ring is never empty after initialize");
        recycled.copy_from_slice(&self.history[0]);
        self.history.insert(0, recycled);
        self.deltas.rotate_right(1);
        self.deltas[0] = self.delta;

        self.accepted_streak += 1;
        let streak_needed = match self.method {
            Method::Trapezoidal => 1,
            Method::Gear => self.order + ORDER_RAISE_STREAK,
        };
        if self.order < self.max_order && self.accepted_streak >= streak_needed {
            self.order += 1;
            self.accepted_streak = 0;
        }
    }

    /// Roll back after a rejected step: the order drops to 1 and the streak
    /// resets. The current slice is rewritten by the retried load pass.
    pub fn reject(&mut self) {
        self.order = 1;
        self.accepted_streak = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init(method: Method, n: usize, h: f64) -> (Integrator, Vec<StateId>) {
        let mut integ = Integrator::new(method);
        let ids: Vec<_> = (0..n).map(|_| integ.create_state()).collect();
        integ.initialize(0.0, h);
        (integ, ids)
    }

    #[test]
    fn test_states_zero_initialized() {
        let (integ, ids) = init(Method::Gear, 3, 1e-6);
        for &s in &ids {
            assert_eq!(integ.value(s), 0.0);
            assert_eq!(integ.derivative(s), 0.0);
            for back in 1..=integ.max_order() + 1 {
                assert_eq!(integ.prev_value(s, back), 0.0);
            }
        }
    }

    #[test]
    fn test_backward_euler_coefficients() {
        let (integ, _) = init(Method::Gear, 1, 0.5);
        assert!((integ.slope() - 2.0).abs() < 1e-12);
        assert!((integ.ag[1] + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_trapezoidal_order2_coefficients() {
        let (mut integ, ids) = init(Method::Trapezoidal, 1, 0.5);
        integ.set_value(ids[0], 1.0);
        integ.integrate(ids[0]);
        integ.accept();
        assert_eq!(integ.order(), 2);
        integ.begin_step(0.5);
        assert!((integ.slope() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_gear2_uniform_matches_bdf2() {
        let (mut integ, ids) = init(Method::Gear, 1, 1.0);
        // Reach order 2 through accepted steps.
        while integ.order() < 2 {
            integ.begin_step(1.0);
            integ.integrate(ids[0]);
            integ.accept();
        }
        integ.begin_step(1.0);
        // BDF2 with uniform h=1: a = [3/2, -2, 1/2].
        assert!((integ.ag[0] - 1.5).abs() < 1e-10, "ag = {:?}", integ.ag);
        assert!((integ.ag[1] + 2.0).abs() < 1e-10, "ag = {:?}", integ.ag);
        assert!((integ.ag[2] - 0.5).abs() < 1e-10, "ag = {:?}", integ.ag);
    }

    #[test]
    fn test_integrate_linear_ramp() {
        // q(t) = 3t: every method must report dq/dt = 3 exactly.
        let h = 0.25;
        let (mut integ, ids) = init(Method::Gear, 1, h);
        let s = ids[0];
        for step in 1..=5 {
            integ.begin_step(h);
            integ.set_value(s, 3.0 * h * step as f64);
            let d = integ.integrate(s);
            assert!(
                (d - 3.0).abs() < 1e-9,
                "step {}: dq/dt = {} (expected 3)",
                step,
                d
            );
            integ.accept();
        }
    }

    #[test]
    fn test_predictor_exact_on_polynomial() {
        // With order ≥ 1 the predictor reproduces a linear state exactly.
        let h = 0.1;
        let (mut integ, ids) = init(Method::Gear, 1, h);
        let s = ids[0];
        for step in 1..=4 {
            integ.begin_step(h);
            integ.set_value(s, 2.0 * h * step as f64 + 1.0);
            integ.integrate(s);
            integ.accept();
        }
        integ.begin_step(h);
        let expected = 2.0 * h * 5.0 + 1.0;
        let pred = integ.predict(s);
        assert!(
            (pred - expected).abs() < 1e-9,
            "predicted {} (expected {})",
            pred,
            expected
        );
    }

    #[test]
    fn test_lte_small_for_smooth_state() {
        let h = 0.01;
        let (mut integ, ids) = init(Method::Trapezoidal, 1, h);
        let s = ids[0];
        for step in 1..=4 {
            integ.begin_step(h);
            integ.set_value(s, (h * step as f64).sin());
            integ.integrate(s);
            integ.accept();
        }
        integ.begin_step(h);
        integ.set_value(s, (h * 5.0).sin());
        let err = integ.local_error(s, 1e-3, 1e-14, 7.0);
        assert!(err < 1.0, "LTE ratio {} should accept a smooth state", err);
    }

    #[test]
    fn test_reject_drops_order() {
        let (mut integ, ids) = init(Method::Gear, 1, 1e-3);
        for _ in 0..10 {
            integ.begin_step(1e-3);
            integ.integrate(ids[0]);
            integ.accept();
        }
        assert!(integ.order() > 1);
        integ.reject();
        assert_eq!(integ.order(), 1);
    }
}
