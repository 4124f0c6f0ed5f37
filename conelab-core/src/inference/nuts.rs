//! No-U-Turn Sampler.
//!
//! Multinomial NUTS with tree doubling, a fixed diagonal mass matrix and
//! dual-averaging step-size adaptation during warmup. Subtrees are merged by
//! progressive sampling: uniform within a subtree, biased towards the new
//! subtree at the top level.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use super::{InferenceError, LogDensity};

/// Energy error beyond which a trajectory is declared divergent.
const DIVERGENCE_THRESHOLD: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct NutsSettings {
    pub warmup: usize,
    pub samples: usize,
    pub max_tree_depth: usize,
    pub target_accept: f64,
}

/// Retained draws (unconstrained) plus diagnostics.
#[derive(Debug, Clone)]
pub struct NutsRun {
    pub draws: Vec<Vec<f64>>,
    pub step_size: f64,
    pub divergences: usize,
    pub mean_accept: f64,
    pub mean_tree_depth: f64,
}

#[derive(Debug, Clone)]
struct State {
    q: Vec<f64>,
    p: Vec<f64>,
    logp: f64,
    grad: Vec<f64>,
}

impl State {
    fn at<M: LogDensity + ?Sized>(model: &M, q: &[f64]) -> Self {
        let mut grad = vec![0.0; q.len()];
        let logp = model.log_density_grad(q, &mut grad);
        Self {
            q: q.to_vec(),
            p: vec![0.0; q.len()],
            logp,
            grad,
        }
    }

    fn hamiltonian(&self, inv_mass: &[f64]) -> f64 {
        let kinetic: f64 = self
            .p
            .iter()
            .zip(inv_mass)
            .map(|(p, m)| p * p * m)
            .sum();
        -self.logp + 0.5 * kinetic
    }

    fn resample_momentum<R: Rng + ?Sized>(&mut self, inv_mass: &[f64], rng: &mut R) {
        for (p, m) in self.p.iter_mut().zip(inv_mass) {
            let z: f64 = StandardNormal.sample(rng);
            *p = z / m.sqrt();
        }
    }
}

/// One leapfrog step of signed size `eps`.
fn leapfrog<M: LogDensity + ?Sized>(model: &M, state: &mut State, eps: f64, inv_mass: &[f64]) {
    for (p, g) in state.p.iter_mut().zip(&state.grad) {
        *p += 0.5 * eps * g;
    }
    for ((q, p), m) in state.q.iter_mut().zip(&state.p).zip(inv_mass) {
        *q += eps * m * p;
    }
    state.logp = model.log_density_grad(&state.q, &mut state.grad);
    for (p, g) in state.p.iter_mut().zip(&state.grad) {
        *p += 0.5 * eps * g;
    }
}

fn log_sum_exp(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max == f64::NEG_INFINITY {
        f64::NEG_INFINITY
    } else {
        max + ((a - max).exp() + (b - max).exp()).ln()
    }
}

fn is_turning(left: &State, right: &State, inv_mass: &[f64]) -> bool {
    let mut dot_left = 0.0;
    let mut dot_right = 0.0;
    for i in 0..left.q.len() {
        let dq = right.q[i] - left.q[i];
        dot_left += dq * inv_mass[i] * left.p[i];
        dot_right += dq * inv_mass[i] * right.p[i];
    }
    dot_left < 0.0 || dot_right < 0.0
}

struct Tree {
    left: State,
    right: State,
    proposal: State,
    log_sum_weight: f64,
    n_leapfrog: usize,
    sum_accept: f64,
    divergent: bool,
    turning: bool,
}

impl Tree {
    fn edge(&self, forward: bool) -> &State {
        if forward {
            &self.right
        } else {
            &self.left
        }
    }

    fn set_edge(&mut self, forward: bool, from: &mut Tree) {
        if forward {
            std::mem::swap(&mut self.right, &mut from.right);
        } else {
            std::mem::swap(&mut self.left, &mut from.left);
        }
    }
}

struct Trajectory<'m, M: ?Sized> {
    model: &'m M,
    inv_mass: &'m [f64],
    eps: f64,
    h0: f64,
}

impl<M: LogDensity + ?Sized> Trajectory<'_, M> {
    fn leaf(&self, edge: &State, forward: bool) -> Tree {
        let mut state = edge.clone();
        let eps = if forward { self.eps } else { -self.eps };
        leapfrog(self.model, &mut state, eps, self.inv_mass);
        let energy_error = state.hamiltonian(self.inv_mass) - self.h0;
        let (log_weight, accept, divergent) = if energy_error.is_finite() {
            (
                -energy_error,
                (-energy_error).exp().min(1.0),
                energy_error > DIVERGENCE_THRESHOLD,
            )
        } else {
            (f64::NEG_INFINITY, 0.0, true)
        };
        Tree {
            left: state.clone(),
            right: state.clone(),
            proposal: state,
            log_sum_weight: log_weight,
            n_leapfrog: 1,
            sum_accept: accept,
            divergent,
            turning: false,
        }
    }

    fn build<R: Rng + ?Sized>(
        &self,
        edge: &State,
        depth: usize,
        forward: bool,
        rng: &mut R,
    ) -> Tree {
        if depth == 0 {
            return self.leaf(edge, forward);
        }
        let mut inner = self.build(edge, depth - 1, forward, rng);
        if inner.divergent || inner.turning {
            return inner;
        }
        let mut outer = self.build(inner.edge(forward), depth - 1, forward, rng);
        inner.n_leapfrog += outer.n_leapfrog;
        inner.sum_accept += outer.sum_accept;
        if outer.divergent || outer.turning {
            inner.divergent |= outer.divergent;
            inner.turning |= outer.turning;
            return inner;
        }

        let combined = log_sum_exp(inner.log_sum_weight, outer.log_sum_weight);
        if rng.gen::<f64>() < (outer.log_sum_weight - combined).exp() {
            std::mem::swap(&mut inner.proposal, &mut outer.proposal);
        }
        inner.log_sum_weight = combined;
        inner.set_edge(forward, &mut outer);
        inner.turning = is_turning(&inner.left, &inner.right, self.inv_mass);
        inner
    }
}

/// Outcome of one transition.
struct Transition {
    state: State,
    accept: f64,
    depth: usize,
    divergent: bool,
}

fn transition<M: LogDensity + ?Sized, R: Rng + ?Sized>(
    model: &M,
    current: &State,
    eps: f64,
    inv_mass: &[f64],
    max_depth: usize,
    rng: &mut R,
) -> Transition {
    let mut start = current.clone();
    start.resample_momentum(inv_mass, rng);
    let traj = Trajectory {
        model,
        inv_mass,
        eps,
        h0: start.hamiltonian(inv_mass),
    };

    let mut tree = Tree {
        left: start.clone(),
        right: start.clone(),
        proposal: start,
        log_sum_weight: 0.0,
        n_leapfrog: 0,
        sum_accept: 0.0,
        divergent: false,
        turning: false,
    };

    let mut depth = 0;
    while depth < max_depth {
        let forward = rng.gen::<bool>();
        let mut sub = traj.build(tree.edge(forward), depth, forward, rng);
        depth += 1;
        tree.n_leapfrog += sub.n_leapfrog;
        tree.sum_accept += sub.sum_accept;
        if sub.divergent {
            tree.divergent = true;
            break;
        }
        if sub.turning {
            break;
        }
        if rng.gen::<f64>() < (sub.log_sum_weight - tree.log_sum_weight).exp() {
            std::mem::swap(&mut tree.proposal, &mut sub.proposal);
        }
        tree.log_sum_weight = log_sum_exp(tree.log_sum_weight, sub.log_sum_weight);
        tree.set_edge(forward, &mut sub);
        if is_turning(&tree.left, &tree.right, inv_mass) {
            break;
        }
    }

    Transition {
        state: tree.proposal,
        accept: tree.sum_accept / tree.n_leapfrog.max(1) as f64,
        depth,
        divergent: tree.divergent,
    }
}

/// Step size at which a single leapfrog step has acceptance near one half.
fn find_reasonable_step_size<M: LogDensity + ?Sized, R: Rng + ?Sized>(
    model: &M,
    current: &State,
    inv_mass: &[f64],
    rng: &mut R,
) -> f64 {
    let mut start = current.clone();
    start.resample_momentum(inv_mass, rng);
    let h0 = start.hamiltonian(inv_mass);
    let log_ratio = |eps: f64| {
        let mut s = start.clone();
        leapfrog(model, &mut s, eps, inv_mass);
        let r = h0 - s.hamiltonian(inv_mass);
        if r.is_nan() {
            f64::NEG_INFINITY
        } else {
            r
        }
    };

    let half = 0.5f64.ln();
    let mut eps = 1.0;
    let mut ratio = log_ratio(eps);
    let direction = if ratio > half { 1.0 } else { -1.0 };
    for _ in 0..100 {
        if direction * ratio <= direction * half {
            break;
        }
        eps *= 2f64.powf(direction);
        ratio = log_ratio(eps);
    }
    eps.clamp(1e-10, 1e3)
}

/// Dual-averaging step-size adaptation.
#[derive(Debug, Clone)]
struct DualAveraging {
    mu: f64,
    target: f64,
    h_bar: f64,
    log_eps_bar: f64,
    counter: f64,
}

impl DualAveraging {
    const GAMMA: f64 = 0.05;
    const T0: f64 = 10.0;
    const KAPPA: f64 = 0.75;

    fn new(eps0: f64, target: f64) -> Self {
        Self {
            mu: (10.0 * eps0).ln(),
            target,
            h_bar: 0.0,
            log_eps_bar: 0.0,
            counter: 0.0,
        }
    }

    /// Feed one acceptance statistic; returns the next step size.
    fn update(&mut self, accept: f64) -> f64 {
        self.counter += 1.0;
        let m = self.counter;
        let w = 1.0 / (m + Self::T0);
        self.h_bar = (1.0 - w) * self.h_bar + w * (self.target - accept);
        let log_eps = self.mu - m.sqrt() / Self::GAMMA * self.h_bar;
        let eta = m.powf(-Self::KAPPA);
        self.log_eps_bar = eta * log_eps + (1.0 - eta) * self.log_eps_bar;
        log_eps.exp()
    }

    fn adapted(&self) -> f64 {
        self.log_eps_bar.exp()
    }
}

/// Run warmup then retain `settings.samples` draws starting at `z0`.
pub fn sample<M: LogDensity + ?Sized, R: Rng + ?Sized>(
    model: &M,
    z0: &[f64],
    inv_mass: &[f64],
    settings: &NutsSettings,
    rng: &mut R,
) -> Result<NutsRun, InferenceError> {
    let mut state = State::at(model, z0);
    if !state.logp.is_finite() {
        return Err(InferenceError::NumericalInstability(
            "log density is not finite at the sampler start point".to_string(),
        ));
    }

    let mut eps = find_reasonable_step_size(model, &state, inv_mass, rng);
    let mut adapt = DualAveraging::new(eps, settings.target_accept);
    for _ in 0..settings.warmup {
        let t = transition(model, &state, eps, inv_mass, settings.max_tree_depth, rng);
        state = t.state;
        eps = adapt.update(t.accept);
    }
    if settings.warmup > 0 {
        eps = adapt.adapted();
    }
    if !eps.is_finite() || eps <= 0.0 {
        return Err(InferenceError::NumericalInstability(format!(
            "step size adaptation failed (step size {eps})"
        )));
    }
    tracing::debug!(step_size = eps, warmup = settings.warmup, "warmup complete");

    let mut draws = Vec::with_capacity(settings.samples);
    let mut divergences = 0;
    let mut accept_sum = 0.0;
    let mut depth_sum = 0;
    for _ in 0..settings.samples {
        let t = transition(model, &state, eps, inv_mass, settings.max_tree_depth, rng);
        divergences += usize::from(t.divergent);
        accept_sum += t.accept;
        depth_sum += t.depth;
        state = t.state;
        draws.push(state.q.clone());
    }

    let n = settings.samples.max(1) as f64;
    Ok(NutsRun {
        draws,
        step_size: eps,
        divergences,
        mean_accept: accept_sum / n,
        mean_tree_depth: depth_sum as f64 / n,
    })
}
