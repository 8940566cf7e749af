use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Stopping rules of the simplex search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NelderMeadOptions {
    pub max_iterations: usize,
    /// Largest cost spread over the simplex at convergence.
    pub tolerance: f64,
    /// Largest distance of any vertex from the best one at convergence, in the
    /// infinity norm. A simplex straddling the minimum can have no cost spread
    /// at all, so the cost criterion alone is not enough.
    pub x_tolerance: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        NelderMeadOptions { max_iterations: 2_000, tolerance: 1e-10, x_tolerance: 1e-8 }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Minimum {
    pub point: DVector<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Largest `|x_i - x_best|` over every vertex and coordinate.
fn simplex_size(simplex: &[(DVector<f64>, f64)]) -> f64 {
    let best = &simplex[0].0;
    simplex[1..].iter().map(|(x, _)| (x - best).amax()).fold(0.0, f64::max)
}

#[inline]
fn project(x: DVector<f64>, lower: &DVector<f64>, upper: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(
        x.len(),
        x.iter().zip(lower.iter().zip(upper.iter())).map(|(&v, (&lo, &hi))| v.max(lo).min(hi)),
    )
}

/// Derivative-free Nelder–Mead search inside a box.
///
/// Every trial point is projected onto `[lower, upper]` component-wise before
/// it is evaluated, so the cost is never called outside the box. A cost of
/// NaN is treated as `+inf`.
///
/// # Arguments
///
/// * `cost` - Function to minimize.
/// * `start` - Initial point, projected into the box.
/// * `steps` - Initial simplex edge length per coordinate.
/// * `lower`, `upper` - Box constraints.
/// * `options` - Iteration cap, cost and simplex-size tolerances.
///
pub fn minimize<F>(
    mut cost: F,
    start: &DVector<f64>,
    steps: &DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
    options: &NelderMeadOptions,
) -> Minimum
where
    F: FnMut(&DVector<f64>) -> f64,
{
    let n = start.len();
    let mut eval = |x: &DVector<f64>| {
        let v = cost(x);
        if v.is_nan() { f64::INFINITY } else { v }
    };

    let x0 = project(start.clone(), lower, upper);
    let f0 = eval(&x0);
    if n == 0 {
        return Minimum { point: x0, value: f0, iterations: 0, converged: true };
    }
    let mut simplex: Vec<(DVector<f64>, f64)> = Vec::with_capacity(n + 1);
    simplex.push((x0.clone(), f0));
    for i in 0..n {
        let mut x = x0.clone();
        x[i] += steps[i];
        if x[i] > upper[i] {
            x[i] = x0[i] - steps[i];
        }
        let x = project(x, lower, upper);
        let f = eval(&x);
        simplex.push((x, f));
    }

    let mut iterations = 0;
    let mut converged = false;
    while iterations < options.max_iterations {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let best = simplex[0].1;
        let worst = simplex[n].1;
        if (worst - best).abs() <= options.tolerance && simplex_size(&simplex) <= options.x_tolerance {
            converged = true;
            break;
        }
        iterations += 1;

        let centroid = simplex[..n].iter().fold(DVector::<f64>::zeros(n), |acc, (x, _)| acc + x) / n as f64;
        let worst_x = simplex[n].0.clone();

        let xr = project(&centroid + (&centroid - &worst_x) * REFLECTION, lower, upper);
        let fr = eval(&xr);

        if fr < best {
            let xe = project(&centroid + (&xr - &centroid) * EXPANSION, lower, upper);
            let fe = eval(&xe);
            simplex[n] = if fe < fr { (xe, fe) } else { (xr, fr) };
            continue;
        }
        if fr < simplex[n - 1].1 {
            simplex[n] = (xr, fr);
            continue;
        }

        let (xc, fc, accept) = if fr < worst {
            let xc = project(&centroid + (&xr - &centroid) * CONTRACTION, lower, upper);
            let fc = eval(&xc);
            (xc, fc, fc <= fr)
        } else {
            let xc = project(&centroid + (&worst_x - &centroid) * CONTRACTION, lower, upper);
            let fc = eval(&xc);
            (xc, fc, fc < worst)
        };
        if accept {
            simplex[n] = (xc, fc);
            continue;
        }

        // shrink towards the best vertex
        let best_x = simplex[0].0.clone();
        for vertex in simplex.iter_mut().skip(1) {
            let x = project(&best_x + (&vertex.0 - &best_x) * SHRINK, lower, upper);
            let f = eval(&x);
            *vertex = (x, f);
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    let (point, value) = simplex.swap_remove(0);
    Minimum { point, value, iterations, converged }
}
