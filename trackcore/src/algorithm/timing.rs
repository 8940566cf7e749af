use crate::config::{FiberTimeGate, HitQuality};
use crate::data::event::Hit;

/// Folds a time difference into `(-period/2, period/2]`.
#[inline]
pub fn fold_time(dt: f64, period: Option<f64>) -> f64 {
    match period {
        Some(p) if p > 0.0 => {
            let half = 0.5 * p;
            let mut t = dt.rem_euclid(p);
            if t > half {
                t -= p;
            }
            t
        }
        _ => dt,
    }
}

/// Hit time relative to the event reference, folded by the coarse clock period.
#[inline]
pub fn relative_time(time: f64, time_reference: f64, gate: &FiberTimeGate) -> f64 {
    fold_time(time - time_reference, gate.wrap_period)
}

/// Sanity cut on a fiber hit: energy loss, and the hit time measured from the
/// event reference before any folding.
///
/// Hits without a time cannot be gated and are refused.
#[inline]
pub fn fiber_hit_is_sane(hit: &Hit, quality: &HitQuality, time_reference: f64) -> bool {
    match hit.time {
        Some(t) => quality.fiber_energy.contains_open(hit.energy) && (t - time_reference).abs() < quality.fiber_time_limit,
        None => false,
    }
}

/// Fiber hits that pass the sanity cut and fall inside the time window.
///
/// # Arguments
///
/// * `hits` - Raw hits of one fiber plane.
/// * `quality` - Energy and time sanity limits.
/// * `gate` - Relative time window and optional wrap period.
/// * `time_reference` - Common event time the window is relative to.
///
pub fn gate_fiber_hits(hits: &[Hit], quality: &HitQuality, gate: &FiberTimeGate, time_reference: f64) -> Vec<Hit> {
    hits.iter()
        .filter(|hit| fiber_hit_is_sane(hit, quality, time_reference))
        .filter(|hit| {
            hit.time
                .map(|t| gate.window.contains_open(relative_time(t, time_reference, gate)))
                .unwrap_or(false)
        })
        .copied()
        .collect()
}

/// Upstream strip hits passing the energy window.
pub fn gate_upstream_hits(hits: &[Hit], quality: &HitQuality) -> Vec<Hit> {
    hits.iter().filter(|hit| quality.upstream_energy.contains_open(hit.energy)).copied().collect()
}
