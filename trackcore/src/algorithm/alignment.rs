use log::{info, warn};
use nalgebra::DVector;
use ordered_float::OrderedFloat;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::algorithm::matching::FeatureVector;
use crate::algorithm::minimizer::{minimize, NelderMeadOptions};
use crate::algorithm::outgoing::{fiber_points, intersect_xz};
use crate::algorithm::timing::gate_upstream_hits;
use crate::calibration::response::ResponseFunctions;
use crate::config::TrackingConfig;
use crate::data::detector::{DetectorId, FinalPlane};
use crate::data::event::Event;
use crate::error::{Result, TrackingError};
use crate::geometry::setup::{AlignmentOffsets, DetectorFrames, OffsetComponent, SetupGeometry};
use crate::geometry::vector::Vec3;

/// Local points of an unambiguous event, enough to rebuild its feature vector
/// under any trial geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSample {
    pub event_id: u64,
    pub x_near: Vec3,
    pub y_near: Vec3,
    pub entry: Vec3,
    pub y_fiber: Vec3,
    pub exit: Vec3,
    pub final_plane: FinalPlane,
}

/// Records a sample if every plane the feature vector needs holds exactly one
/// accepted hit or cluster and exactly one final plane fired.
pub fn collect_sample(event: &Event, frames: &DetectorFrames, config: &TrackingConfig) -> Option<AlignmentSample> {
    let single_upstream = |det: DetectorId| {
        let hits = gate_upstream_hits(event.hits(det), &config.hit_quality);
        match hits.as_slice() {
            [hit] => Some(frames.local_point(det, hit.u, hit.v)),
            _ => None,
        }
    };
    let fiber = |det: DetectorId| fiber_points(event, det, frames, config);
    let single_fiber = |det: DetectorId| match fiber(det).as_slice() {
        [p] => Some(p.local),
        _ => None,
    };

    let x_near = single_upstream(DetectorId::UpstreamXNear)?;
    let y_near = single_upstream(DetectorId::UpstreamYNear)?;
    let entry = single_fiber(DetectorId::EntryFiber)?;
    let y_fiber = single_fiber(DetectorId::YFiber)?;

    let a = fiber(DetectorId::FinalFiberA);
    let b = fiber(DetectorId::FinalFiberB);
    let (exit, final_plane) = match (a.as_slice(), b.as_slice()) {
        ([p], []) => (p.local, FinalPlane::A),
        ([], [p]) => (p.local, FinalPlane::B),
        _ => return None,
    };

    Some(AlignmentSample { event_id: event.event_id, x_near, y_near, entry, y_fiber, exit, final_plane })
}

/// One free offset component with its box and initial simplex step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentParameter {
    pub detector: DetectorId,
    pub component: OffsetComponent,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentSettings {
    /// Known momentum over charge of the calibration beam (GeV/c).
    pub reference_momentum_over_charge: f64,
    pub parameters: Vec<AlignmentParameter>,
    pub restarts: usize,
    /// Starting points are drawn from this fraction of each box around its center.
    pub start_fraction: f64,
    /// A solution closer than this fraction of a bound to that bound is degenerate.
    pub degenerate_fraction: f64,
    pub minimizer: NelderMeadOptions,
    pub seed: u64,
}

impl Default for AlignmentSettings {
    fn default() -> Self {
        let rotation = |component| AlignmentParameter {
            detector: DetectorId::UpstreamXNear,
            component,
            min: -0.04,
            max: 0.04,
            step: 0.001,
        };
        let translation = |component| AlignmentParameter {
            detector: DetectorId::UpstreamXNear,
            component,
            min: -2.0,
            max: 2.0,
            step: 0.01,
        };
        AlignmentSettings {
            reference_momentum_over_charge: 0.0,
            parameters: vec![
                rotation(OffsetComponent::RotationX),
                rotation(OffsetComponent::RotationY),
                rotation(OffsetComponent::RotationZ),
                translation(OffsetComponent::TranslationX),
                translation(OffsetComponent::TranslationZ),
            ],
            restarts: 100,
            start_fraction: 0.5,
            degenerate_fraction: 0.1,
            minimizer: NelderMeadOptions::default(),
            seed: 1,
        }
    }
}

impl AlignmentSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.reference_momentum_over_charge.is_finite() && self.reference_momentum_over_charge != 0.0) {
            return Err(TrackingError::Alignment("reference momentum over charge must be set".to_string()));
        }
        if self.parameters.is_empty() {
            return Err(TrackingError::Alignment("no free parameters".to_string()));
        }
        for p in &self.parameters {
            if !(p.min.is_finite() && p.max.is_finite() && p.min < p.max) {
                return Err(TrackingError::Alignment(format!(
                    "{} {:?}: empty box [{}, {}]",
                    p.detector, p.component, p.min, p.max
                )));
            }
            if !(p.step > 0.0) {
                return Err(TrackingError::Alignment(format!("{} {:?}: step must be positive", p.detector, p.component)));
            }
        }
        if self.restarts == 0 {
            return Err(TrackingError::Alignment("at least one restart is needed".to_string()));
        }
        if !(self.start_fraction > 0.0 && self.start_fraction <= 1.0) {
            return Err(TrackingError::Alignment("start fraction must be in (0, 1]".to_string()));
        }
        if !(self.degenerate_fraction >= 0.0 && self.degenerate_fraction < 0.5) {
            return Err(TrackingError::Alignment("degenerate fraction must be in [0, 0.5)".to_string()));
        }
        Ok(())
    }
}

/// Everything the cost function reads, passed explicitly to the minimizer.
pub struct AlignmentContext<'a> {
    pub geometry: &'a SetupGeometry,
    /// Offsets in force during data taking; trial values are added on top.
    pub base_offsets: &'a AlignmentOffsets,
    pub functions: &'a ResponseFunctions,
    pub samples: &'a [AlignmentSample],
    pub settings: &'a AlignmentSettings,
    pub field_factor: f64,
}

impl<'a> AlignmentContext<'a> {
    /// Base offsets with the trial values added to the free components.
    pub fn offsets_for(&self, values: &[f64]) -> AlignmentOffsets {
        let mut offsets = self.base_offsets.clone();
        for (p, &v) in self.settings.parameters.iter().zip(values) {
            let entry = offsets.entry(p.detector);
            let current = entry.get(p.component);
            entry.set(p.component, current + v);
        }
        offsets
    }

    /// RMS deviation of the field-scaled momentum over charge from the reference.
    ///
    /// Samples whose feature vector cannot be formed under the trial geometry
    /// are skipped; `+inf` is returned if none is left.
    pub fn rms(&self, values: &[f64]) -> f64 {
        let Ok(frames) = DetectorFrames::new(self.geometry, &self.offsets_for(values)) else {
            return f64::INFINITY;
        };
        let edges = frames.y_plane_edges_lab();
        let reference = self.settings.reference_momentum_over_charge;

        let mut sum = 0.0;
        let mut count = 0usize;
        for s in self.samples {
            let x_near = frames.to_lab(DetectorId::UpstreamXNear, &s.x_near);
            let y_near = frames.to_lab(DetectorId::UpstreamYNear, &s.y_near);
            let entry = frames.to_lab(DetectorId::EntryFiber, &s.entry);
            let y_lab = frames.to_lab(DetectorId::YFiber, &s.y_fiber);
            let exit = frames.to_lab(s.final_plane.detector(), &s.exit);
            let Some((x, z)) = intersect_xz(&entry, &exit, &edges) else {
                continue;
            };
            let features = FeatureVector::from_points(&y_near, &x_near, &entry, &exit, &Vec3::new(x, y_lab.y, z));
            if !features.is_finite() {
                continue;
            }
            let poq = self.functions.momentum_over_charge.evaluate(features.as_slice()) * self.field_factor;
            sum += (poq - reference).powi(2);
            count += 1;
        }
        if count == 0 {
            return f64::INFINITY;
        }
        (sum / count as f64).sqrt()
    }

    /// True if any value lies within the degenerate fraction of its bound.
    pub fn is_degenerate(&self, values: &[f64]) -> bool {
        let fraction = self.settings.degenerate_fraction;
        self.settings.parameters.iter().zip(values).any(|(p, &v)| {
            let width = p.max - p.min;
            let limit = |bound: f64| if bound == 0.0 { fraction * width } else { fraction * bound.abs() };
            (v - p.min).abs() < limit(p.min) || (p.max - v).abs() < limit(p.max)
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSolution {
    /// One value per free parameter, in settings order.
    pub values: Vec<f64>,
    pub rms: f64,
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSummary {
    pub detector: DetectorId,
    pub component: OffsetComponent,
    pub mean: f64,
    pub std_dev: f64,
}

/// Outcome of all restarts, for an operator to review.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentReport {
    pub n_samples: usize,
    pub reference_momentum_over_charge: f64,
    pub restarts: usize,
    pub degenerate: usize,
    /// Non-degenerate solutions, best first.
    pub accepted: Vec<AlignmentSolution>,
    pub best: Option<AlignmentSolution>,
    /// Base offsets with the best solution applied.
    pub best_offsets: Option<AlignmentOffsets>,
    pub summary: Vec<ParameterSummary>,
}

/// Runs the randomized bounded minimization.
///
/// Restarts are independent and run in parallel; restart `i` draws its
/// starting point from an RNG seeded with `seed + i`, so the report is
/// reproducible for a given seed.
pub fn optimize_alignment(ctx: &AlignmentContext) -> Result<AlignmentReport> {
    let settings = ctx.settings;
    settings.validate()?;
    if ctx.samples.is_empty() {
        warn!("alignment requested without any recorded samples");
        return Err(TrackingError::Alignment("no alignment samples".to_string()));
    }
    info!(
        "aligning {} free parameters on {} samples, reference p/Q = {} GeV/c, {} restarts",
        settings.parameters.len(),
        ctx.samples.len(),
        settings.reference_momentum_over_charge,
        settings.restarts
    );

    let params = &settings.parameters;
    let lower = DVector::from_iterator(params.len(), params.iter().map(|p| p.min));
    let upper = DVector::from_iterator(params.len(), params.iter().map(|p| p.max));
    let steps = DVector::from_iterator(params.len(), params.iter().map(|p| p.step));
    let start_dists: Vec<Uniform<f64>> = params
        .iter()
        .map(|p| {
            let center = 0.5 * (p.min + p.max);
            let half = 0.5 * (p.max - p.min) * settings.start_fraction;
            Uniform::new_inclusive(center - half, center + half)
        })
        .collect();

    let solutions: Vec<AlignmentSolution> = (0..settings.restarts)
        .into_par_iter()
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(settings.seed.wrapping_add(i as u64));
            let start = DVector::from_iterator(params.len(), start_dists.iter().map(|d| d.sample(&mut rng)));
            let m = minimize(|x| ctx.rms(x.as_slice()), &start, &steps, &lower, &upper, &settings.minimizer);
            AlignmentSolution { values: m.point.iter().copied().collect(), rms: m.value, iterations: m.iterations, converged: m.converged }
        })
        .collect();

    let (mut accepted, rejected): (Vec<_>, Vec<_>) = solutions.into_iter().partition(|s| !ctx.is_degenerate(&s.values));
    accepted.sort_by_key(|s| OrderedFloat(s.rms));
    if !rejected.is_empty() {
        warn!("{} of {} restarts ended near a bound and were rejected", rejected.len(), settings.restarts);
    }

    let summary = params
        .iter()
        .enumerate()
        .map(|(j, p)| {
            let values: Vec<f64> = accepted.iter().map(|s| s.values[j]).collect();
            let (mean, std_dev) = match values.len() {
                0 => (f64::NAN, f64::NAN),
                1 => (values[0], 0.0),
                _ => (values.iter().mean(), values.iter().std_dev()),
            };
            ParameterSummary { detector: p.detector, component: p.component, mean, std_dev }
        })
        .collect();

    let best = accepted.first().cloned();
    let best_offsets = best.as_ref().map(|s| ctx.offsets_for(&s.values));
    match &best {
        Some(b) => info!("best alignment rms {:.6} GeV/c at {:?}", b.rms, b.values),
        None => warn!("no acceptable alignment solution found"),
    }

    Ok(AlignmentReport {
        n_samples: ctx.samples.len(),
        reference_momentum_over_charge: settings.reference_momentum_over_charge,
        restarts: settings.restarts,
        degenerate: rejected.len(),
        accepted,
        best,
        best_offsets,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::matching::N_FEATURES;
    use crate::calibration::response::ResponseFunction;
    use crate::data::event::Hit;
    use crate::geometry::setup::tests::straight_geometry;

    const SHIFT: f64 = 0.3;

    /// poq = 10 + 5 * x_near.x, constant elsewhere.
    fn functions() -> ResponseFunctions {
        let mut slopes = [0.0; N_FEATURES];
        slopes[2] = 5.0;
        let constant = |name: &str, v: f64| ResponseFunction::constant(name, N_FEATURES, v);
        ResponseFunctions {
            momentum_over_charge: ResponseFunction::linear("poq", 10.0, &slopes),
            flight_path: constant("flight_path", 800.0),
            tx0: constant("tx0", 0.0),
            ty0: constant("ty0", 0.0),
            tx1: constant("tx1", 0.0),
            ty1: constant("ty1", 0.0),
        }
    }

    /// Beam through lab x = 0 on an X-near plane that really sits SHIFT cm off.
    fn samples() -> Vec<AlignmentSample> {
        (0..20)
            .map(|i| AlignmentSample {
                event_id: i,
                x_near: Vec3::new(-SHIFT, 0.0, 0.0),
                y_near: Vec3::new(0.0, 0.05 * i as f64, 0.0),
                entry: Vec3::new(0.1 * i as f64, 0.0, 0.0),
                y_fiber: Vec3::new(0.0, 0.02 * i as f64, 0.0),
                exit: Vec3::new(-75.0 + 0.1 * i as f64, 0.0, 0.0),
                final_plane: if i % 2 == 0 { FinalPlane::A } else { FinalPlane::B },
            })
            .collect()
    }

    fn settings(max: f64) -> AlignmentSettings {
        AlignmentSettings {
            reference_momentum_over_charge: 10.0,
            parameters: vec![AlignmentParameter {
                detector: DetectorId::UpstreamXNear,
                component: OffsetComponent::TranslationX,
                min: -1.0,
                max,
                step: 0.05,
            }],
            restarts: 6,
            minimizer: NelderMeadOptions { max_iterations: 1_000, tolerance: 1e-14, x_tolerance: 1e-9 },
            ..Default::default()
        }
    }

    #[test]
    fn test_cost_vanishes_at_true_offset() {
        let geometry = straight_geometry();
        let base = AlignmentOffsets::default();
        let functions = functions();
        let samples = samples();
        let settings = settings(1.0);
        let ctx = AlignmentContext { geometry: &geometry, base_offsets: &base, functions: &functions, samples: &samples, settings: &settings, field_factor: 1.0 };
        assert!((ctx.rms(&[0.0]) - 5.0 * SHIFT).abs() < 1e-9);
        assert!(ctx.rms(&[SHIFT]) < 1e-9);
    }

    #[test]
    fn test_optimizer_recovers_shift() {
        let geometry = straight_geometry();
        let base = AlignmentOffsets::default();
        let functions = functions();
        let samples = samples();
        let settings = settings(1.0);
        let ctx = AlignmentContext { geometry: &geometry, base_offsets: &base, functions: &functions, samples: &samples, settings: &settings, field_factor: 1.0 };

        let report = optimize_alignment(&ctx).unwrap();
        assert_eq!(report.degenerate, 0);
        assert_eq!(report.accepted.len(), 6);
        let best = report.best.unwrap();
        assert!((best.values[0] - SHIFT).abs() < 1e-4);
        assert!(best.rms < 1e-3);
        assert!(report.accepted.windows(2).all(|w| w[0].rms <= w[1].rms));

        let offsets = report.best_offsets.unwrap();
        assert!((offsets.get(DetectorId::UpstreamXNear).translation.x - SHIFT).abs() < 1e-4);
        assert!((report.summary[0].mean - SHIFT).abs() < 1e-4);
    }

    #[test]
    fn test_solutions_near_bound_are_degenerate() {
        let geometry = straight_geometry();
        let base = AlignmentOffsets::default();
        let functions = functions();
        let samples = samples();
        // the true offset sits 0.02 below a bound of 0.32
        let settings = settings(0.32);
        let ctx = AlignmentContext { geometry: &geometry, base_offsets: &base, functions: &functions, samples: &samples, settings: &settings, field_factor: 1.0 };

        let report = optimize_alignment(&ctx).unwrap();
        assert_eq!(report.degenerate, 6);
        assert!(report.accepted.is_empty());
        assert!(report.best.is_none());
    }

    #[test]
    fn test_zero_bound_uses_box_width() {
        let geometry = straight_geometry();
        let base = AlignmentOffsets::default();
        let functions = functions();
        let mut settings = settings(1.0);
        settings.parameters[0].min = 0.0;
        let ctx = AlignmentContext { geometry: &geometry, base_offsets: &base, functions: &functions, samples: &[], settings: &settings, field_factor: 1.0 };
        assert!(ctx.is_degenerate(&[0.05]));
        assert!(!ctx.is_degenerate(&[0.5]));
        assert!(ctx.is_degenerate(&[0.95]));
    }

    #[test]
    fn test_empty_sample_is_an_error() {
        let geometry = straight_geometry();
        let base = AlignmentOffsets::default();
        let functions = functions();
        let settings = settings(1.0);
        let ctx = AlignmentContext { geometry: &geometry, base_offsets: &base, functions: &functions, samples: &[], settings: &settings, field_factor: 1.0 };
        assert!(matches!(optimize_alignment(&ctx), Err(TrackingError::Alignment(_))));
    }

    #[test]
    fn test_default_settings_need_a_reference() {
        assert!(AlignmentSettings::default().validate().is_err());
        let settings = AlignmentSettings { reference_momentum_over_charge: 17.0, ..Default::default() };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_collect_sample_requires_single_hits() {
        let frames = DetectorFrames::new(&straight_geometry(), &AlignmentOffsets::default()).unwrap();
        let config = TrackingConfig::default();
        let mut ev = Event::new(4);
        ev.push_hit(DetectorId::UpstreamXNear, Hit::new(0.2, 50.0));
        ev.push_hit(DetectorId::UpstreamYNear, Hit::new(0.1, 50.0));
        for (det, u) in [(DetectorId::EntryFiber, 1.0), (DetectorId::YFiber, 2.0), (DetectorId::FinalFiberB, -70.0)] {
            ev.push_hit(det, Hit::new(u, 10.0).with_time(13_475.0));
        }

        let sample = collect_sample(&ev, &frames, &config).unwrap();
        assert_eq!(sample.final_plane, FinalPlane::B);
        assert_eq!(sample.x_near, Vec3::new(0.2, 0.0, 0.0));
        assert_eq!(sample.y_fiber, Vec3::new(0.0, 2.0, 0.0));

        ev.push_hit(DetectorId::FinalFiberA, Hit::new(-70.0, 10.0).with_time(13_475.0));
        assert!(collect_sample(&ev, &frames, &config).is_none());
    }
}
