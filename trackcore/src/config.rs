use serde::{Deserialize, Serialize};

use crate::data::detector::FinalPlane;
use crate::error::{Result, TrackingError};

/// A `[min, max]` interval.
///
/// Acceptance windows (vertex, bend angle, residuals) are tested closed with
/// [`Window::contains`]; quality gates on energies and times are tested open
/// with [`Window::contains_open`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub min: f64,
    pub max: f64,
}

impl Window {
    pub const fn new(min: f64, max: f64) -> Self {
        Window { min, max }
    }

    pub const fn symmetric(half_width: f64) -> Self {
        Window { min: -half_width, max: half_width }
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    #[inline]
    pub fn contains_open(&self, value: f64) -> bool {
        value > self.min && value < self.max
    }

    fn check(&self, name: &str) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min > self.max {
            return Err(TrackingError::config(format!(
                "{} window [{}, {}] is empty or not finite",
                name, self.min, self.max
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitQuality {
    /// Accepted energy of upstream strip hits (open interval).
    pub upstream_energy: Window,
    /// Accepted energy loss of fiber hits (open interval).
    pub fiber_energy: Window,
    /// Fiber hits further than this from the event time reference are discarded (ns).
    pub fiber_time_limit: f64,
}

impl Default for HitQuality {
    fn default() -> Self {
        Self {
            upstream_energy: Window::new(0.0, 1.0e5),
            fiber_energy: Window::new(0.0, 1.0e3),
            fiber_time_limit: 20_000.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiberTimeGate {
    /// Accepted hit time relative to the event time reference (ns, open interval).
    pub window: Window,
    /// Period of the coarse clock; relative times are folded into `(-T/2, T/2]`.
    pub wrap_period: Option<f64>,
}

impl Default for FiberTimeGate {
    fn default() -> Self {
        Self { window: Window::new(13_460.0, 13_490.0), wrap_period: None }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplicityLimits {
    /// Require exactly one hit in each reference chamber (else at least one).
    pub require_single_reference_hit: bool,
    /// Events with more raw hits on any strip or fiber plane are skipped.
    pub max_hits_per_plane: usize,
}

impl Default for MultiplicityLimits {
    fn default() -> Self {
        Self { require_single_reference_hit: true, max_hits_per_plane: 10 }
    }
}

/// Hard limits bounding the combinatorics of one event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateCaps {
    pub max_incoming: usize,
    /// Shared by both final planes.
    pub max_outgoing: usize,
    pub max_tracks: usize,
}

impl Default for CandidateCaps {
    fn default() -> Self {
        Self { max_incoming: 250, max_outgoing: 250, max_tracks: 500 }
    }
}

/// Allowed offset of a candidate vertex from the reference vertex (cm).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VertexWindow {
    pub dx: Window,
    pub dy: Window,
}

impl Default for VertexWindow {
    fn default() -> Self {
        Self { dx: Window::symmetric(1.0), dy: Window::symmetric(1.0) }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TofWallSelection {
    pub plane: u32,
    /// Accepted time of flight (ns, open interval).
    pub tof: Window,
}

impl Default for TofWallSelection {
    fn default() -> Self {
        Self { plane: 1, tof: Window::new(32.0, 46.0) }
    }
}

/// Residual windows applied to pairs ending in one final plane.
///
/// The exit gate is off (`None`) in the default configuration of both planes;
/// only the entrance gates cut unless `exit_tx` is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaneGates {
    /// TX0 from the response function minus the measured incoming tx0.
    pub entrance_tx: Window,
    /// TY0 from the response function minus the measured incoming ty0.
    pub entrance_ty: Window,
    /// TX1 from the response function minus the measured outgoing slope.
    /// Disabled by default.
    #[serde(default)]
    pub exit_tx: Option<Window>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidualGates {
    pub via_a: PlaneGates,
    pub via_b: PlaneGates,
}

impl ResidualGates {
    pub fn for_plane(&self, plane: FinalPlane) -> &PlaneGates {
        match plane {
            FinalPlane::A => &self.via_a,
            FinalPlane::B => &self.via_b,
        }
    }
}

impl Default for ResidualGates {
    fn default() -> Self {
        Self {
            via_a: PlaneGates {
                entrance_tx: Window::new(-0.0045, 0.00137),
                entrance_ty: Window::new(-0.0016, 0.002),
                exit_tx: None,
            },
            via_b: PlaneGates {
                entrance_tx: Window::new(-0.0098, -0.0035),
                entrance_ty: Window::new(-0.0027, 0.0024),
                exit_tx: None,
            },
        }
    }
}

/// Dipole current during the run and during calibration of the response functions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldScaling {
    pub current: f64,
    pub reference_current: f64,
}

impl FieldScaling {
    #[inline]
    pub fn factor(&self) -> f64 {
        self.current / self.reference_current
    }
}

impl Default for FieldScaling {
    fn default() -> Self {
        Self { current: 1.0, reference_current: 1.0 }
    }
}

/// Every tunable of the per-event reconstruction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub version: u32,
    /// Keep only events whose trigger pattern shares a bit with the mask.
    pub trigger_mask: Option<u32>,
    pub hit_quality: HitQuality,
    pub fiber_time_gate: FiberTimeGate,
    pub multiplicity: MultiplicityLimits,
    pub caps: CandidateCaps,
    pub vertex_window: VertexWindow,
    /// Accepted entry→exit angle behind the dipole (deg, closed).
    pub bend_angle: Window,
    /// Fiber hits closer than this are clustered together (cm).
    pub cluster_threshold: f64,
    pub tof_wall: TofWallSelection,
    pub residual_gates: ResidualGates,
    pub field: FieldScaling,
    /// Record single-hit events for the alignment optimizer.
    pub collect_alignment_samples: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            version: 1,
            trigger_mask: None,
            hit_quality: HitQuality::default(),
            fiber_time_gate: FiberTimeGate::default(),
            multiplicity: MultiplicityLimits::default(),
            caps: CandidateCaps::default(),
            vertex_window: VertexWindow::default(),
            bend_angle: Window::new(-18.0, -10.0),
            cluster_threshold: 0.25,
            tof_wall: TofWallSelection::default(),
            residual_gates: ResidualGates::default(),
            field: FieldScaling::default(),
            collect_alignment_samples: false,
        }
    }
}

impl TrackingConfig {
    /// Checks the configuration once before any event is processed.
    pub fn validate(&self) -> Result<()> {
        let q = &self.hit_quality;
        if q.upstream_energy.min < 0.0 || q.fiber_energy.min < 0.0 {
            return Err(TrackingError::config("energy gates must not be negative"));
        }
        q.upstream_energy.check("upstream energy")?;
        q.fiber_energy.check("fiber energy")?;
        if !(q.fiber_time_limit > 0.0) {
            return Err(TrackingError::config("fiber time limit must be positive"));
        }

        self.fiber_time_gate.window.check("fiber time")?;
        if let Some(period) = self.fiber_time_gate.wrap_period {
            if !(period > 0.0 && period.is_finite()) {
                return Err(TrackingError::config("clock wrap period must be positive"));
            }
            let w = &self.fiber_time_gate.window;
            let reach = w.min.abs().max(w.max.abs());
            if 0.5 * period < reach {
                return Err(TrackingError::config(format!(
                    "clock wrap period {} folds times into +-{}, short of the fiber time window [{}, {}]",
                    period,
                    0.5 * period,
                    w.min,
                    w.max
                )));
            }
        }

        if self.multiplicity.max_hits_per_plane == 0 {
            return Err(TrackingError::config("max_hits_per_plane must be at least 1"));
        }
        let caps = &self.caps;
        if caps.max_incoming == 0 || caps.max_outgoing == 0 || caps.max_tracks == 0 {
            return Err(TrackingError::config("candidate and track caps must be at least 1"));
        }

        self.vertex_window.dx.check("vertex dx")?;
        self.vertex_window.dy.check("vertex dy")?;
        self.bend_angle.check("bend angle")?;
        if !(self.cluster_threshold > 0.0 && self.cluster_threshold.is_finite()) {
            return Err(TrackingError::config("cluster threshold must be positive"));
        }
        self.tof_wall.tof.check("time-of-flight")?;

        for (name, gates) in [("final plane A", &self.residual_gates.via_a), ("final plane B", &self.residual_gates.via_b)] {
            gates.entrance_tx.check(&format!("{} entrance tx", name))?;
            gates.entrance_ty.check(&format!("{} entrance ty", name))?;
            if let Some(w) = &gates.exit_tx {
                w.check(&format!("{} exit tx", name))?;
            }
        }

        if !(self.field.current > 0.0 && self.field.reference_current > 0.0) {
            return Err(TrackingError::config("field currents must be positive"));
        }
        Ok(())
    }
}
