use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::detector::DetectorId;

/// A calibrated measurement on one detector plane.
///
/// `u` is the coordinate the plane measures (X or Y), `v` the second coordinate
/// of two-dimensional planes such as the reference chambers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub u: f64,
    #[serde(default)]
    pub v: Option<f64>,
    pub energy: f64,
    #[serde(default)]
    pub time: Option<f64>,
}

impl Hit {
    pub fn new(u: f64, energy: f64) -> Self {
        Hit { u, v: None, energy, time: None }
    }

    pub fn with_v(mut self, v: f64) -> Self {
        self.v = Some(v);
        self
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }
}

/// A hit in the time-of-flight wall behind the spectrometer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TofWallHit {
    pub plane: u32,
    /// 1-based bar number, indexes the charge calibration table.
    pub bar: u32,
    pub tof: f64,
    pub energy_loss: f64,
}

/// Velocity and identification measured by the independent upstream ion-ID device.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PidMeasurement {
    pub beta: f64,
    #[serde(default)]
    pub charge: Option<f64>,
    #[serde(default)]
    pub mass_to_charge: Option<f64>,
    #[serde(default)]
    pub brho: Option<f64>,
}

/// All inputs of one beam-interaction event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: u64,
    #[serde(default)]
    pub trigger_pattern: Option<u32>,
    /// Common time reference the fiber hit times are gated against (ns).
    #[serde(default)]
    pub time_reference: f64,
    #[serde(default)]
    pub hits: BTreeMap<DetectorId, Vec<Hit>>,
    #[serde(default)]
    pub tof_wall: Vec<TofWallHit>,
    #[serde(default)]
    pub pid: Option<PidMeasurement>,
}

impl Event {
    pub fn new(event_id: u64) -> Self {
        Event { event_id, ..Default::default() }
    }

    pub fn hits(&self, detector: DetectorId) -> &[Hit] {
        self.hits.get(&detector).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn multiplicity(&self, detector: DetectorId) -> usize {
        self.hits(detector).len()
    }

    pub fn push_hit(&mut self, detector: DetectorId, hit: Hit) {
        self.hits.entry(detector).or_default().push(hit);
    }
}
