use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::data::detector::FinalPlane;
use crate::geometry::vector::Vec3;

/// Lab-frame points that contributed to a global track.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct TrackPoints {
    pub x_near: Vec3,
    pub y_near: Vec3,
    pub x_far: Vec3,
    pub y_far: Vec3,
    pub entry: Vec3,
    pub y_plane: Vec3,
    pub exit: Vec3,
}

/// A fully reconstructed and accepted trajectory.
///
/// Only ever constructed with every field populated; rejected pairs never
/// produce a partial record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct GlobalTrack {
    pub event_id: u64,
    /// Back-projected vertex at z = 0 using the calibrated entrance angles.
    pub vertex: Vec3,
    /// Direction (TX0, TY0, 1) scaled to |p/Q| in GeV/c.
    pub momentum: Vec3,
    pub momentum_over_charge: f64,
    /// Charge from the time-of-flight wall energy loss.
    pub charge: f64,
    /// Energy deposited in the upstream X-near plane, the second charge estimate.
    pub upstream_energy: f64,
    pub mass_to_charge: f64,
    pub beta: f64,
    pub gamma: f64,
    /// ns
    pub time_of_flight: f64,
    /// cm
    pub flight_path: f64,
    /// (TX0, TY0, 1) from the response functions.
    pub entrance_angles: Vec3,
    /// (TX1, TY1, 1) from the response functions.
    pub exit_angles: Vec3,
    /// (tx0, ty0, 1) measured by the upstream strip planes.
    pub measured_angles: Vec3,
    pub final_plane: FinalPlane,
    pub points: TrackPoints,
}
