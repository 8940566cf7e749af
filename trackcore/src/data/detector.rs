use std::fmt;
use std::fmt::{Display, Formatter};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::geometry::vector::Vec3;

/// Role of a detector plane in the spectrometer.
///
/// Upstream of the dipole sit two reference wire chambers and four strip planes
/// (two measuring X, two measuring Y, at different depths). Downstream sit the
/// fiber planes: an entry plane measuring X, a plane measuring Y and two
/// mutually exclusive final planes measuring X.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum DetectorId {
    #[serde(rename = "reference_chamber_0")]
    ReferenceChamber0,
    #[serde(rename = "reference_chamber_1")]
    ReferenceChamber1,
    UpstreamXNear,
    UpstreamYNear,
    UpstreamXFar,
    UpstreamYFar,
    EntryFiber,
    YFiber,
    FinalFiberA,
    FinalFiberB,
}

impl DetectorId {
    pub const ALL: [DetectorId; 10] = [
        DetectorId::ReferenceChamber0,
        DetectorId::ReferenceChamber1,
        DetectorId::UpstreamXNear,
        DetectorId::UpstreamYNear,
        DetectorId::UpstreamXFar,
        DetectorId::UpstreamYFar,
        DetectorId::EntryFiber,
        DetectorId::YFiber,
        DetectorId::FinalFiberA,
        DetectorId::FinalFiberB,
    ];

    pub const UPSTREAM: [DetectorId; 4] = [
        DetectorId::UpstreamXNear,
        DetectorId::UpstreamYNear,
        DetectorId::UpstreamXFar,
        DetectorId::UpstreamYFar,
    ];

    pub const FIBERS: [DetectorId; 4] = [
        DetectorId::EntryFiber,
        DetectorId::YFiber,
        DetectorId::FinalFiberA,
        DetectorId::FinalFiberB,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DetectorId::ReferenceChamber0 => "reference_chamber_0",
            DetectorId::ReferenceChamber1 => "reference_chamber_1",
            DetectorId::UpstreamXNear => "upstream_x_near",
            DetectorId::UpstreamYNear => "upstream_y_near",
            DetectorId::UpstreamXFar => "upstream_x_far",
            DetectorId::UpstreamYFar => "upstream_y_far",
            DetectorId::EntryFiber => "entry_fiber",
            DetectorId::YFiber => "y_fiber",
            DetectorId::FinalFiberA => "final_fiber_a",
            DetectorId::FinalFiberB => "final_fiber_b",
        }
    }

    /// Coordinate(s) a plane of this role measures in its local frame.
    pub fn default_axis(&self) -> MeasuredAxis {
        match self {
            DetectorId::ReferenceChamber0 | DetectorId::ReferenceChamber1 => MeasuredAxis::XY,
            DetectorId::UpstreamYNear | DetectorId::UpstreamYFar | DetectorId::YFiber => MeasuredAxis::Y,
            _ => MeasuredAxis::X,
        }
    }
}

impl Display for DetectorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Which local coordinate(s) a plane measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasuredAxis {
    X,
    Y,
    XY,
}

impl MeasuredAxis {
    /// Places the measured coordinate(s) on the local plane `z = 0`.
    #[inline]
    pub fn local_point(&self, u: f64, v: f64) -> Vec3 {
        match self {
            MeasuredAxis::X => Vec3::new(u, 0.0, 0.0),
            MeasuredAxis::Y => Vec3::new(0.0, u, 0.0),
            MeasuredAxis::XY => Vec3::new(u, v, 0.0),
        }
    }
}

/// The two alternative exit planes behind the dipole.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum FinalPlane {
    A,
    B,
}

impl FinalPlane {
    pub fn detector(&self) -> DetectorId {
        match self {
            FinalPlane::A => DetectorId::FinalFiberA,
            FinalPlane::B => DetectorId::FinalFiberB,
        }
    }
}

impl Display for FinalPlane {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.detector())
    }
}
