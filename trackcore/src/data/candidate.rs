use serde::{Deserialize, Serialize};

use crate::data::detector::FinalPlane;
use crate::geometry::vector::Vec3;

/// Straight track segment upstream of the dipole, built from one hit on each
/// of the four strip planes and checked against the reference vertex.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IncomingCandidate {
    pub x_near: Vec3,
    pub y_near: Vec3,
    pub x_far: Vec3,
    pub y_far: Vec3,
    pub tx0: f64,
    pub ty0: f64,
    /// Back-projection of the segment to z = 0.
    pub vertex: Vec3,
    /// Back-projection of the reference chamber line to z = 0.
    pub reference_vertex: Vec3,
    /// Energy of the X-near hit.
    pub energy: f64,
    pub x_near_local: Vec3,
    pub y_near_local: Vec3,
}

/// Track segment behind the dipole: entry point, extrapolated Y-plane point and
/// one of the two final planes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutgoingCandidate {
    pub entry: Vec3,
    /// X and Z extrapolated onto the Y plane, Y as measured.
    pub y_plane: Vec3,
    pub exit: Vec3,
    pub final_plane: FinalPlane,
    /// Angle of the entry→exit line in the XZ plane (deg).
    pub bend_angle: f64,
    /// dX/dZ of the entry→exit line.
    pub slope: f64,
    pub entry_local: Vec3,
    pub y_local: Vec3,
    pub exit_local: Vec3,
}

/// Outgoing candidates, one list per final plane.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutgoingCandidates {
    pub via_a: Vec<OutgoingCandidate>,
    pub via_b: Vec<OutgoingCandidate>,
}

impl OutgoingCandidates {
    pub fn len(&self) -> usize {
        self.via_a.len() + self.via_b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.via_a.is_empty() && self.via_b.is_empty()
    }

    pub fn via(&self, plane: FinalPlane) -> &[OutgoingCandidate] {
        match plane {
            FinalPlane::A => &self.via_a,
            FinalPlane::B => &self.via_b,
        }
    }

    /// Candidates in matching order: all of final plane A, then all of B.
    pub fn iter(&self) -> impl Iterator<Item = &OutgoingCandidate> {
        self.via_a.iter().chain(self.via_b.iter())
    }
}
