use itertools::iproduct;
use log::trace;

use crate::algorithm::bounded::BoundedVec;
use crate::algorithm::timing::gate_upstream_hits;
use crate::config::{HitQuality, VertexWindow};
use crate::data::candidate::IncomingCandidate;
use crate::data::detector::DetectorId;
use crate::data::event::{Event, Hit};
use crate::geometry::setup::DetectorFrames;
use crate::geometry::vector::Vec3;

/// A hit placed in both frames.
#[derive(Clone, Copy, Debug)]
pub struct PlacedHit {
    pub local: Vec3,
    pub lab: Vec3,
    pub energy: f64,
}

impl PlacedHit {
    pub fn place(frames: &DetectorFrames, detector: DetectorId, hit: &Hit) -> Self {
        let local = frames.local_point(detector, hit.u, hit.v);
        PlacedHit { local, lab: frames.to_lab(detector, &local), energy: hit.energy }
    }
}

/// Slope dX/dZ and intercept at z = 0 of the line through `a` and `b` in the XZ plane.
#[inline]
fn back_project_x(a: &Vec3, b: &Vec3) -> Option<(f64, f64)> {
    let dz = a.z - b.z;
    if dz == 0.0 {
        return None;
    }
    let slope = (a.x - b.x) / dz;
    Some((slope, b.x - slope * b.z))
}

#[inline]
fn back_project_y(a: &Vec3, b: &Vec3) -> Option<(f64, f64)> {
    let dz = a.z - b.z;
    if dz == 0.0 {
        return None;
    }
    let slope = (a.y - b.y) / dz;
    Some((slope, b.y - slope * b.z))
}

/// Vertex at z = 0 of the straight line through the two reference chamber points.
///
/// Returns `None` if both points sit at the same depth.
pub fn reference_vertex(chamber_0: &Vec3, chamber_1: &Vec3) -> Option<Vec3> {
    let (_, x) = back_project_x(chamber_0, chamber_1)?;
    let (_, y) = back_project_y(chamber_0, chamber_1)?;
    Some(Vec3::new(x, y, 0.0))
}

/// Builds incoming candidates from the four upstream strip planes.
///
/// Every combination of one accepted hit per plane is tried in the order
/// `(y_near, x_near, y_far, x_far)`. A combination is kept if its vertex at
/// z = 0 lies inside the closed window around `reference`. Enumeration stops
/// as soon as `max_incoming` candidates are held.
///
/// # Arguments
///
/// * `event` - Raw hits of the event.
/// * `frames` - Detector transforms including alignment offsets.
/// * `quality` - Upstream energy gate.
/// * `window` - Allowed vertex offset from the reference vertex.
/// * `reference` - Reference vertex from the wire chambers.
/// * `max_incoming` - Candidate cap.
///
pub fn build_incoming(
    event: &Event,
    frames: &DetectorFrames,
    quality: &HitQuality,
    window: &VertexWindow,
    reference: &Vec3,
    max_incoming: usize,
) -> BoundedVec<IncomingCandidate> {
    let place = |det: DetectorId| -> Vec<PlacedHit> {
        gate_upstream_hits(event.hits(det), quality).iter().map(|h| PlacedHit::place(frames, det, h)).collect()
    };
    let x_near = place(DetectorId::UpstreamXNear);
    let y_near = place(DetectorId::UpstreamYNear);
    let x_far = place(DetectorId::UpstreamXFar);
    let y_far = place(DetectorId::UpstreamYFar);

    let mut candidates = BoundedVec::new(max_incoming);
    for (yn, xn, yf, xf) in iproduct!(y_near.iter(), x_near.iter(), y_far.iter(), x_far.iter()) {
        if candidates.is_full() {
            break;
        }
        let (Some((tx0, vx)), Some((ty0, vy))) = (back_project_x(&xf.lab, &xn.lab), back_project_y(&yf.lab, &yn.lab))
        else {
            continue;
        };

        let (dx, dy) = (vx - reference.x, vy - reference.y);
        if !(window.dx.contains(dx) && window.dy.contains(dy)) {
            trace!("incoming combination outside vertex window: dx={:.4} dy={:.4}", dx, dy);
            continue;
        }

        let _ = candidates.try_push(IncomingCandidate {
            x_near: xn.lab,
            y_near: yn.lab,
            x_far: xf.lab,
            y_far: yf.lab,
            tx0,
            ty0,
            vertex: Vec3::new(vx, vy, 0.0),
            reference_vertex: *reference,
            energy: xn.energy,
            x_near_local: xn.local,
            y_near_local: yn.local,
        });
    }
    candidates
}
