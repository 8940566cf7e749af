use log::trace;

use crate::algorithm::bounded::BoundedVec;
use crate::algorithm::clustering::cluster_hits;
use crate::algorithm::timing::gate_fiber_hits;
use crate::config::TrackingConfig;
use crate::constants::PARALLEL_EPSILON;
use crate::data::candidate::{OutgoingCandidate, OutgoingCandidates};
use crate::data::detector::{DetectorId, FinalPlane};
use crate::data::event::Event;
use crate::geometry::setup::DetectorFrames;
use crate::geometry::vector::Vec3;

/// Cluster centroid of a fiber plane placed in both frames.
#[derive(Clone, Copy, Debug)]
pub struct FiberPoint {
    pub local: Vec3,
    pub lab: Vec3,
    pub energy: f64,
}

/// Gates, clusters and places the hits of one fiber plane.
pub fn fiber_points(event: &Event, detector: DetectorId, frames: &DetectorFrames, config: &TrackingConfig) -> Vec<FiberPoint> {
    let gated = gate_fiber_hits(
        event.hits(detector),
        &config.hit_quality,
        &config.fiber_time_gate,
        event.time_reference,
    );
    let pairs: Vec<(f64, f64)> = gated.iter().map(|h| (h.u, h.energy)).collect();
    cluster_hits(&pairs, config.cluster_threshold)
        .into_iter()
        .map(|c| {
            let local = frames.local_point(detector, c.centroid, None);
            FiberPoint { local, lab: frames.to_lab(detector, &local), energy: c.energy }
        })
        .collect()
}

/// Intersection in the XZ plane of the track line through `entry` and `exit`
/// with the line through the two Y-plane edges.
///
/// Returns `(x, z)`, or `None` when the lines are (nearly) parallel.
pub fn intersect_xz(entry: &Vec3, exit: &Vec3, edges: &[Vec3; 2]) -> Option<(f64, f64)> {
    let (d1x, d1z) = (exit.x - entry.x, exit.z - entry.z);
    let (d2x, d2z) = (edges[1].x - edges[0].x, edges[1].z - edges[0].z);
    let (wx, wz) = (edges[0].x - entry.x, edges[0].z - entry.z);

    let det = d1x * d2z - d1z * d2x;
    if det.abs() < PARALLEL_EPSILON {
        return None;
    }
    let s = (wx * d2z - wz * d2x) / det;
    Some((entry.x + s * d1x, entry.z + s * d1z))
}

/// Builds outgoing candidates from the fiber planes behind the dipole.
///
/// Enumeration runs entry cluster, Y cluster, then every cluster of final
/// plane A followed by every cluster of final plane B. One cap is shared by
/// both final planes; the kept candidates are returned split per plane.
pub fn build_outgoing(event: &Event, frames: &DetectorFrames, config: &TrackingConfig) -> OutgoingCandidates {
    let entries = fiber_points(event, DetectorId::EntryFiber, frames, config);
    let ys = fiber_points(event, DetectorId::YFiber, frames, config);
    let finals: Vec<(FinalPlane, FiberPoint)> = [FinalPlane::A, FinalPlane::B]
        .into_iter()
        .flat_map(|plane| {
            fiber_points(event, plane.detector(), frames, config).into_iter().map(move |p| (plane, p))
        })
        .collect();

    let edges = frames.y_plane_edges_lab();
    let mut kept = BoundedVec::new(config.caps.max_outgoing);

    'enumerate: for entry in &entries {
        for y in &ys {
            for (plane, exit) in &finals {
                if kept.is_full() {
                    break 'enumerate;
                }
                let dz = exit.lab.z - entry.lab.z;
                if dz == 0.0 {
                    continue;
                }
                let slope = (exit.lab.x - entry.lab.x) / dz;
                let bend_angle = slope.atan().to_degrees();
                if !config.bend_angle.contains(bend_angle) {
                    trace!("outgoing combination via {} outside bend window: {:.3} deg", plane, bend_angle);
                    continue;
                }
                let Some((x, z)) = intersect_xz(&entry.lab, &exit.lab, &edges) else {
                    trace!("track line parallel to the Y plane");
                    continue;
                };

                let _ = kept.try_push(OutgoingCandidate {
                    entry: entry.lab,
                    y_plane: Vec3::new(x, y.lab.y, z),
                    exit: exit.lab,
                    final_plane: *plane,
                    bend_angle,
                    slope,
                    entry_local: entry.local,
                    y_local: y.local,
                    exit_local: exit.local,
                });
            }
        }
    }

    let (via_a, via_b) = kept.into_vec().into_iter().partition(|c| c.final_plane == FinalPlane::A);
    OutgoingCandidates { via_a, via_b }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::event::Hit;
    use crate::geometry::setup::tests::straight_geometry;
    use crate::geometry::setup::AlignmentOffsets;

    // tan(-14 deg) * 300 cm between entry (z=300) and final A (z=600)
    const EXIT_A: f64 = -74.798;

    fn frames() -> DetectorFrames {
        DetectorFrames::new(&straight_geometry(), &AlignmentOffsets::default()).unwrap()
    }

    fn fiber(ev: &mut Event, det: DetectorId, u: f64) {
        ev.push_hit(det, Hit::new(u, 10.0).with_time(13_475.0));
    }

    #[test]
    fn test_intersection_with_y_plane() {
        let edges = [Vec3::new(-1.0, 0.0, 320.0), Vec3::new(1.0, 0.0, 320.0)];
        let (x, z) = intersect_xz(&Vec3::new(0.0, 0.0, 300.0), &Vec3::new(-30.0, 0.0, 600.0), &edges).unwrap();
        assert!((z - 320.0).abs() < 1e-9);
        assert!((x + 2.0).abs() < 1e-9);

        let along = [Vec3::new(0.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 10.0)];
        assert!(intersect_xz(&Vec3::new(0.0, 0.0, 300.0), &Vec3::new(-30.0, 0.0, 600.0), &along).is_none());
    }

    #[test]
    fn test_single_candidate_extrapolates_y_plane() {
        let mut ev = Event::new(1);
        fiber(&mut ev, DetectorId::EntryFiber, 0.0);
        fiber(&mut ev, DetectorId::YFiber, 1.5);
        fiber(&mut ev, DetectorId::FinalFiberA, EXIT_A);

        let out = build_outgoing(&ev, &frames(), &TrackingConfig::default());
        assert_eq!(out.via_a.len(), 1);
        assert!(out.via_b.is_empty());

        let c = &out.via_a[0];
        assert!((c.bend_angle + 14.0).abs() < 1e-3);
        assert!((c.y_plane.z - 320.0).abs() < 1e-9);
        assert!((c.y_plane.x - EXIT_A * 20.0 / 300.0).abs() < 1e-9);
        assert_eq!(c.y_plane.y, 1.5);
    }

    #[test]
    fn test_bend_window_rejects_straight_tracks() {
        let mut ev = Event::new(1);
        fiber(&mut ev, DetectorId::EntryFiber, 0.0);
        fiber(&mut ev, DetectorId::YFiber, 0.0);
        fiber(&mut ev, DetectorId::FinalFiberA, 0.0);
        assert!(build_outgoing(&ev, &frames(), &TrackingConfig::default()).is_empty());
    }

    #[test]
    fn test_final_planes_are_kept_apart() {
        let mut ev = Event::new(1);
        fiber(&mut ev, DetectorId::EntryFiber, 0.0);
        fiber(&mut ev, DetectorId::YFiber, 0.0);
        fiber(&mut ev, DetectorId::FinalFiberA, EXIT_A);
        // final B sits 20 cm further downstream
        fiber(&mut ev, DetectorId::FinalFiberB, EXIT_A * 320.0 / 300.0);

        let out = build_outgoing(&ev, &frames(), &TrackingConfig::default());
        assert_eq!(out.via_a.len(), 1);
        assert_eq!(out.via_b.len(), 1);
        assert_eq!(out.via_b[0].final_plane, FinalPlane::B);
        let order: Vec<FinalPlane> = out.iter().map(|c| c.final_plane).collect();
        assert_eq!(order, vec![FinalPlane::A, FinalPlane::B]);
    }

    #[test]
    fn test_out_of_time_hits_are_dropped_before_clustering() {
        let mut ev = Event::new(1);
        fiber(&mut ev, DetectorId::EntryFiber, 0.0);
        fiber(&mut ev, DetectorId::YFiber, 0.0);
        ev.push_hit(DetectorId::FinalFiberA, Hit::new(EXIT_A, 10.0).with_time(100.0));
        assert!(build_outgoing(&ev, &frames(), &TrackingConfig::default()).is_empty());
    }

    #[test]
    fn test_shared_cap_across_final_planes() {
        let mut ev = Event::new(1);
        fiber(&mut ev, DetectorId::EntryFiber, 0.0);
        fiber(&mut ev, DetectorId::YFiber, 0.0);
        for i in 0..3 {
            fiber(&mut ev, DetectorId::FinalFiberA, EXIT_A + i as f64);
            fiber(&mut ev, DetectorId::FinalFiberB, EXIT_A * 320.0 / 300.0 + i as f64);
        }
        let mut config = TrackingConfig::default();
        config.caps.max_outgoing = 4;
        let out = build_outgoing(&ev, &frames(), &config);
        assert_eq!(out.len(), 4);
        assert_eq!(out.via_a.len(), 3);
        assert_eq!(out.via_b.len(), 1);
    }
}
