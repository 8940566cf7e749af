use log::trace;

use crate::algorithm::bounded::BoundedVec;
use crate::calibration::response::{ResponseFunctions, Responses};
use crate::config::ResidualGates;
use crate::constants::{ATOMIC_MASS_UNIT, SPEED_OF_LIGHT};
use crate::data::candidate::{IncomingCandidate, OutgoingCandidate, OutgoingCandidates};
use crate::data::track::{GlobalTrack, TrackPoints};
use crate::geometry::vector::Vec3;

/// Number of inputs every response function takes.
pub const N_FEATURES: usize = 8;

/// The ordered inputs of the calibrated response functions.
///
/// | index | quantity |
/// |-------|----------|
/// | 0, 1  | Y-near point: y, z |
/// | 2, 3  | X-near point: x, z |
/// | 4, 5  | entry fiber point: x, z |
/// | 6     | outgoing slope dX/dZ |
/// | 7     | dY/dZ from the Y-near point to the Y-plane point |
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureVector(pub [f64; N_FEATURES]);

impl FeatureVector {
    pub fn from_points(y_near: &Vec3, x_near: &Vec3, entry: &Vec3, exit: &Vec3, y_plane: &Vec3) -> Self {
        FeatureVector([
            y_near.y,
            y_near.z,
            x_near.x,
            x_near.z,
            entry.x,
            entry.z,
            (exit.x - entry.x) / (exit.z - entry.z),
            (y_plane.y - y_near.y) / (y_plane.z - y_near.z),
        ])
    }

    pub fn new(incoming: &IncomingCandidate, outgoing: &OutgoingCandidate) -> Self {
        Self::from_points(&incoming.y_near, &incoming.x_near, &outgoing.entry, &outgoing.exit, &outgoing.y_plane)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

/// Kinematics derived from the response functions for one pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Evaluation {
    pub responses: Responses,
    /// Field-scaled momentum over charge (GeV/c).
    pub momentum_over_charge: f64,
    pub time_of_flight: f64,
    pub beta: f64,
    pub gamma: f64,
    pub mass_to_charge: f64,
}

/// Evaluates the response functions and derives the kinematics.
///
/// Returns `None` when the result is unphysical (non-positive flight path,
/// `beta` outside `(0, 1)` or any non-finite value).
///
/// # Arguments
///
/// * `functions` - The six calibrated response functions.
/// * `features` - Feature vector of the pair.
/// * `field_factor` - Run current over calibration current.
/// * `reference_beta` - Velocity from the independent ion-ID measurement.
///
pub fn evaluate(functions: &ResponseFunctions, features: &FeatureVector, field_factor: f64, reference_beta: f64) -> Option<Evaluation> {
    let responses = functions.evaluate(features.as_slice());
    let momentum_over_charge = responses.momentum_over_charge * field_factor;
    let flight_path = responses.flight_path;
    if !(flight_path > 0.0 && reference_beta > 0.0) {
        return None;
    }

    let time_of_flight = flight_path / reference_beta / SPEED_OF_LIGHT;
    let beta = flight_path / time_of_flight / SPEED_OF_LIGHT;
    if !(beta > 0.0 && beta < 1.0) {
        return None;
    }
    let gamma = 1.0 / (1.0 - beta * beta).sqrt();
    let mass_to_charge = momentum_over_charge / (beta * gamma * ATOMIC_MASS_UNIT);

    let evaluation = Evaluation { responses, momentum_over_charge, time_of_flight, beta, gamma, mass_to_charge };
    let finite = [
        momentum_over_charge,
        time_of_flight,
        gamma,
        mass_to_charge,
        responses.tx0,
        responses.ty0,
        responses.tx1,
        responses.ty1,
    ]
    .iter()
    .all(|v| v.is_finite());
    finite.then_some(evaluation)
}

/// Per-event inputs of the matcher that do not depend on the pair.
#[derive(Clone, Copy, Debug)]
pub struct MatchContext<'a> {
    pub functions: &'a ResponseFunctions,
    pub gates: &'a ResidualGates,
    pub field_factor: f64,
    pub reference_beta: f64,
    pub charge: f64,
    pub event_id: u64,
    pub max_tracks: usize,
}

/// Evaluates one pair and applies both residual gates.
pub fn match_pair(incoming: &IncomingCandidate, outgoing: &OutgoingCandidate, ctx: &MatchContext) -> Option<GlobalTrack> {
    let features = FeatureVector::new(incoming, outgoing);
    if !features.is_finite() {
        return None;
    }
    let eval = evaluate(ctx.functions, &features, ctx.field_factor, ctx.reference_beta)?;
    let r = &eval.responses;

    let gates = ctx.gates.for_plane(outgoing.final_plane);
    let (res_tx, res_ty) = (r.tx0 - incoming.tx0, r.ty0 - incoming.ty0);
    if !(gates.entrance_tx.contains(res_tx) && gates.entrance_ty.contains(res_ty)) {
        trace!("pair via {} fails entrance gate: dtx={:.5} dty={:.5}", outgoing.final_plane, res_tx, res_ty);
        return None;
    }
    if let Some(exit_tx) = &gates.exit_tx {
        let res_out = r.tx1 - outgoing.slope;
        if !exit_tx.contains(res_out) {
            trace!("pair via {} fails exit gate: dtx={:.5}", outgoing.final_plane, res_out);
            return None;
        }
    }

    let x_near = &incoming.x_near;
    let y_near = &incoming.y_near;
    Some(GlobalTrack {
        event_id: ctx.event_id,
        vertex: Vec3::new(x_near.x - r.tx0 * x_near.z, y_near.y - r.ty0 * y_near.z, 0.0),
        momentum: Vec3::new(r.tx0, r.ty0, 1.0).with_magnitude(eval.momentum_over_charge),
        momentum_over_charge: eval.momentum_over_charge,
        charge: ctx.charge,
        upstream_energy: incoming.energy,
        mass_to_charge: eval.mass_to_charge,
        beta: eval.beta,
        gamma: eval.gamma,
        time_of_flight: eval.time_of_flight,
        flight_path: r.flight_path,
        entrance_angles: Vec3::new(r.tx0, r.ty0, 1.0),
        exit_angles: Vec3::new(r.tx1, r.ty1, 1.0),
        measured_angles: Vec3::new(incoming.tx0, incoming.ty0, 1.0),
        final_plane: outgoing.final_plane,
        points: TrackPoints {
            x_near: incoming.x_near,
            y_near: incoming.y_near,
            x_far: incoming.x_far,
            y_far: incoming.y_far,
            entry: outgoing.entry,
            y_plane: outgoing.y_plane,
            exit: outgoing.exit,
        },
    })
}

/// Matches every incoming candidate against every outgoing one.
///
/// Iterates incoming candidates in order and, for each, all candidates via
/// final plane A followed by those via B. Enumeration ends once `max_tracks`
/// tracks are held; the remaining pairs are never evaluated.
pub fn match_candidates(incoming: &[IncomingCandidate], outgoing: &OutgoingCandidates, ctx: &MatchContext) -> BoundedVec<GlobalTrack> {
    let mut tracks = BoundedVec::new(ctx.max_tracks);
    'pairs: for inc in incoming {
        for out in outgoing.iter() {
            if tracks.is_full() {
                break 'pairs;
            }
            if let Some(track) = match_pair(inc, out, ctx) {
                let _ = tracks.try_push(track);
            }
        }
    }
    tracks
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::calibration::response::ResponseFunction;
    use crate::config::{PlaneGates, Window};
    use crate::data::detector::FinalPlane;

    /// poq = 10 + x_near.x, flight path = 800 cm, angles tracking the inputs.
    pub(crate) fn simple_functions() -> ResponseFunctions {
        let mut poq_slopes = [0.0; N_FEATURES];
        poq_slopes[2] = 1.0;
        let mut ty_slopes = [0.0; N_FEATURES];
        ty_slopes[7] = 1.0;
        let mut tx1_slopes = [0.0; N_FEATURES];
        tx1_slopes[6] = 1.0;
        ResponseFunctions {
            momentum_over_charge: ResponseFunction::linear("poq", 10.0, &poq_slopes),
            flight_path: ResponseFunction::constant("flight_path", N_FEATURES, 800.0),
            tx0: ResponseFunction::constant("tx0", N_FEATURES, 0.0),
            ty0: ResponseFunction::linear("ty0", 0.0, &ty_slopes),
            tx1: ResponseFunction::linear("tx1", 0.0, &tx1_slopes),
            ty1: ResponseFunction::constant("ty1", N_FEATURES, 0.0),
        }
    }

    fn incoming() -> IncomingCandidate {
        IncomingCandidate {
            x_near: Vec3::new(0.0, 0.0, 10.0),
            y_near: Vec3::new(0.0, 0.0, 12.0),
            x_far: Vec3::new(0.0, 0.0, 30.0),
            y_far: Vec3::new(0.0, 0.0, 32.0),
            tx0: 0.0,
            ty0: 0.0,
            vertex: Vec3::ZERO,
            reference_vertex: Vec3::ZERO,
            energy: 42.0,
            x_near_local: Vec3::ZERO,
            y_near_local: Vec3::ZERO,
        }
    }

    fn outgoing(plane: FinalPlane) -> OutgoingCandidate {
        OutgoingCandidate {
            entry: Vec3::new(0.0, 0.0, 300.0),
            y_plane: Vec3::new(-5.0, 0.0, 320.0),
            exit: Vec3::new(-75.0, 0.0, 600.0),
            final_plane: plane,
            bend_angle: (-0.25f64).atan().to_degrees(),
            slope: -0.25,
            entry_local: Vec3::ZERO,
            y_local: Vec3::ZERO,
            exit_local: Vec3::ZERO,
        }
    }

    fn open_gates() -> ResidualGates {
        let open = PlaneGates { entrance_tx: Window::symmetric(1.0), entrance_ty: Window::symmetric(1.0), exit_tx: None };
        ResidualGates { via_a: open.clone(), via_b: open }
    }

    fn context<'a>(functions: &'a ResponseFunctions, gates: &'a ResidualGates, max_tracks: usize) -> MatchContext<'a> {
        MatchContext { functions, gates, field_factor: 1.0, reference_beta: 0.6, charge: 6.0, event_id: 7, max_tracks }
    }

    #[test]
    fn test_feature_vector_order() {
        let f = FeatureVector::new(&incoming(), &outgoing(FinalPlane::A));
        assert_eq!(f.0[..6], [0.0, 12.0, 0.0, 10.0, 0.0, 300.0]);
        assert!((f.0[6] + 0.25).abs() < 1e-12);
        assert_eq!(f.0[7], 0.0);
    }

    #[test]
    fn test_kinematics() {
        let functions = simple_functions();
        let f = FeatureVector::new(&incoming(), &outgoing(FinalPlane::A));
        let e = evaluate(&functions, &f, 2.0, 0.6).unwrap();
        assert!((e.momentum_over_charge - 20.0).abs() < 1e-12);
        assert!((e.time_of_flight - 800.0 / 0.6 / SPEED_OF_LIGHT).abs() < 1e-9);
        assert!((e.beta - 0.6).abs() < 1e-12);
        assert!((e.gamma - 1.25).abs() < 1e-12);
        assert!((e.mass_to_charge - 20.0 / (0.6 * 1.25 * ATOMIC_MASS_UNIT)).abs() < 1e-9);

        assert!(evaluate(&functions, &f, 1.0, 0.0).is_none());
    }

    #[test]
    fn test_track_fields() {
        let functions = simple_functions();
        let gates = open_gates();
        let ctx = context(&functions, &gates, 10);
        let t = match_pair(&incoming(), &outgoing(FinalPlane::B), &ctx).unwrap();
        assert_eq!(t.event_id, 7);
        assert_eq!(t.final_plane, FinalPlane::B);
        assert!((t.momentum.norm() - 10.0).abs() < 1e-12);
        assert!(t.momentum.max_abs_diff(&Vec3::new(0.0, 0.0, 10.0)) < 1e-12);
        assert_eq!(t.charge, 6.0);
        assert_eq!(t.upstream_energy, 42.0);
        assert!((t.exit_angles.x + 0.25).abs() < 1e-12);
        assert_eq!(t.points.exit, Vec3::new(-75.0, 0.0, 600.0));
    }

    #[test]
    fn test_entrance_gate_uses_plane_windows() {
        let functions = simple_functions();
        let mut gates = open_gates();
        // TX0 - tx0 = 0 must fall outside B's window but inside A's
        gates.via_b.entrance_tx = Window::new(-0.0098, -0.0035);
        let ctx = context(&functions, &gates, 10);
        assert!(match_pair(&incoming(), &outgoing(FinalPlane::A), &ctx).is_some());
        assert!(match_pair(&incoming(), &outgoing(FinalPlane::B), &ctx).is_none());
    }

    #[test]
    fn test_exit_gate() {
        let mut functions = simple_functions();
        functions.tx1 = ResponseFunction::constant("tx1", N_FEATURES, -0.2);
        let mut gates = open_gates();
        gates.via_a.exit_tx = Some(Window::symmetric(0.01));
        let ctx = context(&functions, &gates, 10);
        assert!(match_pair(&incoming(), &outgoing(FinalPlane::A), &ctx).is_none());

        gates.via_a.exit_tx = Some(Window::symmetric(0.1));
        let ctx = context(&functions, &gates, 10);
        assert!(match_pair(&incoming(), &outgoing(FinalPlane::A), &ctx).is_some());
    }

    #[test]
    fn test_exit_windows_differ_per_final_plane() {
        // exit residual TX1 - slope = -0.2 - (-0.25) = 0.05
        let mut functions = simple_functions();
        functions.tx1 = ResponseFunction::constant("tx1", N_FEATURES, -0.2);
        let mut gates = open_gates();
        gates.via_a.exit_tx = Some(Window::new(0.0, 0.1));
        gates.via_b.exit_tx = Some(Window::new(-0.1, 0.0));
        let ctx = context(&functions, &gates, 10);
        assert!(match_pair(&incoming(), &outgoing(FinalPlane::A), &ctx).is_some());
        assert!(match_pair(&incoming(), &outgoing(FinalPlane::B), &ctx).is_none());

        let both = OutgoingCandidates { via_a: vec![outgoing(FinalPlane::A)], via_b: vec![outgoing(FinalPlane::B)] };
        let tracks = match_candidates(&[incoming()], &both, &ctx);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks.as_slice()[0].final_plane, FinalPlane::A);

        std::mem::swap(&mut gates.via_a, &mut gates.via_b);
        let ctx = context(&functions, &gates, 10);
        let tracks = match_candidates(&[incoming()], &both, &ctx);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks.as_slice()[0].final_plane, FinalPlane::B);
    }

    #[test]
    fn test_cap_stops_enumeration() {
        let functions = simple_functions();
        let gates = open_gates();
        let ctx = context(&functions, &gates, 3);
        let incoming = vec![incoming(); 4];
        let outgoing = OutgoingCandidates {
            via_a: vec![outgoing(FinalPlane::A); 2],
            via_b: vec![outgoing(FinalPlane::B); 2],
        };
        let tracks = match_candidates(&incoming, &outgoing, &ctx);
        assert_eq!(tracks.len(), 3);
        let planes: Vec<FinalPlane> = tracks.as_slice().iter().map(|t| t.final_plane).collect();
        assert_eq!(planes, vec![FinalPlane::A, FinalPlane::A, FinalPlane::B]);
    }
}
