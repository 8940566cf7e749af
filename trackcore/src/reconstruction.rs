use std::collections::BTreeMap;

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::algorithm::alignment::{collect_sample, AlignmentContext, AlignmentSample, AlignmentSettings};
use crate::algorithm::incoming::{build_incoming, reference_vertex, PlacedHit};
use crate::algorithm::matching::{match_candidates, MatchContext, N_FEATURES};
use crate::algorithm::outgoing::build_outgoing;
use crate::calibration::charge::ChargeCalibration;
use crate::calibration::response::ResponseFunctions;
use crate::config::TrackingConfig;
use crate::data::detector::DetectorId;
use crate::data::event::{Event, TofWallHit};
use crate::data::track::GlobalTrack;
use crate::error::{Result, TrackingError};
use crate::geometry::setup::{AlignmentOffsets, DetectorFrames, SetupGeometry};
use crate::geometry::vector::Vec3;

/// Why an event was not reconstructed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    Trigger,
    ReferenceMultiplicity { detector: DetectorId, hits: usize },
    PlaneMultiplicity { detector: DetectorId, hits: usize },
    MissingPid,
    UnphysicalBeta { beta: f64 },
    MissingTofWallHit,
    UncalibratedBar { bar: u32 },
    /// Both reference chamber points sit at the same depth.
    DegenerateReference,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub event_id: u64,
    pub multiplicities: BTreeMap<DetectorId, usize>,
    pub n_incoming: usize,
    pub n_outgoing_a: usize,
    pub n_outgoing_b: usize,
    pub n_tracks: usize,
    pub reference_vertex: Option<Vec3>,
    pub rejection: Option<Rejection>,
}

/// Everything produced for one event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventReconstruction {
    pub summary: EventSummary,
    pub tracks: Vec<GlobalTrack>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment_sample: Option<AlignmentSample>,
}

/// Per-event inputs that survived pre-selection.
struct Preselected {
    reference_beta: f64,
    charge: f64,
    reference_vertex: Vec3,
}

/// Process-wide reconstruction state, built once and shared read-only by all events.
#[derive(Debug)]
pub struct Reconstructor {
    config: TrackingConfig,
    geometry: SetupGeometry,
    offsets: AlignmentOffsets,
    frames: DetectorFrames,
    functions: ResponseFunctions,
    charge: ChargeCalibration,
}

impl Reconstructor {
    /// Validates every input and precomputes the detector transforms.
    ///
    /// # Arguments
    ///
    /// * `config` - Gates, windows and caps.
    /// * `geometry` - Nominal detector placements.
    /// * `offsets` - Alignment corrections on top of `geometry`.
    /// * `functions` - The six calibrated response functions.
    /// * `charge` - Time-of-flight wall charge calibration.
    ///
    pub fn new(
        config: TrackingConfig,
        geometry: SetupGeometry,
        offsets: AlignmentOffsets,
        functions: ResponseFunctions,
        charge: ChargeCalibration,
    ) -> Result<Self> {
        config.validate()?;
        functions.validate(N_FEATURES)?;
        if charge.is_empty() {
            return Err(TrackingError::Table { line: 0, message: "charge calibration has no bars".to_string() });
        }
        let frames = DetectorFrames::new(&geometry, &offsets)?;
        info!(
            "reconstruction ready: {} detectors, {} aligned, {} calibrated wall bars, field factor {:.4}",
            geometry.detectors.len(),
            offsets.offsets.len(),
            charge.len(),
            config.field.factor()
        );
        Ok(Reconstructor { config, geometry, offsets, frames, functions, charge })
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn frames(&self) -> &DetectorFrames {
        &self.frames
    }

    fn preselect(&self, event: &Event) -> std::result::Result<Preselected, Rejection> {
        let cfg = &self.config;
        if let Some(mask) = cfg.trigger_mask {
            if event.trigger_pattern.map_or(true, |tpat| tpat & mask == 0) {
                return Err(Rejection::Trigger);
            }
        }

        let chambers = [DetectorId::ReferenceChamber0, DetectorId::ReferenceChamber1];
        for det in chambers {
            let hits = event.multiplicity(det);
            let bad = if cfg.multiplicity.require_single_reference_hit { hits != 1 } else { hits == 0 };
            if bad {
                return Err(Rejection::ReferenceMultiplicity { detector: det, hits });
            }
        }
        for det in DetectorId::UPSTREAM.into_iter().chain(DetectorId::FIBERS) {
            let hits = event.multiplicity(det);
            if hits > cfg.multiplicity.max_hits_per_plane {
                return Err(Rejection::PlaneMultiplicity { detector: det, hits });
            }
        }

        let pid = event.pid.ok_or(Rejection::MissingPid)?;
        if !(pid.beta > 0.0 && pid.beta < 1.0) {
            return Err(Rejection::UnphysicalBeta { beta: pid.beta });
        }

        let wall: &TofWallHit = event
            .tof_wall
            .iter()
            .find(|h| h.plane == cfg.tof_wall.plane && cfg.tof_wall.tof.contains_open(h.tof))
            .ok_or(Rejection::MissingTofWallHit)?;
        let charge = self
            .charge
            .charge(wall.bar, wall.energy_loss)
            .ok_or(Rejection::UncalibratedBar { bar: wall.bar })?;

        let [m0, m1] = chambers.map(|det| PlacedHit::place(&self.frames, det, &event.hits(det)[0]).lab);
        let reference_vertex = reference_vertex(&m0, &m1).ok_or(Rejection::DegenerateReference)?;

        Ok(Preselected { reference_beta: pid.beta, charge, reference_vertex })
    }

    /// Reconstructs one event.
    ///
    /// Never fails: an event that cannot be reconstructed yields no tracks and
    /// a summary naming the reason.
    pub fn process_event(&self, event: &Event) -> EventReconstruction {
        let cfg = &self.config;
        let mut summary = EventSummary {
            event_id: event.event_id,
            multiplicities: DetectorId::ALL.iter().map(|&d| (d, event.multiplicity(d))).collect(),
            n_incoming: 0,
            n_outgoing_a: 0,
            n_outgoing_b: 0,
            n_tracks: 0,
            reference_vertex: None,
            rejection: None,
        };

        let pre = match self.preselect(event) {
            Ok(pre) => pre,
            Err(rejection) => {
                debug!("event {} rejected: {:?}", event.event_id, rejection);
                summary.rejection = Some(rejection);
                return EventReconstruction { summary, tracks: Vec::new(), alignment_sample: None };
            }
        };
        summary.reference_vertex = Some(pre.reference_vertex);

        let incoming = build_incoming(
            event,
            &self.frames,
            &cfg.hit_quality,
            &cfg.vertex_window,
            &pre.reference_vertex,
            cfg.caps.max_incoming,
        );
        let outgoing = build_outgoing(event, &self.frames, cfg);
        summary.n_incoming = incoming.len();
        summary.n_outgoing_a = outgoing.via_a.len();
        summary.n_outgoing_b = outgoing.via_b.len();

        // only events whose combination passes both builders calibrate the setup
        let alignment_sample = if cfg.collect_alignment_samples && !incoming.is_empty() {
            collect_sample(event, &self.frames, cfg).filter(|s| !outgoing.via(s.final_plane).is_empty())
        } else {
            None
        };

        let ctx = MatchContext {
            functions: &self.functions,
            gates: &cfg.residual_gates,
            field_factor: cfg.field.factor(),
            reference_beta: pre.reference_beta,
            charge: pre.charge,
            event_id: event.event_id,
            max_tracks: cfg.caps.max_tracks,
        };
        let tracks = match_candidates(incoming.as_slice(), &outgoing, &ctx).into_vec();
        summary.n_tracks = tracks.len();
        debug!(
            "event {}: {} incoming, {}+{} outgoing, {} tracks",
            event.event_id, summary.n_incoming, summary.n_outgoing_a, summary.n_outgoing_b, summary.n_tracks
        );

        EventReconstruction { summary, tracks, alignment_sample }
    }

    /// Reconstructs events in parallel; results keep the input order.
    pub fn process_batch(&self, events: &[Event]) -> Vec<EventReconstruction> {
        events.par_iter().map(|event| self.process_event(event)).collect()
    }

    /// Cost context for aligning this setup on recorded samples.
    pub fn alignment_context<'a>(&'a self, samples: &'a [AlignmentSample], settings: &'a AlignmentSettings) -> AlignmentContext<'a> {
        AlignmentContext {
            geometry: &self.geometry,
            base_offsets: &self.offsets,
            functions: &self.functions,
            samples,
            settings,
            field_factor: self.config.field.factor(),
        }
    }
}
