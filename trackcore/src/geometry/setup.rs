use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::detector::{DetectorId, MeasuredAxis};
use crate::error::{Result, TrackingError};
use crate::geometry::transform::RigidTransform;
use crate::geometry::vector::Vec3;

fn default_unit_scale() -> f64 {
    1.0
}

/// Nominal rigid-body placement of one detector plane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorPlacement {
    /// Euler angles (rad), applied as Y, then local X, then local Z.
    pub rotation: Vec3,
    /// Position of the local origin in the lab (cm).
    pub translation: Vec3,
    pub axis: MeasuredAxis,
    /// Factor converting hit coordinates into cm (0.1 for mm readout).
    #[serde(default = "default_unit_scale")]
    pub unit_scale: f64,
    /// Added to the primary measured coordinate before scaling.
    #[serde(default)]
    pub local_offset: f64,
}

impl DetectorPlacement {
    pub fn new(axis: MeasuredAxis, rotation: Vec3, translation: Vec3) -> Self {
        DetectorPlacement { rotation, translation, axis, unit_scale: 1.0, local_offset: 0.0 }
    }

    /// Local point for a hit with primary coordinate `u` and optional second coordinate `v`.
    #[inline]
    pub fn local_point(&self, u: f64, v: Option<f64>) -> Vec3 {
        let u = (u + self.local_offset) * self.unit_scale;
        let v = v.unwrap_or(0.0) * self.unit_scale;
        self.axis.local_point(u, v)
    }
}

/// Small geometric correction summed onto a detector's nominal placement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentOffset {
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default)]
    pub translation: Vec3,
}

/// One scalar degree of freedom of an [`AlignmentOffset`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetComponent {
    RotationX,
    RotationY,
    RotationZ,
    TranslationX,
    TranslationY,
    TranslationZ,
}

impl AlignmentOffset {
    pub fn set(&mut self, component: OffsetComponent, value: f64) {
        match component {
            OffsetComponent::RotationX => self.rotation.x = value,
            OffsetComponent::RotationY => self.rotation.y = value,
            OffsetComponent::RotationZ => self.rotation.z = value,
            OffsetComponent::TranslationX => self.translation.x = value,
            OffsetComponent::TranslationY => self.translation.y = value,
            OffsetComponent::TranslationZ => self.translation.z = value,
        }
    }

    pub fn get(&self, component: OffsetComponent) -> f64 {
        match component {
            OffsetComponent::RotationX => self.rotation.x,
            OffsetComponent::RotationY => self.rotation.y,
            OffsetComponent::RotationZ => self.rotation.z,
            OffsetComponent::TranslationX => self.translation.x,
            OffsetComponent::TranslationY => self.translation.y,
            OffsetComponent::TranslationZ => self.translation.z,
        }
    }
}

/// Per-detector alignment corrections; detectors without an entry are nominal.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentOffsets {
    #[serde(default)]
    pub offsets: BTreeMap<DetectorId, AlignmentOffset>,
}

impl AlignmentOffsets {
    pub fn get(&self, detector: DetectorId) -> AlignmentOffset {
        self.offsets.get(&detector).copied().unwrap_or_default()
    }

    pub fn entry(&mut self, detector: DetectorId) -> &mut AlignmentOffset {
        self.offsets.entry(detector).or_default()
    }
}

fn default_y_plane_edges() -> [Vec3; 2] {
    [Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)]
}

/// Nominal geometry of the whole setup, loaded once at initialization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetupGeometry {
    #[serde(default)]
    pub version: u32,
    pub detectors: BTreeMap<DetectorId, DetectorPlacement>,
    /// Two local points on the Y-measuring fiber plane spanning its X extent.
    #[serde(default = "default_y_plane_edges")]
    pub y_plane_edges: [Vec3; 2],
}

impl SetupGeometry {
    pub fn new(detectors: BTreeMap<DetectorId, DetectorPlacement>) -> Self {
        SetupGeometry { version: 1, detectors, y_plane_edges: default_y_plane_edges() }
    }

    pub fn validate(&self) -> Result<()> {
        for det in DetectorId::ALL {
            let placement = self
                .detectors
                .get(&det)
                .ok_or_else(|| TrackingError::geometry(det.name(), "placement missing"))?;
            if !placement.rotation.is_finite() || !placement.translation.is_finite() {
                return Err(TrackingError::geometry(det.name(), "non-finite rotation or translation"));
            }
            if !(placement.unit_scale.is_finite() && placement.unit_scale != 0.0) {
                return Err(TrackingError::geometry(det.name(), "unit scale must be finite and non-zero"));
            }
            if placement.axis != det.default_axis() {
                return Err(TrackingError::geometry(
                    det.name(),
                    format!("measured axis {:?} does not fit the detector role", placement.axis),
                ));
            }
        }
        let [a, b] = self.y_plane_edges;
        if a.max_abs_diff(&b) == 0.0 {
            return Err(TrackingError::geometry(DetectorId::YFiber.name(), "edge points coincide"));
        }
        Ok(())
    }
}

/// Precomputed local-to-lab transforms with alignment offsets folded in.
///
/// The offset rotation and translation are summed onto the nominal values
/// before the rotation matrix is built, they are not composed as a second
/// transform.
#[derive(Clone, Debug)]
pub struct DetectorFrames {
    frames: BTreeMap<DetectorId, (DetectorPlacement, RigidTransform)>,
    y_plane_edges: [Vec3; 2],
}

impl DetectorFrames {
    pub fn new(geometry: &SetupGeometry, offsets: &AlignmentOffsets) -> Result<Self> {
        geometry.validate()?;
        let frames = geometry
            .detectors
            .iter()
            .map(|(det, placement)| {
                let offset = offsets.get(*det);
                let transform = RigidTransform::new(
                    &(placement.rotation + offset.rotation),
                    &(placement.translation + offset.translation),
                );
                (*det, (placement.clone(), transform))
            })
            .collect();
        Ok(DetectorFrames { frames, y_plane_edges: geometry.y_plane_edges })
    }

    fn frame(&self, detector: DetectorId) -> &(DetectorPlacement, RigidTransform) {
        // validate() guarantees every role is present
        &self.frames[&detector]
    }

    /// Local point of a hit, before any rigid-body transform.
    #[inline]
    pub fn local_point(&self, detector: DetectorId, u: f64, v: Option<f64>) -> Vec3 {
        self.frame(detector).0.local_point(u, v)
    }

    #[inline]
    pub fn to_lab(&self, detector: DetectorId, local: &Vec3) -> Vec3 {
        self.frame(detector).1.apply(local)
    }

    /// Lab position of a hit coordinate on `detector`.
    #[inline]
    pub fn hit_to_lab(&self, detector: DetectorId, u: f64, v: Option<f64>) -> Vec3 {
        self.to_lab(detector, &self.local_point(detector, u, v))
    }

    /// The Y fiber plane's reference edges in the lab frame.
    pub fn y_plane_edges_lab(&self) -> [Vec3; 2] {
        let [a, b] = self.y_plane_edges;
        [self.to_lab(DetectorId::YFiber, &a), self.to_lab(DetectorId::YFiber, &b)]
    }
}
