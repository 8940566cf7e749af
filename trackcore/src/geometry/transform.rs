use serde::{Deserialize, Serialize};

use crate::geometry::vector::Vec3;

/// A proper 3x3 rotation matrix, row-major.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    m: [[f64; 3]; 3],
}

impl Rotation {
    pub fn identity() -> Self {
        Rotation { m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]] }
    }

    pub fn about_x(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Rotation { m: [[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]] }
    }

    pub fn about_y(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Rotation { m: [[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]] }
    }

    pub fn about_z(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Rotation { m: [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]] }
    }

    /// Builds the intrinsic Y-X'-Z'' rotation used for every detector placement.
    ///
    /// The detector is first turned around the fixed Y axis by `angles.y`, then
    /// around its own (once rotated) X axis by `angles.x` and finally around its
    /// twice rotated Z axis by `angles.z`. Rotating about a body axis is the same
    /// as right-multiplying by the elementary rotation, hence `Ry * Rx * Rz`.
    ///
    /// # Arguments
    ///
    /// * `angles` - Euler angles in radians, one per axis.
    ///
    pub fn from_euler_yxz(angles: &Vec3) -> Self {
        Rotation::about_y(angles.y)
            .compose(&Rotation::about_x(angles.x))
            .compose(&Rotation::about_z(angles.z))
    }

    /// Matrix product `self * other`.
    pub fn compose(&self, other: &Rotation) -> Rotation {
        let mut m = [[0.0; 3]; 3];
        for (i, row) in m.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.m[i][k] * other.m[k][j]).sum();
            }
        }
        Rotation { m }
    }

    #[inline]
    pub fn apply(&self, v: &Vec3) -> Vec3 {
        let m = &self.m;
        Vec3::new(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        )
    }

    /// The inverse of a rotation is its transpose.
    pub fn inverse(&self) -> Rotation {
        let m = &self.m;
        Rotation {
            m: [
                [m[0][0], m[1][0], m[2][0]],
                [m[0][1], m[1][1], m[2][1]],
                [m[0][2], m[1][2], m[2][2]],
            ],
        }
    }

    /// Image of the local axis `i` (0 = X, 1 = Y, 2 = Z) in the lab frame.
    pub fn axis(&self, i: usize) -> Vec3 {
        Vec3::new(self.m[0][i], self.m[1][i], self.m[2][i])
    }

    pub fn matrix(&self) -> [[f64; 3]; 3] {
        self.m
    }
}

/// Rotation followed by translation, mapping a detector's local frame into the lab.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RigidTransform {
    pub rotation: Rotation,
    pub translation: Vec3,
}

impl RigidTransform {
    pub fn new(angles: &Vec3, translation: &Vec3) -> Self {
        RigidTransform { rotation: Rotation::from_euler_yxz(angles), translation: *translation }
    }

    #[inline]
    pub fn apply(&self, local: &Vec3) -> Vec3 {
        self.rotation.apply(local) + self.translation
    }

    #[inline]
    pub fn inverse_apply(&self, lab: &Vec3) -> Vec3 {
        self.rotation.inverse().apply(&(*lab - self.translation))
    }
}

/// Maps a local point into the lab frame: `R_yxz(rotation) * local + translation`.
pub fn transform(local: &Vec3, rotation: &Vec3, translation: &Vec3) -> Vec3 {
    RigidTransform::new(rotation, translation).apply(local)
}

/// Undoes [`transform`] for the same rotation and translation.
pub fn inverse_transform(lab: &Vec3, rotation: &Vec3, translation: &Vec3) -> Vec3 {
    RigidTransform::new(rotation, translation).inverse_apply(lab)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    #[test]
    fn test_rotation_about_y_quarter_turn() {
        let r = Rotation::about_y(std::f64::consts::FRAC_PI_2);
        let v = r.apply(&Vec3::new(1.0, 0.0, 0.0));
        assert!(v.max_abs_diff(&Vec3::new(0.0, 0.0, -1.0)) < 1e-12);
    }

    #[test]
    fn test_euler_matches_nalgebra_composition() {
        let angles = Vec3::new(0.13, -0.42, 0.27);
        let ours = Rotation::from_euler_yxz(&angles);
        let theirs = Rotation3::from_axis_angle(&Vector3::y_axis(), angles.y)
            * Rotation3::from_axis_angle(&Vector3::x_axis(), angles.x)
            * Rotation3::from_axis_angle(&Vector3::z_axis(), angles.z);

        let p = Vec3::new(3.0, -1.5, 12.0);
        let a = ours.apply(&p);
        let b = theirs * Vector3::new(p.x, p.y, p.z);
        assert!((a.x - b.x).abs() < 1e-12);
        assert!((a.y - b.y).abs() < 1e-12);
        assert!((a.z - b.z).abs() < 1e-12);
    }

    #[test]
    fn test_second_rotation_is_about_local_x_axis() {
        // after turning around Y, the local X axis is Ry * ex; turning around that
        // axis must leave it invariant
        let angles = Vec3::new(0.3, 0.7, 0.0);
        let r = Rotation::from_euler_yxz(&angles);
        let local_x = Rotation::about_y(angles.y).apply(&Vec3::new(1.0, 0.0, 0.0));
        assert!(r.axis(0).max_abs_diff(&local_x) < 1e-12);
    }

    #[test]
    fn test_transform_round_trip() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let rot = Vec3::new(rng.gen_range(-3.2..3.2), rng.gen_range(-3.2..3.2), rng.gen_range(-3.2..3.2));
            let trans = Vec3::new(rng.gen_range(-500.0..500.0), rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..900.0));
            let p = Vec3::new(rng.gen_range(-20.0..20.0), rng.gen_range(-20.0..20.0), rng.gen_range(-1.0..1.0));

            let lab = transform(&p, &rot, &trans);
            let back = inverse_transform(&lab, &rot, &trans);
            assert!(back.max_abs_diff(&p) < 1e-9, "{} != {}", back, p);
        }
    }

    #[test]
    fn test_zero_rotation_is_pure_translation() {
        let lab = transform(&Vec3::new(1.0, 2.0, 0.0), &Vec3::ZERO, &Vec3::new(0.0, 0.0, 50.0));
        assert_eq!(lab, Vec3::new(1.0, 2.0, 50.0));
    }
}
