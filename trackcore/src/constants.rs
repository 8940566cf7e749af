// Purpose: physical constants used by the track evaluator
pub const SPEED_OF_LIGHT: f64 = 29.9792458; // cm/ns
pub const ATOMIC_MASS_UNIT: f64 = 0.9314940954; // GeV/c^2

// Geometry tolerances
pub const PARALLEL_EPSILON: f64 = 1e-12; // below this a determinant is treated as zero
