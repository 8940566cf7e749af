// geometry module
pub mod geometry {
    pub mod vector;
    pub mod transform;
    pub mod setup;
}

// data module
pub mod data {
    pub mod detector;
    pub mod event;
    pub mod candidate;
    pub mod track;
}

// calibration module
pub mod calibration {
    pub mod response;
    pub mod charge;
}

// algorithm module
pub mod algorithm {
    pub mod bounded;
    pub mod clustering;
    pub mod timing;
    pub mod incoming;
    pub mod outgoing;
    pub mod matching;
    pub mod minimizer;
    pub mod alignment;
}

pub mod config;
pub mod constants;
pub mod error;
pub mod reconstruction;
