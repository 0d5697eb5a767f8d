pub mod calibration;
pub mod config;
pub mod dataset;
pub mod hand;
pub mod projection;
