//! Defect detection stage
//!
//! No inference model is wired in yet. [`MockDetector`] derives placeholder
//! counts from the number of processed samples so the report shape is stable
//! for clients while a real detector is developed.

use serde::{Deserialize, Serialize};

/// Per-category defect counts for one upload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectCounts {
    pub potholes: u64,
    pub cracks: u64,
    pub surface_wear: u64,
}

/// Produces defect counts for a processed upload
pub trait DefectDetector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, samples_processed: u64) -> DefectCounts;
}

/// Arithmetic stand-in for a real detector
#[derive(Debug, Clone, Copy, Default)]
pub struct MockDetector;

impl MockDetector {
    const POTHOLE_DIVISOR: u64 = 10;
    const CRACK_DIVISOR: u64 = 15;
    const SURFACE_WEAR_DIVISOR: u64 = 20;
}

impl DefectDetector for MockDetector {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn detect(&self, samples_processed: u64) -> DefectCounts {
        DefectCounts {
            potholes: samples_processed / Self::POTHOLE_DIVISOR,
            cracks: samples_processed / Self::CRACK_DIVISOR,
            surface_wear: samples_processed / Self::SURFACE_WEAR_DIVISOR,
        }
    }
}
