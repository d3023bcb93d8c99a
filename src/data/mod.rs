//! Acquisition, statistics and export.

pub mod acquisition;
pub mod stats;
pub mod storage;

pub use acquisition::AcquisitionResult;
pub use stats::FrameStats;
