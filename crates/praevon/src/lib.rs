pub mod clock;
pub mod config;
pub mod error;
pub mod marketplace;
pub mod pdf;
pub mod storage;
pub mod telemetry;
