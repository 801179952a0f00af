//! # Transit fees
//!
//! Transport fee payment verification and term-based booking eligibility.
//!
//! - **Term calendar**: maps any date onto its academic year, term and grace window
//! - **Fee quotes**: term and full-year prices per route, stop and year
//! - **Payment verification**: idempotent reconciliation of gateway callbacks
//! - **Eligibility**: whether a student's payments cover a booking date
//! - **Booking gate**: seat availability plus eligibility, with atomic seat reservation

pub mod api;
pub mod audit;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod server;
pub mod storage;

pub use config::FeesConfig;
pub use engine::FeesEngine;
pub use error::{FeesError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
