//! gambas-gear: import an imaging hierarchy into a BIDS layout, super-resolve
//! T2-weighted scans per subject/session and publish one analysis per session.
//!
//! Flow: [`importer`] (labels via [`labels`]) → [`dataset`] → per session
//! [`processor`] → [`supervisor`].

mod color;
pub mod config;
pub mod dataset;
mod doctor;
mod errors;
pub mod importer;
pub mod labels;
pub mod layout;
pub mod model;
pub mod options;
pub mod platform;
pub mod processor;
pub mod registration;
pub mod session_log;
pub mod supervisor;
mod telemetry;
pub mod util;

pub use color::*;
pub use doctor::run_doctor;
pub use errors::*;
pub use telemetry::{default_filter, stderr_filter, telemetry_init};
