//! The Service Controller (component F): consumes a restartable Service
//! watch and creates/updates/destroys Service Actors through the Instance
//! Registry.
#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod controller;
pub mod election;
pub mod error;
mod mapping;
pub mod metrics;

pub use controller::ServiceController;
pub use election::ElectionConfig;
pub use error::ControllerError;
