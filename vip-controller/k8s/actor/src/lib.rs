//! The Service Actor (component E): one task per accepted, leader-eligible
//! Service, driving its VIPs through GC -> Assign -> Announce on activation
//! and Withdraw -> Release on deactivation or teardown.
#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod actor;
pub mod election;
pub mod metrics;

pub use actor::{spawn, ActorDeps, ActorHandle};
pub use election::ElectionHandle;
