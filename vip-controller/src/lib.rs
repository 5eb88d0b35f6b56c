#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use vip_controller_core as core;
pub use vip_controller_k8s_actor as actor;
pub use vip_controller_k8s_api as api;
pub use vip_controller_k8s_controller as controller;
