//! Tenant runtime: per-tenant consumer pools and the controller that owns
//! their lifecycle.
mod consumer;
mod controller;

pub use controller::{RuntimeError, TenantRuntime};
