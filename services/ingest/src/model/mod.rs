//! Core domain types shared by the store, runtime, and HTTP layers.
mod message;
mod tenant;

pub use message::Message;
pub use tenant::Tenant;
