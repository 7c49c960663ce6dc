//! HTTP forwarding to the authority node.

mod client;
mod types;

pub use client::Forwarder;
pub use types::{ReadRequest, UpstreamTarget};
