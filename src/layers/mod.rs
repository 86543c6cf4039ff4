//! The five cooperative layers each node runs: radio, MAC, LLC, link, net.
//!
//! Every layer follows the same shape: an event slot it waits on, zero or
//! one return-code slot it writes for the layer below it, and a small set of
//! async operations the layer above (or user code, at MAC/link/net) calls to
//! move a frame up or down the stack. See `crate::control` for the shared
//! transfer primitive these all build on.

pub mod link;
pub mod llc;
pub mod mac;
pub mod net;
pub mod radio;

pub use link::Link;
pub use llc::Llc;
pub use mac::Mac;
pub use net::Net;
pub use radio::Radio;

/// Mirrors `pdsns_mac_action`: what kind of event is sitting in a MAC event
/// slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAction {
    Send,
    Recv,
}

/// Mirrors `pdsns_link_action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Send,
    Recv,
}
