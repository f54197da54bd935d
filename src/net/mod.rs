//! Wire protocol and transport collaborators

pub mod loopback;
pub mod protocol;
pub mod transport;

pub use transport::{Outbound, TransportEvent};
