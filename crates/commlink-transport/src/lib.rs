//! Socket layer for commlink.
//!
//! Provides the two connection kinds the client stands up:
//! - a reliable, ordered TCP stream ([`StreamSocket`])
//! - a connected, best-effort UDP socket ([`DatagramSocket`])
//!
//! Both expose a bounded-timeout readiness poll so receive loops can
//! re-check their stop flag between reads. This is the lowest layer of
//! commlink; framing and lifecycle build on top of it.

pub mod endpoint;
pub mod error;
pub mod poll;
pub mod tcp;
pub mod udp;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use tcp::StreamSocket;
pub use udp::DatagramSocket;
