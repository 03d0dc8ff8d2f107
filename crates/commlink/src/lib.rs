//! Client transport for servers speaking framed TCP with an optional UDP side
//! channel.
//!
//! # Crate Structure
//!
//! - [`transport`]: endpoints, TCP/UDP socket wrappers, readiness polling
//! - [`frame`]: length-prefixed message framing (binary or decimal headers)
//! - [`client`]: channels, control envelopes and the [`client::Transport`]
//!   session (behind the `client` feature, on by default)

/// Re-export transport types.
pub mod transport {
    pub use commlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use commlink_frame::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use commlink_client::*;
}
