//! Client transport: a framed TCP stream plus an optional UDP side channel.
//!
//! A [`Transport`] connects one [`FramedStream`] to the server and
//! dispatches inbound messages as JSON [`ControlEnvelope`]s. When the server
//! sends `create_udp_channel` with a port, the transport opens a
//! [`DatagramChannel`] to the same host on that port. Each channel owns one
//! receive thread; sends run on the caller's thread.
//!
//! ```no_run
//! use commlink_client::{Endpoint, Handlers, Transport, TransportConfig};
//!
//! let handlers = Handlers::new()
//!     .on_data(|msg| println!("tcp: {}", String::from_utf8_lossy(&msg)))
//!     .on_datagram(|pkt| println!("udp: {}", String::from_utf8_lossy(&pkt)));
//! let transport = Transport::new(Endpoint::new("127.0.0.1", 2021), TransportConfig::default(), handlers);
//! transport.connect()?;
//! transport.request_udp_channel()?;
//! transport.send_data("hello")?;
//! transport.close();
//! # Ok::<(), commlink_client::ClientError>(())
//! ```

pub mod config;
pub mod control;
pub mod datagram;
pub mod error;
pub mod receive_loop;
pub mod state;
pub mod stream;
pub mod transport;

pub use commlink_frame::{FrameConfig, HeaderFormat};
pub use commlink_transport::Endpoint;
pub use config::{
    DatagramConfig, TransportConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_SEND_SIZE,
    DEFAULT_RECV_BUFFER_SIZE,
};
pub use control::{
    classify, ControlEnvelope, Inbound, ACTION_BROADCAST, ACTION_CREATE_UDP_CHANNEL, ACTION_DATA,
    ACTION_LIST_CLIENTS, ACTION_UPDATE_STATUS, ACTION_UPDATE_USER,
};
pub use datagram::{DatagramChannel, BOOTSTRAP_PACKET};
pub use error::{ClientError, Result};
pub use receive_loop::{ReceiveLoop, UnitSource};
pub use state::{ChannelState, StateCell};
pub use stream::FramedStream;
pub use transport::{Handlers, PayloadHandler, Transport, TransportState};
