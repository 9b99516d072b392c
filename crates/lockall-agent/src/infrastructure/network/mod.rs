//! Socket transport: the per-dispatch listener, the one-shot channel it
//! yields, interface discovery, and the companion side of the exchange.

pub mod interface;
pub mod listener;
pub mod peer;
pub mod socket_channel;

pub use interface::candidate_addresses;
pub use listener::{
    EndpointFactory, ListenerConfig, ListenerError, PeerEndpoint, SocketListener,
    SocketListenerFactory,
};
pub use peer::{PeerConnection, PeerError};
pub use socket_channel::SocketChannel;
