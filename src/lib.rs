//! A selective repeat sliding window protocol ("protocol 6"), providing reliable in-order
//!  delivery of packets over a link that loses, corrupts, duplicates and reorders frames.
//!
//! [protocol::Protocol6] is the engine. It is driven by a single event loop and talks to its
//!  surroundings through traits: [physical_layer::PhysicalLayer] for frames,
//!  [network_layer::NetworkLayer] for packets, [timer::ProtocolTimers] for timers and
//!  [event_source::EventSource] for its input. [session::Session] wires everything up on tokio
//!  channels or a UDP socket.

pub mod config;
pub mod event;
pub mod event_source;
pub mod frame;
pub mod network_layer;
pub mod physical_layer;
pub mod protocol;
pub mod sequence_number;
pub mod session;
pub mod stats;
pub mod timer;
pub mod window;
pub mod test_util;
