/// Gateway wire protocol: frame header, message type discriminators, bounded decode buffer
/// and the prost payload messages exchanged between strategy clients and the gateway.
pub mod gx;
