//! # lumen-receiver - LAN screen-stream receiver
//!
//! Advertises itself with SSDP-style discovery, listens for a sender on
//! the stream port, and hands every complete frame to a render sink.
//! One sender is served at a time; the receiver keeps listening across
//! sender disconnects until Ctrl-C.

pub mod config;
pub mod sink;
