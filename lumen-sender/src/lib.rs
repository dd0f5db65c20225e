//! # lumen-sender - LAN screen-stream sender
//!
//! Finds receivers with SSDP-style discovery, lets the user pick one,
//! and streams frames from a capture source until the receiver goes
//! away or Ctrl-C.

pub mod config;
pub mod source;
