//! Wire protocol definitions
//!
//! This module defines the binary push protocol spoken by nfcapd collectors
//! over the local metric socket.

pub mod wire;
