//! The SMB2 wire protocol: framing, status/constant enumerations, the SMB2
//! header, and SMB 3.1.1 negotiate contexts.
//!
//! This module defines the data structures and methods needed to marshal and
//! unmarshal SMB2 messages, independent of any particular command. Per-command
//! payloads live under [`crate::server::dispatch`]; this module only covers
//! what every message shares: the NetBIOS session frame, the 64-byte SMB2
//! header, and the wire primitives (little-endian integers, UTF-16LE strings,
//! Windows FILETIME, GUIDs, alignment) that every command payload is built
//! from.

pub mod consts;
pub mod header;
pub mod negotiate_context;
pub mod status;
pub mod wire;

pub use status::NTStatus;
pub use wire::{Cursor, Writer};
