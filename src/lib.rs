//! smbd-rs - A Rust SMB2/SMB3 server and client filesystem endpoint
//!
//! This library provides a dual-role implementation of the SMB2/SMB3 protocol
//! family as defined in MS-SMB2: a **server** that exports a pluggable
//! abstract filesystem over the wire, and a **client** that exposes a remote
//! SMB share through that same abstract filesystem interface.
//!
//! ## Supported Features
//!
//! - Dialect negotiation across 2.0.2, 2.1, 3.0, 3.0.2 and 3.1.1, including
//!   SMB 3.1.1 negotiate contexts and pre-authentication integrity hashing
//! - NTLM authentication wrapped in SPNEGO, with NTLMv2 proof verification
//!   and SP800-108 signing-key derivation
//! - Message signing via HMAC-SHA256 (dialects < 3.0) and AES-128-CMAC
//!   (dialects >= 3.0)
//! - Session, tree-connection and open-file lifecycle management with
//!   Windows-compatible share-access checks and delete-on-close semantics
//! - A bounded client connection pool with waiters, idle reaping and
//!   exponential-backoff retries over an injectable connection factory
//! - A client filesystem facade with path validation and an optional
//!   TTL-bounded metadata cache
//!
//! ## Main Components
//!
//! - `vfs`: The abstract filesystem trait that a server backend must
//!   implement, analogous to an NFS server's `NFSFileSystem` trait - it
//!   abstracts the underlying storage from SMB2 protocol details.
//!
//! - `protocol`: Wire codec, NT status and SMB2 constants, and the SMB2
//!   header/framing layer shared by both the connection server and the
//!   dispatcher.
//!
//! - `crypto`: HMAC-SHA256 and AES-CMAC signing, the SP800-108 counter-mode
//!   KDF, and the SMB 3.1.1 pre-authentication integrity hash.
//!
//! - `server`: The connection server, session/tree/open-file registries,
//!   share registry, NTLM authenticator and per-command dispatcher.
//!
//! - `client`: The connection pool, filesystem facade, retry engine and
//!   metadata cache used to mount a remote share.
//!
//! ## Standards Compliance
//!
//! This implementation follows:
//! - MS-SMB2: Server Message Block (SMB) Protocol Versions 2 and 3
//! - MS-NLMP: NT LAN Manager (NTLM) Authentication Protocol
//! - NIST SP 800-108: Recommendation for Key Derivation Using Pseudorandom Functions
//! - RFC 4493: The AES-CMAC Algorithm
//!
//! Kerberos, DFS referrals, RPC over named pipes, server-side copy, SMB
//! multichannel, quota info, per-file ACLs and compression negotiate
//! contexts are out of scope; see `SPEC_FULL.md` for the full rationale.

pub mod client;
pub mod crypto;
pub mod protocol;
pub mod server;
pub mod vfs;
mod write_counter;
