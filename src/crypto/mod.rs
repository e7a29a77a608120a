//! Cryptography: message signing, SP 800-108 key derivation, the SMB 3.1.1
//! pre-authentication integrity hash, and the NTLMv2 primitives
//! authentication is built on.

pub mod kdf;
pub mod ntlm;
pub mod preauth;
pub mod signing;

pub use preauth::PreauthIntegrityHash;
pub use signing::SigningKey;
