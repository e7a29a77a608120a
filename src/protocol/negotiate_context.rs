//! SMB 3.1.1 negotiate contexts (`[MS-SMB2] 2.2.3.1`).
//!
//! Only dialect 3.1.1 carries these; earlier dialects stop at the fixed
//! NEGOTIATE request/response body. Per the pre-authentication hash
//! requirement, every context in a NEGOTIATE exchange - including one for a
//! capability this server does not act on - must still be well-formed, since
//! its raw bytes feed the rolling hash in [`crate::crypto::preauth`].

use std::io;

use crate::protocol::wire::{align_up, Cursor, Writer};

const CONTEXT_HEADER_LEN: usize = 8;

pub const PREAUTH_INTEGRITY_CAPABILITIES: u16 = 0x0001;
pub const ENCRYPTION_CAPABILITIES: u16 = 0x0002;
pub const SIGNING_CAPABILITIES: u16 = 0x0008;

/// SHA-512, the only hash algorithm this implementation offers or accepts.
pub const HASH_ALGORITHM_SHA512: u16 = 0x0001;

/// Advertised but never selected: this server never encrypts messages, see
/// the discussion in `SPEC_FULL.md`. The context is still sent so the
/// client's 3.1.1 negotiate context set and preauth hash stay well-formed.
pub const CIPHER_AES128_GCM: u16 = 0x0002;

pub const SIGNING_ALGORITHM_HMAC_SHA256: u16 = 0x0000;
pub const SIGNING_ALGORITHM_AES_CMAC: u16 = 0x0001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreauthIntegrityCapabilities {
    pub hash_algorithms: Vec<u16>,
    pub salt: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionCapabilities {
    pub ciphers: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningCapabilities {
    pub signing_algorithms: Vec<u16>,
}

/// A negotiate context, either one this implementation understands or an
/// unrecognized one preserved verbatim for hashing/forwarding purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiateContext {
    PreauthIntegrity(PreauthIntegrityCapabilities),
    Encryption(EncryptionCapabilities),
    Signing(SigningCapabilities),
    Unknown { context_type: u16, data: Vec<u8> },
}

impl NegotiateContext {
    fn context_type(&self) -> u16 {
        match self {
            NegotiateContext::PreauthIntegrity(_) => PREAUTH_INTEGRITY_CAPABILITIES,
            NegotiateContext::Encryption(_) => ENCRYPTION_CAPABILITIES,
            NegotiateContext::Signing(_) => SIGNING_CAPABILITIES,
            NegotiateContext::Unknown { context_type, .. } => *context_type,
        }
    }

    fn write_data(&self, w: &mut Writer) {
        match self {
            NegotiateContext::PreauthIntegrity(p) => {
                w.write_u16(p.hash_algorithms.len() as u16);
                w.write_u16(p.salt.len() as u16);
                for alg in &p.hash_algorithms {
                    w.write_u16(*alg);
                }
                w.write_bytes(&p.salt);
            }
            NegotiateContext::Encryption(e) => {
                w.write_u16(e.ciphers.len() as u16);
                for c in &e.ciphers {
                    w.write_u16(*c);
                }
            }
            NegotiateContext::Signing(s) => {
                w.write_u16(s.signing_algorithms.len() as u16);
                for alg in &s.signing_algorithms {
                    w.write_u16(*alg);
                }
            }
            NegotiateContext::Unknown { data, .. } => {
                w.write_bytes(data);
            }
        }
    }

    /// Writes this context, including its header and alignment padding to
    /// the next 8-byte boundary, except after the final context in a list.
    pub fn write(&self, w: &mut Writer) {
        let mut body = Writer::new();
        self.write_data(&mut body);
        let data = body.into_inner();

        w.write_u16(self.context_type());
        w.write_u16(data.len() as u16);
        w.write_u32(0); // reserved
        w.write_bytes(&data);
        w.align8();
    }

    fn parse(context_type: u16, data: &[u8]) -> io::Result<NegotiateContext> {
        let mut c = Cursor::new(data);
        Ok(match context_type {
            PREAUTH_INTEGRITY_CAPABILITIES => {
                let count = c.read_u16()? as usize;
                let salt_len = c.read_u16()? as usize;
                let hash_algorithms = (0..count).map(|_| c.read_u16()).collect::<io::Result<_>>()?;
                let salt = c.read_bytes(salt_len)?;
                NegotiateContext::PreauthIntegrity(PreauthIntegrityCapabilities {
                    hash_algorithms,
                    salt,
                })
            }
            ENCRYPTION_CAPABILITIES => {
                let count = c.read_u16()? as usize;
                let ciphers = (0..count).map(|_| c.read_u16()).collect::<io::Result<_>>()?;
                NegotiateContext::Encryption(EncryptionCapabilities { ciphers })
            }
            SIGNING_CAPABILITIES => {
                let count = c.read_u16()? as usize;
                let signing_algorithms = (0..count).map(|_| c.read_u16()).collect::<io::Result<_>>()?;
                NegotiateContext::Signing(SigningCapabilities { signing_algorithms })
            }
            other => NegotiateContext::Unknown { context_type: other, data: data.to_vec() },
        })
    }
}

/// Reads `count` negotiate contexts from `c`, each 8-byte aligned relative
/// to `c`'s position when this is called.
pub fn read_context_list(c: &mut Cursor<'_>, count: u16) -> io::Result<Vec<NegotiateContext>> {
    let mut contexts = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let origin = c.position();
        let context_type = c.read_u16()?;
        let data_len = c.read_u16()? as usize;
        let _reserved = c.read_u32()?;
        let data = c.read_bytes(data_len)?;
        contexts.push(NegotiateContext::parse(context_type, &data)?);
        c.seek(align_up(origin + CONTEXT_HEADER_LEN + data_len, 8))?;
    }
    Ok(contexts)
}

/// Writes a list of negotiate contexts back to back, each padded to an
/// 8-byte boundary as required between contexts (trailing padding after the
/// last one is the caller's responsibility, per the surrounding message
/// layout).
pub fn write_context_list(w: &mut Writer, contexts: &[NegotiateContext]) {
    for ctx in contexts {
        ctx.write(w);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preauth_context_round_trips() {
        let ctx = NegotiateContext::PreauthIntegrity(PreauthIntegrityCapabilities {
            hash_algorithms: vec![HASH_ALGORITHM_SHA512],
            salt: vec![1, 2, 3, 4],
        });
        let mut w = Writer::new();
        ctx.write(&mut w);
        let bytes = w.into_inner();
        let mut c = Cursor::new(&bytes);
        let parsed = read_context_list(&mut c, 1).unwrap();
        assert_eq!(parsed, vec![ctx]);
    }

    #[test]
    fn mixed_context_list_round_trips_with_alignment() {
        let contexts = vec![
            NegotiateContext::PreauthIntegrity(PreauthIntegrityCapabilities {
                hash_algorithms: vec![HASH_ALGORITHM_SHA512],
                salt: vec![0u8; 32],
            }),
            NegotiateContext::Encryption(EncryptionCapabilities { ciphers: vec![CIPHER_AES128_GCM] }),
            NegotiateContext::Signing(SigningCapabilities {
                signing_algorithms: vec![SIGNING_ALGORITHM_HMAC_SHA256, SIGNING_ALGORITHM_AES_CMAC],
            }),
        ];
        let mut w = Writer::new();
        write_context_list(&mut w, &contexts);
        let bytes = w.into_inner();
        let mut c = Cursor::new(&bytes);
        let parsed = read_context_list(&mut c, 3).unwrap();
        assert_eq!(parsed, contexts);
    }
}
