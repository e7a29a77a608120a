//! SP 800-108 counter-mode key derivation using HMAC-SHA256.
//!
//! `[MS-SMB2] 3.1.4.2` derives the signing, encryption and decryption keys
//! from the session key this way. A single-iteration counter (`i = 1`) is
//! all that's ever needed here since every derived key is at most 32 bytes,
//! well within one HMAC-SHA256 output block.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Derives `output_len` bytes of key material from `key_derivation_key`
/// using the label/context pair specified by the caller, per NIST SP
/// 800-108 section 5.1 (counter before fixed input).
///
/// # Panics
///
/// Panics if `output_len` exceeds 32 (one SHA-256 block) - no caller in this
/// codebase needs more than a 32-byte derived key.
pub fn derive_key(key_derivation_key: &[u8], label: &[u8], context: &[u8], output_len: usize) -> Vec<u8> {
    assert!(output_len <= 32, "derive_key only supports single-block outputs");
    let mut mac = HmacSha256::new_from_slice(key_derivation_key)
        .expect("HMAC accepts keys of any length");
    mac.update(&1u32.to_be_bytes());
    mac.update(label);
    mac.update(&[0u8]);
    mac.update(context);
    mac.update(&((output_len as u32) * 8).to_be_bytes());
    let digest = mac.finalize().into_bytes();
    digest[..output_len].to_vec()
}

pub const LABEL_SMB2_AES_CMAC: &[u8] = b"SMB2AESCMAC\0";
pub const CONTEXT_SMB_SIGN: &[u8] = b"SmbSign\0";
pub const LABEL_SMB2_AES_CCM: &[u8] = b"SMB2AESCCM\0";
pub const CONTEXT_SERVER_IN: &[u8] = b"ServerIn \0";
pub const CONTEXT_SERVER_OUT: &[u8] = b"ServerOut\0";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_key_is_deterministic() {
        let session_key = [0x11u8; 16];
        let a = derive_key(&session_key, LABEL_SMB2_AES_CMAC, CONTEXT_SMB_SIGN, 16);
        let b = derive_key(&session_key, LABEL_SMB2_AES_CMAC, CONTEXT_SMB_SIGN, 16);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn different_labels_derive_different_keys() {
        let session_key = [0x22u8; 16];
        let signing = derive_key(&session_key, LABEL_SMB2_AES_CMAC, CONTEXT_SMB_SIGN, 16);
        let encrypt = derive_key(&session_key, LABEL_SMB2_AES_CCM, CONTEXT_SERVER_IN, 16);
        assert_ne!(signing, encrypt);
    }
}
