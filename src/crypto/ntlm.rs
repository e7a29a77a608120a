//! Low-level NTLMv2 cryptographic primitives (`[MS-NLMP] 3.3.2`).
//!
//! This module only computes hashes and proofs; the AUTHENTICATE_MESSAGE
//! parsing and the session state machine that drives these calls live in
//! [`crate::server::ntlm`].

use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;
use rc4::{KeyInit, Rc4, StreamCipher};

type HmacMd5 = Hmac<Md5>;

/// `NTOWFv1`: the NT hash, MD4 of the password in UTF-16LE.
pub fn nt_hash(password: &str) -> [u8; 16] {
    let utf16: Vec<u8> = password.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
    let digest = Md4::digest(&utf16);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest);
    out
}

/// `NTOWFv2`/`LMOWFv2`: `HMAC-MD5(NTOWFv1(password), UPPER(username) + domain)`.
///
/// The username is uppercased before hashing; the domain is used as given,
/// matching the wire behavior Windows clients rely on.
pub fn ntlmv2_hash(nt_hash: &[u8; 16], username: &str, domain: &str) -> [u8; 16] {
    let identity: Vec<u8> = username
        .to_uppercase()
        .encode_utf16()
        .chain(domain.encode_utf16())
        .flat_map(|u| u.to_le_bytes())
        .collect();
    let mut mac = HmacMd5::new_from_slice(nt_hash).expect("HMAC accepts keys of any length");
    mac.update(&identity);
    let mut out = [0u8; 16];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// The result of verifying an NTLMv2 response: the proof the client sent
/// and the session base key derived alongside it.
pub struct NtlmV2Proof {
    pub nt_proof_str: [u8; 16],
    pub session_base_key: [u8; 16],
}

/// Computes `NTProofStr = HMAC-MD5(ntlmv2_hash, server_challenge || temp)`
/// and the session base key `HMAC-MD5(ntlmv2_hash, NTProofStr)`, per
/// `[MS-NLMP] 3.3.2`. `temp` is the client's NTLMv2 "blob" (timestamp,
/// client challenge, target info) that follows `NTProofStr` in the
/// NT response the client sent.
pub fn compute_ntlmv2_proof(
    ntlmv2_hash: &[u8; 16],
    server_challenge: &[u8; 8],
    temp: &[u8],
) -> NtlmV2Proof {
    let mut mac = HmacMd5::new_from_slice(ntlmv2_hash).expect("HMAC accepts keys of any length");
    mac.update(server_challenge);
    mac.update(temp);
    let mut nt_proof_str = [0u8; 16];
    nt_proof_str.copy_from_slice(&mac.finalize().into_bytes());

    let mut mac = HmacMd5::new_from_slice(ntlmv2_hash).expect("HMAC accepts keys of any length");
    mac.update(&nt_proof_str);
    let mut session_base_key = [0u8; 16];
    session_base_key.copy_from_slice(&mac.finalize().into_bytes());

    NtlmV2Proof { nt_proof_str, session_base_key }
}

/// Decrypts the RC4-encrypted session key carried in
/// `NEGOTIATE_KEY_EXCH`-capable AUTHENTICATE_MESSAGEs, using the session
/// base key as the RC4 key.
pub fn rc4_decrypt_session_key(session_base_key: &[u8; 16], encrypted_session_key: &[u8]) -> Vec<u8> {
    let mut cipher = Rc4::new_from_slice(session_base_key).expect("16-byte RC4 key");
    let mut buf = encrypted_session_key.to_vec();
    cipher.apply_keystream(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nt_hash_is_stable_for_a_known_password() {
        let h1 = nt_hash("Passw0rd!");
        let h2 = nt_hash("Passw0rd!");
        assert_eq!(h1, h2);
        assert_ne!(h1, nt_hash("different"));
    }

    #[test]
    fn ntlmv2_hash_depends_on_username_case_normalization() {
        let nth = nt_hash("hunter2");
        let a = ntlmv2_hash(&nth, "alice", "CORP");
        let b = ntlmv2_hash(&nth, "ALICE", "CORP");
        assert_eq!(a, b);
        let c = ntlmv2_hash(&nth, "bob", "CORP");
        assert_ne!(a, c);
    }

    #[test]
    fn proof_and_session_key_are_deterministic() {
        let nth = nt_hash("secret");
        let v2 = ntlmv2_hash(&nth, "alice", "CORP");
        let challenge = [1, 2, 3, 4, 5, 6, 7, 8];
        let temp = b"client-blob-bytes";
        let p1 = compute_ntlmv2_proof(&v2, &challenge, temp);
        let p2 = compute_ntlmv2_proof(&v2, &challenge, temp);
        assert_eq!(p1.nt_proof_str, p2.nt_proof_str);
        assert_eq!(p1.session_base_key, p2.session_base_key);
    }

    #[test]
    fn rc4_session_key_exchange_round_trips() {
        let session_base_key = [0x5Au8; 16];
        let real_session_key = [0xAAu8; 16];
        let mut cipher = Rc4::new_from_slice(&session_base_key).expect("16-byte RC4 key");
        let mut encrypted = real_session_key.to_vec();
        cipher.apply_keystream(&mut encrypted);
        let decrypted = rc4_decrypt_session_key(&session_base_key, &encrypted);
        assert_eq!(decrypted, real_session_key);
    }
}
