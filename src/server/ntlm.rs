//! NTLM authentication (`[MS-NLMP]`): message parsing and the server-side
//! authenticator state machine.
//!
//! Kerberos is out of scope, so SESSION_SETUP always runs an NTLMv2
//! exchange wrapped in SPNEGO (see [`crate::server::spnego`]): one request
//! carrying a NEGOTIATE_MESSAGE gets a CHALLENGE_MESSAGE back with
//! `STATUS_MORE_PROCESSING_REQUIRED`, and the following request's
//! AUTHENTICATE_MESSAGE is verified against a [`CredentialStore`] to
//! complete or fail the session.

use std::io;
use std::sync::Arc;

use rand::RngCore;

use crate::crypto::ntlm as ntlm_crypto;
use crate::protocol::wire::{Cursor, Writer};

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";
const MESSAGE_TYPE_NEGOTIATE: u32 = 1;
const MESSAGE_TYPE_CHALLENGE: u32 = 2;
const MESSAGE_TYPE_AUTHENTICATE: u32 = 3;

const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NEGOTIATE_TARGET_TYPE_SERVER: u32 = 0x0002_0000;
const NEGOTIATE_EXTENDED_SESSIONSECURITY: u32 = 0x0008_0000;
const NEGOTIATE_TARGET_INFO: u32 = 0x0080_0000;
const NEGOTIATE_128: u32 = 0x2000_0000;
const NEGOTIATE_KEY_EXCH: u32 = 0x4000_0000;
const NEGOTIATE_56: u32 = 0x8000_0000;

const AV_ID_NB_COMPUTER_NAME: u16 = 0x0001;
const AV_ID_NB_DOMAIN_NAME: u16 = 0x0002;
const AV_ID_EOL: u16 = 0x0000;

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

struct FieldRef {
    len: u16,
    offset: u32,
}

impl FieldRef {
    fn read(c: &mut Cursor<'_>) -> io::Result<FieldRef> {
        let len = c.read_u16()?;
        let _max_len = c.read_u16()?;
        let offset = c.read_u32()?;
        Ok(FieldRef { len, offset })
    }

    fn slice<'a>(&self, message: &'a [u8]) -> io::Result<&'a [u8]> {
        let start = self.offset as usize;
        let end = start + self.len as usize;
        message.get(start..end).ok_or_else(|| invalid("NTLM field points outside message"))
    }
}

fn write_field(w: &mut Writer, len: u16, offset: u32) {
    w.write_u16(len).write_u16(len).write_u32(offset);
}

fn check_header(c: &mut Cursor<'_>, expected_type: u32) -> io::Result<()> {
    let signature = c.read_bytes(8)?;
    if signature != SIGNATURE {
        return Err(invalid("bad NTLMSSP signature"));
    }
    let message_type = c.read_u32()?;
    if message_type != expected_type {
        return Err(invalid("unexpected NTLM message type"));
    }
    Ok(())
}

/// The client's AUTHENTICATE_MESSAGE, with NTLMv2 fields split out.
pub struct AuthenticateMessage {
    pub domain: String,
    pub user: String,
    pub workstation: String,
    pub nt_proof_str: [u8; 16],
    pub nt_response_temp: Vec<u8>,
    pub encrypted_session_key: Vec<u8>,
    pub negotiate_flags: u32,
}

impl AuthenticateMessage {
    /// Parses an AUTHENTICATE_MESSAGE. Only the NTLMv2 response shape
    /// (`NTProofStr` followed by a variable-length "temp" blob) is accepted;
    /// a plain NTLMv1 24-byte response is rejected since this server never
    /// downgrades below NTLMv2.
    pub fn parse(message: &[u8]) -> io::Result<AuthenticateMessage> {
        let mut c = Cursor::new(message);
        check_header(&mut c, MESSAGE_TYPE_AUTHENTICATE)?;

        let lm = FieldRef::read(&mut c)?;
        let nt = FieldRef::read(&mut c)?;
        let domain = FieldRef::read(&mut c)?;
        let user = FieldRef::read(&mut c)?;
        let workstation = FieldRef::read(&mut c)?;
        let session_key = FieldRef::read(&mut c)?;
        let negotiate_flags = c.read_u32()?;
        let _ = lm.slice(message)?;

        let nt_response = nt.slice(message)?;
        if nt_response.len() < 16 {
            return Err(invalid("NT response too short to be NTLMv2"));
        }
        let mut nt_proof_str = [0u8; 16];
        nt_proof_str.copy_from_slice(&nt_response[..16]);

        Ok(AuthenticateMessage {
            domain: utf16le(domain.slice(message)?),
            user: utf16le(user.slice(message)?),
            workstation: utf16le(workstation.slice(message)?),
            nt_proof_str,
            nt_response_temp: nt_response[16..].to_vec(),
            encrypted_session_key: session_key.slice(message)?.to_vec(),
            negotiate_flags,
        })
    }

    fn requests_key_exchange(&self) -> bool {
        self.negotiate_flags & NEGOTIATE_KEY_EXCH != 0
    }
}

fn utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    String::from_utf16_lossy(&units)
}

/// Looks up the NT hash used to verify an NTLMv2 proof, so the
/// authenticator never needs the plaintext password.
pub trait CredentialStore: Send + Sync {
    fn nt_hash(&self, username: &str) -> Option<[u8; 16]>;
}

/// An in-memory credential store for tests and simple deployments.
pub struct StaticCredentialStore {
    users: std::collections::HashMap<String, [u8; 16]>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        StaticCredentialStore { users: std::collections::HashMap::new() }
    }

    pub fn add_user(&mut self, username: impl Into<String>, password: &str) {
        self.users.insert(username.into().to_ascii_uppercase(), ntlm_crypto::nt_hash(password));
    }
}

impl Default for StaticCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for StaticCredentialStore {
    fn nt_hash(&self, username: &str) -> Option<[u8; 16]> {
        self.users.get(&username.to_ascii_uppercase()).copied()
    }
}

/// Outcome of a successful AUTHENTICATE_MESSAGE verification.
pub struct Authenticated {
    pub user: String,
    pub domain: String,
    pub session_key: [u8; 16],
    pub is_guest: bool,
}

/// Per-SESSION_SETUP-exchange NTLM state: holds the server challenge so the
/// AUTHENTICATE_MESSAGE that follows can be verified against it.
pub struct NtlmAuthenticator {
    server_challenge: [u8; 8],
    target_name: String,
    credentials: Arc<dyn CredentialStore>,
    allow_guest: bool,
}

/// Usernames that fall back to the guest identity rather than a lookup,
/// matched case-insensitively (`[MS-SMB2] 3.3.5.5.3`).
fn is_guest_username(user: &str) -> bool {
    user.is_empty() || user.eq_ignore_ascii_case("guest") || user.eq_ignore_ascii_case("anonymous")
}

impl NtlmAuthenticator {
    pub fn new(target_name: impl Into<String>, credentials: Arc<dyn CredentialStore>, allow_guest: bool) -> Self {
        let mut server_challenge = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut server_challenge);
        NtlmAuthenticator { server_challenge, target_name: target_name.into(), credentials, allow_guest }
    }

    /// Builds the CHALLENGE_MESSAGE sent in response to the client's
    /// NEGOTIATE_MESSAGE.
    pub fn build_challenge(&self) -> Vec<u8> {
        let target_name_bytes = utf16le_bytes(&self.target_name);
        let target_info = self.build_target_info();

        let fixed_len = 48u32;
        let target_name_offset = fixed_len;
        let target_info_offset = target_name_offset + target_name_bytes.len() as u32;

        let mut w = Writer::new();
        w.write_bytes(SIGNATURE);
        w.write_u32(MESSAGE_TYPE_CHALLENGE);
        write_field(&mut w, target_name_bytes.len() as u16, target_name_offset);
        w.write_u32(
            NEGOTIATE_UNICODE
                | NEGOTIATE_NTLM
                | NEGOTIATE_ALWAYS_SIGN
                | NEGOTIATE_TARGET_TYPE_SERVER
                | NEGOTIATE_EXTENDED_SESSIONSECURITY
                | NEGOTIATE_TARGET_INFO
                | NEGOTIATE_128
                | NEGOTIATE_KEY_EXCH
                | NEGOTIATE_56,
        );
        w.write_bytes(&self.server_challenge);
        w.write_bytes(&[0u8; 8]); // reserved
        write_field(&mut w, target_info.len() as u16, target_info_offset);
        w.write_bytes(&target_name_bytes);
        w.write_bytes(&target_info);
        w.into_inner()
    }

    fn build_target_info(&self) -> Vec<u8> {
        let mut w = Writer::new();
        let domain_bytes = utf16le_bytes(&self.target_name);
        w.write_u16(AV_ID_NB_DOMAIN_NAME).write_u16(domain_bytes.len() as u16).write_bytes(&domain_bytes);
        let computer_bytes = utf16le_bytes(&self.target_name);
        w.write_u16(AV_ID_NB_COMPUTER_NAME).write_u16(computer_bytes.len() as u16).write_bytes(&computer_bytes);
        w.write_u16(AV_ID_EOL).write_u16(0);
        w.into_inner()
    }

    /// Verifies the client's AUTHENTICATE_MESSAGE against the credential
    /// store, returning the session key on success.
    ///
    /// An empty username, or one that case-insensitively matches `guest` or
    /// `anonymous`, succeeds immediately as a guest when guest access is
    /// allowed, without consulting the credential store. A username the
    /// store doesn't recognize falls back the same way; otherwise it's
    /// `STATUS_LOGON_FAILURE`, which the caller maps from `None`.
    pub fn verify(&self, auth: &AuthenticateMessage) -> Option<Authenticated> {
        if is_guest_username(&auth.user) {
            return self.allow_guest.then(|| self.guest(auth));
        }

        let nt_hash = match self.credentials.nt_hash(&auth.user) {
            Some(hash) => hash,
            None => return self.allow_guest.then(|| self.guest(auth)),
        };
        let v2_hash = ntlm_crypto::ntlmv2_hash(&nt_hash, &auth.user, &auth.domain);
        let proof = ntlm_crypto::compute_ntlmv2_proof(&v2_hash, &self.server_challenge, &auth.nt_response_temp);
        if proof.nt_proof_str != auth.nt_proof_str {
            return None;
        }
        let session_key = if auth.requests_key_exchange() && auth.encrypted_session_key.len() == 16 {
            let decrypted = ntlm_crypto::rc4_decrypt_session_key(&proof.session_base_key, &auth.encrypted_session_key);
            let mut key = [0u8; 16];
            key.copy_from_slice(&decrypted);
            key
        } else {
            proof.session_base_key
        };
        Some(Authenticated { user: auth.user.clone(), domain: auth.domain.clone(), session_key, is_guest: false })
    }

    /// A guest identity carries no session key: guest sessions never sign.
    fn guest(&self, auth: &AuthenticateMessage) -> Authenticated {
        Authenticated { user: auth.user.clone(), domain: auth.domain.clone(), session_key: [0u8; 16], is_guest: true }
    }
}

fn utf16le_bytes(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_authenticate_message(
        domain: &str,
        user: &str,
        nt_response: &[u8],
        session_key: &[u8],
        flags: u32,
    ) -> Vec<u8> {
        let domain_b = utf16le_bytes(domain);
        let user_b = utf16le_bytes(user);
        let workstation_b = utf16le_bytes("WORKSTATION");
        let fixed_len = 64u32;
        let mut offset = fixed_len;
        let lm_off = offset;
        offset += 0;
        let nt_off = offset;
        offset += nt_response.len() as u32;
        let domain_off = offset;
        offset += domain_b.len() as u32;
        let user_off = offset;
        offset += user_b.len() as u32;
        let workstation_off = offset;
        offset += workstation_b.len() as u32;
        let session_key_off = offset;

        let mut w = Writer::new();
        w.write_bytes(SIGNATURE);
        w.write_u32(MESSAGE_TYPE_AUTHENTICATE);
        write_field(&mut w, 0, lm_off);
        write_field(&mut w, nt_response.len() as u16, nt_off);
        write_field(&mut w, domain_b.len() as u16, domain_off);
        write_field(&mut w, user_b.len() as u16, user_off);
        write_field(&mut w, workstation_b.len() as u16, workstation_off);
        write_field(&mut w, session_key.len() as u16, session_key_off);
        w.write_u32(flags);
        w.write_bytes(nt_response);
        w.write_bytes(&domain_b);
        w.write_bytes(&user_b);
        w.write_bytes(&workstation_b);
        w.write_bytes(session_key);
        w.into_inner()
    }

    #[test]
    fn successful_authentication_recovers_matching_session_keys() {
        let mut store = StaticCredentialStore::new();
        store.add_user("alice", "correct horse battery staple");
        let authenticator = NtlmAuthenticator::new("SERVER", Arc::new(store), false);

        let nt_hash = ntlm_crypto::nt_hash("correct horse battery staple");
        let v2_hash = ntlm_crypto::ntlmv2_hash(&nt_hash, "alice", "");
        let temp = b"client-blob-timestamp-and-challenge";
        let proof = ntlm_crypto::compute_ntlmv2_proof(&v2_hash, &authenticator.server_challenge, temp);
        let mut nt_response = proof.nt_proof_str.to_vec();
        nt_response.extend_from_slice(temp);

        let message = build_authenticate_message("", "alice", &nt_response, &[], 0);
        let parsed = AuthenticateMessage::parse(&message).unwrap();
        let authenticated = authenticator.verify(&parsed).expect("authentication should succeed");
        assert_eq!(authenticated.user, "alice");
        assert_eq!(authenticated.session_key, proof.session_base_key);
        assert!(!authenticated.is_guest);
    }

    #[test]
    fn wrong_password_is_rejected() {
        let mut store = StaticCredentialStore::new();
        store.add_user("alice", "correct password");
        let authenticator = NtlmAuthenticator::new("SERVER", Arc::new(store), false);

        let wrong_hash = ntlm_crypto::nt_hash("wrong password");
        let v2_hash = ntlm_crypto::ntlmv2_hash(&wrong_hash, "alice", "");
        let temp = b"some-blob";
        let proof = ntlm_crypto::compute_ntlmv2_proof(&v2_hash, &authenticator.server_challenge, temp);
        let mut nt_response = proof.nt_proof_str.to_vec();
        nt_response.extend_from_slice(temp);

        let message = build_authenticate_message("", "alice", &nt_response, &[], 0);
        let parsed = AuthenticateMessage::parse(&message).unwrap();
        assert!(authenticator.verify(&parsed).is_none());
    }

    #[test]
    fn unknown_user_is_rejected_when_guest_is_disallowed() {
        let authenticator = NtlmAuthenticator::new("SERVER", Arc::new(StaticCredentialStore::new()), false);
        let message = build_authenticate_message("", "ghost", &[0u8; 16], &[], 0);
        let parsed = AuthenticateMessage::parse(&message).unwrap();
        assert!(authenticator.verify(&parsed).is_none());
    }

    #[test]
    fn unknown_user_falls_back_to_guest_when_allowed() {
        let authenticator = NtlmAuthenticator::new("SERVER", Arc::new(StaticCredentialStore::new()), true);
        let message = build_authenticate_message("", "ghost", &[0u8; 16], &[], 0);
        let parsed = AuthenticateMessage::parse(&message).unwrap();
        let authenticated = authenticator.verify(&parsed).expect("should fall back to guest");
        assert!(authenticated.is_guest);
        assert_eq!(authenticated.session_key, [0u8; 16]);
    }

    #[test]
    fn empty_or_guest_named_user_shortcuts_to_guest_without_a_proof_check() {
        let authenticator = NtlmAuthenticator::new("SERVER", Arc::new(StaticCredentialStore::new()), true);
        for name in ["", "guest", "GUEST", "anonymous", "Anonymous"] {
            let message = build_authenticate_message("", name, &[0u8; 16], &[], 0);
            let parsed = AuthenticateMessage::parse(&message).unwrap();
            let authenticated = authenticator.verify(&parsed).expect("guest shortcut should succeed");
            assert!(authenticated.is_guest);
        }
    }

    #[test]
    fn guest_named_user_is_rejected_when_guest_is_disallowed() {
        let authenticator = NtlmAuthenticator::new("SERVER", Arc::new(StaticCredentialStore::new()), false);
        let message = build_authenticate_message("", "guest", &[0u8; 16], &[], 0);
        let parsed = AuthenticateMessage::parse(&message).unwrap();
        assert!(authenticator.verify(&parsed).is_none());
    }

    #[test]
    fn challenge_message_has_well_formed_header() {
        let authenticator = NtlmAuthenticator::new("SERVER", Arc::new(StaticCredentialStore::new()), false);
        let challenge = authenticator.build_challenge();
        assert_eq!(&challenge[..8], SIGNATURE);
        assert_eq!(u32::from_le_bytes(challenge[8..12].try_into().unwrap()), MESSAGE_TYPE_CHALLENGE);
    }
}
