//! SMB2 SESSION_SETUP (`[MS-SMB2] 2.2.5` / `2.2.6`): the two-legged NTLM
//! exchange wrapped in SPNEGO.
//!
//! Leg one: session ID zero, carries a `NegTokenInit`/NEGOTIATE_MESSAGE.
//! The server allocates a session ID, stashes an [`NtlmAuthenticator`] under
//! it, and answers `STATUS_MORE_PROCESSING_REQUIRED` with a CHALLENGE
//! wrapped in a `NegTokenResp`.
//!
//! Leg two: the allocated session ID, carries the AUTHENTICATE_MESSAGE.
//! The server verifies it, derives the signing key for the negotiated
//! dialect, and finalizes the session.

use tracing::warn;

use super::{Context, Response};
use crate::crypto::SigningKey;
use crate::protocol::header::Header;
use crate::protocol::status::NTStatus;
use crate::protocol::wire::{Cursor, Writer};
use crate::server::ntlm::{AuthenticateMessage, NtlmAuthenticator};
use crate::server::spnego;
use crate::vfs::Filesystem;

const REQUEST_STRUCTURE_SIZE: u16 = 25;
const RESPONSE_STRUCTURE_SIZE: u16 = 9;

pub async fn handle<F: Filesystem>(ctx: &Context<F>, header: &Header, body: &[u8]) -> Response {
    let mut c = Cursor::new(body);
    if c.read_u16().unwrap_or(0) != REQUEST_STRUCTURE_SIZE {
        return Response::error(NTStatus::INVALID_PARAMETER);
    }
    let _flags = c.read_u8();
    let _security_mode = c.read_u8();
    let _capabilities = c.read_u32();
    let _channel = c.read_u32();
    let security_buffer_offset = c.read_u16().unwrap_or(0) as usize;
    let security_buffer_length = c.read_u16().unwrap_or(0) as usize;
    let previous_session_id = c.read_u64().unwrap_or(0);

    let token = match body.get(security_buffer_offset..security_buffer_offset + security_buffer_length) {
        Some(t) => t,
        None => return Response::error(NTStatus::INVALID_PARAMETER),
    };

    let dialect = match ctx.dialect() {
        Some(d) => d,
        None => return Response::error(NTStatus::INVALID_PARAMETER),
    };
    if dialect == crate::protocol::consts::Dialect::Smb311 {
        ctx.fold_preauth(body);
    }

    if header.session_id == 0 {
        handle_first_leg(ctx, token)
    } else {
        handle_second_leg(ctx, header, token, dialect, previous_session_id)
    }
}

fn handle_first_leg<F: Filesystem>(ctx: &Context<F>, token: &[u8]) -> Response {
    let ntlm_negotiate = match spnego::unwrap_token(token) {
        Ok(t) => t,
        Err(err) => {
            warn!(%err, "failed to unwrap SPNEGO NegTokenInit");
            return Response::error(NTStatus::INVALID_PARAMETER);
        }
    };
    // The NEGOTIATE_MESSAGE content doesn't change anything this server
    // offers; it only marks that the client wants to start NTLM.
    let _ = ntlm_negotiate;

    let authenticator = NtlmAuthenticator::new(ctx.server_name.clone(), ctx.credentials.clone(), ctx.allow_guest);
    let challenge = authenticator.build_challenge();
    let session_id = ctx.begin_pending_auth(authenticator);
    let response_token = spnego::wrap_neg_token_resp(false, Some(&challenge));

    Response::pending(build_body(&response_token), session_id)
}

fn handle_second_leg<F: Filesystem>(
    ctx: &Context<F>,
    header: &Header,
    token: &[u8],
    dialect: crate::protocol::consts::Dialect,
    previous_session_id: u64,
) -> Response {
    let authenticator = match ctx.take_pending_auth(header.session_id) {
        Some(a) => a,
        None => return Response::error(NTStatus::USER_SESSION_DELETED),
    };

    let ntlm_authenticate = match spnego::unwrap_token(token) {
        Ok(t) => t,
        Err(_) => return Response::error(NTStatus::INVALID_PARAMETER),
    };
    let parsed = match AuthenticateMessage::parse(&ntlm_authenticate) {
        Ok(p) => p,
        Err(_) => return Response::error(NTStatus::INVALID_PARAMETER),
    };

    let authenticated = match authenticator.verify(&parsed) {
        Some(a) => a,
        None => return Response::error(NTStatus::LOGON_FAILURE),
    };

    let client_guid = *ctx.client_guid.lock().unwrap();

    // A reconnect: the client is re-establishing a session it previously
    // held on this (or another) connection from the same client GUID. There
    // are no durable handles to carry over, so reconnecting just means
    // tearing down the stale session's trees/opens before the fresh one
    // takes over its id.
    if previous_session_id != 0 {
        match ctx.sessions.get(previous_session_id) {
            Some(old) if old.client_guid == client_guid => {
                ctx.sessions.remove(previous_session_id);
            }
            Some(_) => return Response::error(NTStatus::USER_SESSION_DELETED),
            None => {}
        }
    }

    // Guest sessions carry no session key, so they're never signed: the
    // dispatcher's signature check (inbound and outbound) is a no-op
    // whenever `Session::signing_key` is `None`.
    let signing_key = if authenticated.is_guest { None } else { Some(SigningKey::derive(&authenticated.session_key, dialect)) };
    // Keeps the session ID allocated in the first leg: the client already
    // addresses this exchange by that ID, and every later request will too.
    ctx.sessions.create_session(
        header.session_id,
        authenticated.user,
        authenticated.domain,
        authenticated.is_guest,
        dialect,
        client_guid,
        signing_key,
    );

    let accept_token = spnego::wrap_neg_token_resp(true, None);
    Response::ok(build_body(&accept_token, authenticated.is_guest))
}

const SESSION_FLAG_IS_GUEST: u16 = 0x0001;

fn build_body(security_buffer: &[u8], is_guest: bool) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_u16(RESPONSE_STRUCTURE_SIZE);
    w.write_u16(if is_guest { SESSION_FLAG_IS_GUEST } else { 0 });
    let fixed_len = 8u16;
    w.write_u16(fixed_len);
    w.write_u16(security_buffer.len() as u16);
    w.write_bytes(security_buffer);
    w.into_inner()
}
