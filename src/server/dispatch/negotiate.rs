//! SMB2 NEGOTIATE (`[MS-SMB2] 2.2.3` / `2.2.4`): dialect selection and, for
//! 3.1.1, negotiate contexts and the start of the pre-authentication hash.

use tracing::info;

use super::{Context, Response};
use crate::protocol::consts::{Capabilities, Dialect};
use crate::protocol::negotiate_context::{
    self, EncryptionCapabilities, NegotiateContext, PreauthIntegrityCapabilities, SigningCapabilities,
    CIPHER_AES128_GCM, HASH_ALGORITHM_SHA512, SIGNING_ALGORITHM_AES_CMAC,
};
use crate::protocol::status::NTStatus;
use crate::protocol::wire::{Cursor, FileTime, Writer};
use crate::vfs::Filesystem;

const REQUEST_STRUCTURE_SIZE: u16 = 36;
const RESPONSE_STRUCTURE_SIZE: u16 = 65;

pub const MAX_TRANSACT_SIZE: u32 = 1 << 20;

pub async fn handle<F: Filesystem>(ctx: &Context<F>, body: &[u8]) -> Response {
    let mut c = Cursor::new(body);
    let structure_size = match c.read_u16() {
        Ok(v) => v,
        Err(_) => return Response::error(NTStatus::INVALID_PARAMETER),
    };
    if structure_size != REQUEST_STRUCTURE_SIZE {
        return Response::error(NTStatus::INVALID_PARAMETER);
    }
    let dialect_count = c.read_u16().unwrap_or(0);
    let _security_mode = c.read_u16().unwrap_or(0);
    let _reserved = c.read_u16().unwrap_or(0);
    let _capabilities = c.read_u32().unwrap_or(0);
    let client_guid = c.read_guid();
    let _negotiate_context_offset = c.read_u32().unwrap_or(0);
    let negotiate_context_count = c.read_u16().unwrap_or(0);
    let _reserved2 = c.read_u16().unwrap_or(0);

    let mut offered = Vec::with_capacity(dialect_count as usize);
    for _ in 0..dialect_count {
        if let Ok(raw) = c.read_u16() {
            if let Some(d) = Dialect::from_wire(raw) {
                offered.push(d);
            }
        }
    }
    // Negotiate contexts follow 8-byte aligned; this server doesn't need to
    // inspect the client's preauth salt or cipher list to build its own
    // response, so they're intentionally left unparsed here.
    let _ = negotiate_context_count;

    let selected = match offered
        .into_iter()
        .filter(|d| *d >= ctx.min_dialect && *d <= ctx.max_dialect)
        .max()
    {
        Some(d) => d,
        None => return Response::error(NTStatus::NOT_SUPPORTED),
    };
    *ctx.dialect.lock().unwrap() = Some(selected);
    if let Ok(guid) = client_guid {
        *ctx.client_guid.lock().unwrap() = guid;
    }
    info!(dialect = ?selected, "negotiated dialect");

    if selected == Dialect::Smb311 {
        ctx.fold_preauth(body);
    }

    // SecurityMode: signing is always enabled; bit 1 (SIGNING_REQUIRED) is
    // only set when the server is configured to mandate it.
    let security_mode: u16 = if ctx.signing_required { 0x0003 } else { 0x0001 };

    let mut w = Writer::new();
    w.write_u16(RESPONSE_STRUCTURE_SIZE);
    w.write_u16(security_mode);
    w.write_u16(selected.as_wire());
    w.write_u16(if selected == Dialect::Smb311 { 3 } else { 0 }); // NegotiateContextCount / Reserved
    w.write_guid(&ctx.server_guid);
    // Leasing/multichannel/persistent handles/encryption aren't implemented,
    // so only the two capabilities that don't imply one of those are claimed.
    w.write_u32((Capabilities::LARGE_MTU | Capabilities::DFS).bits());
    w.write_u32(MAX_TRANSACT_SIZE);
    w.write_u32(ctx.max_read_size);
    w.write_u32(ctx.max_write_size);
    w.write_filetime(FileTime::now());
    w.write_filetime(FileTime::now());
    w.write_u16(0); // SecurityBufferOffset: no blob offered at this stage
    w.write_u16(0); // SecurityBufferLength
    w.write_u32(0); // NegotiateContextOffset / Reserved2, fixed up below for 3.1.1
    w.align8();

    if selected == Dialect::Smb311 {
        let contexts = [
            NegotiateContext::PreauthIntegrity(PreauthIntegrityCapabilities {
                hash_algorithms: vec![HASH_ALGORITHM_SHA512],
                salt: random_salt(),
            }),
            // Advertised for negotiate-context-set completeness; this server
            // never sets SMB2_GLOBAL_CAP_ENCRYPTION and never encrypts.
            NegotiateContext::Encryption(EncryptionCapabilities { ciphers: vec![CIPHER_AES128_GCM] }),
            NegotiateContext::Signing(SigningCapabilities {
                signing_algorithms: vec![SIGNING_ALGORITHM_AES_CMAC],
            }),
        ];
        negotiate_context::write_context_list(&mut w, &contexts);
    }

    let body = w.into_inner();
    ctx.fold_preauth(&body);
    Response::ok(body)
}

fn random_salt() -> Vec<u8> {
    use rand::RngCore;
    let mut salt = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
