//! SMB2 TREE_CONNECT / TREE_DISCONNECT (`[MS-SMB2] 2.2.9` - `2.2.12`).

use crate::protocol::header::Header;
use crate::protocol::status::NTStatus;
use crate::protocol::wire::{Cursor, Writer};
use crate::vfs::Filesystem;

use super::{Context, Response};

const REQUEST_STRUCTURE_SIZE: u16 = 9;
const RESPONSE_STRUCTURE_SIZE: u16 = 16;
const DISCONNECT_STRUCTURE_SIZE: u16 = 4;

pub async fn handle<F: Filesystem>(ctx: &Context<F>, header: &Header, body: &[u8]) -> Response {
    let session = match ctx.sessions.get(header.session_id) {
        Some(s) => s,
        None => return Response::error(NTStatus::USER_SESSION_DELETED),
    };
    session.touch();

    let mut c = Cursor::new(body);
    if c.read_u16().unwrap_or(0) != REQUEST_STRUCTURE_SIZE {
        return Response::error(NTStatus::INVALID_PARAMETER);
    }
    let _flags = c.read_u16();
    let path_offset = c.read_u16().unwrap_or(0) as usize;
    let path_length = c.read_u16().unwrap_or(0) as usize;
    let path_bytes = match body.get(path_offset..path_offset + path_length) {
        Some(b) => b,
        None => return Response::error(NTStatus::INVALID_PARAMETER),
    };
    let mut path_cursor = Cursor::new(path_bytes);
    let full_path = match path_cursor.read_utf16le(path_bytes.len()) {
        Ok(p) => p,
        Err(_) => return Response::error(NTStatus::INVALID_PARAMETER),
    };
    let share_name = full_path.rsplit('\\').next().unwrap_or(&full_path);

    let share = match ctx.shares.get(share_name) {
        Some(s) => s.clone(),
        None => return Response::error(NTStatus::BAD_NETWORK_NAME),
    };

    if !share.options.check_user_access(&session.account_name, session.is_guest) {
        return Response::error(NTStatus::ACCESS_DENIED);
    }

    let tree = session.connect_tree(share.clone());

    let mut w = Writer::new();
    w.write_u16(RESPONSE_STRUCTURE_SIZE);
    w.write_u8(share.options.share_type as u8);
    w.write_u8(0); // reserved
    w.write_u32(share.options.caching_mode.share_flags_bits());
    w.write_u32(0); // Capabilities
    w.write_u32(share.options.maximal_access().bits());

    Response::ok(w.into_inner()).with_tree_id(tree.tree_id)
}

pub fn handle_disconnect<F: Filesystem>(ctx: &Context<F>, header: &Header) -> Response {
    let session = match ctx.sessions.get(header.session_id) {
        Some(s) => s,
        None => return Response::error(NTStatus::USER_SESSION_DELETED),
    };
    if session.disconnect_tree(header.tree_id).is_none() {
        return Response::error(NTStatus::NETWORK_NAME_DELETED);
    }
    let mut w = Writer::new();
    w.write_u16(DISCONNECT_STRUCTURE_SIZE);
    w.write_u16(0);
    Response::ok(w.into_inner())
}
