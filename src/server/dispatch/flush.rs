//! SMB2 FLUSH (`[MS-SMB2] 2.2.17` / `2.2.18`).
//!
//! The abstract filesystem has no separate flush operation - every `write`
//! is expected to be durable once it returns - so this only validates that
//! the open still exists and echoes success.

use crate::protocol::header::Header;
use crate::protocol::status::NTStatus;
use crate::protocol::wire::{Cursor, Writer};
use crate::vfs::Filesystem;

use super::close::read_file_id;
use super::{Context, Response};

const REQUEST_STRUCTURE_SIZE: u16 = 24;
const RESPONSE_STRUCTURE_SIZE: u16 = 4;

pub async fn handle<F: Filesystem>(ctx: &Context<F>, header: &Header, body: &[u8]) -> Response {
    let session = match ctx.sessions.get(header.session_id) {
        Some(s) => s,
        None => return Response::error(NTStatus::USER_SESSION_DELETED),
    };
    session.touch();
    let tree = match session.tree(header.tree_id) {
        Some(t) => t,
        None => return Response::error(NTStatus::NETWORK_NAME_DELETED),
    };

    let mut c = Cursor::new(body);
    if c.read_u16().unwrap_or(0) != REQUEST_STRUCTURE_SIZE {
        return Response::error(NTStatus::INVALID_PARAMETER);
    }
    let _reserved1 = c.read_u16();
    let _reserved2 = c.read_u32();
    let file_id = match read_file_id(&mut c) {
        Ok(id) => id,
        Err(_) => return Response::error(NTStatus::INVALID_PARAMETER),
    };
    if !tree.opens.contains(file_id) {
        return Response::error(NTStatus::FILE_CLOSED);
    }

    let mut w = Writer::new();
    w.write_u16(RESPONSE_STRUCTURE_SIZE);
    w.write_u16(0);
    Response::ok(w.into_inner())
}
