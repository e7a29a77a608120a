//! SMB2 WRITE (`[MS-SMB2] 2.2.21` / `2.2.22`).

use crate::protocol::consts::AccessMask;
use crate::protocol::header::Header;
use crate::protocol::status::{status_from_io_error, NTStatus};
use crate::protocol::wire::{Cursor, Writer};
use crate::vfs::Filesystem;

use super::close::read_file_id;
use super::{Context, Response};

const REQUEST_STRUCTURE_SIZE: u16 = 49;
const RESPONSE_STRUCTURE_SIZE: u16 = 17;

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
    let data_offset = c.read_u16().unwrap_or(0) as usize;
    let length = c.read_u32().unwrap_or(0) as usize;
    let offset = c.read_u64().unwrap_or(0);
    let file_id = match read_file_id(&mut c) {
        Ok(id) => id,
        Err(_) => return Response::error(NTStatus::INVALID_PARAMETER),
    };
    let _channel = c.read_u32();
    let _remaining_bytes = c.read_u32();
    let _write_channel_info_offset = c.read_u16();
    let _write_channel_info_length = c.read_u16();
    let _flags = c.read_u32();

    let data = match body.get(data_offset..data_offset + length) {
        Some(d) => d,
        None => return Response::error(NTStatus::INVALID_PARAMETER),
    };

    let open = match tree.opens.with_open(file_id, |o| (o.handle.clone(), o.granted_access, o.is_directory)) {
        Some(t) => t,
        None => return Response::error(NTStatus::FILE_CLOSED),
    };
    let (handle, granted_access, is_directory) = open;
    if is_directory {
        return Response::error(NTStatus::FILE_IS_A_DIRECTORY);
    }
    if !granted_access.contains(AccessMask::FILE_WRITE_DATA) {
        return Response::error(NTStatus::ACCESS_DENIED);
    }

    let written = match ctx.filesystem.write(&handle, offset, data).await {
        Ok(n) => n,
        Err(e) => return Response::error(status_from_io_error(&e)),
    };

    let mut w = Writer::new();
    w.write_u16(RESPONSE_STRUCTURE_SIZE);
    w.write_u16(0); // reserved
    w.write_u32(written);
    w.write_u32(0); // Remaining
    w.write_u16(0); // WriteChannelInfoOffset
    w.write_u16(0); // WriteChannelInfoLength
    Response::ok(w.into_inner())
}
