//! SMB2 CLOSE (`[MS-SMB2] 2.2.15` / `2.2.16`): releases an open, deleting
//! its backing file first if it was opened with `DELETE_ON_CLOSE`.

use crate::protocol::header::Header;
use crate::protocol::status::{status_from_io_error, NTStatus};
use crate::protocol::wire::{Cursor, FileTime, Writer};
use crate::server::open::FileId;
use crate::vfs::Filesystem;

use super::{Context, Response};

const REQUEST_STRUCTURE_SIZE: u16 = 24;
const RESPONSE_STRUCTURE_SIZE: u16 = 60;
const POSTQUERY_ATTRIB: u16 = 0x0001;

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
    let flags = c.read_u16().unwrap_or(0);
    let _reserved = c.read_u32();
    let file_id = match read_file_id(&mut c) {
        Ok(id) => id,
        Err(_) => return Response::error(NTStatus::INVALID_PARAMETER),
    };

    let open = match tree.opens.remove(file_id) {
        Some(o) => o,
        None => return Response::error(NTStatus::FILE_CLOSED),
    };

    let final_metadata = if flags & POSTQUERY_ATTRIB != 0 {
        ctx.filesystem.stat(&open.path).await.ok()
    } else {
        None
    };

    if let Err(e) = ctx.filesystem.close(open.handle).await {
        return Response::error(status_from_io_error(&e));
    }
    if open.delete_on_close {
        if let Err(e) = ctx.filesystem.remove(&open.path).await {
            return Response::error(status_from_io_error(&e));
        }
    }

    let mut w = Writer::new();
    w.write_u16(RESPONSE_STRUCTURE_SIZE);
    w.write_u16(flags & POSTQUERY_ATTRIB);
    w.write_u32(0);
    match final_metadata {
        Some(m) => {
            w.write_filetime(m.creation_time);
            w.write_filetime(m.last_access_time);
            w.write_filetime(m.last_write_time);
            w.write_filetime(m.change_time);
            w.write_u64(m.size);
            w.write_u64(m.size);
            w.write_u32(m.attributes.bits());
        }
        None => {
            for _ in 0..4 {
                w.write_filetime(FileTime::ZERO);
            }
            w.write_u64(0);
            w.write_u64(0);
            w.write_u32(0);
        }
    }
    Response::ok(w.into_inner())
}

pub(crate) fn read_file_id(c: &mut Cursor<'_>) -> std::io::Result<FileId> {
    let persistent = c.read_u64()?;
    let volatile = c.read_u64()?;
    Ok(FileId { persistent, volatile })
}
