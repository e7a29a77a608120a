//! SMB2 SET_INFO (`[MS-SMB2] 2.2.39` / `2.2.40`): rename, delete-on-close,
//! basic attributes/timestamps, and end-of-file/allocation size.

use crate::protocol::consts::{FileAttributes, FileInfoClass, InfoType};
use crate::protocol::header::Header;
use crate::protocol::status::{status_from_io_error, NTStatus};
use crate::protocol::wire::{Cursor, FileTime, Writer};
use crate::server::share::resolve_path;
use crate::vfs::Filesystem;

use super::close::read_file_id;
use super::{Context, Response};

const REQUEST_STRUCTURE_SIZE: u16 = 33;
const RESPONSE_STRUCTURE_SIZE: u16 = 2;

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
    let info_type_raw = c.read_u8().unwrap_or(0);
    let info_class_raw = c.read_u8().unwrap_or(0);
    let buffer_length = c.read_u32().unwrap_or(0) as usize;
    let buffer_offset = c.read_u16().unwrap_or(0) as usize;
    let _reserved = c.read_u16();
    let _additional_information = c.read_u32();
    let file_id = match read_file_id(&mut c) {
        Ok(id) => id,
        Err(_) => return Response::error(NTStatus::INVALID_PARAMETER),
    };

    let info_type: InfoType = match num_traits::FromPrimitive::from_u8(info_type_raw) {
        Some(t) => t,
        None => return Response::error(NTStatus::INVALID_PARAMETER),
    };
    if info_type != InfoType::File {
        return Response::error(NTStatus::NOT_SUPPORTED);
    }
    let info_class: FileInfoClass = match num_traits::FromPrimitive::from_u8(info_class_raw) {
        Some(c) => c,
        None => return Response::error(NTStatus::NOT_SUPPORTED),
    };
    let buffer = match body.get(buffer_offset..buffer_offset + buffer_length) {
        Some(b) => b,
        None => return Response::error(NTStatus::INVALID_PARAMETER),
    };

    let path = match tree.opens.with_open(file_id, |o| o.path.clone()) {
        Some(p) => p,
        None => return Response::error(NTStatus::FILE_CLOSED),
    };

    let status = match info_class {
        FileInfoClass::RenameInformation => handle_rename(ctx, &tree.share, &tree.opens, file_id, &path, buffer).await,
        FileInfoClass::DispositionInformation => handle_disposition(&tree.opens, file_id, buffer),
        FileInfoClass::BasicInformation => handle_basic(ctx, &path, buffer).await,
        FileInfoClass::EndOfFileInformation | FileInfoClass::AllocationInformation => {
            handle_resize(ctx, &tree.opens, file_id, buffer).await
        }
        _ => NTStatus::NOT_SUPPORTED,
    };

    if status != NTStatus::SUCCESS {
        return Response::error(status);
    }
    let mut w = Writer::new();
    w.write_u16(RESPONSE_STRUCTURE_SIZE);
    Response::ok(w.into_inner())
}

async fn handle_rename<F: Filesystem>(
    ctx: &Context<F>,
    share: &crate::server::share::Share,
    opens: &crate::server::open::OpenTable<F::Handle>,
    file_id: crate::server::open::FileId,
    from: &str,
    buffer: &[u8],
) -> NTStatus {
    let mut c = Cursor::new(buffer);
    let replace_if_exists = c.read_u8().unwrap_or(0) != 0;
    let _reserved = c.read_bytes(7);
    let _root_directory = c.read_u64();
    let name_length = c.read_u32().unwrap_or(0) as usize;
    let name_bytes = match c.read_bytes(name_length) {
        Ok(b) => b,
        Err(_) => return NTStatus::INVALID_PARAMETER,
    };
    let mut nc = Cursor::new(&name_bytes);
    let new_name = match nc.read_utf16le(name_bytes.len()) {
        Ok(s) => s,
        Err(_) => return NTStatus::INVALID_PARAMETER,
    };
    let to = match resolve_path(share, &new_name) {
        Ok(p) => p,
        Err(_) => return NTStatus::OBJECT_NAME_NOT_FOUND,
    };
    match ctx.filesystem.rename(from, &to, replace_if_exists).await {
        Ok(()) => {
            opens.set_path(file_id, to);
            NTStatus::SUCCESS
        }
        Err(e) => status_from_io_error(&e),
    }
}

fn handle_disposition<H>(opens: &crate::server::open::OpenTable<H>, file_id: crate::server::open::FileId, buffer: &[u8]) -> NTStatus {
    let delete_pending = buffer.first().copied().unwrap_or(0) != 0;
    match opens.with_open(file_id, |_| ()) {
        Some(()) => {}
        None => return NTStatus::FILE_CLOSED,
    }
    // `with_open` only hands out a shared reference; flip the flag through a
    // second pass since `OpenFile::delete_on_close` isn't behind its own lock.
    opens.set_delete_on_close(file_id, delete_pending);
    NTStatus::SUCCESS
}

async fn handle_basic<F: Filesystem>(ctx: &Context<F>, path: &str, buffer: &[u8]) -> NTStatus {
    let mut c = Cursor::new(buffer);
    let creation = c.read_filetime().unwrap_or(FileTime::ZERO);
    let last_access = c.read_filetime().unwrap_or(FileTime::ZERO);
    let last_write = c.read_filetime().unwrap_or(FileTime::ZERO);
    let _change = c.read_filetime();
    let attributes = c.read_u32().unwrap_or(0);

    if attributes != 0 {
        if let Err(e) = ctx.filesystem.set_attributes(path, FileAttributes::from_bits_truncate(attributes)).await {
            return status_from_io_error(&e);
        }
    }
    let creation = if creation.is_zero() { None } else { Some(creation) };
    let last_access = if last_access.is_zero() { None } else { Some(last_access) };
    let last_write = if last_write.is_zero() { None } else { Some(last_write) };
    if creation.is_some() || last_access.is_some() || last_write.is_some() {
        if let Err(e) = ctx.filesystem.set_times(path, creation, last_access, last_write).await {
            return status_from_io_error(&e);
        }
    }
    NTStatus::SUCCESS
}

async fn handle_resize<F: Filesystem>(
    ctx: &Context<F>,
    opens: &crate::server::open::OpenTable<F::Handle>,
    file_id: crate::server::open::FileId,
    buffer: &[u8],
) -> NTStatus {
    let mut c = Cursor::new(buffer);
    let len = match c.read_u64() {
        Ok(l) => l,
        Err(_) => return NTStatus::INVALID_PARAMETER,
    };
    let handle = match opens.with_open(file_id, |o| o.handle.clone()) {
        Some(h) => h,
        None => return NTStatus::FILE_CLOSED,
    };
    match ctx.filesystem.set_len(&handle, len).await {
        Ok(()) => NTStatus::SUCCESS,
        Err(e) => status_from_io_error(&e),
    }
}
