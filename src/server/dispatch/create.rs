//! SMB2 CREATE (`[MS-SMB2] 2.2.13` / `2.2.14`): opens or creates a file or
//! directory and returns a [`FileId`] the rest of the session can address
//! it by.
//!
//! Create contexts (durable handles, leases, query-on-disk requests) are
//! read past but not acted on; every open this server grants is a plain,
//! non-durable open.

use crate::protocol::consts::{AccessMask, CreateAction, CreateDisposition, CreateOptions, FileAttributes, ShareAccess};
use crate::protocol::header::Header;
use crate::protocol::status::{status_from_io_error, NTStatus};
use crate::protocol::wire::{Cursor, Writer};
use crate::server::open::{share_access_conflicts, OpenFile};
use crate::server::share::resolve_path;
use crate::vfs::{Filesystem, Metadata};

use super::{Context, Response};

const REQUEST_STRUCTURE_SIZE: u16 = 57;
const RESPONSE_STRUCTURE_SIZE: u16 = 89;

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
    let _security_flags = c.read_u8();
    let _oplock_level = c.read_u8();
    let _impersonation_level = c.read_u32();
    let _smb_create_flags = c.read_u64();
    let _reserved = c.read_u64();
    let desired_access = AccessMask::from_bits_truncate(c.read_u32().unwrap_or(0)).normalize();
    let _file_attributes = c.read_u32();
    let share_access = ShareAccess::from_bits_truncate(c.read_u32().unwrap_or(0));
    let disposition = match num_traits::FromPrimitive::from_u32(c.read_u32().unwrap_or(u32::MAX)) {
        Some(d) => d,
        None => return Response::error(NTStatus::INVALID_PARAMETER),
    };
    let create_options = CreateOptions::from_bits_truncate(c.read_u32().unwrap_or(0));
    let name_offset = c.read_u16().unwrap_or(0) as usize;
    let name_length = c.read_u16().unwrap_or(0) as usize;
    let _create_contexts_offset = c.read_u32();
    let _create_contexts_length = c.read_u32();

    let name = if name_length == 0 {
        String::new()
    } else {
        match body.get(name_offset..name_offset + name_length) {
            Some(bytes) => {
                let mut nc = Cursor::new(bytes);
                match nc.read_utf16le(bytes.len()) {
                    Ok(s) => s,
                    Err(_) => return Response::error(NTStatus::INVALID_PARAMETER),
                }
            }
            None => return Response::error(NTStatus::INVALID_PARAMETER),
        }
    };

    let path = match resolve_path(&tree.share, &name) {
        Ok(p) => p,
        Err(_) => return Response::error(NTStatus::OBJECT_NAME_NOT_FOUND),
    };

    let wants_directory = create_options.contains(CreateOptions::DIRECTORY_FILE);
    let existing = ctx.filesystem.stat(&path).await.ok();

    let (handle, metadata, action) = match resolve_disposition(
        ctx,
        &path,
        disposition,
        wants_directory,
        existing,
        tree.share.options.read_only,
    )
    .await
    {
        Ok(triple) => triple,
        Err(status) => return Response::error(status),
    };

    if metadata.is_directory() != wants_directory && create_options.contains(CreateOptions::NON_DIRECTORY_FILE) {
        return Response::error(NTStatus::FILE_IS_A_DIRECTORY);
    }
    if wants_directory && !metadata.is_directory() {
        return Response::error(NTStatus::NOT_A_DIRECTORY);
    }

    for (existing_access, existing_share) in tree.opens.opens_for_path(&path) {
        if share_access_conflicts(existing_access, existing_share, desired_access, share_access) {
            return Response::error(NTStatus::SHARING_VIOLATION);
        }
    }

    let file_id = tree.opens.allocate_id();
    let open = OpenFile::new(file_id, path, handle, desired_access, share_access, create_options, &metadata);
    tree.opens.insert(open);

    Response::ok(build_response(action, &metadata, file_id))
}

async fn resolve_disposition<F: Filesystem>(
    ctx: &Context<F>,
    path: &str,
    disposition: CreateDisposition,
    wants_directory: bool,
    existing: Option<Metadata>,
    read_only: bool,
) -> Result<(F::Handle, Metadata, CreateAction), NTStatus> {
    if read_only
        && matches!(
            disposition,
            CreateDisposition::Create
                | CreateDisposition::OpenIf
                | CreateDisposition::Overwrite
                | CreateDisposition::OverwriteIf
                | CreateDisposition::Supersede
        )
    {
        return Err(NTStatus::ACCESS_DENIED);
    }

    let fs = &ctx.filesystem;
    match (disposition, existing) {
        (CreateDisposition::Open, Some(_)) => {
            let (h, m) = fs.open(path).await.map_err(|e| status_from_io_error(&e))?;
            Ok((h, m, CreateAction::Opened))
        }
        (CreateDisposition::Open, None) => Err(NTStatus::OBJECT_NAME_NOT_FOUND),
        (CreateDisposition::Create, Some(_)) => Err(NTStatus::OBJECT_NAME_COLLISION),
        (CreateDisposition::Create, None) => create_new(fs, path, wants_directory).await,
        (CreateDisposition::OpenIf, Some(_)) => {
            let (h, m) = fs.open(path).await.map_err(|e| status_from_io_error(&e))?;
            Ok((h, m, CreateAction::Opened))
        }
        (CreateDisposition::OpenIf, None) => create_new(fs, path, wants_directory).await,
        (CreateDisposition::Overwrite, Some(_)) => overwrite_existing(fs, path).await,
        (CreateDisposition::Overwrite, None) => Err(NTStatus::OBJECT_NAME_NOT_FOUND),
        (CreateDisposition::OverwriteIf, Some(_)) => overwrite_existing(fs, path).await,
        (CreateDisposition::OverwriteIf, None) => create_new(fs, path, wants_directory).await,
        (CreateDisposition::Supersede, Some(_)) => {
            fs.remove(path).await.map_err(|e| status_from_io_error(&e))?;
            let (h, m, _) = create_new(fs, path, wants_directory).await?;
            Ok((h, m, CreateAction::Superseded))
        }
        (CreateDisposition::Supersede, None) => create_new(fs, path, wants_directory).await,
    }
}

async fn create_new<F: Filesystem>(
    fs: &F,
    path: &str,
    wants_directory: bool,
) -> Result<(F::Handle, Metadata, CreateAction), NTStatus> {
    if wants_directory {
        let metadata = fs.create_dir(path).await.map_err(|e| status_from_io_error(&e))?;
        let (h, m) = fs.open(path).await.map_err(|e| status_from_io_error(&e))?;
        let _ = metadata;
        Ok((h, m, CreateAction::Created))
    } else {
        let (h, m) = fs.create_file(path).await.map_err(|e| status_from_io_error(&e))?;
        Ok((h, m, CreateAction::Created))
    }
}

async fn overwrite_existing<F: Filesystem>(
    fs: &F,
    path: &str,
) -> Result<(F::Handle, Metadata, CreateAction), NTStatus> {
    let (h, _) = fs.open(path).await.map_err(|e| status_from_io_error(&e))?;
    fs.set_len(&h, 0).await.map_err(|e| status_from_io_error(&e))?;
    let m = fs.stat(path).await.map_err(|e| status_from_io_error(&e))?;
    Ok((h, m, CreateAction::Overwritten))
}

fn build_response(action: CreateAction, metadata: &Metadata, file_id: crate::server::open::FileId) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_u16(RESPONSE_STRUCTURE_SIZE);
    w.write_u8(0); // OplockLevel: none
    w.write_u8(0); // Flags
    w.write_u32(num_traits::ToPrimitive::to_u32(&action).unwrap_or(0));
    w.write_filetime(metadata.creation_time);
    w.write_filetime(metadata.last_access_time);
    w.write_filetime(metadata.last_write_time);
    w.write_filetime(metadata.change_time);
    w.write_u64(metadata.size); // AllocationSize, rounded up is a backend concern
    w.write_u64(metadata.size); // EndOfFile
    let mut attrs = metadata.attributes;
    if metadata.is_directory() {
        attrs.insert(FileAttributes::DIRECTORY);
    }
    w.write_u32(attrs.bits());
    w.write_u32(0); // reserved
    w.write_u64(file_id.persistent);
    w.write_u64(file_id.volatile);
    w.write_u32(0); // CreateContextsOffset
    w.write_u32(0); // CreateContextsLength
    w.into_inner()
}
