//! SMB2 QUERY_INFO (`[MS-SMB2] 2.2.37` / `2.2.38`), file information classes only.
//!
//! Filesystem- and security-information queries (`InfoType::FileSystem`,
//! `InfoType::Security`, `InfoType::Quota`) are outside the filesystem
//! backend's surface and return `STATUS_NOT_SUPPORTED`.

use crate::protocol::consts::{FileInfoClass, InfoType};
use crate::protocol::header::Header;
use crate::protocol::status::{status_from_io_error, NTStatus};
use crate::protocol::wire::{Cursor, Writer};
use crate::vfs::{Filesystem, Metadata};

use super::close::read_file_id;
use super::{Context, Response};

const REQUEST_STRUCTURE_SIZE: u16 = 41;
const RESPONSE_STRUCTURE_SIZE: u16 = 9;
const RESPONSE_BUFFER_OFFSET: u16 = 0x48;

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
    let output_buffer_length = c.read_u32().unwrap_or(0) as usize;
    let _input_buffer_offset = c.read_u16();
    let _reserved = c.read_u16();
    let _input_buffer_length = c.read_u32();
    let _additional_information = c.read_u32();
    let _flags = c.read_u32();
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

    let path = match tree.opens.with_open(file_id, |o| o.path.clone()) {
        Some(p) => p,
        None => return Response::error(NTStatus::FILE_CLOSED),
    };
    let metadata = match ctx.filesystem.stat(&path).await {
        Ok(m) => m,
        Err(e) => return Response::error(status_from_io_error(&e)),
    };

    let encoded = match encode_info(info_class, &metadata) {
        Some(bytes) => bytes,
        None => return Response::error(NTStatus::NOT_SUPPORTED),
    };
    if encoded.len() > output_buffer_length {
        return Response::error(NTStatus::BUFFER_OVERFLOW);
    }

    let mut w = Writer::new();
    w.write_u16(RESPONSE_STRUCTURE_SIZE);
    w.write_u16(RESPONSE_BUFFER_OFFSET);
    w.write_u32(encoded.len() as u32);
    w.write_bytes(&encoded);
    Response::ok(w.into_inner())
}

fn encode_info(class: FileInfoClass, m: &Metadata) -> Option<Vec<u8>> {
    let mut w = Writer::new();
    match class {
        FileInfoClass::BasicInformation => {
            w.write_filetime(m.creation_time);
            w.write_filetime(m.last_access_time);
            w.write_filetime(m.last_write_time);
            w.write_filetime(m.change_time);
            let mut attrs = m.attributes;
            if m.is_directory() {
                attrs.insert(crate::protocol::consts::FileAttributes::DIRECTORY);
            }
            w.write_u32(attrs.bits());
            w.write_u32(0); // reserved
        }
        FileInfoClass::StandardInformation => {
            w.write_u64(m.size); // AllocationSize
            w.write_u64(m.size); // EndOfFile
            w.write_u32(1); // NumberOfLinks
            w.write_u8(0); // DeletePending
            w.write_u8(m.is_directory() as u8);
            w.write_u16(0); // reserved
        }
        _ => return None,
    }
    Some(w.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::consts::FileAttributes;
    use crate::protocol::wire::FileTime;
    use crate::vfs::FileType;

    fn sample_metadata() -> Metadata {
        Metadata {
            file_type: FileType::File,
            size: 4096,
            attributes: FileAttributes::NORMAL,
            creation_time: FileTime(10),
            last_access_time: FileTime(20),
            last_write_time: FileTime(30),
            change_time: FileTime(40),
        }
    }

    #[test]
    fn basic_information_is_40_bytes() {
        let encoded = encode_info(FileInfoClass::BasicInformation, &sample_metadata()).unwrap();
        assert_eq!(encoded.len(), 40);
    }

    #[test]
    fn standard_information_reports_size_and_directory_flag() {
        let mut m = sample_metadata();
        m.file_type = FileType::Directory;
        let encoded = encode_info(FileInfoClass::StandardInformation, &m).unwrap();
        assert_eq!(encoded.len(), 24);
        assert_eq!(encoded[22], 1); // Directory byte
    }

    #[test]
    fn unsupported_class_returns_none() {
        assert!(encode_info(FileInfoClass::RenameInformation, &sample_metadata()).is_none());
    }
}
