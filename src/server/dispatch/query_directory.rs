//! SMB2 QUERY_DIRECTORY (`[MS-SMB2] 2.2.33` / `2.2.34`).
//!
//! Enumeration state lives on the open itself ([`crate::server::open::DirEnumState`])
//! so a client can page through a large directory across several requests;
//! `SMB2_RESTART_SCANS` or a first-ever request resets the cursor to the start.

use std::io::Write as _;

use crate::protocol::consts::FileInfoClass;
use crate::protocol::header::Header;
use crate::protocol::status::{status_from_io_error, NTStatus};
use crate::protocol::wire::{utf16le_bytes, Cursor, Writer};
use crate::vfs::{DirEntry, Filesystem};
use crate::write_counter::WriteCounter;

use super::close::read_file_id;
use super::{Context, Response};

const REQUEST_STRUCTURE_SIZE: u16 = 33;
const RESPONSE_STRUCTURE_SIZE: u16 = 9;
const RESPONSE_BUFFER_OFFSET: u16 = 0x48; // header (64) + the 8 fixed response bytes

const SMB2_RESTART_SCANS: u8 = 0x01;
const SMB2_RETURN_SINGLE_ENTRY: u8 = 0x02;
const SMB2_REOPEN: u8 = 0x10;

const PAGE_SIZE: usize = 256;

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
    let info_class_raw = c.read_u8().unwrap_or(0);
    let flags = c.read_u8().unwrap_or(0);
    let _file_index = c.read_u32();
    let file_id = match read_file_id(&mut c) {
        Ok(id) => id,
        Err(_) => return Response::error(NTStatus::INVALID_PARAMETER),
    };
    let pattern_offset = c.read_u16().unwrap_or(0) as usize;
    let pattern_length = c.read_u16().unwrap_or(0) as usize;
    let output_buffer_length = c.read_u32().unwrap_or(0) as usize;

    let info_class = match num_traits::FromPrimitive::from_u8(info_class_raw) {
        Some(class) => class,
        None => return Response::error(NTStatus::INVALID_PARAMETER),
    };

    let pattern = if pattern_length == 0 {
        "*".to_string()
    } else {
        match body.get(pattern_offset..pattern_offset + pattern_length) {
            Some(bytes) => {
                let mut pc = Cursor::new(bytes);
                pc.read_utf16le(bytes.len()).unwrap_or_else(|_| "*".to_string())
            }
            None => return Response::error(NTStatus::INVALID_PARAMETER),
        }
    };

    let path = match tree.opens.with_open(file_id, |o| (o.path.clone(), o.is_directory)) {
        Some((p, true)) => p,
        Some((_, false)) => return Response::error(NTStatus::NOT_A_DIRECTORY),
        None => return Response::error(NTStatus::FILE_CLOSED),
    };

    let (started, prior_pattern, already_done) = tree
        .opens
        .with_open(file_id, |o| {
            let st = o.dir_enum.lock().unwrap();
            (st.started, st.pattern.clone(), st.end_of_directory)
        })
        .unwrap_or((false, String::new(), true));

    let pattern_changed = started && prior_pattern != pattern;
    let restart = flags & (SMB2_RESTART_SCANS | SMB2_REOPEN) != 0 || pattern_changed;

    if !restart && started && already_done {
        return Response::error(NTStatus::NO_MORE_FILES);
    }

    if restart || !started {
        let snapshot = match read_entire_directory(ctx, &path).await {
            Ok(entries) => entries,
            Err(status) => return Response::error(status),
        };
        let matching: Vec<DirEntry> = snapshot.into_iter().filter(|e| matches_pattern(&e.name, &pattern)).collect();
        tree.opens.with_open(file_id, |o| {
            let mut st = o.dir_enum.lock().unwrap();
            st.started = true;
            st.cookie = 0;
            st.end_of_directory = false;
            st.pattern = pattern.clone();
            st.entries = matching;
        });
    }

    let (start_cookie, snapshot_len) = tree
        .opens
        .with_open(file_id, |o| {
            let st = o.dir_enum.lock().unwrap();
            (st.cookie, st.entries.len())
        })
        .unwrap_or((0, 0));

    if start_cookie as usize >= snapshot_len {
        tree.opens.with_open(file_id, |o| o.dir_enum.lock().unwrap().end_of_directory = true);
        return Response::error(NTStatus::NO_MORE_FILES);
    }

    let single_entry = flags & SMB2_RETURN_SINGLE_ENTRY != 0;
    let page: Vec<DirEntry> = tree
        .opens
        .with_open(file_id, |o| {
            let st = o.dir_enum.lock().unwrap();
            let start = start_cookie as usize;
            let end = if single_entry { (start + 1).min(st.entries.len()) } else { st.entries.len() };
            st.entries[start..end].to_vec()
        })
        .unwrap_or_default();

    let mut buf = WriteCounter::new(Vec::new());
    let mut emitted = 0usize;
    for (i, entry) in page.iter().enumerate() {
        let is_last = start_cookie as usize + i + 1 == snapshot_len;
        let encoded = encode_entry(info_class, entry, is_last);
        if emitted > 0 && buf.bytes_written() + encoded.len() > output_buffer_length {
            break;
        }
        if buf.write_all(&encoded).is_err() {
            break;
        }
        emitted += 1;
    }
    if emitted == 0 {
        return Response::error(NTStatus::BUFFER_OVERFLOW);
    }

    tree.opens.with_open(file_id, |o| {
        let mut st = o.dir_enum.lock().unwrap();
        st.cookie = start_cookie + emitted as u64;
        st.end_of_directory = st.cookie as usize >= snapshot_len;
    });

    let out = buf.into_inner();
    let mut w = Writer::new();
    w.write_u16(RESPONSE_STRUCTURE_SIZE);
    w.write_u16(RESPONSE_BUFFER_OFFSET);
    w.write_u32(out.len() as u32);
    w.write_bytes(&out);
    Response::ok(w.into_inner())
}

/// Reads every entry in `path` from the backend, paging with its own cookie
/// until it reports `end_of_directory`, so the dispatcher can build one
/// pattern-filtered snapshot instead of re-querying per SMB2 request.
async fn read_entire_directory<F: Filesystem>(ctx: &Context<F>, path: &str) -> Result<Vec<DirEntry>, NTStatus> {
    let mut all = Vec::new();
    let mut cookie = 0u64;
    loop {
        let result = ctx.filesystem.read_dir(path, cookie, PAGE_SIZE).await.map_err(|e| status_from_io_error(&e))?;
        let got = result.entries.len();
        all.extend(result.entries);
        if result.end_of_directory || got == 0 {
            break;
        }
        cookie += got as u64;
    }
    Ok(all)
}

/// Encodes one directory entry in the requested information class, padding
/// `NextEntryOffset` to an 8-byte boundary except for the last entry in the
/// buffer, which carries `NextEntryOffset = 0`.
fn encode_entry(class: FileInfoClass, entry: &DirEntry, is_last: bool) -> Vec<u8> {
    let name_bytes = utf16le_bytes(&entry.name);
    let m = &entry.metadata;

    let mut fixed = Writer::new();
    fixed.write_u32(0); // NextEntryOffset, patched below
    fixed.write_u32(0); // FileIndex
    fixed.write_filetime(m.creation_time);
    fixed.write_filetime(m.last_access_time);
    fixed.write_filetime(m.last_write_time);
    fixed.write_filetime(m.change_time);
    fixed.write_u64(m.size); // EndOfFile
    fixed.write_u64(m.size); // AllocationSize
    let mut attrs = m.attributes;
    if m.is_directory() {
        attrs.insert(crate::protocol::consts::FileAttributes::DIRECTORY);
    }
    fixed.write_u32(attrs.bits());
    fixed.write_u32(name_bytes.len() as u32);

    match class {
        FileInfoClass::BothDirectoryInformation | FileInfoClass::IdBothDirectoryInformation => {
            fixed.write_u32(0); // EaSize
            fixed.write_u8(0); // ShortNameLength
            fixed.write_u8(0); // Reserved1
            fixed.write_bytes(&[0u8; 24]); // ShortName
            if class == FileInfoClass::IdBothDirectoryInformation {
                fixed.write_u16(0); // Reserved2
                fixed.write_u64(0); // FileId, left unset: callers address by path, not this value
            }
        }
        FileInfoClass::IdFullDirectoryInformation => {
            fixed.write_u32(0); // EaSize
            fixed.write_u32(0); // Reserved
            fixed.write_u64(0); // FileId
        }
        FileInfoClass::FullDirectoryInformation => {
            fixed.write_u32(0); // EaSize
        }
        _ => {}
    }

    let mut out = fixed.into_inner();
    out.extend_from_slice(&name_bytes);
    let unpadded_len = out.len();
    if !is_last {
        let padded_len = crate::protocol::wire::align_up(unpadded_len, 8);
        out.resize(padded_len, 0);
        let next_offset = padded_len as u32;
        out[0..4].copy_from_slice(&next_offset.to_le_bytes());
    }
    out
}

fn matches_pattern(name: &str, pattern: &str) -> bool {
    if pattern == "*" || pattern.is_empty() {
        return true;
    }
    if !pattern.contains('*') {
        return name.eq_ignore_ascii_case(pattern);
    }
    let lower_name = name.to_ascii_lowercase();
    let mut pos = 0usize;
    for (i, part) in pattern.to_ascii_lowercase().split('*').enumerate() {
        if part.is_empty() {
            continue;
        }
        match lower_name[pos..].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
        if i == 0 && !pattern.starts_with('*') && !lower_name.starts_with(part) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_everything() {
        assert!(matches_pattern("anything.txt", "*"));
        assert!(matches_pattern("anything.txt", ""));
    }

    #[test]
    fn exact_pattern_is_case_insensitive() {
        assert!(matches_pattern("Notes.TXT", "notes.txt"));
        assert!(!matches_pattern("notes.txt", "other.txt"));
    }

    #[test]
    fn glob_suffix_pattern_matches() {
        assert!(matches_pattern("report.docx", "*.docx"));
        assert!(!matches_pattern("report.txt", "*.docx"));
    }
}
