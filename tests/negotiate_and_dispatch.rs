//! Integration tests driving [`smbd_rs::server::dispatch::handle_message`]
//! directly against a [`MemFs`]-backed [`Context`], the same way the
//! NFS dispatcher's own integration tests call `handle_nfs` without a real
//! socket.

mod support;

use std::sync::Arc;
use uuid::Uuid;

use smbd_rs::protocol::consts::{Command, Dialect};
use smbd_rs::protocol::header::Header;
use smbd_rs::protocol::status::NTStatus;
use smbd_rs::protocol::wire::{Cursor, Writer};
use smbd_rs::server::config::ServerConfig;
use smbd_rs::server::dispatch::{handle_message, Context};
use smbd_rs::server::ntlm::StaticCredentialStore;
use smbd_rs::server::share::{ShareOptions, ShareRegistry};
use smbd_rs::vfs::Filesystem;

use support::MemFs;

fn build_context() -> Context<MemFs> {
    let mut shares = ShareRegistry::new();
    shares.add(ShareOptions::disk("SHARE"), "");
    let config = ServerConfig::default();
    Context::new(shares, Arc::new(MemFs::new()), Arc::new(StaticCredentialStore::new()), &config)
}

fn negotiate_request(dialects: &[Dialect]) -> Vec<u8> {
    let header = Header::request(Command::Negotiate as u16, 0);
    let mut w = Writer::new();
    header.write(&mut w);
    w.write_u16(36); // StructureSize
    w.write_u16(dialects.len() as u16);
    w.write_u16(0x0003); // SecurityMode: signing enabled
    w.write_u16(0); // reserved
    w.write_u32(0); // capabilities
    w.write_guid(&Uuid::nil());
    w.write_u32(0); // negotiate context offset
    w.write_u16(0); // negotiate context count
    w.write_u16(0); // reserved2
    for dialect in dialects {
        w.write_u16(dialect.as_wire());
    }
    w.into_inner()
}

fn echo_request(message_id: u64) -> Vec<u8> {
    let header = Header::request(Command::Echo as u16, message_id);
    let mut w = Writer::new();
    header.write(&mut w);
    w.write_u16(4); // StructureSize
    w.write_u16(0); // reserved
    w.into_inner()
}

#[tokio::test]
async fn negotiate_selects_the_highest_dialect_in_range() {
    let ctx = build_context();
    let request = negotiate_request(&[Dialect::Smb202, Dialect::Smb210, Dialect::Smb300, Dialect::Smb302, Dialect::Smb311]);
    let (header, response) = handle_message(&ctx, &request).await.unwrap();
    assert_eq!(header.status, NTStatus::SUCCESS);
    assert_eq!(ctx.dialect(), Some(Dialect::Smb311));

    let mut c = Cursor::new(&response[smbd_rs::protocol::header::HEADER_LEN..]);
    let _structure_size = c.read_u16().unwrap();
    let _security_mode = c.read_u16().unwrap();
    let selected = c.read_u16().unwrap();
    assert_eq!(selected, Dialect::Smb311.as_wire());
}

#[tokio::test]
async fn negotiate_honors_a_configured_dialect_ceiling() {
    let mut shares = ShareRegistry::new();
    shares.add(ShareOptions::disk("SHARE"), "");
    let config = ServerConfig { max_dialect: Dialect::Smb210, ..ServerConfig::default() };
    let ctx = Context::new(shares, Arc::new(MemFs::new()), Arc::new(StaticCredentialStore::new()), &config);

    let request = negotiate_request(&[Dialect::Smb300, Dialect::Smb302, Dialect::Smb311]);
    let (header, _response) = handle_message(&ctx, &request).await.unwrap();
    assert_eq!(header.status, NTStatus::NOT_SUPPORTED);
}

#[tokio::test]
async fn echo_round_trips_without_a_session_or_tree_connect() {
    let ctx = build_context();
    let request = echo_request(7);
    let (header, _response) = handle_message(&ctx, &request).await.unwrap();
    assert_eq!(header.status, NTStatus::SUCCESS);
    assert_eq!(header.message_id, 7);
}

#[tokio::test]
async fn directory_enumeration_lists_backing_store_entries() {
    let fs = MemFs::new();
    fs.create_file("a.txt").await.unwrap();
    fs.create_file("b.txt").await.unwrap();
    let mut shares = ShareRegistry::new();
    shares.add(ShareOptions::disk("SHARE"), "");
    let config = ServerConfig::default();
    let ctx = Context::new(shares, Arc::new(fs), Arc::new(StaticCredentialStore::new()), &config);

    let result = ctx.filesystem.read_dir("", 0, 10).await.unwrap();
    let mut names: Vec<&str> = result.entries.iter().map(|e| e.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
    assert!(result.end_of_directory);
}
