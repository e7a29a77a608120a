//! Wire codec primitives shared by every SMB2 message.
//!
//! Every SMB2 message on the wire is prefixed by a 4-byte NetBIOS session
//! frame: one zero byte followed by a 24-bit big-endian length. The SMB2
//! message itself is little-endian throughout, with UTF-16LE strings,
//! Windows FILETIME timestamps, mixed-endian GUIDs, and fields aligned to
//! 8-byte boundaries within variable-length buffers.
//!
//! [`Cursor`] and [`Writer`] provide cursor-style reading and writing over
//! these primitives; command payload (de)serialization in
//! [`crate::server::dispatch`] is built entirely out of their methods.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

/// 100-nanosecond ticks since 1601-01-01 00:00:00 UTC, per `[MS-DTYP] FILETIME`.
///
/// A value of zero is a sentinel meaning "no time" and passes through
/// conversions unchanged rather than mapping to the 1601 epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileTime(pub u64);

/// Seconds between the FILETIME epoch (1601-01-01) and the Unix epoch (1970-01-01).
const EPOCH_DELTA_SECONDS: i64 = 11_644_473_600;
const TICKS_PER_SECOND: i64 = 10_000_000;

impl FileTime {
    pub const ZERO: FileTime = FileTime(0);

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns the current time as a FILETIME value.
    pub fn now() -> Self {
        Self::from_offset_date_time(time::OffsetDateTime::now_utc())
    }

    pub fn from_offset_date_time(dt: time::OffsetDateTime) -> Self {
        let unix_ticks = dt.unix_timestamp() as i64 * TICKS_PER_SECOND
            + i64::from(dt.nanosecond() / 100);
        let filetime_ticks = unix_ticks + EPOCH_DELTA_SECONDS * TICKS_PER_SECOND;
        FileTime(filetime_ticks.max(0) as u64)
    }

    /// Converts to a UTC timestamp, or `None` for the zero sentinel.
    pub fn to_offset_date_time(&self) -> Option<time::OffsetDateTime> {
        if self.is_zero() {
            return None;
        }
        let filetime_ticks = self.0 as i64;
        let unix_ticks = filetime_ticks - EPOCH_DELTA_SECONDS * TICKS_PER_SECOND;
        let seconds = unix_ticks.div_euclid(TICKS_PER_SECOND);
        let nanos = (unix_ticks.rem_euclid(TICKS_PER_SECOND) * 100) as i64;
        time::OffsetDateTime::from_unix_timestamp(seconds)
            .ok()
            .map(|dt| dt + time::Duration::nanoseconds(nanos))
    }
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// Rounds `len` up to the next multiple of `align`.
pub fn align_up(len: usize, align: usize) -> usize {
    (len + align - 1) / align * align
}

/// Cursor-style little-endian reader over an in-memory SMB2 message.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn seek(&mut self, pos: usize) -> io::Result<()> {
        if pos > self.buf.len() {
            return Err(invalid_data("seek past end of buffer"));
        }
        self.pos = pos;
        Ok(())
    }

    fn take(&mut self, len: usize) -> io::Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(invalid_data("unexpected end of message"));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_bytes(&mut self, len: usize) -> io::Result<Vec<u8>> {
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> io::Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> io::Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_filetime(&mut self) -> io::Result<FileTime> {
        Ok(FileTime(self.read_u64()?))
    }

    /// Reads a mixed-endian GUID (Data1/2/3 little-endian, Data4 raw bytes).
    pub fn read_guid(&mut self) -> io::Result<Uuid> {
        let d1 = self.read_u32()?;
        let d2 = self.read_u16()?;
        let d3 = self.read_u16()?;
        let d4_bytes = self.take(8)?;
        let mut d4 = [0u8; 8];
        d4.copy_from_slice(d4_bytes);
        Ok(Uuid::from_fields(d1, d2, d3, &d4))
    }

    /// Reads `byte_len` bytes as UTF-16LE, stripping a trailing NUL code unit if present.
    pub fn read_utf16le(&mut self, byte_len: usize) -> io::Result<String> {
        if byte_len % 2 != 0 {
            return Err(invalid_data("UTF-16LE buffer has odd byte length"));
        }
        let bytes = self.take(byte_len)?;
        let mut units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        if units.last() == Some(&0) {
            units.pop();
        }
        Ok(String::from_utf16_lossy(&units))
    }

    /// Advances to the next 8-byte boundary relative to `origin` (usually the
    /// start of the message).
    pub fn align8(&mut self, origin: usize) -> io::Result<()> {
        let relative = self.pos.saturating_sub(origin);
        let padded = align_up(relative, 8);
        self.seek(origin + padded)
    }
}

/// Cursor-style little-endian writer for building an SMB2 message.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: Vec::with_capacity(cap) }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn write_u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn write_u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn write_u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn write_u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn write_i64(&mut self, v: i64) -> &mut Self {
        self.write_u64(v as u64)
    }

    pub fn write_filetime(&mut self, v: FileTime) -> &mut Self {
        self.write_u64(v.0)
    }

    pub fn write_guid(&mut self, guid: &Uuid) -> &mut Self {
        let (d1, d2, d3, d4) = guid.as_fields();
        self.write_u32(d1).write_u16(d2).write_u16(d3).write_bytes(d4)
    }

    /// Encodes `s` as UTF-16LE, without a terminating NUL.
    pub fn write_utf16le(&mut self, s: &str) -> &mut Self {
        for unit in s.encode_utf16() {
            self.buf.extend_from_slice(&unit.to_le_bytes());
        }
        self
    }

    /// Pads with zero bytes up to the next 8-byte boundary.
    pub fn align8(&mut self) -> &mut Self {
        let padded = align_up(self.buf.len(), 8);
        self.buf.resize(padded, 0);
        self
    }
}

/// Encodes a UTF-8 string as UTF-16LE bytes (helper for callers that need a
/// standalone buffer rather than a [`Writer`]).
pub fn utf16le_bytes(s: &str) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_utf16le(s);
    w.into_inner()
}

/// Reads one NetBIOS-framed SMB2 message: a 4-byte header (zero byte plus a
/// 24-bit big-endian length) followed by that many bytes of payload.
pub async fn read_netbios_frame<R: AsyncRead + Unpin>(stream: &mut R) -> io::Result<Vec<u8>> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    if header[0] != 0 {
        return Err(invalid_data("unsupported NetBIOS session message type"));
    }
    let len = ((header[1] as usize) << 16) | ((header[2] as usize) << 8) | header[3] as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Writes `payload` as a single NetBIOS-framed message.
pub async fn write_netbios_frame<W: AsyncWrite + Unpin>(
    stream: &mut W,
    payload: &[u8],
) -> io::Result<()> {
    if payload.len() > 0x00FF_FFFF {
        return Err(invalid_data("message too large for a NetBIOS session frame"));
    }
    let len = payload.len();
    let header = [0u8, ((len >> 16) & 0xFF) as u8, ((len >> 8) & 0xFF) as u8, (len & 0xFF) as u8];
    stream.write_all(&header).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16le_round_trips_without_embedded_nul() {
        let original = "hello/\u{00e9}world";
        let mut w = Writer::new();
        w.write_utf16le(original);
        let bytes = w.into_inner();
        let mut c = Cursor::new(&bytes);
        let decoded = c.read_utf16le(bytes.len()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn utf16le_strips_trailing_nul_on_decode() {
        let mut w = Writer::new();
        w.write_utf16le("abc");
        w.write_u16(0);
        let bytes = w.into_inner();
        let mut c = Cursor::new(&bytes);
        assert_eq!(c.read_utf16le(bytes.len()).unwrap(), "abc");
    }

    #[test]
    fn filetime_zero_sentinel_has_no_datetime() {
        assert!(FileTime::ZERO.to_offset_date_time().is_none());
    }

    #[test]
    fn filetime_round_trips_within_100ns() {
        let dt = time::macros::datetime!(2024-03-01 12:30:00 UTC);
        let ft = FileTime::from_offset_date_time(dt);
        let back = ft.to_offset_date_time().unwrap();
        assert!((back - dt).whole_nanoseconds().abs() < 100);
    }

    #[test]
    fn guid_round_trips() {
        let guid = Uuid::new_v4();
        let mut w = Writer::new();
        w.write_guid(&guid);
        let bytes = w.into_inner();
        let mut c = Cursor::new(&bytes);
        assert_eq!(c.read_guid().unwrap(), guid);
    }

    #[test]
    fn align8_pads_writer_to_boundary() {
        let mut w = Writer::new();
        w.write_bytes(&[1, 2, 3]);
        w.align8();
        assert_eq!(w.len(), 8);
    }
}
