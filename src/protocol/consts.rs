//! SMB2 wire constants: dialects, access masks, share modes, create
//! dispositions/options/actions, and info-query classes.

use num_derive::{FromPrimitive, ToPrimitive};

/// A negotiated SMB2/SMB3 dialect, ordered so the server can pick the
/// highest one both sides support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive)]
pub enum Dialect {
    Smb202 = 0x0202,
    Smb210 = 0x0210,
    Smb300 = 0x0300,
    Smb302 = 0x0302,
    Smb311 = 0x0311,
}

impl Dialect {
    pub const ALL: [Dialect; 5] = [
        Dialect::Smb202,
        Dialect::Smb210,
        Dialect::Smb300,
        Dialect::Smb302,
        Dialect::Smb311,
    ];

    pub fn from_wire(v: u16) -> Option<Dialect> {
        match v {
            0x0202 => Some(Dialect::Smb202),
            0x0210 => Some(Dialect::Smb210),
            0x0300 => Some(Dialect::Smb300),
            0x0302 => Some(Dialect::Smb302),
            0x0311 => Some(Dialect::Smb311),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> u16 {
        *self as u16
    }

    /// Dialects 3.0 and above sign with AES-128-CMAC rather than HMAC-SHA256.
    pub fn uses_aes_signing(&self) -> bool {
        *self >= Dialect::Smb300
    }

    /// Only 3.1.1 carries negotiate contexts and a pre-authentication hash.
    pub fn supports_negotiate_contexts(&self) -> bool {
        *self == Dialect::Smb311
    }
}

/// SMB2 command codes (`[MS-SMB2] 2.2.1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
pub enum Command {
    Negotiate = 0x0000,
    SessionSetup = 0x0001,
    Logoff = 0x0002,
    TreeConnect = 0x0003,
    TreeDisconnect = 0x0004,
    Create = 0x0005,
    Close = 0x0006,
    Flush = 0x0007,
    Read = 0x0008,
    Write = 0x0009,
    QueryDirectory = 0x000E,
    ChangeNotify = 0x000F,
    QueryInfo = 0x0010,
    SetInfo = 0x0011,
    Ioctl = 0x000B,
    Cancel = 0x000C,
    Echo = 0x000D,
}

bitflags::bitflags! {
    /// SMB2 header flags (`[MS-SMB2] 2.2.1.2`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFlags: u32 {
        const SERVER_TO_REDIR   = 0x0000_0001;
        const ASYNC_COMMAND     = 0x0000_0002;
        const RELATED_OPERATIONS = 0x0000_0004;
        const SIGNED            = 0x0000_0008;
        const PRIORITY_MASK     = 0x0000_0070;
        const DFS_OPERATIONS    = 0x1000_0000;
        const REPLAY_OPERATION  = 0x2000_0000;
    }
}

bitflags::bitflags! {
    /// NEGOTIATE response capability bits (`[MS-SMB2] 2.2.4`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const DFS                 = 0x0000_0001;
        const LEASING              = 0x0000_0002;
        const LARGE_MTU            = 0x0000_0004;
        const MULTI_CHANNEL        = 0x0000_0008;
        const PERSISTENT_HANDLES   = 0x0000_0010;
        const DIRECTORY_LEASING    = 0x0000_0020;
        const ENCRYPTION           = 0x0000_0040;
    }
}

bitflags::bitflags! {
    /// File/directory access mask bits (`[MS-SMB2] 2.2.13.1`), generic rights
    /// expand into these before being checked against an open's granted access.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessMask: u32 {
        const FILE_READ_DATA         = 0x0000_0001;
        const FILE_WRITE_DATA        = 0x0000_0002;
        const FILE_APPEND_DATA       = 0x0000_0004;
        const FILE_READ_EA           = 0x0000_0008;
        const FILE_WRITE_EA          = 0x0000_0010;
        const FILE_EXECUTE           = 0x0000_0020;
        const FILE_DELETE_CHILD      = 0x0000_0040;
        const FILE_READ_ATTRIBUTES   = 0x0000_0080;
        const FILE_WRITE_ATTRIBUTES  = 0x0000_0100;
        const DELETE                 = 0x0001_0000;
        const READ_CONTROL           = 0x0002_0000;
        const WRITE_DAC              = 0x0004_0000;
        const WRITE_OWNER            = 0x0008_0000;
        const SYNCHRONIZE            = 0x0010_0000;
        const ACCESS_SYSTEM_SECURITY = 0x0100_0000;
        const MAXIMUM_ALLOWED        = 0x0200_0000;
        const GENERIC_ALL            = 0x1000_0000;
        const GENERIC_EXECUTE        = 0x2000_0000;
        const GENERIC_WRITE          = 0x4000_0000;
        const GENERIC_READ           = 0x8000_0000;
    }
}

impl AccessMask {
    /// Expands `GENERIC_*` bits into the specific rights they stand for,
    /// mirroring `MapGenericMask` in Windows.
    pub fn normalize(self) -> AccessMask {
        let mut mask = self;
        if mask.contains(AccessMask::GENERIC_READ) {
            mask.remove(AccessMask::GENERIC_READ);
            mask.insert(
                AccessMask::FILE_READ_DATA
                    | AccessMask::FILE_READ_EA
                    | AccessMask::FILE_READ_ATTRIBUTES
                    | AccessMask::READ_CONTROL
                    | AccessMask::SYNCHRONIZE,
            );
        }
        if mask.contains(AccessMask::GENERIC_WRITE) {
            mask.remove(AccessMask::GENERIC_WRITE);
            mask.insert(
                AccessMask::FILE_WRITE_DATA
                    | AccessMask::FILE_APPEND_DATA
                    | AccessMask::FILE_WRITE_EA
                    | AccessMask::FILE_WRITE_ATTRIBUTES
                    | AccessMask::READ_CONTROL
                    | AccessMask::SYNCHRONIZE,
            );
        }
        if mask.contains(AccessMask::GENERIC_EXECUTE) {
            mask.remove(AccessMask::GENERIC_EXECUTE);
            mask.insert(
                AccessMask::FILE_EXECUTE
                    | AccessMask::FILE_READ_ATTRIBUTES
                    | AccessMask::READ_CONTROL
                    | AccessMask::SYNCHRONIZE,
            );
        }
        if mask.contains(AccessMask::GENERIC_ALL) {
            mask.remove(AccessMask::GENERIC_ALL);
            mask.insert(
                AccessMask::FILE_READ_DATA
                    | AccessMask::FILE_WRITE_DATA
                    | AccessMask::FILE_APPEND_DATA
                    | AccessMask::FILE_READ_EA
                    | AccessMask::FILE_WRITE_EA
                    | AccessMask::FILE_EXECUTE
                    | AccessMask::FILE_DELETE_CHILD
                    | AccessMask::FILE_READ_ATTRIBUTES
                    | AccessMask::FILE_WRITE_ATTRIBUTES
                    | AccessMask::DELETE
                    | AccessMask::READ_CONTROL
                    | AccessMask::WRITE_DAC
                    | AccessMask::WRITE_OWNER
                    | AccessMask::SYNCHRONIZE,
            );
        }
        mask
    }
}

bitflags::bitflags! {
    /// Requested/granted share-access modes (`[MS-SMB2] 2.2.13`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShareAccess: u32 {
        const READ   = 0x0000_0001;
        const WRITE  = 0x0000_0002;
        const DELETE = 0x0000_0004;
    }
}

/// Create disposition (`[MS-SMB2] 2.2.13`): what to do about an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum CreateDisposition {
    Supersede = 0x0000_0000,
    Open = 0x0000_0001,
    Create = 0x0000_0002,
    OpenIf = 0x0000_0003,
    Overwrite = 0x0000_0004,
    OverwriteIf = 0x0000_0005,
}

bitflags::bitflags! {
    /// Create options (`[MS-SMB2] 2.2.13`), the subset this server honors.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CreateOptions: u32 {
        const DIRECTORY_FILE    = 0x0000_0001;
        const NON_DIRECTORY_FILE = 0x0000_0040;
        const DELETE_ON_CLOSE   = 0x0000_1000;
        const SYNCHRONOUS_IO_NONALERT = 0x0000_0020;
    }
}

/// Action taken by a create request, returned in the CREATE response
/// (`[MS-SMB2] 2.2.14`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum CreateAction {
    Superseded = 0x0000_0000,
    Opened = 0x0000_0001,
    Created = 0x0000_0002,
    Overwritten = 0x0000_0003,
}

/// Share type advertised in TREE_CONNECT responses (`[MS-SMB2] 2.2.10`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum ShareType {
    Disk = 0x01,
    Pipe = 0x02,
    Print = 0x03,
}

/// Client-side caching hint a share advertises in its `ShareFlags`
/// (`[MS-SMB2] 2.2.10`), set per-share on [`crate::server::share::ShareOptions`]
/// and reported verbatim in the TREE_CONNECT response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachingMode {
    #[default]
    Manual,
    AutoDocuments,
    AutoPrograms,
    None,
}

impl CachingMode {
    /// The `ShareFlags` caching bits this mode maps to (`[MS-SMB2] 2.2.10`).
    pub fn share_flags_bits(self) -> u32 {
        match self {
            CachingMode::Manual => 0x0000_0000,
            CachingMode::AutoDocuments => 0x0000_0010,
            CachingMode::AutoPrograms => 0x0000_0020,
            CachingMode::None => 0x0000_0030,
        }
    }
}

/// `InfoType` for QUERY_INFO/SET_INFO (`[MS-SMB2] 2.2.37`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum InfoType {
    File = 0x01,
    FileSystem = 0x02,
    Security = 0x03,
    Quota = 0x04,
}

/// `FileInformationClass` values this server implements
/// (`[MS-FSCC] 2.4`), used by both QUERY_INFO and QUERY_DIRECTORY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum FileInfoClass {
    DirectoryInformation = 1,
    FullDirectoryInformation = 2,
    BothDirectoryInformation = 3,
    BasicInformation = 4,
    StandardInformation = 5,
    RenameInformation = 10,
    DispositionInformation = 13,
    IdFullDirectoryInformation = 38,
    IdBothDirectoryInformation = 37,
    NamesInformation = 12,
    AllInformation = 18,
    EndOfFileInformation = 20,
    AllocationInformation = 19,
}

bitflags::bitflags! {
    /// File attribute bits (`[MS-FSCC] 2.6`), the subset exposed through the
    /// abstract filesystem.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileAttributes: u32 {
        const READONLY   = 0x0000_0001;
        const HIDDEN     = 0x0000_0002;
        const DIRECTORY  = 0x0000_0010;
        const ARCHIVE    = 0x0000_0020;
        const NORMAL     = 0x0000_0080;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialects_order_oldest_to_newest() {
        assert!(Dialect::Smb202 < Dialect::Smb311);
        assert!(Dialect::Smb300 < Dialect::Smb302);
    }

    #[test]
    fn generic_read_expands_to_specific_rights() {
        let mask = AccessMask::GENERIC_READ.normalize();
        assert!(mask.contains(AccessMask::FILE_READ_DATA));
        assert!(!mask.contains(AccessMask::GENERIC_READ));
    }

    #[test]
    fn aes_signing_only_from_smb3() {
        assert!(!Dialect::Smb210.uses_aes_signing());
        assert!(Dialect::Smb300.uses_aes_signing());
    }
}
