//! Byte layout of the SIF header and descriptor records.
//!
//! All integers are little-endian. Strings are NUL padded to their field
//! width.

use serde::Serialize;
use uuid::Uuid;

use super::{
    Arch, DataType, FsType, PartType, DESCR_MAX_PRIV_LEN, DESCR_NAME_LEN, HDR_ARCH_LEN,
    HDR_LAUNCH, HDR_LAUNCH_LEN, HDR_MAGIC, HDR_MAGIC_LEN, HDR_VERSION, HDR_VERSION_LEN,
};

/// Header size in bytes (fixed).
pub const HEADER_SIZE: usize = 128;

/// Descriptor record size in bytes (fixed).
pub const DESCRIPTOR_SIZE: usize = 585;

// Header field offsets.
const H_LAUNCH: usize = 0;
const H_MAGIC: usize = H_LAUNCH + HDR_LAUNCH_LEN;
const H_VERSION: usize = H_MAGIC + HDR_MAGIC_LEN;
const H_ARCH: usize = H_VERSION + HDR_VERSION_LEN;
const H_ID: usize = H_ARCH + HDR_ARCH_LEN;
const H_CTIME: usize = H_ID + 16;
const H_MTIME: usize = H_CTIME + 8;
const H_DFREE: usize = H_MTIME + 8;
const H_DTOTAL: usize = H_DFREE + 8;
pub(crate) const H_DESCROFF: usize = H_DTOTAL + 8;
const H_DESCRLEN: usize = H_DESCROFF + 8;
const H_DATAOFF: usize = H_DESCRLEN + 8;
const H_DATALEN: usize = H_DATAOFF + 8;

// Descriptor field offsets.
const D_DATATYPE: usize = 0;
const D_USED: usize = 4;
const D_ID: usize = 5;
const D_GROUPID: usize = 9;
const D_LINK: usize = 13;
pub(crate) const D_FILEOFF: usize = 17;
pub(crate) const D_FILELEN: usize = 25;
const D_STORELEN: usize = 33;
const D_CTIME: usize = 41;
const D_MTIME: usize = 49;
const D_UID: usize = 57;
const D_GID: usize = 65;
const D_NAME: usize = 73;
const D_EXTRA: usize = D_NAME + DESCR_NAME_LEN;

/// Problems decoding header or descriptor bytes.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("invalid magic: expected SIF_MAGIC")]
    InvalidMagic,

    #[error("unsupported version {0:?}")]
    UnsupportedVersion(String),

    #[error("descriptor {index}: unknown data type {raw:#x}")]
    UnknownDataType { index: usize, raw: i32 },

    #[error("descriptor {index}: unknown partition metadata (fs {fs}, part {part})")]
    UnknownPartition { index: usize, fs: i32, part: i32 },
}

/// Fixed-size header at the start of a SIF file.
///
/// Layout (128 bytes total):
/// ```text
/// Offset  Size  Field
/// 0       32    launch script (NUL padded)
/// 32      10    magic ("SIF_MAGIC")
/// 42      3     version ("01")
/// 45      3     arch code
/// 48      16    id (uuid)
/// 64      8     ctime (i64)
/// 72      8     mtime (i64)
/// 80      8     dfree - unused descriptor slots
/// 88      8     dtotal - descriptor slots
/// 96      8     descroff - offset of descriptor table
/// 104     8     descrlen - length of descriptor table
/// 112     8     dataoff - offset of first payload
/// 120     8     datalen - total payload length
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub launch: String,
    pub version: String,
    pub arch: Arch,
    pub id: Uuid,
    pub ctime: i64,
    pub mtime: i64,
    pub dfree: i64,
    pub dtotal: i64,
    pub descroff: i64,
    pub descrlen: i64,
    pub dataoff: i64,
    pub datalen: i64,
}

impl Header {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        put_str(&mut buf[H_LAUNCH..H_MAGIC], &self.launch);
        put_str(&mut buf[H_MAGIC..H_VERSION], HDR_MAGIC);
        put_str(&mut buf[H_VERSION..H_ARCH], &self.version);
        buf[H_ARCH..H_ID].copy_from_slice(&self.arch.0);
        buf[H_ID..H_CTIME].copy_from_slice(self.id.as_bytes());

        put_i64(&mut buf, H_CTIME, self.ctime);
        put_i64(&mut buf, H_MTIME, self.mtime);
        put_i64(&mut buf, H_DFREE, self.dfree);
        put_i64(&mut buf, H_DTOTAL, self.dtotal);
        put_i64(&mut buf, H_DESCROFF, self.descroff);
        put_i64(&mut buf, H_DESCRLEN, self.descrlen);
        put_i64(&mut buf, H_DATAOFF, self.dataoff);
        put_i64(&mut buf, H_DATALEN, self.datalen);

        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self, LayoutError> {
        if !has_magic(buf) {
            return Err(LayoutError::InvalidMagic);
        }

        let version = trim_nul(&buf[H_VERSION..H_ARCH]);
        if version != HDR_VERSION {
            return Err(LayoutError::UnsupportedVersion(version));
        }

        let mut arch = [0u8; HDR_ARCH_LEN];
        arch.copy_from_slice(&buf[H_ARCH..H_ID]);
        let mut id = [0u8; 16];
        id.copy_from_slice(&buf[H_ID..H_CTIME]);

        Ok(Self {
            launch: trim_nul(&buf[H_LAUNCH..H_MAGIC]),
            version,
            arch: Arch(arch),
            id: Uuid::from_bytes(id),
            ctime: get_i64(buf, H_CTIME),
            mtime: get_i64(buf, H_MTIME),
            dfree: get_i64(buf, H_DFREE),
            dtotal: get_i64(buf, H_DTOTAL),
            descroff: get_i64(buf, H_DESCROFF),
            descrlen: get_i64(buf, H_DESCRLEN),
            dataoff: get_i64(buf, H_DATAOFF),
            datalen: get_i64(buf, H_DATALEN),
        })
    }

    pub(crate) fn new(id: Uuid, arch: Arch, now: i64) -> Self {
        Self {
            launch: HDR_LAUNCH.to_string(),
            version: HDR_VERSION.to_string(),
            arch,
            id,
            ctime: now,
            mtime: now,
            dfree: 0,
            dtotal: 0,
            descroff: 0,
            descrlen: 0,
            dataoff: 0,
            datalen: 0,
        }
    }
}

/// Whether `buf` carries the SIF magic at its fixed offset.
pub fn has_magic(buf: &[u8]) -> bool {
    match buf.get(H_MAGIC..H_VERSION) {
        Some(field) => {
            let (magic, pad) = field.split_at(HDR_MAGIC.len());
            magic == HDR_MAGIC.as_bytes() && pad.iter().all(|b| *b == 0)
        }
        None => false,
    }
}

/// Partition metadata stored in a descriptor's private area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionExtra {
    pub fs_type: FsType,
    pub part_type: PartType,
    pub arch: Arch,
}

/// One used entry of the descriptor table.
///
/// Layout (585 bytes total):
/// ```text
/// Offset  Size  Field
/// 0       4     datatype (i32)
/// 4       1     used (bool)
/// 5       4     id (u32)
/// 9       4     groupid (u32)
/// 13      4     link (u32)
/// 17      8     fileoff (i64)
/// 25      8     filelen (i64)
/// 33      8     storelen (i64)
/// 41      8     ctime (i64)
/// 49      8     mtime (i64)
/// 57      8     uid (i64)
/// 65      8     gid (i64)
/// 73      128   name (NUL padded)
/// 201     384   extra - partition: fstype i32, parttype i32, arch [3]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    pub datatype: DataType,
    pub id: u32,
    pub groupid: u32,
    pub link: u32,
    pub fileoff: i64,
    pub filelen: i64,
    pub storelen: i64,
    pub ctime: i64,
    pub mtime: i64,
    pub uid: i64,
    pub gid: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition: Option<PartitionExtra>,
}

impl Descriptor {
    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_SIZE] {
        let mut buf = [0u8; DESCRIPTOR_SIZE];

        put_i32(&mut buf, D_DATATYPE, self.datatype as i32);
        buf[D_USED] = 1;
        put_u32(&mut buf, D_ID, self.id);
        put_u32(&mut buf, D_GROUPID, self.groupid);
        put_u32(&mut buf, D_LINK, self.link);
        put_i64(&mut buf, D_FILEOFF, self.fileoff);
        put_i64(&mut buf, D_FILELEN, self.filelen);
        put_i64(&mut buf, D_STORELEN, self.storelen);
        put_i64(&mut buf, D_CTIME, self.ctime);
        put_i64(&mut buf, D_MTIME, self.mtime);
        put_i64(&mut buf, D_UID, self.uid);
        put_i64(&mut buf, D_GID, self.gid);
        put_str(&mut buf[D_NAME..D_EXTRA], &self.name);

        if let Some(part) = &self.partition {
            put_i32(&mut buf, D_EXTRA, part.fs_type as i32);
            put_i32(&mut buf, D_EXTRA + 4, part.part_type as i32);
            buf[D_EXTRA + 8..D_EXTRA + 8 + HDR_ARCH_LEN].copy_from_slice(&part.arch.0);
        }

        buf
    }

    /// Decode slot `index`. Unused slots decode to `None`.
    pub fn from_bytes(
        buf: &[u8; DESCRIPTOR_SIZE],
        index: usize,
    ) -> Result<Option<Self>, LayoutError> {
        if buf[D_USED] == 0 {
            return Ok(None);
        }

        let raw = get_i32(buf, D_DATATYPE);
        let datatype =
            DataType::from_raw(raw).ok_or(LayoutError::UnknownDataType { index, raw })?;

        let partition = if datatype == DataType::Partition {
            let fs = get_i32(buf, D_EXTRA);
            let part = get_i32(buf, D_EXTRA + 4);
            let (fs_type, part_type) = FsType::from_raw(fs)
                .zip(PartType::from_raw(part))
                .ok_or(LayoutError::UnknownPartition { index, fs, part })?;
            let mut arch = [0u8; HDR_ARCH_LEN];
            arch.copy_from_slice(&buf[D_EXTRA + 8..D_EXTRA + 8 + HDR_ARCH_LEN]);
            Some(PartitionExtra {
                fs_type,
                part_type,
                arch: Arch(arch),
            })
        } else {
            None
        };

        Ok(Some(Self {
            datatype,
            id: get_u32(buf, D_ID),
            groupid: get_u32(buf, D_GROUPID),
            link: get_u32(buf, D_LINK),
            fileoff: get_i64(buf, D_FILEOFF),
            filelen: get_i64(buf, D_FILELEN),
            storelen: get_i64(buf, D_STORELEN),
            ctime: get_i64(buf, D_CTIME),
            mtime: get_i64(buf, D_MTIME),
            uid: get_i64(buf, D_UID),
            gid: get_i64(buf, D_GID),
            name: trim_nul(&buf[D_NAME..D_EXTRA]),
            partition,
        }))
    }
}

/// Copy `s` into `field`, truncating to leave room for a NUL.
///
/// Truncation stops on a character boundary so the field stays valid UTF-8.
fn put_str(field: &mut [u8], s: &str) {
    let mut n = s.len().min(field.len().saturating_sub(1));
    while !s.is_char_boundary(n) {
        n -= 1;
    }
    field[..n].copy_from_slice(&s.as_bytes()[..n]);
}

/// Text up to the first NUL.
pub(crate) fn trim_nul(field: &[u8]) -> String {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn put_i32(buf: &mut [u8], off: usize, v: i32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_i64(buf: &mut [u8], off: usize, v: i64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

fn get_i32(buf: &[u8], off: usize) -> i32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    i32::from_le_bytes(b)
}

fn get_u32(buf: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    u32::from_le_bytes(b)
}

fn get_i64(buf: &[u8], off: usize) -> i64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    i64::from_le_bytes(b)
}
