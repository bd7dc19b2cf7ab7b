//! SIF (Singularity Image Format) containers.
//!
//! A SIF file is a single self-describing object holding a build recipe and
//! one or more filesystem partitions:
//!
//! ```text
//! +------------------------------+  0
//! | Header (128 bytes)           |
//! |  - launch script, magic      |
//! |  - version, arch, uuid       |
//! |  - table/data offsets        |
//! +------------------------------+  128
//! | Descriptor table             |
//! |  48 slots x 585 bytes        |
//! +------------------------------+  dataoff
//! | Payload of descriptor 1      |
//! | Payload of descriptor 2      |
//! | ...                          |
//! +------------------------------+
//! ```
//!
//! - [`layout`] - byte-level encoding of the header and descriptor records
//! - [`descriptor`] - descriptor inputs (definition file, partitions)
//! - [`container`] - writing a container and reading one back

pub mod container;
pub mod descriptor;
pub mod layout;

use serde::Serialize;

pub use container::{create_container, SifFile};
pub use descriptor::{build_descriptors, DescriptorInput, Payload};
pub use layout::{Descriptor, Header, PartitionExtra};

/// Launch script written at the start of every container.
pub const HDR_LAUNCH: &str = "#!/usr/bin/env run-singularity\n";

/// Magic identifying a SIF file, at offset [`HDR_MAGIC_OFFSET`].
pub const HDR_MAGIC: &str = "SIF_MAGIC";

/// Format version written by this crate.
pub const HDR_VERSION: &str = "01";

pub const HDR_LAUNCH_LEN: usize = 32;
pub const HDR_MAGIC_LEN: usize = 10;
pub const HDR_VERSION_LEN: usize = 3;
pub const HDR_ARCH_LEN: usize = 3;
pub const HDR_MAGIC_OFFSET: usize = HDR_LAUNCH_LEN;

/// Number of descriptor slots in a new container.
pub const DESCR_NUM_ENTRIES: usize = 48;
pub const DESCR_NAME_LEN: usize = 128;
pub const DESCR_MAX_PRIV_LEN: usize = 384;

/// Group ids carry this mask so they never collide with object ids.
pub const DESCR_GROUP_MASK: u32 = 0xf000_0000;

/// Primary system group.
pub const DESCR_DEFAULT_GROUP: u32 = DESCR_GROUP_MASK | 1;

/// Link value for a descriptor that references nothing.
pub const DESCR_UNUSED_LINK: u32 = 0;

/// Kind of data object held by a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum DataType {
    Deffile = 0x4001,
    EnvVar = 0x4002,
    Labels = 0x4003,
    Partition = 0x4004,
    Signature = 0x4005,
    GenericJson = 0x4006,
}

impl DataType {
    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            0x4001 => Self::Deffile,
            0x4002 => Self::EnvVar,
            0x4003 => Self::Labels,
            0x4004 => Self::Partition,
            0x4005 => Self::Signature,
            0x4006 => Self::GenericJson,
            _ => return None,
        })
    }
}

/// Filesystem inside a partition object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum FsType {
    Squash = 1,
    Ext3 = 2,
    ImmutableObject = 3,
    Raw = 4,
}

impl FsType {
    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            1 => Self::Squash,
            2 => Self::Ext3,
            3 => Self::ImmutableObject,
            4 => Self::Raw,
            _ => return None,
        })
    }
}

/// Role of a partition object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum PartType {
    System = 1,
    PrimarySystem = 2,
    Data = 3,
    Overlay = 4,
}

impl PartType {
    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            1 => Self::System,
            2 => Self::PrimarySystem,
            3 => Self::Data,
            4 => Self::Overlay,
            _ => return None,
        })
    }
}

/// Two-digit SIF architecture code, stored NUL terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arch(pub [u8; HDR_ARCH_LEN]);

impl Arch {
    pub const UNKNOWN: Arch = Arch(*b"00\0");
    pub const I386: Arch = Arch(*b"01\0");
    pub const AMD64: Arch = Arch(*b"02\0");
    pub const ARM: Arch = Arch(*b"03\0");
    pub const ARM64: Arch = Arch(*b"04\0");
    pub const PPC64: Arch = Arch(*b"05\0");
    pub const PPC64LE: Arch = Arch(*b"06\0");
    pub const MIPS: Arch = Arch(*b"07\0");
    pub const MIPSLE: Arch = Arch(*b"08\0");
    pub const MIPS64: Arch = Arch(*b"09\0");
    pub const MIPS64LE: Arch = Arch(*b"10\0");
    pub const S390X: Arch = Arch(*b"11\0");

    /// Map a Rust target architecture name to its SIF code.
    pub fn from_target(arch: &str, little_endian: bool) -> Self {
        match (arch, little_endian) {
            ("x86", _) => Self::I386,
            ("x86_64", _) => Self::AMD64,
            ("arm", _) => Self::ARM,
            ("aarch64", _) => Self::ARM64,
            ("powerpc64", false) => Self::PPC64,
            ("powerpc64", true) => Self::PPC64LE,
            ("mips", false) => Self::MIPS,
            ("mips", true) => Self::MIPSLE,
            ("mips64", false) => Self::MIPS64,
            ("mips64", true) => Self::MIPS64LE,
            ("s390x", _) => Self::S390X,
            _ => Self::UNKNOWN,
        }
    }

    /// Architecture this crate was built for.
    pub fn host() -> Self {
        Self::from_target(std::env::consts::ARCH, cfg!(target_endian = "little"))
    }

    /// The code without its NUL terminator, e.g. `"02"`.
    pub fn code(&self) -> String {
        layout::trim_nul(&self.0)
    }
}

impl Serialize for Arch {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code())
    }
}
