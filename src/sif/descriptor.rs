//! Descriptor inputs for a new container.
//!
//! A [`DescriptorInput`] records everything the assembler needs to write one
//! data object: its type, group and link, its byte length, and where the
//! bytes come from. Partition payloads stay on disk and are streamed by the
//! assembler, so only their length is known up front.

use std::fs::File;
use std::path::Path;

use super::{
    Arch, DataType, FsType, PartType, PartitionExtra, DESCR_DEFAULT_GROUP, DESCR_UNUSED_LINK,
};
use crate::error::{Error, Result};

/// Source of a descriptor's bytes.
#[derive(Debug)]
pub enum Payload {
    /// Bytes held in memory (definition file text).
    Inline(Vec<u8>),
    /// Bytes streamed from an open file. The handle closes when the input drops.
    File(File),
}

/// One data object to be written into a container.
#[derive(Debug)]
pub struct DescriptorInput {
    pub datatype: DataType,
    pub groupid: u32,
    pub link: u32,
    /// Byte length, always recorded even for streamed payloads.
    pub size: u64,
    pub name: String,
    pub payload: Payload,
    pub partition: Option<PartitionExtra>,
}

impl DescriptorInput {
    /// Definition file descriptor holding the recipe text inline.
    pub fn definition(recipe: impl Into<Vec<u8>>) -> Self {
        let data = recipe.into();
        Self {
            datatype: DataType::Deffile,
            groupid: DESCR_DEFAULT_GROUP,
            link: DESCR_UNUSED_LINK,
            size: data.len() as u64,
            name: String::new(),
            payload: Payload::Inline(data),
            partition: None,
        }
    }

    /// Partition descriptor streaming its bytes from `path`.
    ///
    /// The file must already exist; its current size becomes the object length.
    pub fn partition(path: &Path, fs_type: FsType, part_type: PartType, arch: Arch) -> Result<Self> {
        let unavailable = |source| Error::PayloadUnavailable {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(unavailable)?;
        let size = file.metadata().map_err(unavailable)?.len();

        Ok(Self {
            datatype: DataType::Partition,
            groupid: DESCR_DEFAULT_GROUP,
            link: DESCR_UNUSED_LINK,
            size,
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            payload: Payload::File(file),
            partition: Some(PartitionExtra {
                fs_type,
                part_type,
                arch,
            }),
        })
    }
}

/// Definition and primary system partition descriptors, in that order.
pub fn build_descriptors(recipe: &str, squashfs: &Path) -> Result<Vec<DescriptorInput>> {
    let definition = DescriptorInput::definition(recipe);
    let partition = DescriptorInput::partition(
        squashfs,
        FsType::Squash,
        PartType::PrimarySystem,
        Arch::host(),
    )?;
    Ok(vec![definition, partition])
}
