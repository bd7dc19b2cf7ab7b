//! Writing and reading SIF containers.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use super::descriptor::{DescriptorInput, Payload};
use super::layout::{Descriptor, Header, LayoutError, DESCRIPTOR_SIZE, HEADER_SIZE};
use super::{Arch, DataType, PartType, DESCR_NUM_ENTRIES};
use crate::error::{Error, Result};

/// Copy buffer for streamed payloads.
const COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// Largest descriptor table accepted when reading.
const MAX_DESCRIPTORS: i64 = 4096;

/// Write a new container at `path` holding `inputs` in order.
///
/// A fresh random identity is generated for every call. Anything already at
/// `path` is removed right before writing. If a write fails partway the
/// partial file is left in place and [`Error::AssemblyFailed`] is returned.
pub fn create_container(path: &Path, inputs: Vec<DescriptorInput>) -> Result<Header> {
    let failed = |source| Error::AssemblyFailed {
        path: path.to_path_buf(),
        source,
    };

    if inputs.len() > DESCR_NUM_ENTRIES {
        return Err(failed(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "{} descriptors exceed the {} table slots",
                inputs.len(),
                DESCR_NUM_ENTRIES
            ),
        )));
    }

    let now = OffsetDateTime::now_utc().unix_timestamp();
    let (header, table) = plan(Uuid::new_v4(), &inputs, now);

    remove_existing(path);

    tracing::info!(path = %path.display(), id = %header.id, "creating SIF file");
    write_container(path, &header, &table, inputs).map_err(failed)?;

    Ok(header)
}

/// Compute the header and descriptor table for `inputs`.
fn plan(id: Uuid, inputs: &[DescriptorInput], now: i64) -> (Header, Vec<Descriptor>) {
    let descroff = HEADER_SIZE as i64;
    let descrlen = (DESCR_NUM_ENTRIES * DESCRIPTOR_SIZE) as i64;
    let dataoff = descroff + descrlen;

    // Header arch follows the primary system partition.
    let arch = inputs
        .iter()
        .filter_map(|i| i.partition)
        .find(|p| p.part_type == PartType::PrimarySystem)
        .map(|p| p.arch)
        .unwrap_or(Arch::UNKNOWN);

    let mut offset = dataoff;
    let table: Vec<Descriptor> = inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let desc = Descriptor {
                datatype: input.datatype,
                id: i as u32 + 1,
                groupid: input.groupid,
                link: input.link,
                fileoff: offset,
                filelen: input.size as i64,
                storelen: input.size as i64,
                ctime: now,
                mtime: now,
                uid: 0,
                gid: 0,
                name: input.name.clone(),
                partition: input.partition,
            };
            offset += input.size as i64;
            desc
        })
        .collect();

    let mut header = Header::new(id, arch, now);
    header.dtotal = DESCR_NUM_ENTRIES as i64;
    header.dfree = (DESCR_NUM_ENTRIES - table.len()) as i64;
    header.descroff = descroff;
    header.descrlen = descrlen;
    header.dataoff = dataoff;
    header.datalen = offset - dataoff;

    (header, table)
}

/// Whether `[off, off + len)` lies inside a file of `file_len` bytes.
/// Values come straight from the file, so the sum is checked.
fn extent_within(off: i64, len: i64, file_len: i64) -> bool {
    off >= 0
        && len >= 0
        && off
            .checked_add(len)
            .map(|end| end <= file_len)
            .unwrap_or(false)
}

fn remove_existing(path: &Path) {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(_) => return,
    };
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove previous file");
    }
}

fn write_container(
    path: &Path,
    header: &Header,
    table: &[Descriptor],
    inputs: Vec<DescriptorInput>,
) -> io::Result<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::with_capacity(COPY_BUFFER_SIZE, file);

    out.write_all(&header.to_bytes())?;
    for desc in table {
        out.write_all(&desc.to_bytes())?;
    }
    let unused = [0u8; DESCRIPTOR_SIZE];
    for _ in table.len()..DESCR_NUM_ENTRIES {
        out.write_all(&unused)?;
    }

    for input in inputs {
        match input.payload {
            Payload::Inline(data) => out.write_all(&data)?,
            Payload::File(file) => {
                let copied = io::copy(&mut file.take(input.size), &mut out)?;
                if copied != input.size {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "payload {} shrank to {} of {} bytes while writing",
                            input.name, copied, input.size
                        ),
                    ));
                }
            }
        }
    }

    out.flush()?;
    out.into_inner().map_err(|e| e.into_error())?.sync_all()
}

/// A container read back from disk.
#[derive(Debug, Clone, Serialize)]
pub struct SifFile {
    pub path: PathBuf,
    pub header: Header,
    /// Used descriptors in table order.
    pub descriptors: Vec<Descriptor>,
}

impl SifFile {
    /// Open and parse the container at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&mut file, path)
    }

    /// Parse header and descriptor table from an open container.
    ///
    /// Fails with [`Error::CorruptFormat`] when the table or any payload
    /// extent falls outside the file.
    pub fn parse<R: Read + Seek>(reader: &mut R, path: &Path) -> Result<Self> {
        let corrupt = |reason: String| Error::corrupt(path, "sif", reason);
        let layout = |e: LayoutError| Error::corrupt(path, "sif", e.to_string());

        let file_len = reader
            .seek(SeekFrom::End(0))
            .map_err(|e| Error::io(path, e))? as i64;

        let mut hdr = [0u8; HEADER_SIZE];
        reader
            .seek(SeekFrom::Start(0))
            .and_then(|_| reader.read_exact(&mut hdr))
            .map_err(|_| corrupt(format!("file is shorter than the {HEADER_SIZE}-byte header")))?;
        let header = Header::from_bytes(&hdr).map_err(layout)?;

        if header.dtotal < 0 || header.dtotal > MAX_DESCRIPTORS {
            return Err(corrupt(format!("descriptor count {} out of range", header.dtotal)));
        }
        if header.descrlen != header.dtotal * DESCRIPTOR_SIZE as i64 {
            return Err(corrupt(format!(
                "descriptor table length {} does not match {} slots",
                header.descrlen, header.dtotal
            )));
        }
        if header.descroff < HEADER_SIZE as i64
            || !extent_within(header.descroff, header.descrlen, file_len)
        {
            return Err(corrupt("descriptor table extends past end of file".into()));
        }

        reader
            .seek(SeekFrom::Start(header.descroff as u64))
            .map_err(|e| Error::io(path, e))?;

        let mut descriptors = Vec::new();
        let mut buf = [0u8; DESCRIPTOR_SIZE];
        for index in 0..header.dtotal as usize {
            reader
                .read_exact(&mut buf)
                .map_err(|e| Error::io(path, e))?;
            if let Some(desc) = Descriptor::from_bytes(&buf, index).map_err(layout)? {
                if !extent_within(desc.fileoff, desc.filelen, file_len) {
                    return Err(corrupt(format!(
                        "descriptor {} data [{}, +{}) extends past end of file ({})",
                        desc.id, desc.fileoff, desc.filelen, file_len
                    )));
                }
                descriptors.push(desc);
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            header,
            descriptors,
        })
    }

    /// First partition descriptor marked as the primary system partition.
    pub fn primary_partition(&self) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| {
            d.partition
                .map(|p| p.part_type == PartType::PrimarySystem)
                .unwrap_or(false)
        })
    }

    /// Descriptors of the given type, in table order.
    pub fn descriptors_of(&self, datatype: DataType) -> impl Iterator<Item = &Descriptor> {
        self.descriptors
            .iter()
            .filter(move |d| d.datatype == datatype)
    }

    /// Read the payload of `desc` into memory.
    pub fn read_data(&self, desc: &Descriptor) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let mut data = vec![0u8; desc.filelen as usize];
        file.seek(SeekFrom::Start(desc.fileoff as u64))
            .and_then(|_| file.read_exact(&mut data))
            .map_err(|e| Error::io(&self.path, e))?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sif::descriptor::build_descriptors;
    use crate::sif::layout::{D_FILELEN, D_FILEOFF, H_DESCROFF};
    use crate::sif::{FsType, DESCR_DEFAULT_GROUP, DESCR_UNUSED_LINK};
    use std::io::Cursor;
    use tempfile::TempDir;

    const RECIPE: &str = "Bootstrap: docker\nFrom: alpine:3.19\n\n%post\n    apk add curl\n";

    fn partition_file(dir: &Path, len: usize) -> PathBuf {
        let path = dir.join("squashfs-test.img");
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_round_trip() {
        let temp = TempDir::new().unwrap();
        let part = partition_file(temp.path(), 3 * COPY_BUFFER_SIZE + 17);
        let output = temp.path().join("out.sif");

        let inputs = build_descriptors(RECIPE, &part).unwrap();
        let header = create_container(&output, inputs).unwrap();

        let sif = SifFile::open(&output).unwrap();
        assert_eq!(sif.header, header);
        assert_eq!(sif.descriptors.len(), 2);
        assert_eq!(sif.header.dfree, (DESCR_NUM_ENTRIES - 2) as i64);

        let def = &sif.descriptors[0];
        assert_eq!(def.datatype, DataType::Deffile);
        assert_eq!(def.groupid, DESCR_DEFAULT_GROUP);
        assert_eq!(def.link, DESCR_UNUSED_LINK);
        assert_eq!(def.filelen as usize, RECIPE.len());
        assert_eq!(sif.read_data(def).unwrap(), RECIPE.as_bytes());

        let part_desc = sif.primary_partition().unwrap();
        assert_eq!(part_desc.datatype, DataType::Partition);
        assert_eq!(part_desc.partition.unwrap().fs_type, FsType::Squash);
        assert_eq!(sif.read_data(part_desc).unwrap(), fs::read(&part).unwrap());

        // payloads are concatenated in table order
        assert_eq!(def.fileoff, sif.header.dataoff);
        assert_eq!(part_desc.fileoff, def.fileoff + def.filelen);
        assert_eq!(
            fs::metadata(&output).unwrap().len() as i64,
            sif.header.dataoff + sif.header.datalen
        );
    }

    #[test]
    fn test_identity_unique_and_non_nil() {
        let temp = TempDir::new().unwrap();
        let part = partition_file(temp.path(), 100);
        let a = temp.path().join("a.sif");
        let b = temp.path().join("b.sif");

        let ha = create_container(&a, build_descriptors(RECIPE, &part).unwrap()).unwrap();
        let hb = create_container(&b, build_descriptors(RECIPE, &part).unwrap()).unwrap();

        assert!(!ha.id.is_nil());
        assert!(!hb.id.is_nil());
        assert_ne!(ha.id, hb.id);
        assert_eq!(SifFile::open(&a).unwrap().header.id, ha.id);
    }

    #[test]
    fn test_replaces_existing_file() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out.sif");
        fs::write(&output, vec![0xffu8; 100_000]).unwrap();

        create_container(&output, vec![DescriptorInput::definition("a")]).unwrap();

        let sif = SifFile::open(&output).unwrap();
        assert_eq!(sif.descriptors.len(), 1);
        assert_eq!(
            fs::metadata(&output).unwrap().len() as i64,
            sif.header.dataoff + 1
        );
    }

    #[test]
    fn test_header_arch_from_primary_partition() {
        let temp = TempDir::new().unwrap();
        let part = partition_file(temp.path(), 10);
        let output = temp.path().join("out.sif");

        let header = create_container(&output, build_descriptors(RECIPE, &part).unwrap()).unwrap();
        assert_eq!(header.arch, Arch::host());

        let header = create_container(&output, vec![DescriptorInput::definition("a")]).unwrap();
        assert_eq!(header.arch, Arch::UNKNOWN);
    }

    #[test]
    fn test_too_many_descriptors() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out.sif");
        let inputs = (0..=DESCR_NUM_ENTRIES)
            .map(|_| DescriptorInput::definition("x"))
            .collect();

        let result = create_container(&output, inputs);
        assert!(matches!(result, Err(Error::AssemblyFailed { .. })));
        assert!(!output.exists());
    }

    #[test]
    fn test_unwritable_destination() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("no/such/dir/out.sif");
        let result = create_container(&output, vec![DescriptorInput::definition("x")]);
        assert!(matches!(result, Err(Error::AssemblyFailed { .. })));
    }

    #[test]
    fn test_parse_rejects_truncated_table() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out.sif");
        create_container(&output, vec![DescriptorInput::definition("abc")]).unwrap();

        let bytes = fs::read(&output).unwrap();
        let mut truncated = Cursor::new(bytes[..HEADER_SIZE + 10].to_vec());
        let result = SifFile::parse(&mut truncated, &output);
        assert!(matches!(result, Err(Error::CorruptFormat { .. })));
    }

    #[test]
    fn test_parse_rejects_payload_past_eof() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out.sif");
        create_container(&output, vec![DescriptorInput::definition("abcdef")]).unwrap();

        let bytes = fs::read(&output).unwrap();
        let mut truncated = Cursor::new(bytes[..bytes.len() - 2].to_vec());
        let err = SifFile::parse(&mut truncated, &output).unwrap_err();
        assert!(err.to_string().contains("past end of file"));
    }

    #[test]
    fn test_parse_rejects_overflowing_table_offset() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out.sif");
        create_container(&output, vec![DescriptorInput::definition("abc")]).unwrap();

        let mut bytes = fs::read(&output).unwrap();
        bytes[H_DESCROFF..H_DESCROFF + 8].copy_from_slice(&(i64::MAX - 5).to_le_bytes());
        fs::write(&output, &bytes).unwrap();

        assert!(matches!(
            SifFile::open(&output),
            Err(Error::CorruptFormat { format: "sif", .. })
        ));
    }

    #[test]
    fn test_parse_rejects_overflowing_payload_offset() {
        let temp = TempDir::new().unwrap();
        let part = partition_file(temp.path(), 64);
        let output = temp.path().join("out.sif");
        let inputs = vec![DescriptorInput::partition(
            &part,
            FsType::Squash,
            PartType::PrimarySystem,
            Arch::host(),
        )
        .unwrap()];
        create_container(&output, inputs).unwrap();

        let mut bytes = fs::read(&output).unwrap();
        let fileoff = HEADER_SIZE + D_FILEOFF;
        bytes[fileoff..fileoff + 8].copy_from_slice(&i64::MAX.to_le_bytes());
        let filelen = HEADER_SIZE + D_FILELEN;
        bytes[filelen..filelen + 8].copy_from_slice(&16i64.to_le_bytes());
        fs::write(&output, &bytes).unwrap();

        let err = SifFile::open(&output).unwrap_err();
        assert!(err.to_string().contains("past end of file"));
        assert!(matches!(
            crate::image::open(&output, false),
            Err(Error::CorruptFormat { format: "sif", .. })
        ));
    }

    #[test]
    fn test_extent_within() {
        assert!(extent_within(0, 10, 10));
        assert!(!extent_within(1, 10, 10));
        assert!(!extent_within(-1, 1, 10));
        assert!(!extent_within(0, -1, 10));
        assert!(!extent_within(i64::MAX, 16, 10));
    }

    #[test]
    fn test_parse_rejects_non_sif() {
        let mut data = Cursor::new(vec![0u8; 4096]);
        let result = SifFile::parse(&mut data, Path::new("zeros.img"));
        assert!(matches!(result, Err(Error::CorruptFormat { .. })));
    }
}
