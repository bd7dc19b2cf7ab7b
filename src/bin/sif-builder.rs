use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use sif_builder::image::{self, FormatKind};
use sif_builder::preflight;
use sif_builder::sif::layout::Descriptor;
use sif_builder::{BuildConfig, Bundle, SifAssembler, SifFile};
use tracing_subscriber::EnvFilter;

fn usage() -> &'static str {
    "Usage:\n  sif-builder build [--config <file>] <definition-file> <rootfs-dir> <output.sif>\n  sif-builder inspect [--json] <image>"
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [build, def, rootfs, output] if build == "build" => {
            build_image(None, Path::new(def), Path::new(rootfs), Path::new(output))
        }
        [build, flag, config, def, rootfs, output] if build == "build" && flag == "--config" => {
            build_image(
                Some(Path::new(config)),
                Path::new(def),
                Path::new(rootfs),
                Path::new(output),
            )
        }
        [inspect, path] if inspect == "inspect" => inspect_image(Path::new(path), false),
        [inspect, flag, path] if inspect == "inspect" && flag == "--json" => {
            inspect_image(Path::new(path), true)
        }
        _ => bail!(usage()),
    }
}

fn build_image(config: Option<&Path>, def: &Path, rootfs: &Path, output: &Path) -> Result<()> {
    let config = BuildConfig::load(config).context("loading build configuration")?;

    let packer = config.packer.program.as_str();
    preflight::check_required_tools(&[(packer, preflight::package_for(packer))])
        .context("checking host tools")?;

    let recipe = std::fs::read_to_string(def)
        .with_context(|| format!("reading definition file '{}'", def.display()))?;
    if !rootfs.is_dir() {
        bail!("root filesystem '{}' is not a directory", rootfs.display());
    }

    let staging_parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let bundle = Bundle::new_in(&staging_parent, recipe)
        .with_context(|| format!("creating build bundle in '{}'", staging_parent.display()))?;
    bundle
        .stage_rootfs(rootfs)
        .with_context(|| format!("staging '{}'", rootfs.display()))?;

    let report = SifAssembler::new(config)
        .assemble(&bundle, output)
        .with_context(|| format!("building '{}'", output.display()))?;

    println!(
        "Built {} (id {}, {} bytes)",
        output.display(),
        report.header.id,
        report.header.dataoff + report.header.datalen
    );
    if report.ownership_adjusted {
        println!("Ownership returned to the invoking user");
    }
    Ok(())
}

#[derive(Serialize)]
struct InspectReport<'a> {
    path: &'a Path,
    format: FormatKind,
    writable: bool,
    offset: u64,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sif: Option<&'a SifFile>,
}

fn inspect_image(path: &Path, json: bool) -> Result<()> {
    let img = image::open(path, false).with_context(|| format!("opening '{}'", path.display()))?;

    let sif = match img.format {
        FormatKind::Sif => Some(
            SifFile::open(path)
                .with_context(|| format!("reading descriptors of '{}'", path.display()))?,
        ),
        FormatKind::Squashfs => None,
    };

    let report = InspectReport {
        path,
        format: img.format,
        writable: img.writable,
        offset: img.offset,
        size: img.size,
        sif: sif.as_ref(),
    };

    if json {
        let out = serde_json::to_string_pretty(&report).context("serializing report")?;
        println!("{out}");
        return Ok(());
    }

    println!("Image:    {}", report.path.display());
    println!("Format:   {}", report.format);
    println!("Mode:     {}", if report.writable { "rw" } else { "ro" });
    println!("Payload:  offset {} size {}", report.offset, report.size);

    if let Some(sif) = report.sif {
        println!("Id:       {}", sif.header.id);
        println!("Arch:     {}", sif.header.arch.code());
        println!();
        println!("{:<4} {:<12} {:>10} {:>12}  {}", "ID", "TYPE", "OFFSET", "LENGTH", "NAME");
        for desc in &sif.descriptors {
            print_descriptor(desc);
        }
    }
    Ok(())
}

fn print_descriptor(desc: &Descriptor) {
    let kind = match desc.partition {
        Some(part) => format!("{:?}/{:?}", desc.datatype, part.fs_type),
        None => format!("{:?}", desc.datatype),
    };
    println!(
        "{:<4} {:<12} {:>10} {:>12}  {}",
        desc.id, kind, desc.fileoff, desc.filelen, desc.name
    );
}
