//! The create / extract / list drivers.

use std::fs::File;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context};
use sha1::{Digest, Sha1};

use crate::frame::{Compressor, Decompresser};
use crate::io::{ByteReader, IoReader, IoWriter};

/// Output gating shared by all commands.
#[derive(Debug, Clone, Copy)]
pub struct Ui {
    pub quiet: bool,
    pub verbose: bool,
}

impl Ui {
    fn info(&self, msg: std::fmt::Arguments<'_>) {
        if !self.quiet {
            eprintln!("{msg}");
        }
    }

    fn detail(&self, msg: std::fmt::Arguments<'_>) {
        if self.verbose {
            eprintln!("{msg}");
        }
    }
}

/// Create `archive` from the listed files, one block per file so the
/// archive can be extracted block-parallel.
pub fn create(
    archive: &Path,
    files: &[PathBuf],
    level: u8,
    checksum: bool,
    ui: Ui,
) -> anyhow::Result<()> {
    let out = File::create(archive)
        .with_context(|| format!("cannot create {}", archive.display()))?;
    let mut w = IoWriter::new(out);
    let mut c = Compressor::new(&mut w);

    for path in files {
        let f = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        let size = f.metadata().map(|m| m.len()).unwrap_or(0);
        let mut r = IoReader::new(f);
        let name = path.to_string_lossy();

        c.write_tag()?;
        c.start_block_level(level)?;
        c.start_segment(&name, &size.to_string())?;
        c.post_process(None)?;

        let mut hasher = Sha1::new();
        let mut n = 0u64;
        while let Some(b) = r.get()? {
            hasher.update([b]);
            c.compress_byte(b)?;
            n += 1;
        }
        if checksum {
            let digest: [u8; 20] = hasher.finalize().into();
            c.end_segment(Some(&digest))?;
        } else {
            c.end_segment(None)?;
        }
        c.end_block()?;
        ui.info(format_args!("added {} ({} bytes)", name, n));
    }
    drop(c);
    w.flush()?;
    drop(w);
    if let Ok(m) = std::fs::metadata(archive) {
        ui.info(format_args!(
            "{} -> {} bytes, method {}",
            archive.display(),
            m.len(),
            level
        ));
    }
    Ok(())
}

/// Extract every named segment of `archive` into `outdir`.
pub fn extract(
    archive: &Path,
    outdir: &Path,
    force: bool,
    verify: bool,
    #[cfg(feature = "multithread")] threads: usize,
    ui: Ui,
) -> anyhow::Result<()> {
    #[cfg(feature = "multithread")]
    if threads != 1 {
        let data = std::fs::read(archive)
            .with_context(|| format!("cannot read {}", archive.display()))?;
        return super::threads::extract_parallel(&data, outdir, force, verify, threads, ui);
    }

    let f = File::open(archive).with_context(|| format!("cannot open {}", archive.display()))?;
    let mut d = Decompresser::new(IoReader::new(f));
    d.verify_checksums(verify);

    let mut files = 0u32;
    while d.find_block()? {
        while let Some(name) = d.find_filename()? {
            let comment = d.read_comment()?;
            extract_segment(&mut d, &name, outdir, force, ui)?;
            ui.detail(format_args!(
                "  segment comment: {}",
                String::from_utf8_lossy(&comment)
            ));
            files += 1;
        }
    }
    ui.info(format_args!("extracted {files} file(s)"));
    Ok(())
}

fn extract_segment<R: ByteReader>(
    d: &mut Decompresser<R>,
    name: &[u8],
    outdir: &Path,
    force: bool,
    ui: Ui,
) -> anyhow::Result<()> {
    let name = String::from_utf8_lossy(name).into_owned();
    if name.is_empty() {
        bail!("archive contains an unnamed segment; use the library API to extract it");
    }
    let path = sanitized_path(outdir, &name)?;
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let file = File::create(&path)
        .with_context(|| format!("cannot create {}", path.display()))?;
    let mut w = IoWriter::new(file);
    d.decompress_segment(&mut w)
        .with_context(|| format!("while decoding {name}"))?;
    let sha = d.read_segment_end()?;
    w.flush()?;
    ui.info(format_args!(
        "{} -> {}{}",
        name,
        path.display(),
        if sha.is_some() { " [sha1 ok]" } else { "" }
    ));
    Ok(())
}

/// Resolve a stored name under `outdir`, dropping root and parent
/// components so an archive cannot write outside it. Parent directories
/// are not created.
pub(crate) fn sanitized_path(outdir: &Path, name: &str) -> anyhow::Result<PathBuf> {
    let rel: PathBuf = Path::new(name)
        .components()
        .filter_map(|c| match c {
            Component::Normal(p) => Some(p),
            _ => None,
        })
        .collect();
    if rel.as_os_str().is_empty() {
        bail!("unusable stored name {name:?}");
    }
    Ok(outdir.join(rel))
}

/// List the archive's blocks and segments without decoding any data.
pub fn list(archive: &Path, ui: Ui) -> anyhow::Result<()> {
    let f = File::open(archive).with_context(|| format!("cannot open {}", archive.display()))?;
    let mut d = Decompresser::new(IoReader::new(f));

    let mut blocks = 0u32;
    let mut segments = 0u32;
    while d.find_block()? {
        blocks += 1;
        println!(
            "block {} (model memory {:.1} MiB)",
            blocks,
            d.memory_estimate() / (1 << 20) as f64
        );
        while let Some(name) = d.find_filename()? {
            let comment = d.read_comment()?;
            let sha = d.read_segment_end()?;
            segments += 1;
            println!(
                "  {} {} {}",
                String::from_utf8_lossy(&name),
                String::from_utf8_lossy(&comment),
                if sha.is_some() { "sha1" } else { "-" }
            );
        }
    }
    ui.detail(format_args!("{blocks} block(s), {segments} segment(s)"));
    Ok(())
}
