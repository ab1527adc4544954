//! Block-parallel extraction.
//!
//! Every block is self-describing and shares no state with its neighbors,
//! so extraction parallelizes at block granularity: one pass over the
//! archive indexes the block byte ranges by skipping segment data, then a
//! small worker pool decodes whole blocks independently. Each worker owns
//! its complete decoder; nothing is shared but the input bytes.

use std::path::Path;

use anyhow::{anyhow, Context};

use super::commands::{sanitized_path, Ui};
use crate::frame::Decompresser;
use crate::io::{IoWriter, SliceReader};

/// Extract all blocks of an in-memory archive with `jobs` worker threads
/// (0 = one per core).
pub fn extract_parallel(
    data: &[u8],
    outdir: &Path,
    force: bool,
    verify: bool,
    jobs: usize,
    ui: Ui,
) -> anyhow::Result<()> {
    // Pass 1: index block byte ranges without decoding.
    let mut ranges = Vec::new();
    {
        let mut d = Decompresser::new(SliceReader::new(data));
        d.verify_checksums(false);
        let mut start = 0usize;
        while d.find_block()? {
            while d.find_filename()?.is_some() {
                d.read_comment()?;
                d.read_segment_end()?;
            }
            let end = d.input().position();
            ranges.push(start..end);
            start = end;
        }
    }
    if ranges.is_empty() {
        return Ok(());
    }

    let jobs = if jobs == 0 { num_cpus::get() } else { jobs };
    let jobs = jobs.min(ranges.len());
    let (tx, rx) = crossbeam_channel::unbounded::<usize>();
    for i in 0..ranges.len() {
        tx.send(i).expect("queue send");
    }
    drop(tx);

    let files = std::thread::scope(|s| -> anyhow::Result<u32> {
        let mut workers = Vec::new();
        for _ in 0..jobs {
            let rx = rx.clone();
            let ranges = &ranges;
            workers.push(s.spawn(move || -> anyhow::Result<u32> {
                let mut files = 0u32;
                while let Ok(i) = rx.recv() {
                    files += extract_block(&data[ranges[i].clone()], outdir, force, verify)?;
                }
                Ok(files)
            }));
        }
        let mut files = 0u32;
        for w in workers {
            files += w.join().map_err(|_| anyhow!("extraction worker panicked"))??;
        }
        Ok(files)
    })?;

    ui.info(format_args!(
        "extracted {files} file(s) from {} block(s) on {jobs} thread(s)",
        ranges.len()
    ));
    Ok(())
}

/// Decode one block's byte window, writing its named segments.
fn extract_block(window: &[u8], outdir: &Path, force: bool, verify: bool) -> anyhow::Result<u32> {
    let mut d = Decompresser::new(SliceReader::new(window));
    d.verify_checksums(verify);
    let mut files = 0u32;
    if !d.find_block()? {
        return Ok(0);
    }
    while let Some(name) = d.find_filename()? {
        d.read_comment()?;
        let name = String::from_utf8_lossy(&name).into_owned();
        if name.is_empty() {
            anyhow::bail!("archive contains an unnamed segment");
        }
        let path = sanitized_path(outdir, &name)?;
        if path.exists() && !force {
            anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
        }
        let file = std::fs::File::create(&path)
            .with_context(|| format!("cannot create {}", path.display()))?;
        let mut w = IoWriter::new(file);
        d.decompress_segment(&mut w)
            .with_context(|| format!("while decoding {name}"))?;
        d.read_segment_end()?;
        w.flush()?;
        files += 1;
    }
    Ok(files)
}
