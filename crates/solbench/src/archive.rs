//! Packs the output directory into a gzip-compressed tarball.

use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::error::{BenchError, Result};
use crate::util::{ensure_dir, ensure_exists};

pub const ARCHIVE_SUFFIX: &str = "_pipeline.tar.gz";

/// `output` → `output_pipeline.tar.gz`, placed next to the directory.
pub fn default_archive_path(output_dir: &Path) -> Result<PathBuf> {
    let name = output_dir
        .file_name()
        .ok_or_else(|| {
            BenchError::invalid(format!(
                "cannot archive {}: path has no directory name",
                output_dir.display()
            ))
        })?
        .to_string_lossy();
    Ok(output_dir.with_file_name(format!("{name}{ARCHIVE_SUFFIX}")))
}

/// Writes every file under `output_dir` into `archive_path`, rooted at the
/// directory's own name.
pub fn archive_output(output_dir: &Path, archive_path: &Path) -> Result<()> {
    ensure_exists(output_dir)?;
    if archive_path.starts_with(output_dir) {
        return Err(BenchError::invalid(format!(
            "archive {} cannot live inside the directory it packs",
            archive_path.display()
        )));
    }
    if let Some(parent) = archive_path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_dir(parent)?;
    }

    let root_name = output_dir
        .file_name()
        .map_or_else(|| PathBuf::from("output"), PathBuf::from);

    let file = File::create(archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(&root_name, output_dir)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}
