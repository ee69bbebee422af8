use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use adforge_contracts::units::GenerationUnit;
use adforge_contracts::CreativeError;
use log::{debug, warn};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Materialises every entry into one deflate-compressed ZIP buffer. The
/// buffer is returned only once the central directory is written.
pub fn build_archive(entries: &[ArchiveEntry]) -> Result<Vec<u8>, CreativeError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        writer
            .start_file(entry.name.as_str(), options)
            .map_err(|err| CreativeError::Archive(format!("{}: {err}", entry.name)))?;
        writer
            .write_all(&entry.bytes)
            .map_err(|err| CreativeError::Archive(format!("{}: {err}", entry.name)))?;
    }
    let cursor = writer
        .finish()
        .map_err(|err| CreativeError::Archive(err.to_string()))?;
    Ok(cursor.into_inner())
}

/// Files written for one finished unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUnit {
    pub index: usize,
    pub image_path: PathBuf,
    pub caption_path: PathBuf,
}

/// Per-request scratch directory. Dropping it removes whatever is left.
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    pub fn create() -> Result<Self, CreativeError> {
        let dir = tempfile::Builder::new().prefix("adforge-").tempdir()?;
        debug!("staging directory {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn stage(&self, unit: &GenerationUnit) -> Result<StagedUnit, CreativeError> {
        let (Some(image), Some(caption)) = (unit.image.as_ref(), unit.caption.as_ref()) else {
            return Err(CreativeError::Validation(format!(
                "unit {} is not complete",
                unit.index
            )));
        };
        let image_path = self.path().join(unit.image_file_name());
        let caption_path = self.path().join(unit.caption_file_name());
        fs::write(&image_path, image)?;
        if let Err(err) = fs::write(&caption_path, caption) {
            remove_quietly(&image_path);
            return Err(err.into());
        }
        Ok(StagedUnit {
            index: unit.index,
            image_path,
            caption_path,
        })
    }

    /// Reads staged files back as archive entries in the given order.
    pub fn entries(&self, staged: &[StagedUnit]) -> Result<Vec<ArchiveEntry>, CreativeError> {
        let mut entries = Vec::with_capacity(staged.len() * 2);
        for unit in staged {
            for path in [&unit.image_path, &unit.caption_path] {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default();
                entries.push(ArchiveEntry::new(name, fs::read(path)?));
            }
        }
        Ok(entries)
    }

    /// Best-effort removal; failures are logged, never returned.
    pub fn discard(&self, staged: &StagedUnit) {
        remove_quietly(&staged.image_path);
        remove_quietly(&staged.caption_path);
    }

    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(err) = self.dir.close() {
            warn!("failed to remove staging directory {}: {err}", path.display());
        }
    }
}

fn remove_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!("failed to remove {}: {err}", path.display());
        }
    }
}
