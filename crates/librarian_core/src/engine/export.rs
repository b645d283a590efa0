//! Workspace export/import.
//!
//! spec calls for a gzipped tarball; nothing in this workspace's
//! dependency stack provides `tar`/`flate2`, so the archive is built the
//! same way the object store already serializes data: a postcard-framed
//! sequence of (relative path, bytes) entries, zstd-compressed as a
//! whole. `FileRecord.path` is already workspace-relative, so there is
//! no absolute-path rewriting to do on either side.

use crate::error::{LibrarianError, Result};
use crate::store::STORE_SCHEMA_VERSION;
use serde::{Deserialize, Serialize};
use std::io::Write as _;
use std::path::{Path, PathBuf};

const COMPRESSION_LEVEL: i32 = 19;

/// Metadata describing an exported `.librarian` directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    pub schema_version: u32,
    pub created_at: i64,
    pub entry_count: usize,
    pub total_bytes: u64,
}

/// What an import produced.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub files_written: usize,
    pub total_bytes: u64,
}

#[derive(Serialize, Deserialize)]
struct ArchiveEntry {
    relative_path: String,
    content: Vec<u8>,
}

/// Bundles every file under `librarian_dir` into a single zstd-compressed
/// archive at `output_path`, returning the manifest describing it.
pub fn export(librarian_dir: &Path, output_path: &Path, created_at: i64) -> Result<ExportManifest> {
    let mut entries = Vec::new();
    let mut total_bytes = 0u64;
    collect_entries(librarian_dir, librarian_dir, &mut entries)?;
    for entry in &entries {
        total_bytes += entry.content.len() as u64;
    }

    let manifest = ExportManifest {
        schema_version: STORE_SCHEMA_VERSION,
        created_at,
        entry_count: entries.len(),
        total_bytes,
    };

    let body = postcard::to_allocvec(&entries)
        .map_err(|e| LibrarianError::Serialization(e.to_string()))?;
    let compressed = zstd::encode_all(body.as_slice(), COMPRESSION_LEVEL)
        .map_err(|e| LibrarianError::Compression(e.to_string()))?;
    let manifest_json = serde_json::to_vec(&manifest)
        .map_err(|e| LibrarianError::Serialization(e.to_string()))?;

    let mut file = std::fs::File::create(output_path)?;
    file.write_all(&(manifest_json.len() as u32).to_le_bytes())?;
    file.write_all(&manifest_json)?;
    file.write_all(&compressed)?;
    file.sync_all()?;

    Ok(manifest)
}

/// Unpacks an archive produced by [`export`] into `target_librarian_dir`,
/// which must not already exist.
pub fn import(archive_path: &Path, target_librarian_dir: &Path) -> Result<ImportReport> {
    if target_librarian_dir.exists() {
        return Err(LibrarianError::InvalidArgument(format!(
            "import target {} already exists",
            target_librarian_dir.display()
        )));
    }

    let raw = std::fs::read(archive_path)?;
    if raw.len() < 4 {
        return Err(LibrarianError::InvalidArgument("archive is truncated".into()));
    }
    let header_len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    let manifest_end = 4 + header_len;
    if raw.len() < manifest_end {
        return Err(LibrarianError::InvalidArgument("archive manifest is truncated".into()));
    }
    let manifest: ExportManifest = serde_json::from_slice(&raw[4..manifest_end])
        .map_err(|e| LibrarianError::Deserialization(e.to_string()))?;
    if manifest.schema_version != STORE_SCHEMA_VERSION {
        return Err(LibrarianError::ValidationFailed(format!(
            "archive schema version {} does not match this build's {}",
            manifest.schema_version, STORE_SCHEMA_VERSION
        )));
    }

    let compressed = &raw[manifest_end..];
    let body = zstd::decode_all(compressed).map_err(|e| LibrarianError::Compression(e.to_string()))?;
    let entries: Vec<ArchiveEntry> =
        postcard::from_bytes(&body).map_err(|e| LibrarianError::Deserialization(e.to_string()))?;

    std::fs::create_dir_all(target_librarian_dir)?;
    let mut report = ImportReport::default();
    for entry in entries {
        let dest = target_librarian_dir.join(&entry.relative_path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dest, &entry.content)?;
        report.total_bytes += entry.content.len() as u64;
        report.files_written += 1;
    }

    Ok(report)
}

fn collect_entries(root: &Path, dir: &Path, entries: &mut Vec<ArchiveEntry>) -> Result<()> {
    for item in std::fs::read_dir(dir)? {
        let item = item?;
        let path = item.path();
        if path.is_dir() {
            collect_entries(root, &path, entries)?;
        } else {
            let relative_path = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            let content = std::fs::read(&path)?;
            entries.push(ArchiveEntry { relative_path, content });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn export_then_import_round_trips_file_contents() {
        let tmp = TempDir::new().unwrap();
        let source_dir = tmp.path().join("source/.librarian");
        std::fs::create_dir_all(source_dir.join("objects/ab")).unwrap();
        std::fs::write(source_dir.join("config.toml"), b"name = \"test\"\n").unwrap();
        std::fs::write(source_dir.join("objects/ab/cdef"), b"blob-bytes").unwrap();

        let archive_path = tmp.path().join("archive.bin");
        let manifest = export(&source_dir, &archive_path, 1700).unwrap();
        assert_eq!(manifest.entry_count, 2);

        let target_dir = tmp.path().join("target/.librarian");
        let report = import(&archive_path, &target_dir).unwrap();
        assert_eq!(report.files_written, 2);
        assert_eq!(
            std::fs::read(target_dir.join("objects/ab/cdef")).unwrap(),
            b"blob-bytes"
        );
        assert_eq!(
            std::fs::read_to_string(target_dir.join("config.toml")).unwrap(),
            "name = \"test\"\n"
        );
    }

    #[test]
    fn import_refuses_to_overwrite_existing_target() {
        let tmp = TempDir::new().unwrap();
        let source_dir = tmp.path().join("source/.librarian");
        std::fs::create_dir_all(&source_dir).unwrap();
        std::fs::write(source_dir.join("config.toml"), b"x").unwrap();
        let archive_path = tmp.path().join("archive.bin");
        export(&source_dir, &archive_path, 1700).unwrap();

        let target_dir = tmp.path().join("target/.librarian");
        std::fs::create_dir_all(&target_dir).unwrap();

        let result = import(&archive_path, &target_dir);
        assert!(matches!(result, Err(LibrarianError::InvalidArgument(_))));
    }

    #[test]
    fn import_rejects_mismatched_schema_version() {
        let tmp = TempDir::new().unwrap();
        let manifest = ExportManifest { schema_version: 9999, created_at: 1700, entry_count: 0, total_bytes: 0 };
        let entries: Vec<ArchiveEntry> = Vec::new();
        let body = postcard::to_allocvec(&entries).unwrap();
        let compressed = zstd::encode_all(body.as_slice(), COMPRESSION_LEVEL).unwrap();
        let manifest_json = serde_json::to_vec(&manifest).unwrap();

        let archive_path = tmp.path().join("archive.bin");
        let mut file = std::fs::File::create(&archive_path).unwrap();
        file.write_all(&(manifest_json.len() as u32).to_le_bytes()).unwrap();
        file.write_all(&manifest_json).unwrap();
        file.write_all(&compressed).unwrap();
        drop(file);

        let target_dir = tmp.path().join("target/.librarian");
        let result = import(&archive_path, &target_dir);
        assert!(matches!(result, Err(LibrarianError::ValidationFailed(_))));
    }
}
