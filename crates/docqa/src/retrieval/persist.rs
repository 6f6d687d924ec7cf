//! On-disk index bundle
//!
//! A bundle is a directory holding three files:
//! - `manifest.json`: format version, metric, dimensions, record count,
//!   creation time and SHA-256 digests of the other two files
//! - `vectors.bin`: `DQIV` magic, version, dimensions and count headers,
//!   then `count * dimensions` little-endian f32 values
//! - `docstore.json`: `{id, text, metadata}` entries in id order

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::Metadata;

use super::index::{DistanceMetric, VectorIndex, VectorRecord};

/// Current bundle format version
pub const FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const VECTORS_FILE: &str = "vectors.bin";
const DOCSTORE_FILE: &str = "docstore.json";

const MAGIC: &[u8; 4] = b"DQIV";
/// magic + version + dimensions + count
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// Bundle manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    /// Bundle format version
    pub format_version: u32,
    /// Metric the index was built with
    pub metric: DistanceMetric,
    /// Vector dimensionality, absent for an empty index
    pub dimensions: Option<usize>,
    /// Number of records
    pub record_count: u64,
    /// When the bundle was written
    pub created_at: DateTime<Utc>,
    /// SHA-256 of `vectors.bin`, hex
    pub vectors_sha256: String,
    /// SHA-256 of `docstore.json`, hex
    pub docstore_sha256: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct DocstoreEntry {
    id: u64,
    text: String,
    metadata: Metadata,
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn encode_vectors(index: &VectorIndex) -> Vec<u8> {
    let dims = index.dimensions().unwrap_or(0);
    let mut bytes = Vec::with_capacity(HEADER_LEN + index.len() * dims * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(dims as u32).to_le_bytes());
    bytes.extend_from_slice(&(index.len() as u64).to_le_bytes());
    for record in index.records() {
        for value in &record.vector {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    bytes
}

/// Decoded `vectors.bin`
struct VectorBlock {
    dimensions: usize,
    count: usize,
    values: Vec<f32>,
}

fn decode_vectors(bytes: &[u8], location: &str) -> Result<VectorBlock> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::corrupt_index(location, "vectors.bin is shorter than its header"));
    }
    if &bytes[0..4] != MAGIC {
        return Err(Error::corrupt_index(location, "vectors.bin has a bad magic number"));
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != FORMAT_VERSION {
        return Err(Error::corrupt_index(
            location,
            format!("unsupported vectors.bin version {}", version),
        ));
    }
    let dimensions = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..20]);
    let count = usize::try_from(u64::from_le_bytes(count_bytes))
        .map_err(|_| Error::corrupt_index(location, "record count does not fit in memory"))?;

    if count > 0 && dimensions == 0 {
        return Err(Error::corrupt_index(location, "records present but dimensions is zero"));
    }

    let body = &bytes[HEADER_LEN..];
    let expected = count
        .checked_mul(dimensions)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| Error::corrupt_index(location, "vector block size overflows"))?;
    if body.len() != expected {
        return Err(Error::corrupt_index(
            location,
            format!(
                "vectors.bin body is {} bytes, expected {} for {} x {}",
                body.len(),
                expected,
                count,
                dimensions
            ),
        ));
    }

    let values = body
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok(VectorBlock {
        dimensions,
        count,
        values,
    })
}

impl IndexManifest {
    /// Read and check the manifest of the bundle at `dir`
    pub fn read(dir: &Path) -> Result<Self> {
        let location = dir.display().to_string();
        let bytes = read_part(dir, MANIFEST_FILE, &location)?;
        let manifest: IndexManifest = serde_json::from_slice(&bytes)
            .map_err(|e| Error::corrupt_index(&location, format!("unreadable manifest: {}", e)))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(Error::corrupt_index(
                &location,
                format!("unsupported format version {}", manifest.format_version),
            ));
        }
        Ok(manifest)
    }
}

/// Move the staged bundle to `dir`, replacing any bundle already there
///
/// The old bundle is moved into a temporary directory under `parent` first and
/// deleted only after the new one is in place. If it cannot be put back after a
/// failed swap, that directory is kept so the old bundle survives.
fn swap_into_place<F>(staging: &Path, dir: &Path, parent: &Path, rename: F) -> Result<()>
where
    F: Fn(&Path, &Path) -> std::io::Result<()>,
{
    if !dir.exists() {
        rename(staging, dir)?;
        return Ok(());
    }

    let previous = tempfile::Builder::new()
        .prefix(".docqa-index-old-")
        .tempdir_in(parent)?;
    let aside = previous.path().join("bundle");
    rename(dir, &aside)?;

    if let Err(e) = rename(staging, dir) {
        tracing::warn!("Bundle swap failed, restoring previous index: {}", e);
        if let Err(restore) = rename(&aside, dir) {
            let kept = previous.keep();
            tracing::error!(
                backup = %kept.join("bundle").display(),
                "Could not restore previous index: {}",
                restore
            );
            return Err(Error::Io(restore));
        }
        return Err(Error::Io(e));
    }
    // Dropping `previous` deletes the old bundle
    Ok(())
}

/// Write `data` to `path` and flush it to disk
fn write_synced(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

fn read_part(dir: &Path, name: &str, location: &str) -> Result<Vec<u8>> {
    match std::fs::read(dir.join(name)) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::corrupt_index(location, format!("missing {}", name)))
        }
        Err(e) => Err(Error::Io(e)),
    }
}

impl VectorIndex {
    /// Write the index as a bundle directory at `dir`
    ///
    /// The bundle is staged in a sibling temporary directory and renamed into
    /// place; a previous bundle at `dir` is removed only after the swap.
    pub fn save(&self, dir: &Path) -> Result<IndexManifest> {
        let parent = match dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let vectors = encode_vectors(self);
        let docstore: Vec<DocstoreEntry> = self
            .records()
            .iter()
            .map(|r| DocstoreEntry {
                id: r.id,
                text: r.text.clone(),
                metadata: r.metadata.clone(),
            })
            .collect();
        let docstore = serde_json::to_vec_pretty(&docstore)?;

        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            metric: self.metric(),
            dimensions: self.dimensions(),
            record_count: self.len() as u64,
            created_at: Utc::now(),
            vectors_sha256: sha256_hex(&vectors),
            docstore_sha256: sha256_hex(&docstore),
        };

        let staging = tempfile::Builder::new()
            .prefix(".docqa-index-")
            .tempdir_in(&parent)?;
        write_synced(&staging.path().join(VECTORS_FILE), &vectors)?;
        write_synced(&staging.path().join(DOCSTORE_FILE), &docstore)?;
        write_synced(
            &staging.path().join(MANIFEST_FILE),
            &serde_json::to_vec_pretty(&manifest)?,
        )?;

        swap_into_place(staging.path(), dir, &parent, |from, to| std::fs::rename(from, to))?;
        // Staging dir has been renamed away
        let _ = staging.keep();

        tracing::info!(
            path = %dir.display(),
            records = manifest.record_count,
            "Saved index bundle"
        );
        Ok(manifest)
    }

    /// Read a bundle directory written by [`VectorIndex::save`]
    pub fn load(dir: &Path) -> Result<Self> {
        let location = dir.display().to_string();

        let manifest = IndexManifest::read(dir)?;
        let vector_bytes = read_part(dir, VECTORS_FILE, &location)?;
        let docstore_bytes = read_part(dir, DOCSTORE_FILE, &location)?;

        let block = decode_vectors(&vector_bytes, &location)?;
        if block.count as u64 != manifest.record_count {
            return Err(Error::corrupt_index(
                &location,
                format!(
                    "vectors.bin holds {} records, manifest says {}",
                    block.count, manifest.record_count
                ),
            ));
        }
        if block.count > 0 && Some(block.dimensions) != manifest.dimensions {
            return Err(Error::corrupt_index(
                &location,
                "vectors.bin dimensions disagree with manifest",
            ));
        }

        if sha256_hex(&vector_bytes) != manifest.vectors_sha256 {
            return Err(Error::corrupt_index(&location, "vectors.bin checksum mismatch"));
        }
        if sha256_hex(&docstore_bytes) != manifest.docstore_sha256 {
            return Err(Error::corrupt_index(&location, "docstore.json checksum mismatch"));
        }

        let entries: Vec<DocstoreEntry> = serde_json::from_slice(&docstore_bytes)
            .map_err(|e| Error::corrupt_index(&location, format!("unreadable docstore: {}", e)))?;
        if entries.len() != block.count {
            return Err(Error::corrupt_index(
                &location,
                format!(
                    "docstore holds {} records, vectors.bin holds {}",
                    entries.len(),
                    block.count
                ),
            ));
        }

        let mut records = Vec::with_capacity(entries.len());
        let mut vectors = block.values.chunks_exact(block.dimensions.max(1));
        for (position, entry) in entries.into_iter().enumerate() {
            if entry.id != position as u64 {
                return Err(Error::corrupt_index(
                    &location,
                    format!("record id {} found at position {}", entry.id, position),
                ));
            }
            let vector = vectors
                .next()
                .ok_or_else(|| Error::corrupt_index(&location, "vector block ended early"))?
                .to_vec();
            records.push(VectorRecord {
                id: entry.id,
                vector,
                text: entry.text,
                metadata: entry.metadata,
            });
        }

        let index = VectorIndex::from_records(manifest.metric, records)?;
        tracing::info!(
            path = %location,
            records = index.len(),
            metric = %index.metric(),
            "Loaded index bundle"
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PAGE_KEY, SOURCE_KEY};
    use tempfile::TempDir;

    fn sample_index(metric: DistanceMetric) -> VectorIndex {
        let entries = (0..5).map(|i| {
            let mut metadata = Metadata::new();
            metadata.insert(SOURCE_KEY.to_string(), format!("data/doc{}.pdf", i % 2));
            metadata.insert(PAGE_KEY.to_string(), i.to_string());
            let vector = vec![i as f32, 1.0 / (i as f32 + 1.0), -0.25, f32::MIN_POSITIVE];
            (vector, format!("chunk number {}", i), metadata)
        });
        VectorIndex::build(metric, entries).unwrap()
    }

    fn saved(index: &VectorIndex) -> (TempDir, std::path::PathBuf) {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vectorstore");
        index.save(&dir).unwrap();
        (tmp, dir)
    }

    fn assert_corrupt(dir: &Path) {
        let result = VectorIndex::load(dir);
        assert!(
            matches!(result, Err(Error::CorruptIndex { .. })),
            "expected CorruptIndex, got {:?}",
            result.map(|i| i.len())
        );
    }

    #[test]
    fn test_round_trip_exact() {
        let index = sample_index(DistanceMetric::Euclidean);
        let (_tmp, dir) = saved(&index);

        let loaded = VectorIndex::load(&dir).unwrap();
        assert_eq!(loaded.metric(), DistanceMetric::Euclidean);
        assert_eq!(loaded.dimensions(), Some(4));
        assert_eq!(loaded.records(), index.records());

        let query = [2.0, 0.3, -0.25, 0.0];
        let before: Vec<(u64, f32)> =
            index.search(&query, 3).unwrap().iter().map(|h| (h.record.id, h.score)).collect();
        let after: Vec<(u64, f32)> =
            loaded.search(&query, 3).unwrap().iter().map(|h| (h.record.id, h.score)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_empty_round_trip() {
        let index = VectorIndex::build(DistanceMetric::Cosine, Vec::new()).unwrap();
        let (_tmp, dir) = saved(&index);
        let loaded = VectorIndex::load(&dir).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.dimensions(), None);
    }

    #[test]
    fn test_manifest_contents() {
        let index = sample_index(DistanceMetric::Cosine);
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("store");
        let manifest = index.save(&dir).unwrap();

        assert_eq!(manifest.record_count, 5);
        assert_eq!(manifest.dimensions, Some(4));
        let on_disk: IndexManifest =
            serde_json::from_slice(&std::fs::read(dir.join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(on_disk, manifest);

        let vectors = std::fs::read(dir.join(VECTORS_FILE)).unwrap();
        assert_eq!(&vectors[0..4], b"DQIV");
        assert_eq!(vectors.len(), HEADER_LEN + 5 * 4 * 4);
    }

    #[test]
    fn test_save_replaces_existing_bundle() {
        let (tmp, dir) = saved(&sample_index(DistanceMetric::Cosine));
        let smaller = VectorIndex::build(
            DistanceMetric::Cosine,
            vec![(vec![1.0, 0.0], "only".to_string(), Metadata::new())],
        )
        .unwrap();
        smaller.save(&dir).unwrap();

        let loaded = VectorIndex::load(&dir).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.records()[0].text, "only");

        // No staging or backup directories left behind
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("vectorstore")]);
    }

    #[test]
    fn test_write_synced_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("part.bin");
        write_synced(&path, b"first version").unwrap();
        write_synced(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    /// Rename that fails on the given 1-based calls
    fn failing_rename(fail_on: &'static [usize]) -> impl Fn(&Path, &Path) -> std::io::Result<()> {
        let calls = std::cell::Cell::new(0);
        move |from: &Path, to: &Path| {
            calls.set(calls.get() + 1);
            if fail_on.contains(&calls.get()) {
                Err(std::io::Error::other("rename refused"))
            } else {
                std::fs::rename(from, to)
            }
        }
    }

    fn staged_copy(index: &VectorIndex, parent: &Path) -> std::path::PathBuf {
        let staged = parent.join("staged");
        index.save(&staged).unwrap();
        staged
    }

    #[test]
    fn test_failed_swap_restores_previous_bundle() {
        let (tmp, dir) = saved(&sample_index(DistanceMetric::Cosine));
        let staged = staged_copy(&sample_index(DistanceMetric::Euclidean), tmp.path());

        let result = swap_into_place(&staged, &dir, tmp.path(), failing_rename(&[2]));
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(VectorIndex::load(&dir).unwrap().metric(), DistanceMetric::Cosine);
    }

    #[test]
    fn test_failed_restore_keeps_previous_bundle() {
        let (tmp, dir) = saved(&sample_index(DistanceMetric::Cosine));
        let staged = staged_copy(&sample_index(DistanceMetric::Euclidean), tmp.path());

        let result = swap_into_place(&staged, &dir, tmp.path(), failing_rename(&[2, 3]));
        assert!(matches!(result, Err(Error::Io(_))));
        assert!(!dir.exists());

        let backup = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with(".docqa-index-old-"))
                    .unwrap_or(false)
            })
            .expect("backup directory kept");
        let previous = VectorIndex::load(&backup.join("bundle")).unwrap();
        assert_eq!(previous.metric(), DistanceMetric::Cosine);
        assert_eq!(previous.len(), 5);
    }

    #[test]
    fn test_missing_bundle_and_files() {
        let tmp = TempDir::new().unwrap();
        assert_corrupt(&tmp.path().join("nothing-here"));

        for name in [MANIFEST_FILE, VECTORS_FILE, DOCSTORE_FILE] {
            let (_tmp, dir) = saved(&sample_index(DistanceMetric::Cosine));
            std::fs::remove_file(dir.join(name)).unwrap();
            assert_corrupt(&dir);
        }
    }

    #[test]
    fn test_truncated_vectors() {
        let (_tmp, dir) = saved(&sample_index(DistanceMetric::Cosine));
        let path = dir.join(VECTORS_FILE);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 6]).unwrap();
        assert_corrupt(&dir);

        std::fs::write(&path, &bytes[..10]).unwrap();
        assert_corrupt(&dir);
    }

    #[test]
    fn test_bad_magic_and_version() {
        let (_tmp, dir) = saved(&sample_index(DistanceMetric::Cosine));
        let path = dir.join(VECTORS_FILE);
        let original = std::fs::read(&path).unwrap();

        let mut bad_magic = original.clone();
        bad_magic[0..4].copy_from_slice(b"XXXX");
        std::fs::write(&path, &bad_magic).unwrap();
        assert_corrupt(&dir);

        let mut bad_version = original;
        bad_version[4..8].copy_from_slice(&99u32.to_le_bytes());
        std::fs::write(&path, &bad_version).unwrap();
        assert_corrupt(&dir);
    }

    #[test]
    fn test_count_mismatch() {
        let (_tmp, dir) = saved(&sample_index(DistanceMetric::Cosine));
        let path = dir.join(MANIFEST_FILE);
        let mut manifest: IndexManifest =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        manifest.record_count = 4;
        std::fs::write(&path, serde_json::to_vec(&manifest).unwrap()).unwrap();
        assert_corrupt(&dir);
    }

    #[test]
    fn test_docstore_length_mismatch() {
        let (_tmp, dir) = saved(&sample_index(DistanceMetric::Cosine));
        let docstore_path = dir.join(DOCSTORE_FILE);
        let mut entries: Vec<DocstoreEntry> =
            serde_json::from_slice(&std::fs::read(&docstore_path).unwrap()).unwrap();
        entries.pop();
        let bytes = serde_json::to_vec(&entries).unwrap();
        std::fs::write(&docstore_path, &bytes).unwrap();

        // Keep checksums consistent so the length check is what fails
        let manifest_path = dir.join(MANIFEST_FILE);
        let mut manifest: IndexManifest =
            serde_json::from_slice(&std::fs::read(&manifest_path).unwrap()).unwrap();
        manifest.docstore_sha256 = sha256_hex(&bytes);
        std::fs::write(&manifest_path, serde_json::to_vec(&manifest).unwrap()).unwrap();

        let err = VectorIndex::load(&dir).unwrap_err();
        assert!(err.to_string().contains("docstore holds 4 records"));
    }

    #[test]
    fn test_checksum_mismatch() {
        let (_tmp, dir) = saved(&sample_index(DistanceMetric::Cosine));
        let path = dir.join(VECTORS_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let err = VectorIndex::load(&dir).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_unknown_manifest_version() {
        let (_tmp, dir) = saved(&sample_index(DistanceMetric::Cosine));
        let path = dir.join(MANIFEST_FILE);
        let mut manifest: IndexManifest =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        manifest.format_version = 7;
        std::fs::write(&path, serde_json::to_vec(&manifest).unwrap()).unwrap();
        assert_corrupt(&dir);
    }
}
