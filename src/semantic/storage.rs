//! Binary storage for the flat vector index.
//!
//! File format: index.bin
//!
//! Header (53 bytes):
//! - magic: [u8; 4] (b"EMBX")
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimension: u32 (little-endian)
//! - vector_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Payload:
//! - vectors: [f32; dimension * vector_count] (little-endian, insertion order)
//!
//! Trailer (4 bytes):
//! - payload_checksum: u32 (CRC32 of payload bytes)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::semantic::index::{IndexError, VectorIndex};

/// File magic
const MAGIC: [u8; 4] = *b"EMBX";

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: magic(4) + version(1) + model_id(32) + dimension(4) + vector_count(8) + checksum(4)
const HEADER_SIZE: usize = 53;

/// Offset of the header checksum
const CHECKSUM_OFFSET: usize = HEADER_SIZE - 4;

const TRAILER_SIZE: u64 = 4;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Stored index is invalid: {0}")]
    Index(#[from] IndexError),
}

/// An index read back from disk together with the model that produced it.
#[allow(dead_code)]
#[derive(Debug)]
pub struct StoredIndex {
    pub model_id: [u8; 32],
    pub index: VectorIndex,
}

/// Storage manager for the vector index file.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    /// Create a new storage manager for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Get the storage file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the vector index from storage.
    ///
    /// # Arguments
    /// * `expected_model_id` - When set, the file must have been written for this model
    #[allow(dead_code)]
    pub fn load(
        &self,
        expected_model_id: Option<&[u8; 32]>,
    ) -> Result<StoredIndex, VectorStorageError> {
        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let header = Self::read_header(&mut reader)?;

        if let Some(expected) = expected_model_id {
            if header.model_id != *expected {
                return Err(VectorStorageError::ModelMismatch);
            }
        }

        let payload_len = header.payload_len()?;
        let expected_len = (HEADER_SIZE as u64)
            .checked_add(payload_len)
            .and_then(|len| len.checked_add(TRAILER_SIZE))
            .ok_or_else(|| VectorStorageError::InvalidFormat("vector count overflow".into()))?;
        if file_len != expected_len {
            return Err(VectorStorageError::InvalidFormat(format!(
                "expected {} bytes, file has {}",
                expected_len, file_len
            )));
        }

        let mut payload = vec![0u8; payload_len as usize];
        reader.read_exact(&mut payload)?;

        let mut trailer = [0u8; 4];
        reader.read_exact(&mut trailer)?;
        if u32::from_le_bytes(trailer) != crc32fast::hash(&payload) {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        let values: Vec<f32> = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let vectors: Vec<&[f32]> = values.chunks_exact(header.dimension as usize).collect();

        let mut index =
            VectorIndex::with_capacity(header.dimension as usize, header.vector_count as usize)?;
        index.add(&vectors)?;

        Ok(StoredIndex {
            model_id: header.model_id,
            index,
        })
    }

    /// Save the vector index to storage.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save(&self, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("tmp");

        let result = Self::write_to_file(&temp_path, index, model_id);

        if result.is_err() {
            // Clean up temp file on error
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        if let Err(err) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err.into());
        }

        log::debug!(
            "Saved {} vectors (dimension {}) to {}",
            index.len(),
            index.dimension(),
            self.path.display()
        );

        Ok(())
    }

    fn write_to_file(
        path: &Path,
        index: &VectorIndex,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let dimension = u32::try_from(index.dimension()).map_err(|_| {
            VectorStorageError::InvalidFormat(format!(
                "dimension {} does not fit the file format",
                index.dimension()
            ))
        })?;

        let header = Header {
            model_id: *model_id,
            dimension,
            vector_count: index.len() as u64,
        };
        writer.write_all(&header.encode())?;

        let mut hasher = crc32fast::Hasher::new();
        for value in index.as_flat() {
            let bytes = value.to_le_bytes();
            hasher.update(&bytes);
            writer.write_all(&bytes)?;
        }
        writer.write_all(&hasher.finalize().to_le_bytes())?;

        // Flush and sync
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        Ok(())
    }

    fn read_header<R: Read>(reader: &mut R) -> Result<Header, VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                VectorStorageError::InvalidFormat("file shorter than header".into())
            } else {
                e.into()
            }
        })?;

        if header_bytes[0..4] != MAGIC {
            return Err(VectorStorageError::InvalidFormat("bad magic".into()));
        }

        let version = header_bytes[4];
        if version > FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let stored_checksum = u32::from_le_bytes(le_array(&header_bytes[CHECKSUM_OFFSET..]));
        if stored_checksum != crc32fast::hash(&header_bytes[..CHECKSUM_OFFSET]) {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        let mut model_id = [0u8; 32];
        model_id.copy_from_slice(&header_bytes[5..37]);

        let header = Header {
            model_id,
            dimension: u32::from_le_bytes(le_array(&header_bytes[37..41])),
            vector_count: u64::from_le_bytes(le_array(&header_bytes[41..49])),
        };

        if header.dimension == 0 {
            return Err(VectorStorageError::InvalidFormat("zero dimension".into()));
        }

        Ok(header)
    }
}

/// Copy a fixed-size prefix out of a header slice.
fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// File header structure.
#[derive(Debug)]
struct Header {
    model_id: [u8; 32],
    dimension: u32,
    vector_count: u64,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&MAGIC);
        bytes[4] = FORMAT_VERSION;
        bytes[5..37].copy_from_slice(&self.model_id);
        bytes[37..41].copy_from_slice(&self.dimension.to_le_bytes());
        bytes[41..49].copy_from_slice(&self.vector_count.to_le_bytes());

        let checksum = crc32fast::hash(&bytes[..CHECKSUM_OFFSET]);
        bytes[CHECKSUM_OFFSET..].copy_from_slice(&checksum.to_le_bytes());
        bytes
    }

    fn payload_len(&self) -> Result<u64, VectorStorageError> {
        self.vector_count
            .checked_mul(self.dimension as u64)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| VectorStorageError::InvalidFormat("vector count overflow".into()))
    }
}
