//! File-backed region and column store.
//!
//! Layout inside the store directory:
//! ```text
//! world.meta.json            - format name and schema version
//! regions/
//!   <x>.<y>.<z>.cbor.zst     - one CBOR+zstd envelope per region
//! columns/
//!   <x>.<z>.cbor.zst         - one CBOR+zstd envelope per column
//! ```
//!
//! Every envelope carries the sha256 of its CBOR body, checked on load.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use strata_common::{ColumnPos, REGION_EDGE, RegionPos};
use strata_world::{ColumnRecord, RegionRecord, Store, StoreError};

/// Current on-disk schema version.
const STORE_SCHEMA_VERSION: u32 = 1;
const STORE_FORMAT: &str = "strata-regions";
const RECORD_SUFFIX: &str = ".cbor.zst";

/// Metadata stored in world.meta.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub format: String,
    pub schema_version: u32,
    pub region_edge: i32,
}

/// Wrapper written around every record.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    schema_version: u32,
    sha256: String,
    body: Vec<u8>,
}

/// Directory-backed [`Store`]; one file per region and per column.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    meta: StoreMeta,
}

impl FileStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("regions"))?;
        std::fs::create_dir_all(root.join("columns"))?;

        let meta_path = root.join("world.meta.json");
        let meta = if meta_path.exists() {
            let meta: StoreMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
            if meta.schema_version != STORE_SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    file_version: meta.schema_version,
                    expected_version: STORE_SCHEMA_VERSION,
                });
            }
            if meta.region_edge != REGION_EDGE {
                return Err(StoreError::IntegrityMismatch {
                    expected: format!("region edge {REGION_EDGE}"),
                    actual: format!("region edge {}", meta.region_edge),
                });
            }
            meta
        } else {
            let meta = StoreMeta {
                format: STORE_FORMAT.into(),
                schema_version: STORE_SCHEMA_VERSION,
                region_edge: REGION_EDGE,
            };
            serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, &meta)?;
            meta
        };

        tracing::debug!(root = %root.display(), "opened region store");
        Ok(Self { root, meta })
    }

    /// Get the path to the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the metadata.
    pub fn meta(&self) -> &StoreMeta {
        &self.meta
    }

    /// Number of region files on disk.
    pub fn region_count(&self) -> Result<usize, StoreError> {
        count_records(&self.root.join("regions"))
    }

    /// Number of column files on disk.
    pub fn column_count(&self) -> Result<usize, StoreError> {
        count_records(&self.root.join("columns"))
    }

    fn region_path(&self, pos: RegionPos) -> PathBuf {
        self.root
            .join("regions")
            .join(format!("{}.{}.{}{RECORD_SUFFIX}", pos.x, pos.y, pos.z))
    }

    fn column_path(&self, pos: ColumnPos) -> PathBuf {
        self.root
            .join("columns")
            .join(format!("{}.{}{RECORD_SUFFIX}", pos.x, pos.z))
    }
}

impl Store for FileStore {
    fn load_region(&self, pos: RegionPos) -> Result<Option<RegionRecord>, StoreError> {
        let record: Option<RegionRecord> = read_record(&self.region_path(pos))?;
        match record {
            Some(record) if record.pos != pos => Err(StoreError::IntegrityMismatch {
                expected: format!("region {pos}"),
                actual: format!("region {}", record.pos),
            }),
            other => Ok(other),
        }
    }

    fn load_column(&self, pos: ColumnPos) -> Result<Option<ColumnRecord>, StoreError> {
        let record: Option<ColumnRecord> = read_record(&self.column_path(pos))?;
        match record {
            Some(record) if record.pos != pos => Err(StoreError::IntegrityMismatch {
                expected: format!("column {pos}"),
                actual: format!("column {}", record.pos),
            }),
            other => Ok(other),
        }
    }

    fn save_region(&self, record: &RegionRecord) -> Result<(), StoreError> {
        write_record(&self.region_path(record.pos), record)
    }

    fn save_column(&self, record: &ColumnRecord) -> Result<(), StoreError> {
        write_record(&self.column_path(record.pos), record)
    }
}

fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<(), StoreError> {
    let body = cbor_serialize(record)?;
    let envelope = Envelope {
        schema_version: STORE_SCHEMA_VERSION,
        sha256: sha256_hex(&body),
        body,
    };
    let compressed = zstd_compress(&cbor_serialize(&envelope)?)?;

    // Write beside the target and rename so readers never see a partial file.
    let tmp = path.with_extension("zst.tmp");
    std::fs::write(&tmp, &compressed)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn read_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let compressed = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let envelope: Envelope = cbor_deserialize(&zstd_decompress(&compressed)?)?;
    if envelope.schema_version != STORE_SCHEMA_VERSION {
        return Err(StoreError::SchemaMismatch {
            file_version: envelope.schema_version,
            expected_version: STORE_SCHEMA_VERSION,
        });
    }
    let actual = sha256_hex(&envelope.body);
    if actual != envelope.sha256 {
        return Err(StoreError::IntegrityMismatch {
            expected: envelope.sha256,
            actual,
        });
    }
    cbor_deserialize(&envelope.body).map(Some)
}

fn count_records(dir: &Path) -> Result<usize, StoreError> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        if entry?.file_name().to_string_lossy().ends_with(RECORD_SUFFIX) {
            count += 1;
        }
    }
    Ok(count)
}

fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn cbor_deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(data).map_err(|e| StoreError::CborDecode(e.to_string()))
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
