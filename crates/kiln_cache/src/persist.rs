//! On-disk format of the digest cache.
//!
//! The file is a 4-byte little-endian header length, a bincode-encoded
//! [`CacheHeader`], and a bincode-encoded list of [`DigestRecord`]s. The header
//! carries magic bytes, a format version, and a checksum of the payload, so a
//! truncated or foreign file is detected and discarded rather than trusted.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use kiln_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Magic bytes identifying a Kiln digest cache file.
const CACHE_MAGIC: [u8; 4] = *b"KDGC";

/// Current format version. Increment on breaking changes to the header or
/// record layout.
pub(crate) const CACHE_FORMAT_VERSION: u32 = 2;

/// Header prepended to the record payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CacheHeader {
    /// Magic bytes: must be `b"KDGC"`.
    pub magic: [u8; 4],
    /// Format version.
    pub format_version: u32,
    /// Content hash of the payload bytes.
    pub checksum: ContentHash,
}

/// One persisted `(path, timestamp) -> digest` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DigestRecord {
    /// Raw path bytes, stored without any normalization.
    pub path: Vec<u8>,
    /// Hash the caller shards this path by; reused as-is on load.
    pub path_hash: u32,
    /// Modification time the digest was computed at.
    pub timestamp: u64,
    /// Content digest.
    pub digest: ContentHash,
    /// Unix seconds of the last time the entry was used.
    pub accessed: u64,
}

impl DigestRecord {
    pub(crate) fn path(&self) -> PathBuf {
        bytes_to_path(self.path.clone())
    }
}

#[cfg(unix)]
pub(crate) fn path_to_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(unix)]
fn bytes_to_path(bytes: Vec<u8>) -> PathBuf {
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(OsString::from_vec(bytes))
}

// Windows paths are UTF-16 and may hold unpaired surrogates, so they are
// stored as little-endian code units rather than through UTF-8.
#[cfg(windows)]
pub(crate) fn path_to_bytes(path: &Path) -> Vec<u8> {
    use std::os::windows::ffi::OsStrExt;
    path.as_os_str()
        .encode_wide()
        .flat_map(u16::to_le_bytes)
        .collect()
}

#[cfg(windows)]
fn bytes_to_path(bytes: Vec<u8>) -> PathBuf {
    use std::os::windows::ffi::OsStringExt;
    let wide: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    PathBuf::from(OsString::from_wide(&wide))
}

// Other targets only have UTF-8 paths.
#[cfg(not(any(unix, windows)))]
pub(crate) fn path_to_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

#[cfg(not(any(unix, windows)))]
fn bytes_to_path(bytes: Vec<u8>) -> PathBuf {
    PathBuf::from(OsString::from(String::from_utf8_lossy(&bytes).into_owned()))
}

fn encoding(e: impl std::fmt::Display) -> CacheError {
    CacheError::Encoding(e.to_string())
}

/// Encodes records into the on-disk byte layout.
pub(crate) fn encode(records: &[DigestRecord]) -> Result<Vec<u8>, CacheError> {
    let payload = bincode::serde::encode_to_vec(records, bincode::config::standard())
        .map_err(encoding)?;

    let header = CacheHeader {
        magic: CACHE_MAGIC,
        format_version: CACHE_FORMAT_VERSION,
        checksum: ContentHash::from_bytes(&payload),
    };
    let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
        .map_err(encoding)?;

    let header_len = u32::try_from(header_bytes.len()).map_err(encoding)?;
    let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    output.extend_from_slice(&header_len.to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(&payload);
    Ok(output)
}

/// Decodes and validates the on-disk byte layout. `path` is only used for
/// error messages.
pub(crate) fn decode(raw: &[u8], path: &Path) -> Result<Vec<DigestRecord>, CacheError> {
    let invalid = |reason: &str| CacheError::NotACache {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    // Need at least 4 bytes for the header length
    if raw.len() < 4 {
        return Err(invalid("file shorter than header length"));
    }
    let header_len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    let rest = &raw[4..];
    if rest.len() < header_len {
        return Err(invalid("truncated header"));
    }
    let (header_bytes, payload) = rest.split_at(header_len);

    let (header, _): (CacheHeader, usize) =
        bincode::serde::decode_from_slice(header_bytes, bincode::config::standard())
            .map_err(|e| invalid(&e.to_string()))?;

    if header.magic != CACHE_MAGIC {
        return Err(invalid("bad magic bytes"));
    }
    if header.format_version != CACHE_FORMAT_VERSION {
        return Err(CacheError::FormatVersion {
            path: path.to_path_buf(),
            found: header.format_version,
            supported: CACHE_FORMAT_VERSION,
        });
    }
    let actual = ContentHash::from_bytes(payload);
    if actual != header.checksum {
        return Err(CacheError::Corrupt {
            path: path.to_path_buf(),
            stored: header.checksum,
            actual,
        });
    }

    let (records, _): (Vec<DigestRecord>, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())
            .map_err(encoding)?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, timestamp: u64) -> DigestRecord {
        DigestRecord {
            path: path.as_bytes().to_vec(),
            path_hash: kiln_common::djb2_hash(path.as_bytes()),
            timestamp,
            digest: ContentHash::from_bytes(path.as_bytes()),
            accessed: 1_700_000_000,
        }
    }

    fn with_header(header: &CacheHeader, payload: &[u8]) -> Vec<u8> {
        let header_bytes =
            bincode::serde::encode_to_vec(header, bincode::config::standard()).unwrap();
        let mut output = Vec::new();
        output.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(payload);
        output
    }

    #[test]
    fn encode_decode_preserves_records() {
        let records = vec![record("src/a.c", 1), record("src/b.h", u64::MAX - 1)];
        let bytes = encode(&records).unwrap();
        let back = decode(&bytes, Path::new("digests.bin")).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn empty_record_list() {
        let bytes = encode(&[]).unwrap();
        assert!(decode(&bytes, Path::new("d")).unwrap().is_empty());
    }

    #[test]
    fn too_short_is_invalid_header() {
        let err = decode(b"AB", Path::new("d")).unwrap_err();
        assert!(matches!(err, CacheError::NotACache { .. }));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode(b"garbage data that is not a cache", Path::new("d")).is_err());
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let payload = bincode::serde::encode_to_vec(
            Vec::<DigestRecord>::new(),
            bincode::config::standard(),
        )
        .unwrap();
        let header = CacheHeader {
            magic: *b"BAAD",
            format_version: CACHE_FORMAT_VERSION,
            checksum: ContentHash::from_bytes(&payload),
        };
        let err = decode(&with_header(&header, &payload), Path::new("d")).unwrap_err();
        assert!(matches!(err, CacheError::NotACache { .. }));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let payload = bincode::serde::encode_to_vec(
            Vec::<DigestRecord>::new(),
            bincode::config::standard(),
        )
        .unwrap();
        let header = CacheHeader {
            magic: CACHE_MAGIC,
            format_version: 999,
            checksum: ContentHash::from_bytes(&payload),
        };
        let err = decode(&with_header(&header, &payload), Path::new("d")).unwrap_err();
        assert!(matches!(
            err,
            CacheError::FormatVersion { found: 999, .. }
        ));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let mut bytes = encode(&[record("src/a.c", 1)]).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let err = decode(&bytes, Path::new("d")).unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_paths_survive() {
        use std::os::unix::ffi::OsStrExt;
        let raw = b"src/\xff\xfe.c".to_vec();
        let rec = DigestRecord {
            path: raw.clone(),
            path_hash: 7,
            timestamp: 5,
            digest: ContentHash::from_bytes(b"x"),
            accessed: 0,
        };
        let back = decode(&encode(&[rec]).unwrap(), Path::new("d")).unwrap();
        assert_eq!(back[0].path().as_os_str().as_bytes(), &raw[..]);
    }

    #[cfg(windows)]
    #[test]
    fn unpaired_surrogate_paths_survive() {
        use std::os::windows::ffi::{OsStrExt, OsStringExt};
        let wide = [u16::from(b'a'), 0xD800, u16::from(b'.'), u16::from(b'c')];
        let path = PathBuf::from(OsString::from_wide(&wide));
        let rec = DigestRecord {
            path: path_to_bytes(&path),
            path_hash: 7,
            timestamp: 5,
            digest: ContentHash::from_bytes(b"x"),
            accessed: 0,
        };
        let back = decode(&encode(&[rec]).unwrap(), Path::new("d")).unwrap();
        let restored: Vec<u16> = back[0].path().as_os_str().encode_wide().collect();
        assert_eq!(restored, wide);
    }

    #[test]
    fn path_hash_is_persisted_verbatim() {
        let rec = DigestRecord {
            path: b"src/a.c".to_vec(),
            path_hash: 12_345,
            timestamp: 1,
            digest: ContentHash::from_bytes(b"a"),
            accessed: 0,
        };
        let back = decode(&encode(&[rec]).unwrap(), Path::new("d")).unwrap();
        assert_eq!(back[0].path_hash, 12_345);
    }
}
