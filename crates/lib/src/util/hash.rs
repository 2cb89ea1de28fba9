//! Content hashing for incremental builds.
//!
//! This module provides:
//! - `Fingerprint`: a full SHA-256 over the inputs that decide an output
//! - `Fingerprintable`: fingerprints any serializable description
//! - `hash_file()` / `hash_bytes()`: content hashes
//! - sidecar helpers that persist a fingerprint next to the output it describes

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::{FINGERPRINT_EXT, FINGERPRINT_LEN};

pub type HashError = serde_json::Error;

/// A 64-character lowercase hex SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl std::fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Fingerprintable: Serialize {
  fn fingerprint(&self) -> Result<Fingerprint, HashError> {
    let serialized = serde_json::to_string(self)?;
    Ok(hash_bytes(serialized.as_bytes()))
  }
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> Fingerprint {
  let mut hasher = Sha256::new();
  hasher.update(data);
  Fingerprint(format!("{:x}", hasher.finalize()))
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> io::Result<Fingerprint> {
  let mut file = fs::File::open(path)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(Fingerprint(format!("{:x}", hasher.finalize())))
}

/// Path of the fingerprint sidecar for `output` (`a.o` -> `a.o.fp`).
pub fn sidecar_path(output: &Path) -> PathBuf {
  let mut name = output.as_os_str().to_os_string();
  name.push(".");
  name.push(FINGERPRINT_EXT);
  PathBuf::from(name)
}

/// Read the stored fingerprint of `output`.
///
/// Returns `None` if the sidecar is missing or malformed.
pub fn read_fingerprint(output: &Path) -> Option<Fingerprint> {
  let content = fs::read_to_string(sidecar_path(output)).ok()?;
  let value = content.trim();
  (value.len() == FINGERPRINT_LEN && value.chars().all(|c| c.is_ascii_hexdigit())).then(|| Fingerprint(value.to_string()))
}

pub fn write_fingerprint(output: &Path, fingerprint: &Fingerprint) -> io::Result<()> {
  fs::write(sidecar_path(output), format!("{}\n", fingerprint.0))
}

/// Whether `output` exists and was produced from inputs matching `fingerprint`.
pub fn is_fresh(output: &Path, fingerprint: &Fingerprint) -> bool {
  output.exists() && read_fingerprint(output).as_ref() == Some(fingerprint)
}
