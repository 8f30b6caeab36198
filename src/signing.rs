use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde_yaml::Value as YamlValue;
use sha2::{Digest, Sha256};

use crate::canonical::{canonical_bytes, document_mapping, strip_meta};
use crate::chain::{self, Meta, META};
use crate::error::{PlanError, Result};

/// Version tag recorded as `meta.compiler`.
pub const COMPILER_TAG: &str = concat!("chainplan v", env!("CARGO_PKG_VERSION"));

/// Lowercase hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Digest of the canonical form of `doc` (meta excluded).
pub fn signature_hex(doc: &YamlValue) -> Result<String> {
    let bytes = canonical_bytes(doc)?;
    Ok(sha256_hex(&bytes))
}

/// Current UTC time as ISO-8601 with microseconds and a trailing `Z`.
pub fn compiled_at_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Build the metadata block for a freshly computed signature.
pub fn meta_for(signature: &str, compiled_at: String) -> Meta {
    Meta {
        compiled_at,
        compiler: COMPILER_TAG.to_string(),
        signature_sha256: signature.to_string(),
        deterministic_sampling: true,
    }
}

/// Replace any existing `meta` block with `meta`, appended last.
pub fn stamp(doc: &mut YamlValue, meta: &Meta) -> Result<()> {
    let encoded = serde_yaml::to_value(meta).map_err(|err| PlanError::serialize(META, err))?;
    let map = document_mapping(doc)?;
    strip_meta(map);
    map.insert(YamlValue::String(META.to_string()), encoded);
    Ok(())
}

/// Verify that a parsed artifact's recorded signature matches its content.
///
/// Returns the verified signature. `origin` is used for error messages.
pub fn verify_doc(doc: &YamlValue, origin: &Path) -> Result<String> {
    let expected = doc
        .get(META)
        .and_then(|m| m.get("signature_sha256"))
        .and_then(YamlValue::as_str)
        .ok_or_else(|| PlanError::Unsigned {
            path: origin.to_path_buf(),
        })?
        .to_string();

    let actual = signature_hex(doc)?;
    if !expected.eq_ignore_ascii_case(&actual) {
        return Err(PlanError::SignatureMismatch { expected, actual });
    }
    Ok(actual)
}

/// Load an artifact from disk and verify its signature.
pub fn verify_file(path: &Path) -> Result<String> {
    let doc = chain::load_document(path)?;
    verify_doc(&doc, path)
}
