//! Normalization and byte-stable serialization of chain documents.
//!
//! The compiler works on the generic document tree rather than the typed
//! [`crate::chain::Plan`] so that fields the interpreter does not know about
//! are carried into the artifact, and into its signature, unchanged.

use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};
use serde_yaml::{Mapping, Value as YamlValue};

use crate::chain::{
    DEFAULT_FREQUENCY_PENALTY, DEFAULT_PRESENCE_PENALTY, DEFAULT_TOP_P, META, REASONING_CHAIN,
    STEP_TYPE_LLM_CALL,
};
use crate::error::{PlanError, Result};

/// Value forced onto every `llm_call` regardless of what the author wrote.
pub const FORCED_TEMPERATURE: f64 = 0.0;

/// Coerce a parsed document into its top-level mapping.
///
/// A null document becomes an empty mapping. Anything else that is not a
/// mapping, or a `reasoning_chain` that is not a sequence, is malformed.
pub fn document_mapping(doc: &mut YamlValue) -> Result<&mut Mapping> {
    if doc.is_null() {
        *doc = YamlValue::Mapping(Mapping::new());
    }
    let map = doc
        .as_mapping_mut()
        .ok_or_else(|| PlanError::parse("chain document", "top-level document must be a mapping"))?;
    let well_formed = matches!(
        map.get(REASONING_CHAIN),
        None | Some(YamlValue::Null) | Some(YamlValue::Sequence(_))
    );
    if !well_formed {
        return Err(PlanError::parse(
            "chain document",
            "reasoning_chain must be a sequence",
        ));
    }
    Ok(map)
}

/// Force deterministic sampling on every step carrying an `llm_call` payload.
///
/// `temperature` is overwritten unconditionally; `top_p`, `presence_penalty`
/// and `frequency_penalty` are only filled in when absent.
pub fn normalize(doc: &mut YamlValue) -> Result<()> {
    let map = document_mapping(doc)?;
    let Some(YamlValue::Sequence(steps)) = map.get_mut(REASONING_CHAIN) else {
        return Ok(());
    };

    for step in steps.iter_mut() {
        let Some(llm) = step
            .get_mut(STEP_TYPE_LLM_CALL)
            .and_then(YamlValue::as_mapping_mut)
        else {
            continue;
        };

        llm.insert(
            YamlValue::String("temperature".to_string()),
            YamlValue::from(FORCED_TEMPERATURE),
        );
        for (key, default) in [
            ("top_p", DEFAULT_TOP_P),
            ("presence_penalty", DEFAULT_PRESENCE_PENALTY),
            ("frequency_penalty", DEFAULT_FREQUENCY_PENALTY),
        ] {
            if !llm.contains_key(key) {
                llm.insert(YamlValue::String(key.to_string()), YamlValue::from(default));
            }
        }
    }
    Ok(())
}

/// Drop the top-level `meta` block, keeping the order of everything else.
pub fn strip_meta(map: &mut Mapping) -> Option<YamlValue> {
    let mut removed = None;
    let mut kept = Mapping::new();
    for (k, v) in std::mem::take(map) {
        if k.as_str() == Some(META) {
            removed = Some(v);
        } else {
            kept.insert(k, v);
        }
    }
    *map = kept;
    removed
}

/// Serialize deterministic canonical bytes for signing and verification.
///
/// The top-level `meta` block is excluded, object keys are sorted
/// recursively and the output is compact JSON with UTF-8 left unescaped.
pub fn canonical_bytes(doc: &YamlValue) -> Result<Vec<u8>> {
    let mut unsigned = doc.clone();
    if let Some(map) = unsigned.as_mapping_mut() {
        strip_meta(map);
    }
    check_representable(&unsigned, "$")?;
    let mut json = serde_json::to_value(&unsigned)
        .map_err(|err| PlanError::parse("chain document (canonical form)", err))?;
    sort_value(&mut json);
    serde_json::to_vec(&json).map_err(|err| PlanError::serialize("canonical form", err))
}

/// Non-string mapping keys and non-finite numbers have no faithful JSON form.
fn check_representable(value: &YamlValue, at: &str) -> Result<()> {
    match value {
        YamlValue::Mapping(map) => {
            for (k, v) in map {
                let Some(key) = k.as_str() else {
                    return Err(PlanError::parse(
                        "chain document (canonical form)",
                        format!("non-string mapping key {k:?} at {at}"),
                    ));
                };
                check_representable(v, &format!("{at}.{key}"))?;
            }
            Ok(())
        }
        YamlValue::Sequence(items) => {
            for (idx, item) in items.iter().enumerate() {
                check_representable(item, &format!("{at}[{idx}]"))?;
            }
            Ok(())
        }
        YamlValue::Number(n) if !n.is_finite() => Err(PlanError::parse(
            "chain document (canonical form)",
            format!("non-finite number {n} at {at}"),
        )),
        YamlValue::Tagged(tagged) => check_representable(&tagged.value, at),
        _ => Ok(()),
    }
}

fn sort_value(value: &mut JsonValue) {
    match value {
        JsonValue::Object(map) => {
            let mut sorted = BTreeMap::new();
            for (k, mut v) in std::mem::take(map) {
                sort_value(&mut v);
                sorted.insert(k, v);
            }
            let mut out = Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            *map = out;
        }
        JsonValue::Array(items) => {
            for item in items {
                sort_value(item);
            }
        }
        _ => {}
    }
}
