use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::Value as YamlValue;
use tracing::{debug, info};

use crate::canonical;
use crate::chain;
use crate::error::{PlanError, Result};
use crate::signing;

/// Outcome of compiling a chain source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPlan {
    pub artifact_path: PathBuf,
    pub signature: String,
}

/// Serialization used for the written artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Yaml,
    Json,
}

impl ArtifactFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ArtifactFormat::Json,
            _ => ArtifactFormat::Yaml,
        }
    }
}

/// `chain.yaml` -> `chain.compiled.yaml`; a source without an extension
/// gets `.compiled.yaml`.
pub fn artifact_path_for(source: &Path) -> PathBuf {
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("yaml");
    source.with_extension(format!("compiled.{ext}"))
}

/// Normalize and sign a document held in memory.
///
/// Returns the stamped document (meta appended) and its signature. The
/// digest is taken before metadata is attached.
pub fn compile_document(mut doc: YamlValue) -> Result<(YamlValue, String)> {
    canonical::normalize(&mut doc)?;
    let signature = signing::signature_hex(&doc)?;
    let meta = signing::meta_for(&signature, signing::compiled_at_now());
    signing::stamp(&mut doc, &meta)?;
    Ok((doc, signature))
}

/// Parse, normalize and sign chain source text.
pub fn compile_str(text: &str) -> Result<(YamlValue, String)> {
    let doc = chain::parse_document(text, "chain source")?;
    compile_document(doc)
}

/// Render a compiled document in insertion order.
pub fn render_artifact(doc: &YamlValue, format: ArtifactFormat) -> Result<String> {
    match format {
        ArtifactFormat::Yaml => {
            serde_yaml::to_string(doc).map_err(|err| PlanError::serialize("artifact", err))
        }
        ArtifactFormat::Json => serde_json::to_string_pretty(doc)
            .map(|mut s| {
                s.push('\n');
                s
            })
            .map_err(|err| PlanError::serialize("artifact", err)),
    }
}

/// Compile `source` into a signed artifact written next to it.
///
/// Writes exactly one file. Concurrent compilations of the same source are
/// not coordinated; the last writer wins.
pub fn compile(source: &Path) -> Result<CompiledPlan> {
    let doc = chain::load_document(source)?;
    let (compiled, signature) = compile_document(doc)?;
    debug!(source = %source.display(), "normalized chain");

    let artifact_path = artifact_path_for(source);
    let rendered = render_artifact(&compiled, ArtifactFormat::for_path(source))?;
    fs::write(&artifact_path, rendered).map_err(|source| PlanError::Io {
        path: artifact_path.clone(),
        source,
    })?;

    info!(artifact = %artifact_path.display(), %signature, "compiled chain");
    Ok(CompiledPlan {
        artifact_path,
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_replaces_final_extension() {
        assert_eq!(
            artifact_path_for(Path::new("dir/chain.yaml")),
            PathBuf::from("dir/chain.compiled.yaml")
        );
        assert_eq!(
            artifact_path_for(Path::new("chain.v2.json")),
            PathBuf::from("chain.v2.compiled.json")
        );
        assert_eq!(
            artifact_path_for(Path::new("chain")),
            PathBuf::from("chain.compiled.yaml")
        );
    }

    #[test]
    fn compile_str_stamps_meta() {
        let (doc, sig) = compile_str(
            "reasoning_chain:\n  - {id: s1, type: llm_call, llm_call: {prompt: hi, temperature: 0.7}}\n",
        )
        .expect("compile");
        assert_eq!(doc["meta"]["signature_sha256"].as_str(), Some(sig.as_str()));
        assert_eq!(doc["meta"]["compiler"].as_str(), Some(signing::COMPILER_TAG));
        assert_eq!(
            doc["reasoning_chain"][0]["llm_call"]["temperature"].as_f64(),
            Some(0.0)
        );
    }

    #[test]
    fn compile_str_rejects_malformed_yaml() {
        let err = compile_str("reasoning_chain: [unclosed\n").unwrap_err();
        assert!(matches!(err, PlanError::Parse { .. }));
    }

    #[test]
    fn missing_chain_compiles_as_empty() {
        let (doc, sig) = compile_str("title: nothing here\n").expect("compile");
        assert_eq!(sig.len(), 64);
        assert_eq!(doc["title"].as_str(), Some("nothing here"));
    }

    #[test]
    fn json_rendering_keeps_insertion_order() {
        let (doc, _) =
            compile_str(r#"{"zeta": 1, "reasoning_chain": [], "alpha": 2}"#).expect("compile");
        let json = render_artifact(&doc, ArtifactFormat::Json).expect("render");
        let zeta = json.find("zeta").unwrap();
        let alpha = json.find("alpha").unwrap();
        let meta = json.find("\"meta\"").unwrap();
        assert!(zeta < alpha && alpha < meta, "json was: {json}");
    }
}
