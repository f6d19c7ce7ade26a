use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use tracing::debug;

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::CurateError;
use crate::fs_util;

/// Per-file sidecars sit one level below the session directory.
pub const SIDECAR_PATTERN: &str = "sub-*/ses-*/*/*.json";

const INDENT: &[u8] = b"    ";

#[derive(Debug, Clone, Serialize)]
pub struct PruneResult {
    pub scanned: usize,
    pub rewritten: usize,
    pub keys_removed: usize,
    pub files: Vec<PrunedSidecar>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrunedSidecar {
    pub path: Utf8PathBuf,
    pub removed: Vec<String>,
}

pub fn prune_sidecars(
    dataset_root: &Utf8Path,
    drop_keys: &[String],
    sink: &dyn ProgressSink,
) -> Result<PruneResult, CurateError> {
    let sidecars = fs_util::glob_sorted(&fs_util::rooted_pattern(dataset_root, SIDECAR_PATTERN))?;
    sink.event(ProgressEvent::new(format!(
        "phase=Resolve; {} sidecar(s) under {dataset_root}",
        sidecars.len()
    )));

    let mut result = PruneResult {
        scanned: 0,
        rewritten: 0,
        keys_removed: 0,
        files: Vec::new(),
    };
    for path in sidecars {
        result.scanned += 1;
        let outcome = prune_file(&path, drop_keys)?;
        if outcome.rewritten {
            result.rewritten += 1;
        }
        if !outcome.removed.is_empty() {
            result.keys_removed += outcome.removed.len();
            sink.event(ProgressEvent::new(format!(
                "phase=Prune; {} dropped {}",
                fs_util::file_name(&path)?,
                outcome.removed.join(", ")
            )));
            result.files.push(PrunedSidecar {
                path,
                removed: outcome.removed,
            });
        }
    }

    Ok(result)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneOutcome {
    pub removed: Vec<String>,
    pub rewritten: bool,
}

/// Drops `drop_keys` from one sidecar and rewrites it in canonical form. The
/// file is left alone when the canonical rendering matches what is on disk.
pub fn prune_file(path: &Utf8Path, drop_keys: &[String]) -> Result<PruneOutcome, CurateError> {
    let content = std::fs::read(path)
        .map_err(|err| CurateError::Filesystem(format!("read {path}: {err}")))?;
    let value: Value =
        serde_json::from_slice(&content).map_err(|err| CurateError::SidecarParse {
            path: path.as_std_path().to_path_buf(),
            message: err.to_string(),
        })?;
    let Value::Object(mut object) = value else {
        return Err(CurateError::NotAnObject(path.as_std_path().to_path_buf()));
    };

    let removed = drop_keys
        .iter()
        .filter(|key| object.remove(key.as_str()).is_some())
        .cloned()
        .collect::<Vec<_>>();

    let rendered = render_sidecar(&object)?;
    let rewritten = rendered != content;
    if rewritten {
        debug!("rewriting {path}");
        fs_util::write_bytes_atomic(path, &rendered)?;
    }

    Ok(PruneOutcome { removed, rewritten })
}

/// Renders with sorted keys and four-space indentation, no trailing newline.
pub fn render_sidecar(object: &Map<String, Value>) -> Result<Vec<u8>, CurateError> {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(INDENT));
    object
        .serialize(&mut serializer)
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    Ok(out)
}
