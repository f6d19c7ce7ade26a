use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::debug;

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::CurateError;
use crate::fs_util;

#[derive(Debug, Clone, Serialize)]
pub struct ExpandResult {
    pub archives: Vec<ExpandedArchive>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpandedArchive {
    pub archive: Utf8PathBuf,
    pub destination: Utf8PathBuf,
    pub entries: usize,
}

/// Extracts each archive matching `pattern` under `root` next to itself, then
/// deletes it. The first failure stops the run; archives already expanded stay
/// expanded.
pub fn expand_archives(
    root: &Utf8Path,
    pattern: &str,
    sink: &dyn ProgressSink,
) -> Result<ExpandResult, CurateError> {
    let archives = fs_util::glob_sorted(&fs_util::rooted_pattern(root, pattern))?;
    sink.event(ProgressEvent::new(format!(
        "phase=Resolve; {} archive(s) under {root}",
        archives.len()
    )));

    let mut expanded = Vec::with_capacity(archives.len());
    for archive in archives {
        let destination = archive
            .parent()
            .map(Utf8Path::to_path_buf)
            .ok_or_else(|| CurateError::Filesystem(format!("archive has no parent: {archive}")))?;

        debug!("extracting {archive} into {destination}");
        let entries = fs_util::extract_zip(&archive, &destination)?;
        fs_util::remove_file(&archive)?;

        sink.event(ProgressEvent::new(format!(
            "phase=Extract; {} ({entries} entries)",
            fs_util::file_name(&archive)?
        )));
        expanded.push(ExpandedArchive {
            archive,
            destination,
            entries,
        });
    }

    Ok(ExpandResult { archives: expanded })
}
