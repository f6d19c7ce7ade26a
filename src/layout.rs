//! Post-conversion repairs for one session of the dataset.
//!
//! Each step checks whether its work is already on disk before acting, so a
//! second pass over the same tree changes nothing.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::{ResolvedConfig, SplitPolicy};
use crate::domain::BidsName;
use crate::error::CurateError;
use crate::fs_util;
use crate::nifti::NiftiImage;
use crate::scans::ScansTable;

const FUNC_DIR: &str = "func";
const FMAP_DIR: &str = "fmap";
const EVENTS_SUFFIX: &str = "_events.tsv";

#[derive(Debug, Clone)]
pub struct LayoutRules {
    pub split: SplitPolicy,
    pub bold_acq_prefix: String,
    pub fmap_acq_prefix: String,
}

impl From<&ResolvedConfig> for LayoutRules {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            split: config.split.clone(),
            bold_acq_prefix: config.bold_acq_prefix.clone(),
            fmap_acq_prefix: config.fmap_acq_prefix.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FixResult {
    pub sessions: Vec<SessionReport>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReport {
    pub subject: String,
    pub session: String,
    pub events_removed: Vec<String>,
    pub events_kept: Vec<String>,
    pub renamed: Vec<Rename>,
    pub split: Vec<SplitRun>,
    pub partial: Vec<String>,
    pub fieldmaps: Vec<String>,
    pub skipped: Vec<String>,
    /// Renamed images that had no row in the scans file.
    pub unindexed: Vec<String>,
    pub rows_added: usize,
    pub scans_rewritten: bool,
}

impl SessionReport {
    pub fn changed(&self) -> bool {
        !self.events_removed.is_empty()
            || !self.renamed.is_empty()
            || !self.split.is_empty()
            || !self.fieldmaps.is_empty()
            || self.scans_rewritten
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitRun {
    pub bold: String,
    pub noise: String,
    pub volumes: usize,
    pub noise_volumes: usize,
}

pub fn fix_dataset(
    dataset_root: &Utf8Path,
    rules: &LayoutRules,
    sink: &dyn ProgressSink,
) -> Result<FixResult, CurateError> {
    let subjects = subdirs(dataset_root, "sub-*")?;
    sink.event(ProgressEvent::new(format!(
        "phase=Resolve; {} subject(s) under {dataset_root}",
        subjects.len()
    )));

    let mut sessions = Vec::new();
    for subject_dir in subjects {
        for session_dir in subdirs(&subject_dir, "ses-*")? {
            sessions.push(fix_session(&session_dir, rules, sink)?);
        }
    }
    Ok(FixResult { sessions })
}

pub fn fix_session(
    session_dir: &Utf8Path,
    rules: &LayoutRules,
    sink: &dyn ProgressSink,
) -> Result<SessionReport, CurateError> {
    let session = fs_util::file_name(session_dir)?.to_string();
    let subject = session_dir
        .parent()
        .ok_or_else(|| CurateError::Filesystem(format!("session has no subject: {session_dir}")))
        .and_then(fs_util::file_name)?
        .to_string();

    let mut fixer = SessionFixer {
        session_dir,
        rules,
        sink,
        report: SessionReport {
            subject: subject.clone(),
            session: session.clone(),
            ..SessionReport::default()
        },
    };
    fixer.note(format!("phase=Fix; {subject}/{session}"));

    fixer.remove_empty_events()?;

    let scans_path = session_dir.join(format!("{subject}_{session}_scans.tsv"));
    let mut scans = ScansTable::read(&scans_path)?;

    fixer.label_magnitude(&mut scans)?;
    fixer.label_phase(&mut scans)?;
    fixer.split_noise(&mut scans)?;
    fixer.synthesize_fieldmaps(&mut scans)?;

    scans.sort();
    fixer.report.scans_rewritten = scans.write_if_changed()?;
    Ok(fixer.report)
}

struct SessionFixer<'a> {
    session_dir: &'a Utf8Path,
    rules: &'a LayoutRules,
    sink: &'a dyn ProgressSink,
    report: SessionReport,
}

impl SessionFixer<'_> {
    fn note(&self, message: String) {
        self.sink.event(ProgressEvent::new(message));
    }

    fn skip(&mut self, message: String) {
        self.note(format!("phase=Skip; {message}"));
        self.report.skipped.push(message);
    }

    fn dir(&self, modality: &str) -> Utf8PathBuf {
        self.session_dir.join(modality)
    }

    /// Files in `modality` whose names parse as BIDS names.
    fn files(&self, modality: &str) -> Result<Vec<(Utf8PathBuf, BidsName)>, CurateError> {
        let mut files = Vec::new();
        for path in fs_util::list_files(&self.dir(modality))? {
            let parsed = fs_util::file_name(&path)?.parse::<BidsName>();
            match parsed {
                Ok(name) => files.push((path, name)),
                Err(_) => debug!("ignoring {path}"),
            }
        }
        Ok(files)
    }

    fn remove_empty_events(&mut self) -> Result<(), CurateError> {
        for path in fs_util::list_files(&self.dir(FUNC_DIR))? {
            let name = fs_util::file_name(&path)?.to_string();
            if !name.ends_with(EVENTS_SUFFIX) {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .map_err(|err| CurateError::Filesystem(format!("read {path}: {err}")))?;
            let lines = content.lines().filter(|line| !line.trim().is_empty()).count();
            if lines > 1 {
                warn!("keeping events file with data: {path}");
                self.report.events_kept.push(name);
                continue;
            }
            fs_util::remove_file(&path)?;
            self.note(format!("phase=Events; removed {name}"));
            self.report.events_removed.push(name);
        }
        Ok(())
    }

    /// `*_echo-<n>_bold.*` becomes `*_echo-<n>_part-mag_bold.*`.
    fn label_magnitude(&mut self, scans: &mut ScansTable) -> Result<(), CurateError> {
        for (path, name) in self.files(FUNC_DIR)? {
            if name.suffix() != "bold" || !name.has_entity("echo") {
                continue;
            }
            if name.has_entity("part") {
                self.skip(format!("already labelled: {name}"));
                continue;
            }
            let renamed = name.with_entity("part", "mag");
            self.rename(FUNC_DIR, &path, &name, &renamed, scans)?;
        }
        Ok(())
    }

    /// `*_phase.*` becomes `*_part-phase_bold.*`.
    fn label_phase(&mut self, scans: &mut ScansTable) -> Result<(), CurateError> {
        for (path, name) in self.files(FUNC_DIR)? {
            if name.suffix() != "phase" {
                continue;
            }
            let renamed = name.with_entity("part", "phase").with_suffix("bold");
            self.rename(FUNC_DIR, &path, &name, &renamed, scans)?;
        }
        Ok(())
    }

    fn rename(
        &mut self,
        modality: &str,
        path: &Utf8Path,
        from: &BidsName,
        to: &BidsName,
        scans: &mut ScansTable,
    ) -> Result<(), CurateError> {
        let target = path.with_file_name(to.to_string());
        if target.exists() {
            return Err(CurateError::Filesystem(format!(
                "refusing to overwrite {target} while renaming {from}"
            )));
        }
        fs_util::rename(path, &target)?;

        let old_entry = scans_entry(modality, from);
        let new_entry = scans_entry(modality, to);
        if scans.rename(&old_entry, &new_entry) == 0 && to.is_image() {
            warn!("{old_entry} is not listed in {}", scans.path());
            self.report.unindexed.push(new_entry.clone());
        }

        self.note(format!("phase=Rename; {from} -> {to}"));
        self.report.renamed.push(Rename {
            from: old_entry,
            to: new_entry,
        });
        Ok(())
    }

    /// Moves the trailing noise volumes of each full-length multi-echo run into
    /// a companion file. Runs of any other length are left whole.
    fn split_noise(&mut self, scans: &mut ScansTable) -> Result<(), CurateError> {
        let rules = self.rules;
        let policy = &rules.split;
        for (path, name) in self.files(FUNC_DIR)? {
            if name.extension() != "nii.gz"
                || name.suffix() != "bold"
                || !name.acq_starts_with(&rules.bold_acq_prefix)
            {
                continue;
            }

            let noise = name.with_suffix(&policy.noise_suffix);
            let noise_path = path.with_file_name(noise.to_string());
            if noise_path.exists() {
                self.skip(format!("file exists: {noise}"));
                continue;
            }

            let image = NiftiImage::read(&path)?;
            let volumes = image.n_volumes();
            if !policy.is_full_run(volumes) {
                self.note(format!("phase=Skip; partial scan: {name} ({volumes} volumes)"));
                self.report.partial.push(name.to_string());
                continue;
            }

            let bold_entry = scans_entry(FUNC_DIR, &name);
            let noise_entry = scans_entry(FUNC_DIR, &noise);
            if !scans.contains(&bold_entry) {
                return Err(CurateError::ScansRowMissing(bold_entry));
            }

            let (bold_image, noise_image) = image
                .split_trailing(policy.noise_volumes)
                .map_err(|message| CurateError::Nifti {
                    path: path.as_std_path().to_path_buf(),
                    message,
                })?;
            write_split(&path, &bold_image, &noise_path, &noise_image)?;

            let sidecar = path.with_file_name(name.with_extension("json").to_string());
            if sidecar.is_file() {
                let noise_sidecar =
                    path.with_file_name(noise.with_extension("json").to_string());
                fs_util::copy_file_atomic(&sidecar, &noise_sidecar)?;
            } else {
                warn!("no sidecar to copy for {path}");
            }

            scans.clone_row(&bold_entry, &noise_entry)?;
            self.report.rows_added += 1;
            self.note(format!(
                "phase=Split; {name} -> {} + {} volumes",
                volumes - policy.noise_volumes,
                policy.noise_volumes
            ));
            self.report.split.push(SplitRun {
                bold: bold_entry,
                noise: noise_entry,
                volumes,
                noise_volumes: policy.noise_volumes,
            });
        }
        Ok(())
    }

    /// Copies echo 1 of each multi-echo field-map reference to a single-echo
    /// `_epi` field map.
    fn synthesize_fieldmaps(&mut self, scans: &mut ScansTable) -> Result<(), CurateError> {
        for (path, name) in self.files(FMAP_DIR)? {
            if name.suffix() != "sbref"
                || name.entity("echo") != Some("1")
                || !name.acq_starts_with(&self.rules.fmap_acq_prefix)
            {
                continue;
            }

            let target = name.without_entity("echo").with_suffix("epi");
            let target_path = path.with_file_name(target.to_string());
            if target_path.exists() {
                self.skip(format!("file exists: {target}"));
                continue;
            }

            let source_entry = scans_entry(FMAP_DIR, &name);
            let target_entry = scans_entry(FMAP_DIR, &target);
            if name.is_image() && !scans.contains(&source_entry) {
                return Err(CurateError::ScansRowMissing(source_entry));
            }

            fs_util::copy_file_atomic(&path, &target_path)?;
            if name.is_image() {
                scans.clone_row(&source_entry, &target_entry)?;
                self.report.rows_added += 1;
            }
            self.note(format!("phase=Fieldmap; {name} -> {target}"));
            self.report.fieldmaps.push(target_entry);
        }
        Ok(())
    }
}

/// Writes the noise part, then truncates the run. The run keeps every volume
/// until its tail is on disk.
fn write_split(
    bold_path: &Utf8Path,
    bold: &NiftiImage,
    noise_path: &Utf8Path,
    noise: &NiftiImage,
) -> Result<(), CurateError> {
    noise.write(noise_path)?;
    fs_util::copy_permissions(bold_path, noise_path)?;
    bold.write(bold_path)
}

/// The `filename` column value for a file: modality folder plus file name.
fn scans_entry(modality: &str, name: &BidsName) -> String {
    format!("{modality}/{name}")
}

fn subdirs(root: &Utf8Path, pattern: &str) -> Result<Vec<Utf8PathBuf>, CurateError> {
    Ok(fs_util::glob_sorted(&fs_util::rooted_pattern(root, pattern))?
        .into_iter()
        .filter(|path| path.is_dir())
        .collect())
}
