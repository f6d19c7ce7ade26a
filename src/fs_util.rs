use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use zip::ZipArchive;

use crate::error::CurateError;

/// Extracts every entry of `zip_path` below `target_dir` and returns the
/// number of files written.
pub fn extract_zip(zip_path: &Utf8Path, target_dir: &Utf8Path) -> Result<usize, CurateError> {
    let archive_err = |message: String| CurateError::Archive {
        path: zip_path.as_std_path().to_path_buf(),
        message,
    };

    let file = fs::File::open(zip_path).map_err(|err| archive_err(format!("open: {err}")))?;
    let mut archive = ZipArchive::new(file).map_err(|err| archive_err(err.to_string()))?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| archive_err(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.as_std_path().join(path),
            None => {
                return Err(archive_err(format!(
                    "entry {} escapes the destination directory",
                    entry.name()
                )));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| CurateError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| CurateError::Filesystem(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| CurateError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| archive_err(err.to_string()))?;
        written += 1;
    }
    Ok(written)
}

/// Expands `pattern` and returns the matching paths in lexicographic order.
pub fn glob_sorted(pattern: &str) -> Result<Vec<Utf8PathBuf>, CurateError> {
    let paths = glob::glob(pattern).map_err(|err| CurateError::Pattern(err.to_string()))?;
    let mut items = Vec::new();
    for path in paths {
        let path = path.map_err(|err| CurateError::Filesystem(err.to_string()))?;
        let path = Utf8PathBuf::from_path_buf(path)
            .map_err(|path| CurateError::Filesystem(format!("non-utf8 path: {}", path.display())))?;
        items.push(path);
    }
    items.sort();
    Ok(items)
}

/// Joins an escaped `root` with a relative glob `pattern`.
pub fn rooted_pattern(root: &Utf8Path, pattern: &str) -> String {
    let root = glob::Pattern::escape(root.as_str());
    format!("{}/{}", root.trim_end_matches('/'), pattern)
}

/// Lists the regular files directly inside `dir`, sorted by name. A missing
/// directory yields an empty list.
pub fn list_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, CurateError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut items = Vec::new();
    let entries = dir
        .read_dir_utf8()
        .map_err(|err| CurateError::Filesystem(format!("read {dir}: {err}")))?;
    for entry in entries {
        let entry = entry.map_err(|err| CurateError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if path.is_file() {
            items.push(path.to_path_buf());
        }
    }
    items.sort();
    Ok(items)
}

/// Writes `content` to a temporary file beside `path` and renames it into place.
/// An existing file's permissions carry over to the replacement.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CurateError> {
    let parent = path
        .parent()
        .ok_or_else(|| CurateError::Filesystem(format!("invalid destination path {path}")))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".mebold-curate")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    }
    temp.persist(path.as_std_path())
        .map_err(|err| CurateError::Filesystem(format!("persist {path}: {err}")))?;
    Ok(())
}

pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), CurateError> {
    let parent = dest
        .parent()
        .ok_or_else(|| CurateError::Filesystem(format!("invalid destination path {dest}")))?;
    let temp = tempfile::Builder::new()
        .prefix(".mebold-curate")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    fs::copy(source.as_std_path(), temp.path())
        .map_err(|err| CurateError::Filesystem(format!("copy {source}: {err}")))?;
    temp.persist(dest.as_std_path())
        .map_err(|err| CurateError::Filesystem(format!("persist {dest}: {err}")))?;
    Ok(())
}

pub fn copy_permissions(from: &Utf8Path, to: &Utf8Path) -> Result<(), CurateError> {
    let metadata =
        fs::metadata(from).map_err(|err| CurateError::Filesystem(format!("stat {from}: {err}")))?;
    fs::set_permissions(to, metadata.permissions())
        .map_err(|err| CurateError::Filesystem(format!("chmod {to}: {err}")))
}

pub fn rename(from: &Utf8Path, to: &Utf8Path) -> Result<(), CurateError> {
    fs::rename(from, to).map_err(|err| CurateError::Filesystem(format!("rename {from}: {err}")))
}

pub fn remove_file(path: &Utf8Path) -> Result<(), CurateError> {
    fs::remove_file(path).map_err(|err| CurateError::Filesystem(format!("remove {path}: {err}")))
}

pub fn file_name(path: &Utf8Path) -> Result<&str, CurateError> {
    path.file_name()
        .ok_or_else(|| CurateError::Filesystem(format!("path has no file name: {path}")))
}
