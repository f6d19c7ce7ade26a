//! Fixture builders shared by the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use byteorder::{ByteOrder, LittleEndian};
use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;

use mebold_curate::app::{ProgressEvent, ProgressSink};

pub const VOLUME_SHAPE: [i16; 3] = [2, 2, 2];

/// Little-endian int16 NIfTI-1 image of shape `2x2x2xn_vols`. Voxel `i` of
/// volume `t` holds `t * 100 + i`.
pub fn nifti_bytes(n_vols: i16) -> Vec<u8> {
    nifti_bytes_in::<LittleEndian>(n_vols)
}

/// [`nifti_bytes`] with every header field and voxel stored in byte order `E`.
pub fn nifti_bytes_in<E: ByteOrder>(n_vols: i16) -> Vec<u8> {
    let mut buf = vec![0u8; 352];
    E::write_i32(&mut buf[0..4], 348);
    let dim = [4, VOLUME_SHAPE[0], VOLUME_SHAPE[1], VOLUME_SHAPE[2], n_vols, 1, 1, 1];
    for (i, extent) in dim.iter().enumerate() {
        E::write_i16(&mut buf[40 + 2 * i..], *extent);
    }
    E::write_i16(&mut buf[70..], 4);
    E::write_i16(&mut buf[72..], 16);
    E::write_f32(&mut buf[108..], 352.0);
    buf[344..348].copy_from_slice(b"n+1\0");

    let voxels = VOLUME_SHAPE.iter().map(|v| *v as usize).product::<usize>();
    for t in 0..n_vols as usize {
        for i in 0..voxels {
            let mut cell = [0u8; 2];
            E::write_i16(&mut cell, (t * 100 + i) as i16);
            buf.extend_from_slice(&cell);
        }
    }
    buf
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

pub fn write_nifti_gz(path: &Utf8Path, n_vols: i16) {
    std::fs::write(path, gzip(&nifti_bytes(n_vols))).unwrap();
}

pub fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

/// Creates `sub-<sub>/ses-<ses>/{anat,fmap,func}` under `root`.
pub fn session_dir(root: &Utf8Path, sub: &str, ses: &str) -> Utf8PathBuf {
    let session = root.join(format!("sub-{sub}")).join(format!("ses-{ses}"));
    for modality in ["anat", "fmap", "func"] {
        std::fs::create_dir_all(session.join(modality)).unwrap();
    }
    session
}

pub fn scans_path(session: &Utf8Path) -> Utf8PathBuf {
    let ses = session.file_name().unwrap();
    let sub = session.parent().unwrap().file_name().unwrap();
    session.join(format!("{sub}_{ses}_scans.tsv"))
}

/// Writes a two-column scans file from `(filename, acq_time)` rows.
pub fn write_scans<S: AsRef<str>>(session: &Utf8Path, rows: &[(S, &str)]) {
    let mut content = String::from("filename\tacq_time\n");
    for (filename, acq_time) in rows {
        content.push_str(&format!("{}\t{acq_time}\n", filename.as_ref()));
    }
    std::fs::write(scans_path(session), content).unwrap();
}

/// A scans file with the header row only.
pub fn write_empty_scans(session: &Utf8Path) {
    write_scans::<&str>(session, &[]);
}

pub fn read_scans(session: &Utf8Path) -> Vec<Vec<String>> {
    std::fs::read_to_string(scans_path(session))
        .unwrap()
        .lines()
        .skip(1)
        .map(|line| line.split('\t').map(str::to_string).collect())
        .collect()
}

/// Every file under `root` with its content, keyed by relative path.
pub fn snapshot(root: &Utf8Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in dir.read_dir_utf8().unwrap() {
            let path = entry.unwrap().path().to_path_buf();
            if path.is_dir() {
                stack.push(path);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_string();
                files.insert(relative, std::fs::read(&path).unwrap());
            }
        }
    }
    files
}

#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn contains(&self, needle: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|message| message.contains(needle))
    }
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}
