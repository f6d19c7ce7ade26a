//! Single-file NIfTI-1 images split along the last axis.
//!
//! Header parsing and voxel loading go through the `nifti` crate. Voxels are
//! never converted: NIfTI stores them in Fortran order, so every slice of the
//! last axis is one contiguous block of raw bytes. The header and extension
//! bytes are written back as read, with only the extent of the last dimension
//! patched, which keeps the datatype, scaling and extensions unchanged.

use std::io::{Read, Write};
use std::ops::Range;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use camino::Utf8Path;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use nifti::{InMemNiftiVolume, NiftiHeader};

use crate::error::CurateError;
use crate::fs_util;

const NIFTI1_HEADER_SIZE: i32 = 348;
const MIN_VOX_OFFSET: usize = 352;
const DIM_OFFSET: usize = 40;
const SINGLE_FILE_MAGIC: &[u8; 4] = b"n+1\0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NiftiImage {
    /// Header plus any extension bytes, up to `vox_offset`.
    raw_header: Vec<u8>,
    data: Vec<u8>,
    big_endian: bool,
    shape: Vec<usize>,
    voxel_bytes: usize,
}

impl NiftiImage {
    /// Reads a `.nii` or `.nii.gz` file. Compression is detected from the
    /// content, and every gzip member is decoded.
    pub fn read(path: &Utf8Path) -> Result<Self, CurateError> {
        let raw = std::fs::read(path)
            .map_err(|err| CurateError::Filesystem(format!("read {path}: {err}")))?;
        let bytes = if is_gzip(&raw) {
            let mut decoded = Vec::new();
            MultiGzDecoder::new(raw.as_slice())
                .read_to_end(&mut decoded)
                .map_err(|err| nifti_err(path, format!("gunzip: {err}")))?;
            decoded
        } else {
            raw
        };
        Self::from_bytes(&bytes).map_err(|message| nifti_err(path, message))
    }

    /// Writes the image, gzip-compressed when `path` ends in `.gz`.
    pub fn write(&self, path: &Utf8Path) -> Result<(), CurateError> {
        let bytes = self.to_bytes();
        let content = if path.as_str().ends_with(".gz") {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(&bytes)
                .map_err(|err| nifti_err(path, format!("gzip: {err}")))?;
            encoder
                .finish()
                .map_err(|err| nifti_err(path, format!("gzip: {err}")))?
        } else {
            bytes
        };
        fs_util::write_bytes_atomic(path, &content)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        let header = NiftiHeader::from_reader(bytes)
            .map_err(|err| format!("failed to read NIfTI header: {err}"))?;
        if header.sizeof_hdr != NIFTI1_HEADER_SIZE {
            return Err(format!("unsupported sizeof_hdr {}", header.sizeof_hdr));
        }
        if &header.magic != SINGLE_FILE_MAGIC {
            return Err(format!(
                "expected single-file magic 'n+1', got {:?}",
                String::from_utf8_lossy(&header.magic)
            ));
        }

        let shape = checked_shape(&header)?;
        let voxel_bytes = match header.bitpix {
            bits if bits > 0 && bits % 8 == 0 => bits as usize / 8,
            bits => return Err(format!("unsupported bitpix {bits}")),
        };
        let data_len = shape
            .iter()
            .try_fold(voxel_bytes, |acc, extent| acc.checked_mul(*extent))
            .ok_or_else(|| format!("image of shape {shape:?} is too large"))?;
        let vox_offset = checked_vox_offset(header.vox_offset, bytes.len())?;
        let data_end = vox_offset
            .checked_add(data_len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| {
                format!(
                    "truncated voxel data: expected {data_len} bytes after offset {vox_offset}, found {}",
                    bytes.len() - vox_offset
                )
            })?;

        let volume = InMemNiftiVolume::from_reader(&bytes[vox_offset..data_end], &header)
            .map_err(|err| format!("failed to read voxel data: {err}"))?;
        let data = volume.into_raw_data();
        if data.len() != data_len {
            return Err(format!(
                "voxel data holds {} bytes, header describes {data_len}",
                data.len()
            ));
        }

        Ok(Self {
            raw_header: bytes[..vox_offset].to_vec(),
            data,
            big_endian: LittleEndian::read_i32(bytes) != NIFTI1_HEADER_SIZE,
            shape,
            voxel_bytes,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.raw_header.len() + self.data.len());
        out.extend_from_slice(&self.raw_header);
        out.extend_from_slice(&self.data);
        out
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Extent of the last dimension.
    pub fn n_volumes(&self) -> usize {
        self.shape.last().copied().unwrap_or(1)
    }

    pub fn shape(&self) -> Vec<usize> {
        self.shape.clone()
    }

    /// Bytes occupied by one slice along the last axis.
    pub fn volume_bytes(&self) -> usize {
        // Bounded by the data length checked in `from_bytes`.
        self.shape[..self.ndim() - 1].iter().product::<usize>() * self.voxel_bytes
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn volumes(&self, range: Range<usize>) -> Result<Self, String> {
        if range.start >= range.end || range.end > self.n_volumes() {
            return Err(format!(
                "volume range {}..{} out of bounds for {} volumes",
                range.start,
                range.end,
                self.n_volumes()
            ));
        }
        let count = range.end - range.start;
        let extent = i16::try_from(count).map_err(|_| format!("too many volumes: {count}"))?;
        let step = self.volume_bytes();

        let mut raw_header = self.raw_header.clone();
        let at = DIM_OFFSET + 2 * self.ndim();
        if self.big_endian {
            BigEndian::write_i16(&mut raw_header[at..at + 2], extent);
        } else {
            LittleEndian::write_i16(&mut raw_header[at..at + 2], extent);
        }
        let mut shape = self.shape.clone();
        if let Some(last) = shape.last_mut() {
            *last = count;
        }

        Ok(Self {
            raw_header,
            data: self.data[range.start * step..range.end * step].to_vec(),
            big_endian: self.big_endian,
            shape,
            voxel_bytes: self.voxel_bytes,
        })
    }

    /// Splits off the last `count` volumes, returning `(head, tail)`.
    pub fn split_trailing(&self, count: usize) -> Result<(Self, Self), String> {
        let total = self.n_volumes();
        if count == 0 || count >= total {
            return Err(format!("cannot split {count} of {total} volumes"));
        }
        let head = self.volumes(0..total - count)?;
        let tail = self.volumes(total - count..total)?;
        Ok((head, tail))
    }
}

/// Extents of the used dimensions. Each must fit the on-disk `i16` field.
fn checked_shape(header: &NiftiHeader) -> Result<Vec<usize>, String> {
    let dim: Vec<i64> = header.dim.iter().map(|extent| i64::from(*extent)).collect();
    let ndim = dim[0];
    if !(1..=7).contains(&ndim) {
        return Err(format!("invalid dim[0] {ndim}"));
    }
    dim[1..=ndim as usize]
        .iter()
        .map(|extent| match *extent {
            e if (1..=i64::from(i16::MAX)).contains(&e) => Ok(e as usize),
            e => Err(format!("invalid dimension extent {e}")),
        })
        .collect()
}

fn checked_vox_offset(vox_offset: f32, len: usize) -> Result<usize, String> {
    let valid = vox_offset.is_finite()
        && vox_offset.fract() == 0.0
        && vox_offset >= MIN_VOX_OFFSET as f32
        && f64::from(vox_offset) <= len as f64;
    if !valid {
        return Err(format!("invalid vox_offset {vox_offset} for {len} bytes"));
    }
    Ok(vox_offset as usize)
}

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

fn nifti_err(path: &Utf8Path, message: String) -> CurateError {
    CurateError::Nifti {
        path: path.as_std_path().to_path_buf(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BITPIX_OFFSET: usize = 72;
    const VOX_OFFSET_OFFSET: usize = 108;

    fn header(dim: [i16; 8], datatype: i16, bitpix: i16) -> Vec<u8> {
        let mut buf = vec![0u8; 352];
        LittleEndian::write_i32(&mut buf[0..4], 348);
        for (i, extent) in dim.iter().enumerate() {
            LittleEndian::write_i16(&mut buf[DIM_OFFSET + 2 * i..], *extent);
        }
        LittleEndian::write_i16(&mut buf[70..], datatype);
        LittleEndian::write_i16(&mut buf[BITPIX_OFFSET..], bitpix);
        LittleEndian::write_f32(&mut buf[VOX_OFFSET_OFFSET..], 352.0);
        buf[344..348].copy_from_slice(SINGLE_FILE_MAGIC);
        buf
    }

    #[test]
    fn volume_bytes_cover_all_but_last_axis() {
        let mut bytes = header([4, 2, 3, 1, 5, 1, 1, 1], 4, 16);
        bytes.extend(std::iter::repeat_n(0u8, 2 * 3 * 5 * 2));
        let image = NiftiImage::from_bytes(&bytes).unwrap();
        assert_eq!(image.n_volumes(), 5);
        assert_eq!(image.volume_bytes(), 12);
        assert_eq!(image.shape(), vec![2, 3, 1, 5]);
    }

    #[test]
    fn rejects_truncated_data() {
        let mut bytes = header([4, 2, 2, 1, 4, 1, 1, 1], 2, 8);
        bytes.extend([0u8; 10]);
        let err = NiftiImage::from_bytes(&bytes).unwrap_err();
        assert!(err.contains("truncated"));
    }

    #[test]
    fn oversized_dimensions_are_an_error() {
        let mut bytes = header([7, 32767, 32767, 32767, 32767, 32767, 32767, 32767], 64, 64);
        bytes.extend([0u8; 64]);
        let err = NiftiImage::from_bytes(&bytes).unwrap_err();
        assert!(err.contains("too large"));
    }

    #[test]
    fn vox_offset_past_the_end_is_an_error() {
        let mut bytes = header([4, 2, 2, 2, 1, 1, 1, 1], 2, 8);
        LittleEndian::write_f32(&mut bytes[VOX_OFFSET_OFFSET..], 1e30);
        bytes.extend([0u8; 64]);
        let err = NiftiImage::from_bytes(&bytes).unwrap_err();
        assert!(err.contains("vox_offset"));
    }

    #[test]
    fn detached_header_is_rejected() {
        let mut bytes = header([4, 1, 1, 1, 1, 1, 1, 1], 2, 8);
        bytes[344..348].copy_from_slice(b"ni1\0");
        bytes.push(0);
        assert!(NiftiImage::from_bytes(&bytes).is_err());
    }
}
