mod common;

use std::io::Write;

use assert_matches::assert_matches;
use byteorder::{BigEndian, ByteOrder};
use flate2::Compression;
use flate2::write::GzEncoder;
use nifti::{NiftiObject, NiftiVolume, ReaderOptions};

use mebold_curate::error::CurateError;
use mebold_curate::nifti::NiftiImage;

#[test]
fn reads_gzipped_volume_count() {
    let (_temp, root) = common::utf8_tempdir();
    let path = root.join("run_bold.nii.gz");
    common::write_nifti_gz(&path, 12);

    let image = NiftiImage::read(&path).unwrap();
    assert_eq!(image.n_volumes(), 12);
    assert_eq!(image.shape(), vec![2, 2, 2, 12]);
    assert_eq!(image.volume_bytes(), 16);
}

#[test]
fn split_of_240_volumes_leaves_237_and_3() {
    let (_temp, root) = common::utf8_tempdir();
    let original = NiftiImage::from_bytes(&common::nifti_bytes(240)).unwrap();

    let (head, tail) = original.split_trailing(3).unwrap();
    assert_eq!(head.n_volumes(), 237);
    assert_eq!(tail.n_volumes(), 3);

    let head_path = root.join("head.nii.gz");
    let tail_path = root.join("tail.nii.gz");
    head.write(&head_path).unwrap();
    tail.write(&tail_path).unwrap();

    let head = NiftiImage::read(&head_path).unwrap();
    let tail = NiftiImage::read(&tail_path).unwrap();
    assert_eq!(head.n_volumes(), 237);
    assert_eq!(tail.n_volumes(), 3);

    let mut joined = head.data().to_vec();
    joined.extend_from_slice(tail.data());
    assert_eq!(joined, original.data());
}

#[test]
fn uncompressed_write_round_trips_header() {
    let (_temp, root) = common::utf8_tempdir();
    let bytes = common::nifti_bytes(4);
    let image = NiftiImage::from_bytes(&bytes).unwrap();
    let path = root.join("plain.nii");
    image.write(&path).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), bytes);
}

#[test]
fn split_rejects_taking_every_volume() {
    let image = NiftiImage::from_bytes(&common::nifti_bytes(3)).unwrap();
    assert!(image.split_trailing(3).is_err());
    assert!(image.split_trailing(0).is_err());
}

#[test]
fn garbage_file_is_a_nifti_error() {
    let (_temp, root) = common::utf8_tempdir();
    let path = root.join("broken.nii.gz");
    std::fs::write(&path, common::gzip(b"not an image")).unwrap();
    let err = NiftiImage::read(&path).unwrap_err();
    assert_matches!(err, CurateError::Nifti { .. });
}

#[test]
fn reads_every_member_of_a_multi_member_gzip() {
    let (_temp, root) = common::utf8_tempdir();
    let bytes = common::nifti_bytes(240);
    let (first, second) = bytes.split_at(400);
    let mut content = common::gzip(first);
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(second).unwrap();
    content.extend(encoder.finish().unwrap());

    let path = root.join("members_bold.nii.gz");
    std::fs::write(&path, content).unwrap();
    let image = NiftiImage::read(&path).unwrap();
    assert_eq!(image.n_volumes(), 240);
    assert_eq!(image.to_bytes(), bytes);
}

#[test]
fn big_endian_split_keeps_byte_order() {
    let (_temp, root) = common::utf8_tempdir();
    let bytes = common::nifti_bytes_in::<BigEndian>(6);
    let original = NiftiImage::from_bytes(&bytes).unwrap();
    assert_eq!(original.n_volumes(), 6);
    assert_eq!(original.shape(), vec![2, 2, 2, 6]);

    let (head, tail) = original.split_trailing(2).unwrap();
    let tail_bytes = tail.to_bytes();
    assert_eq!(BigEndian::read_i32(&tail_bytes[0..4]), 348);
    assert_eq!(BigEndian::read_i16(&tail_bytes[48..50]), 2);
    // First voxel of volume 4 holds 400.
    assert_eq!(BigEndian::read_i16(&tail_bytes[352..354]), 400);

    let path = root.join("head.nii");
    head.write(&path).unwrap();
    assert_eq!(NiftiImage::read(&path).unwrap().n_volumes(), 4);
}

#[test]
fn split_parts_open_with_the_nifti_reader() {
    let (_temp, root) = common::utf8_tempdir();
    let original = NiftiImage::from_bytes(&common::nifti_bytes(240)).unwrap();
    let (head, tail) = original.split_trailing(3).unwrap();
    let head_path = root.join("head.nii.gz");
    let tail_path = root.join("tail.nii.gz");
    head.write(&head_path).unwrap();
    tail.write(&tail_path).unwrap();

    let head = ReaderOptions::new().read_file(&head_path).unwrap();
    let tail = ReaderOptions::new().read_file(&tail_path).unwrap();
    assert_eq!(head.volume().dim(), &[2, 2, 2, 237]);
    assert_eq!(tail.volume().dim(), &[2, 2, 2, 3]);
    assert_eq!(tail.header().dim[4], 3);
}

#[test]
fn oversized_header_is_a_nifti_error() {
    let (_temp, root) = common::utf8_tempdir();
    let mut bytes = common::nifti_bytes(1);
    byteorder::LittleEndian::write_i16(&mut bytes[40..], 7);
    for i in 1..8 {
        byteorder::LittleEndian::write_i16(&mut bytes[40 + 2 * i..], 32767);
    }
    let path = root.join("huge.nii");
    std::fs::write(&path, bytes).unwrap();
    assert_matches!(NiftiImage::read(&path).unwrap_err(), CurateError::Nifti { .. });
}
