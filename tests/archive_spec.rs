use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;
use tracto_reader::tracto::archive::{Archive, METHOD_DEFLATE, METHOD_STORED};
use tracto_reader::tracto::codec::numeric::{expand_half, narrow_u64};
use tracto_reader::TractoError;

const LOCAL_SIG: u32 = 0x0403_4B50;
const CENTRAL_SIG: u32 = 0x0201_4B50;
const EOCD_SIG: u32 = 0x0605_4B50;
const EOCD64_SIG: u32 = 0x0606_4B50;
const DESCRIPTOR_SIG: u32 = 0x0807_4B50;

/// Append a local file entry with known sizes.
fn push_entry(out: &mut Vec<u8>, name: &str, method: u16, payload: &[u8], uncompressed: u32) {
    out.extend_from_slice(&LOCAL_SIG.to_le_bytes());
    out.extend_from_slice(&20u16.to_le_bytes()); // version needed
    out.extend_from_slice(&0u16.to_le_bytes()); // flags
    out.extend_from_slice(&method.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // mod time + date
    out.extend_from_slice(&0u32.to_le_bytes()); // crc
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&uncompressed.to_le_bytes());
    out.extend_from_slice(&(name.len() as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // extra length
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(payload);
}

/// Append the 22-byte end-of-central-directory record.
fn push_eocd(out: &mut Vec<u8>) {
    out.extend_from_slice(&EOCD_SIG.to_le_bytes());
    out.extend_from_slice(&[0u8; 18]);
}

#[test]
fn stored_entry_round_trips() {
    let payload = b"exact payload bytes";
    let mut zip = Vec::new();
    push_entry(&mut zip, "data.bin", METHOD_STORED, payload, payload.len() as u32);
    push_eocd(&mut zip);

    let archive = Archive::open(&zip).expect("open archive");
    assert_eq!(archive.entries().len(), 1);
    let entry = &archive.entries()[0];
    assert_eq!(entry.name, "data.bin");
    assert_eq!(entry.uncompressed_size, payload.len() as u64);
    assert_eq!(archive.extract(entry).expect("extract"), payload);
}

#[test]
fn deflated_entry_decompresses() {
    let payload = b"deflate me, deflate me, deflate me";
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut zip = Vec::new();
    push_entry(
        &mut zip,
        "data.bin",
        METHOD_DEFLATE,
        &compressed,
        payload.len() as u32,
    );
    push_eocd(&mut zip);

    let archive = Archive::open(&zip).expect("open archive");
    assert_eq!(
        archive.extract(&archive.entries()[0]).expect("extract"),
        payload
    );
}

#[test]
fn zip64_extra_field_overrides_sentinel_sizes() {
    let payload = b"zip64 sized payload";
    let mut zip = Vec::new();
    zip.extend_from_slice(&LOCAL_SIG.to_le_bytes());
    zip.extend_from_slice(&45u16.to_le_bytes());
    zip.extend_from_slice(&0u16.to_le_bytes());
    zip.extend_from_slice(&0u16.to_le_bytes()); // stored
    zip.extend_from_slice(&0u32.to_le_bytes());
    zip.extend_from_slice(&0u32.to_le_bytes());
    zip.extend_from_slice(&u32::MAX.to_le_bytes()); // compressed sentinel
    zip.extend_from_slice(&u32::MAX.to_le_bytes()); // uncompressed sentinel
    zip.extend_from_slice(&8u16.to_le_bytes()); // name length
    zip.extend_from_slice(&20u16.to_le_bytes()); // extra length
    zip.extend_from_slice(b"data.bin");
    zip.extend_from_slice(&0x0001u16.to_le_bytes()); // ZIP64 tag
    zip.extend_from_slice(&16u16.to_le_bytes());
    zip.extend_from_slice(&(payload.len() as u64).to_le_bytes()); // uncompressed
    zip.extend_from_slice(&(payload.len() as u64).to_le_bytes()); // compressed
    zip.extend_from_slice(payload);
    push_eocd(&mut zip);

    let archive = Archive::open(&zip).expect("open archive");
    let entry = &archive.entries()[0];
    assert_eq!(entry.compressed_size, payload.len() as u64);
    assert_eq!(entry.uncompressed_size, payload.len() as u64);
    assert_eq!(archive.extract(entry).expect("extract"), payload);
}

#[test]
fn zip64_sentinel_without_extra_field_is_fatal() {
    let mut zip = Vec::new();
    zip.extend_from_slice(&LOCAL_SIG.to_le_bytes());
    zip.extend_from_slice(&45u16.to_le_bytes());
    zip.extend_from_slice(&0u16.to_le_bytes());
    zip.extend_from_slice(&0u16.to_le_bytes());
    zip.extend_from_slice(&0u32.to_le_bytes());
    zip.extend_from_slice(&0u32.to_le_bytes());
    zip.extend_from_slice(&u32::MAX.to_le_bytes());
    zip.extend_from_slice(&u32::MAX.to_le_bytes());
    zip.extend_from_slice(&8u16.to_le_bytes());
    zip.extend_from_slice(&0u16.to_le_bytes()); // no extra field
    zip.extend_from_slice(b"data.bin");
    push_eocd(&mut zip);

    let err = Archive::open(&zip).unwrap_err();
    assert!(matches!(err, TractoError::CorruptArchive(_)), "{:?}", err);
}

#[test]
fn data_descriptor_entry_is_resynchronised() {
    // Payload opens with a decoy descriptor signature; the +16 heuristic
    // must reject it because the bytes 16 further on are not "PK".
    let mut payload = Vec::new();
    payload.extend_from_slice(&DESCRIPTOR_SIG.to_le_bytes());
    payload.extend_from_slice(b"streaming body bytes");

    let mut zip = Vec::new();
    zip.extend_from_slice(&LOCAL_SIG.to_le_bytes());
    zip.extend_from_slice(&20u16.to_le_bytes());
    zip.extend_from_slice(&(1u16 << 3).to_le_bytes()); // sizes deferred
    zip.extend_from_slice(&0u16.to_le_bytes()); // stored
    zip.extend_from_slice(&0u32.to_le_bytes());
    zip.extend_from_slice(&0u32.to_le_bytes()); // crc unknown
    zip.extend_from_slice(&0u32.to_le_bytes()); // compressed unknown
    zip.extend_from_slice(&0u32.to_le_bytes()); // uncompressed unknown
    zip.extend_from_slice(&10u16.to_le_bytes());
    zip.extend_from_slice(&0u16.to_le_bytes());
    zip.extend_from_slice(b"stream.bin");
    zip.extend_from_slice(&payload);
    zip.extend_from_slice(&DESCRIPTOR_SIG.to_le_bytes());
    zip.extend_from_slice(&0u32.to_le_bytes()); // crc
    zip.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    zip.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    push_eocd(&mut zip); // the "PK" at +16 that validates the descriptor

    let archive = Archive::open(&zip).expect("open archive");
    let entry = &archive.entries()[0];
    assert_eq!(entry.compressed_size, payload.len() as u64);
    assert_eq!(archive.extract(entry).expect("extract"), payload);
}

#[test]
fn central_directory_records_are_skipped() {
    let payload = b"body";
    let mut zip = Vec::new();
    push_entry(&mut zip, "a.bin", METHOD_STORED, payload, payload.len() as u32);

    // Minimal central directory record for the entry.
    zip.extend_from_slice(&CENTRAL_SIG.to_le_bytes());
    let fixed_start = zip.len();
    zip.extend_from_slice(&[0u8; 42]);
    zip[fixed_start + 24..fixed_start + 26].copy_from_slice(&5u16.to_le_bytes()); // name length at +28
    zip.extend_from_slice(b"a.bin");
    push_eocd(&mut zip);

    let archive = Archive::open(&zip).expect("open archive");
    assert_eq!(archive.entries().len(), 1);
}

#[test]
fn zip64_end_record_terminates_the_scan() {
    let payload = b"body";
    let mut zip = Vec::new();
    push_entry(&mut zip, "a.bin", METHOD_STORED, payload, payload.len() as u32);
    zip.extend_from_slice(&EOCD64_SIG.to_le_bytes());
    zip.extend_from_slice(b"trailing bytes the scanner must never reach");

    let archive = Archive::open(&zip).expect("open archive");
    assert_eq!(archive.entries().len(), 1);
}

#[test]
fn unknown_signature_is_corrupt() {
    let err = Archive::open(b"garbage archive bytes").unwrap_err();
    assert!(matches!(err, TractoError::CorruptArchive(_)), "{:?}", err);
}

#[test]
fn unsupported_method_is_rejected_at_extraction() {
    let mut zip = Vec::new();
    push_entry(&mut zip, "a.bin", 12, b"bzip2-ish", 9); // method 12 = bzip2
    push_eocd(&mut zip);

    let archive = Archive::open(&zip).expect("open archive");
    let err = archive.extract(&archive.entries()[0]).unwrap_err();
    assert!(matches!(err, TractoError::UnsupportedCompression(12)), "{:?}", err);
}

#[test]
fn half_precision_expansion_vectors() {
    assert_eq!(expand_half(0x0000), 0.0);
    assert_eq!(expand_half(0x3C00), 1.0);
    assert_eq!(expand_half(0xC000), -2.0);
    assert_eq!(expand_half(0x7C00), f32::INFINITY);
    assert_eq!(expand_half(0xFC00), f32::NEG_INFINITY);
    assert!(expand_half(0x7E00).is_nan());
    // Smallest subnormal: 1/1024 * 2^-14.
    assert_eq!(expand_half(0x0001), 2.0f32.powi(-24));
    assert_eq!(expand_half(0x3555), 1365.0 / 4096.0);
}

#[test]
fn narrowing_checks_the_high_word() {
    assert_eq!(narrow_u64(7, 0).unwrap(), 7);
    assert_eq!(narrow_u64(u32::MAX, 0).unwrap(), u32::MAX);
    let err = narrow_u64(0, 1).unwrap_err();
    assert!(matches!(err, TractoError::NumericOverflow { high: 1 }), "{:?}", err);
}
