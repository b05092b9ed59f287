//! Tests for the orbispkg library

use orbispkg::{
    align::layout_offsets,
    archive::{create_from_dir, extract},
    diff, psarc, sfo,
    *,
};
use proptest::prelude::*;
use std::fs;
use std::io::Cursor;
use tempfile::TempDir;

const CONTENT_ID: &str = "UP0001-CUSA00745_00-RS001PACK0000001";

#[test]
fn test_create_and_read_dlc_directory() {
    let temp_dir = TempDir::new().unwrap();
    let input_dir = temp_dir.path().join("input");
    let pkg_path = temp_dir.path().join("dlc.pkg");
    let output_dir = temp_dir.path().join("output");

    let sce_sys = input_dir.join("sce_sys");
    fs::create_dir_all(&sce_sys).unwrap();
    let doc = SfoDocument::additional_content(CONTENT_ID, "Song Pack", "CUSA00745", "01.00").unwrap();
    fs::write(sce_sys.join("param.sfo"), doc.encode().unwrap()).unwrap();
    fs::write(sce_sys.join("icon0.png"), b"\x89PNG fake").unwrap();
    fs::write(input_dir.join("song_a.psarc"), b"first song").unwrap();
    fs::write(input_dir.join("song_b.psarc"), b"second song").unwrap();

    let mut builder = PkgBuilder::new();
    builder.content_id(CONTENT_ID);
    builder.add_dir(&input_dir).unwrap();
    builder.write_to_file(&pkg_path).unwrap();

    let mut archive = PkgArchive::open(&pkg_path).unwrap();
    assert_eq!(archive.len(), 4);
    assert_eq!(archive.header().content_id, CONTENT_ID);
    assert!(archive.contains(EntryId::PARAM_SFO));
    assert!(archive.contains(EntryId::ICON0_PNG));

    assert_eq!(archive.read_entry(0x1201u32).unwrap(), b"first song");
    assert_eq!(archive.read_entry(0x1202u32).unwrap(), b"second song");
    assert_eq!(archive.param_sfo().unwrap().unwrap(), doc);

    archive.extract_all(&output_dir).unwrap();
    assert_eq!(
        fs::read(output_dir.join("1200_ICON0_PNG.bin")).unwrap(),
        b"\x89PNG fake"
    );
    assert_eq!(
        fs::read(output_dir.join("1202_DATA_FILE.bin")).unwrap(),
        b"second song"
    );
}

#[test]
fn test_convenience_functions() {
    let temp_dir = TempDir::new().unwrap();
    let input_dir = temp_dir.path().join("input");
    let pkg_path = temp_dir.path().join("test.pkg");
    let output_dir = temp_dir.path().join("output");

    fs::create_dir_all(&input_dir).unwrap();
    fs::write(input_dir.join("data.bin"), b"Test content").unwrap();

    create_from_dir(&input_dir, &pkg_path, CONTENT_ID).unwrap();
    let written = extract(&pkg_path, &output_dir).unwrap();

    assert_eq!(written, vec![output_dir.join("1201_DATA_FILE.bin")]);
    assert_eq!(fs::read(&written[0]).unwrap(), b"Test content");
}

#[test]
fn test_streaming_matches_in_memory_build() {
    let temp_dir = TempDir::new().unwrap();
    let big = temp_dir.path().join("big.psarc");
    // larger than one copy buffer
    let payload: Vec<u8> = (0..BUFFER_SIZE + 12345).map(|i| (i % 251) as u8).collect();
    fs::write(&big, &payload).unwrap();

    let mut from_file = PkgBuilder::new();
    from_file
        .content_id(CONTENT_ID)
        .add_bytes(EntryId::PARAM_SFO, b"sfo".to_vec())
        .add_file(0x1201u32, &big)
        .unwrap();

    let mut in_memory = PkgBuilder::new();
    in_memory
        .content_id(CONTENT_ID)
        .add_bytes(0x1201u32, payload.clone())
        .add_bytes(EntryId::PARAM_SFO, b"sfo".to_vec());

    let pkg_path = temp_dir.path().join("big.pkg");
    from_file.write_to_file(&pkg_path).unwrap();
    let on_disk = fs::read(&pkg_path).unwrap();
    assert_eq!(on_disk, in_memory.to_bytes().unwrap());

    let mut reader = PkgReader::open(&pkg_path).unwrap();
    let mut chunks = 0;
    let mut total = 0usize;
    reader
        .read_entry_streaming(0x1201u32, |chunk| {
            assert!(chunk.len() <= BUFFER_SIZE);
            chunks += 1;
            total += chunk.len();
            Ok(())
        })
        .unwrap();
    assert_eq!(chunks, 2);
    assert_eq!(total, payload.len());
}

#[test]
fn test_reader_and_parser_agree() {
    let data = PkgBuilder::new()
        .content_id(CONTENT_ID)
        .add_bytes(EntryId::PARAM_SFO, b"sfo".to_vec())
        .add_reserved(EntryId::LICENSE, ReservedRegion::zeroed(0x400))
        .add_bytes(0x1201u32, vec![1, 2, 3])
        .to_bytes()
        .unwrap();

    let parsed = parse(&data).unwrap();
    let reader = PkgReader::from_reader(Cursor::new(data.clone())).unwrap();

    assert_eq!(&parsed.header, reader.header());
    assert_eq!(parsed.entries, reader.entries().copied().collect::<Vec<_>>());
    assert_eq!(parsed.digest_area(), reader.digest_area());
    assert!(parsed.payload_by_id(EntryId::LICENSE).unwrap().iter().all(|&b| b == 0));
}

#[test]
fn test_layout_of_three_entries() {
    let layout = layout_offsets(&[10, 4096, 17], 0x2000, 16).unwrap();
    assert_eq!(layout.offsets, vec![0x2000, 0x2010, 0x3010]);

    let data = build(
        &[
            PkgEntry::new(0x1201u32, vec![1u8; 10]),
            PkgEntry::new(0x1202u32, vec![2u8; 4096]),
            PkgEntry::new(0x1203u32, vec![3u8; 17]),
        ],
        &PackageInfo::new(CONTENT_ID),
    )
    .unwrap();
    let parsed = parse(&data).unwrap();
    let body = parsed.header.body_offset;
    let offsets: Vec<u64> = parsed.entries.iter().map(|e| e.file_offset - body).collect();
    assert_eq!(offsets, vec![0, 0x10, 0x1010]);
    assert_eq!(parsed.header.body_size, 0x1030);
    assert_eq!(data.len() as u64, body + 0x1030);
}

#[test]
fn test_content_id_fills_its_sfo_slot() {
    let entry = SfoEntry::new(
        "CONTENT_ID",
        SfoValue::Utf8Special(CONTENT_ID.to_string()),
        36,
    );
    let data = sfo::encode(&[entry.clone()]).unwrap();
    let header = sfo::SfoHeader::parse(&data).unwrap();
    let slot = &data[header.data_table_offset as usize..];
    assert_eq!(slot, CONTENT_ID.as_bytes());
    assert_eq!(sfo::decode(&data).unwrap(), vec![entry]);

    let terminated = SfoEntry::string("CONTENT_ID", CONTENT_ID, 36);
    assert!(matches!(
        sfo::encode(&[terminated]),
        Err(Error::ValueTooLong { len: 37, max: 36, .. })
    ));
}

#[test]
fn test_psarc_patch_to_generic() {
    let mut data = vec![0u8; 96];
    data[..4].copy_from_slice(b"PSAR");
    data[8..12].copy_from_slice(b"zlib");
    data[28..32].copy_from_slice(&4u32.to_be_bytes());
    data[32..].fill(0xCD);

    let header = PsarcHeader::parse(&data).unwrap();
    assert_eq!(psarc::describe_platform(header.platform_flags), Platform::AlternatePlatform);

    let outcome = psarc::patch_platform_flag(&data, 0).unwrap();
    let changed: Vec<usize> = (0..data.len())
        .filter(|&i| data[i] != outcome.bytes[i])
        .collect();
    assert_eq!(changed, vec![31]);
    assert_eq!(&outcome.bytes[28..32], &[0, 0, 0, 0]);
}

#[test]
fn test_truncated_entry_table() {
    let mut data = build(
        &[PkgEntry::new(1u32, vec![1]), PkgEntry::new(2u32, vec![2])],
        &PackageInfo::new(CONTENT_ID),
    )
    .unwrap();
    data[0x10..0x14].copy_from_slice(&0x100u32.to_be_bytes());
    data[0x1C..0x20].copy_from_slice(&(0x100u32 * 32).to_be_bytes());

    assert!(matches!(parse(&data), Err(Error::TruncatedInput { .. })));
    assert!(matches!(
        PkgReader::from_reader(Cursor::new(data)),
        Err(Error::TruncatedInput { .. })
    ));
}

#[test]
fn test_empty_package() {
    let temp_dir = TempDir::new().unwrap();
    let pkg_path = temp_dir.path().join("empty.pkg");

    let builder = PkgBuilder::new();
    assert!(matches!(builder.write_to_file(&pkg_path), Err(Error::EmptyEntrySet)));
    assert!(!pkg_path.exists());
}

#[test]
fn test_file_not_found_error() {
    let mut builder = PkgBuilder::new();
    assert!(matches!(
        builder.add_file(0x1201u32, "/nonexistent/song.psarc"),
        Err(Error::Io(_))
    ));
    assert!(matches!(
        PkgArchive::open("/nonexistent/dlc.pkg"),
        Err(Error::Io(_))
    ));
}

#[test]
fn test_diff_of_two_packages() {
    let a = PkgBuilder::new()
        .content_id(CONTENT_ID)
        .add_bytes(0x1201u32, b"one".to_vec())
        .to_bytes()
        .unwrap();
    let b = PkgBuilder::new()
        .content_id(CONTENT_ID)
        .content_type(format::CONTENT_TYPE_GD)
        .add_bytes(0x1201u32, b"two".to_vec())
        .to_bytes()
        .unwrap();

    let pa = parse(&a).unwrap();
    let pb = parse(&b).unwrap();
    let fields = diff::diff_headers(&pa.header, &pb.header);
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].field, "content_type");

    let sa = PkgReader::from_reader(Cursor::new(a.clone())).unwrap().summarize().unwrap();
    let sb = PkgReader::from_reader(Cursor::new(b.clone())).unwrap().summarize().unwrap();
    let entries = diff::diff_entries(&sa, &sb);
    assert_eq!(entries.len(), 1);

    let raw = diff::diff_header_bytes(&a, &b);
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0].offset, 0x70);
}

fn arb_entries() -> impl Strategy<Value = Vec<(u32, Vec<u8>, (u32, u32))>> {
    prop::collection::btree_map(
        0u32..0x2000,
        (prop::collection::vec(any::<u8>(), 0..300), any::<(u32, u32)>()),
        1..12,
    )
    .prop_map(|map| map.into_iter().map(|(id, (data, flags))| (id, data, flags)).collect())
    .prop_shuffle()
}

proptest! {
    #[test]
    fn build_then_parse_recovers_entries(
        entries in arb_entries(),
        shift in 0u32..8,
        flip in 1u32..,
    ) {
        let mut info = PackageInfo::new(CONTENT_ID);
        info.alignment = 1 << (shift + 2);

        let pkg_entries: Vec<PkgEntry> = entries
            .iter()
            .map(|(id, data, (flags1, flags2))| {
                PkgEntry::new(*id, data.clone()).flags(*flags1, *flags2)
            })
            .collect();
        let data = build(&pkg_entries, &info).unwrap();
        let parsed = parse(&data).unwrap();

        let mut expected = entries.clone();
        expected.sort_by_key(|(id, _, _)| *id);
        prop_assert_eq!(parsed.entries.len(), expected.len());
        for (record, (id, payload, (flags1, flags2))) in parsed.entries.iter().zip(&expected) {
            prop_assert_eq!(record.id, *id);
            prop_assert_eq!(record.flags1, *flags1);
            prop_assert_eq!(record.flags2, *flags2);
            prop_assert_eq!(parsed.payload(record).unwrap(), payload.as_slice());
        }
        prop_assert_eq!(parsed.header.entry_table_size, parsed.header.entry_count * 32);
        prop_assert!(diff::validate(&parsed.header, &parsed.entries, info.alignment)
            .iter()
            .all(|f| f.passed));

        // flags2 of the first input entry changed: exactly one entry diff
        let mut changed = pkg_entries.clone();
        let (flags1, flags2) = (changed[0].flags1(), changed[0].flags2());
        changed[0] = changed[0].clone().flags(flags1, flags2 ^ flip);
        let other = build(&changed, &info).unwrap();

        let left = PkgReader::from_reader(Cursor::new(data.clone())).unwrap().summarize().unwrap();
        let right = PkgReader::from_reader(Cursor::new(other)).unwrap().summarize().unwrap();
        prop_assert!(diff::diff_entries(&left, &left).is_empty());
        let diffs = diff::diff_entries(&left, &right);
        prop_assert_eq!(diffs.len(), 1);
        prop_assert!(matches!(
            &diffs[0],
            diff::EntryDiff::Changed { id, field: "flags2", .. } if id.0 == pkg_entries[0].id()
        ), "unexpected diff: {:?}", diffs[0]);
    }

    #[test]
    fn pkg_with_wrong_magic_is_format_error(mut data in prop::collection::vec(any::<u8>(), 4..0x1100)) {
        prop_assume!(data[..4] != format::PKG_MAGIC.to_be_bytes());
        prop_assert!(matches!(parse(&data), Err(Error::Format(_))));
        data.truncate(4);
        prop_assert!(matches!(
            PkgReader::from_reader(Cursor::new(data)),
            Err(Error::Format(_))
        ));
    }
}
