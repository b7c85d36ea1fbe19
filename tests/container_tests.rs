//! Tests for japp-pack container module

mod common;

use common::{class_bytes, STUB};
use japp_pack::container::{copy_stub, PendingResource, CONTAINER_MAGIC, FOOTER_SIZE};
use japp_pack::{
    CompressionMethod, ContainerReader, ContainerSummary, ContainerWriter, DefaultCompressor,
    GroupReference, LaunchConfig, PackError, PathItem,
};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

type FileWriter = ContainerWriter<BufWriter<File>>;

fn write_container(path: &Path, stub: &[u8], build: impl FnOnce(&mut FileWriter)) -> ContainerSummary {
    let mut out = BufWriter::new(File::create(path).unwrap());
    out.write_all(stub).unwrap();

    let compressor = Arc::new(DefaultCompressor::new(CompressionMethod::Zstd));
    let mut writer = ContainerWriter::new(out, stub.len() as u64, compressor).unwrap();
    build(&mut writer);

    let launch = LaunchConfig::new().with_main_class("org.example.Main");
    let (out, summary) = writer.finish(launch).unwrap();
    drop(out);
    summary
}

fn app_entries() -> Vec<PendingResource> {
    let mut main = PendingResource::new("org/example/Main.class", class_bytes("Main"));
    main.last_modified_time = Some(1_684_326_610_000);
    vec![
        main,
        PendingResource::new("org/example/Util.class", class_bytes("Util")),
        PendingResource::new("tiny.txt", b"hi".to_vec()),
        PendingResource::new("logo.png", class_bytes("png")),
    ]
}

#[test]
fn test_container_roundtrip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("app");

    let summary = write_container(&path, STUB, |writer| {
        let group = writer.add_entries(app_entries()).unwrap();
        let base = writer.push_group(group);
        writer.push_class_path(PathItem::new("app.jar", GroupReference::local(base)));
        writer.set_boot(class_bytes("boot")).unwrap();
    });

    assert_eq!(summary.group_count, 1);
    assert_eq!(summary.resource_count, 5);
    assert_eq!(summary.layout.base_offset, STUB.len() as u64);

    let mut reader = ContainerReader::open(&path).unwrap().unwrap();
    assert_eq!(reader.layout(), summary.layout);
    assert_eq!(reader.metadata().content_hash, summary.content_hash);

    for entry in app_entries() {
        assert_eq!(reader.read(0, &entry.name).unwrap(), entry.data, "{}", entry.name);
    }

    let pool = &reader.metadata().pool;
    let group = &pool[0];
    assert_eq!(group.get("tiny.txt").unwrap().method, CompressionMethod::None);
    assert_eq!(group.get("logo.png").unwrap().method, CompressionMethod::None);
    assert_eq!(
        group.get("org/example/Main.class").unwrap().method,
        CompressionMethod::Zstd
    );
    assert_eq!(
        group.get("org/example/Main.class").unwrap().last_modified_time,
        Some(1_684_326_610_000)
    );

    let launch = &reader.metadata().launch;
    assert_eq!(launch.main_class.as_deref(), Some("org.example.Main"));
    assert_eq!(launch.class_path.len(), 1);
    assert_eq!(launch.class_path[0].encode(None), "app.jar:0");

    let boot = reader.metadata().boot.clone().unwrap();
    assert_eq!(reader.read_resource(&boot).unwrap(), class_bytes("boot"));
}

#[test]
fn test_stub_offset_recovery() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("app");
    write_container(&path, STUB, |writer| {
        writer.add_entries(app_entries()).unwrap();
    });

    assert!(ContainerReader::has_container(&path).unwrap());
    assert_eq!(
        ContainerReader::original_size(&path).unwrap(),
        Some(STUB.len() as u64)
    );

    let mut stub = Vec::new();
    assert_eq!(copy_stub(&path, &mut stub).unwrap(), STUB.len() as u64);
    assert_eq!(stub, STUB);
}

#[test]
fn test_plain_file_is_not_packed() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("plain");
    fs::write(&path, b"just a regular file that is long enough to hold a footer").unwrap();

    assert!(!ContainerReader::has_container(&path).unwrap());
    assert!(ContainerReader::open(&path).unwrap().is_none());
    assert!(ContainerReader::original_size(&path).unwrap().is_none());

    let mut copy = Vec::new();
    copy_stub(&path, &mut copy).unwrap();
    assert_eq!(copy, fs::read(&path).unwrap());
}

#[test]
fn test_broken_header_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("app");
    write_container(&path, STUB, |writer| {
        writer.add_entries(app_entries()).unwrap();
    });

    let mut bytes = fs::read(&path).unwrap();
    let header = STUB.len();
    assert_eq!(&bytes[header..header + 4], CONTAINER_MAGIC);
    bytes[header] = b'X';
    fs::write(&path, &bytes).unwrap();

    let err = ContainerReader::open(&path).unwrap_err();
    assert!(matches!(err, PackError::InvalidContainer(_)), "{}", err);
}

#[test]
fn test_truncated_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("app");
    write_container(&path, STUB, |writer| {
        writer.add_entries(app_entries()).unwrap();
    });

    // Drop the first stub byte: the footer no longer matches the file size.
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[1..]).unwrap();
    assert!(ContainerReader::read_layout(&path).is_err());
}

#[test]
fn test_corrupt_payload_fails_checksum() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("app");
    write_container(&path, STUB, |writer| {
        let group = writer
            .add_entries(vec![PendingResource::new(
                "data.bin",
                b"stored payload, large enough to skip the small-file rule".to_vec(),
            )])
            .unwrap();
        writer.push_group(group);
    });

    let resource = {
        let reader = ContainerReader::open(&path).unwrap().unwrap();
        reader.metadata().pool[0].get("data.bin").unwrap().clone()
    };

    let mut bytes = fs::read(&path).unwrap();
    let position = STUB.len() + resource.offset as usize;
    bytes[position] ^= 0xff;
    fs::write(&path, &bytes).unwrap();

    let mut reader = ContainerReader::open(&path).unwrap().unwrap();
    let err = reader.read(0, "data.bin").unwrap_err();
    assert!(
        matches!(err, PackError::ChecksumMismatch { .. } | PackError::Compression(_)),
        "{}",
        err
    );
}

#[test]
fn test_extract_multi_release_view() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("app");
    write_container(&path, STUB, |writer| {
        let base = writer
            .add_entries(vec![
                PendingResource::new("a/Impl.class", class_bytes("base impl")),
                PendingResource::new("a/Other.class", class_bytes("other")),
            ])
            .unwrap();
        let base = writer.push_group(base);
        let overlay = writer
            .add_entries(vec![PendingResource::new(
                "a/Impl.class",
                class_bytes("java 17 impl"),
            )])
            .unwrap();
        let overlay = writer.push_group(overlay);

        let mut multi_release = BTreeMap::new();
        multi_release.insert(17, overlay);
        writer.push_class_path(PathItem::new(
            "lib.jar",
            GroupReference::Local {
                base,
                multi_release,
            },
        ));
    });

    let mut reader = ContainerReader::open(&path).unwrap().unwrap();
    let reference = reader.metadata().launch.class_path[0].reference.clone();

    let old = temp.path().join("java11");
    assert_eq!(reader.extract_groups(&reference.indices_for(Some(11)), &old).unwrap(), 2);
    assert_eq!(fs::read(old.join("a/Impl.class")).unwrap(), class_bytes("base impl"));

    let new = temp.path().join("java21");
    assert_eq!(reader.extract_groups(&reference.indices_for(Some(21)), &new).unwrap(), 2);
    assert_eq!(fs::read(new.join("a/Impl.class")).unwrap(), class_bytes("java 17 impl"));
    assert_eq!(fs::read(new.join("a/Other.class")).unwrap(), class_bytes("other"));
}

#[test]
fn test_footer_is_at_the_end() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("app");
    let summary = write_container(&path, b"", |_| {});

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[bytes.len() - 4..], CONTAINER_MAGIC);
    assert_eq!(
        bytes.len() as u64,
        summary.layout.metadata_offset + summary.layout.metadata_size + FOOTER_SIZE
    );
    assert_eq!(summary.resource_count, 0);
}
