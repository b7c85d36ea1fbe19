//! Fixtures shared by the integration tests

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;

/// Bytes of a fake launcher stub
pub const STUB: &[u8] = b"#!/bin/sh\necho not a real launcher\n";

/// Write a jar with the given manifest text (if any) and entries
pub fn write_jar(path: &Path, manifest: Option<&str>, entries: &[(&str, &[u8])]) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
    let options = SimpleFileOptions::default()
        .last_modified_time(zip::DateTime::from_date_and_time(2023, 5, 17, 12, 30, 10).unwrap());

    if let Some(manifest) = manifest {
        writer.add_directory("META-INF/", options).unwrap();
        writer.start_file("META-INF/MANIFEST.MF", options).unwrap();
        writer.write_all(manifest.as_bytes()).unwrap();
    }
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
    path.to_path_buf()
}

/// Write a file, creating parent directories
pub fn write_file(path: &Path, data: &[u8]) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, data).unwrap();
    path.to_path_buf()
}

/// Text that compresses well
pub fn class_bytes(seed: &str) -> Vec<u8> {
    seed.repeat(64).into_bytes()
}
