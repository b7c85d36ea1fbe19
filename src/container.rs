//! Container format appended to the launcher stub
//!
//! The container is appended to the end of the launcher executable and holds
//! every packed resource plus the metadata describing how to launch them.
//!
//! ## Format
//!
//! ```text
//! [Launcher Stub]
//! [Header]                                   <- base offset
//!   - Magic: "JAPP" (4 bytes)
//!   - Version: u32 LE (4 bytes)
//! [Resource Payloads] (each compressed on its own)
//! [Metadata] (JSON, zstd compressed)
//! [Footer]
//!   - Base Offset: u64 LE (8 bytes)
//!   - Metadata Offset: u64 LE (8 bytes, relative to base)
//!   - Metadata Size: u64 LE (8 bytes)
//!   - Version: u32 LE (4 bytes)
//!   - Magic: "JAPP" (4 bytes)
//! ```
//!
//! All resource offsets are relative to the base offset, so the container
//! does not care what stub sits in front of it.
//!
//! ## Content Hash
//!
//! The metadata carries a content hash (BLAKE3, first 64 bits) over every
//! payload written. The launcher uses it as a cache key for files it has to
//! materialize on disk, such as the boot module.

use crate::compress::{decompress, CompressResult, Compressor};
use crate::launch::LaunchConfig;
use crate::metrics::LaunchMetrics;
use crate::resource::{self, resolve_group, PathItem, Resource, ResourceGroup};
use crate::{PackError, PackResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Magic bytes for container identification
pub const CONTAINER_MAGIC: &[u8; 4] = b"JAPP";

/// Current container format version
pub const CONTAINER_VERSION: u32 = 1;

/// Header size in bytes (magic: 4 + version: 4)
pub const HEADER_SIZE: u64 = 8;

/// Footer size in bytes (base: 8 + metadata offset: 8 + metadata size: 8 + version: 4 + magic: 4)
pub const FOOTER_SIZE: u64 = 32;

/// zstd level for the metadata block
const METADATA_LEVEL: i32 = 3;

/// Name of the embedded boot module resource
pub const BOOT_RESOURCE_NAME: &str = "boot.jar";

/// A file waiting to be compressed and written
#[derive(Debug, Clone)]
pub struct PendingResource {
    /// Name inside its group
    pub name: String,
    /// Uncompressed content
    pub data: Vec<u8>,
    /// Creation time (millis since epoch)
    pub creation_time: Option<i64>,
    /// Modification time (millis since epoch)
    pub last_modified_time: Option<i64>,
    /// Access time (millis since epoch)
    pub last_access_time: Option<i64>,
}

impl PendingResource {
    /// Resource without timestamps
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            creation_time: None,
            last_modified_time: None,
            last_access_time: None,
        }
    }

    /// Lower-case extension of the resource name
    pub fn extension(&self) -> Option<String> {
        let file_name = self.name.rsplit('/').next().unwrap_or(&self.name);
        file_name
            .rsplit_once('.')
            .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }
}

/// Metadata stored at the end of the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootMetadata {
    /// Container format version
    pub version: u32,
    /// Content hash of all payloads (16 hex chars)
    pub content_hash: String,
    /// Resource group pool, referenced by index
    pub pool: Vec<ResourceGroup>,
    /// Launch manifest
    pub launch: LaunchConfig,
    /// Embedded boot module
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot: Option<Resource>,
}

/// Position of the container inside a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerLayout {
    /// Offset of the header, equal to the stub size
    pub base_offset: u64,
    /// Metadata offset relative to the base
    pub metadata_offset: u64,
    /// Compressed metadata size
    pub metadata_size: u64,
    /// Format version
    pub version: u32,
}

impl ContainerLayout {
    fn encode(&self) -> [u8; FOOTER_SIZE as usize] {
        let mut footer = [0u8; FOOTER_SIZE as usize];
        footer[0..8].copy_from_slice(&self.base_offset.to_le_bytes());
        footer[8..16].copy_from_slice(&self.metadata_offset.to_le_bytes());
        footer[16..24].copy_from_slice(&self.metadata_size.to_le_bytes());
        footer[24..28].copy_from_slice(&self.version.to_le_bytes());
        footer[28..32].copy_from_slice(CONTAINER_MAGIC);
        footer
    }

    /// Decode a footer; `None` when the magic does not match
    fn decode(footer: &[u8; FOOTER_SIZE as usize]) -> Option<Self> {
        if &footer[28..32] != CONTAINER_MAGIC {
            return None;
        }
        let u64_at = |i: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&footer[i..i + 8]);
            u64::from_le_bytes(b)
        };
        let mut version = [0u8; 4];
        version.copy_from_slice(&footer[24..28]);

        Some(Self {
            base_offset: u64_at(0),
            metadata_offset: u64_at(8),
            metadata_size: u64_at(16),
            version: u32::from_le_bytes(version),
        })
    }

    /// Total file length this layout implies
    fn expected_file_len(&self) -> Option<u64> {
        self.base_offset
            .checked_add(self.metadata_offset)?
            .checked_add(self.metadata_size)?
            .checked_add(FOOTER_SIZE)
    }
}

/// What a finished writer produced
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    /// Where the container sits
    pub layout: ContainerLayout,
    /// Content hash recorded in the metadata
    pub content_hash: String,
    /// Number of groups in the pool
    pub group_count: usize,
    /// Number of resources written (boot module included)
    pub resource_count: usize,
    /// Uncompressed bytes of all resources
    pub total_size: u64,
    /// Payload bytes actually written
    pub payload_size: u64,
}

/// Writes a container after a stub
///
/// The output must already be positioned right after the stub; `base_offset`
/// is the stub length.
pub struct ContainerWriter<W: Write> {
    output: W,
    base_offset: u64,
    current_offset: u64,
    compressor: Arc<dyn Compressor>,
    pool: Vec<ResourceGroup>,
    module_path: Vec<PathItem>,
    class_path: Vec<PathItem>,
    boot: Option<Resource>,
    hasher: blake3::Hasher,
    resource_count: usize,
    total_size: u64,
}

impl<W: Write> ContainerWriter<W> {
    /// Start a container, writing its header
    pub fn new(
        mut output: W,
        base_offset: u64,
        compressor: Arc<dyn Compressor>,
    ) -> PackResult<Self> {
        output.write_all(CONTAINER_MAGIC)?;
        output.write_all(&CONTAINER_VERSION.to_le_bytes())?;

        Ok(Self {
            output,
            base_offset,
            current_offset: HEADER_SIZE,
            compressor,
            pool: Vec::new(),
            module_path: Vec::new(),
            class_path: Vec::new(),
            boot: None,
            hasher: blake3::Hasher::new(),
            resource_count: 0,
            total_size: 0,
        })
    }

    /// Offset (relative to the base) where the next payload goes
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Stub length
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Groups added so far
    pub fn pool(&self) -> &[ResourceGroup] {
        &self.pool
    }

    /// Compress and write a batch of resources, returning their group
    ///
    /// Compression runs in parallel; payloads are written in input order.
    pub fn add_entries(&mut self, entries: Vec<PendingResource>) -> PackResult<ResourceGroup> {
        let compressor = Arc::clone(&self.compressor);
        let compressed: Vec<PackResult<CompressResult>> = entries
            .par_iter()
            .map(|entry| compressor.compress(&entry.data, entry.extension().as_deref()))
            .collect();

        let mut group = ResourceGroup::new();
        for (entry, result) in entries.iter().zip(compressed) {
            let resource = self.write_payload(entry, result?)?;
            if let Some(previous) = group.insert(resource) {
                tracing::warn!("Duplicate resource {}, keeping the last one", previous.name);
            }
        }
        Ok(group)
    }

    /// Compress and write a single resource that belongs to no group
    pub fn add_standalone(&mut self, entry: PendingResource) -> PackResult<Resource> {
        let result = self
            .compressor
            .compress(&entry.data, entry.extension().as_deref())?;
        self.write_payload(&entry, result)
    }

    fn write_payload(
        &mut self,
        entry: &PendingResource,
        compressed: CompressResult,
    ) -> PackResult<Resource> {
        let resource = Resource {
            name: entry.name.clone(),
            offset: self.current_offset,
            size: entry.data.len() as u64,
            method: compressed.method,
            compressed_size: compressed.data.len() as u64,
            creation_time: entry.creation_time,
            last_modified_time: entry.last_modified_time,
            last_access_time: entry.last_access_time,
            checksum: Some(resource::checksum(&entry.data)),
        };

        self.output.write_all(&compressed.data)?;

        self.hasher.update(entry.name.as_bytes());
        self.hasher.update(&[0, compressed.method.id()]);
        self.hasher.update(&resource.compressed_size.to_le_bytes());
        self.hasher.update(&compressed.data);

        self.current_offset += resource.compressed_size;
        self.resource_count += 1;
        self.total_size += resource.size;

        tracing::debug!(
            "Wrote {} ({} -> {} bytes, {})",
            resource.name,
            resource.size,
            resource.compressed_size,
            resource.method
        );

        Ok(resource)
    }

    /// Put a group into the pool, returning its index
    pub fn push_group(&mut self, group: ResourceGroup) -> usize {
        self.pool.push(group);
        self.pool.len() - 1
    }

    /// Append a module path element
    pub fn push_module(&mut self, item: PathItem) {
        self.module_path.push(item);
    }

    /// Append a class path element
    pub fn push_class_path(&mut self, item: PathItem) {
        self.class_path.push(item);
    }

    /// Module path elements added so far
    pub fn module_path(&self) -> &[PathItem] {
        &self.module_path
    }

    /// Class path elements added so far
    pub fn class_path(&self) -> &[PathItem] {
        &self.class_path
    }

    /// Embed the boot module jar
    pub fn set_boot(&mut self, data: Vec<u8>) -> PackResult<()> {
        let resource = self.add_standalone(PendingResource::new(BOOT_RESOURCE_NAME, data))?;
        self.boot = Some(resource);
        Ok(())
    }

    /// Write metadata and footer
    ///
    /// The module and class path collected by this writer replace the ones
    /// in `launch`.
    pub fn finish(mut self, mut launch: LaunchConfig) -> PackResult<(W, ContainerSummary)> {
        launch.module_path = std::mem::take(&mut self.module_path);
        launch.class_path = std::mem::take(&mut self.class_path);

        let content_hash = resource::short_hash(self.hasher.finalize());
        let payload_size = self.current_offset - HEADER_SIZE;

        let metadata = BootMetadata {
            version: CONTAINER_VERSION,
            content_hash: content_hash.clone(),
            pool: std::mem::take(&mut self.pool),
            launch,
            boot: self.boot.take(),
        };

        let metadata_json = serde_json::to_vec(&metadata)?;
        let metadata_compressed = zstd::encode_all(&metadata_json[..], METADATA_LEVEL)
            .map_err(|e| PackError::Compression(e.to_string()))?;

        let layout = ContainerLayout {
            base_offset: self.base_offset,
            metadata_offset: self.current_offset,
            metadata_size: metadata_compressed.len() as u64,
            version: CONTAINER_VERSION,
        };

        self.output.write_all(&metadata_compressed)?;
        self.output.write_all(&layout.encode())?;
        self.output.flush()?;

        tracing::info!(
            "Container written: {} groups, {} resources, payload={} bytes, metadata={} bytes, hash={}",
            metadata.pool.len(),
            self.resource_count,
            payload_size,
            metadata_compressed.len(),
            content_hash
        );

        let summary = ContainerSummary {
            layout,
            content_hash,
            group_count: metadata.pool.len(),
            resource_count: self.resource_count,
            total_size: self.total_size,
            payload_size,
        };

        Ok((self.output, summary))
    }
}

/// Reader for containers appended to a file
pub struct ContainerReader {
    reader: BufReader<File>,
    path: PathBuf,
    layout: ContainerLayout,
    metadata: BootMetadata,
}

impl std::fmt::Debug for ContainerReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerReader")
            .field("path", &self.path)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

fn read_footer(file: &mut File, file_len: u64) -> PackResult<Option<ContainerLayout>> {
    if file_len < FOOTER_SIZE + HEADER_SIZE {
        return Ok(None);
    }
    file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
    let mut footer = [0u8; FOOTER_SIZE as usize];
    file.read_exact(&mut footer)?;
    Ok(ContainerLayout::decode(&footer))
}

impl ContainerReader {
    /// Check if a file ends with a container footer
    pub fn has_container(path: &Path) -> PackResult<bool> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(read_footer(&mut file, file_len)?.is_some())
    }

    /// Locate and validate the container of a file
    ///
    /// Returns `None` for files without a footer. A footer that points at
    /// garbage is an error.
    pub fn read_layout(path: &Path) -> PackResult<Option<ContainerLayout>> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let layout = match read_footer(&mut file, file_len)? {
            Some(layout) => layout,
            None => return Ok(None),
        };

        if layout.version != CONTAINER_VERSION {
            return Err(PackError::InvalidContainer(format!(
                "Unsupported version: {} (expected {})",
                layout.version, CONTAINER_VERSION
            )));
        }

        if layout.expected_file_len() != Some(file_len) || layout.metadata_offset < HEADER_SIZE {
            return Err(PackError::InvalidContainer(format!(
                "Footer does not match file size {} (base={}, metadata={}+{})",
                file_len, layout.base_offset, layout.metadata_offset, layout.metadata_size
            )));
        }

        file.seek(SeekFrom::Start(layout.base_offset))?;
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        if &header[0..4] != CONTAINER_MAGIC {
            return Err(PackError::InvalidContainer(
                "Invalid header magic".to_string(),
            ));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&header[4..8]);
        if u32::from_le_bytes(version) != layout.version {
            return Err(PackError::InvalidContainer(
                "Header and footer versions differ".to_string(),
            ));
        }

        Ok(Some(layout))
    }

    /// Get the stub size (bytes before the container)
    pub fn original_size(path: &Path) -> PackResult<Option<u64>> {
        Ok(Self::read_layout(path)?.map(|l| l.base_offset))
    }

    /// Open a container
    pub fn open(path: &Path) -> PackResult<Option<Self>> {
        Self::open_with_metrics(path, None)
    }

    /// Open a container, recording timings
    pub fn open_with_metrics(
        path: &Path,
        mut metrics: Option<&mut LaunchMetrics>,
    ) -> PackResult<Option<Self>> {
        let layout = match Self::read_layout(path)? {
            Some(layout) => layout,
            None => return Ok(None),
        };
        if let Some(ref mut m) = metrics {
            m.mark_layout_read();
        }

        let file = File::open(path)?;
        let mut reader = BufReader::with_capacity(64 * 1024, file);

        let read_start = Instant::now();
        let metadata_len = usize::try_from(layout.metadata_size).map_err(|_| {
            PackError::InvalidContainer(format!("Metadata too large: {}", layout.metadata_size))
        })?;
        reader.seek(SeekFrom::Start(layout.base_offset + layout.metadata_offset))?;
        let mut compressed = vec![0u8; metadata_len];
        reader.read_exact(&mut compressed)?;

        let json = zstd::decode_all(&compressed[..])
            .map_err(|e| PackError::Compression(e.to_string()))?;
        let metadata: BootMetadata = serde_json::from_slice(&json)?;

        if metadata.version != layout.version {
            return Err(PackError::InvalidContainer(format!(
                "Metadata version {} does not match footer version {}",
                metadata.version, layout.version
            )));
        }

        if let Some(ref mut m) = metrics {
            m.add_phase("metadata_read_decompress", read_start.elapsed());
            m.mark_metadata_read();
        }

        tracing::debug!(
            "Metadata: {} bytes compressed -> {} bytes, {} groups, hash {}",
            layout.metadata_size,
            json.len(),
            metadata.pool.len(),
            metadata.content_hash
        );

        Ok(Some(Self {
            reader,
            path: path.to_path_buf(),
            layout,
            metadata,
        }))
    }

    /// Path of the packed file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Container position
    pub fn layout(&self) -> ContainerLayout {
        self.layout
    }

    /// Decoded metadata
    pub fn metadata(&self) -> &BootMetadata {
        &self.metadata
    }

    /// Read, decompress and verify one resource
    pub fn read_resource(&mut self, resource: &Resource) -> PackResult<Vec<u8>> {
        let end = resource
            .offset
            .checked_add(resource.compressed_size)
            .filter(|end| *end <= self.layout.metadata_offset && resource.offset >= HEADER_SIZE)
            .ok_or_else(|| {
                PackError::InvalidContainer(format!(
                    "{}: payload {}+{} outside the container",
                    resource.name, resource.offset, resource.compressed_size
                ))
            })?;
        let len = usize::try_from(end - resource.offset).map_err(|_| {
            PackError::InvalidContainer(format!("{}: payload too large", resource.name))
        })?;

        self.reader
            .seek(SeekFrom::Start(self.layout.base_offset + resource.offset))?;
        let mut compressed = vec![0u8; len];
        self.reader.read_exact(&mut compressed)?;

        let data = decompress(resource.method, &compressed, resource.size)?;
        resource.verify(&data)?;
        Ok(data)
    }

    /// Read a resource by group index and name
    pub fn read(&mut self, group: usize, name: &str) -> PackResult<Vec<u8>> {
        let resource = self
            .metadata
            .pool
            .get(group)
            .and_then(|g| g.get(name))
            .cloned()
            .ok_or_else(|| PackError::ResourceNotFound(format!("{}#{}", group, name)))?;
        self.read_resource(&resource)
    }

    /// Extract the merged view of `indices` into `dest`, returning the file count
    pub fn extract_groups(&mut self, indices: &[usize], dest: &Path) -> PackResult<usize> {
        let group = resolve_group(&self.metadata.pool, indices)?;
        fs::create_dir_all(dest)?;

        let mut count = 0;
        for resource in group.iter() {
            let target = safe_join(dest, &resource.name)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let data = self.read_resource(resource)?;
            write_with_mtime(&target, &data, resource.last_modified_time)?;
            count += 1;
        }

        tracing::debug!("Extracted {} files to {}", count, dest.display());
        Ok(count)
    }

    /// Write the embedded boot module to `dest`; `false` when there is none
    pub fn extract_boot(&mut self, dest: &Path) -> PackResult<bool> {
        let boot = match self.metadata.boot.clone() {
            Some(boot) => boot,
            None => return Ok(false),
        };
        let data = self.read_resource(&boot)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write next to the target and rename so concurrent launches never
        // observe a partial jar.
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(&data)?;
        temp.as_file().sync_all()?;
        temp.persist(dest).map_err(|e| PackError::Io(e.error))?;
        Ok(true)
    }
}

/// Copy the bytes in front of any container of `src` into `dest`
///
/// Files without a container are copied whole. Returns the stub length.
pub fn copy_stub(src: &Path, dest: &mut impl Write) -> PackResult<u64> {
    let stub_len = match ContainerReader::original_size(src)? {
        Some(len) => {
            tracing::debug!(
                "{} already carries a container, using its first {} bytes",
                src.display(),
                len
            );
            len
        }
        None => fs::metadata(src)?.len(),
    };

    let mut input = File::open(src)?.take(stub_len);
    let copied = std::io::copy(&mut input, dest)?;
    if copied != stub_len {
        return Err(PackError::InvalidContainer(format!(
            "Stub truncated: copied {} of {} bytes",
            copied, stub_len
        )));
    }
    Ok(stub_len)
}

/// Join a `/`-separated resource name under `root`, refusing escapes
pub fn safe_join(root: &Path, name: &str) -> PackResult<PathBuf> {
    let relative = Path::new(name);
    if name.is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(PackError::InvalidContainer(format!(
            "Unsafe resource name: {}",
            name
        )));
    }
    Ok(root.join(relative))
}

fn write_with_mtime(path: &Path, data: &[u8], modified: Option<i64>) -> PackResult<()> {
    let file = File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    writer.write_all(data)?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    if let Some(millis) = modified.and_then(|m| u64::try_from(m).ok()) {
        let time = UNIX_EPOCH + Duration::from_millis(millis);
        if let Err(e) = file.set_modified(time) {
            tracing::debug!("Cannot set mtime of {}: {}", path.display(), e);
        }
    }
    Ok(())
}

/// Milliseconds since the Unix epoch, `None` for pre-epoch or unavailable times
pub(crate) fn system_time_millis(time: std::io::Result<SystemTime>) -> Option<i64> {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_millis()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footer_roundtrip() {
        let layout = ContainerLayout {
            base_offset: 1234,
            metadata_offset: 5678,
            metadata_size: 90,
            version: CONTAINER_VERSION,
        };
        assert_eq!(ContainerLayout::decode(&layout.encode()), Some(layout));

        let mut broken = layout.encode();
        broken[31] = b'X';
        assert_eq!(ContainerLayout::decode(&broken), None);
    }

    #[test]
    fn test_extension() {
        assert_eq!(
            PendingResource::new("a/b/Image.PNG", vec![]).extension(),
            Some("png".to_string())
        );
        assert_eq!(PendingResource::new("a.dir/README", vec![]).extension(), None);
        assert_eq!(PendingResource::new(".hidden", vec![]).extension(), None);
    }

    #[test]
    fn test_safe_join() {
        let root = Path::new("/tmp/out");
        assert!(safe_join(root, "a/b.class").is_ok());
        assert!(safe_join(root, "../etc/passwd").is_err());
        assert!(safe_join(root, "/etc/passwd").is_err());
        assert!(safe_join(root, "a/./b").is_ok());
        assert!(safe_join(root, "").is_err());
    }
}
