//! Resource entries, resource groups and references to them
//!
//! A group is the unit the boot module mounts: one jar, one class directory,
//! or one multi-release overlay of a jar. Groups live in a pool inside the
//! container metadata and are referenced by index.

use crate::compress::CompressionMethod;
use crate::{PackError, PackResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

/// A single packed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Name inside its group, `/` separated
    pub name: String,
    /// Offset of the payload, relative to the container base
    pub offset: u64,
    /// Uncompressed size
    pub size: u64,
    /// Compression applied to the payload
    pub method: CompressionMethod,
    /// Size of the payload in the container
    pub compressed_size: u64,
    /// Creation time in milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
    /// Modification time in milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_time: Option<i64>,
    /// Access time in milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_access_time: Option<i64>,
    /// First 64 bits of the BLAKE3 digest of the uncompressed bytes (hex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl Resource {
    /// Verify uncompressed bytes against the recorded size and checksum
    pub fn verify(&self, data: &[u8]) -> PackResult<()> {
        if data.len() as u64 != self.size {
            return Err(PackError::InvalidContainer(format!(
                "{}: size {} does not match recorded {}",
                self.name,
                data.len(),
                self.size
            )));
        }

        if let Some(ref expected) = self.checksum {
            let actual = checksum(data);
            if &actual != expected {
                return Err(PackError::ChecksumMismatch {
                    name: self.name.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(())
    }
}

/// Checksum string for resource content (16 hex chars)
pub fn checksum(data: &[u8]) -> String {
    short_hash(blake3::hash(data))
}

/// Format the first 64 bits of a BLAKE3 digest as 16 hex chars
pub(crate) fn short_hash(hash: blake3::Hash) -> String {
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    format!("{:016x}", u64::from_le_bytes(prefix))
}

/// Resources of one jar, directory or multi-release layer, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceGroup {
    resources: BTreeMap<String, Resource>,
}

impl ResourceGroup {
    /// Create an empty group
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource under its own name, returning any replaced entry
    pub fn insert(&mut self, resource: Resource) -> Option<Resource> {
        self.resources.insert(resource.name.clone(), resource)
    }

    /// Look up a resource
    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    /// Iterate resources in name order
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Number of resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if the group is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Total uncompressed size
    pub fn total_size(&self) -> u64 {
        self.resources.values().map(|r| r.size).sum()
    }

    /// Total payload size in the container
    pub fn compressed_size(&self) -> u64 {
        self.resources.values().map(|r| r.compressed_size).sum()
    }

    /// Overlay another group on top of this one
    pub fn merge(&mut self, other: &ResourceGroup) {
        for resource in other.iter() {
            self.resources
                .insert(resource.name.clone(), resource.clone());
        }
    }
}

/// Where the content of a path item lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupReference {
    /// Packed into the container
    Local {
        /// Index of the base group in the pool
        base: usize,
        /// Java feature version -> index of the overlay group
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        multi_release: BTreeMap<u32, usize>,
    },
    /// Left on disk, referenced by absolute path
    External {
        /// Path resolved at pack time
        path: PathBuf,
    },
}

impl GroupReference {
    /// Reference to a single local group
    pub fn local(base: usize) -> Self {
        GroupReference::Local {
            base,
            multi_release: BTreeMap::new(),
        }
    }

    /// Pool indices visible to a runtime of the given Java feature version
    ///
    /// Overlays apply in ascending version order. With an unknown runtime
    /// version only the base group is used.
    pub fn indices_for(&self, java_version: Option<u32>) -> Vec<usize> {
        match self {
            GroupReference::Local {
                base,
                multi_release,
            } => {
                let mut indices = vec![*base];
                if let Some(runtime) = java_version {
                    indices.extend(
                        multi_release
                            .iter()
                            .filter(|(version, _)| **version <= runtime)
                            .map(|(_, index)| *index),
                    );
                }
                indices
            }
            GroupReference::External { .. } => Vec::new(),
        }
    }

    /// Encode for the boot module: `0+a` (hex indices) or `E<path>`
    pub fn encode(&self, java_version: Option<u32>) -> String {
        match self {
            GroupReference::Local { .. } => {
                let mut out = String::new();
                for (i, index) in self.indices_for(java_version).iter().enumerate() {
                    if i > 0 {
                        out.push('+');
                    }
                    let _ = write!(out, "{:x}", index);
                }
                out
            }
            GroupReference::External { path } => format!("E{}", path.display()),
        }
    }
}

/// A module path or class path element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathItem {
    /// Module name on the module path; jar file name or empty on the class path
    #[serde(default)]
    pub name: String,
    /// Where the content lives
    pub reference: GroupReference,
}

impl PathItem {
    /// Create a path item
    pub fn new(name: impl Into<String>, reference: GroupReference) -> Self {
        Self {
            name: name.into(),
            reference,
        }
    }

    /// Boot property form `name:reference`
    pub fn encode(&self, java_version: Option<u32>) -> String {
        format!("{}:{}", self.name, self.reference.encode(java_version))
    }
}

/// Merge the groups at `indices` into one view
pub fn resolve_group(pool: &[ResourceGroup], indices: &[usize]) -> PackResult<ResourceGroup> {
    let mut merged = ResourceGroup::new();
    for &index in indices {
        let group = pool.get(index).ok_or_else(|| {
            PackError::InvalidContainer(format!(
                "Group index {} out of range (pool has {})",
                index,
                pool.len()
            ))
        })?;
        merged.merge(group);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(name: &str, offset: u64) -> Resource {
        Resource {
            name: name.to_string(),
            offset,
            size: 1,
            method: CompressionMethod::None,
            compressed_size: 1,
            creation_time: None,
            last_modified_time: None,
            last_access_time: None,
            checksum: None,
        }
    }

    #[test]
    fn test_checksum_is_16_hex_chars() {
        let sum = checksum(b"hello world");
        assert_eq!(sum.len(), 16);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(sum, checksum(b"hello world"));
        assert_ne!(sum, checksum(b"hello world!"));
    }

    #[test]
    fn test_merge_overrides() {
        let mut base = ResourceGroup::new();
        base.insert(resource("a.class", 0));
        base.insert(resource("b.class", 1));

        let mut overlay = ResourceGroup::new();
        overlay.insert(resource("b.class", 7));

        base.merge(&overlay);
        assert_eq!(base.len(), 2);
        assert_eq!(base.get("b.class").unwrap().offset, 7);
    }

    #[test]
    fn test_reference_encoding() {
        let mut multi_release = BTreeMap::new();
        multi_release.insert(11, 12);
        multi_release.insert(17, 13);
        let reference = GroupReference::Local {
            base: 10,
            multi_release,
        };

        assert_eq!(reference.encode(None), "a");
        assert_eq!(reference.encode(Some(11)), "a+c");
        assert_eq!(reference.encode(Some(21)), "a+c+d");

        let external = GroupReference::External {
            path: PathBuf::from("/opt/lib/x.jar"),
        };
        assert_eq!(external.encode(Some(21)), "E/opt/lib/x.jar");
    }

    #[test]
    fn test_resolve_group_out_of_range() {
        let pool = vec![ResourceGroup::new()];
        assert!(resolve_group(&pool, &[0]).is_ok());
        assert!(resolve_group(&pool, &[1]).is_err());
    }
}
