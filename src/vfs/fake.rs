//! An in-memory volume for synthetic evidence and tests.

use std::{
    collections::BTreeMap,
    sync::{Arc, Weak},
};

use super::{normalize_location, FileEntry, FileEntryKind, FileSystem};
use crate::{
    file_io::{FileIO, Memory},
    path::{PathSpec, TypeIndicator},
    Error, Result,
};

#[derive(Debug, Clone)]
enum FakeNode {
    Directory,
    File(Arc<[u8]>),
}

/// The contents of a [`FakeFileSystem`]: files and directories keyed by absolute location.
///
/// Parent directories are created implicitly. The root `/` always exists.
///
/// # Examples
///
/// ```rust
/// use vfscope::FakeVolume;
///
/// let mut volume = FakeVolume::new();
/// volume.add_file("/cases/0042/image.raw", vec![0u8; 1024]);
/// volume.add_directory("/cases/empty");
///
/// assert!(volume.contains("/cases/0042"));
/// assert_eq!(volume.len(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct FakeVolume {
    nodes: BTreeMap<String, FakeNode>,
}

impl Default for FakeVolume {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), FakeNode::Directory);
        FakeVolume { nodes }
    }
}

impl FakeVolume {
    /// Creates a volume containing only the root directory.
    #[must_use]
    pub fn new() -> FakeVolume {
        FakeVolume::default()
    }

    /// Adds a file, replacing any node at `location`.
    pub fn add_file(&mut self, location: &str, data: impl Into<Arc<[u8]>>) -> &mut Self {
        let location = normalize_location(location);
        self.add_parents(&location);
        self.nodes.insert(location, FakeNode::File(data.into()));
        self
    }

    /// Adds a directory and its parents.
    pub fn add_directory(&mut self, location: &str) -> &mut Self {
        let location = normalize_location(location);
        self.add_parents(&location);
        self.nodes.insert(location, FakeNode::Directory);
        self
    }

    fn add_parents(&mut self, location: &str) {
        let mut parent = String::new();
        let segments: Vec<&str> = location.split('/').filter(|s| !s.is_empty()).collect();
        for segment in segments.iter().take(segments.len().saturating_sub(1)) {
            parent.push('/');
            parent.push_str(segment);
            self.nodes
                .entry(parent.clone())
                .or_insert(FakeNode::Directory);
        }
    }

    /// Returns `true` if a node exists at `location`.
    #[must_use]
    pub fn contains(&self, location: &str) -> bool {
        self.nodes.contains_key(&normalize_location(location))
    }

    /// Number of nodes, the root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the volume holds only the root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }
}

/// A file system over a [`FakeVolume`].
#[derive(Debug)]
pub struct FakeFileSystem {
    me: Weak<FakeFileSystem>,
    volume: Arc<FakeVolume>,
}

impl FakeFileSystem {
    /// Opens a file system over `volume`.
    #[must_use]
    pub fn new(volume: Arc<FakeVolume>) -> Arc<FakeFileSystem> {
        Arc::new_cyclic(|me| FakeFileSystem {
            me: me.clone(),
            volume,
        })
    }

    fn entry(&self, location: &str, node: &FakeNode) -> FileEntry {
        let path_spec = PathSpec::fake(location);
        if location == "/" {
            return FileEntry::new(self.me.clone(), path_spec, "", FileEntryKind::Directory)
                .with_root();
        }

        let name = self.basename(location);
        match node {
            FakeNode::Directory => {
                FileEntry::new(self.me.clone(), path_spec, name, FileEntryKind::Directory)
            }
            FakeNode::File(data) => {
                FileEntry::new(self.me.clone(), path_spec, name, FileEntryKind::File)
                    .with_size(data.len() as u64)
            }
        }
    }
}

impl FileSystem for FakeFileSystem {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Fake
    }

    fn get_file_entry_by_path_spec(&self, path_spec: &PathSpec) -> Result<Option<FileEntry>> {
        let Some(location) = path_spec.location() else {
            return Ok(None);
        };
        let location = normalize_location(location);
        Ok(self
            .volume
            .nodes
            .get(&location)
            .map(|node| self.entry(&location, node)))
    }

    fn get_root_file_entry(&self) -> Result<Option<FileEntry>> {
        Ok(Some(self.entry("/", &FakeNode::Directory)))
    }

    fn sub_file_entries(&self, entry: &FileEntry) -> Result<Vec<FileEntry>> {
        let Some(location) = entry.path_spec().location() else {
            return Ok(Vec::new());
        };
        let parent = normalize_location(location);

        Ok(self
            .volume
            .nodes
            .iter()
            .filter(|(child, _)| child.as_str() != "/" && self.dirname(child) == parent)
            .map(|(child, node)| self.entry(child, node))
            .collect())
    }

    fn open_entry_stream(&self, path_spec: &PathSpec) -> Result<Arc<dyn FileIO>> {
        let location = normalize_location(path_spec.location().unwrap_or_default());
        match self.volume.nodes.get(&location) {
            Some(FakeNode::File(data)) => Ok(Arc::new(Memory::new(data.clone()))),
            Some(FakeNode::Directory) => Err(Error::Error(format!(
                "{location} is a directory"
            ))),
            None => Err(Error::NotFound(location)),
        }
    }
}
