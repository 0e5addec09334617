//! The partition table back-end.
//!
//! The root `/` lists one entry per partition, named `p1`, `p2`, ... after the 1-based index
//! reported by the [`PartitionAnalyzer`]. A partition is addressed either by location (`/p2`) or
//! by the `partition_index` attribute of the path specification.

use std::sync::{Arc, Weak};

use tracing::debug;

use super::{normalize_location, FileEntry, FileEntryKind, FileSystem};
use crate::{
    file_io::{FileIO, RangedFile},
    formats::partition::{PartitionAnalyzer, PartitionInfo},
    path::{PathSpec, TypeIndicator},
    resolver::{HeldLease, Lease},
    Error, Result,
};

/// The partitions of a disk image stored in a parent stream.
#[derive(Debug)]
pub struct PartitionFileSystem {
    me: Weak<PartitionFileSystem>,
    identity: PathSpec,
    partitions: Vec<PartitionInfo>,
    parent: HeldLease<dyn FileIO>,
}

impl PartitionFileSystem {
    /// Runs `analyzer` over the disk image in `parent`.
    ///
    /// # Errors
    /// Returns the analyzer's error if no partition table can be read.
    pub fn open(
        identity: PathSpec,
        parent: Lease<dyn FileIO>,
        analyzer: &dyn PartitionAnalyzer,
        sector_size: u64,
    ) -> Result<Arc<PartitionFileSystem>> {
        let mut partitions = analyzer.analyze(&*parent, sector_size)?;
        partitions.sort_by_key(|partition| partition.index);
        debug!(
            partitions = partitions.len(),
            sector_size, "opened partition table"
        );

        Ok(Arc::new_cyclic(|me| PartitionFileSystem {
            me: me.clone(),
            identity,
            partitions,
            parent: HeldLease::new(parent),
        }))
    }

    /// The partitions found on the disk image, ordered by index.
    #[must_use]
    pub fn partitions(&self) -> &[PartitionInfo] {
        &self.partitions
    }

    fn root(&self) -> FileEntry {
        FileEntry::new(
            self.me.clone(),
            self.identity.clone().with_location("/"),
            "",
            FileEntryKind::Directory,
        )
        .with_root()
    }

    fn entry(&self, partition: &PartitionInfo) -> FileEntry {
        let name = format!("p{}", partition.index);
        FileEntry::new(
            self.me.clone(),
            self.identity.clone().with_location(format!("/{name}")),
            name,
            FileEntryKind::Partition,
        )
        .with_size(partition.size)
    }

    fn find(&self, index: u32) -> Option<&PartitionInfo> {
        self.partitions
            .iter()
            .find(|partition| partition.index == index)
    }

    /// Resolves `path_spec` to the root (`Ok(None)`) or a partition.
    fn lookup(&self, path_spec: &PathSpec) -> Result<Option<&PartitionInfo>> {
        if let Some(index) = path_spec.attributes().partition_index {
            return self
                .find(index)
                .map(Some)
                .ok_or_else(|| Error::NotFound(format!("partition index {index}")));
        }

        let location = normalize_location(path_spec.location().unwrap_or_default());
        if location == "/" {
            return Ok(None);
        }
        location
            .strip_prefix("/p")
            .and_then(|index| index.parse::<u32>().ok())
            .and_then(|index| self.find(index))
            .map(Some)
            .ok_or(Error::NotFound(location))
    }
}

impl FileSystem for PartitionFileSystem {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Partition
    }

    fn get_file_entry_by_path_spec(&self, path_spec: &PathSpec) -> Result<Option<FileEntry>> {
        match self.lookup(path_spec) {
            Ok(Some(partition)) => Ok(Some(self.entry(partition))),
            Ok(None) => Ok(Some(self.root())),
            Err(Error::NotFound(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    fn get_root_file_entry(&self) -> Result<Option<FileEntry>> {
        Ok(Some(self.root()))
    }

    fn sub_file_entries(&self, entry: &FileEntry) -> Result<Vec<FileEntry>> {
        if !entry.is_root() {
            return Ok(Vec::new());
        }
        Ok(self
            .partitions
            .iter()
            .map(|partition| self.entry(partition))
            .collect())
    }

    fn open_entry_stream(&self, path_spec: &PathSpec) -> Result<Arc<dyn FileIO>> {
        let Some(partition) = self.lookup(path_spec)? else {
            return Err(Error::Error(
                "the partition table root has no data".to_string(),
            ));
        };

        let source = self.parent.handle().ok_or(Error::FileSystemClosed)?;
        Ok(Arc::new(RangedFile::new(
            source,
            partition.offset,
            partition.size,
        )?))
    }

    fn close(&self) -> Result<()> {
        self.parent.release()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::{file_io::Memory, resolver::CacheKey, test::StubAnalyzer, ResolverContext};

    fn open(analyzer: &StubAnalyzer) -> (Arc<PartitionFileSystem>, PathSpec) {
        let mut disk = vec![0u8; 4096];
        disk[1024..1536].fill(b'A');
        disk[2048..3072].fill(b'B');

        let context = Arc::new(ResolverContext::new());
        let image = PathSpec::fake("/disk.raw");
        let parent: Lease<dyn FileIO> = context
            .acquire(CacheKey::file_object(&image), || {
                Ok(Arc::new(Memory::new(disk)) as Arc<dyn FileIO>)
            })
            .unwrap();

        let identity = PathSpec::partition("/", image.clone()).file_system_identity();
        let fs = PartitionFileSystem::open(identity, parent, analyzer, 512).unwrap();
        (fs, image)
    }

    fn stub() -> Arc<StubAnalyzer> {
        StubAnalyzer::new(vec![
            StubAnalyzer::partition(2, 2048, 1024),
            StubAnalyzer::partition(1, 1024, 512),
        ])
    }

    #[test]
    fn entries_by_location_and_index() {
        let analyzer = stub();
        let (fs, image) = open(&analyzer);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*analyzer.seen_sizes.lock().unwrap(), vec![4096]);

        let by_location = fs
            .get_file_entry_by_path_spec(&PathSpec::partition("/p2", image.clone()))
            .unwrap()
            .unwrap();
        let by_index = fs
            .get_file_entry_by_path_spec(&PathSpec::partition_index(2, image.clone()))
            .unwrap()
            .unwrap();
        assert_eq!(by_location.name(), "p2");
        assert_eq!(by_location.path_spec(), by_index.path_spec());
        assert_eq!(by_location.size(), Some(1024));
        assert_eq!(by_location.kind(), FileEntryKind::Partition);

        for missing in ["/p3", "/p0", "/q1", "/p1/x"] {
            assert!(
                !fs.file_entry_exists_by_path_spec(&PathSpec::partition(missing, image.clone())),
                "{missing}"
            );
        }
        assert!(!fs.file_entry_exists_by_path_spec(&PathSpec::partition_index(9, image)));
    }

    #[test]
    fn root_lists_partitions_in_order() {
        let analyzer = stub();
        let (fs, _image) = open(&analyzer);
        let root = fs.get_root_file_entry().unwrap().unwrap();

        let names: Vec<String> = root
            .sub_file_entries()
            .unwrap()
            .iter()
            .map(|entry| entry.name().to_string())
            .collect();
        assert_eq!(names, vec!["p1", "p2"]);
    }

    #[test]
    fn partition_streams() {
        let analyzer = stub();
        let (fs, image) = open(&analyzer);

        let p1 = fs
            .open_entry_stream(&PathSpec::partition("/p1", image.clone()))
            .unwrap();
        assert_eq!(p1.read_all().unwrap(), vec![b'A'; 512]);

        let p2 = fs
            .open_entry_stream(&PathSpec::partition_index(2, image.clone()))
            .unwrap();
        assert_eq!(p2.size().unwrap(), 1024);
        assert_eq!(p2.read_vec(1000, 24).unwrap(), vec![b'B'; 24]);

        assert!(fs
            .open_entry_stream(&PathSpec::partition("/", image))
            .is_err());
    }
}
