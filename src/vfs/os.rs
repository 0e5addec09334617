//! The host operating system back-end.
//!
//! Locations are host paths. Path joining follows the [`PathStyle`] chosen at construction, not
//! the platform the code happens to run on, so Windows evidence paths can be normalized on any
//! host.
//!
//! # Windows path rules
//!
//! The first segment passed to [`FileSystem::join_path`] may carry a prefix that is kept
//! verbatim. Prefixes are recognized in this order:
//!
//! | Segments                          | Prefix      | Result                          |
//! |-----------------------------------|-------------|---------------------------------|
//! | `\\.\C:\`, `Windows`               | `C:`        | `C:\Windows`                    |
//! | `\\.\C:\Windows`, `System32`       | `C:`        | `C:Windows\System32`            |
//! | `\\?\Volume{...}\`, `file`          | verbatim    | `\\?\Volume{...}\file`          |
//! | `C:`, `Windows`, `System32`       | `C:`        | `C:\Windows\System32`           |
//! | `\\server\share`, `dir`, `file.txt` | `\\server`  | `\\server\share\dir\file.txt`   |
//!
//! The prefix is glued to the first component of the remainder of its segment, and every
//! following component is appended after a separator. If the prefix consumes the whole segment,
//! the segment is dropped and the next segment is appended after a separator, so `\\.\`
//! followed by `C:` joins to `\\.\\C:`.

use std::{
    env, fs, io,
    sync::{Arc, Weak},
};

use super::{join_segments, FileEntry, FileEntryKind, FileSystem};
use crate::{
    config::PathStyle,
    file_io::{FileIO, OsFile},
    path::{PathSpec, TypeIndicator},
    Error, Result,
};

/// The directory tree of the host operating system.
#[derive(Debug)]
pub struct OsFileSystem {
    me: Weak<OsFileSystem>,
    style: PathStyle,
}

impl OsFileSystem {
    /// Creates a file system with the given path conventions.
    #[must_use]
    pub fn new(style: PathStyle) -> Arc<OsFileSystem> {
        Arc::new_cyclic(|me| OsFileSystem {
            me: me.clone(),
            style,
        })
    }

    /// The path conventions of this file system.
    #[must_use]
    pub fn path_style(&self) -> PathStyle {
        self.style
    }

    fn root_location(&self) -> Option<String> {
        match self.style {
            PathStyle::Posix => Some("/".to_string()),
            PathStyle::Windows => {
                // The root is the drive of the current working directory.
                let cwd = env::current_dir().ok()?;
                let cwd = cwd.to_string_lossy();
                let drive = cwd.split('\\').next()?;
                if drive.len() == 2 && drive.ends_with(':') {
                    Some(format!("{drive}\\"))
                } else {
                    None
                }
            }
        }
    }

    fn is_root_location(&self, location: &str) -> bool {
        let segments = self.split_path(location);
        match self.style {
            PathStyle::Posix => segments.is_empty(),
            PathStyle::Windows => {
                segments.len() == 1 && segments[0].len() == 2 && segments[0].ends_with(':')
            }
        }
    }

    fn entry(&self, location: &str, metadata: &fs::Metadata) -> FileEntry {
        let path_spec = PathSpec::os(location);
        let kind = entry_kind(metadata);

        let mut entry = if self.is_root_location(location) {
            FileEntry::new(self.me.clone(), path_spec, "", kind).with_root()
        } else {
            FileEntry::new(self.me.clone(), path_spec, self.basename(location), kind)
        };
        if metadata.is_file() {
            entry = entry.with_size(metadata.len());
        }
        entry
    }
}

fn entry_kind(metadata: &fs::Metadata) -> FileEntryKind {
    let file_type = metadata.file_type();
    if file_type.is_dir() {
        return FileEntryKind::Directory;
    }
    if file_type.is_symlink() {
        return FileEntryKind::Link;
    }
    if file_type.is_file() {
        return FileEntryKind::File;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;

        if file_type.is_block_device() || file_type.is_char_device() {
            return FileEntryKind::Device;
        }
        if file_type.is_fifo() {
            return FileEntryKind::Pipe;
        }
        if file_type.is_socket() {
            return FileEntryKind::Socket;
        }
    }

    FileEntryKind::File
}

fn lookup(location: &str) -> Result<Option<fs::Metadata>> {
    match fs::symlink_metadata(location) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(Error::FileError(error)),
    }
}

impl FileSystem for OsFileSystem {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Os
    }

    fn path_separator(&self) -> char {
        self.style.separator()
    }

    fn get_file_entry_by_path_spec(&self, path_spec: &PathSpec) -> Result<Option<FileEntry>> {
        let Some(location) = path_spec.location() else {
            return Ok(None);
        };
        Ok(lookup(location)?.map(|metadata| self.entry(location, &metadata)))
    }

    fn get_root_file_entry(&self) -> Result<Option<FileEntry>> {
        let Some(location) = self.root_location() else {
            return Ok(None);
        };
        Ok(lookup(&location)?.map(|metadata| self.entry(&location, &metadata)))
    }

    fn sub_file_entries(&self, entry: &FileEntry) -> Result<Vec<FileEntry>> {
        let Some(location) = entry.path_spec().location() else {
            return Ok(Vec::new());
        };
        if !entry.is_directory() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for child in fs::read_dir(location)? {
            let child = child?;
            let name = child.file_name().to_string_lossy().into_owned();
            let child_location = self.join_path(&[location, name.as_str()]);
            if let Some(metadata) = lookup(&child_location)? {
                entries.push(self.entry(&child_location, &metadata));
            }
        }
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(entries)
    }

    fn open_entry_stream(&self, path_spec: &PathSpec) -> Result<Arc<dyn FileIO>> {
        let Some(location) = path_spec.location() else {
            return Err(Error::PathSpec("OS requires a location".to_string()));
        };
        if lookup(location)?.is_none() {
            return Err(Error::NotFound(location.to_string()));
        }
        Ok(Arc::new(OsFile::open(location)?))
    }

    fn join_path(&self, segments: &[&str]) -> String {
        match self.style {
            PathStyle::Posix => join_segments('/', segments),
            PathStyle::Windows => join_windows(segments),
        }
    }

    fn split_path(&self, path: &str) -> Vec<String> {
        match self.style {
            PathStyle::Posix => split_on(path, '/').map(str::to_string).collect(),
            PathStyle::Windows => split_windows(path),
        }
    }

    fn dirname(&self, path: &str) -> String {
        let mut segments = self.split_path(path);
        segments.pop();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        let mut parent = self.join_path(&segments);

        if self.style == PathStyle::Windows && parent.len() == 2 && parent.ends_with(':') {
            parent.push('\\');
        }
        parent
    }
}

fn split_on(path: &str, separator: char) -> impl Iterator<Item = &str> {
    path.split(separator).filter(|segment| !segment.is_empty())
}

/// Splits the special prefix off the first segment of a Windows path.
fn windows_prefix(segment: &str) -> Option<(String, String)> {
    if segment.starts_with(r"\\.\") && segment.get(5..7) == Some(":\\") {
        let prefix = segment.get(4..6)?;
        return Some((prefix.to_string(), segment[7..].to_string()));
    }
    if segment.starts_with(r"\\.\") || segment.starts_with(r"\\?\") {
        return Some((segment[..4].to_string(), segment[4..].to_string()));
    }
    if segment.get(1..2) == Some(":") {
        return Some((segment[..2].to_string(), segment[2..].to_string()));
    }
    if let Some(unc) = segment.strip_prefix(r"\\") {
        let (server, share) = unc.split_once('\\').unwrap_or((unc, ""));
        return Some((format!(r"\\{server}"), format!(r"\{share}")));
    }
    None
}

fn join_windows(segments: &[&str]) -> String {
    let mut remainder_holder = String::new();
    let mut segments: Vec<&str> = segments.to_vec();
    let mut first = None;

    if let Some((prefix, rest)) = segments.first().and_then(|head| windows_prefix(head)) {
        let (component, remainder) = rest.split_once('\\').unwrap_or((rest.as_str(), ""));
        first = Some(format!("{prefix}{component}"));
        if remainder.is_empty() {
            segments.remove(0);
        } else {
            remainder_holder = remainder.to_string();
        }
    }
    if !remainder_holder.is_empty() {
        segments[0] = &remainder_holder;
    }

    let rest: Vec<&str> = segments
        .iter()
        .flat_map(|segment| split_on(segment, '\\'))
        .collect();

    match first {
        None => format!("\\{}", rest.join("\\")),
        Some(mut path) => {
            if !rest.is_empty() {
                path.push('\\');
                path.push_str(&rest.join("\\"));
            }
            path
        }
    }
}

fn split_windows(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut rest = path;

    if path.starts_with(r"\\.\") || path.starts_with(r"\\?\") {
        segments.push(path[..4].to_string());
        rest = &path[4..];
    } else if let Some(unc) = path.strip_prefix(r"\\") {
        let mut parts = split_on(unc, '\\');
        match (parts.next(), parts.next()) {
            (Some(server), Some(share)) => segments.push(format!(r"\\{server}\{share}")),
            (Some(server), None) => segments.push(format!(r"\\{server}")),
            _ => {}
        }
        segments.extend(parts.map(str::to_string));
        return segments;
    }

    segments.extend(split_on(rest, '\\').map(str::to_string));
    segments
}
