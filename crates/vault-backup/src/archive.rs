//! Zip archives of a directory tree.
//!
//! [`compress`] walks the tree twice: once to count the files so progress can be reported against
//! a fixed total, then again to write every entry into a spooled temporary file. Entry names are
//! relative to the parent of the archived directory, so archiving `/data/vault` yields entries
//! under `vault/`. Directory entries end in `/` so empty directories survive a round trip.
//!

use std::{
    fs::{self, File},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use shared::Progress;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};
use zip::{
    CompressionMethod, ZipArchive, ZipWriter, result::ZipError, write::SimpleFileOptions,
};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// A finished archive, spooled to an anonymous temporary file and rewound to its start.
#[derive(Debug)]
pub struct ArchiveStream {
    spool: File,
    len: u64,
    files: u64,
}

impl ArchiveStream {
    /// The size of the archive in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// If the archive contains no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The number of file entries in the archive.
    pub fn files(&self) -> u64 {
        self.files
    }
}

impl Read for ArchiveStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.spool.read(buf)
    }
}

impl Seek for ArchiveStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.spool.seek(pos)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Directory,
    File,
}

/// Archive the directory at `root`.
///
/// `progress` is updated after every file entry with `(files written, total files)`.
pub fn compress(
    root: &Path,
    mut progress: Option<&mut dyn Progress>,
) -> Result<ArchiveStream, ArchiveError> {
    let root_name = match root.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => return Err(ArchiveError::UnnamedRoot(root.to_path_buf())),
    };

    // Count pass
    let mut total_files: u64 = 0;
    walk(root, &root_name, &mut |_, _, kind| {
        if kind == EntryKind::File {
            total_files += 1;
        }
        Ok(())
    })?;
    debug!("Archiving {total_files} files from {root:?}");

    // Write pass
    let temp_dir = std::env::temp_dir();
    let spool = tempfile::tempfile().map_err(io_failure("create archive spool", &temp_dir))?;
    let mut writer = ZipWriter::new(spool);

    let mut files_written: u64 = 0;
    walk(root, &root_name, &mut |path, name, kind| {
        match kind {
            EntryKind::Directory => {
                let options =
                    SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
                writer
                    .add_directory(format!("{name}/"), options)
                    .map_err(|e| ArchiveError::Write(e, "add directory entry"))?;
            }

            EntryKind::File => {
                let mut source = File::open(path).map_err(io_failure("open file", path))?;
                let file_len = source
                    .metadata()
                    .map_err(io_failure("read file metadata", path))?
                    .len();

                let options = SimpleFileOptions::default()
                    .compression_method(CompressionMethod::Deflated)
                    .large_file(file_len >= u64::from(u32::MAX));
                writer
                    .start_file(name, options)
                    .map_err(|e| ArchiveError::Write(e, "add file entry"))?;
                io::copy(&mut source, &mut writer).map_err(io_failure("archive file", path))?;

                files_written += 1;
                if let Some(progress) = progress.as_deref_mut() {
                    progress.update(files_written, total_files);
                }
            }
        }

        Ok(())
    })?;

    let mut spool = writer
        .finish()
        .map_err(|e| ArchiveError::Write(e, "finish archive"))?;
    let len = spool
        .seek(SeekFrom::End(0))
        .map_err(io_failure("measure archive spool", &temp_dir))?;
    spool
        .rewind()
        .map_err(io_failure("rewind archive spool", &temp_dir))?;

    Ok(ArchiveStream {
        spool,
        len,
        files: files_written,
    })
}

/// Visit `path` and everything below it in lexical order, parents before children.
fn walk(
    path: &Path,
    name: &str,
    visit: &mut dyn FnMut(&Path, &str, EntryKind) -> Result<(), ArchiveError>,
) -> Result<(), ArchiveError> {
    let metadata = fs::symlink_metadata(path).map_err(io_failure("read metadata", path))?;

    if metadata.is_dir() {
        visit(path, name, EntryKind::Directory)?;

        let mut children = fs::read_dir(path)
            .map_err(io_failure("read directory", path))?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<Vec<PathBuf>, io::Error>>()
            .map_err(io_failure("read directory entry", path))?;
        children.sort();

        for child in children {
            let child_name = match child.file_name() {
                Some(child_name) => format!("{name}/{}", child_name.to_string_lossy()),
                None => continue,
            };
            walk(&child, &child_name, visit)?;
        }

        return Ok(());
    }

    // Symlinks are followed to files, symlinked directories are not descended into.
    let target = fs::metadata(path).map_err(io_failure("read metadata", path))?;
    if target.is_file() {
        visit(path, name, EntryKind::File)
    } else {
        warn!("Skipping {path:?}, it is not a regular file or directory");
        Ok(())
    }
}

/// Unpack a zip archive into `target`, returning the number of entries written.
///
/// Directories are created before the files inside them and existing files are overwritten.
/// `progress` is updated after every entry with `(entries written, total entries)`.
pub fn extract<R: Read + Seek>(
    archive: R,
    target: &Path,
    mut progress: Option<&mut dyn Progress>,
) -> Result<u64, ArchiveError> {
    let mut archive = ZipArchive::new(archive).map_err(ArchiveError::Corrupt)?;

    fs::create_dir_all(target).map_err(io_failure("create target directory", target))?;

    let total = u64::try_from(archive.len()).unwrap_or(u64::MAX);
    let mut written: u64 = 0;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(ArchiveError::Corrupt)?;

        let relative = match entry.enclosed_name() {
            Some(relative) => relative,
            None => return Err(ArchiveError::UnsafePath(entry.name().to_string())),
        };
        let path = target.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&path).map_err(io_failure("create directory", &path))?;
        } else {
            let parent = path.parent().unwrap_or(target);
            fs::create_dir_all(parent).map_err(io_failure("create directory", parent))?;

            // Existing files are only replaced once the entry has been read in full.
            let mut staged = NamedTempFile::new_in(parent)
                .map_err(io_failure("create staging file in", parent))?;
            copy_entry(&mut entry, staged.as_file_mut(), &path)?;
            staged.persist(&path).map_err(|e| ArchiveError::Io {
                source: e.error,
                action: "replace file",
                path: path.clone(),
            })?;
        }

        written += 1;
        if let Some(progress) = progress.as_deref_mut() {
            progress.update(written, total);
        }
    }

    Ok(written)
}

/// Copy an entry's contents, telling a damaged entry apart from a failed write.
fn copy_entry(entry: &mut dyn Read, output: &mut File, path: &Path) -> Result<(), ArchiveError> {
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let read = match entry.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(ArchiveError::CorruptEntry {
                    source,
                    path: path.to_path_buf(),
                });
            }
        };

        let Some(chunk) = buffer.get(..read) else {
            break;
        };
        output
            .write_all(chunk)
            .map_err(io_failure("write extracted file", path))?;
    }

    output
        .flush()
        .map_err(io_failure("flush extracted file", path))
}

fn io_failure(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> ArchiveError {
    let path = path.to_path_buf();
    move |source| ArchiveError::Io {
        source,
        action,
        path,
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to {action} {path:?}: {source}")]
    Io {
        #[source]
        source: io::Error,
        action: &'static str,
        path: PathBuf,
    },

    #[error("Failed to {1}: {0}")]
    Write(#[source] ZipError, &'static str),

    #[error("The archive is corrupt: {0}")]
    Corrupt(#[source] ZipError),

    #[error("The archive entry for {path:?} is damaged: {source}")]
    CorruptEntry {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    #[error("Archive entry '{0}' escapes the target directory")]
    UnsafePath(String),

    #[error("Cannot archive {0:?}, it has no directory name")]
    UnnamedRoot(PathBuf),
}

impl ArchiveError {
    /// If the error came from the local filesystem.
    pub fn is_io_failure(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// If the error came from a malformed archive.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            Self::Corrupt(_) | Self::CorruptEntry { .. } | Self::UnsafePath(_)
        )
    }
}
