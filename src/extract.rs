//! The extraction engine: resolves a cabinet set and drives the decoder
//! over it, writing files below a destination directory.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::chain::ArchiveSet;
use crate::decoder::{Decoder, Host, Notification, OpenMode, Reply};
use crate::error::{Error, IoOp, Result};
use crate::file::FileEntry;
use crate::manifest::{Manifest, ManifestEntry};
use crate::metadata;
use crate::options::ExtractOptions;
use crate::path::{
    create_dir_tree, join_segments, parent_dir, split_entry_name,
};
use crate::progress::{ProgressSink, ProgressState};

/// Extracts every file of the cabinet set containing `archive` into the
/// existing directory `destination`.
///
/// `archive` may name any member of the set; extraction always starts from
/// the first cabinet.  Progress events go to `sink`: one per cabinet, one
/// per file and a final `Completed` record.  A cabinet is reported when
/// the decoder first reads from it, so each file's event names the cabinet
/// its data starts in.
///
/// A destination that is not an existing directory is rejected before any
/// cabinet is opened.  Any other failure stops the whole extraction, and
/// files completed before it are left in place.
///
/// Stored timestamps are local time unless an entry is flagged as UTC.  On
/// Unix the local offset cannot be looked up once the process has more
/// than one thread, and such timestamps are then taken as UTC (with a
/// warning logged through `tracing`).
pub fn extract<P, Q, S>(
    archive: P,
    destination: Q,
    options: &ExtractOptions,
    sink: &mut S,
) -> Result<Manifest>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    S: ProgressSink + ?Sized,
{
    let destination = destination.as_ref();
    check_destination(destination)?;
    let set = ArchiveSet::resolve(archive)?;
    tracing::info!(
        first = %set.first_path().display(),
        cabinets = set.cabinet_count(),
        total_size = set.total_size(),
        destination = %destination.display(),
        "extracting cabinet set"
    );

    let dir = set.first_path().parent().unwrap_or_else(|| Path::new("."));
    let decoder = Decoder::new().verify_checksums(options.verify_checksums);
    let mut session = Session {
        destination,
        options,
        progress: ProgressState::new(
            &options.activity,
            set.cabinet_count(),
            set.total_size(),
        ),
        sink,
        manifest: Manifest::new(),
        next_cabinet: None,
        entered: HashSet::new(),
        failure: None,
    };
    let mut cabinet = Some(set.first().name().to_string());
    while let Some(name) = cabinet {
        session.next_cabinet = None;
        if let Err(error) = decoder.copy(&name, dir, &mut session) {
            return Err(session.failure.take().unwrap_or_else(|| error.into()));
        }
        cabinet = session.next_cabinet.take();
    }

    let event = session.progress.finish();
    session.sink.report(&event);
    tracing::info!(
        files = session.manifest.file_count(),
        directories = session.manifest.directory_count(),
        bytes = session.progress.bytes_completed(),
        "extraction finished"
    );
    Ok(session.manifest)
}

fn check_destination(destination: &Path) -> Result<()> {
    match fs::metadata(destination) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(Error::destination(destination, "not a directory")),
        Err(error) => Err(Error::Destination {
            path: destination.to_path_buf(),
            reason: "not an existing directory".to_string(),
            source: Some(error),
        }),
    }
}

/// An open cabinet or destination file.
struct FileStream {
    path: PathBuf,
    inner: Inner,
}

enum Inner {
    Read(BufReader<File>),
    Write(BufWriter<File>),
}

fn wrong_direction() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "wrong stream direction")
}

/// Per-extraction state handed to the decoder as its host.
struct Session<'a, S: ProgressSink + ?Sized> {
    destination: &'a Path,
    options: &'a ExtractOptions,
    progress: ProgressState,
    sink: &'a mut S,
    manifest: Manifest,
    next_cabinet: Option<String>,
    // Cabinets already reported, either when the decoder crossed into
    // them or when a `copy` call started on them.
    entered: HashSet<String>,
    // The first failure of a host primitive, which explains the decoder's
    // error better than the decoder can.
    failure: Option<Error>,
}

impl<'a, S: ProgressSink + ?Sized> Session<'a, S> {
    /// Makes `name` the current cabinet, counting it the first time only.
    fn enter_cabinet(&mut self, name: &str) {
        if self.entered.insert(name.to_string()) {
            let event = self.progress.start_cabinet(name);
            self.sink.report(&event);
        }
    }

    fn fail(&mut self, error: Error) -> io::Error {
        let message = error.to_string();
        if self.failure.is_none() {
            self.failure = Some(error);
        }
        io::Error::new(io::ErrorKind::Other, message)
    }

    fn start_file(&mut self, file: &FileEntry) -> Result<FileStream> {
        let segments = split_entry_name(file.name())?;
        let parent = parent_dir(self.destination, &segments);
        for dir in create_dir_tree(&parent)? {
            let entry = ManifestEntry::directory(self.destination, &dir);
            self.manifest.push(entry);
        }
        let path = join_segments(self.destination, &segments);
        let stream = self
            .open(&path, OpenMode::Create)
            .map_err(|error| Error::io(IoOp::Open, &path, error))?;
        let event =
            self.progress.start_file(file.name(), file.uncompressed_size());
        self.sink.report(&event);
        tracing::debug!(
            name = file.name(),
            path = %path.display(),
            "extracting"
        );
        Ok(stream)
    }

    fn finish_file(
        &mut self,
        file: &FileEntry,
        stream: FileStream,
    ) -> Result<()> {
        let FileStream { path, inner } = stream;
        let writer = match inner {
            Inner::Write(writer) => writer,
            Inner::Read(_) => {
                return Err(Error::io(IoOp::Close, &path, wrong_direction()))
            }
        };
        let handle = writer.into_inner().map_err(|error| {
            Error::io(IoOp::Close, &path, error.into_error())
        })?;
        if self.options.restore_timestamps {
            metadata::restore_timestamp(&handle, file)
                .map_err(|error| Error::io(IoOp::SetMetadata, &path, error))?;
        }
        drop(handle);
        if self.options.restore_attributes {
            metadata::restore_attributes(&path, file)
                .map_err(|error| Error::io(IoOp::SetMetadata, &path, error))?;
        }
        let length = file.uncompressed_size() as u64;
        self.manifest
            .push(ManifestEntry::file(self.destination, &path, length));
        Ok(())
    }
}

impl<'a, S: ProgressSink + ?Sized> Host for Session<'a, S> {
    type Stream = FileStream;

    fn open(&mut self, path: &Path, mode: OpenMode) -> io::Result<FileStream> {
        let inner = match mode {
            OpenMode::Read => Inner::Read(BufReader::new(File::open(path)?)),
            OpenMode::Create => {
                Inner::Write(BufWriter::new(File::create(path)?))
            }
        };
        Ok(FileStream { path: path.to_path_buf(), inner })
    }

    fn read(
        &mut self,
        stream: &mut FileStream,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        match stream.inner {
            Inner::Read(ref mut reader) => reader.read(buf),
            Inner::Write(_) => Err(wrong_direction()),
        }
    }

    fn write(
        &mut self,
        stream: &mut FileStream,
        buf: &[u8],
    ) -> io::Result<usize> {
        let result = match stream.inner {
            Inner::Write(ref mut writer) => writer.write(buf),
            Inner::Read(_) => Err(wrong_direction()),
        };
        result.map_err(|error| {
            self.fail(Error::io(IoOp::Write, &stream.path, error))
        })
    }

    fn seek(
        &mut self,
        stream: &mut FileStream,
        pos: SeekFrom,
    ) -> io::Result<u64> {
        match stream.inner {
            Inner::Read(ref mut reader) => reader.seek(pos),
            Inner::Write(ref mut writer) => writer.seek(pos),
        }
    }

    fn close(&mut self, stream: FileStream) -> io::Result<()> {
        match stream.inner {
            Inner::Read(_) => Ok(()),
            Inner::Write(writer) => match writer.into_inner() {
                Ok(_) => Ok(()),
                Err(error) => {
                    let error = error.into_error();
                    Err(self.fail(Error::io(IoOp::Close, &stream.path, error)))
                }
            },
        }
    }

    fn notify(
        &mut self,
        notification: Notification<'_, FileStream>,
    ) -> io::Result<Reply<FileStream>> {
        match notification {
            Notification::CabinetInfo { path, cabinet } => {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                tracing::debug!(
                    cabinet = %name,
                    index = cabinet.set_index(),
                    files = cabinet.files().len(),
                    "starting cabinet"
                );
                self.enter_cabinet(&name);
                if self.next_cabinet.is_none() {
                    self.next_cabinet =
                        cabinet.next().map(|link| link.cabinet.clone());
                }
                Ok(Reply::Continue)
            }
            Notification::PartialFile { file, first_cabinet } => {
                tracing::debug!(
                    name = file.name(),
                    first_cabinet,
                    "file continued from an earlier cabinet"
                );
                Ok(Reply::Continue)
            }
            Notification::CopyFile { file } => match self.start_file(file) {
                Ok(stream) => Ok(Reply::Extract(stream)),
                Err(error) => Err(self.fail(error)),
            },
            Notification::CloseFileInfo { file, stream } => {
                match self.finish_file(file, stream) {
                    Ok(()) => Ok(Reply::Continue),
                    Err(error) => Err(self.fail(error)),
                }
            }
            Notification::NextCabinet { link, dir } => {
                tracing::debug!(
                    next = %link.cabinet,
                    disk = %link.disk,
                    dir = %dir.display(),
                    "continuing into next cabinet"
                );
                self.next_cabinet.get_or_insert_with(|| link.cabinet.clone());
                self.enter_cabinet(&link.cabinet);
                Ok(Reply::Continue)
            }
        }
    }
}
