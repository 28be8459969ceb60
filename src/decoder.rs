//! The decompression service.
//!
//! A [`Decoder`] never touches the filesystem itself: every cabinet it
//! reads and every file it writes goes through the five stream primitives
//! of a [`Host`], and every decision (which files to extract, where to,
//! whether to carry on into the next cabinet) is made by the host in
//! response to a [`Notification`].  All callbacks run synchronously on the
//! caller's thread, and the host is passed explicitly to each call, so
//! independent decoders can run side by side.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::mem;
use std::path::{Path, PathBuf};

use crate::cabinet::Cabinet;
use crate::ctype::Decompressor;
use crate::file::FileEntry;
use crate::folder::{DataBlock, FolderEntry};
use crate::header::{CabinetLink, HeaderError};

/// How a stream should be opened.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpenMode {
    /// Open an existing cabinet for reading.
    Read,
    /// Create (or truncate) a destination file for writing.
    Create,
}

/// An event delivered to the host while a cabinet is processed.
pub enum Notification<'a, S> {
    /// A cabinet has been opened by [`Decoder::copy`].  Sent once per call.
    CabinetInfo {
        /// Path of the cabinet being processed.
        path: &'a Path,
        /// Its decoded tables.
        cabinet: &'a Cabinet,
    },
    /// A file listed in this cabinet began in an earlier one; it is not
    /// extracted by this call.
    PartialFile {
        /// The continued file.
        file: &'a FileEntry,
        /// Name of the previous cabinet.
        first_cabinet: &'a str,
    },
    /// A file is about to be extracted.  Reply with [`Reply::Extract`] and
    /// an open target stream, or [`Reply::Skip`].
    CopyFile {
        /// The file's metadata.
        file: &'a FileEntry,
    },
    /// All of a file's data has been written to `stream`; the host now
    /// owns the stream again and should close it.
    CloseFileInfo {
        /// The file's metadata, including its stored date, time and
        /// attributes.
        file: &'a FileEntry,
        /// The target stream returned from `CopyFile`.
        stream: S,
    },
    /// Data continues in the next cabinet, which is about to be opened
    /// from `dir`.  Return an error to abort.
    NextCabinet {
        /// The link naming the next cabinet.
        link: &'a CabinetLink,
        /// Directory the cabinet will be opened from.
        dir: &'a Path,
    },
}

/// The host's answer to a [`Notification`].
pub enum Reply<S> {
    /// Carry on.
    Continue,
    /// Do not extract this file.
    Skip,
    /// Extract this file into the given stream.
    Extract(S),
}

/// The primitives a [`Decoder`] needs from its host.
pub trait Host {
    /// An open stream, either a cabinet being read or a file being written.
    type Stream;

    /// Opens `path` in the given mode.
    fn open(&mut self, path: &Path, mode: OpenMode)
        -> io::Result<Self::Stream>;

    /// Reads from a stream opened with [`OpenMode::Read`].
    fn read(
        &mut self,
        stream: &mut Self::Stream,
        buf: &mut [u8],
    ) -> io::Result<usize>;

    /// Writes to a stream opened with [`OpenMode::Create`].
    fn write(&mut self, stream: &mut Self::Stream, buf: &[u8])
        -> io::Result<usize>;

    /// Repositions a stream.
    fn seek(&mut self, stream: &mut Self::Stream, pos: SeekFrom)
        -> io::Result<u64>;

    /// Closes a stream.
    fn close(&mut self, stream: Self::Stream) -> io::Result<()>;

    /// Receives a notification.  Returning an error aborts the whole
    /// [`Decoder::copy`] call.
    fn notify(
        &mut self,
        notification: Notification<'_, Self::Stream>,
    ) -> io::Result<Reply<Self::Stream>>;
}

/// The decoder operation that failed.  Codes follow the classic FDI
/// numbering.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecoderOp {
    /// A cabinet could not be opened.
    CabinetNotFound,
    /// A file did not have the cabinet signature.
    NotACabinet,
    /// A cabinet's format version is newer than supported.
    UnknownCabinetVersion,
    /// A cabinet's tables or data blocks are damaged.
    CorruptCabinet,
    /// A folder uses a compression scheme that cannot be decoded.
    BadCompressionType,
    /// Decompressing a data block failed.
    DecompressFailed,
    /// Writing or closing a target file failed.
    TargetFile,
    /// The next cabinet is not the continuation of the current one.
    WrongCabinet,
    /// The host refused a notification.
    UserAbort,
}

impl DecoderOp {
    /// Returns this operation's numeric code.
    pub fn code(self) -> i32 {
        match self {
            DecoderOp::CabinetNotFound => 1,
            DecoderOp::NotACabinet => 2,
            DecoderOp::UnknownCabinetVersion => 3,
            DecoderOp::CorruptCabinet => 4,
            DecoderOp::BadCompressionType => 6,
            DecoderOp::DecompressFailed => 7,
            DecoderOp::TargetFile => 8,
            DecoderOp::WrongCabinet => 10,
            DecoderOp::UserAbort => 11,
        }
    }
}

impl fmt::Display for DecoderOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecoderOp::CabinetNotFound => "cabinet not found",
            DecoderOp::NotACabinet => "not a cabinet",
            DecoderOp::UnknownCabinetVersion => "unknown cabinet version",
            DecoderOp::CorruptCabinet => "corrupt cabinet",
            DecoderOp::BadCompressionType => "bad compression type",
            DecoderOp::DecompressFailed => "decompression failed",
            DecoderOp::TargetFile => "target file",
            DecoderOp::WrongCabinet => "wrong cabinet",
            DecoderOp::UserAbort => "aborted by host",
        };
        f.write_str(name)
    }
}

/// A failure reported by [`Decoder::copy`].
#[derive(Debug, thiserror::Error)]
#[error("{op} in {}: {source}", cabinet.display())]
pub struct DecodeError {
    /// The operation that failed.
    pub op: DecoderOp,
    /// The cabinet being processed at the time.
    pub cabinet: PathBuf,
    /// The underlying failure.
    pub source: io::Error,
}

impl DecodeError {
    fn new(op: DecoderOp, cabinet: &Path, source: io::Error) -> DecodeError {
        DecodeError { op, cabinet: cabinet.to_path_buf(), source }
    }

    fn corrupt(cabinet: &Path, message: String) -> DecodeError {
        let source = io::Error::new(io::ErrorKind::InvalidData, message);
        DecodeError::new(DecoderOp::CorruptCabinet, cabinet, source)
    }
}

type DecodeResult<T> = Result<T, DecodeError>;

/// Drives extraction of one cabinet through a [`Host`].
#[derive(Clone, Debug)]
pub struct Decoder {
    verify_checksums: bool,
}

impl Default for Decoder {
    fn default() -> Self {
        Decoder::new()
    }
}

impl Decoder {
    /// Creates a decoder that verifies data block checksums.
    pub fn new() -> Decoder {
        Decoder { verify_checksums: true }
    }

    /// Sets whether non-zero data block checksums are verified.
    pub fn verify_checksums(mut self, verify: bool) -> Decoder {
        self.verify_checksums = verify;
        self
    }

    /// Extracts every file that starts in the cabinet `dir/cabinet`.
    ///
    /// If the cabinet's last folder carries on into later cabinets, they
    /// are opened in turn (after a [`Notification::NextCabinet`]) and the
    /// files of that folder which start there are extracted as well.  The
    /// next call, on the continuation cabinet, skips that folder.
    pub fn copy<H: Host>(
        &self,
        cabinet: &str,
        dir: &Path,
        host: &mut H,
    ) -> DecodeResult<()> {
        let path = dir.join(cabinet);
        let mut source = open_cabinet(host, &path)?;
        let result = self.copy_cabinet(host, &mut source, dir);
        let closed = host.close(source.stream);
        result?;
        closed.map_err(|e| DecodeError::new(DecoderOp::UserAbort, &path, e))
    }

    /// Reads the tables of the cabinet `dir/cabinet` through `host`.  No
    /// data blocks are decoded and no notifications are sent.
    pub fn cabinet_info<H: Host>(
        &self,
        cabinet: &str,
        dir: &Path,
        host: &mut H,
    ) -> DecodeResult<Cabinet> {
        let path = dir.join(cabinet);
        let source = open_cabinet(host, &path)?;
        host.close(source.stream)
            .map_err(|e| DecodeError::new(DecoderOp::UserAbort, &path, e))?;
        Ok(source.cabinet)
    }

    fn copy_cabinet<H: Host>(
        &self,
        host: &mut H,
        source: &mut Source<H::Stream>,
        dir: &Path,
    ) -> DecodeResult<()> {
        let path = source.path.clone();
        let abort = |e| DecodeError::new(DecoderOp::UserAbort, &path, e);
        let cabinet = source.cabinet.clone();
        host.notify(Notification::CabinetInfo {
            path: &path,
            cabinet: &cabinet,
        })
        .map_err(abort)?;
        let first_cabinet = cabinet.prev().map_or("", |l| l.cabinet.as_str());
        for file in cabinet.files().iter().filter(|f| f.folder.is_from_prev())
        {
            host.notify(Notification::PartialFile { file, first_cabinet })
                .map_err(abort)?;
        }

        let num_folders = cabinet.folders().len();
        let first = if cabinet.first_folder_is_continued() { 1 } else { 0 };
        for index in first..num_folders {
            let mut files: Vec<FileEntry> = cabinet
                .files_in_folder(index)
                .filter(|file| !file.folder.is_from_prev())
                .cloned()
                .collect();
            files.sort_by_key(|file| file.uncompressed_offset);
            let continues =
                index + 1 == num_folders && cabinet.last_folder_continues();
            if files.is_empty() && !continues {
                continue;
            }
            let folder = &cabinet.folders()[index];
            tracing::debug!(
                cabinet = %path.display(),
                folder = index,
                files = files.len(),
                continues,
                "decoding folder"
            );
            let mut stream = FolderStream::new(
                folder,
                source,
                continues,
                self.verify_checksums,
            )?;
            self.copy_folder(host, source, dir, &mut stream, files)?;
        }
        Ok(())
    }

    fn copy_folder<H: Host>(
        &self,
        host: &mut H,
        source: &mut Source<H::Stream>,
        dir: &Path,
        stream: &mut FolderStream,
        files: Vec<FileEntry>,
    ) -> DecodeResult<()> {
        let mut queue = VecDeque::from(files);
        loop {
            while let Some(file) = queue.pop_front() {
                copy_file(host, source, dir, stream, &file)?;
                queue.extend(stream.arrivals.drain(..));
            }
            if !stream.continues {
                return Ok(());
            }
            // Later files of this folder start in the next cabinet.
            stream.drain_cabinet(host, source)?;
            stream.switch_cabinet(host, source, dir)?;
            queue.extend(stream.arrivals.drain(..));
        }
    }
}

fn copy_file<H: Host>(
    host: &mut H,
    source: &mut Source<H::Stream>,
    dir: &Path,
    stream: &mut FolderStream,
    file: &FileEntry,
) -> DecodeResult<()> {
    let reply = host
        .notify(Notification::CopyFile { file })
        .map_err(|e| DecodeError::new(DecoderOp::UserAbort, &source.path, e))?;
    let mut target = match reply {
        Reply::Extract(target) => target,
        Reply::Skip | Reply::Continue => return Ok(()),
    };
    if let Err(error) =
        write_file(host, source, dir, stream, file, &mut target)
    {
        // The original failure matters more than a failed close.
        let _ = host.close(target);
        return Err(error);
    }
    host.notify(Notification::CloseFileInfo { file, stream: target })
        .map_err(|e| {
            DecodeError::new(DecoderOp::TargetFile, &source.path, e)
        })?;
    Ok(())
}

fn write_file<H: Host>(
    host: &mut H,
    source: &mut Source<H::Stream>,
    dir: &Path,
    stream: &mut FolderStream,
    file: &FileEntry,
    target: &mut H::Stream,
) -> DecodeResult<()> {
    stream.skip_to(host, source, dir, file.uncompressed_offset as u64)?;
    let mut remaining = file.uncompressed_size() as u64;
    while remaining > 0 {
        let chunk = stream.next_chunk(host, source, dir, remaining)?;
        remaining -= chunk.len() as u64;
        let mut chunk = chunk;
        while !chunk.is_empty() {
            let written = match host.write(target, chunk) {
                Ok(0) => Err(io::Error::from(io::ErrorKind::WriteZero)),
                other => other,
            }
            .map_err(|e| {
                DecodeError::new(DecoderOp::TargetFile, &source.path, e)
            })?;
            chunk = &chunk[written..];
        }
    }
    Ok(())
}

/// The cabinet currently being read.
struct Source<S> {
    path: PathBuf,
    cabinet: Cabinet,
    stream: S,
    // Where the stream is known to be, if a data block was read last.
    position: Option<u64>,
}

fn open_cabinet<H: Host>(
    host: &mut H,
    path: &Path,
) -> DecodeResult<Source<H::Stream>> {
    let mut stream = host
        .open(path, OpenMode::Read)
        .map_err(|e| DecodeError::new(DecoderOp::CabinetNotFound, path, e))?;
    let parsed = Cabinet::read(&mut HostReader {
        host: &mut *host,
        stream: &mut stream,
    });
    match parsed {
        Ok(cabinet) => {
            Ok(Source {
                path: path.to_path_buf(),
                cabinet,
                stream,
                position: None,
            })
        }
        Err(error) => {
            let _ = host.close(stream);
            Err(header_error(path, error))
        }
    }
}

fn header_error(path: &Path, error: HeaderError) -> DecodeError {
    let op = match error {
        HeaderError::Signature => DecoderOp::NotACabinet,
        HeaderError::Version(_, _) => DecoderOp::UnknownCabinetVersion,
        HeaderError::Io(_) => DecoderOp::CorruptCabinet,
    };
    let source = match error {
        HeaderError::Io(error) => error,
        other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
    };
    DecodeError::new(op, path, source)
}

/// Adapts a host stream to `Read + Seek` for the table parsers.
struct HostReader<'a, H: Host> {
    host: &'a mut H,
    stream: &'a mut H::Stream,
}

impl<'a, H: Host> Read for HostReader<'a, H> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.host.read(self.stream, buf)
    }
}

impl<'a, H: Host> Seek for HostReader<'a, H> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.host.seek(self.stream, pos)
    }
}

/// Sequential decompressed data of one folder, which may run on across
/// several cabinets.
struct FolderStream {
    decompressor: Decompressor,
    verify_checksums: bool,
    data_reserve_size: usize,
    next_block_offset: u64,
    blocks_remaining: u16,
    continues: bool,
    block: Vec<u8>,
    block_pos: usize,
    position: u64,
    split_prefix: Vec<u8>,
    arrivals: Vec<FileEntry>,
}

impl FolderStream {
    fn new<S>(
        folder: &FolderEntry,
        source: &Source<S>,
        continues: bool,
        verify_checksums: bool,
    ) -> DecodeResult<FolderStream> {
        let ctype = folder.compression_type();
        let decompressor = match ctype.decompressor() {
            Some(decompressor) => decompressor,
            None => {
                let message = format!("cannot decode {:?} folders", ctype);
                let source_error =
                    io::Error::new(io::ErrorKind::Unsupported, message);
                return Err(DecodeError::new(
                    DecoderOp::BadCompressionType,
                    &source.path,
                    source_error,
                ));
            }
        };
        Ok(FolderStream {
            decompressor,
            verify_checksums,
            data_reserve_size: source.cabinet.data_reserve_size(),
            next_block_offset: folder.first_data_block_offset(),
            blocks_remaining: folder.num_data_blocks(),
            continues,
            block: Vec::new(),
            block_pos: 0,
            position: 0,
            split_prefix: Vec::new(),
            arrivals: Vec::new(),
        })
    }

    /// Returns up to `max` bytes of decompressed data.
    fn next_chunk<H: Host>(
        &mut self,
        host: &mut H,
        source: &mut Source<H::Stream>,
        dir: &Path,
        max: u64,
    ) -> DecodeResult<&[u8]> {
        if self.block_pos == self.block.len()
            && !self.load_block(host, source, dir)?
        {
            return Err(DecodeError::corrupt(
                &source.path,
                format!("folder data ends early at offset {}", self.position),
            ));
        }
        let start = self.block_pos;
        let len = ((self.block.len() - start) as u64).min(max) as usize;
        self.block_pos += len;
        self.position += len as u64;
        Ok(&self.block[start..start + len])
    }

    /// Discards data up to the given folder offset.
    fn skip_to<H: Host>(
        &mut self,
        host: &mut H,
        source: &mut Source<H::Stream>,
        dir: &Path,
        offset: u64,
    ) -> DecodeResult<()> {
        if offset < self.position {
            return Err(DecodeError::corrupt(
                &source.path,
                format!(
                    "file data at offset {} overlaps data already read \
                     (at {})",
                    offset, self.position
                ),
            ));
        }
        while self.position < offset {
            let max = offset - self.position;
            self.next_chunk(host, source, dir, max)?;
        }
        Ok(())
    }

    /// Decodes the next non-empty block, crossing into the next cabinet if
    /// this one has no blocks left.  Returns false at the end of the folder.
    fn load_block<H: Host>(
        &mut self,
        host: &mut H,
        source: &mut Source<H::Stream>,
        dir: &Path,
    ) -> DecodeResult<bool> {
        loop {
            if self.blocks_remaining == 0 {
                if !self.continues {
                    return Ok(false);
                }
                self.switch_cabinet(host, source, dir)?;
                continue;
            }
            if self.read_block(host, source)? && !self.block.is_empty() {
                return Ok(true);
            }
        }
    }

    /// Reads one data block record from the current cabinet.  Returns false
    /// if it was the first half of a split block (nothing decoded yet).
    fn read_block<H: Host>(
        &mut self,
        host: &mut H,
        source: &mut Source<H::Stream>,
    ) -> DecodeResult<bool> {
        let path = &source.path;
        let offset = self.next_block_offset;
        let positioned = source.position.take() == Some(offset);
        let mut reader =
            HostReader { host: &mut *host, stream: &mut source.stream };
        let sought = if positioned {
            Ok(offset)
        } else {
            reader.seek(SeekFrom::Start(offset))
        };
        let block = sought
            .and_then(|_| DataBlock::read(&mut reader, self.data_reserve_size))
            .map_err(|e| {
                DecodeError::new(DecoderOp::CorruptCabinet, path, e)
            })?;
        self.next_block_offset += block.record_len();
        source.position = Some(self.next_block_offset);
        self.blocks_remaining -= 1;
        if self.verify_checksums {
            block.verify().map_err(|e| {
                DecodeError::new(DecoderOp::CorruptCabinet, path, e)
            })?;
        }
        tracing::trace!(
            cabinet = %path.display(),
            compressed = block.compressed_size,
            uncompressed = block.uncompressed_size,
            "read data block"
        );
        if block.is_split() && self.blocks_remaining == 0 && self.continues {
            self.split_prefix.extend_from_slice(&block.data);
            return Ok(false);
        }
        let data = if self.split_prefix.is_empty() {
            block.data
        } else {
            let mut data = mem::take(&mut self.split_prefix);
            data.extend_from_slice(&block.data);
            data
        };
        self.block = self
            .decompressor
            .decompress(data, block.uncompressed_size as usize)
            .map_err(|e| {
                DecodeError::new(DecoderOp::DecompressFailed, path, e)
            })?;
        self.block_pos = 0;
        Ok(true)
    }

    /// Decodes and discards everything left in the current cabinet.
    fn drain_cabinet<H: Host>(
        &mut self,
        host: &mut H,
        source: &mut Source<H::Stream>,
    ) -> DecodeResult<()> {
        loop {
            self.position += (self.block.len() - self.block_pos) as u64;
            self.block_pos = self.block.len();
            if self.blocks_remaining == 0 {
                return Ok(());
            }
            self.read_block(host, source)?;
        }
    }

    /// Moves on to the continuation of this folder in the next cabinet.
    fn switch_cabinet<H: Host>(
        &mut self,
        host: &mut H,
        source: &mut Source<H::Stream>,
        dir: &Path,
    ) -> DecodeResult<()> {
        let link = match source.cabinet.next() {
            Some(link) => link.clone(),
            None => {
                return Err(DecodeError::corrupt(
                    &source.path,
                    "folder continues but there is no next cabinet".into(),
                ))
            }
        };
        host.notify(Notification::NextCabinet { link: &link, dir })
            .map_err(|e| {
                DecodeError::new(DecoderOp::UserAbort, &source.path, e)
            })?;
        let next = open_cabinet(host, &dir.join(&link.cabinet))?;
        let checked = check_continuation(&source.cabinet, &next.cabinet);
        if let Err(message) = checked {
            let path = next.path.clone();
            let _ = host.close(next.stream);
            let error = io::Error::new(io::ErrorKind::InvalidData, message);
            let op = DecoderOp::WrongCabinet;
            return Err(DecodeError::new(op, &path, error));
        }
        tracing::debug!(
            from = %source.path.display(),
            to = %next.path.display(),
            "folder continues in next cabinet"
        );
        let previous = mem::replace(source, next);
        host.close(previous.stream).map_err(|e| {
            DecodeError::new(DecoderOp::UserAbort, &previous.path, e)
        })?;

        let cabinet = &source.cabinet;
        let folder = &cabinet.folders()[0];
        self.data_reserve_size = cabinet.data_reserve_size();
        self.next_block_offset = folder.first_data_block_offset();
        self.blocks_remaining = folder.num_data_blocks();
        self.continues =
            cabinet.folders().len() == 1 && cabinet.last_folder_continues();
        let mut arrivals: Vec<FileEntry> = cabinet
            .files_in_folder(0)
            .filter(|file| !file.folder.is_from_prev())
            .cloned()
            .collect();
        arrivals.sort_by_key(|file| file.uncompressed_offset);
        self.arrivals.extend(arrivals);
        Ok(())
    }
}

fn check_continuation(
    current: &Cabinet,
    next: &Cabinet,
) -> Result<(), String> {
    if next.set_id() != current.set_id() {
        return Err(format!(
            "set ID {:#06x} does not match {:#06x}",
            next.set_id(),
            current.set_id()
        ));
    }
    if next.set_index() != current.set_index().wrapping_add(1) {
        return Err(format!(
            "cabinet index {} does not follow {}",
            next.set_index(),
            current.set_index()
        ));
    }
    if next.folders().is_empty() || !next.first_folder_is_continued() {
        return Err("cabinet does not continue the previous folder".into());
    }
    Ok(())
}
