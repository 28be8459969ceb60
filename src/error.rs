use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::decoder::{DecodeError, DecoderOp};

/// Code reported for I/O failures that carry no OS error number.
pub const GENERIC_IO_ERROR: i32 = -1;

/// A primitive operation on a destination stream or directory.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IoOp {
    /// Opening (creating) a destination file.
    Open,
    /// Reading from a stream.
    Read,
    /// Writing to a destination file.
    Write,
    /// Seeking within a stream.
    Seek,
    /// Flushing and closing a destination file.
    Close,
    /// Restoring a file's timestamp or attributes.
    SetMetadata,
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IoOp::Open => "open",
            IoOp::Read => "read",
            IoOp::Write => "write",
            IoOp::Seek => "seek",
            IoOp::Close => "close",
            IoOp::SetMetadata => "set metadata on",
        };
        f.write_str(name)
    }
}

/// Everything that can go wrong while resolving or extracting a cabinet
/// set.
///
/// Extraction is not transactional: when an error is returned, files that
/// were completely written before the failure stay in the destination.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input is not a cabinet file (or its header is malformed).
    #[error("{}: {reason}", path.display())]
    Format {
        /// The offending file.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// A cabinet linked from another member of the set could not be
    /// resolved.
    #[error("cannot resolve cabinet set member {}: {source}", link.display())]
    ChainResolution {
        /// Path the link points at.
        link: PathBuf,
        /// Why it could not be resolved.
        source: Box<Error>,
    },

    /// The destination is unusable, or a directory in it could not be
    /// created.
    #[error("destination {}: {reason}", path.display())]
    Destination {
        /// The destination path concerned.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
        /// The underlying failure, if any.
        #[source]
        source: Option<io::Error>,
    },

    /// The decoder reported a failure.
    #[error("{op} in {}: {source}", cabinet.display())]
    Decoder {
        /// The failed decoder operation.
        op: DecoderOp,
        /// The cabinet being processed.
        cabinet: PathBuf,
        /// The underlying failure.
        source: io::Error,
    },

    /// A stream primitive failed.
    #[error("cannot {op} {}: {source}", path.display())]
    Io {
        /// The failed primitive.
        op: IoOp,
        /// The file it was applied to.
        path: PathBuf,
        /// The underlying failure.
        source: io::Error,
    },
}

impl Error {
    /// Returns the numeric code for this error: the decoder operation code
    /// for decoder failures, otherwise an OS error number (or
    /// [`GENERIC_IO_ERROR`]).
    pub fn code(&self) -> i32 {
        match self {
            Error::Format { .. } => DecoderOp::NotACabinet.code(),
            Error::ChainResolution { source, .. } => source.code(),
            Error::Destination { source, .. } => {
                source.as_ref().map_or(GENERIC_IO_ERROR, io_code)
            }
            Error::Decoder { op, .. } => op.code(),
            Error::Io { source, .. } => io_code(source),
        }
    }

    pub(crate) fn destination<P: Into<PathBuf>, S: Into<String>>(
        path: P,
        reason: S,
    ) -> Error {
        Error::Destination {
            path: path.into(),
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn create_dir<P: Into<PathBuf>>(
        path: P,
        source: io::Error,
    ) -> Error {
        Error::Destination {
            path: path.into(),
            reason: "cannot create directory".to_string(),
            source: Some(source),
        }
    }

    pub(crate) fn io<P: Into<PathBuf>>(
        op: IoOp,
        path: P,
        source: io::Error,
    ) -> Error {
        Error::Io { op, path: path.into(), source }
    }
}

fn io_code(error: &io::Error) -> i32 {
    error.raw_os_error().unwrap_or(GENERIC_IO_ERROR)
}

impl From<DecodeError> for Error {
    fn from(error: DecodeError) -> Error {
        Error::Decoder {
            op: error.op,
            cabinet: error.cabinet,
            source: error.source,
        }
    }
}

/// Shorthand for results carrying [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::PathBuf;

    use super::{Error, IoOp, GENERIC_IO_ERROR};
    use crate::decoder::DecoderOp;

    #[test]
    fn codes() {
        let format = Error::Format {
            path: PathBuf::from("a.cab"),
            reason: "bad".to_string(),
        };
        assert_eq!(format.code(), 2);
        let chained = Error::ChainResolution {
            link: PathBuf::from("b.cab"),
            source: Box::new(format),
        };
        assert_eq!(chained.code(), 2);
        let decoder = Error::Decoder {
            op: DecoderOp::CorruptCabinet,
            cabinet: PathBuf::from("a.cab"),
            source: io::Error::new(io::ErrorKind::InvalidData, "bad block"),
        };
        assert_eq!(decoder.code(), 4);
        let io = Error::io(
            IoOp::Open,
            "out/x",
            io::Error::new(io::ErrorKind::Other, "nope"),
        );
        assert_eq!(io.code(), GENERIC_IO_ERROR);
        let denied = io::Error::from_raw_os_error(13);
        let os = Error::io(IoOp::Open, "out/x", denied);
        assert_eq!(os.code(), 13);
        assert_eq!(Error::destination("out", "not a directory").code(), -1);
    }

    #[test]
    fn messages_name_the_operation_and_path() {
        let error = Error::io(
            IoOp::Write,
            "out/x.txt",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        );
        assert_eq!(error.to_string(), "cannot write out/x.txt: disk full");
        let error = Error::ChainResolution {
            link: PathBuf::from("b.cab"),
            source: Box::new(Error::Format {
                path: PathBuf::from("b.cab"),
                reason: "not a cabinet file".to_string(),
            }),
        };
        assert_eq!(
            error.to_string(),
            "cannot resolve cabinet set member b.cab: \
             b.cab: not a cabinet file"
        );
    }
}
