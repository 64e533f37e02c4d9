//! Errors produced while acquiring or walking an SMBIOS table.

use std::io;
use std::path::PathBuf;

/// Specifies the different classes of errors which may occur while
/// acquiring or walking an SMBIOS table.
///
/// None of these are fatal to the caller: [`crate::type_index`] folds all of
/// them into "SMBIOS data unavailable".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No acquisition strategy exists for this platform or build.
    #[error("no SMBIOS source available on this platform")]
    SourceUnavailable,

    /// The firmware did not expose a usable entry point address.
    #[error("entry point not found")]
    EntryPointNotFound,

    /// Privileged access to a firmware table or physical memory was refused.
    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    /// Indicates an error occurred while performing file I/O.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Fewer bytes were returned than were requested.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// An entry point was read, but its anchor or length did not match the
    /// supported revision.
    #[error("invalid entry point: {0}")]
    InvalidEntryPoint(&'static str),

    /// Acquisition succeeded but produced no bytes.
    #[error("SMBIOS table is empty")]
    EmptyTable,

    /// The structure stream cannot be walked any further.
    #[error("malformed SMBIOS structure at offset {offset:#x}: {reason}")]
    MalformedStream { offset: usize, reason: &'static str },
}

impl Error {
    /// Classifies an I/O failure on `path`, singling out denied access.
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::PermissionDenied => Error::PermissionDenied { path },
            _ => Error::Io { path, source },
        }
    }
}

/// A Result type specialized for use with an Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_permission_denied_is_classified() {
        let err = Error::io(
            "/dev/mem",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, Error::PermissionDenied { .. }));

        let err = Error::io("/dev/mem", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn malformed_display() {
        let err = Error::MalformedStream {
            offset: 0x20,
            reason: "structure length underruns header",
        };
        assert_eq!(
            err.to_string(),
            "malformed SMBIOS structure at offset 0x20: structure length underruns header"
        );
    }
}
