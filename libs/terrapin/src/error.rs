// This file is part of Terrapin.
//
// Terrapin is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Terrapin is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Terrapin.  If not, see <http://www.gnu.org/licenses/>.
use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::{fmt, panic::Location, process};

pub type Result<T> = std::result::Result<T, Error>;

/// The failure categories surfaced by the library. Exactly one kind is
/// reported per failure.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// A handle is unusable, e.g. a client was requested on a lock-less
    /// stack, or a lock/unlock callback pair is inconsistent.
    BadAddress,
    /// A file extension is not recognised on load or dump.
    BadExtension,
    /// A codec rejected the file contents, or writing is not implemented
    /// for the format.
    BadFormat,
    /// Metadata embedded in a PNG map could not be understood.
    BadJson,
    /// A projection name did not parse.
    BadProjection,
    /// An input parameter is outside of its validity range.
    DomainError,
    /// An internal invariant was violated.
    LibraryError,
    /// A user supplied lock callback reported failure.
    LockError,
    /// An allocation request was too large to be sane.
    MemoryError,
    /// A file was not found or could not be opened.
    PathError,
    /// A user supplied unlock callback reported failure.
    UnlockError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::BadAddress => "bad address",
            Self::BadExtension => "bad extension",
            Self::BadFormat => "bad format",
            Self::BadJson => "bad json",
            Self::BadProjection => "bad projection",
            Self::DomainError => "domain error",
            Self::LibraryError => "library error",
            Self::LockError => "lock error",
            Self::MemoryError => "memory error",
            Self::PathError => "path error",
            Self::UnlockError => "unlock error",
        })
    }
}

/// A failure report: the kind, the library operation that raised it, the
/// source location, and a formatted message.
#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    function: &'static str,
    location: &'static Location<'static>,
    message: String,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Name of the library operation that raised this error.
    pub fn function(&self) -> &'static str {
        self.function
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ {} [{}], {}:{} }} {}",
            self.function,
            self.kind,
            self.location.file(),
            self.location.line(),
            self.message
        )
    }
}

impl std::error::Error for Error {}

/// Callback receiving every error raised by the library.
///
/// The handler is invoked before the error is returned to the caller. It
/// must be safe to call from any thread.
pub type Handler = Box<dyn Fn(&Error) + Send + Sync>;

lazy_static! {
    static ref HANDLER: RwLock<Option<Handler>> =
        RwLock::new(Some(Box::new(default_handler)));
}

// The out-of-the-box behaviour: report and abandon ship, so that unchecked
// return values in user code cannot silently corrupt a simulation.
fn default_handler(error: &Error) {
    eprintln!("a terrapin library error occurred:\n{}", error);
    process::exit(1);
}

/// Replace the process-wide error handler.
///
/// `None` disables handling: errors are then only returned. The default
/// handler prints the error context to stderr and terminates the process.
///
/// Invoking the handler is thread safe; *replacing* it is not. Only call
/// this while no other thread is inside the library.
pub fn set_handler(handler: Option<Handler>) {
    *HANDLER.write() = handler;
}

/// Build an error, route it through the installed handler, and hand it
/// back for returning.
#[track_caller]
pub(crate) fn raise(
    kind: ErrorKind,
    function: &'static str,
    message: impl Into<String>,
) -> Error {
    let error = Error {
        kind,
        function,
        location: Location::caller(),
        message: message.into(),
    };
    if let Some(handler) = HANDLER.read().as_ref() {
        handler(&error);
    }
    error
}
