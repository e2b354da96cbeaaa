use std::path::PathBuf;

use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The coarse failure classes surfaced to callers of the injection pipeline.
///
/// Every [`Error`] maps onto exactly one kind via [`Error::kind`]. The CLI uses the kind to
/// phrase its message, tests use it to assert on the failure class without matching on
/// individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ErrorKind {
    /// The image (or its symbol file) is missing, unreadable, or not a supported managed image
    Load,
    /// The module type already carries a conflicting initializer
    DuplicateInitializer,
    /// The image is readable but lacks something the injection requires
    Structural,
    /// Building the initializer body failed
    Emit,
    /// Serializing or persisting the rewritten image failed
    Write,
}

/// The generic Error type, which covers every failure this library can return.
///
/// # Error Categories
///
/// ## Load errors
/// - [`Error::Malformed`] - Corrupted or invalid file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond a buffer boundary
/// - [`Error::NotSupported`] - A valid image using a feature the rewriter cannot preserve
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::FileError`] - Filesystem I/O errors while reading
/// - [`Error::GoblinErr`] - PE parsing errors from the goblin crate
///
/// ## Injection errors
/// - [`Error::DuplicateInitializer`] - A conflicting `.cctor` already exists
/// - [`Error::ModuleTypeNotFound`] - No `<Module>` type in the image
/// - [`Error::MissingCoreLibrary`] - No reference to the core library could be found
///
/// ## Emission errors
/// - [`Error::InvalidMnemonic`], [`Error::InvalidBranch`], [`Error::UndefinedLabel`],
///   [`Error::InvalidBody`]
///
/// ## Write errors
/// - [`Error::WriteLayoutFailed`] - The output image could not be laid out
/// - [`Error::WriteFailed`] - Persisting the output failed
///
/// # Examples
///
/// ```rust,no_run
/// use modinit::{ErrorKind, InjectOptions};
/// use std::path::Path;
///
/// match modinit::inject_file(Path::new("app.dll"), &InjectOptions::default()) {
///     Ok(report) => println!("added {}", report.method),
///     Err(e) if e.kind() == ErrorKind::DuplicateInitializer => {
///         eprintln!("already injected: {e}");
///     }
///     Err(e) => eprintln!("{} error: {e}", e.kind()),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The file is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The image is well formed but uses a feature that cannot be preserved on rewrite.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error while reading the image or its symbols.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin PE parser.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// The module type already declares an initializer matching the one we would add.
    #[error("Assembly already contains a module initializer - {name} ({token})")]
    DuplicateInitializer {
        /// Name of the conflicting method as stored in the image
        name: String,
        /// Token of the conflicting method
        token: Token,
    },

    /// The image has no `<Module>` type definition.
    #[error("The module type '<Module>' could not be found")]
    ModuleTypeNotFound,

    /// No resolution scope for the core library could be derived from the image.
    #[error("Unable to locate a core library reference in the image")]
    MissingCoreLibrary,

    /// An instruction mnemonic is not part of the CIL instruction set.
    #[error("Invalid instruction mnemonic: {0}")]
    InvalidMnemonic(String),

    /// A branch was emitted with a non-branch opcode or an unusable target.
    #[error("Invalid branch: {0}")]
    InvalidBranch(String),

    /// A branch references a label that was never defined.
    #[error("Undefined label: {0}")]
    UndefinedLabel(String),

    /// A method body failed stack or branch verification.
    #[error("Invalid method body: {0}")]
    InvalidBody(String),

    /// The rewritten image could not be laid out.
    #[error("Write layout failed: {message}")]
    WriteLayoutFailed {
        /// What prevented the layout
        message: String,
    },

    /// Persisting an output file failed.
    #[error("Failed to write '{}': {source}", path.display())]
    WriteFailed {
        /// Destination that could not be written
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Classifies this error into one of the failure kinds of the injection pipeline.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Malformed { .. }
            | Error::OutOfBounds { .. }
            | Error::NotSupported(_)
            | Error::Empty
            | Error::FileError(_)
            | Error::GoblinErr(_) => ErrorKind::Load,
            Error::DuplicateInitializer { .. } => ErrorKind::DuplicateInitializer,
            Error::ModuleTypeNotFound | Error::MissingCoreLibrary => ErrorKind::Structural,
            Error::InvalidMnemonic(_)
            | Error::InvalidBranch(_)
            | Error::UndefinedLabel(_)
            | Error::InvalidBody(_) => ErrorKind::Emit,
            Error::WriteLayoutFailed { .. } | Error::WriteFailed { .. } => ErrorKind::Write,
        }
    }
}
