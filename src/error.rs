//! Error type shared by every stage of kernel translation and dispatch.

use thiserror::Error;

use crate::diagnostic::Diagnostic;
use crate::span::Span;

/// Result type for kernel translation, compilation and dispatch.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by shape construction, compilation and dispatch.
///
/// `Clone` so that every caller blocked on a single-flight cache entry
/// observes the same error value as the caller that did the work.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    /// A rewrite rule could not be satisfied for the kernel body.
    #[error("translation failed: {0}")]
    Translation(Diagnostic),

    /// A host type name with no dialect equivalent.
    #[error("type `{name}` has no dialect equivalent (at {span})")]
    UnsupportedType { name: String, span: Span },

    /// A captured field the member classifier cannot place in any category.
    #[error("kernel `{kernel}` captures `{member}` of unsupported type `{type_name}`")]
    UnsupportedCapture {
        kernel: String,
        member: String,
        type_name: String,
    },

    /// A kernel without a single captured member.
    #[error("kernel `{kernel}` captures no members")]
    EmptyKernel { kernel: String },

    /// The native shader compiler rejected the generated source.
    #[error("shader compilation failed:\n{diagnostics}")]
    Compilation { diagnostics: String },

    /// The execution engine refused a bound resource at submission.
    #[error("invalid resource at descriptor {slot}: {reason}")]
    InvalidResource { slot: usize, reason: String },

    /// Dispatch extents must all be at least one.
    #[error("invalid dispatch extents ({x}, {y}, {z}): every extent must be >= 1")]
    InvalidExtents { x: u32, y: u32, z: u32 },

    /// A resource index outside the bitmask width.
    #[error("resource index {index} is out of range for a {width}-bit mask")]
    IndexOutOfRange { index: i64, width: u32 },

    /// A binding plan, its accessors or a record layout that do not fit
    /// together.
    #[error("binding layout error: {message}")]
    Layout { message: String },

    /// Malformed or unreadable compiler configuration.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A single-flight cache entry whose creator panicked before finishing.
    #[error("cache entry for {what} was abandoned by a panicking creator")]
    Poisoned { what: String },

    /// Filesystem or process failure around the native compiler.
    #[error("i/o error: {message}")]
    Io { message: String },
}

impl Error {
    /// Shorthand for a spanned translation failure.
    pub fn translation(message: impl Into<String>, span: Span) -> Self {
        Error::Translation(Diagnostic::error(message, span))
    }

    /// The diagnostic behind a translation failure, if any.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Error::Translation(d) => Some(d),
            _ => None,
        }
    }

    /// The host span this error points at, if it has one.
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::Translation(d) => Some(d.span),
            Error::UnsupportedType { span, .. } => Some(*span),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io {
            message: e.to_string(),
        }
    }
}
