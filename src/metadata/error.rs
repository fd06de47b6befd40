//! Errors raised while decoding ECMA-335 metadata

use thiserror::Error;

/// Errors that can occur while decoding a binary module
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// The file is not a PE image, or a PE image without a CLI header
    #[error("Not a managed module: {0}")]
    NotAModule(String),

    /// The CLI metadata could not be read by the decoder
    #[error("Invalid metadata: {0}")]
    Invalid(String),

    /// A required metadata stream is absent
    #[error("Missing metadata stream {0}")]
    MissingStream(&'static str),

    /// A heap offset pointed outside its heap
    #[error("Offset {offset:#x} out of range for heap {heap}")]
    HeapOutOfRange { heap: &'static str, offset: u32 },

    /// A read went past the end of the buffer it addressed
    #[error("Unexpected end of data reading {context} at offset {offset:#x}")]
    UnexpectedEof { context: &'static str, offset: usize },

    /// A serialized string was not valid UTF-8
    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// A compressed integer had an invalid leading byte
    #[error("Invalid compressed integer at offset {0:#x}")]
    InvalidCompressedInt(usize),

    /// An attribute blob contained an element type with no serialized form
    #[error("Unsupported element type {element:#04x} in {context}")]
    UnsupportedElementType { element: u8, context: &'static str },

    /// A signature blob was structurally invalid
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    /// A custom attribute blob was structurally invalid
    #[error("Malformed custom attribute: {0}")]
    MalformedAttribute(String),
}

impl MetadataError {
    pub(crate) fn invalid(error: dotscope::Error) -> Self {
        MetadataError::Invalid(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;
