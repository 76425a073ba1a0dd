//! Error type shared by the filter, chain tracker, decoder and reader.

use std::io;

use crate::source::StatKind;

/// Errors that fail a whole reader operation.
///
/// A statistic that merely fails to snapshot is not an error at this level;
/// it is reported inline on its [`Record`](crate::record::Record).
#[derive(Debug, thiserror::Error)]
pub enum KstatError {
    /// A filter field was supplied with the wrong type.
    #[error("illegal kstat specifier (invalid type for \"{0}\")")]
    InvalidFilterField(&'static str),

    /// An unknown specifier key, or more than one positional specifier.
    #[error("illegal kstat specifier (spurious argument: {0})")]
    SpuriousArgument(String),

    /// The specifier was present but was not an object.
    #[error("illegal kstat specifier (expected object)")]
    NotAnObject,

    /// Opening the statistics registry failed.
    #[error("could not open kstat: {0}")]
    ConnectionFailed(#[source] io::Error),

    /// The reader was closed; this is permanent.
    #[error("kstat reader has already been closed")]
    AlreadyClosed,

    /// Querying or walking the chain failed. The previously tracked
    /// statistics are kept for the next attempt.
    #[error("failed to update kstat chain: {0}")]
    ChainUpdateFailed(#[source] io::Error),

    /// A named statistic carried a field type the decoder does not know.
    #[error(
        "unrecognized data type {type_id} for member \"{field}\" in instance {instance} \
         of stat \"{name}\" (module \"{module}\", class \"{class}\")"
    )]
    UnrecognizedFieldType {
        type_id: u8,
        field: String,
        module: String,
        class: String,
        name: String,
        instance: i32,
    },

    /// A fixed-layout payload was shorter than its layout.
    #[error("{kind} payload truncated: expected {expected} bytes, found {actual}")]
    TruncatedPayload {
        kind: StatKind,
        expected: usize,
        actual: usize,
    },
}

impl KstatError {
    /// Returns the OS error number behind a connection or chain failure.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            KstatError::ConnectionFailed(e) | KstatError::ChainUpdateFailed(e) => e.raw_os_error(),
            _ => None,
        }
    }

    /// True for errors caused by a malformed filter specifier.
    pub fn is_invalid_specifier(&self) -> bool {
        matches!(
            self,
            KstatError::InvalidFilterField(_)
                | KstatError::SpuriousArgument(_)
                | KstatError::NotAnObject
        )
    }
}
