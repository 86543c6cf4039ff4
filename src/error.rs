//! Typed error taxonomy shared by every layer and the scheduler.
//!
//! Mirrors the original implementation's small set of failure modes rather than
//! inventing a Rust-native one: every layer either succeeds or fails with one of
//! the kinds below, surfaced to the caller through a return-code slot or, for
//! synchronous intra-task calls, a plain `Result`.

use std::sync::{Mutex, OnceLock};

/// The taxonomy of failure modes a layer or the scheduler can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed XML, an out-of-range attribute, a null or unknown handle.
    InvalidArgument,
    /// A capacity reservation for a bounded queue failed.
    OutOfMemory,
    /// A receive or pop was attempted against an empty slot or queue.
    NoData,
    /// A receive or ack-wait exceeded its tick budget.
    Timeout,
    /// The addressing fabric rejected an enqueue (e.g. destination unreachable).
    BadMessage,
    /// A node lookup by id, location, or neighbor relation missed.
    NotFound,
    /// A state-machine invariant was violated; the offending task aborts.
    Fatal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::OutOfMemory => "out of memory",
            ErrorKind::NoData => "no data",
            ErrorKind::Timeout => "timeout",
            ErrorKind::BadMessage => "bad message",
            ErrorKind::NotFound => "not found",
            ErrorKind::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// The library's error type: a kind plus optional context and source.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct PdsnsError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl PdsnsError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let err = Self {
            kind,
            message: message.into(),
            source: None,
        };
        set_last_error(kind);
        err
    }

    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        let err = Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        };
        set_last_error(kind);
        err
    }
}

pub type PResult<T> = Result<T, PdsnsError>;

static LAST_ERROR: OnceLock<Mutex<Option<ErrorKind>>> = OnceLock::new();

fn last_error_cell() -> &'static Mutex<Option<ErrorKind>> {
    LAST_ERROR.get_or_init(|| Mutex::new(None))
}

fn set_last_error(kind: ErrorKind) {
    *last_error_cell().lock().unwrap() = Some(kind);
}

/// The kind of the most recently constructed `PdsnsError`, if any.
///
/// Mirrors `pdsns_get_from_layer`-style post-hoc inspection: callers that only
/// have a bare return code can still ask what went wrong most recently.
pub fn last_error() -> Option<ErrorKind> {
    *last_error_cell().lock().unwrap()
}
