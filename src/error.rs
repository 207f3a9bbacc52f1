use thiserror::Error;

/// Errors raised while ingesting instrument files or aggregating spectra.
#[derive(Debug, Error)]
pub enum SpmError {
    /// File extension has no format adapter. Fatal to that file only.
    #[error("unsupported file format: .{0}")]
    UnsupportedFormat(String),

    /// An adapter produced a key outside the canonical vocabulary.
    #[error("unknown canonical field '{0}'")]
    UnknownField(String),

    /// A vocabulary key carried a value of the wrong shape.
    #[error("field '{key}' expects {expected}, got {found}")]
    FieldType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A field that every normalized record must carry was absent or null.
    #[error("required field '{0}' is missing")]
    MissingField(String),

    /// The file matched an adapter but its contents could not be parsed.
    #[error("{file}: {reason}")]
    Malformed { file: String, reason: String },

    /// Nothing is selected; aggregation is not performed.
    #[error("no spectroscopy points selected")]
    EmptySelection,

    /// No y-channel is chosen; aggregation is not performed.
    #[error("no y-channels selected")]
    EmptyChannels,

    #[error("background for '{channel}' has {expected} samples but the trace has {found}")]
    BackgroundLengthMismatch {
        channel: String,
        expected: usize,
        found: usize,
    },

    #[error("background was captured in {captured} mode, traces are drawn in {requested}")]
    BackgroundModeMismatch {
        captured: &'static str,
        requested: &'static str,
    },

    #[error("cannot average '{channel}': sweep lengths {expected} and {found} differ")]
    SweepLengthMismatch {
        channel: String,
        expected: usize,
        found: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SpmError {
    /// Preconditions mean "nothing to do", not a failure worth surfacing.
    pub fn is_precondition(&self) -> bool {
        matches!(self, SpmError::EmptySelection | SpmError::EmptyChannels)
    }
}

pub type SpmResult<T> = Result<T, SpmError>;
