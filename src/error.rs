use thiserror::Error;

/// Errors surfaced by metric registration, initialization and emission.
#[derive(Debug, Error)]
pub enum Error {
    /// Another metric is already registered under the given name.
    #[error("metric name already in use: {0}")]
    NameInUse(String),

    /// A metric was registered after `initialize` or `disable`.
    #[error("metric cannot be created after initialization is complete")]
    InitializationDone,

    /// A field value contains the reserved `,` key delimiter.
    #[error("metric field value contains illegal character: {0:?}")]
    FieldValueContainsIllegalChar(String),

    /// A counter was registered with more than one field.
    #[error("counters support at most one field, got {0}")]
    TooManyFields(usize),

    /// A distribution was registered with a bucketer kind the engine does
    /// not implement.
    #[error("unsupported bucketer implementation")]
    UnsupportedBucketer,

    /// `initialize` or `disable` was called more than once.
    #[error("initialize or disable called after initialization is complete")]
    DoubleInitialize,

    /// The event channel rejected a message.
    #[error("event channel rejected message: {0}")]
    EmitFailed(String),
}

/// Result type alias for metric operations.
pub type Result<T> = std::result::Result<T, Error>;
