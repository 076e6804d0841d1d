use thiserror::Error;

/// Core error type shared across rekey crates.
#[derive(Debug, Error)]
pub enum Error {
    /// A definition name is not part of the plan.
    #[error("no definition named '{0}' in the execution plan")]
    MissingDefinition(String),
    /// The resolver stopped making progress; carries the blocked names.
    #[error("circular dependency between definitions: {}", .0.join(", "))]
    CircularDependency(Vec<String>),
    /// An update write was attempted on a row without an identifier.
    #[error("row for table '{table}' has no '{column}' value to update")]
    MissingId { table: String, column: String },
    /// The attribute or column already backs a lookup-table.
    #[error("lookup-table for column '{0}' was already defined")]
    DuplicateLookup(String),
    /// No lookup-table was registered under this attribute name.
    #[error("no lookup-table defined named '{0}'")]
    UnknownLookup(String),
    /// Storage adapter failure.
    #[error("storage error: {0}")]
    Storage(String),
    /// Catch-all error for unexpected failures.
    #[error("other error: {0}")]
    Other(String),
}

/// Convenience alias for results returned by rekey crates.
pub type Result<T> = std::result::Result<T, Error>;
