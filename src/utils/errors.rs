use thiserror::Error;

/// `SimulationError` enumerates all possible errors returned by devsim
#[derive(Error, Debug)]
pub enum SimulationError {
    /// Represents an operation requested on a model that does not exist
    #[error("A specified model cannot be found in the simulation")]
    ModelNotFound,

    /// Represents an operation requested on a model port that does not exist
    #[error("A specified model port cannot be found in the simulation")]
    PortNotFound,

    /// Represents a registration under a name that is already taken
    #[error("A model with the same name is already registered")]
    DuplicateModel,

    /// Represents a model registered with no states
    #[error("A model was registered with an empty state table")]
    EmptyStateTable,

    /// Represents a transition to a state missing from the state table
    #[error("A state was referenced that is not in the model state table")]
    UnknownState,

    /// Represents a state registered with a negative time advance
    #[error("A state was registered with a negative time advance duration")]
    NegativeTimeAdvance,

    /// Represents a scheduled event time earlier than the global clock
    #[error("An event time earlier than the current global time was encountered")]
    CausalityError,

    /// Represents a coupling chain that feeds back into itself
    #[error("A coupling cycle was encountered during message resolution")]
    CouplingCycle,

    /// Represents an invalid model state
    #[error("An invalid model state was encountered")]
    InvalidModelState,

    /// Represents a snapshot record naming a model with no registered restorer
    #[error("No restorer is registered for a model named in the snapshot record")]
    MissingRestorer,

    /// Represents a snapshot record with an unsupported format version
    #[error("A snapshot record has an unsupported format version")]
    UnsupportedSnapshotVersion,

    /// Transparent serde_json errors
    #[error(transparent)]
    JSONError(#[from] serde_json::error::Error),

    /// Transparent I/O errors
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
