use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    /// The portal or one of its menus could not be reached.
    #[error("Navigation failed: {0}")]
    NavigationFailure(String),

    /// Every candidate of a locator timed out.
    #[error("Locator not found: {0}")]
    LocatorNotFound(String),

    #[error("Authentication timed out: {0}")]
    AuthenticationTimeout(String),

    /// One backup phase failed while the other succeeded.
    #[error("Partial backup failure: {0}")]
    PartialBackupFailure(String),

    #[error("Failed to remove backup folder {folder}: {reason}")]
    RetentionCleanupFailure { folder: String, reason: String },

    /// The portal rejected an uploaded claim file during validation.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Another session is already signed in through this driver.
    #[error("Driver already in use: {0}")]
    DriverInUse(String),

    #[error("Invalid session transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Transport or protocol error reported by the browser driver.
    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

