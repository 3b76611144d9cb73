use std::panic::Location;
use std::path::PathBuf;

use error_location::ErrorLocation;
use thiserror::Error;

/// Setup-time failures: anything that is not the outcome of an asynchronous action.
///
/// Action outcomes travel as [`crate::ActionError`] instead.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Configuration invalid: {source} {location}")]
    Config {
        #[source]
        source: pgd_config::ConfigError,
        location: ErrorLocation,
    },

    #[error("Server '{name}' is already registered {location}")]
    DuplicateServer {
        name: String,
        location: ErrorLocation,
    },

    #[error("Failed to set up logging in {path}: {message} {location}")]
    LoggingSetup {
        path: PathBuf,
        message: String,
        location: ErrorLocation,
    },

    #[error("IO error: {source} {location}")]
    Io {
        #[source]
        source: std::io::Error,
        location: ErrorLocation,
    },
}

impl From<std::io::Error> for SupervisorError {
    #[track_caller]
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<pgd_config::ConfigError> for SupervisorError {
    #[track_caller]
    fn from(source: pgd_config::ConfigError) -> Self {
        Self::Config {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;
