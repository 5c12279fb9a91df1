// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains exception and Result definitions
use thiserror::Error;

/// Represents all kind of errors which can occur while talking to the height analysis service
#[derive(Error, Debug)]
pub enum ClientException {
    /// NetworkException is thrown if a connection to the bridge cannot be established or is lost.
    #[error("{message:?}")]
    NetworkException { message: String },

    /// ProtocolException is thrown if a frame received from the bridge cannot be decoded.
    #[error("{message:?}")]
    ProtocolException { message: String },

    /// IncompatibleLibraryVersionError is thrown if the bridge does not support this version of height-client.
    #[error("Incompatible library version: Bridge has version {server_version:?} and height-client has {library_version:?}")]
    IncompatibleLibraryVersionError {
        /// Bridge protocol version.
        server_version: u16,
        /// height-client protocol version.
        library_version: u16,
    },

    /// SetupException is thrown if the setup service is unavailable or rejects the request.
    #[error("Setup service call failed: {message}")]
    SetupException { message: String },

    /// GoalRejected is thrown if the action server does not accept the analysis goal.
    #[error("Analysis goal rejected: {message}")]
    GoalRejected { message: String },

    /// ImageConversionException is thrown if an image payload cannot be turned into a bitmap.
    #[error("Image conversion failed: {message}")]
    ImageConversionException { message: String },

    /// ConfigException is thrown if the configuration cannot be read or is invalid.
    #[error("Invalid configuration: {message}")]
    ConfigException { message: String },

    /// Interrupted is returned when the operator interrupts a blocking wait.
    #[error("program interrupted before completion")]
    Interrupted,
}

/// creates a NetworkException from anything printable
pub(crate) fn network_exception<E: std::fmt::Display>(error: E) -> ClientException {
    ClientException::NetworkException {
        message: error.to_string(),
    }
}

/// creates an ImageConversionException from a static string slice
pub(crate) fn create_conversion_exception(message: &'static str) -> ClientException {
    ClientException::ImageConversionException {
        message: message.to_string(),
    }
}

/// Result type which can have ClientException as Error
pub type ClientResult<T> = Result<T, ClientException>;
