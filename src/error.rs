//! Error types for polymix

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolymixError {
    /// The input file or byte buffer could not be opened or decoded.
    #[error("decode init error: {0}")]
    DecodeInit(String),

    /// A source's format does not match what the stream was configured with,
    /// or a requested channel conversion is unsupported.
    #[error("audio format error: {0}")]
    AudioFormat(String),

    /// The audio backend rejected the stream configuration or no output
    /// device is available.
    #[error("device init error: {0}")]
    DeviceInit(String),

    /// The audio backend failed to start the device.
    #[error("device start error: {0}")]
    DeviceStart(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PolymixError>;
