//! Error types
//!
//! The per-point force computation itself cannot fail. These errors come from
//! the API boundary: building a kernel, handing it mismatched buffers,
//! loading configuration, or talking to the GPU.

use thiserror::Error;

/// Errors that can occur while configuring or running a force step
#[derive(Error, Debug)]
pub enum ForceError {
    /// The work-group (tile) size was zero
    #[error("tile size must be at least 1")]
    ZeroTileSize,

    /// A configuration value is out of range
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Input and output position buffers differ in length
    #[error("input buffer has {input} points but output buffer has {output}")]
    BufferLengthMismatch { input: usize, output: usize },

    /// Point indices must fit in a u32
    #[error("too many points for a 32-bit index space: {0}")]
    TooManyPoints(usize),

    /// The random offset table has the wrong number of entries
    #[error("random offset table needs {expected} entries, got {actual}")]
    RandTableLength { expected: usize, actual: usize },

    /// The config file extension could not be determined
    #[error("could not determine config format from path: {0}")]
    UnknownExtension(String),

    /// The config file format is not supported
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A parsing error occurred
    #[error("parse error: {0}")]
    Parse(String),

    /// No compatible GPU adapter found
    #[cfg(feature = "gpu")]
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to create the GPU device
    #[cfg(feature = "gpu")]
    #[error("failed to create GPU device: {0}")]
    DeviceCreation(#[from] wgpu::RequestDeviceError),

    /// Failed to map the readback buffer
    #[cfg(feature = "gpu")]
    #[error("failed to map GPU buffer: {0}")]
    BufferMapping(#[from] wgpu::BufferAsyncError),

    /// The tile size exceeds the device's work-group limits
    #[cfg(feature = "gpu")]
    #[error("tile size {tile_size} exceeds the device work-group limit of {max}")]
    TileSizeTooLarge { tile_size: u32, max: u32 },

    /// The dispatch would exceed the device's work-group count limit
    #[cfg(feature = "gpu")]
    #[error("{tiles} tiles exceed the device dispatch limit of {max}")]
    TooManyTiles { tiles: u32, max: u32 },
}

/// Result type for force step operations
pub type ForceResult<T> = Result<T, ForceError>;
