//! Error Type
//!
//! Errors surfaced by the fallible entry points of the engine: configuration
//! loading, GPU context creation, heatmap loading and readback. The per-frame
//! render path never returns these; missing kernels or resources degrade the
//! affected stage to a no-op instead.

/// Errors that can occur outside the per-frame render path.
#[derive(Debug)]
pub enum ForwardPlusError {
    /// Standard I/O error (config or heatmap file).
    Io(std::io::Error),
    /// JSON deserialization error in a config file.
    Json(serde_json::Error),
    /// Heatmap image could not be decoded.
    Image(image::ImageError),
    /// No GPU adapter matched the request.
    NoAdapter(wgpu::RequestAdapterError),
    /// The adapter refused to create a device.
    RequestDevice(wgpu::RequestDeviceError),
    /// Mapping a readback buffer failed.
    BufferMap(wgpu::BufferAsyncError),
    /// Waiting on the device failed.
    Poll(wgpu::PollError),
    /// A configuration value is out of its accepted range.
    InvalidConfig(String),
    /// A resource cannot be read back (unsupported format, lost callback).
    Readback(String),
}

impl std::fmt::Display for ForwardPlusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardPlusError::Io(e) => write!(f, "IO error: {e}"),
            ForwardPlusError::Json(e) => write!(f, "JSON error: {e}"),
            ForwardPlusError::Image(e) => write!(f, "image error: {e}"),
            ForwardPlusError::NoAdapter(e) => write!(f, "no suitable GPU adapter: {e}"),
            ForwardPlusError::RequestDevice(e) => write!(f, "device request failed: {e}"),
            ForwardPlusError::BufferMap(e) => write!(f, "buffer map failed: {e}"),
            ForwardPlusError::Poll(e) => write!(f, "device poll failed: {e}"),
            ForwardPlusError::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            ForwardPlusError::Readback(msg) => write!(f, "readback failed: {msg}"),
        }
    }
}

impl std::error::Error for ForwardPlusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ForwardPlusError::Io(e) => Some(e),
            ForwardPlusError::Json(e) => Some(e),
            ForwardPlusError::Image(e) => Some(e),
            ForwardPlusError::NoAdapter(e) => Some(e),
            ForwardPlusError::RequestDevice(e) => Some(e),
            ForwardPlusError::BufferMap(e) => Some(e),
            ForwardPlusError::Poll(e) => Some(e),
            ForwardPlusError::InvalidConfig(_) | ForwardPlusError::Readback(_) => None,
        }
    }
}

impl From<std::io::Error> for ForwardPlusError {
    fn from(e: std::io::Error) -> Self {
        ForwardPlusError::Io(e)
    }
}

impl From<serde_json::Error> for ForwardPlusError {
    fn from(e: serde_json::Error) -> Self {
        ForwardPlusError::Json(e)
    }
}

impl From<image::ImageError> for ForwardPlusError {
    fn from(e: image::ImageError) -> Self {
        ForwardPlusError::Image(e)
    }
}

impl From<wgpu::RequestAdapterError> for ForwardPlusError {
    fn from(e: wgpu::RequestAdapterError) -> Self {
        ForwardPlusError::NoAdapter(e)
    }
}

impl From<wgpu::RequestDeviceError> for ForwardPlusError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        ForwardPlusError::RequestDevice(e)
    }
}

impl From<wgpu::BufferAsyncError> for ForwardPlusError {
    fn from(e: wgpu::BufferAsyncError) -> Self {
        ForwardPlusError::BufferMap(e)
    }
}

impl From<wgpu::PollError> for ForwardPlusError {
    fn from(e: wgpu::PollError) -> Self {
        ForwardPlusError::Poll(e)
    }
}

/// Convenience alias used by the fallible entry points.
pub type Result<T> = std::result::Result<T, ForwardPlusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display() {
        let err = ForwardPlusError::InvalidConfig("tile_size_px must be 1..=16".to_string());
        assert_eq!(err.to_string(), "invalid config: tile_size_px must be 1..=16");
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ForwardPlusError = io.into();
        assert!(matches!(err, ForwardPlusError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
