use std::path::PathBuf;

/// Failure converting a single image. Recovered per file by the batch runner,
/// except `MissingDependency` which is only raised by the startup check.
#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Image(#[from] image::ImageError),

    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] jpeg_encoder::EncodingError),

    #[error("{width}x{height} exceeds the 65535 pixel JPEG limit")]
    TooLarge { width: u32, height: u32 },

    #[error("dependency missing: {0}")]
    MissingDependency(String),
}

/// Failure of the outbound marketplace call behind the stats route.
#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to upstream failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("OpenSea API error: {status} - {body}")]
    Upstream { status: reqwest::StatusCode, body: String },
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
