use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the streamline viewer.
#[derive(Debug, Error)]
pub enum StreamviewError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Tessellation(#[from] TessellationError),

    #[error(transparent)]
    Asset(#[from] AssetError),
}

impl StreamviewError {
    /// Returns `true` when the error was caused by a rejected parameter value
    /// rather than by a failing computation.
    ///
    /// Invalid-configuration errors are raised before any pipeline stage runs.
    #[must_use]
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(
                ConfigError::ParameterOutOfRange { .. }
                    | ConfigError::UnknownPreset(_)
                    | ConfigError::Invalid(_)
            ) | Self::Geometry(GeometryError::ParameterOutOfRange { .. })
                | Self::Tessellation(TessellationError::InvalidParameters(_))
        )
    }
}

/// Errors related to parameter and configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parameter {parameter} = {value} is out of range [{min}, {max}]")]
    ParameterOutOfRange {
        parameter: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("unknown color preset {0}, expected 0, 1 or 2")]
    UnknownPreset(i64),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors related to geometric computations.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("parameter {parameter} = {value} is out of range [{min}, {max}]")]
    ParameterOutOfRange {
        parameter: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Errors related to flow field construction and sampling.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("field has no scalar array named `{0}`")]
    MissingArray(String),

    #[error("array `{name}` has {actual} values, grid expects {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid grid: {0}")]
    InvalidGrid(String),
}

/// Errors related to tessellation.
#[derive(Debug, Error)]
pub enum TessellationError {
    #[error("invalid tessellation parameters: {0}")]
    InvalidParameters(String),

    #[error("tessellation failed: {0}")]
    Failed(String),
}

/// Errors raised while loading the static scene assets.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read asset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse asset {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid asset {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Convenience type alias for results using [`StreamviewError`].
pub type Result<T> = std::result::Result<T, StreamviewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_parameters_are_invalid_configuration() {
        let err: StreamviewError = ConfigError::UnknownPreset(7).into();
        assert!(err.is_invalid_configuration());

        let err: StreamviewError =
            TessellationError::InvalidParameters("sides must be >= 3".into()).into();
        assert!(err.is_invalid_configuration());
    }

    #[test]
    fn computation_failures_are_not_invalid_configuration() {
        let err: StreamviewError = TessellationError::Failed("cdt".into()).into();
        assert!(!err.is_invalid_configuration());

        let err: StreamviewError = FieldError::MissingArray("k".into()).into();
        assert!(!err.is_invalid_configuration());
    }
}
