use std::path::PathBuf;

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the application
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),
    /// A PHP source file could not be parsed
    ParseFailure { file: PathBuf, message: String },
    /// A referenced class could not be located
    MissingClass(String),
    /// A cache entry exists but cannot be read back
    CacheCorruption { path: PathBuf, message: String },
    /// An additional route file failed to load
    RouteFileLoad { file: PathBuf, message: String },
    /// The route table itself could not be enumerated; aborts the run
    RouteTableUnavailable(String),
    InvalidArgument(String),
    ConfigError(String),
    SerializationError(String),
}

impl Error {
    /// Short tag used as the diagnostic context for this error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::IoError(_) => "io",
            Error::ParseFailure { .. } => "parse_failure",
            Error::MissingClass(_) => "missing_class",
            Error::CacheCorruption { .. } => "cache_corruption",
            Error::RouteFileLoad { .. } => "route_file_load",
            Error::RouteTableUnavailable(_) => "route_table_unavailable",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::ConfigError(_) => "config",
            Error::SerializationError(_) => "serialization",
        }
    }

    /// Whether this error must abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::RouteTableUnavailable(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "IO error: {}", e),
            Error::ParseFailure { file, message } => {
                write!(f, "Parse failure in {}: {}", file.display(), message)
            }
            Error::MissingClass(class) => write!(f, "Class not found: {}", class),
            Error::CacheCorruption { path, message } => {
                write!(f, "Corrupted cache entry {}: {}", path.display(), message)
            }
            Error::RouteFileLoad { file, message } => {
                write!(f, "Failed to load route file {}: {}", file.display(), message)
            }
            Error::RouteTableUnavailable(msg) => write!(f, "Route table unavailable: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::SerializationError(format!("YAML serialization error: {}", err))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_route_table_failure_is_fatal() {
        assert!(Error::RouteTableUnavailable("boom".to_string()).is_fatal());
        assert!(!Error::MissingClass("App\\Foo".to_string()).is_fatal());
        assert!(!Error::ParseFailure {
            file: PathBuf::from("a.php"),
            message: "x".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_display_names_the_file() {
        let err = Error::RouteFileLoad {
            file: PathBuf::from("routes/extra.json"),
            message: "unexpected end".to_string(),
        };
        assert_eq!(err.kind(), "route_file_load");
        assert!(err.to_string().contains("routes/extra.json"));
    }
}
