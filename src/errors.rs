#[non_exhaustive]
#[derive(Debug)]
pub enum Error {
    /// Got an invalid parameter value in a function
    InvalidParameter(String),
    /// State algebra operation on operands with different field schemas
    SchemaMismatch(String),
    /// Index lookup for a species absent from a basis species list
    SpeciesNotFound(i32),
    /// The sparse-grid specification search can not terminate under the
    /// given degree function
    DegreeBoundExceeded(String),
    /// Caller-supplied output or gradient buffer has the wrong size
    BufferSizeMismatch {
        expected: usize,
        got: usize,
    },
    /// Error while serializing/deserializing data
    Json(serde_json::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidParameter(e) => write!(f, "invalid parameter: {}", e),
            Error::SchemaMismatch(e) => write!(f, "state schema mismatch: {}", e),
            Error::SpeciesNotFound(species) => write!(f, "species {} is not part of this basis", species),
            Error::DegreeBoundExceeded(e) => write!(f, "degree bound exceeded: {}", e),
            Error::BufferSizeMismatch { expected, got } => write!(
                f, "buffer size mismatch: expected {} elements, got {}", expected, got
            ),
            Error::Json(e) => write!(f, "json error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidParameter(_) |
            Error::SchemaMismatch(_) |
            Error::SpeciesNotFound(_) |
            Error::DegreeBoundExceeded(_) |
            Error::BufferSizeMismatch { .. } => None,
            Error::Json(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Error {
        Error::Json(error)
    }
}
