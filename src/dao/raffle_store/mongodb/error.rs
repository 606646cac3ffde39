use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;

/// Result alias returning [`MongoDaoError`] failures.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

const DUPLICATE_KEY_CODE: i32 = 11000;

/// Failures of the MongoDB backend.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// A required environment variable is not set.
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// The connection URI could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    /// The client could not be built from the options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    /// The server never answered the startup ping.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    /// A health ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    /// An index could not be created.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    /// A ticket operation failed.
    #[error("failed to {operation} ticket `{number}`")]
    Ticket {
        number: u32,
        operation: &'static str,
        #[source]
        source: MongoError,
    },
    /// The expiry sweep failed.
    #[error("failed to sweep expired reservations")]
    Sweep {
        #[source]
        source: MongoError,
    },
    /// A payment intent operation failed.
    #[error("failed to {operation} payment intent `{id}`")]
    Intent {
        id: String,
        operation: &'static str,
        #[source]
        source: MongoError,
    },
    /// A sale entry operation failed.
    #[error("failed to {operation} sale entry `{id}`")]
    Entry {
        id: String,
        operation: &'static str,
        #[source]
        source: MongoError,
    },
    /// A referrer operation failed.
    #[error("failed to {operation} referrer `{key}`")]
    Referrer {
        key: String,
        operation: &'static str,
        #[source]
        source: MongoError,
    },
    /// A counter update failed.
    #[error("failed to {operation} counter `{key}`")]
    Counter {
        key: String,
        operation: &'static str,
        #[source]
        source: MongoError,
    },
    /// A stored document could not be mapped to an entity.
    #[error("document `{id}` in `{collection}` is malformed: {reason}")]
    MalformedDocument {
        collection: &'static str,
        id: String,
        reason: String,
    },
}

/// Whether the server rejected a write because the key already exists.
pub fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}
