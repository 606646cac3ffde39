mod config;
mod error;
mod models;
mod store;

pub use config::CouchConfig;
pub use error::CouchDaoError;
pub use store::CouchRaffleStore;

use crate::dao::storage::StorageError;

impl From<CouchDaoError> for StorageError {
    fn from(err: CouchDaoError) -> Self {
        match err {
            CouchDaoError::Conflict { path, attempts } => StorageError::Contention {
                key: path,
                attempts,
            },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
