use std::env;

use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "raffle";

/// Connection settings for the CouchDB raffle database.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server URL, e.g. `http://localhost:5984`.
    pub base_url: String,
    /// Database name.
    pub database: String,
    /// Basic-auth user.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
}

impl CouchConfig {
    /// Read `COUCH_BASE_URL` (required), `COUCH_DB` (defaults to `raffle`) and the
    /// optional `COUCH_USERNAME`/`COUCH_PASSWORD` pair.
    ///
    /// Credentials are only used when both halves are present.
    pub fn from_env() -> CouchResult<Self> {
        let base_url = env_value("COUCH_BASE_URL").ok_or(CouchDaoError::MissingEnvVar {
            var: "COUCH_BASE_URL",
        })?;
        let database = env_value("COUCH_DB").unwrap_or_else(|| DEFAULT_DATABASE.to_owned());
        let (username, password) = match (env_value("COUCH_USERNAME"), env_value("COUCH_PASSWORD"))
        {
            (Some(user), Some(pass)) => (Some(user), Some(pass)),
            _ => (None, None),
        };

        Ok(Self {
            base_url,
            database,
            username,
            password,
        })
    }
}

fn env_value(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}
