use crate::error::{BadEnvVarSnafu, EnrolResult, OpenDatabaseSnafu, ParseMaxConnectionsSnafu};
use dotenvy::var;
use snafu::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::{env::VarError, str::FromStr, sync::Arc};

const IN_MEMORY_PATH: &str = ":memory:";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_SERVER_IP: &str = "127.0.0.1:8080";

fn optional_env_var(name: &'static str) -> EnrolResult<Option<String>> {
    match var(name) {
        Ok(value) => Ok(Some(value)),
        Err(dotenvy::Error::EnvVar(VarError::NotPresent)) => Ok(None),
        Err(source) => Err(source).context(BadEnvVarSnafu { name }),
    }
}

#[derive(Clone, Debug)]
pub struct RuntimeConfiguration {
    db_config: Arc<DbConfig>,
    server_ip: String,
}

impl RuntimeConfiguration {
    pub fn new() -> EnrolResult<Self> {
        Ok(Self {
            db_config: Arc::new(DbConfig::new()?),
            server_ip: optional_env_var("ENROL_SERVER_IP")?
                .unwrap_or_else(|| DEFAULT_SERVER_IP.to_string()),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::with_db(DbConfig::in_memory())
    }

    #[cfg(test)]
    pub fn with_db(db_config: DbConfig) -> Self {
        Self {
            db_config: Arc::new(db_config),
            server_ip: DEFAULT_SERVER_IP.to_string(),
        }
    }

    pub fn db_config(&self) -> Arc<DbConfig> {
        self.db_config.clone()
    }

    pub fn server_ip(&self) -> &str {
        &self.server_ip
    }
}

#[derive(Debug)]
pub struct DbConfig {
    path: String,
    max_connections: u32,
}

impl DbConfig {
    pub fn new() -> EnrolResult<Self> {
        let path = var("ENROL_DB_PATH").context(BadEnvVarSnafu {
            name: "ENROL_DB_PATH",
        })?;
        let max_connections = match optional_env_var("ENROL_DB_MAX_CONNECTIONS")? {
            Some(raw) => raw.parse::<u32>().context(ParseMaxConnectionsSnafu { original: raw })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            path,
            max_connections,
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            path: IN_MEMORY_PATH.to_string(),
            max_connections: 1,
        }
    }

    #[cfg(test)]
    pub fn at_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY_PATH
    }

    pub fn connect_options(&self) -> EnrolResult<SqliteConnectOptions> {
        let options = if self.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:").context(OpenDatabaseSnafu)?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        };

        Ok(options.foreign_keys(true))
    }

    pub fn pool_options(&self) -> SqlitePoolOptions {
        //every connection to `:memory:` is its own database, so keep exactly one alive forever
        if self.is_in_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(self.max_connections)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_config_uses_a_single_connection() {
        let config = DbConfig::in_memory();
        assert!(config.is_in_memory());
        assert_eq!(config.pool_options().get_max_connections(), 1);
    }

    #[test]
    fn file_config_is_not_in_memory() {
        let config = DbConfig {
            path: "enrol.db".to_string(),
            max_connections: 7,
        };
        assert!(!config.is_in_memory());
        assert_eq!(config.pool_options().get_max_connections(), 7);
    }
}
