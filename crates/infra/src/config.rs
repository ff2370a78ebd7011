//! Store selection and repository tunables, read from the environment.
//!
//! | Variable                         | Default  | Meaning                                   |
//! |----------------------------------|----------|-------------------------------------------|
//! | `CHRONICLE_STORE`                | `memory` | `memory`, `postgres` or `sqlite`          |
//! | `CHRONICLE_DATABASE_URL`         |          | falls back to `DATABASE_URL`              |
//! | `CHRONICLE_MAX_CONNECTIONS`      | `5`      | SQL pool size                             |
//! | `CHRONICLE_OPERATION_TIMEOUT_MS` | unset    | per store round-trip deadline; `0` = none |

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::event_store::{
    InMemoryEventStore, PostgresEventStore, SharedEventStore, SqliteEventStore,
};
use crate::repository::{RepositoryConfig, RepositoryError};

pub const STORE_VAR: &str = "CHRONICLE_STORE";
pub const DATABASE_URL_VAR: &str = "CHRONICLE_DATABASE_URL";
pub const FALLBACK_DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "CHRONICLE_MAX_CONNECTIONS";
pub const OPERATION_TIMEOUT_VAR: &str = "CHRONICLE_OPERATION_TIMEOUT_MS";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const SQLITE_MEMORY_URL: &str = "sqlite::memory:";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "inmemory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(RepositoryError::configuration(format!(
                "unknown {STORE_VAR} value '{other}' (expected memory, postgres or sqlite)"
            ))),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub operation_timeout: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            operation_timeout: None,
        }
    }
}

impl StoreConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, RepositoryError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup` (the environment, a map in tests, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RepositoryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = match non_empty(STORE_VAR) {
            Some(raw) => raw.parse::<StoreBackend>()?,
            None => {
                tracing::warn!("{STORE_VAR} not set, using the in-memory event store");
                StoreBackend::Memory
            }
        };

        let database_url =
            non_empty(DATABASE_URL_VAR).or_else(|| non_empty(FALLBACK_DATABASE_URL_VAR));
        if backend != StoreBackend::Memory && database_url.is_none() {
            return Err(RepositoryError::configuration(format!(
                "{DATABASE_URL_VAR} (or {FALLBACK_DATABASE_URL_VAR}) must be set for the {backend} store"
            )));
        }

        let max_connections = match non_empty(MAX_CONNECTIONS_VAR) {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(RepositoryError::configuration(format!(
                        "{MAX_CONNECTIONS_VAR} must be a positive integer, got '{raw}'"
                    )));
                }
            },
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let operation_timeout = match non_empty(OPERATION_TIMEOUT_VAR) {
            Some(raw) => {
                let millis = raw.trim().parse::<u64>().map_err(|_| {
                    RepositoryError::configuration(format!(
                        "{OPERATION_TIMEOUT_VAR} must be milliseconds, got '{raw}'"
                    ))
                })?;
                (millis > 0).then(|| Duration::from_millis(millis))
            }
            None => None,
        };

        Ok(Self {
            backend,
            database_url,
            max_connections,
            operation_timeout,
        })
    }

    pub fn repository_config(&self) -> RepositoryConfig {
        RepositoryConfig {
            operation_timeout: self.operation_timeout,
        }
    }

    /// Open the selected backend and make sure its schema exists.
    pub async fn connect(&self) -> Result<SharedEventStore, RepositoryError> {
        let store: SharedEventStore = match self.backend {
            StoreBackend::Memory => Arc::new(InMemoryEventStore::new()),
            StoreBackend::Postgres => {
                let store =
                    PostgresEventStore::connect(self.require_url()?, self.max_connections).await?;
                store.init_schema().await?;
                Arc::new(store)
            }
            StoreBackend::Sqlite => {
                let url = self.require_url()?;
                let store = if url == SQLITE_MEMORY_URL {
                    SqliteEventStore::in_memory().await?
                } else {
                    let store = SqliteEventStore::connect(url, self.max_connections).await?;
                    store.init_schema().await?;
                    store
                };
                Arc::new(store)
            }
        };

        tracing::info!(backend = %self.backend, "event store ready");
        Ok(store)
    }

    fn require_url(&self) -> Result<&str, RepositoryError> {
        self.database_url.as_deref().ok_or_else(|| {
            RepositoryError::configuration(format!(
                "no database url configured for the {} store",
                self.backend
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::event_store::EventStore;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn empty_environment_selects_the_memory_store() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.repository_config().operation_timeout, None);
    }

    #[test]
    fn sql_backend_reads_url_pool_size_and_timeout() {
        let config = StoreConfig::from_lookup(lookup(&[
            (STORE_VAR, "Postgres"),
            (FALLBACK_DATABASE_URL_VAR, "postgres://localhost/chronicle"),
            (MAX_CONNECTIONS_VAR, "12"),
            (OPERATION_TIMEOUT_VAR, "250"),
        ]))
        .unwrap();

        assert_eq!(config.backend, StoreBackend::Postgres);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/chronicle"));
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.operation_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn chronicle_url_wins_over_fallback() {
        let config = StoreConfig::from_lookup(lookup(&[
            (STORE_VAR, "sqlite"),
            (DATABASE_URL_VAR, "sqlite::memory:"),
            (FALLBACK_DATABASE_URL_VAR, "postgres://elsewhere"),
        ]))
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("sqlite::memory:"));
    }

    #[test]
    fn zero_timeout_means_none() {
        let config = StoreConfig::from_lookup(lookup(&[(OPERATION_TIMEOUT_VAR, "0")])).unwrap();
        assert_eq!(config.operation_timeout, None);
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        for pairs in [
            vec![(STORE_VAR, "cassandra")],
            vec![(STORE_VAR, "postgres")],
            vec![(MAX_CONNECTIONS_VAR, "0")],
            vec![(OPERATION_TIMEOUT_VAR, "soon")],
        ] {
            let err = StoreConfig::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(matches!(err, RepositoryError::Configuration(_)), "{pairs:?}");
        }
    }

    #[tokio::test]
    async fn connect_opens_an_initialized_sqlite_memory_store() {
        let config = StoreConfig {
            backend: StoreBackend::Sqlite,
            database_url: Some(SQLITE_MEMORY_URL.to_string()),
            ..StoreConfig::default()
        };
        let store = config.connect().await.unwrap();
        assert!(store.get_all_events().await.unwrap().is_empty());
    }
}
