use std::env;
use std::time::Duration;

/// Why a database URL cannot be used for `db-init`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DbConfigError {
    #[error("database URL {0} names no database")]
    MissingDatabase(String),
    #[error("database name {0:?} may only contain ASCII letters, digits and '_'")]
    InvalidDatabaseName(String),
}

/// Where the planning graph lives and how many connections to hold.
///
/// `STORYMAP_DATABASE_URL` and `STORYMAP_DB_MAX_CONNECTIONS` override the
/// defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DbConfig {
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/storymap";
    pub const ENV_VAR: &str = "STORYMAP_DATABASE_URL";
    pub const MAX_CONNECTIONS_VAR: &str = "STORYMAP_DB_MAX_CONNECTIONS";

    /// Submissions are serialized per project, so a small pool suffices.
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;

    pub fn from_env() -> Self {
        let database_url =
            env::var(Self::ENV_VAR).unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        Self::new(database_url).with_max_connections(Self::env_max_connections())
    }

    /// Pool size from `STORYMAP_DB_MAX_CONNECTIONS`, or the default when
    /// unset or unparseable.
    pub fn env_max_connections() -> u32 {
        env::var(Self::MAX_CONNECTIONS_VAR)
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(Self::DEFAULT_MAX_CONNECTIONS)
    }

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    /// URL without its query string, plus the query string (with `?`).
    fn split_query(&self) -> (&str, &str) {
        match self.database_url.find('?') {
            Some(pos) => self.database_url.split_at(pos),
            None => (&self.database_url, ""),
        }
    }

    /// The database name, checked so it can be spliced into
    /// `CREATE DATABASE`.
    pub fn database_name(&self) -> Result<&str, DbConfigError> {
        let (base, _) = self.split_query();
        let name = base
            .rsplit_once('/')
            .filter(|(host, name)| !host.ends_with('/') && !name.is_empty())
            .map(|(_, name)| name)
            .ok_or_else(|| DbConfigError::MissingDatabase(self.redacted_url()))?;
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DbConfigError::InvalidDatabaseName(name.to_owned()));
        }
        Ok(name)
    }

    /// The `postgres` database on the same server, keeping connection
    /// parameters such as `sslmode`.
    pub fn maintenance_url(&self) -> String {
        let (base, query) = self.split_query();
        match base.rsplit_once('/') {
            Some((server, _)) if !server.ends_with('/') => format!("{server}/postgres{query}"),
            _ => self.database_url.clone(),
        }
    }

    /// The URL with any password replaced, for logs and error messages.
    pub fn redacted_url(&self) -> String {
        let url = &self.database_url;
        let Some(scheme_end) = url.find("://").map(|i| i + 3) else {
            return url.clone();
        };
        let authority_end = url[scheme_end..]
            .find('/')
            .map_or(url.len(), |i| scheme_end + i);
        let Some(at) = url[scheme_end..authority_end].rfind('@').map(|i| scheme_end + i) else {
            return url.clone();
        };
        match url[scheme_end..at].find(':').map(|i| scheme_end + i) {
            Some(colon) => format!("{}:***{}", &url[..colon], &url[at..]),
            None => url.clone(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
