use std::path::PathBuf;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    /// Backup sync is off when unset.
    pub backup_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;
        let max_connections = match lookup("IPC_MAX_CONNECTIONS") {
            Some(value) => value
                .parse::<u32>()
                .with_context(|| format!("IPC_MAX_CONNECTIONS must be a positive integer, got `{value}`"))?,
            None => 5,
        };
        let backup_path = lookup("IPC_BACKUP_PATH")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            database_url,
            max_connections,
            backup_path,
        })
    }
}
