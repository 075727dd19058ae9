use crate::backend::Backend;
use crate::error::PlanetaeError;
use crate::types::Credentials;
use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Runtime settings, read from `PLANETAE_`-prefixed environment variables
/// on top of the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend: Backend,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Takes precedence over host/port when set.
    pub connection_string: Option<String>,
    pub automatically_create_database: bool,
    pub loglevel: String,
    pub backup_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            host: "localhost".to_string(),
            port: 3306,
            username: None,
            password: None,
            connection_string: None,
            automatically_create_database: false,
            loglevel: "info".to_string(),
            backup_dir: PathBuf::from("backups"),
        }
    }
}

impl Config {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default())).merge(Env::prefixed("PLANETAE_"))
    }

    pub fn from_env() -> Result<Self, PlanetaeError> {
        Ok(Self::figment().extract()?)
    }

    pub fn credentials(&self) -> Credentials {
        let mut credentials = match &self.connection_string {
            Some(url) => Credentials::from_connection_string(url.clone()),
            None => Credentials::new(self.host.clone(), self.port),
        };
        credentials.username = self.username.clone();
        credentials.password = self.password.clone();
        credentials
    }
}
