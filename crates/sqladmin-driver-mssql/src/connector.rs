//! Session factory for SQL Server

use crate::address::ServerAddress;
use crate::connection::{MssqlConnection, MssqlConnectionError};
use async_trait::async_trait;
use sqladmin_core::{AuthMode, Connection, ConnectionFactory, ConnectionTarget, Result};
use std::sync::Arc;
use tiberius::{AuthMethod, Config, EncryptionLevel};

/// User databases on the server, excluding master, tempdb, model and msdb
pub const LIST_DATABASES_SQL: &str =
    "SELECT name FROM sys.databases WHERE database_id > 4 ORDER BY name";

/// Opens tiberius sessions for a `ConnectionTarget`
#[derive(Debug, Clone)]
pub struct MssqlConnector {
    default_port: u16,
}

impl MssqlConnector {
    pub fn new(default_port: u16) -> Self {
        Self { default_port }
    }

    /// Build the tiberius config for a target
    pub(crate) fn build_config(
        &self,
        target: &ConnectionTarget,
    ) -> std::result::Result<(Config, ServerAddress), MssqlConnectionError> {
        let address = ServerAddress::parse(&target.server)?;

        let mut config = Config::new();
        config.host(&address.host);
        config.port(address.port_or(self.default_port));
        if let Some(instance) = &address.instance {
            config.instance_name(instance);
        }

        if let Some(db) = target.database.as_deref().filter(|db| !db.is_empty()) {
            config.database(db);
        }

        config.application_name(&target.application_name);

        if target.trust_server_certificate {
            config.trust_cert();
        }

        config.encryption(EncryptionLevel::Required);

        match &target.auth {
            AuthMode::SqlLogin { user, password } => {
                config.authentication(AuthMethod::sql_server(user, password));
            }
            AuthMode::Integrated => {
                #[cfg(windows)]
                {
                    config.authentication(AuthMethod::Integrated);
                }
                #[cfg(not(windows))]
                {
                    return Err(MssqlConnectionError::AuthenticationFailed(
                        "Windows authentication is only supported on Windows".to_string(),
                    ));
                }
            }
        }

        Ok((config, address))
    }
}

impl Default for MssqlConnector {
    fn default() -> Self {
        Self::new(sqladmin_core::settings::DEFAULT_PORT)
    }
}

#[async_trait]
impl ConnectionFactory for MssqlConnector {
    async fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn Connection>> {
        let (config, address) = self.build_config(target)?;
        let connection = MssqlConnection::open(
            config,
            &address.to_string(),
            target.database.as_deref(),
            address.instance.is_some(),
        )
        .await?;
        Ok(Arc::new(connection))
    }
}
