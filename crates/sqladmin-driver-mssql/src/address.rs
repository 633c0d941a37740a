//! Server address parsing

use crate::connection::MssqlConnectionError;

/// A parsed SQL Server address
///
/// Accepted forms are `host`, `host,port`, `host:port` and `host\instance`.
/// `.` and `(local)` name the local machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: Option<u16>,
    /// Named instance, resolved through the SQL Browser service
    pub instance: Option<String>,
}

impl ServerAddress {
    pub fn parse(input: &str) -> Result<Self, MssqlConnectionError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(MssqlConnectionError::InvalidAddress(
                "server address is empty".to_string(),
            ));
        }

        if let Some((host, instance)) = input.split_once('\\') {
            let instance = instance.trim();
            if instance.is_empty() {
                return Err(MssqlConnectionError::InvalidAddress(format!(
                    "missing instance name in '{}'",
                    input
                )));
            }
            return Ok(Self {
                host: normalize_host(host)?,
                port: None,
                instance: Some(instance.to_string()),
            });
        }

        // SQL Server's own syntax is `host,port`; `host:port` is accepted too.
        // A bare IPv6 literal contains several colons and is left alone.
        let split = input
            .rsplit_once(',')
            .or_else(|| match input.matches(':').count() {
                1 => input.rsplit_once(':'),
                _ => None,
            });

        match split {
            Some((host, port)) => {
                let port = port.trim().parse::<u16>().map_err(|_| {
                    MssqlConnectionError::InvalidAddress(format!(
                        "invalid port '{}' in '{}'",
                        port.trim(),
                        input
                    ))
                })?;
                Ok(Self {
                    host: normalize_host(host)?,
                    port: Some(port),
                    instance: None,
                })
            }
            None => Ok(Self {
                host: normalize_host(input)?,
                port: None,
                instance: None,
            }),
        }
    }

    /// Port to dial, falling back to the configured default
    pub fn port_or(&self, default_port: u16) -> u16 {
        self.port.unwrap_or(default_port)
    }
}

impl std::fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.instance, self.port) {
            (Some(instance), _) => write!(f, "{}\\{}", self.host, instance),
            (None, Some(port)) => write!(f, "{},{}", self.host, port),
            (None, None) => f.write_str(&self.host),
        }
    }
}

fn normalize_host(host: &str) -> Result<String, MssqlConnectionError> {
    let host = host.trim();
    match host {
        "" => Err(MssqlConnectionError::InvalidAddress(
            "missing host name".to_string(),
        )),
        "." | "(local)" => Ok("localhost".to_string()),
        _ => Ok(host.to_string()),
    }
}
