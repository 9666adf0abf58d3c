use crate::{ClientError, MqSettings, Result};
use std::fmt;

/// Port used when a connection name omits one
pub const DEFAULT_PORT: u16 = 1414;

/// A broker listener address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.host, self.port)
    }
}

/// Where to connect: queue manager, channel and one or more endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub queue_manager: String,
    pub channel: String,
    pub endpoints: Vec<Endpoint>,
}

impl ConnectionTarget {
    pub fn new(
        queue_manager: impl Into<String>,
        channel: impl Into<String>,
        connection_name: &str,
    ) -> Result<Self> {
        Ok(ConnectionTarget {
            queue_manager: queue_manager.into(),
            channel: channel.into(),
            endpoints: parse_connection_name(connection_name)?,
        })
    }

    pub fn from_settings(settings: &MqSettings) -> Result<Self> {
        Self::new(
            settings.queue_manager.clone(),
            settings.channel.clone(),
            &settings.connection,
        )
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoints: Vec<String> = self.endpoints.iter().map(|e| e.to_string()).collect();
        write!(
            f,
            "{} via {} at {}",
            self.queue_manager,
            self.channel,
            endpoints.join(",")
        )
    }
}

/// User and optional password presented on connect
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: Option<String>) -> Self {
        Credentials {
            user: user.into(),
            password,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Parse a connection name such as `localhost(1414)` or
/// `mq1(1414),mq2(1415)`. A bare host uses [`DEFAULT_PORT`].
fn parse_connection_name(connection_name: &str) -> Result<Vec<Endpoint>> {
    let invalid = || ClientError::InvalidTarget(connection_name.to_string());

    let endpoints = connection_name
        .split(',')
        .map(str::trim)
        .map(|entry| {
            if entry.is_empty() {
                return Err(invalid());
            }

            match entry.find('(') {
                None => Ok(Endpoint {
                    host: entry.to_string(),
                    port: DEFAULT_PORT,
                }),
                Some(open) => {
                    let host = entry[..open].trim();
                    let port = entry[open + 1..]
                        .strip_suffix(')')
                        .ok_or_else(invalid)?
                        .trim()
                        .parse::<u16>()
                        .map_err(|_| invalid())?;

                    if host.is_empty() {
                        return Err(invalid());
                    }

                    Ok(Endpoint {
                        host: host.to_string(),
                        port,
                    })
                }
            }
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_endpoint() {
        let endpoints = parse_connection_name("localhost(1414)").unwrap();
        assert_eq!(
            endpoints,
            vec![Endpoint {
                host: "localhost".to_string(),
                port: 1414
            }]
        );
    }

    #[test]
    fn test_parse_endpoint_list() {
        let endpoints = parse_connection_name("mq1(1414), mq2 (1415)").unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[1].host, "mq2");
        assert_eq!(endpoints[1].port, 1415);
    }

    #[test]
    fn test_bare_host_uses_default_port() {
        let endpoints = parse_connection_name("broker").unwrap();
        assert_eq!(endpoints[0].port, DEFAULT_PORT);
    }

    #[test]
    fn test_rejects_malformed_names() {
        for bad in ["", "host(", "host(abc)", "(1414)", "host(1414", "a(1),,b(2)", "h(70000)"] {
            assert!(
                matches!(parse_connection_name(bad), Err(ClientError::InvalidTarget(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials::new("app", Some("passw0rd".to_string()));
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("app"));
        assert!(!debug.contains("passw0rd"));
    }

    #[test]
    fn test_target_display() {
        let target = ConnectionTarget::new("QM1", "DEV.APP.SVRCONN", "localhost(1414)").unwrap();
        assert_eq!(target.to_string(), "QM1 via DEV.APP.SVRCONN at localhost(1414)");
    }
}
