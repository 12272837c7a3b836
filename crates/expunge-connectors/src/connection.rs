use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backends a dataset can be bound to
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Postgres,
    Mongodb,
    Mysql,
    Https,
    Redshift,
    Snowflake,
    Mssql,
}

/// Permissions granted on a connection. With `Read` access the engine
/// promises never to modify data on the connected application database.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionTestStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Connection metadata for one backend. Credentials live with the driver
/// behind the client seam and are not modelled here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub key: String,
    pub name: String,
    pub connection_type: ConnectionType,
    pub access: AccessLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_test_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_test_succeeded: Option<bool>,
}

impl ConnectionConfig {
    pub fn new(
        key: impl AsRef<str>,
        connection_type: ConnectionType,
        access: AccessLevel,
    ) -> Self {
        ConnectionConfig {
            key: key.as_ref().to_owned(),
            name: key.as_ref().to_owned(),
            connection_type,
            access,
            last_test_timestamp: None,
            last_test_succeeded: None,
        }
    }

    /// Record the outcome of a connection test. Skipped tests (e.g. on an
    /// HTTPS connection) leave the previous outcome in place.
    pub fn update_test_status(&mut self, status: ConnectionTestStatus, now: DateTime<Utc>) {
        if status == ConnectionTestStatus::Skipped {
            return;
        }
        self.last_test_timestamp = Some(now);
        self.last_test_succeeded = Some(status == ConnectionTestStatus::Succeeded);
    }
}
