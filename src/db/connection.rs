//! Connection URI construction.
//!
//! Builds a `postgresql://` URI from user-supplied fields. Only the
//! password is percent-encoded; the other fields are validated so they
//! cannot break the authority or path components.

use crate::error::{Error, Result};
use crate::models::Secret;
use std::fmt;

/// URI scheme used for every descriptor.
pub const SCHEME: &str = "postgresql";

/// Characters that would break the authority or path if left in a
/// username, host, or database name.
const FORBIDDEN_IN_PLAIN_FIELDS: &[char] = &['@', ':', '/', '?', '#'];

/// Raw connection fields as typed by the user.
#[derive(Debug, Clone, Default)]
pub struct ConnectionFields {
    pub username: String,
    pub password: Secret,
    pub host: String,
    pub port: String,
    pub database: String,
}

/// A validated, immutable connection descriptor.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    scheme: &'static str,
    username: String,
    encoded_password: String,
    host: String,
    port: u16,
    database_name: String,
}

impl ConnectionDescriptor {
    /// Validate the fields and build a descriptor.
    pub fn build(fields: &ConnectionFields) -> Result<Self> {
        let username = required("username", &fields.username)?;
        if fields.password.is_empty() {
            return Err(Error::Validation("password is required".to_string()));
        }
        let host = required("host", &fields.host)?;
        let port = required("port", &fields.port)?;
        let database = required("database", &fields.database)?;

        check_plain_field("username", username)?;
        check_host(host)?;
        check_plain_field("database", database)?;

        let port: u16 = port
            .parse()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| Error::Validation(format!("port must be 1-65535, got '{}'", port)))?;

        let descriptor = Self {
            scheme: SCHEME,
            username: username.to_string(),
            encoded_password: urlencoding::encode(fields.password.expose()).into_owned(),
            host: host.to_string(),
            port,
            database_name: database.to_string(),
        };

        // The assembled URI must survive a standard parser.
        url::Url::parse(&descriptor.uri()).map_err(|e| {
            Error::Validation(format!(
                "connection fields do not form a valid URI ({}): {}",
                e,
                descriptor.redacted_uri()
            ))
        })?;

        Ok(descriptor)
    }

    /// The full URI including the encoded password. Only hand this to the
    /// database driver.
    pub fn uri(&self) -> String {
        format!(
            "{}://{}:{}@{}:{}/{}",
            self.scheme,
            self.username,
            self.encoded_password,
            self.host,
            self.port,
            self.database_name
        )
    }

    /// The URI with the password masked, safe for logs and terminal output.
    pub fn redacted_uri(&self) -> String {
        format!(
            "{}://{}:****@{}:{}/{}",
            self.scheme, self.username, self.host, self.port, self.database_name
        )
    }

    /// Mask the encoded password wherever it appears in `text`, e.g. in a
    /// driver error message.
    pub fn redact(&self, text: &str) -> String {
        if self.encoded_password.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.encoded_password, "****")
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted_uri())
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("scheme", &self.scheme)
            .field("username", &self.username)
            .field("encoded_password", &"****")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .finish()
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::Validation(format!("{} is required", field)))
    } else {
        Ok(trimmed)
    }
}

fn check_plain_field(field: &str, value: &str) -> Result<()> {
    if let Some(c) = value
        .chars()
        .find(|c| FORBIDDEN_IN_PLAIN_FIELDS.contains(c) || c.is_whitespace())
    {
        return Err(Error::Validation(format!(
            "{} contains a character not allowed in a connection URI: {:?}",
            field, c
        )));
    }
    Ok(())
}

fn check_host(host: &str) -> Result<()> {
    // Bracketed IPv6 literals legitimately contain ':'
    if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_hexdigit() || c == ':' || c == '.') {
            return Ok(());
        }
        return Err(Error::Validation(format!("invalid IPv6 host: {}", host)));
    }
    check_plain_field("host", host)
}
