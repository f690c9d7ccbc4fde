//! Display-safe rendering of connection strings.
//!
//! Output of this module is for printing and logging only. It is never fed
//! back into a connection.

use crate::constants::{CONNECTION_STRING_MASK, PASSWORD_MASK};
use crate::descriptor::{format_connection_string, parse_connection_string};

/// Keys whose values are secrets.
const SECRET_KEYS: &[&str] = &["password", "pwd"];

fn is_secret_key(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    SECRET_KEYS.contains(&normalized.as_str())
}

/// Mask the password in a connection string.
///
/// A string that cannot be parsed is replaced entirely, so a malformed input
/// never leaks partially.
pub fn redact_connection_string(connection_string: &str) -> String {
    match parse_connection_string(connection_string) {
        Ok(mut pairs) => {
            for (key, value) in pairs.iter_mut() {
                if is_secret_key(key) && !value.is_empty() {
                    *value = PASSWORD_MASK.to_string();
                }
            }
            format_connection_string(&pairs)
        }
        Err(e) => {
            tracing::debug!("Connection string not parseable for display: {}", e);
            CONNECTION_STRING_MASK.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::credentials::Credentials;
    use crate::descriptor::{build, ClientIdentity};

    fn identity() -> ClientIdentity {
        ClientIdentity {
            workstation_id: "WS01".to_string(),
            application_name: "sqlping".to_string(),
        }
    }

    #[test]
    fn test_password_masked() {
        let redacted = redact_connection_string("Data Source=sqlhost;User ID=sa;Password=hunter2");
        assert_eq!(
            redacted,
            "Data Source=sqlhost;User ID=sa;Password=***REDACTED***"
        );
    }

    #[test]
    fn test_pwd_alias_masked() {
        let redacted = redact_connection_string("Server=sqlhost;PWD=hunter2");
        assert!(!redacted.contains("hunter2"));
        assert!(redacted.contains(PASSWORD_MASK));
    }

    #[test]
    fn test_descriptor_passwords_never_leak() {
        let passwords = [
            "hunter2",
            "semi;colon",
            "\"quoted\"",
            "it's",
            " padded ",
            "Password=nested",
        ];
        for password in passwords {
            let built = build(
                &Settings::new("sqlhost"),
                &Credentials::new("sa", password),
                identity(),
            );
            let redacted = built.descriptor.redacted();
            assert!(redacted.contains(PASSWORD_MASK), "{}", redacted);
            assert!(!redacted.contains(password), "{} leaked", password);
        }
    }

    #[test]
    fn test_empty_password_left_alone() {
        let redacted = redact_connection_string("Server=sqlhost;Password=");
        assert_eq!(redacted, "Server=sqlhost;Password=");
    }

    #[test]
    fn test_unparseable_input_fully_masked() {
        let redacted = redact_connection_string("Server=sqlhost;Password=\"hunter2");
        assert_eq!(redacted, CONNECTION_STRING_MASK);
    }

    #[test]
    fn test_integrated_descriptor_unchanged() {
        let built = build(
            &Settings::new("sqlhost"),
            &Credentials::default(),
            identity(),
        );
        assert_eq!(
            built.descriptor.redacted(),
            built.descriptor.to_connection_string()
        );
    }
}
