//! Credential resolution.
//!
//! Explicit options win, then the `SQLPING_*` environment variables, then an
//! interactive prompt for the password when a username is known. Resolution
//! never fails on missing input: without a username the probe falls back to
//! integrated authentication.

use crate::constants::{ENV_PASSWORD, ENV_USERNAME};
use crate::reporter::Reporter;
use std::fmt;
use zeroize::Zeroizing;

/// Source of fallback credentials.
pub trait CredentialEnv {
    fn username(&self) -> Option<String>;
    fn password(&self) -> Option<String>;
}

/// Reads `SQLPING_USERNAME` and `SQLPING_PASSWORD` from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl CredentialEnv for ProcessEnv {
    fn username(&self) -> Option<String> {
        std::env::var(ENV_USERNAME).ok()
    }

    fn password(&self) -> Option<String> {
        std::env::var(ENV_PASSWORD).ok()
    }
}

/// Fixed fallback values.
#[derive(Debug, Default, Clone)]
pub struct StaticEnv {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl CredentialEnv for StaticEnv {
    fn username(&self) -> Option<String> {
        self.username.clone()
    }

    fn password(&self) -> Option<String> {
        self.password.clone()
    }
}

/// Advisory produced while resolving credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advisory {
    UsernameFromEnv,
    PasswordFromEnv,
    PasswordOnCommandLine,
}

impl Advisory {
    /// Console lines for this advisory.
    pub fn lines(self) -> &'static [&'static str] {
        match self {
            Advisory::UsernameFromEnv => {
                &["Using username from SQLPING_USERNAME environment variable"]
            }
            Advisory::PasswordFromEnv => {
                &["Using password from SQLPING_PASSWORD environment variable"]
            }
            Advisory::PasswordOnCommandLine => &[
                "WARNING: Password provided via command line is visible in process list and shell history.",
                "Consider using SQLPING_PASSWORD environment variable or interactive prompt instead.",
            ],
        }
    }
}

/// Effective username and password.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: Zeroizing<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    pub fn has_username(&self) -> bool {
        !self.username.is_empty()
    }

    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &crate::constants::PASSWORD_MASK)
            .finish()
    }
}

/// Outcome of credential resolution.
#[derive(Debug)]
pub struct Resolution {
    pub credentials: Credentials,
    pub advisories: Vec<Advisory>,
}

impl Resolution {
    /// Print every advisory through the reporter.
    pub fn report(&self, reporter: &dyn Reporter) {
        for advisory in &self.advisories {
            for line in advisory.lines() {
                reporter.warn(line);
            }
        }
    }
}

/// Resolve the effective credentials.
///
/// The password prompt blocks until the user answers; a failed prompt leaves
/// the password empty.
pub fn resolve(
    username: &str,
    password: &str,
    env: &dyn CredentialEnv,
    reporter: &dyn Reporter,
) -> Resolution {
    let mut credentials = Credentials::new(username, password);
    let mut advisories = Vec::new();
    let password_on_command_line = !password.is_empty();

    if !credentials.has_username() {
        if let Some(name) = env.username().filter(|v| !v.is_empty()) {
            credentials.username = name;
            advisories.push(Advisory::UsernameFromEnv);
        }
    }

    if !credentials.has_password() {
        if let Some(secret) = env.password().filter(|v| !v.is_empty()) {
            credentials.password = Zeroizing::new(secret);
            advisories.push(Advisory::PasswordFromEnv);
        }
    }

    if credentials.has_username() && !credentials.has_password() {
        match reporter.prompt_secret("Password: ") {
            Ok(secret) => credentials.password = Zeroizing::new(secret),
            Err(e) => tracing::warn!("Continuing without a password: {}", e),
        }
    }

    if password_on_command_line {
        advisories.push(Advisory::PasswordOnCommandLine);
    }

    Resolution {
        credentials,
        advisories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::{MemoryReporter, Tone};

    fn env(username: Option<&str>, password: Option<&str>) -> StaticEnv {
        StaticEnv {
            username: username.map(String::from),
            password: password.map(String::from),
        }
    }

    #[test]
    fn test_explicit_values_win() {
        let reporter = MemoryReporter::new();
        let resolution = resolve("sa", "pw", &env(Some("envuser"), Some("envpw")), &reporter);

        assert_eq!(resolution.credentials.username, "sa");
        assert_eq!(resolution.credentials.password.as_str(), "pw");
        assert_eq!(resolution.advisories, vec![Advisory::PasswordOnCommandLine]);
        assert!(reporter.prompts().is_empty());
    }

    #[test]
    fn test_environment_fallback() {
        let reporter = MemoryReporter::new();
        let resolution = resolve("", "", &env(Some("envuser"), Some("envpw")), &reporter);

        assert_eq!(resolution.credentials.username, "envuser");
        assert_eq!(resolution.credentials.password.as_str(), "envpw");
        assert_eq!(
            resolution.advisories,
            vec![Advisory::UsernameFromEnv, Advisory::PasswordFromEnv]
        );
    }

    #[test]
    fn test_prompt_when_username_without_password() {
        let reporter = MemoryReporter::new().with_answer("typed");
        let resolution = resolve("sa", "", &env(None, None), &reporter);

        assert_eq!(resolution.credentials.password.as_str(), "typed");
        assert_eq!(reporter.prompts(), vec!["Password: "]);
        assert!(resolution.advisories.is_empty());
    }

    #[test]
    fn test_no_username_means_no_prompt() {
        let reporter = MemoryReporter::new();
        let resolution = resolve("", "", &env(None, None), &reporter);

        assert!(!resolution.credentials.has_username());
        assert!(!resolution.credentials.has_password());
        assert!(reporter.prompts().is_empty());
    }

    #[test]
    fn test_empty_environment_values_ignored() {
        let reporter = MemoryReporter::new();
        let resolution = resolve("", "", &env(Some(""), Some("")), &reporter);
        assert!(resolution.advisories.is_empty());
    }

    #[test]
    fn test_failed_prompt_leaves_password_empty() {
        let reporter = MemoryReporter::new();
        let resolution = resolve("sa", "", &env(None, None), &reporter);
        assert!(!resolution.credentials.has_password());
    }

    #[test]
    fn test_report_prints_command_line_warning() {
        let reporter = MemoryReporter::new();
        let resolution = resolve("sa", "pw", &env(None, None), &reporter);
        resolution.report(&reporter);

        let warnings = reporter.lines_with(Tone::Warning);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("visible in process list"));
    }

    #[test]
    fn test_debug_masks_password() {
        let creds = Credentials::new("sa", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***REDACTED***"));
    }
}
