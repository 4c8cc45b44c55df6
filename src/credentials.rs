//! The three values the bridge needs to talk to Spotify on behalf of its owner.
//!
//! Credentials are owned by the deployment environment. The setup command produces them once; the service reads
//! them on every request through a [CredentialSource], so a missing value is reported when a request comes in rather
//! than when the process starts.

use log::trace;

use crate::error::{Error, Result};

pub const CLIENT_ID_VAR: &str = "SPOTIFY_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "SPOTIFY_CLIENT_SECRET";
pub const REFRESH_TOKEN_VAR: &str = "SPOTIFY_REFRESH_TOKEN";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

/// Anything credentials can be loaded from at request time.
pub trait CredentialSource: Send + Sync {
    fn load(&self) -> Result<Credentials>;
}

/// Reads the `SPOTIFY_*` variables from the process environment every time it's asked.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl Credentials {
    pub fn new<I, S, R>(client_id: I, client_secret: S, refresh_token: R) -> Self
    where
        I: Into<String>,
        S: Into<String>,
        R: Into<String>,
    {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Read the credentials from the environment. Values are trimmed; an unset variable reads as empty.
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).map(|value| value.trim().to_owned()).unwrap_or_default();

        Self {
            client_id: read(CLIENT_ID_VAR),
            client_secret: read(CLIENT_SECRET_VAR),
            refresh_token: read(REFRESH_TOKEN_VAR),
        }
    }

    /// Returns an error naming the first empty field.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            (CLIENT_ID_VAR, &self.client_id),
            (CLIENT_SECRET_VAR, &self.client_secret),
            (REFRESH_TOKEN_VAR, &self.refresh_token),
        ] {
            if value.trim().is_empty() {
                return Err(Error::MissingCredential(name));
            }
        }

        Ok(())
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// The credentials as `KEY=value` lines, ready to be pasted into a deployment's environment or an env file.
    pub fn to_env_lines(&self) -> String {
        format!(
            "{CLIENT_ID_VAR}={}\n{CLIENT_SECRET_VAR}={}\n{REFRESH_TOKEN_VAR}={}\n",
            self.client_id, self.client_secret, self.refresh_token
        )
    }
}

// the secret and the refresh token never end up in logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

impl CredentialSource for Credentials {
    fn load(&self) -> Result<Credentials> {
        self.validate()?;
        Ok(self.clone())
    }
}

impl CredentialSource for EnvCredentials {
    fn load(&self) -> Result<Credentials> {
        let credentials = Credentials::from_env();
        trace!("Loaded credentials from environment: {:?}", credentials);

        credentials.validate()?;
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_credentials_validate() {
        let credentials = Credentials::new("id", "secret", "refresh");
        assert!(credentials.validate().is_ok());
        assert_eq!(credentials.load().unwrap(), credentials);
    }

    #[test]
    fn each_empty_field_is_named() {
        let cases = [
            (Credentials::new("", "secret", "refresh"), CLIENT_ID_VAR),
            (Credentials::new("id", "  ", "refresh"), CLIENT_SECRET_VAR),
            (Credentials::new("id", "secret", ""), REFRESH_TOKEN_VAR),
        ];

        for (credentials, expected) in cases {
            match credentials.validate() {
                Err(Error::MissingCredential(name)) => assert_eq!(name, expected),
                other => panic!("expected missing {}, got {:?}", expected, other),
            }
        }
    }

    #[test]
    fn env_lines() {
        let credentials = Credentials::new("id", "secret", "refresh");
        assert_eq!(
            credentials.to_env_lines(),
            "SPOTIFY_CLIENT_ID=id\nSPOTIFY_CLIENT_SECRET=secret\nSPOTIFY_REFRESH_TOKEN=refresh\n"
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let debug = format!("{:?}", Credentials::new("id", "hunter2", "refresh-me"));
        assert!(debug.contains("id"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("refresh-me"));
    }
}
