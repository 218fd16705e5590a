//! Broker authentication settings.

use crate::error::SetupError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScramAlgorithm {
    Sha256,
    Sha512,
}

impl ScramAlgorithm {
    pub fn parse(name: &str) -> Result<Self, SetupError> {
        match name {
            "SHA256" => Ok(ScramAlgorithm::Sha256),
            "SHA512" => Ok(ScramAlgorithm::Sha512),
            other => Err(SetupError::UnknownAlgorithm(other.to_string())),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain {
        username: String,
        password: String,
    },
    Scram {
        algorithm: ScramAlgorithm,
        username: String,
        password: String,
    },
}

impl core::fmt::Debug for SaslMechanism {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SaslMechanism::Plain { username, .. } => f
                .debug_struct("Plain")
                .field("username", username)
                .finish_non_exhaustive(),
            SaslMechanism::Scram {
                algorithm,
                username,
                ..
            } => f
                .debug_struct("Scram")
                .field("algorithm", algorithm)
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

impl SaslMechanism {
    /// Resolve configured mechanism/algorithm names.
    ///
    /// With neither username nor password set no authentication is used and
    /// the names are not inspected.
    pub fn from_settings(
        mechanism: &str,
        algorithm: &str,
        username: &str,
        password: &str,
    ) -> Result<Option<Self>, SetupError> {
        if username.is_empty() && password.is_empty() {
            return Ok(None);
        }

        let (username, password) = (username.to_string(), password.to_string());
        match mechanism {
            "PLAIN" => Ok(Some(SaslMechanism::Plain { username, password })),
            "SCRAM" => Ok(Some(SaslMechanism::Scram {
                algorithm: ScramAlgorithm::parse(algorithm)?,
                username,
                password,
            })),
            other => Err(SetupError::UnknownMechanism(other.to_string())),
        }
    }

    pub fn username(&self) -> &str {
        match self {
            SaslMechanism::Plain { username, .. } | SaslMechanism::Scram { username, .. } => {
                username
            }
        }
    }

    pub fn password(&self) -> &str {
        match self {
            SaslMechanism::Plain { password, .. } | SaslMechanism::Scram { password, .. } => {
                password
            }
        }
    }
}
