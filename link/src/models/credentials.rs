//! Broker login credentials.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Login sent in the CONNECT frame. Both fields are optional; brokers that
/// accept anonymous clients need neither.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub passcode: Option<String>,
}

impl Credentials {
    pub fn new(login: impl Into<String>, passcode: impl Into<String>) -> Self {
        Self {
            login: Some(login.into()),
            passcode: Some(passcode.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.login.is_none() && self.passcode.is_none()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("passcode", &self.passcode.as_ref().map(|_| "***"))
            .finish()
    }
}
