use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PersistError;

/// External SaaS account a user can connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Salesforce,
    #[serde(rename = "hubspot")]
    HubSpot,
    Google,
    Microsoft,
}

impl Provider {
    pub const ALL: [Provider; 4] = [Self::Salesforce, Self::HubSpot, Self::Google, Self::Microsoft];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Salesforce => "salesforce",
            Self::HubSpot => "hubspot",
            Self::Google => "google",
            Self::Microsoft => "microsoft",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = PersistError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "salesforce" => Ok(Self::Salesforce),
            "hubspot" => Ok(Self::HubSpot),
            "google" => Ok(Self::Google),
            "microsoft" => Ok(Self::Microsoft),
            other => Err(PersistError::InvalidCredential {
                provider: other.to_string(),
                reason: "unknown provider".to_string(),
            }),
        }
    }
}

/// OAuth credential, one shape per provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum Credential {
    Salesforce {
        access_token: String,
        #[serde(default)]
        refresh_token: Option<String>,
        instance_url: String,
        #[serde(default)]
        expires_at: Option<DateTime<Utc>>,
    },
    #[serde(rename = "hubspot")]
    HubSpot {
        access_token: String,
        #[serde(default)]
        refresh_token: Option<String>,
        #[serde(default)]
        expires_at: Option<DateTime<Utc>>,
    },
    Google {
        access_token: String,
        #[serde(default)]
        refresh_token: Option<String>,
        #[serde(default)]
        expires_at: Option<DateTime<Utc>>,
    },
    Microsoft {
        access_token: String,
        #[serde(default)]
        refresh_token: Option<String>,
        #[serde(default)]
        expires_at: Option<DateTime<Utc>>,
    },
}

impl Credential {
    pub fn provider(&self) -> Provider {
        match self {
            Self::Salesforce { .. } => Provider::Salesforce,
            Self::HubSpot { .. } => Provider::HubSpot,
            Self::Google { .. } => Provider::Google,
            Self::Microsoft { .. } => Provider::Microsoft,
        }
    }

    pub fn access_token(&self) -> &str {
        match self {
            Self::Salesforce { access_token, .. }
            | Self::HubSpot { access_token, .. }
            | Self::Google { access_token, .. }
            | Self::Microsoft { access_token, .. } => access_token,
        }
    }

    pub fn refresh_token(&self) -> Option<&str> {
        match self {
            Self::Salesforce { refresh_token, .. }
            | Self::HubSpot { refresh_token, .. }
            | Self::Google { refresh_token, .. }
            | Self::Microsoft { refresh_token, .. } => refresh_token.as_deref(),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Salesforce { expires_at, .. }
            | Self::HubSpot { expires_at, .. }
            | Self::Google { expires_at, .. }
            | Self::Microsoft { expires_at, .. } => *expires_at,
        }
    }

    /// True when the token is expired or expires within `margin`.
    /// Credentials without an expiry never need a refresh.
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at()
            .map(|at| at - margin <= Utc::now())
            .unwrap_or(false)
    }

    /// Replace token material after a refresh-token grant. Providers that do
    /// not rotate refresh tokens return none, so the old one is kept.
    pub fn refreshed(
        &self,
        new_access_token: String,
        new_refresh_token: Option<String>,
        new_expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let mut next = self.clone();
        match &mut next {
            Self::Salesforce { access_token, refresh_token, expires_at, .. }
            | Self::HubSpot { access_token, refresh_token, expires_at }
            | Self::Google { access_token, refresh_token, expires_at }
            | Self::Microsoft { access_token, refresh_token, expires_at } => {
                *access_token = new_access_token;
                if new_refresh_token.is_some() {
                    *refresh_token = new_refresh_token;
                }
                *expires_at = new_expires_at;
            }
        }
        next
    }

    fn validate(&self) -> Result<(), String> {
        if self.access_token().trim().is_empty() {
            return Err("access_token is empty".to_string());
        }
        if let Self::Salesforce { instance_url, .. } = self {
            if !instance_url.starts_with("https://") && !instance_url.starts_with("http://") {
                return Err(format!("instance_url is not a URL: {instance_url}"));
            }
        }
        Ok(())
    }
}

/// Credential row keyed by `(user_id, provider)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub user_id: String,
    pub provider: Provider,
    pub credential: Credential,
    pub updated_at: DateTime<Utc>,
}

impl StoredCredential {
    pub fn new(user_id: impl Into<String>, credential: Credential) -> Self {
        Self {
            user_id: user_id.into(),
            provider: credential.provider(),
            credential,
            updated_at: Utc::now(),
        }
    }

    /// Parse and check a stored document. The key's provider must match the
    /// credential's shape and the token must be usable.
    pub fn from_json(value: serde_json::Value) -> Result<Self, PersistError> {
        let provider_hint = value
            .get("provider")
            .and_then(|p| p.as_str())
            .unwrap_or("unknown")
            .to_string();

        let stored: Self = serde_json::from_value(value).map_err(|e| PersistError::InvalidCredential {
            provider: provider_hint.clone(),
            reason: e.to_string(),
        })?;
        stored.validate()?;
        Ok(stored)
    }

    pub fn validate(&self) -> Result<(), PersistError> {
        if self.credential.provider() != self.provider {
            return Err(PersistError::InvalidCredential {
                provider: self.provider.to_string(),
                reason: format!("stored shape is {}", self.credential.provider()),
            });
        }
        self.credential
            .validate()
            .map_err(|reason| PersistError::InvalidCredential {
                provider: self.provider.to_string(),
                reason,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn salesforce(expires_at: Option<DateTime<Utc>>) -> Credential {
        Credential::Salesforce {
            access_token: "00D-token".into(),
            refresh_token: Some("refresh".into()),
            instance_url: "https://acme.my.salesforce.com".into(),
            expires_at,
        }
    }

    #[test]
    fn expiry_margin() {
        assert!(!salesforce(None).expires_within(Duration::seconds(60)));
        assert!(salesforce(Some(Utc::now() + Duration::seconds(30))).expires_within(Duration::seconds(60)));
        assert!(!salesforce(Some(Utc::now() + Duration::hours(1))).expires_within(Duration::seconds(60)));
    }

    #[test]
    fn refresh_keeps_old_refresh_token() {
        let next = salesforce(None).refreshed("new".into(), None, None);
        assert_eq!(next.access_token(), "new");
        assert_eq!(next.refresh_token(), Some("refresh"));
    }

    #[test]
    fn mismatched_provider_is_rejected() {
        let doc = json!({
            "user_id": "u1",
            "provider": "hubspot",
            "credential": {
                "provider": "salesforce",
                "access_token": "t",
                "instance_url": "https://x.my.salesforce.com"
            },
            "updated_at": "2026-01-01T00:00:00Z"
        });
        assert!(matches!(
            StoredCredential::from_json(doc),
            Err(PersistError::InvalidCredential { .. })
        ));
    }

    #[test]
    fn loose_blob_is_rejected() {
        let doc = json!({
            "user_id": "u1",
            "provider": "salesforce",
            "credential": {"provider": "salesforce", "token": "t"},
            "updated_at": "2026-01-01T00:00:00Z"
        });
        assert!(StoredCredential::from_json(doc).is_err());
    }

    #[test]
    fn provider_parsing() {
        assert_eq!("HubSpot".parse::<Provider>().unwrap(), Provider::HubSpot);
        assert!("stripe".parse::<Provider>().is_err());
    }
}
