//! Organization records as read from the `organizations` collection.

use url::Url;

use super::cache::DeriveError;
use super::document::exact_str_field;
use super::{Document, Secret};

/// Collection holding organization records.
pub const ORGANIZATIONS_COLLECTION: &str = "organizations";

/// Credential pair used in one direction of device authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: Secret,
}

impl Credentials {
    /// Build a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<Secret>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// A tenant of the ACS.
///
/// ## Invariants
/// - `acs_url` parses as an absolute URL.
/// - `acs_credentials` has a non-blank user name and password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    /// Document identifier, also the tenant id used by `orgId` fields.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// URL the organization's devices are provisioned to contact.
    pub acs_url: Url,
    /// Credentials devices present to the ACS.
    pub acs_credentials: Credentials,
    /// Default credentials the ACS presents to devices on connection requests.
    pub device_credentials: Option<Credentials>,
}

impl Organization {
    /// Parse an organization document.
    ///
    /// # Errors
    /// Returns [`DeriveError`] when the URL or ACS credentials are missing or
    /// unusable.
    pub fn from_document(document: &Document) -> Result<Self, DeriveError> {
        let raw_url = document
            .str_field("url")
            .ok_or_else(|| DeriveError::new("organization has no url"))?;
        let acs_url = Url::parse(raw_url)
            .map_err(|error| DeriveError::new(format!("invalid organization url: {error}")))?;
        let username = document
            .str_field("acsUsername")
            .ok_or_else(|| DeriveError::new("organization has no acsUsername"))?;
        let password = exact_str_field(document.body(), "acsPassword")
            .ok_or_else(|| DeriveError::new("organization has no acsPassword"))?;

        let device_password = exact_str_field(document.body(), "cpePassword").unwrap_or("");
        let device_credentials = document
            .str_field("cpeUsername")
            .map(|user| Credentials::new(user, device_password));

        Ok(Self {
            id: document.id().to_owned(),
            name: document.str_field("name").map(str::to_owned),
            acs_url,
            acs_credentials: Credentials::new(username, password),
            device_credentials,
        })
    }
}
