//! Per-organization HTTP authentication of inbound device requests.
//!
//! Each organization gets one [`PerOrgAuthenticator`]. HTTPS organizations
//! use Basic; everything else uses Digest with a nonce tagged by org id.

pub mod basic;
pub mod digest;

use url::Url;

use self::digest::{DigestAuthorization, server_challenge};
use super::{Credentials, Organization};

/// Default protection space advertised in challenges.
pub const DEFAULT_REALM: &str = "acs";

/// Method devices use for every CWMP request.
const CWMP_METHOD: &str = "POST";

/// Authentication scheme negotiated with an organization's devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Basic`, for HTTPS endpoints.
    Basic,
    /// `Authorization: Digest`, MD5 with `qop=auth`.
    Digest,
}

/// Outcome of checking a device's `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthVerdict {
    /// The organization's own credentials matched.
    Accepted,
    /// The bootstrap credentials matched; the device still needs real ones.
    ZeroTouch,
    /// The header is absent, malformed or wrong.
    Rejected,
}

/// Credential checker derived from one organization record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerOrgAuthenticator {
    organization: Organization,
    scheme: AuthScheme,
    realm: String,
}

impl PerOrgAuthenticator {
    /// Derive the authenticator for `organization`.
    pub fn new(organization: Organization, realm: impl Into<String>) -> Self {
        let scheme = if organization.acs_url.scheme() == "https" {
            AuthScheme::Basic
        } else {
            AuthScheme::Digest
        };
        Self {
            organization,
            scheme,
            realm: realm.into(),
        }
    }

    /// Identifier of the owning organization.
    pub fn org_id(&self) -> &str {
        &self.organization.id
    }

    /// Organization the authenticator was derived from.
    pub fn organization(&self) -> &Organization {
        &self.organization
    }

    /// URL devices must target.
    pub fn acs_url(&self) -> &Url {
        &self.organization.acs_url
    }

    /// Negotiated scheme.
    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    /// Check an `Authorization` header.
    pub fn verify(
        &self,
        authorization: Option<&str>,
        zero_touch: Option<&Credentials>,
    ) -> AuthVerdict {
        let Some(header) = authorization else {
            return AuthVerdict::Rejected;
        };
        let matches = |credentials: &Credentials| match self.scheme {
            AuthScheme::Basic => self.basic_matches(header, credentials),
            AuthScheme::Digest => self.digest_matches(header, credentials),
        };

        if matches(&self.organization.acs_credentials) {
            AuthVerdict::Accepted
        } else if zero_touch.is_some_and(matches) {
            AuthVerdict::ZeroTouch
        } else {
            AuthVerdict::Rejected
        }
    }

    /// Build a fresh `WWW-Authenticate` challenge.
    pub fn challenge(&self) -> String {
        match self.scheme {
            AuthScheme::Basic => basic::challenge(&self.realm),
            AuthScheme::Digest => {
                let nonce = format!("{}~{}", hex::encode(rand::random::<[u8; 16]>()), self.org_id());
                server_challenge(&self.realm, self.acs_url().as_str(), &nonce)
            }
        }
    }

    fn basic_matches(&self, header: &str, expected: &Credentials) -> bool {
        basic::parse(header).is_some_and(|(username, password)| {
            username == expected.username
                && constant_time_eq(password.as_bytes(), expected.password.expose().as_bytes())
        })
    }

    fn digest_matches(&self, header: &str, expected: &Credentials) -> bool {
        let Ok(authorization) = DigestAuthorization::parse(header) else {
            return false;
        };
        let nonce_suffix = format!("~{}", self.org_id());
        authorization.username == expected.username
            && authorization.realm == self.realm
            && authorization.nonce.ends_with(&nonce_suffix)
            && authorization.verify(expected.password.expose(), CWMP_METHOD)
    }
}

/// Remainder of `header` after `scheme` and whitespace, matched case-insensitively.
pub(crate) fn strip_scheme<'a>(header: &'a str, scheme: &str) -> Option<&'a str> {
    let (found, rest) = header.trim_start().split_once(char::is_whitespace)?;
    found.eq_ignore_ascii_case(scheme).then_some(rest)
}

/// Compare two byte strings without short-circuiting on the first mismatch.
pub(crate) fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .fold(0_u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
