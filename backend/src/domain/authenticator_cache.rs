//! Organization cache specialised to hand out per-org authenticators by URL.

use std::sync::Arc;

use serde_json::Value;
use url::Url;

use super::cache::{CacheProjection, DeriveError, ReactiveCache};
use super::document::str_field;
use super::http_auth::PerOrgAuthenticator;
use super::{Document, ORGANIZATIONS_COLLECTION, Organization};

/// Canonical form of an ACS URL used as the cache index.
///
/// Scheme and host are lowercased by parsing; query, fragment and trailing
/// slashes are dropped.
///
/// # Examples
/// ```
/// use acs_backend::domain::normalize_acs_url;
///
/// assert_eq!(
///     normalize_acs_url("HTTP://ACS.example.net/cwmp/?x=1").as_deref(),
///     Some("http://acs.example.net/cwmp")
/// );
/// ```
pub fn normalize_acs_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    url.set_query(None);
    url.set_fragment(None);
    Some(url.as_str().trim_end_matches('/').to_owned())
}

/// Path component normalised the same way as [`normalize_acs_url`].
pub fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

/// Projection turning organization records into authenticators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationProjection {
    realm: String,
}

impl OrganizationProjection {
    /// Build a projection advertising `realm` in challenges.
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
        }
    }
}

impl CacheProjection for OrganizationProjection {
    type Derived = PerOrgAuthenticator;

    fn collection(&self) -> &str {
        ORGANIZATIONS_COLLECTION
    }

    fn index(&self, record: &Value) -> Option<String> {
        str_field(record, "url").and_then(normalize_acs_url)
    }

    fn derive(&self, document: &Document) -> Result<PerOrgAuthenticator, DeriveError> {
        let organization = Organization::from_document(document)?;
        Ok(PerOrgAuthenticator::new(organization, self.realm.clone()))
    }
}

/// Authenticator lookups backed by the organization cache.
#[derive(Clone)]
pub struct AuthenticatorCache {
    cache: Arc<ReactiveCache<OrganizationProjection>>,
}

impl AuthenticatorCache {
    /// Wrap a loaded organization cache.
    pub fn new(cache: Arc<ReactiveCache<OrganizationProjection>>) -> Self {
        Self { cache }
    }

    /// Underlying reactive cache, for wiring its driver.
    pub fn inner(&self) -> &Arc<ReactiveCache<OrganizationProjection>> {
        &self.cache
    }

    /// Find the authenticator for a request target.
    ///
    /// `external_url` is tried first. Devices that omit scheme or host still
    /// match on `path` alone.
    pub fn lookup(&self, external_url: &str, path: &str) -> Option<Arc<PerOrgAuthenticator>> {
        if let Some(found) = normalize_acs_url(external_url).and_then(|index| self.cache.get(&index)) {
            return Some(found);
        }
        let wanted = normalize_path(path);
        self.cache
            .values()
            .into_iter()
            .find(|authenticator| normalize_path(authenticator.acs_url().path()) == wanted)
    }

    /// Find an organization's authenticator by org id.
    pub fn by_org_id(&self, org_id: &str) -> Option<Arc<PerOrgAuthenticator>> {
        self.cache
            .values()
            .into_iter()
            .find(|authenticator| authenticator.org_id() == org_id)
    }
}
