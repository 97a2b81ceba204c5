//! HTTP Basic authentication, used for organizations served over HTTPS.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::strip_scheme;

/// Build a `Basic` `Authorization` value.
///
/// # Examples
/// ```
/// use acs_backend::domain::http_auth::basic::authorization;
///
/// assert_eq!(authorization("Aladdin", "open sesame"), "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
/// ```
pub fn authorization(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Decode a `Basic` `Authorization` value into user name and password.
pub fn parse(header: &str) -> Option<(String, String)> {
    let encoded = strip_scheme(header, "Basic")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (username, password) = text.split_once(':')?;
    Some((username.to_owned(), password.to_owned()))
}

/// Build the `WWW-Authenticate` value for a Basic challenge.
pub fn challenge(realm: &str) -> String {
    format!("Basic realm=\"{realm}\"")
}
