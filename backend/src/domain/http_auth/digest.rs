//! HTTP Digest authentication (RFC 2617, MD5) for both directions.
//!
//! The ACS answers device requests with [`server_challenge`] and checks the
//! reply with [`DigestAuthorization::verify`]. When waking a device it plays
//! the client role: [`DigestChallenge::parse`] then
//! [`DigestChallenge::authorize`].

use std::collections::HashMap;

use md5::{Digest, Md5};

use super::{constant_time_eq, strip_scheme};

/// Lowercase hex MD5 of `input`.
pub fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// Reasons a Digest header cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    /// The header uses another scheme.
    #[error("not a Digest header")]
    NotDigest,
    /// A mandatory parameter is absent.
    #[error("Digest header lacks `{0}`")]
    MissingParameter(&'static str),
    /// The parameter list could not be tokenised.
    #[error("malformed Digest parameters: {0}")]
    Malformed(String),
    /// An algorithm other than MD5 was requested.
    #[error("unsupported Digest algorithm `{0}`")]
    UnsupportedAlgorithm(String),
    /// The offered qop list does not include `auth`.
    #[error("unsupported Digest qop `{0}`")]
    UnsupportedQop(String),
}

/// Inputs to the response hash.
#[derive(Debug, Clone, Copy)]
pub struct DigestInputs<'a> {
    /// User name.
    pub username: &'a str,
    /// Protection space.
    pub realm: &'a str,
    /// Password.
    pub password: &'a str,
    /// HTTP method.
    pub method: &'a str,
    /// Request URI as sent in the `uri` parameter.
    pub uri: &'a str,
    /// Server nonce.
    pub nonce: &'a str,
    /// `auth` for RFC 2617 responses, `None` for RFC 2069 compatibility.
    pub qop: Option<&'a str>,
    /// Nonce count as eight hex digits.
    pub nc: &'a str,
    /// Client nonce.
    pub cnonce: &'a str,
}

/// Compute the `response` parameter.
///
/// # Examples
/// ```
/// use acs_backend::domain::http_auth::digest::{DigestInputs, compute_response};
///
/// let response = compute_response(&DigestInputs {
///     username: "Mufasa",
///     realm: "testrealm@host.com",
///     password: "Circle Of Life",
///     method: "GET",
///     uri: "/dir/index.html",
///     nonce: "dcd98b7102dd2f0e8b11d0f600bfb0c093",
///     qop: Some("auth"),
///     nc: "00000001",
///     cnonce: "0a4f113b",
/// });
/// assert_eq!(response, "6629fae49393a05397450978507c4ef1");
/// ```
pub fn compute_response(inputs: &DigestInputs<'_>) -> String {
    let ha1 = md5_hex(&format!(
        "{}:{}:{}",
        inputs.username, inputs.realm, inputs.password
    ));
    let ha2 = md5_hex(&format!("{}:{}", inputs.method, inputs.uri));
    match inputs.qop {
        Some(qop) => md5_hex(&format!(
            "{ha1}:{}:{}:{}:{qop}:{ha2}",
            inputs.nonce, inputs.nc, inputs.cnonce
        )),
        None => md5_hex(&format!("{ha1}:{}:{ha2}", inputs.nonce)),
    }
}

/// Format a nonce count the way devices expect it.
pub fn format_nc(count: u32) -> String {
    format!("{count:08X}")
}

/// Build the `WWW-Authenticate` value the ACS sends to devices.
///
/// # Examples
/// ```
/// use acs_backend::domain::http_auth::digest::server_challenge;
///
/// let header = server_challenge("acs", "http://acs.example.net/cwmp", "n1~org-1");
/// assert!(header.starts_with("Digest realm=\"acs\", domain=\"http://acs.example.net/cwmp\""));
/// ```
pub fn server_challenge(realm: &str, domain: &str, nonce: &str) -> String {
    format!(
        "Digest realm=\"{realm}\", domain=\"{domain}\", algorithm=MD5, qop=\"auth\", \
         nonce=\"{nonce}\", opaque=\"{opaque}\"",
        opaque = md5_hex(nonce)
    )
}

/// A Digest challenge received from a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    /// Protection space.
    pub realm: String,
    /// Server nonce.
    pub nonce: String,
    /// Opaque value to echo back.
    pub opaque: Option<String>,
    /// Whether the device offered `qop=auth`.
    pub qop_auth: bool,
}

impl DigestChallenge {
    /// Parse a `WWW-Authenticate` header.
    ///
    /// # Errors
    /// Returns [`DigestError`] when the header is not a usable MD5 Digest
    /// challenge.
    pub fn parse(header: &str) -> Result<Self, DigestError> {
        let params = strip_scheme(header, "Digest")
            .ok_or(DigestError::NotDigest)
            .and_then(parse_params)?;

        match params.get("algorithm") {
            Some(algorithm) if !algorithm.eq_ignore_ascii_case("MD5") => {
                return Err(DigestError::UnsupportedAlgorithm(algorithm.clone()));
            }
            _ => {}
        }
        let qop_auth = match params.get("qop") {
            None => false,
            Some(offered) if offered.split(',').any(|qop| qop.trim() == "auth") => true,
            Some(offered) => return Err(DigestError::UnsupportedQop(offered.clone())),
        };

        Ok(Self {
            realm: required(&params, "realm")?,
            nonce: required(&params, "nonce")?,
            opaque: params.get("opaque").cloned(),
            qop_auth,
        })
    }

    /// Build the `Authorization` header answering this challenge.
    pub fn authorize(
        &self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
        cnonce: &str,
        nc: u32,
    ) -> String {
        let nc = format_nc(nc);
        let qop = self.qop_auth.then_some("auth");
        let response = compute_response(&DigestInputs {
            username,
            realm: &self.realm,
            password,
            method,
            uri,
            nonce: &self.nonce,
            qop,
            nc: &nc,
            cnonce,
        });

        let mut header = format!(
            "Digest username=\"{username}\", realm=\"{}\", nonce=\"{}\", uri=\"{uri}\", \
             algorithm=MD5, response=\"{response}\"",
            self.realm, self.nonce
        );
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(", opaque=\"{opaque}\""));
        }
        if qop.is_some() {
            header.push_str(&format!(", qop=auth, nc={nc}, cnonce=\"{cnonce}\""));
        }
        header
    }
}

/// A Digest `Authorization` header received from a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestAuthorization {
    /// Claimed user name.
    pub username: String,
    /// Echoed realm.
    pub realm: String,
    /// Echoed server nonce.
    pub nonce: String,
    /// Request URI the device hashed.
    pub uri: String,
    /// Response hash.
    pub response: String,
    /// `auth` when the device used RFC 2617 qop.
    pub qop: Option<String>,
    /// Nonce count.
    pub nc: Option<String>,
    /// Client nonce.
    pub cnonce: Option<String>,
}

impl DigestAuthorization {
    /// Parse an `Authorization` header.
    ///
    /// # Errors
    /// Returns [`DigestError`] when the header is not Digest or lacks a
    /// mandatory parameter.
    pub fn parse(header: &str) -> Result<Self, DigestError> {
        let params = strip_scheme(header, "Digest")
            .ok_or(DigestError::NotDigest)
            .and_then(parse_params)?;
        let qop = params.get("qop").cloned();
        let (nc, cnonce) = if qop.is_some() {
            (
                Some(required(&params, "nc")?),
                Some(required(&params, "cnonce")?),
            )
        } else {
            (None, None)
        };
        Ok(Self {
            username: required(&params, "username")?,
            realm: required(&params, "realm")?,
            nonce: required(&params, "nonce")?,
            uri: required(&params, "uri")?,
            response: required(&params, "response")?,
            qop,
            nc,
            cnonce,
        })
    }

    /// Check the response hash against `password`.
    pub fn verify(&self, password: &str, method: &str) -> bool {
        let expected = compute_response(&DigestInputs {
            username: &self.username,
            realm: &self.realm,
            password,
            method,
            uri: &self.uri,
            nonce: &self.nonce,
            qop: self.qop.as_deref(),
            nc: self.nc.as_deref().unwrap_or(""),
            cnonce: self.cnonce.as_deref().unwrap_or(""),
        });
        constant_time_eq(expected.as_bytes(), self.response.to_ascii_lowercase().as_bytes())
    }
}

fn required(params: &HashMap<String, String>, name: &'static str) -> Result<String, DigestError> {
    params
        .get(name)
        .cloned()
        .ok_or(DigestError::MissingParameter(name))
}

/// Split `key=value, key="quoted value"` lists into a map with lowercase keys.
fn parse_params(input: &str) -> Result<HashMap<String, String>, DigestError> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace() || *c == ',').is_some() {}
        if chars.peek().is_none() {
            return Ok(params);
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && *c != ',') {
            key.push(c);
        }
        let key = key.trim().to_ascii_lowercase();
        if chars.next() != Some('=') || key.is_empty() {
            return Err(DigestError::Malformed(format!("parameter `{key}` has no value")));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        closed = true;
                        break;
                    }
                    other => value.push(other),
                }
            }
            if !closed {
                return Err(DigestError::Malformed(format!("unterminated value for `{key}`")));
            }
        } else {
            while let Some(c) = chars.next_if(|c| *c != ',') {
                value.push(c);
            }
            value = value.trim().to_owned();
        }
        params.insert(key, value);
    }
}
