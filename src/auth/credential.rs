//! Credential extraction from the `Authorization` header.

use anyhow::{bail, Context, Result};
use axum::http::{header, HeaderMap};
use base64::Engine as _;

use super::Credential;

/// Pull a [`Credential`] out of the request headers.
///
/// `Basic` credentials that decode to `user:password` become a username and
/// password pair.  Anything else is taken as a token: the value after a
/// `Bearer ` scheme, or the raw header value when no scheme is recognised.
pub fn extract_credential(headers: &HeaderMap) -> Result<Credential> {
    let value = headers
        .get(header::AUTHORIZATION)
        .context("missing Authorization header")?
        .to_str()
        .context("Authorization header is not valid ASCII")?
        .trim();

    if value.is_empty() {
        bail!("empty Authorization header");
    }

    if let Some((username, password)) = basic_auth(value) {
        return Ok(Credential {
            username,
            password,
            token: String::new(),
        });
    }

    let (scheme, rest) = split_scheme(value).unwrap_or((value, ""));
    let token = if scheme.eq_ignore_ascii_case("bearer") {
        rest.trim()
    } else {
        value
    };
    if token.is_empty() {
        bail!("empty bearer token");
    }

    Ok(Credential {
        token: token.to_string(),
        ..Default::default()
    })
}

fn split_scheme(value: &str) -> Option<(&str, &str)> {
    value.split_once(' ')
}

fn basic_auth(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = split_scheme(value)?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}
