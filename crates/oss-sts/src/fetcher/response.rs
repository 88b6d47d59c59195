//! Metadata-service response parsing.

use std::borrow::Cow;

use serde::Deserialize;

use crate::credential::{Credential, parse_timestamp};
use crate::error::{CredentialError, Result};

/// Value of `Code` in a successful response.
pub const SUCCESS_CODE: &str = "Success";

/// Raw response document. Every field is optional so that a failure response
/// (which usually carries only `Code` and `Message`) is reported by its code
/// rather than by the first missing credential field.
///
/// No `Debug`: the document holds secrets.
#[derive(Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct MetadataResponse {
    access_key_id: Option<String>,
    access_key_secret: Option<String>,
    security_token: Option<String>,
    expiration: Option<String>,
    last_updated: Option<String>,
    code: Option<String>,
}

/// Parse a metadata-service response body into a [`Credential`].
///
/// `Code` is checked before anything else; a non-success code yields
/// [`CredentialError::Auth`] and the rest of the body is discarded.
pub fn parse_metadata_response(body: &str) -> Result<Credential> {
    let normalized = normalize_json(body);
    let response: MetadataResponse = serde_json::from_str(&normalized)
        .map_err(|e| CredentialError::parse(format!("invalid metadata response: {e}")))?;

    let code = required(response.code, "Code")?;
    if code != SUCCESS_CODE {
        return Err(CredentialError::auth(code));
    }

    let expiration = parse_timestamp("Expiration", &required(response.expiration, "Expiration")?)?;
    let last_updated =
        parse_timestamp("LastUpdated", &required(response.last_updated, "LastUpdated")?)?;

    Credential::new(
        required(response.access_key_id, "AccessKeyId")?,
        required(response.access_key_secret, "AccessKeySecret")?,
        required(response.security_token, "SecurityToken")?,
        expiration,
        last_updated,
    )
}

fn required(value: Option<String>, field: &'static str) -> Result<String> {
    value.ok_or_else(|| CredentialError::parse(format!("missing field `{field}`")))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    Outside,
    Double,
    Single,
}

/// Rewrite single-quoted strings as double-quoted JSON strings.
///
/// The metadata service has historically been answered (and mocked) with
/// `'Key' : 'value'` documents. Double-quoted strings pass through untouched,
/// `"` inside a single-quoted string is escaped and `\'` becomes a plain `'`.
pub fn normalize_json(body: &str) -> Cow<'_, str> {
    if !body.contains('\'') {
        return Cow::Borrowed(body);
    }

    let mut out = String::with_capacity(body.len() + 8);
    let mut quote = Quote::Outside;
    let mut chars = body.chars();

    while let Some(c) = chars.next() {
        match quote {
            Quote::Outside => match c {
                '\'' => {
                    out.push('"');
                    quote = Quote::Single;
                }
                '"' => {
                    out.push('"');
                    quote = Quote::Double;
                }
                _ => out.push(c),
            },
            Quote::Double => {
                out.push(c);
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                    }
                    '"' => quote = Quote::Outside,
                    _ => {}
                }
            }
            Quote::Single => match c {
                '\\' => match chars.next() {
                    Some('\'') => out.push('\''),
                    Some(escaped) => {
                        out.push('\\');
                        out.push(escaped);
                    }
                    None => out.push('\\'),
                },
                '"' => out.push_str("\\\""),
                '\'' => {
                    out.push('"');
                    quote = Quote::Outside;
                }
                _ => out.push(c),
            },
        }
    }

    Cow::Owned(out)
}
