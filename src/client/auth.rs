//! Request authorization.
//!
//! Master-key requests are signed per call with HMAC-SHA256 over the verb,
//! resource type, resource link and date. Resource tokens are passed through.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::Credential;
use crate::error::{CosmoError, CosmoResult};

type HmacSha256 = Hmac<Sha256>;

/// Builds `authorization` header values.
#[derive(Clone)]
pub enum Signer {
    MasterKey(Vec<u8>),
    ResourceToken(String),
}

impl Signer {
    pub fn from_credential(credential: &Credential) -> CosmoResult<Self> {
        match credential {
            Credential::MasterKey(key) => STANDARD
                .decode(key.trim())
                .map(Signer::MasterKey)
                .map_err(|e| CosmoError::Auth(format!("master key is not valid base64: {}", e))),
            Credential::ResourceToken(token) => Ok(Signer::ResourceToken(token.clone())),
        }
    }

    /// Authorization header for `verb` on `path` at `date` (RFC 1123 text as
    /// sent in `x-ms-date`).
    pub fn authorization(&self, verb: &str, path: &str, date: &str) -> CosmoResult<String> {
        match self {
            Signer::ResourceToken(token) => Ok(url_encode(token)),
            Signer::MasterKey(key) => {
                let (resource_type, resource_link) = resource_parts(path);
                let payload = format!(
                    "{}\n{}\n{}\n{}\n\n",
                    verb.to_lowercase(),
                    resource_type.to_lowercase(),
                    resource_link,
                    date.to_lowercase()
                );
                let mut mac = HmacSha256::new_from_slice(key)
                    .map_err(|e| CosmoError::Auth(format!("invalid master key: {}", e)))?;
                mac.update(payload.as_bytes());
                let signature = STANDARD.encode(mac.finalize().into_bytes());
                Ok(url_encode(&format!("type=master&ver=1.0&sig={}", signature)))
            }
        }
    }
}

fn url_encode(text: &str) -> String {
    url::form_urlencoded::byte_serialize(text.as_bytes()).collect()
}

/// `x-ms-date` value for `now`.
pub fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Split a resource path into the (type, link) pair the signature covers.
///
/// Feeds (`dbs/app/colls`) sign the parent link with the feed's type; items
/// (`dbs/app/colls/users`) sign their own link with the type before the id.
pub fn resource_parts(path: &str) -> (String, String) {
    let segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return (String::new(), String::new());
    }
    if segments.len() % 2 == 1 {
        let resource_type = segments[segments.len() - 1].to_string();
        let link = segments[..segments.len() - 1].join("/");
        (resource_type, link)
    } else {
        let resource_type = segments[segments.len() - 2].to_string();
        (resource_type, segments.join("/"))
    }
}
