// ACS3-HMAC-SHA256 request signing (Alibaba Cloud OpenAPI V3).
//
// canonical request:
//
//   METHOD \n / \n canonical query \n canonical headers \n signed headers \n hex(sha256(body))
//
// string to sign:
//
//   ACS3-HMAC-SHA256 \n hex(sha256(canonical request))
//
// The signature is hex(hmac_sha256(access key secret, string to sign)).

use std::collections::BTreeMap;

use dnspool_core::{Error, Result};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub(crate) const ALGORITHM: &str = "ACS3-HMAC-SHA256";

/// RFC 3986 unreserved characters pass through, everything else is %XX
pub(crate) fn percent_encode(s: &str) -> String {
    let mut encoded = String::with_capacity(s.len() * 2);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    encoded
}

/// Sorted, percent-encoded `k=v&k=v` query string
pub(crate) fn canonical_query(params: &BTreeMap<&str, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// A request ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SignedRequest {
    /// Canonical query string, to be appended to the URL as-is
    pub query: String,
    /// Headers to send, including `authorization`
    pub headers: Vec<(String, String)>,
}

/// Per-request inputs that vary between calls
pub(crate) struct RequestContext<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub action: &'a str,
    pub version: &'a str,
    /// `%Y-%m-%dT%H:%M:%SZ` in UTC
    pub date: &'a str,
    pub nonce: &'a str,
}

/// Sign a body-less RPC request
pub(crate) fn sign_request(
    access_key_id: &str,
    access_key_secret: &str,
    ctx: &RequestContext<'_>,
    params: &BTreeMap<&str, String>,
) -> Result<SignedRequest> {
    let query = canonical_query(params);
    let payload_hash = sha256_hex(b"");

    // BTreeMap keeps header names sorted
    let mut headers: BTreeMap<&str, String> = BTreeMap::new();
    headers.insert("host", ctx.host.to_string());
    headers.insert("x-acs-action", ctx.action.to_string());
    headers.insert("x-acs-content-sha256", payload_hash.clone());
    headers.insert("x-acs-date", ctx.date.to_string());
    headers.insert("x-acs-signature-nonce", ctx.nonce.to_string());
    headers.insert("x-acs-version", ctx.version.to_string());

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();
    let signed_headers = headers.keys().copied().collect::<Vec<_>>().join(";");

    let canonical_request = format!(
        "{}\n/\n{}\n{}\n{}\n{}",
        ctx.method.to_uppercase(),
        query,
        canonical_headers,
        signed_headers,
        payload_hash
    );
    let string_to_sign = format!("{}\n{}", ALGORITHM, sha256_hex(canonical_request.as_bytes()));

    let mut mac = HmacSha256::new_from_slice(access_key_secret.as_bytes())
        .map_err(|e| Error::auth(format!("Invalid signing key: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    let authorization = format!(
        "{} Credential={},SignedHeaders={},Signature={}",
        ALGORITHM, access_key_id, signed_headers, signature
    );

    let mut out: Vec<(String, String)> = headers
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
    out.push(("authorization".to_string(), authorization));

    Ok(SignedRequest { query, headers: out })
}
