//! Rhizome HTTP client: bundle
//! listing, manifest/payload fetch, and multipart import, all against a
//! local Rhizome daemon reachable over plain HTTP with Basic auth.

use std::io::Read as _;
use std::time::Duration;

use crate::error::{format_http_error, StoreError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RhizomeClient {
    agent: ureq::Agent,
    base_url: String,
    auth_header: String,
}

impl RhizomeClient {
    /// `server` is `host:port`; `basic_auth` is `user:password`.
    pub fn new(server: &str, basic_auth: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(DEFAULT_TIMEOUT)
            .timeout_read(DEFAULT_TIMEOUT)
            .timeout_write(DEFAULT_TIMEOUT)
            .build();
        let credentials = base64_encode(basic_auth.as_bytes());
        Self {
            agent,
            base_url: format!("http://{}", server.trim_end_matches('/')),
            auth_header: format!("Basic {credentials}"),
        }
    }

    fn authed(&self, url: &str) -> ureq::Request {
        self.agent.get(url).set("Authorization", &self.auth_header)
    }

    /// Fetches the raw text body of the bundle listing, optionally
    /// resuming from a prior continuation token.
    pub fn bundle_list(&self, since: Option<&str>) -> Result<String, StoreError> {
        let url = match since {
            Some(token) => format!("{}/restful/rhizome/bundlelist.json?since={token}", self.base_url),
            None => format!("{}/restful/rhizome/bundlelist.json", self.base_url),
        };
        let response = self.authed(&url).call().map_err(|err| format_http_error(&url, err))?;
        read_body_text(&url, response)
    }

    pub fn fetch_manifest(&self, bid_hex: &str) -> Result<Vec<u8>, StoreError> {
        let url = format!("{}/restful/rhizome/{bid_hex}.rhm", self.base_url);
        let response = self.authed(&url).call().map_err(|err| format_http_error(&url, err))?;
        read_body_bytes(&url, response)
    }

    pub fn fetch_payload(&self, bid_hex: &str) -> Result<Vec<u8>, StoreError> {
        let url = format!("{}/restful/rhizome/{bid_hex}/raw.bin", self.base_url);
        let response = self.authed(&url).call().map_err(|err| format_http_error(&url, err))?;
        read_body_bytes(&url, response)
    }

    /// Imports a bundle as a two-part `multipart/form-data` body: a
    /// `manifest` part and a `payload` part.
    pub fn import(&self, manifest_bytes: &[u8], payload_bytes: &[u8]) -> Result<(), StoreError> {
        let url = format!("{}/rhizome/import", self.base_url);
        let boundary = "lbard-import-boundary";
        let body = build_multipart(boundary, manifest_bytes, payload_bytes);

        let response = self
            .agent
            .post(&url)
            .set("Authorization", &self.auth_header)
            .set("Content-Type", &format!("multipart/form-data; boundary={boundary}"))
            .send_bytes(&body);

        match response {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(status, _)) if (200..300).contains(&status) => Ok(()),
            Err(err) => Err(format_http_error(&url, err)),
        }
    }
}

fn build_multipart(boundary: &str, manifest_bytes: &[u8], payload_bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, bytes) in [("manifest", manifest_bytes), ("payload", payload_bytes)] {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

fn read_body_text(url: &str, response: ureq::Response) -> Result<String, StoreError> {
    let status = response.status();
    if !(200..300).contains(&status) {
        return Err(StoreError::Status { url: url.to_owned(), status });
    }
    response.into_string().map_err(|source| StoreError::Body { url: url.to_owned(), source })
}

fn read_body_bytes(url: &str, response: ureq::Response) -> Result<Vec<u8>, StoreError> {
    let status = response.status();
    if !(200..300).contains(&status) {
        return Err(StoreError::Status { url: url.to_owned(), status });
    }
    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .map_err(|source| StoreError::Body { url: url.to_owned(), source })?;
    Ok(bytes)
}

const B64_ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn base64_encode(input: &[u8]) -> String {
    let mut out = String::with_capacity((input.len() + 2) / 3 * 4);
    for chunk in input.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied();
        let b2 = chunk.get(2).copied();
        out.push(B64_ALPHABET[(b0 >> 2) as usize] as char);
        out.push(B64_ALPHABET[(((b0 & 0x03) << 4) | (b1.unwrap_or(0) >> 4)) as usize] as char);
        out.push(match b1 {
            Some(b1) => B64_ALPHABET[(((b1 & 0x0F) << 2) | (b2.unwrap_or(0) >> 6)) as usize] as char,
            None => '=',
        });
        out.push(match b2 {
            Some(b2) => B64_ALPHABET[(b2 & 0x3F) as usize] as char,
            None => '=',
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_matches_known_vectors() {
        assert_eq!(base64_encode(b"user:pass"), "dXNlcjpwYXNz");
        assert_eq!(base64_encode(b""), "");
        assert_eq!(base64_encode(b"a"), "YQ==");
        assert_eq!(base64_encode(b"ab"), "YWI=");
    }

    #[test]
    fn multipart_body_contains_both_named_parts() {
        let body = build_multipart("B", b"manifest-bytes", b"payload-bytes");
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("name=\"manifest\""));
        assert!(text.contains("name=\"payload\""));
        assert!(text.ends_with("--B--\r\n"));
    }
}
