//! Transport boundary.
//!
//! The protocol core only speaks to a [`Transport`]: one authenticated, signed call per
//! request, answered with a status code and a body. [`HttpTransport`] is the bundled
//! implementation; tests and alternative stacks can provide their own.

use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;

use crate::{
    api,
    error::{BoxError, ClientError, ProblemKind},
    jws::{self, JwsProtectedHeader},
    key::AccountKey,
    req::{http_client, req_expect_header, req_head, req_into_response, req_post},
};

/// How the JWS identifies the account key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRef<'a> {
    /// Embed the public key. Only used for `newAccount`.
    Jwk,

    /// Reference the account URL returned by `newAccount`.
    Kid(&'a str),
}

/// Body of a signed request.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),

    /// Empty payload, used to fetch resources ("POST-as-GET", [RFC 8555 §6.3]).
    ///
    /// [RFC 8555 §6.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.3
    PostAsGet,
}

impl Payload {
    pub(crate) fn json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Payload, ClientError> {
        serde_json::to_value(value)
            .map(Payload::Json)
            .map_err(|err| ClientError::with_source("Failed to encode request payload", err))
    }
}

/// A CA response of any status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub status: u16,

    /// The `Location` header, used for account and order URLs.
    pub location: Option<String>,

    pub content_type: Option<String>,

    pub body: String,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// Decodes the body into the expected schema.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_str(&self.body).map_err(|err| {
            ClientError::with_source(
                format!("Unexpected response body (status {}): {}", self.status, self.body),
                err,
            )
        })
    }

    /// Returns the `Location` header or fails.
    pub fn expect_location(&self) -> Result<&str, ClientError> {
        self.location
            .as_deref()
            .ok_or_else(|| ClientError::new("Missing header: location"))
    }

    /// Parses the body as a problem document, if it is one.
    pub fn problem(&self) -> Option<api::Problem> {
        if self.is_success() {
            return None;
        }

        serde_json::from_str(&self.body).ok()
    }
}

/// A failure to complete a request at all: connection errors, signing failures, missing nonces.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        TransportError {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        TransportError {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Performs signed calls against CA endpoints.
///
/// Implementations own the account key, request signing and nonce handling. Non-success
/// responses are returned as `Ok`, only failures to obtain a response are `Err`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// JWK thumbprint of the account key, base64url encoded.
    fn thumbprint(&self) -> &str;

    /// Makes one signed request.
    async fn signed_request(
        &self,
        url: &str,
        key: KeyRef<'_>,
        payload: Payload,
    ) -> Result<Response, TransportError>;
}

/// Number of times a request rejected for its nonce is re-signed and re-sent.
const BAD_NONCE_RETRIES: usize = 5;

/// HTTPS transport signing requests with an [`AccountKey`].
///
/// Setup is:
///
/// 1. `HttpTransport::new()` with the directory's `newNonce` URL.
/// 2. `signed_request()` with [`KeyRef::Jwk`] against `newAccount`.
/// 3. `signed_request()` with [`KeyRef::Kid`] for all calls after that.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    key: AccountKey,
    thumbprint: String,
    nonce_pool: Arc<NoncePool>,
}

impl HttpTransport {
    pub fn new(key: AccountKey, directory: &api::Directory) -> Result<Self, TransportError> {
        let client = http_client()
            .map_err(|err| TransportError::with_source("Failed to build HTTP client", err))?;

        let thumbprint = key
            .thumbprint()
            .map_err(|err| TransportError::with_source("Failed to compute key thumbprint", err))?;

        Ok(HttpTransport {
            client,
            key,
            thumbprint,
            nonce_pool: Arc::new(NoncePool::new(&directory.new_nonce)),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    async fn signed_request(
        &self,
        url: &str,
        key: KeyRef<'_>,
        payload: Payload,
    ) -> Result<Response, TransportError> {
        let mut retries = 0;

        // The ACME API may at any point invalidate all nonces. If we detect such an
        // error, we retry with a fresh nonce.
        loop {
            let nonce = self.nonce_pool.get_nonce(&self.client).await?;

            let body = JwsProtectedHeader::new(key, &self.key, url, nonce)
                .and_then(|protected| jws::sign(&protected, &self.key, &payload))
                .map_err(|err| TransportError::with_source("Failed to sign request", err))?;

            log::debug!("Call endpoint: {url}");
            let res = req_post(&self.client, url, body).await?;

            // Regardless of the request being a success or not, there might be a nonce in the
            // response.
            self.nonce_pool.extract_nonce(&res);

            let res = req_into_response(res).await;

            let bad_nonce = res
                .problem()
                .is_some_and(|problem| ProblemKind::parse(&problem._type) == ProblemKind::BadNonce);

            if bad_nonce && retries < BAD_NONCE_RETRIES {
                retries += 1;
                log::debug!("Retrying on bad nonce ({retries}/{BAD_NONCE_RETRIES})");
                continue;
            }

            return Ok(res);
        }
    }
}

/// Shared pool of nonces.
#[derive(Default, Debug)]
pub(crate) struct NoncePool {
    nonce_url: String,
    pool: Mutex<VecDeque<String>>,
}

impl NoncePool {
    pub(crate) fn new(nonce_url: &str) -> Self {
        NoncePool {
            nonce_url: nonce_url.to_owned(),
            ..Default::default()
        }
    }

    fn extract_nonce(&self, res: &reqwest::Response) {
        let Some(nonce) = res
            .headers()
            .get("replay-nonce")
            .and_then(|nonce| nonce.to_str().ok())
        else {
            return;
        };

        log::trace!("Extracting new nonce");

        let mut pool = self.pool.lock();
        pool.push_back(nonce.to_owned());

        if pool.len() > 10 {
            pool.pop_front();
        }
    }

    async fn get_nonce(&self, client: &reqwest::Client) -> Result<String, TransportError> {
        let pooled = self.pool.lock().pop_front();

        if let Some(nonce) = pooled {
            log::trace!("Use previous nonce");
            return Ok(nonce);
        }

        log::debug!("Request new nonce");
        let res = req_head(client, &self.nonce_url).await?;
        req_expect_header(&res, "replay-nonce")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_json_schema_mismatch() {
        let res = Response {
            status: 200,
            body: r#"{"status":"valid"}"#.to_owned(),
            ..Default::default()
        };

        let err = res.json::<api::Order>().unwrap_err();
        assert!(err.message().contains("Unexpected response body"));
    }

    #[test]
    fn test_response_problem_only_for_failures() {
        let body = r#"{"type":"urn:ietf:params:acme:error:badNonce"}"#.to_owned();

        let ok = Response {
            status: 200,
            body: body.clone(),
            ..Default::default()
        };
        assert!(ok.problem().is_none());

        let failed = Response {
            status: 400,
            body,
            ..Default::default()
        };
        assert_eq!(
            failed.problem().unwrap()._type,
            "urn:ietf:params:acme:error:badNonce"
        );
    }

    #[tokio::test]
    async fn test_bad_nonce_is_retried() {
        let server = crate::test::with_directory_server();
        let directory = crate::DirectoryUrl::Other(&server.dir_url)
            .fetch()
            .await
            .unwrap();
        let transport = HttpTransport::new(AccountKey::generate(), &directory).unwrap();

        let url = server.dir_url.replace("/directory", "/acme/bad-nonce");
        let res = transport
            .signed_request(&url, KeyRef::Kid("https://ca.test/acct/1"), Payload::PostAsGet)
            .await
            .unwrap();

        assert_eq!(res.status, 400);
        assert_eq!(
            server.bad_nonce_hits.load(std::sync::atomic::Ordering::SeqCst),
            BAD_NONCE_RETRIES + 1
        );
    }

    #[test]
    fn test_missing_location() {
        let res = Response {
            status: 201,
            ..Default::default()
        };
        assert!(res.expect_location().is_err());
    }
}
