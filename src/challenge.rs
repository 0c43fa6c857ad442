//! Requesting and verifying domain ownership challenges.

use std::{fmt, time::Duration};

use base64::prelude::*;
use sha2::{Digest as _, Sha256};

use crate::{
    api,
    client::AcmeClient,
    error::{ClientError, Error, PollTarget, Result},
    poll::{Observation, Poller},
    trans::{Payload, Transport},
};

/// Kind of proof the CA is asked to check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChallengeType {
    /// File served over plain HTTP, see [RFC 8555 §8.3].
    ///
    /// [RFC 8555 §8.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-8.3
    Http01,

    /// `TXT` record, see [RFC 8555 §8.4].
    ///
    /// [RFC 8555 §8.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-8.4
    Dns01,

    /// Self-signed certificate served over ALPN `acme-tls/1`, see [RFC 8737].
    ///
    /// [RFC 8737]: https://datatracker.ietf.org/doc/html/rfc8737
    TlsAlpn01,

    /// Any other type the CA offers, by name.
    Other(String),
}

impl ChallengeType {
    pub fn parse(name: &str) -> Self {
        match name {
            "http-01" => ChallengeType::Http01,
            "dns-01" => ChallengeType::Dns01,
            "tls-alpn-01" => ChallengeType::TlsAlpn01,
            other => ChallengeType::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ChallengeType::Http01 => "http-01",
            ChallengeType::Dns01 => "dns-01",
            ChallengeType::TlsAlpn01 => "tls-alpn-01",
            ChallengeType::Other(name) => name,
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proof obligation for one domain, as issued by the CA.
///
/// The payload must be published (see [`ChallengeType`]) before calling
/// [`AcmeClient::check_challenge`]. The value is a snapshot: its status is the one the CA
/// reported when it was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    domain: String,
    kind: ChallengeType,
    url: String,
    token: String,
    payload: String,
    status: api::ChallengeStatus,
    authorization_url: String,
}

impl Challenge {
    fn new(
        domain: &str,
        api_challenge: &api::Challenge,
        authorization_url: &str,
        thumbprint: &str,
    ) -> Self {
        let kind = ChallengeType::parse(&api_challenge._type);
        let payload = challenge_payload(&kind, &api_challenge.token, thumbprint);

        Challenge {
            domain: domain.to_owned(),
            kind,
            url: api_challenge.url.clone(),
            token: api_challenge.token.clone(),
            payload,
            status: api_challenge.status,
            authorization_url: authorization_url.to_owned(),
        }
    }

    /// Domain name this challenge proves control of.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn kind(&self) -> &ChallengeType {
        &self.kind
    }

    /// URL the CA is told to start validating through.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Unique token of the challenge.
    ///
    /// For `http-01` this is the file name:
    ///
    /// ```text
    /// http://<domain>/.well-known/acme-challenge/<token>
    /// ```
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Content to publish.
    ///
    /// - `http-01`: the key authorization `<token>.<thumbprint>`, as the file body;
    /// - `dns-01`: base64url SHA-256 of the key authorization, as the `TXT` record value under
    ///   `_acme-challenge.<domain>.`;
    /// - `tls-alpn-01` and unknown types: the key authorization. See
    ///   [`tls_alpn_digest`](Self::tls_alpn_digest) for the certificate extension value.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// SHA-256 of the key authorization, for the `acmeIdentifier` certificate extension.
    ///
    /// See [RFC 8737 §3](https://datatracker.ietf.org/doc/html/rfc8737#section-3).
    pub fn tls_alpn_digest(&self, thumbprint: &str) -> [u8; 32] {
        Sha256::digest(key_authorization(&self.token, thumbprint)).into()
    }

    pub fn status(&self) -> api::ChallengeStatus {
        self.status
    }

    /// URL of the authorization the challenge belongs to.
    pub fn authorization_url(&self) -> &str {
        &self.authorization_url
    }
}

fn key_authorization(token: &str, thumbprint: &str) -> String {
    format!("{token}.{thumbprint}")
}

fn challenge_payload(kind: &ChallengeType, token: &str, thumbprint: &str) -> String {
    let key_auth = key_authorization(token, thumbprint);

    match kind {
        ChallengeType::Dns01 => BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(key_auth)),
        _ => key_auth,
    }
}

/// Checks that `domain` is a syntactically valid DNS name and returns it without the trailing
/// root dot.
///
/// A leading `*.` label is accepted for wildcard orders and kept.
pub(crate) fn normalize_domain(domain: &str) -> Result<&str, ClientError> {
    let invalid = |reason: &str| ClientError::new(format!("Invalid domain {domain:?}: {reason}"));

    if domain.is_empty() {
        return Err(invalid("empty"));
    }

    let normalized = domain.strip_suffix('.').unwrap_or(domain);
    let name = normalized.strip_prefix("*.").unwrap_or(normalized);

    if name.len() > 253 {
        return Err(invalid("longer than 253 octets"));
    }

    for label in name.split('.') {
        if label.is_empty() {
            return Err(invalid("empty label"));
        }

        if label.len() > 63 {
            return Err(invalid("label longer than 63 octets"));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("label starts or ends with a hyphen"));
        }

        if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(invalid("unexpected character"));
        }
    }

    Ok(normalized)
}

impl<T: Transport> AcmeClient<T> {
    /// Asks the CA for validation material for `domain`.
    ///
    /// Creates an order for the domain and returns the first challenge of its authorization that
    /// matches [`ClientConfig::challenge_types`], with the payload computed and ready to
    /// publish.
    ///
    /// If the account already proved control of the domain recently, the CA may hand out an
    /// authorization that is valid already. The returned challenge then has status `valid`.
    ///
    /// [`ClientConfig::challenge_types`]: crate::ClientConfig::challenge_types
    pub async fn request_challenge(&self, domain: &str) -> Result<Challenge> {
        let challenges = self.request_challenges(domain).await?;

        let challenge = self
            .config()
            .challenge_types
            .iter()
            .find_map(|kind| challenges.iter().find(|c| c.kind() == kind))
            .ok_or_else(|| {
                let offered = challenges
                    .iter()
                    .map(|c| c.kind().as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                ClientError::new(format!(
                    "No supported challenge offered for {domain} (offered: {offered})"
                ))
            })?;

        log::debug!(
            "Picked {} challenge for {domain} in status {}",
            challenge.kind(),
            challenge.status()
        );

        Ok(challenge.clone())
    }

    /// Like [`request_challenge`](Self::request_challenge), but returns every challenge the CA
    /// offered for the domain.
    pub async fn request_challenges(&self, domain: &str) -> Result<Vec<Challenge>> {
        let domain = normalize_domain(domain)?;

        let (_, order) = self.new_order(domain).await?;
        let thumbprint = self.transport().thumbprint();

        let mut challenges = Vec::new();

        for auth_url in &order.authorizations {
            let auth = self
                .call_kid(auth_url, Payload::PostAsGet)
                .await?
                .json::<api::Authorization>()?;

            challenges.extend(
                auth.challenges
                    .iter()
                    .map(|c| Challenge::new(domain, c, auth_url, thumbprint)),
            );
        }

        Ok(challenges)
    }

    /// Tells the CA to validate `challenge` and waits for the outcome.
    ///
    /// Returns `Ok(true)` once the CA reports the challenge `valid` and `Ok(false)` once it
    /// reports it `invalid`. The latter is final: publish new material from a fresh
    /// [`request_challenge`](Self::request_challenge) to retry.
    ///
    /// Status is polled every [`ClientConfig::poll_interval`]. If no terminal status is seen
    /// within `timeout` (default [`ClientConfig::timeout`]), fails with
    /// [`Error::Timeout`](crate::Error::Timeout).
    ///
    /// [`ClientConfig::poll_interval`]: crate::ClientConfig::poll_interval
    /// [`ClientConfig::timeout`]: crate::ClientConfig::timeout
    pub async fn check_challenge(
        &self,
        challenge: &Challenge,
        timeout: Option<Duration>,
    ) -> Result<bool> {
        let outcome = self.poll_challenge(challenge, timeout).await?;
        Ok(outcome.status == api::ChallengeStatus::Valid)
    }

    /// Triggers validation and polls the challenge until it is valid or invalid.
    pub(crate) async fn poll_challenge(
        &self,
        challenge: &Challenge,
        timeout: Option<Duration>,
    ) -> Result<api::Challenge> {
        let res = self
            .call_kid(challenge.url(), Payload::json(&api::EmptyObject)?)
            .await?;
        let triggered = res.json::<api::Challenge>()?;

        log::debug!(
            "Validation of {} for {} requested, status {}",
            challenge.kind(),
            challenge.domain(),
            triggered.status
        );

        let poller = Poller {
            target: PollTarget::ChallengeValidation,
            timeout: self.timeout_or_default(timeout),
            interval: self.config().poll_interval,
        };

        poller
            .run(move || async move {
                let current = self
                    .call_kid(challenge.url(), Payload::PostAsGet)
                    .await?
                    .json::<api::Challenge>()?;

                Ok::<_, Error>(if current.status.is_terminal() {
                    Observation::Done(current)
                } else {
                    Observation::InProgress(current.status.to_string())
                })
            })
            .await
    }
}
