use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    api,
    cert::{CertificateRequest, CertificateResponse},
    challenge::{Challenge, ChallengeType},
    classify::classify,
    dir::DirectoryUrl,
    error::{BoxError, ClientError, Result, ServerError},
    key::AccountKey,
    trans::{HttpTransport, KeyRef, Payload, Response, Transport},
};

/// Default overall wait of the polling operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Default pause between two status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Tunables of an [`AcmeClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Pause between two status polls.
    pub poll_interval: Duration,

    /// Overall wait used when an operation is called without an explicit timeout.
    pub timeout: Duration,

    /// Challenge types [`AcmeClient::request_challenge`] picks from, in order of preference.
    pub challenge_types: Vec<ChallengeType>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            challenge_types: vec![
                ChallengeType::Http01,
                ChallengeType::Dns01,
                ChallengeType::TlsAlpn01,
            ],
        }
    }
}

impl ClientConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_challenge_types(mut self, challenge_types: Vec<ChallengeType>) -> Self {
        self.challenge_types = challenge_types;
        self
    }
}

/// Client for one ACME account at one CA.
///
/// The operations map onto the issuance flow for a domain:
///
/// 1. [`register_account`](Self::register_account)
/// 2. [`request_challenge`](Self::request_challenge), then make the payload reachable
/// 3. [`check_challenge`](Self::check_challenge)
/// 4. [`request_certificate`](Self::request_certificate)
///
/// [`obtain_certificate`](Self::obtain_certificate) runs all of them in order.
///
/// The client does not track which step a domain is in. Calling the steps out of order is
/// answered by the CA with an error.
#[derive(Debug)]
pub struct AcmeClient<T> {
    transport: T,
    directory: api::Directory,
    config: ClientConfig,

    /// Account URL (the JWS `kid`), known once registered or looked up.
    account_url: RwLock<Option<String>>,
}

impl AcmeClient<HttpTransport> {
    /// Fetches the directory at `url` and builds a client signing with `key`.
    pub async fn connect(url: DirectoryUrl<'_>, key: AccountKey) -> Result<Self> {
        let directory = url.fetch().await?;
        let transport = HttpTransport::new(key, &directory)
            .map_err(|err| ClientError::with_source(err.to_string(), err))?;

        Ok(AcmeClient::new(transport, directory))
    }
}

impl<T: Transport> AcmeClient<T> {
    pub fn new(transport: T, directory: api::Directory) -> Self {
        Self::with_config(transport, directory, ClientConfig::default())
    }

    pub fn with_config(transport: T, directory: api::Directory, config: ClientConfig) -> Self {
        AcmeClient {
            transport,
            directory,
            config,
            account_url: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns a reference to the directory's API object.
    pub fn directory(&self) -> &api::Directory {
        &self.directory
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The account URL, if the account was registered or looked up through this client.
    pub fn account_url(&self) -> Option<String> {
        self.account_url.read().clone()
    }

    pub(crate) fn set_account_url(&self, url: &str) {
        *self.account_url.write() = Some(url.to_owned());
    }

    pub(crate) fn timeout_or_default(&self, timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or(self.config.timeout)
    }

    /// Account URL to sign with, looking the account up on first use.
    pub(crate) async fn kid(&self) -> Result<String> {
        if let Some(url) = self.account_url() {
            return Ok(url);
        }

        log::debug!("Account URL unknown, looking up existing account");
        let record = self.lookup_account().await?;
        Ok(record.url)
    }

    /// One signed call, classified.
    pub(crate) async fn call(
        &self,
        url: &str,
        key: KeyRef<'_>,
        payload: Payload,
    ) -> Result<Response> {
        classify(self.transport.signed_request(url, key, payload).await)
    }

    /// Signed call identified by the account URL.
    pub(crate) async fn call_kid(&self, url: &str, payload: Payload) -> Result<Response> {
        let kid = self.kid().await?;
        self.call(url, KeyRef::Kid(&kid), payload).await
    }

    /// Runs the whole issuance flow for `domain`.
    ///
    /// Registers (or re-finds) the account, requests a challenge, hands it to `provisioner` to
    /// publish, waits for the CA to validate it and finally requests the certificate. The
    /// `timeout` applies to each of the two waits separately.
    ///
    /// A challenge the CA declares invalid is reported as [`Error::Server`] carrying the CA's
    /// validation problem.
    ///
    /// [`Error::Server`]: crate::Error::Server
    pub async fn obtain_certificate<P>(
        &self,
        domain: &str,
        registration: &Registration,
        provisioner: &P,
        csr: &CertificateRequest,
        timeout: Option<Duration>,
    ) -> Result<CertificateResponse>
    where
        P: Provisioner + ?Sized,
    {
        self.register_account(
            registration.agreement.as_deref(),
            registration.email.as_deref(),
        )
        .await?;

        let challenge = self.request_challenge(domain).await?;

        provisioner.provision(&challenge).await.map_err(|err| {
            ClientError::with_source(format!("Failed to provision challenge for {domain}"), err)
        })?;

        let outcome = self.poll_challenge(&challenge, timeout).await?;

        if outcome.status != api::ChallengeStatus::Valid {
            let err = match outcome.error {
                Some(problem) => ServerError::from_problem(problem, None),
                None => ServerError::unstructured(
                    None,
                    format!("{} challenge for {domain} is invalid", challenge.kind()),
                ),
            };
            return Err(err.into());
        }

        self.request_certificate(domain, csr, timeout).await
    }
}

/// Account details forwarded by [`AcmeClient::obtain_certificate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    pub agreement: Option<String>,
    pub email: Option<String>,
}

/// Publishes challenge payloads where the CA can find them.
///
/// For `http-01` that is a file served under
/// `http://<domain>/.well-known/acme-challenge/<token>`, for `dns-01` a `TXT` record at
/// `_acme-challenge.<domain>`.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, challenge: &Challenge) -> Result<(), BoxError>;
}
