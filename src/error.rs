//! Error taxonomy.
//!
//! Every failing operation resolves to exactly one of three kinds:
//!
//! - [`ClientError`]: something went wrong locally, e.g. the transport failed, a response did
//!   not match the expected schema or the caller passed an unusable argument.
//! - [`ServerError`]: the CA answered with a well-formed error, either a problem document or a
//!   bare non-success status.
//! - [`TimeoutError`]: a poll loop ran out of time before the CA reached a terminal state.

use std::{fmt, time::Duration};

use crate::api;

/// Boxed error used as the cause of client and transport errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type of all protocol operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error returned by the operations of [`AcmeClient`](crate::AcmeClient).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

impl Error {
    /// Returns true if a poll loop gave up waiting.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// Returns the CA-reported error, if this is one.
    pub fn as_server(&self) -> Option<&ServerError> {
        match self {
            Error::Server(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the problem kind of a CA-reported error.
    pub fn problem_kind(&self) -> Option<&ProblemKind> {
        self.as_server().map(ServerError::kind)
    }
}

/// A local failure: transport, schema mismatch or caller misuse.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ClientError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ClientError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        ClientError {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ClientError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<eyre::Report> for ClientError {
    fn from(err: eyre::Report) -> Self {
        ClientError::with_source(err.to_string(), err)
    }
}

impl From<eyre::Report> for Error {
    fn from(err: eyre::Report) -> Self {
        Error::Client(err.into())
    }
}

/// Problem type used when the CA sent no problem document.
///
/// See [RFC 7807 §4.2](https://datatracker.ietf.org/doc/html/rfc7807#section-4.2).
pub const ABOUT_BLANK: &str = "about:blank";

/// A well-formed error reported by the CA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    problem_type: String,
    kind: ProblemKind,
    status: Option<u16>,
    detail: Option<String>,
    subproblems: Vec<api::Subproblem>,
}

impl ServerError {
    /// Builds an error from a problem document, with the HTTP status it arrived with (if it
    /// came with a response rather than embedded in an order or challenge object).
    pub fn from_problem(problem: api::Problem, status: Option<u16>) -> Self {
        ServerError {
            kind: ProblemKind::parse(&problem._type),
            problem_type: problem._type,
            status: status.or(problem.status),
            detail: problem.detail,
            subproblems: problem.subproblems.unwrap_or_default(),
        }
    }

    /// Builds a generic error for a response that carried no problem document.
    pub fn unstructured(status: Option<u16>, detail: impl Into<String>) -> Self {
        ServerError {
            problem_type: ABOUT_BLANK.to_owned(),
            kind: ProblemKind::Other(ABOUT_BLANK.to_owned()),
            status,
            detail: Some(detail.into()),
            subproblems: Vec::new(),
        }
    }

    /// The problem type URI exactly as the CA sent it.
    pub fn problem_type(&self) -> &str {
        &self.problem_type
    }

    pub fn kind(&self) -> &ProblemKind {
        &self.kind
    }

    /// HTTP status of the failed response, when known.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Human readable detail, verbatim.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn subproblems(&self) -> &[api::Subproblem] {
        &self.subproblems
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self.problem_type),
            None => write!(f, "{}", self.problem_type),
        }
    }
}

impl std::error::Error for ServerError {}

/// ACME problem types.
///
/// See [RFC 8555 §6.7].
///
/// [RFC 8555 §6.7]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.7
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ProblemKind {
    AccountDoesNotExist,
    AlreadyRevoked,
    BadCsr,
    BadNonce,
    BadPublicKey,
    BadRevocationReason,
    BadSignatureAlgorithm,
    Caa,
    Compound,
    Connection,
    Dns,
    ExternalAccountRequired,
    IncorrectResponse,
    InvalidContact,
    Malformed,
    OrderNotReady,
    RateLimited,
    RejectedIdentifier,
    ServerInternal,
    Tls,
    Unauthorized,
    UnsupportedContact,
    UnsupportedIdentifier,
    UserActionRequired,

    /// Any problem type not listed above, holding the raw type string.
    Other(String),
}

const ACME_ERROR_PREFIX: &str = "urn:ietf:params:acme:error:";
const LEGACY_ERROR_PREFIX: &str = "urn:acme:error:";

impl ProblemKind {
    /// Maps a problem type URI onto a kind.
    pub fn parse(problem_type: &str) -> Self {
        let name = problem_type
            .strip_prefix(ACME_ERROR_PREFIX)
            .or_else(|| problem_type.strip_prefix(LEGACY_ERROR_PREFIX));

        let Some(name) = name else {
            return ProblemKind::Other(problem_type.to_owned());
        };

        match name {
            "accountDoesNotExist" => ProblemKind::AccountDoesNotExist,
            "alreadyRevoked" => ProblemKind::AlreadyRevoked,
            "badCSR" => ProblemKind::BadCsr,
            "badNonce" => ProblemKind::BadNonce,
            "badPublicKey" => ProblemKind::BadPublicKey,
            "badRevocationReason" => ProblemKind::BadRevocationReason,
            "badSignatureAlgorithm" => ProblemKind::BadSignatureAlgorithm,
            "caa" => ProblemKind::Caa,
            "compound" => ProblemKind::Compound,
            "connection" => ProblemKind::Connection,
            "dns" => ProblemKind::Dns,
            "externalAccountRequired" => ProblemKind::ExternalAccountRequired,
            "incorrectResponse" => ProblemKind::IncorrectResponse,
            "invalidContact" => ProblemKind::InvalidContact,
            "malformed" => ProblemKind::Malformed,
            "orderNotReady" => ProblemKind::OrderNotReady,
            "rateLimited" => ProblemKind::RateLimited,
            "rejectedIdentifier" => ProblemKind::RejectedIdentifier,
            "serverInternal" => ProblemKind::ServerInternal,
            "tls" => ProblemKind::Tls,
            "unauthorized" => ProblemKind::Unauthorized,
            "unsupportedContact" => ProblemKind::UnsupportedContact,
            "unsupportedIdentifier" => ProblemKind::UnsupportedIdentifier,
            "userActionRequired" => ProblemKind::UserActionRequired,
            _ => ProblemKind::Other(problem_type.to_owned()),
        }
    }
}

/// Which poll loop timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTarget {
    ChallengeValidation,
    CertificateIssuance,
}

impl fmt::Display for PollTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollTarget::ChallengeValidation => f.write_str("challenge validation"),
            PollTarget::CertificateIssuance => f.write_str("certificate issuance"),
        }
    }
}

/// The CA did not reach a terminal state before the deadline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("timed out after {timeout:?} waiting for {target} (last status: {last_status}, {polls} polls)")]
pub struct TimeoutError {
    pub(crate) target: PollTarget,
    pub(crate) timeout: Duration,
    pub(crate) polls: u32,
    pub(crate) last_status: String,
}

impl TimeoutError {
    pub fn target(&self) -> PollTarget {
        self.target
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of status polls issued before giving up.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Last non-terminal status the CA reported.
    pub fn last_status(&self) -> &str {
        &self.last_status
    }
}
