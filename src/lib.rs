//! Driving certificate issuance against ACME (Automatic Certificate Management Environment)
//! providers such as [Let's Encrypt](https://letsencrypt.org/).
//!
//! It follows [RFC 8555](https://datatracker.ietf.org/doc/html/rfc8555), using ACME v2 to issue
//! certificates.
//!
//! # Usage
//!
//! An [`AcmeClient`] walks one account through the issuance flow for a domain:
//!
//! 1. [`register_account`](AcmeClient::register_account) binds the account key to an account at
//!    the CA. Calling it again with the same key returns the same account.
//! 2. [`request_challenge`](AcmeClient::request_challenge) returns a [`Challenge`] whose payload
//!    must be made reachable by the CA.
//! 3. [`check_challenge`](AcmeClient::check_challenge) asks the CA to validate it and waits for
//!    the verdict.
//! 4. [`request_certificate`](AcmeClient::request_certificate) submits a CSR and waits for the
//!    certificate chain.
//!
//! [`obtain_certificate`](AcmeClient::obtain_certificate) runs all four steps, publishing the
//! challenge through a [`Provisioner`].
//!
//! Both waits are bounded: every operation that polls the CA takes an optional timeout and fails
//! with [`Error::Timeout`] when it runs out. Polls are spaced by [`ClientConfig::poll_interval`]
//! using the async runtime's timer, so many flows can share a runtime.
//!
//! ## Examples
//!
//! Complete usage examples are provided in the `demos/` directory of the source repository:
//!
//! - `http-01.rs`: issue a certificate while serving the challenge from a local web server;
//! - `account-management.rs`: register and look up accounts.
//!
//! # Errors
//!
//! Every failure is exactly one of:
//!
//! - [`ClientError`]: the request could not be made, or the CA's answer did not make sense;
//! - [`ServerError`]: the CA rejected the request, see [`ProblemKind`];
//! - [`TimeoutError`]: the CA did not finish in time.
//!
//! [`classify`] is the function sorting raw transport outcomes into these.
//!
//! # Domain Ownership
//!
//! Most website TLS certificates tries to prove ownership/control over the domain they are issued
//! for. For ACME, this means proving you control either:
//!
//! - a server answering TLS or HTTP requests for that domain;
//! - the DNS server answering name lookups against the domain.
//!
//! To use this library, there are points in the flow where you would need to modify either the web
//! server or DNS server before progressing to get the certificate. See [`Challenge::payload`].
//!
//! # Rate Limits
//!
//! The ACME API provider Let's Encrypt uses [rate limits] to ensure the API is not being abused. It
//! might be tempting to put the poll interval really low, but balance this against the real risk
//! of having access cut off.
//!
//! ## Use Staging For Development!
//!
//! Especially take care to use the Let's Encrypt staging environment for development where the rate
//! limits are more relaxed. See [`DirectoryUrl::LetsEncryptStaging`].
//!
//! [rate limits]: https://letsencrypt.org/docs/rate-limits

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]

mod account;
mod cert;
mod challenge;
mod classify;
mod client;
mod dir;
mod error;
mod jws;
mod key;
mod order;
mod poll;
mod req;
mod trans;

pub mod api;

#[cfg(test)]
mod test;

pub use crate::{
    account::AccountRecord,
    cert::{create_p256_key, CertificateRequest, CertificateResponse},
    challenge::{Challenge, ChallengeType},
    classify::classify,
    client::{
        AcmeClient, ClientConfig, Provisioner, Registration, DEFAULT_POLL_INTERVAL,
        DEFAULT_TIMEOUT,
    },
    dir::DirectoryUrl,
    error::{
        BoxError, ClientError, Error, PollTarget, ProblemKind, Result, ServerError, TimeoutError,
        ABOUT_BLANK,
    },
    key::AccountKey,
    trans::{HttpTransport, KeyRef, Payload, Response, Transport, TransportError},
};
