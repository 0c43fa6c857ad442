//! Certificate orders.
//!
//! An order goes through a life cycle of states driven by the CA:
//!
//! ```text
//! pending --(authorizations valid)--> ready --(finalize)--> processing --> valid
//!    \                                  \                       \
//!     `----------------------------------`-----------------------`------> invalid
//! ```
//!
//! [`AcmeClient::request_certificate`] drives an order from `ready` to `valid` and downloads the
//! certificate.

use std::time::Duration;

use crate::{
    api::{self, OrderStatus},
    cert::{pem_chain, CertificateRequest, CertificateResponse},
    challenge::normalize_domain,
    client::AcmeClient,
    error::{ClientError, Error, PollTarget, Result, ServerError},
    poll::{Observation, Poller},
    trans::{Payload, Transport},
};

/// Error for an order the CA declared invalid, with its reason verbatim when given.
fn invalid_order(domain: &str, order: api::Order) -> ServerError {
    match order.error {
        Some(problem) => ServerError::from_problem(problem, None),
        None => ServerError::unstructured(None, format!("Order for {domain} is invalid")),
    }
}

impl<T: Transport> AcmeClient<T> {
    /// Places (or, at the CA's discretion, re-finds) an order for `domain`.
    ///
    /// Returns the order URL with the order object.
    pub(crate) async fn new_order(&self, domain: &str) -> Result<(String, api::Order)> {
        let res = self
            .call_kid(
                &self.directory().new_order,
                Payload::json(&api::NewOrder::dns(domain))?,
            )
            .await?;

        let url = res.expect_location()?.to_owned();
        let order = res.json::<api::Order>()?;

        log::debug!("Order for {domain} at {url} is {}", order.status);

        Ok((url, order))
    }

    /// Submits the CSR for `domain` and waits for the certificate.
    ///
    /// Must follow a successful [`check_challenge`](Self::check_challenge) for the same domain.
    /// Otherwise the CA refuses to finalize the order, which surfaces as
    /// [`ProblemKind::OrderNotReady`](crate::ProblemKind::OrderNotReady).
    ///
    /// The order is polled every [`ClientConfig::poll_interval`] until it is `valid`, at which
    /// point the certificate chain is downloaded. An `invalid` order fails with a
    /// [`ServerError`] carrying the CA's reason verbatim. If neither happens within `timeout`
    /// (default [`ClientConfig::timeout`]), fails with [`Error::Timeout`](crate::Error::Timeout).
    ///
    /// [`ClientConfig::poll_interval`]: crate::ClientConfig::poll_interval
    /// [`ClientConfig::timeout`]: crate::ClientConfig::timeout
    pub async fn request_certificate(
        &self,
        domain: &str,
        csr: &CertificateRequest,
        timeout: Option<Duration>,
    ) -> Result<CertificateResponse> {
        let domain = normalize_domain(domain)?;

        let (order_url, order) = self.new_order(domain).await?;

        match order.status {
            OrderStatus::Invalid => return Err(invalid_order(domain, order).into()),

            OrderStatus::Pending | OrderStatus::Ready => {
                let finalize = api::Finalize::from_der(csr.csr_der());
                let res = self
                    .call_kid(&order.finalize, Payload::json(&finalize)?)
                    .await?;
                let finalized = res.json::<api::Order>()?;

                log::debug!("Finalized order for {domain}, status {}", finalized.status);
            }

            // already finalized
            OrderStatus::Processing | OrderStatus::Valid => {}
        }

        let poller = Poller {
            target: PollTarget::CertificateIssuance,
            timeout: self.timeout_or_default(timeout),
            interval: self.config().poll_interval,
        };

        let order_url = order_url.as_str();
        let order = poller
            .run(move || async move {
                let current = self
                    .call_kid(order_url, Payload::PostAsGet)
                    .await?
                    .json::<api::Order>()?;

                Ok::<_, Error>(match current.status {
                    OrderStatus::Valid | OrderStatus::Invalid => Observation::Done(current),
                    status => Observation::InProgress(status.to_string()),
                })
            })
            .await?;

        if order.status == OrderStatus::Invalid {
            return Err(invalid_order(domain, order).into());
        }

        let cert_url = order
            .certificate
            .ok_or_else(|| ClientError::new("Valid order has no certificate URL"))?;

        let res = self.call_kid(&cert_url, Payload::PostAsGet).await?;
        let certificate = res.body;

        let chain = pem_chain(&certificate)?;
        if chain.is_empty() {
            return Err(ClientError::new(format!(
                "Certificate download for {domain} contains no certificate"
            ))
            .into());
        }

        log::info!(
            "Issued certificate for {domain} ({} certificates in chain)",
            chain.len()
        );

        Ok(CertificateResponse::new(
            domain,
            csr.private_key_pem()?,
            certificate,
        ))
    }
}
