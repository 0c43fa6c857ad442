use std::fmt;

use serde::{Deserialize, Serialize};

use crate::api;

/// The status of an [`api::Order`].
///
/// See [RFC 8555 §7.1.6].
///
/// [RFC 8555 §7.1.6]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Ready => "ready",
            OrderStatus::Processing => "processing",
            OrderStatus::Valid => "valid",
            OrderStatus::Invalid => "invalid",
        })
    }
}

/// Payload of a `newOrder` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub identifiers: Vec<api::Identifier>,
}

impl NewOrder {
    pub(crate) fn dns(domain: &str) -> Self {
        NewOrder {
            identifiers: vec![api::Identifier::dns(domain)],
        }
    }
}

/// An ACME order object.
///
/// Represents a client's request for a certificate and is used to track the progress of that order
/// through to issuance.
///
/// See [RFC 8555 §7.1.3].
///
/// # Example JSON
///
/// ```json
/// {
///   "status": "pending",
///   "expires": "2019-01-09T08:26:43.570360537Z",
///   "identifiers": [
///     {
///       "type": "dns",
///       "value": "acmetest.algesten.se"
///     }
///   ],
///   "authorizations": [
///     "https://example.com/acme/authz/YTqpYUthlVfwBncUufE8IRA2TkzZkN4eYWWLMSRqcSs"
///   ],
///   "finalize": "https://example.com/acme/finalize/7738992/18234324"
/// }
/// ```
///
/// [RFC 8555 §7.1.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.3
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub status: OrderStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    pub identifiers: Vec<api::Identifier>,

    /// Uses RFC 3339 format.
    pub not_before: Option<String>,

    /// Uses RFC 3339 format.
    pub not_after: Option<String>,

    /// Why the order became invalid.
    pub error: Option<api::Problem>,

    #[serde(default)]
    pub authorizations: Vec<String>,

    pub finalize: String,

    /// Present once the order is valid.
    pub certificate: Option<String>,
}
