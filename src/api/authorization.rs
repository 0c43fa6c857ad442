use serde::{Deserialize, Serialize};

use crate::api;

/// The status of an [`Authorization`].
///
/// See [RFC 8555 §7.1.6].
///
/// [RFC 8555 §7.1.6]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,
}

/// An ACME authorization object.
///
/// Represents a server's authorization for an account to represent an identifier.
///
/// See [RFC 8555 §7.1.4].
///
/// # Example JSON
///
/// ```json
/// {
///   "identifier": { "type": "dns", "value": "example.org" },
///   "status": "pending",
///   "expires": "2019-01-09T08:26:43Z",
///   "challenges": [
///     {
///       "type": "http-01",
///       "status": "pending",
///       "url": "https://example.com/acme/chall/prV_B7yEyA4",
///       "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
///     },
///     {
///       "type": "dns-01",
///       "status": "pending",
///       "url": "https://example.com/acme/chall/Rg5dV14Gh1Q",
///       "token": "RRo2ZcXAEqxKvMH8RGcATjSK1KknLEUmauwfQ5i3gG8"
///     }
///   ]
/// }
/// ```
///
/// [RFC 8555 §7.1.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.4
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub identifier: api::Identifier,

    pub status: AuthorizationStatus,

    /// Uses RFC 3339 format. Required for valid authorizations.
    pub expires: Option<String>,

    /// For pending authorizations, the challenges the client can fulfill. For valid or invalid
    /// ones, the challenge that was attempted.
    pub challenges: Vec<api::Challenge>,

    /// Present and true for authorizations created for a wildcard domain name.
    pub wildcard: Option<bool>,
}
