//! JSON API payloads.
//!
//! Not intended to be used directly. Provided to aid debugging and custom [`Transport`]s.
//!
//! [`Transport`]: crate::Transport

use std::fmt;

use serde::{
    ser::{SerializeMap as _, Serializer},
    Deserialize, Serialize,
};

mod account;
mod authorization;
mod challenge;
mod directory;
mod finalize;
mod identifier;
mod order;

pub use self::{
    account::{Account, AccountStatus},
    authorization::{Authorization, AuthorizationStatus},
    challenge::{Challenge, ChallengeStatus},
    directory::{Directory, DirectoryMeta},
    finalize::Finalize,
    identifier::Identifier,
    order::{NewOrder, Order, OrderStatus},
};

/// Serializes to `{}`.
pub struct EmptyObject;

impl Serialize for EmptyObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_map(Some(0))?.end()
    }
}

fn about_blank() -> String {
    crate::error::ABOUT_BLANK.to_owned()
}

/// Problem document.
///
/// See [RFC 7807] and [RFC 8555 §6.7].
///
/// [RFC 7807]: https://datatracker.ietf.org/doc/html/rfc7807
/// [RFC 8555 §6.7]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.7
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type", default = "about_blank")]
    pub _type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subproblems: Option<Vec<Subproblem>>,
}

impl Default for Problem {
    fn default() -> Self {
        Problem {
            _type: about_blank(),
            detail: None,
            status: None,
            subproblems: None,
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self._type),
            _ => write!(f, "{}", self._type),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subproblem {
    #[serde(rename = "type", default = "about_blank")]
    pub _type: String,
    pub detail: Option<String>,
    pub identifier: Option<identifier::Identifier>,
}
