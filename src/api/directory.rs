use serde::{Deserialize, Serialize};

/// Directory object for ACME client self-configuration.
///
/// See [RFC 8555 §7.1.1].
///
/// # Example JSON
///
/// ```json
/// {
///   "newNonce": "https://example.com/acme/new-nonce",
///   "newAccount": "https://example.com/acme/new-account",
///   "newOrder": "https://example.com/acme/new-order",
///   "newAuthz": "https://example.com/acme/new-authz",
///   "revokeCert": "https://example.com/acme/revoke-cert",
///   "keyChange": "https://example.com/acme/key-change",
///   "meta": {
///     "termsOfService": "https://example.com/acme/terms/2017-5-30",
///     "website": "https://www.example.com/",
///     "caaIdentities": ["example.com"],
///     "externalAccountRequired": false
///   }
/// }
/// ```
///
/// [RFC 8555 §7.1.1]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.1
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    /// URL for new nonce requests.
    pub new_nonce: String,

    /// URL for new account requests.
    pub new_account: String,

    /// URL for new order requests.
    pub new_order: String,

    /// Only present when the CA implements [pre-authorization].
    ///
    /// [pre-authorization]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.4.1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_authz: Option<String>,

    /// Not used by this library, kept for debugging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoke_cert: Option<String>,

    /// Not used by this library, kept for debugging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_change: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<DirectoryMeta>,
}

impl Directory {
    /// URL of the CA's current terms of service, if it advertises one.
    pub fn terms_of_service(&self) -> Option<&str> {
        self.meta.as_ref()?.terms_of_service.as_deref()
    }

    /// Whether new accounts need an external account binding.
    pub fn external_account_required(&self) -> bool {
        self.meta
            .as_ref()
            .is_some_and(DirectoryMeta::external_account_required)
    }
}

/// <https://datatracker.ietf.org/doc/html/rfc8555#section-9.7.6>
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryMeta {
    /// URL identifying the current terms of service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<String>,

    /// URL locating a website providing more information about the ACME server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    /// Hostnames the CA recognizes as referring to itself for CAA record validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caa_identities: Option<Vec<String>>,

    /// If true, `newAccount` requests must carry an external account binding, which this library
    /// does not produce.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_account_required: Option<bool>,
}

impl DirectoryMeta {
    pub fn external_account_required(&self) -> bool {
        self.external_account_required.unwrap_or(false)
    }
}
