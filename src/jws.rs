//! See [RFC 8555 §6.2](https://datatracker.ietf.org/doc/html/rfc8555#section-6.2).

use base64::prelude::*;
use eyre::{eyre, WrapErr as _};
use p256::ecdsa::{signature::Signer as _, Signature};
use serde::{Deserialize, Serialize};

use crate::{
    key::AccountKey,
    trans::{KeyRef, Payload},
};

/// JWS Protected Header as defined in [RFC 8555 §6.2].
///
/// > For newAccount requests, and for revokeCert requests authenticated by a certificate key,
/// there MUST be a "jwk" field. This field MUST contain the public key corresponding to the
/// private key used to sign the JWS.
/// >
/// > For all other requests, the request is signed using an existing account, and there MUST be a
/// "kid" field. This field MUST contain the account URL received by POSTing to the newAccount
/// resource.
///
/// [RFC 8555 §6.2]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.2
#[derive(Debug, Serialize, Deserialize, Default)]
pub(crate) struct JwsProtectedHeader {
    /// Algorithm. Always "ES256".
    alg: String,

    /// Anti-replay nonce, see [RFC 8555 §6.5].
    ///
    /// [RFC 8555 §6.5]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.5
    nonce: String,

    /// Target URL, see [RFC 8555 §6.4].
    ///
    /// [RFC 8555 §6.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.4
    url: String,

    /// Mutually exclusive with `kid` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    jwk: Option<Jwk>,

    /// Mutually exclusive with `jwk` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
}

impl JwsProtectedHeader {
    pub(crate) fn new(
        key_ref: KeyRef<'_>,
        key: &AccountKey,
        url: &str,
        nonce: String,
    ) -> eyre::Result<Self> {
        let (jwk, kid) = match key_ref {
            KeyRef::Jwk => (Some(Jwk::try_from(key)?), None),
            KeyRef::Kid(kid) => (None, Some(kid.to_owned())),
        };

        Ok(JwsProtectedHeader {
            alg: "ES256".to_owned(),
            url: url.to_owned(),
            nonce,
            jwk,
            kid,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub(crate) struct Jwk {
    alg: String,
    crv: String,
    kty: String,
    #[serde(rename = "use")]
    _use: String,
    x: String,
    y: String,
}

impl TryFrom<&AccountKey> for Jwk {
    type Error = eyre::Error;

    fn try_from(key: &AccountKey) -> eyre::Result<Self> {
        let point = key.signing_key().verifying_key().to_encoded_point(false);

        let x = point.x().ok_or_else(|| eyre!("public key has no x coordinate"))?;
        let y = point.y().ok_or_else(|| eyre!("public key has no y coordinate"))?;

        Ok(Jwk {
            alg: "ES256".to_owned(),
            kty: "EC".to_owned(),
            crv: "P-256".to_owned(),
            _use: "sig".to_owned(),
            x: BASE64_URL_SAFE_NO_PAD.encode(x),
            y: BASE64_URL_SAFE_NO_PAD.encode(y),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
// LEXICAL ORDER OF FIELDS MATTER!
pub(crate) struct JwkThumb {
    crv: String,
    kty: String,
    x: String,
    y: String,
}

impl From<&Jwk> for JwkThumb {
    fn from(jwk: &Jwk) -> Self {
        JwkThumb {
            crv: jwk.crv.clone(),
            kty: jwk.kty.clone(),
            x: jwk.x.clone(),
            y: jwk.y.clone(),
        }
    }
}

/// <https://datatracker.ietf.org/doc/html/rfc7515#section-7.2.2>
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FlattenedJsonJws {
    protected: String,
    payload: String,
    signature: String,
}

/// Signs `payload` for `url` and serializes the flattened JWS.
///
/// A POST-as-GET has an empty payload segment, not a base64url encoded `""`.
pub(crate) fn sign(
    protected: &JwsProtectedHeader,
    key: &AccountKey,
    payload: &Payload,
) -> eyre::Result<String> {
    let protected = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_string(protected)?);

    let payload = match payload {
        Payload::PostAsGet => String::new(),
        Payload::Json(value) => BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_string(value)?),
    };

    let to_sign = format!("{protected}.{payload}");
    let signature: Signature = key
        .signing_key()
        .try_sign(to_sign.as_bytes())
        .wrap_err("Failed to sign request")?;

    let jws = FlattenedJsonJws {
        protected,
        payload,
        signature: BASE64_URL_SAFE_NO_PAD.encode(signature.to_bytes()),
    };

    Ok(serde_json::to_string(&jws)?)
}
