use base64::prelude::*;
use eyre::WrapErr as _;
use pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _};
use sha2::{Digest as _, Sha256};
use zeroize::Zeroizing;

use crate::jws::{Jwk, JwkThumb};

/// Account key pair used to sign requests to the ACME API.
///
/// This library uses elliptic curve P-256 for accounts. Requests signed with it are small and the
/// public key can be derived from the private key.
///
/// The key is read-only once created and cheap to clone, so many clients may share it.
#[derive(Clone, Debug)]
pub struct AccountKey {
    signing_key: p256::ecdsa::SigningKey,
}

impl AccountKey {
    /// Generates a fresh key.
    pub fn generate() -> AccountKey {
        Self::from_signing_key(crate::create_p256_key())
    }

    /// Reads a PKCS#8 PEM encoded P-256 private key.
    pub fn from_pem(pem: &str) -> eyre::Result<AccountKey> {
        let signing_key = ecdsa::SigningKey::<p256::NistP256>::from_pkcs8_pem(pem)
            .wrap_err("Failed to read account key PEM")?;
        Ok(Self::from_signing_key(signing_key))
    }

    pub fn from_signing_key(signing_key: p256::ecdsa::SigningKey) -> AccountKey {
        AccountKey { signing_key }
    }

    /// Private key as PKCS#8 PEM. Store it to keep using the same account.
    pub fn to_pem(&self) -> eyre::Result<Zeroizing<String>> {
        self.signing_key
            .to_pkcs8_pem(pem::LineEnding::LF)
            .wrap_err("Failed to encode account key PEM")
    }

    pub(crate) fn signing_key(&self) -> &p256::ecdsa::SigningKey {
        &self.signing_key
    }

    /// JWK thumbprint of the public key, base64url encoded.
    ///
    /// See [RFC 7638].
    ///
    /// [RFC 7638]: https://datatracker.ietf.org/doc/html/rfc7638
    pub fn thumbprint(&self) -> eyre::Result<String> {
        let jwk = Jwk::try_from(self)?;
        let jwk_json = serde_json::to_string(&JwkThumb::from(&jwk))?;
        Ok(BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(jwk_json)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pem_round_trip_keeps_thumbprint() {
        let key = AccountKey::generate();
        let pem = key.to_pem().unwrap();
        let loaded = AccountKey::from_pem(&pem).unwrap();

        assert_eq!(key.thumbprint().unwrap(), loaded.thumbprint().unwrap());
    }

    #[test]
    fn test_thumbprint_is_base64url_sha256() {
        let thumb = AccountKey::generate().thumbprint().unwrap();
        // 32 bytes without padding
        assert_eq!(thumb.len(), 43);
        assert!(!thumb.contains(|c| matches!(c, '+' | '/' | '=')));
    }

    #[test]
    fn test_from_pem_rejects_garbage() {
        assert!(AccountKey::from_pem("not a key").is_err());
    }
}
