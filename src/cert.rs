use std::io::{BufReader, Cursor};

use der::{
    asn1::Ia5String,
    time::{OffsetDateTime, PrimitiveDateTime},
    Decode as _, Encode as _,
};
use eyre::{eyre, WrapErr as _};
use pkcs8::{DecodePrivateKey as _, DecodePublicKey as _, EncodePrivateKey as _};
use x509_cert::{
    builder::{Builder, RequestBuilder as CsrBuilder},
    ext::pkix::{name::GeneralName, SubjectAltName},
    name::Name,
    request::CertReq,
};
use zeroize::Zeroizing;

/// Make a P-256 private key (from which we can derive a public key).
pub fn create_p256_key() -> p256::ecdsa::SigningKey {
    let csprng = &mut rand::thread_rng();
    ecdsa::SigningKey::from(p256::SecretKey::random(csprng))
}

/// Creates a CSR with `domains` and signs it with `signer`.
///
/// The first item of `domains` is picked for the CSR's Common Name (CN). All domains are added to a
/// Subject Alternative Name (SAN) extension.
pub(crate) fn create_csr(
    signer: &p256::ecdsa::SigningKey,
    domains: &[&str],
) -> eyre::Result<CertReq> {
    let primary_domain = domains
        .first()
        .ok_or_else(|| eyre!("at least one domain is required"))?;

    let subject = format!("CN={primary_domain}")
        .parse::<Name>()
        .wrap_err("build csr subject")?;

    let mut csr = CsrBuilder::new(subject, signer).wrap_err("start csr")?;

    let names = domains
        .iter()
        .map(|domain| Ia5String::new(domain).map(GeneralName::DnsName))
        .collect::<Result<Vec<_>, _>>()
        .wrap_err("encode domain names")?;

    csr.add_extension(&SubjectAltName(names))
        .wrap_err("add subject alt names")?;

    csr.build::<p256::ecdsa::DerSignature>()
        .wrap_err("build csr")
}

/// Input of a certificate order: the domain's key pair and a CSR signed with it.
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    signing_key: p256::ecdsa::SigningKey,
    csr_der: Vec<u8>,
}

impl CertificateRequest {
    /// Builds a CSR for `domains`, the first of which becomes the Common Name.
    pub fn new(signing_key: p256::ecdsa::SigningKey, domains: &[&str]) -> eyre::Result<Self> {
        let csr = create_csr(&signing_key, domains)?;
        let csr_der = csr.to_der().wrap_err("encode csr")?;

        Ok(CertificateRequest {
            signing_key,
            csr_der,
        })
    }

    /// Wraps an existing DER encoded CSR, which must have been signed with `signing_key`.
    pub fn from_der(signing_key: p256::ecdsa::SigningKey, csr_der: Vec<u8>) -> eyre::Result<Self> {
        let csr = CertReq::from_der(&csr_der).wrap_err("parse csr")?;

        let spki_der = csr.info.public_key.to_der().wrap_err("encode csr public key")?;
        let csr_key = p256::ecdsa::VerifyingKey::from_public_key_der(&spki_der)
            .map_err(|err| eyre!("csr public key is not a P-256 key: {err}"))?;

        if &csr_key != signing_key.verifying_key() {
            return Err(eyre!("csr was not made for the given private key"));
        }

        Ok(CertificateRequest {
            signing_key,
            csr_der,
        })
    }

    /// Reads a PKCS#8 PEM private key and a PEM encoded CSR.
    pub fn from_pem(private_key_pem: &str, csr_pem: &str) -> eyre::Result<Self> {
        let signing_key = ecdsa::SigningKey::<p256::NistP256>::from_pkcs8_pem(private_key_pem)
            .wrap_err("parse domain key")?;

        let (label, csr_der) = pem::decode_vec(csr_pem.as_bytes())
            .map_err(|err| eyre!("decode csr pem: {err}"))?;

        if label != "CERTIFICATE REQUEST" {
            return Err(eyre!("unexpected pem label {label:?}"));
        }

        Self::from_der(signing_key, csr_der)
    }

    /// DER encoding of the CSR.
    pub fn csr_der(&self) -> &[u8] {
        &self.csr_der
    }

    /// The domain's private key in PEM format.
    pub fn private_key_pem(&self) -> eyre::Result<Zeroizing<String>> {
        self.signing_key
            .to_pkcs8_pem(pem::LineEnding::LF)
            .wrap_err("encode domain key")
    }
}

/// Issued certificate chain and the private key it was requested with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateResponse {
    domain: String,
    private_key_pem: Zeroizing<String>,
    certificate: String,
}

impl CertificateResponse {
    pub(crate) fn new(domain: &str, private_key_pem: Zeroizing<String>, certificate: String) -> Self {
        CertificateResponse {
            domain: domain.to_owned(),
            private_key_pem,
            certificate,
        }
    }

    /// Loads a stored certificate and key, checking both parse.
    pub fn parse(
        domain: &str,
        private_key_pem: Zeroizing<String>,
        certificate: String,
    ) -> eyre::Result<Self> {
        // validate certificate
        let chain = pem_chain(&certificate)?;
        let leaf = chain
            .first()
            .ok_or_else(|| eyre!("no certificates in chain"))?;
        x509_cert::Certificate::from_der(leaf).wrap_err("parse certificate")?;

        // validate private key
        ecdsa::SigningKey::<p256::NistP256>::from_pkcs8_pem(&private_key_pem)
            .wrap_err("parse private key")?;

        Ok(Self::new(domain, private_key_pem, certificate))
    }

    /// Domain the certificate was ordered for.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The private key in PEM format.
    pub fn private_key(&self) -> &str {
        &self.private_key_pem
    }

    /// The private key in DER encoding.
    pub fn private_key_der(&self) -> eyre::Result<Vec<u8>> {
        let private_key =
            ecdsa::SigningKey::<p256::NistP256>::from_pkcs8_pem(&self.private_key_pem)?;
        let der = private_key.to_pkcs8_der()?;
        Ok(der.as_bytes().to_vec())
    }

    /// The issued certificate chain in PEM format, leaf first.
    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    /// The issued certificate chain in DER format.
    pub fn certificate_chain(&self) -> eyre::Result<Vec<Vec<u8>>> {
        pem_chain(&self.certificate)
    }

    /// Inspect the certificate to count the number of (whole) valid days left.
    ///
    /// It's up to the ACME API provider to decide how long an issued certificate is valid.
    /// Let's Encrypt sets the validity to 90 days. This function reports 89 days for newly
    /// issued cert, since it counts _whole_ days.
    ///
    /// It is possible to get negative days for an expired certificate.
    pub fn valid_days_left(&self) -> eyre::Result<i64> {
        let cert_chain = self.certificate_chain()?;
        let cert_ee = cert_chain
            .first() // EE cert is first
            .ok_or_else(|| eyre!("no certificates in chain"))?;

        let cert = x509_cert::Certificate::from_der(cert_ee)?;

        let not_after = cert.tbs_certificate.validity.not_after.to_date_time();
        // X.509 validity times are always UTC
        let not_after = PrimitiveDateTime::try_from(not_after)
            .map_err(|err| eyre!("convert not-after time: {err}"))?
            .assume_utc();

        let diff = not_after - OffsetDateTime::now_utc();

        Ok(diff.whole_days())
    }
}

/// DER blocks of all `CERTIFICATE` sections in `chain`.
pub(crate) fn pem_chain(chain: &str) -> eyre::Result<Vec<Vec<u8>>> {
    let mut rdr = BufReader::new(Cursor::new(chain));

    rustls_pemfile::certs(&mut rdr)
        .map(|res| res.map(|cert| cert.to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .wrap_err("read certificate chain")
}
