use crate::{
    api,
    classify::classify,
    error::{ClientError, Result},
    req::{http_client, req_get, req_into_response},
};

const LETSENCRYPT_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";
const LETSENCRYPT_STAGING_URL: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Enumeration of known ACME API directories.
#[derive(Debug, Clone)]
pub enum DirectoryUrl<'a> {
    /// The main Let's Encrypt directory.
    ///
    /// Not appropriate for testing / development.
    LetsEncrypt,

    /// The staging Let's Encrypt directory.
    ///
    /// Use for testing and development. Doesn't issue "valid" certificates. The root signing
    /// certificate is not supposed to be in any trust chains.
    LetsEncryptStaging,

    /// Provide an arbitrary directory URL to connect to.
    Other(&'a str),
}

impl DirectoryUrl<'_> {
    pub fn to_url(&self) -> &str {
        match self {
            DirectoryUrl::LetsEncrypt => LETSENCRYPT_URL,
            DirectoryUrl::LetsEncryptStaging => LETSENCRYPT_STAGING_URL,
            DirectoryUrl::Other(url) => url,
        }
    }

    /// Downloads the directory object, the only unauthenticated call of the protocol.
    pub async fn fetch(&self) -> Result<api::Directory> {
        let client = http_client()
            .map_err(|err| ClientError::with_source("Failed to build HTTP client", err))?;

        let url = self.to_url();
        log::debug!("Fetch directory: {url}");

        let outcome = match req_get(&client, url).await {
            Ok(res) => Ok(req_into_response(res).await),
            Err(err) => Err(err),
        };

        let directory = classify(outcome)?.json::<api::Directory>()?;
        Ok(directory)
    }
}
