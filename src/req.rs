use std::time::Duration;

use reqwest::header::{HeaderName, CONTENT_TYPE, LOCATION};

use crate::trans::{Response, TransportError};

pub(crate) const JOSE_JSON: &str = "application/jose+json";

pub(crate) fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(30))
        .build()
}

pub(crate) async fn req_get(
    client: &reqwest::Client,
    url: &str,
) -> Result<reqwest::Response, TransportError> {
    let req = client.get(url);
    log::trace!("{req:?}");
    req.send()
        .await
        .map_err(|err| TransportError::with_source(format!("GET {url} failed"), err))
}

pub(crate) async fn req_head(
    client: &reqwest::Client,
    url: &str,
) -> Result<reqwest::Response, TransportError> {
    let req = client.head(url);
    log::trace!("{req:?}");
    req.send()
        .await
        .map_err(|err| TransportError::with_source(format!("HEAD {url} failed"), err))
}

pub(crate) async fn req_post(
    client: &reqwest::Client,
    url: &str,
    body: String,
) -> Result<reqwest::Response, TransportError> {
    let req = client
        .post(url)
        .header(CONTENT_TYPE, JOSE_JSON)
        .body(body);
    log::trace!("{req:?}");
    req.send()
        .await
        .map_err(|err| TransportError::with_source(format!("POST {url} failed"), err))
}

pub(crate) fn req_expect_header(
    res: &reqwest::Response,
    name: &str,
) -> Result<String, TransportError> {
    res.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
        .ok_or_else(|| TransportError::new(format!("Missing header: {name}")))
}

/// Converts a reqwest response into the transport-neutral [`Response`].
pub(crate) async fn req_into_response(res: reqwest::Response) -> Response {
    let header = |name: HeaderName| {
        res.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned)
    };

    let status = res.status().as_u16();
    let location = header(LOCATION);
    let content_type = header(CONTENT_TYPE);
    let body = req_safe_read_body(res).await;

    Response {
        status,
        location,
        content_type,
        body,
    }
}

pub(crate) async fn req_safe_read_body(res: reqwest::Response) -> String {
    // letsencrypt sometimes closes the TLS abruptly causing io error
    // even though we did capture the body.
    res.text().await.unwrap_or_default()
}
