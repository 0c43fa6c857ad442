#![allow(clippy::trivial_regex)]

use std::{
    collections::{HashMap, VecDeque},
    convert::Infallible,
    future::ready,
    net::TcpListener,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, OnceLock,
    },
    time::Duration,
};

use actix_http::{HttpService, Method, Request, Response as HttpResponse, StatusCode};
use actix_server::{Server, ServerHandle};
use actix_web::body::MessageBody;
use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{json, Value};

use crate::{
    api,
    trans::{KeyRef, Payload, Response, Transport, TransportError},
    AcmeClient, ClientConfig,
};

pub(crate) const THUMBPRINT: &str = "thumb";

pub(crate) const NEW_NONCE_URL: &str = "https://ca.test/acme/new-nonce";
pub(crate) const NEW_ACCOUNT_URL: &str = "https://ca.test/acme/new-acct";
pub(crate) const NEW_ORDER_URL: &str = "https://ca.test/acme/new-order";
pub(crate) const TERMS_URL: &str = "https://ca.test/terms-of-service.pdf";
pub(crate) const ACCOUNT_URL: &str = "https://ca.test/acme/acct/1";
pub(crate) const ORDER_URL: &str = "https://ca.test/acme/order/1";
pub(crate) const AUTHZ_URL: &str = "https://ca.test/acme/authz/1";
pub(crate) const HTTP_CHALLENGE_URL: &str = "https://ca.test/acme/chall/http-1";
pub(crate) const TLS_ALPN_CHALLENGE_URL: &str = "https://ca.test/acme/chall/tls-1";
pub(crate) const DNS_CHALLENGE_URL: &str = "https://ca.test/acme/chall/dns-1";
pub(crate) const FINALIZE_URL: &str = "https://ca.test/acme/finalize/1";
pub(crate) const CERT_URL: &str = "https://ca.test/acme/cert/1";

pub(crate) const HTTP_TOKEN: &str = "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w";
pub(crate) const TLS_ALPN_TOKEN: &str = "WCdRWkCy4THTD_j5IH4ISAzr59lFIg5wzYmKxuOJ1lU";
pub(crate) const DNS_TOKEN: &str = "RRo2ZcXAEqxKvMH8RGcATjSK1KknLEUmauwfQ5i3gG8";

/// Single PEM block whose DER content is the bytes `CERT HERE`.
pub(crate) const CERT_PEM: &str =
    "-----BEGIN CERTIFICATE-----\nQ0VSVCBIRVJF\n-----END CERTIFICATE-----\n";

/// Canned answer of a [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Respond(Response),
    Fail(String),

    /// Hangs for the given time, then fails.
    Stall(Duration),
}

impl Reply {
    pub(crate) fn json(status: u16, body: Value) -> Self {
        Reply::Respond(Response {
            status,
            location: None,
            content_type: Some("application/json".to_owned()),
            body: body.to_string(),
        })
    }

    pub(crate) fn json_at(status: u16, location: &str, body: Value) -> Self {
        Reply::Respond(Response {
            status,
            location: Some(location.to_owned()),
            content_type: Some("application/json".to_owned()),
            body: body.to_string(),
        })
    }

    pub(crate) fn problem(status: u16, problem_type: &str, detail: &str) -> Self {
        Reply::Respond(Response {
            status,
            location: None,
            content_type: Some("application/problem+json".to_owned()),
            body: json!({ "type": problem_type, "detail": detail, "status": status })
                .to_string(),
        })
    }

    pub(crate) fn pem(body: &str) -> Self {
        Reply::Respond(Response {
            status: 200,
            location: None,
            content_type: Some("application/pem-certificate-chain".to_owned()),
            body: body.to_owned(),
        })
    }

    pub(crate) fn fail(message: &str) -> Self {
        Reply::Fail(message.to_owned())
    }

    pub(crate) fn stall(secs: u64) -> Self {
        Reply::Stall(Duration::from_secs(secs))
    }
}

/// A request seen by a [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Call {
    pub(crate) url: String,

    /// `None` for requests signed with the embedded JWK.
    pub(crate) kid: Option<String>,

    pub(crate) payload: Payload,
}

/// In-memory CA answering from per-URL reply queues.
///
/// Replies for a URL are handed out in order; the last one repeats forever.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queues `reply` for requests to `url`.
    pub(crate) fn on(&self, url: &str, reply: Reply) {
        self.routes
            .lock()
            .entry(url.to_owned())
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub(crate) fn calls_to(&self, url: &str) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.url == url)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn thumbprint(&self) -> &str {
        THUMBPRINT
    }

    async fn signed_request(
        &self,
        url: &str,
        key: KeyRef<'_>,
        payload: Payload,
    ) -> Result<Response, TransportError> {
        self.calls.lock().push(Call {
            url: url.to_owned(),
            kid: match key {
                KeyRef::Jwk => None,
                KeyRef::Kid(kid) => Some(kid.to_owned()),
            },
            payload,
        });

        let reply = {
            let mut routes = self.routes.lock();
            match routes.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Respond(res)) => Ok(res),
            Some(Reply::Fail(message)) => Err(TransportError::new(message)),
            Some(Reply::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                Err(TransportError::new(format!("{url} stalled for {delay:?}")))
            }
            None => Err(TransportError::new(format!("no route for {url}"))),
        }
    }
}

pub(crate) fn directory() -> api::Directory {
    api::Directory {
        new_nonce: NEW_NONCE_URL.to_owned(),
        new_account: NEW_ACCOUNT_URL.to_owned(),
        new_order: NEW_ORDER_URL.to_owned(),
        meta: Some(api::DirectoryMeta {
            terms_of_service: Some(TERMS_URL.to_owned()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn client(transport: ScriptedTransport) -> AcmeClient<ScriptedTransport> {
    client_with_config(transport, ClientConfig::default())
}

pub(crate) fn client_with_config(
    transport: ScriptedTransport,
    config: ClientConfig,
) -> AcmeClient<ScriptedTransport> {
    let config = config.with_poll_interval(Duration::from_secs(1));
    AcmeClient::with_config(transport, directory(), config)
}

/// Makes the key resolve to an existing, valid account.
pub(crate) fn script_account(transport: &ScriptedTransport) {
    transport.on(
        NEW_ACCOUNT_URL,
        Reply::json_at(
            200,
            ACCOUNT_URL,
            json!({ "status": "valid", "contact": ["mailto:admin@example.org"] }),
        ),
    );
}

pub(crate) fn order_json(domain: &str, status: &str) -> Value {
    let mut order = json!({
        "status": status,
        "expires": "2019-01-09T08:26:43.570360537Z",
        "identifiers": [{ "type": "dns", "value": domain }],
        "authorizations": [AUTHZ_URL],
        "finalize": FINALIZE_URL,
    });

    if status == "valid" {
        order["certificate"] = json!(CERT_URL);
    }

    order
}

/// Makes `newOrder` answer with an order for `domain` in `status`.
pub(crate) fn script_order(transport: &ScriptedTransport, domain: &str, status: &str) {
    transport.on(
        NEW_ORDER_URL,
        Reply::json_at(201, ORDER_URL, order_json(domain, status)),
    );
}

/// Makes the order's authorization offer `http-01`, `tls-alpn-01` and `dns-01`.
pub(crate) fn script_authorization(transport: &ScriptedTransport, domain: &str, status: &str) {
    transport.on(
        AUTHZ_URL,
        Reply::json(
            200,
            json!({
                "identifier": { "type": "dns", "value": domain },
                "status": status,
                "expires": "2019-01-09T08:26:43Z",
                "challenges": [
                    {
                        "type": "http-01",
                        "status": "pending",
                        "url": HTTP_CHALLENGE_URL,
                        "token": HTTP_TOKEN,
                    },
                    {
                        "type": "tls-alpn-01",
                        "status": "pending",
                        "url": TLS_ALPN_CHALLENGE_URL,
                        "token": TLS_ALPN_TOKEN,
                    },
                    {
                        "type": "dns-01",
                        "status": "pending",
                        "url": DNS_CHALLENGE_URL,
                        "token": DNS_TOKEN,
                    },
                ],
            }),
        ),
    );
}

static RE_URL: OnceLock<Regex> = OnceLock::new();

fn re_url() -> &'static Regex {
    RE_URL.get_or_init(|| Regex::new("<URL>").unwrap())
}

/// Local HTTP CA for exercising [`HttpTransport`](crate::HttpTransport).
pub struct TestServer {
    pub dir_url: String,

    /// Number of requests answered with `badNonce`.
    pub bad_nonce_hits: Arc<AtomicUsize>,

    handle: ServerHandle,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        drop(self.handle.stop(false));
    }
}

fn get_directory(url: &str) -> HttpResponse<impl MessageBody> {
    const BODY: &str = r#"{
    "keyChange": "<URL>/acme/key-change",
    "newAccount": "<URL>/acme/new-acct",
    "newNonce": "<URL>/acme/new-nonce",
    "newOrder": "<URL>/acme/new-order",
    "revokeCert": "<URL>/acme/revoke-cert",
    "meta": {
        "termsOfService": "https://ca.test/terms-of-service.pdf",
        "caaIdentities": [
        "testdir.org"
        ]
    }
    }"#;

    HttpResponse::with_body(StatusCode::OK, re_url().replace_all(BODY, url).into_owned())
}

fn head_new_nonce() -> HttpResponse<impl MessageBody> {
    HttpResponse::build(StatusCode::NO_CONTENT)
        .insert_header((
            "Replay-Nonce",
            "8_uBBV3N2DBRJczhoiB46ugJKUkUHxGzVe6xIMpjHFM",
        ))
        .finish()
}

fn post_new_acct(url: &str) -> HttpResponse<impl MessageBody> {
    const BODY: &str = r#"{
    "key": {
        "kty": "EC",
        "crv": "P-256",
        "x": "ttpobTRK2bw7ttGBESRO7Nb23mbIRfnRZwunL1W6wRI",
        "y": "h2Z00J37_2qRKH0-flrHEsH0xbit915Tyvd2v_CAOSk"
    },
    "contact": [
        "mailto:foo@bar.com"
    ],
    "termsOfServiceAgreed": true,
    "createdAt": "2018-12-31T17:15:40.399104457Z",
    "status": "valid"
    }"#;

    let location = re_url().replace_all("<URL>/acme/acct/1", url).into_owned();

    HttpResponse::build(StatusCode::CREATED)
        .insert_header(("Location", location))
        .insert_header((
            "Replay-Nonce",
            "kT0TvM3Yr3dCtG3b2nqSrnV5HnVThvxWZv4lLGrHbqg",
        ))
        .body(BODY)
}

fn post_new_order(url: &str) -> HttpResponse<impl MessageBody> {
    const BODY: &str = r#"{
    "status": "pending",
    "expires": "2019-01-09T08:26:43.570360537Z",
    "identifiers": [
        {
        "type": "dns",
        "value": "acme-test.example.com"
        }
    ],
    "authorizations": [
        "<URL>/acme/authz/1"
    ],
    "finalize": "<URL>/acme/finalize/1"
    }"#;

    let location = re_url().replace_all("<URL>/acme/order/1", url).into_owned();

    HttpResponse::build(StatusCode::CREATED)
        .insert_header(("Location", location))
        .body(re_url().replace_all(BODY, url).into_owned())
}

fn post_get_order(url: &str, status: &str) -> HttpResponse<impl MessageBody> {
    const BODY: &str = r#"{
    "status": "<STATUS>",
    "expires": "2019-01-09T08:26:43.570360537Z",
    "identifiers": [
        {
        "type": "dns",
        "value": "acme-test.example.com"
        }
    ],
    "authorizations": [
        "<URL>/acme/authz/1"
    ],
    "finalize": "<URL>/acme/finalize/1",
    "certificate": "<URL>/acme/cert/1"
    }"#;

    let body = re_url()
        .replace_all(BODY, url)
        .replace("<STATUS>", status);

    HttpResponse::build(StatusCode::OK).body(body)
}

fn post_authz(url: &str) -> HttpResponse<impl MessageBody> {
    const BODY: &str = r#"{
        "identifier": {
            "type": "dns",
            "value": "acme-test.example.com"
        },
        "status": "pending",
        "expires": "2019-01-09T08:26:43Z",
        "challenges": [
        {
            "type": "http-01",
            "status": "pending",
            "url": "<URL>/acme/chall/http-1",
            "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
        },
        {
            "type": "dns-01",
            "status": "pending",
            "url": "<URL>/acme/chall/dns-1",
            "token": "RRo2ZcXAEqxKvMH8RGcATjSK1KknLEUmauwfQ5i3gG8"
        }
        ]
    }"#;

    HttpResponse::build(StatusCode::OK).body(re_url().replace_all(BODY, url).into_owned())
}

fn post_challenge(url: &str) -> HttpResponse<impl MessageBody> {
    const BODY: &str = r#"{
        "type": "http-01",
        "status": "valid",
        "url": "<URL>/acme/chall/http-1",
        "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w",
        "validated": "2019-01-02T08:26:43Z"
    }"#;

    HttpResponse::build(StatusCode::OK).body(re_url().replace_all(BODY, url).into_owned())
}

fn post_certificate() -> HttpResponse<impl MessageBody> {
    HttpResponse::build(StatusCode::OK)
        .insert_header(("Content-Type", "application/pem-certificate-chain"))
        .body(CERT_PEM)
}

fn post_bad_nonce(hits: &AtomicUsize) -> HttpResponse<impl MessageBody> {
    hits.fetch_add(1, Ordering::SeqCst);

    HttpResponse::build(StatusCode::BAD_REQUEST)
        .insert_header(("Content-Type", "application/problem+json"))
        .body(r#"{"type":"urn:ietf:params:acme:error:badNonce","detail":"JWS has an invalid anti-replay nonce"}"#)
}

fn route_request(req: Request, url: &str, bad_nonce_hits: &AtomicUsize) -> HttpResponse<impl MessageBody> {
    match (req.method(), req.path()) {
        (&Method::GET, "/directory") => get_directory(url).map_into_boxed_body(),
        (&Method::HEAD, "/acme/new-nonce") => head_new_nonce().map_into_boxed_body(),
        (&Method::POST, "/acme/new-acct") => post_new_acct(url).map_into_boxed_body(),
        (&Method::POST, "/acme/new-order") => post_new_order(url).map_into_boxed_body(),
        (&Method::POST, "/acme/order/1") => post_get_order(url, "valid").map_into_boxed_body(),
        (&Method::POST, "/acme/authz/1") => post_authz(url).map_into_boxed_body(),

        (&Method::POST, "/acme/chall/http-1" | "/acme/chall/dns-1") => {
            post_challenge(url).map_into_boxed_body()
        }

        (&Method::POST, "/acme/finalize/1") => {
            post_get_order(url, "processing").map_into_boxed_body()
        }

        (&Method::POST, "/acme/cert/1") => post_certificate().map_into_boxed_body(),

        (&Method::POST, "/acme/bad-nonce") => {
            post_bad_nonce(bad_nonce_hits).map_into_boxed_body()
        }

        (_, _) => HttpResponse::build(StatusCode::NOT_FOUND)
            .finish()
            .map_into_boxed_body(),
    }
}

pub fn with_directory_server() -> TestServer {
    let lst = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = lst.local_addr().unwrap().port();

    let url = format!("http://127.0.0.1:{port}");
    let dir_url = format!("{url}/directory");
    let bad_nonce_hits = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&bad_nonce_hits);

    let server = Server::build()
        .listen("acme", lst, move || {
            let url = url.clone();
            let hits = Arc::clone(&hits);

            HttpService::build()
                .finish(move |req| {
                    ready(Ok::<_, Infallible>(route_request(req, &url, &hits)))
                })
                .tcp()
        })
        .unwrap()
        .workers(1)
        .run();

    let handle = server.handle();

    tokio::spawn(server);

    TestServer {
        dir_url,
        bad_nonce_hits,
        handle,
    }
}

#[tokio::test]
pub async fn test_make_directory() {
    let server = with_directory_server();
    let res = reqwest::get(&server.dir_url).await.unwrap();
    assert!(res.status().is_success());
}

#[tokio::test]
async fn test_scripted_transport_repeats_last_reply() {
    let transport = ScriptedTransport::new();
    transport.on(ORDER_URL, Reply::json(200, json!({ "n": 1 })));
    transport.on(ORDER_URL, Reply::json(200, json!({ "n": 2 })));

    let mut seen = Vec::new();
    for _ in 0..3 {
        let res = transport
            .signed_request(ORDER_URL, KeyRef::Kid(ACCOUNT_URL), Payload::PostAsGet)
            .await
            .unwrap();
        seen.push(res.json::<Value>().unwrap()["n"].clone());
    }

    assert_eq!(seen, [json!(1), json!(2), json!(2)]);
    assert_eq!(transport.calls().len(), 3);
    assert!(transport
        .signed_request(CERT_URL, KeyRef::Jwk, Payload::PostAsGet)
        .await
        .is_err());
}
