use std::path::PathBuf;

use acme::{
    create_p256_key, AccountKey, AcmeClient, BoxError, CertificateRequest, Challenge,
    ChallengeType, ClientConfig, DirectoryUrl, HttpTransport, Provisioner, Registration,
};
use actix_files::Files;
use actix_web::{App, HttpServer};
use async_trait::async_trait;
use tokio::fs;

const PRIMARY_NAME: &str = "example.org";
const CHALLENGE_DIR: &str = "./acme-challenge";

/// Writes `http-01` key authorizations where the local web server serves them from.
struct ChallengeDir {
    root: PathBuf,
}

#[async_trait]
impl Provisioner for ChallengeDir {
    async fn provision(&self, challenge: &Challenge) -> Result<(), BoxError> {
        // The token is the file name, the payload its contents:
        //
        // http://example.org/.well-known/acme-challenge/<token>
        let path = self.root.join(challenge.token());
        log::info!("writing challenge proof to {}", path.display());

        fs::write(path, challenge.payload()).await?;
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    fs::create_dir_all(CHALLENGE_DIR).await?;

    // Create temporary Actix Web server for ACME challenge.
    let srv = HttpServer::new(|| {
        App::new().service(
            Files::new("/.well-known/acme-challenge", CHALLENGE_DIR).show_files_listing(),
        )
    })
    .bind(("0.0.0.0", 80))?
    .shutdown_timeout(0)
    .run();

    let srv_handle = srv.handle();
    let srv_task = actix_web::rt::spawn(srv);

    // Use `DirectoryUrl::LetsEncrypt` for production uses.
    let directory = DirectoryUrl::LetsEncryptStaging.fetch().await?;

    // You should persist the account key (see `AccountKey::to_pem`) to keep using the same
    // account.
    let transport = HttpTransport::new(AccountKey::generate(), &directory)?;

    // Only the web server above can answer challenges.
    let config = ClientConfig::default().with_challenge_types(vec![ChallengeType::Http01]);
    let client = AcmeClient::with_config(transport, directory, config);

    let registration = Registration {
        agreement: client.directory().terms_of_service().map(ToOwned::to_owned),
        email: Some("foo@bar.com".to_owned()),
    };

    // Create a private key for the certificate. You can provide your own key pair instead.
    let csr = CertificateRequest::new(create_p256_key(), &[PRIMARY_NAME])?;

    let provisioner = ChallengeDir {
        root: PathBuf::from(CHALLENGE_DIR),
    };

    let cert = client
        .obtain_certificate(PRIMARY_NAME, &registration, &provisioner, &csr, None)
        .await?;

    log::info!("certificate valid for {} days", cert.valid_days_left()?);
    println!("{}", cert.certificate());

    // Stop temporary server for ACME challenge
    srv_handle.stop(true).await;
    srv_task.await??;

    fs::remove_dir_all(CHALLENGE_DIR).await?;

    Ok(())
}
