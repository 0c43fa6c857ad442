use std::io;

use acme::{AccountKey, AcmeClient, DirectoryUrl, ProblemKind};
use tokio::fs;

const ACCOUNTS_DIR: &str = "./acme-accounts";

const CONTACT_EMAIL: Option<&str> = None;

#[actix_web::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("ensuring accounts dir exists");
    fs::create_dir_all(ACCOUNTS_DIR).await?;

    let key_path = format!("{ACCOUNTS_DIR}/account.pem");

    log::info!("loading signing key from disk");
    let (key, is_new) = match fs::read_to_string(&key_path).await {
        Ok(signing_key_pem) => (AccountKey::from_pem(&signing_key_pem)?, false),

        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            log::info!("generating signing key");
            let key = AccountKey::generate();

            log::info!("persisting account key to {key_path}");
            fs::write(&key_path, key.to_pem()?.as_bytes()).await?;

            (key, true)
        }

        Err(err) => return Err(err.into()),
    };

    log::info!("fetching LetsEncrypt directory");
    let client = AcmeClient::connect(DirectoryUrl::LetsEncryptStaging, key).await?;

    let record = if is_new {
        log::info!("registering with ACME provider");
        let agreement = client.directory().terms_of_service();
        client.register_account(agreement, CONTACT_EMAIL).await?
    } else {
        log::info!("looking up existing account");
        match client.lookup_account().await {
            Ok(record) => record,

            // key was stored but registration never went through
            Err(err) if err.problem_kind() == Some(&ProblemKind::AccountDoesNotExist) => {
                let agreement = client.directory().terms_of_service();
                client.register_account(agreement, CONTACT_EMAIL).await?
            }

            Err(err) => return Err(err.into()),
        }
    };

    dbg!(&record);

    Ok(())
}
