//! Account registration.

use crate::{
    api::{self, AccountStatus},
    client::AcmeClient,
    error::{ClientError, Result},
    trans::{KeyRef, Payload, Response, Transport},
};

const MAILTO: &str = "mailto:";

/// An account as known to the CA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    /// Account URL, which identifies the account in all later requests.
    pub url: String,

    pub status: AccountStatus,

    /// First `mailto:` contact, without the scheme.
    pub email: Option<String>,

    /// All contact URIs, as the CA reports them.
    pub contact: Vec<String>,

    /// Terms of service URL the account agreed to, if known.
    pub agreement: Option<String>,

    /// URL of the account's order list, if the CA provides one.
    pub orders: Option<String>,
}

fn contact_uri(email: &str) -> String {
    if email.starts_with(MAILTO) {
        email.to_owned()
    } else {
        format!("{MAILTO}{email}")
    }
}

impl<T: Transport> AcmeClient<T> {
    /// Registers the account key with the CA.
    ///
    /// The key itself identifies the account: calling this again with the same key returns the
    /// existing account instead of creating a second one. `email` is sent as a `mailto:` contact.
    ///
    /// Registering always agrees to the CA's terms of service. `agreement` names the terms URL to
    /// keep in the returned record. Neither value is validated locally.
    ///
    /// CAs that require an external account binding are refused with a [`ClientError`] before
    /// anything is sent.
    pub async fn register_account(
        &self,
        agreement: Option<&str>,
        email: Option<&str>,
    ) -> Result<AccountRecord> {
        if self.directory().external_account_required() {
            return Err(ClientError::new(
                "CA requires an external account binding, which is not supported",
            )
            .into());
        }

        let acc = api::Account {
            contact: email.map(|email| vec![contact_uri(email)]),
            terms_of_service_agreed: Some(true),
            ..Default::default()
        };

        let res = self
            .call(
                &self.directory().new_account,
                KeyRef::Jwk,
                Payload::json(&acc)?,
            )
            .await?;

        let record = self.account_record(&res, agreement)?;

        match res.status {
            201 => log::info!("Registered account {}", record.url),
            _ => log::debug!("Account already registered: {}", record.url),
        }

        Ok(record)
    }

    /// Finds the account of the key without creating one.
    ///
    /// Fails with [`ProblemKind::AccountDoesNotExist`] if the key was never registered.
    ///
    /// [`ProblemKind::AccountDoesNotExist`]: crate::ProblemKind::AccountDoesNotExist
    pub async fn lookup_account(&self) -> Result<AccountRecord> {
        let acc = api::Account {
            only_return_existing: Some(true),
            ..Default::default()
        };

        let res = self
            .call(
                &self.directory().new_account,
                KeyRef::Jwk,
                Payload::json(&acc)?,
            )
            .await?;

        self.account_record(&res, None)
    }

    fn account_record(&self, res: &Response, agreement: Option<&str>) -> Result<AccountRecord> {
        let url = res.expect_location()?.to_owned();
        log::debug!("Key ID is: {url}");

        let acc = res.json::<api::Account>()?;

        let status = acc
            .status
            .ok_or_else(|| ClientError::new("Account object is missing its status"))?;

        self.set_account_url(&url);

        if !acc.is_status_valid() {
            log::warn!("Account {url} is {status:?}");
        }

        let agreement = match agreement {
            Some(agreement) => Some(agreement.to_owned()),
            None if acc.terms_of_service_agreed() => {
                self.directory().terms_of_service().map(ToOwned::to_owned)
            }
            None => None,
        };

        let contact = acc.contact.unwrap_or_default();
        let email = contact
            .iter()
            .find_map(|uri| uri.strip_prefix(MAILTO))
            .map(ToOwned::to_owned);

        Ok(AccountRecord {
            url,
            status,
            email,
            contact,
            agreement,
            orders: acc.orders,
        })
    }
}
