//! Re-align stored IBANs with the account each institution designates through the
//! partner API gateway.

use crate::table_store;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] table_store::Error),
    #[error("Could not reach the designation service for institution '{fiscal_code}'")]
    Unreachable {
        fiscal_code: String,
        source: reqwest::Error,
    },
    #[error("The designation service rejected the request for '{fiscal_code}' with status {status}: {body}")]
    Rejected {
        fiscal_code: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Could not decode the designation service response for '{fiscal_code}'")]
    Decode {
        fiscal_code: String,
        source: reqwest::Error,
    },
}

#[derive(Clone, Debug)]
pub struct Options {
    /// Base URL of the partner API gateway.
    pub base_url: String,
    /// Subscription key expected by the gateway.
    pub subscription_key: String,
    /// Label that marks the designated account on the partner side.
    pub label: String,
}

pub struct Outcome {
    /// Entities examined.
    pub examined: usize,
    /// Fiscal codes whose IBAN was rewritten.
    pub updated: Vec<String>,
    /// Entities already carrying the designated IBAN.
    pub unchanged: usize,
    /// Institutions the service returned no account for.
    pub undesignated: Vec<String>,
}

#[derive(Debug, serde::Deserialize)]
struct DesignatedAccounts {
    #[serde(default)]
    ibans_enhanced: Vec<DesignatedAccount>,
}

#[derive(Debug, serde::Deserialize)]
struct DesignatedAccount {
    iban: String,
}

pub(crate) mod function {
    use super::{DesignatedAccounts, Error, Options, Outcome};
    use crate::table_store::Client;

    pub fn refresh_preferred(
        client: &Client,
        Options {
            base_url,
            subscription_key,
            label,
        }: Options,
    ) -> Result<Outcome, Error> {
        let http = reqwest::blocking::Client::new();
        let entities = client.list_entities()?;

        let mut outcome = Outcome {
            examined: entities.len(),
            updated: Vec::new(),
            unchanged: 0,
            undesignated: Vec::new(),
        };
        for mut entity in entities {
            let fiscal_code = entity.row_key.clone();
            let designated = fetch_designated(&http, &base_url, &subscription_key, &label, &fiscal_code)?;
            match designated {
                None => outcome.undesignated.push(fiscal_code),
                Some(iban) if iban == entity.iban => outcome.unchanged += 1,
                Some(iban) => {
                    entity.iban = iban;
                    client.upsert_entity(&entity)?;
                    outcome.updated.push(fiscal_code);
                }
            }
        }
        Ok(outcome)
    }

    fn fetch_designated(
        http: &reqwest::blocking::Client,
        base_url: &str,
        subscription_key: &str,
        label: &str,
        fiscal_code: &str,
    ) -> Result<Option<String>, Error> {
        let url = format!("{base_url}/creditorinstitutions/{fiscal_code}/ibans/enhanced");
        let unreachable = |source| Error::Unreachable {
            fiscal_code: fiscal_code.to_string(),
            source,
        };
        let response = http
            .get(url)
            .query(&[("label", label)])
            .header("Ocp-Apim-Subscription-Key", subscription_key)
            .send()
            .map_err(unreachable)?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Rejected {
                fiscal_code: fiscal_code.to_string(),
                status,
                body: response.text().unwrap_or_default(),
            });
        }
        let accounts: DesignatedAccounts = response.json().map_err(|source| Error::Decode {
            fiscal_code: fiscal_code.to_string(),
            source,
        })?;
        // The first entry is the authoritative one; anything after it is ignored.
        Ok(accounts
            .ibans_enhanced
            .into_iter()
            .next()
            .map(|account| account.iban)
            .filter(|iban| !iban.is_empty()))
    }
}
