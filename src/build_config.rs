//! Join the registry, IBAN, contact and ISTAT exports into the configuration record set.

use crate::iban;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Account(#[from] iban::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("A {kind} column at index {index} in row at line {line} could not be found")]
    MissingColumn {
        index: usize,
        kind: &'static str,
        line: u64,
    },
}

impl Error {
    pub(crate) fn from_position(index: usize, pos: Option<&csv::Position>, kind: &'static str) -> Self {
        Error::MissingColumn {
            index,
            kind,
            line: pos.map(csv::Position::line).unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Options {
    /// Selection knobs for the per-institution account resolution.
    pub resolver: iban::Options,
    /// RFC 3339 timestamp stamped on every record of this run.
    pub timestamp: String,
}

#[derive(Debug)]
pub struct Outcome {
    /// The complete record set in registry order, supplements appended last.
    pub records: Vec<crate::table_store::ConfigRecord>,
    /// Institutions whose account came from the upstream designation export.
    pub preferred_overrides: usize,
    /// Institutions that resolved to no billable IBAN.
    pub missing_iban: Vec<String>,
    /// Institutions whose cadastral code has no statistical-code entry.
    pub missing_statistical_code: Vec<String>,
    /// Institutions with no certified mail address on record.
    pub missing_pec: Vec<String>,
}

/// Sentinel for a statistical code that could not be joined.
pub const NOT_AVAILABLE: &str = "N/A";

// Field positions are the coupling contract with the upstream exports.
const REGISTRY_COMPANY_NAME: usize = 0;
const REGISTRY_CADASTRAL_CODE: usize = 1;
const REGISTRY_FISCAL_CODE: usize = 2;
const REGISTRY_REFERENT_SURNAME: usize = 5;
const REGISTRY_REFERENT_FIRST_NAME: usize = 6;
const REGISTRY_REFERENT_EMAIL: usize = 8;
const REGISTRY_CBILL_CODE: usize = 27;

const ACCOUNT_OWNER_FISCAL_CODE: usize = 1;
const ACCOUNT_IBAN: usize = 3;
const ACCOUNT_STATUS: usize = 5;
const ACCOUNT_ACTIVATION_DATE: usize = 6;
const ACCOUNT_DESCRIPTION: usize = 7;

const PREFERRED_FISCAL_CODE: usize = 1;
const PREFERRED_IBAN: usize = 2;
const PREFERRED_ACTIVATION_DATE: usize = 6;

const CONTACT_FISCAL_CODE: usize = 3;
const CONTACT_PEC_EMAIL: usize = 8;

const ISTAT_STATISTICAL_CODE: usize = 4;
const ISTAT_CADASTRAL_CODE: usize = 19;

pub(crate) mod function {
    use super::{Error, Options, Outcome};
    use crate::iban::{self, AccountRecord};
    use crate::normalize_cadastral_code;
    use crate::table_store::{ConfigRecord, ORGANIZATION_PARTITION};
    use std::collections::hash_map::Entry;
    use std::collections::HashMap;

    pub fn build_config(
        registry: impl std::io::Read,
        accounts: impl std::io::Read,
        preferred: impl std::io::Read,
        contacts: impl std::io::Read,
        istat: impl std::io::Read,
        supplement: Option<impl std::io::Read>,
        out: impl std::io::Write,
        Options {
            resolver,
            timestamp,
        }: Options,
    ) -> Result<Outcome, Error> {
        let accounts = load_accounts(accounts)?;
        let preferred = load_preferred(preferred, &resolver)?;
        let contacts = load_keyed_column(contacts, super::CONTACT_FISCAL_CODE, super::CONTACT_PEC_EMAIL)?;
        let istat = load_keyed_column(istat, super::ISTAT_CADASTRAL_CODE, super::ISTAT_STATISTICAL_CODE)?;

        let mut resolved = HashMap::new();
        let mut preferred_overrides = 0;
        for (fiscal_code, records) in &accounts {
            // The upstream designation replaces whatever the local rows resolve to,
            // but only institutions with at least one active account are billable.
            let choice = match iban::resolve(records, &resolver)? {
                None => None,
                Some(local) => match preferred.get(fiscal_code) {
                    Some(designated) => {
                        preferred_overrides += 1;
                        Some(designated.as_str())
                    }
                    None => Some(local.iban.as_str()),
                },
            };
            if let Some(iban) = choice {
                resolved.insert(fiscal_code.clone(), iban.to_string());
            }
        }

        let mut registry = csv::ReaderBuilder::new()
            .delimiter(b',')
            .has_headers(true)
            .from_reader(registry);
        let mut records = Vec::new();
        let mut missing_iban = Vec::new();
        let mut missing_statistical_code = Vec::new();
        let mut missing_pec = Vec::new();
        for row in registry.records() {
            let row = row?;
            let field = |index: usize, kind: &'static str| {
                row.get(index)
                    .ok_or_else(|| Error::from_position(index, row.position(), kind))
            };
            let fiscal_code = field(super::REGISTRY_FISCAL_CODE, "fiscal code")?;
            let iban = match resolved.get(fiscal_code) {
                Some(iban) => iban.clone(),
                None => {
                    missing_iban.push(fiscal_code.to_string());
                    String::new()
                }
            };
            let cadastral_code =
                normalize_cadastral_code(field(super::REGISTRY_CADASTRAL_CODE, "cadastral code")?);
            let statistical_code = match istat.get(&cadastral_code) {
                Some(code) => code.clone(),
                None => {
                    missing_statistical_code.push(fiscal_code.to_string());
                    super::NOT_AVAILABLE.to_string()
                }
            };
            let pec_email = match contacts.get(fiscal_code) {
                Some(pec) => pec.clone(),
                None => {
                    missing_pec.push(fiscal_code.to_string());
                    String::new()
                }
            };
            records.push(ConfigRecord {
                partition_key: ORGANIZATION_PARTITION.to_string(),
                row_key: fiscal_code.to_string(),
                timestamp: timestamp.clone(),
                company_name: field(super::REGISTRY_COMPANY_NAME, "company name")?.to_string(),
                iban,
                pa_id_catasto: cadastral_code,
                pa_id_cbill: field(super::REGISTRY_CBILL_CODE, "CBILL code")?.to_string(),
                pa_id_istat: statistical_code,
                pa_pec_email: pec_email,
                pa_referent_email: field(super::REGISTRY_REFERENT_EMAIL, "referent email")?.to_string(),
                pa_referent_name: format!(
                    "{} {}",
                    field(super::REGISTRY_REFERENT_FIRST_NAME, "referent first name")?,
                    field(super::REGISTRY_REFERENT_SURNAME, "referent surname")?
                ),
            });
        }

        if let Some(supplement) = supplement {
            let mut supplement = csv::Reader::from_reader(supplement);
            for record in supplement.deserialize() {
                records.push(record?);
            }
        }

        let mut out = csv::Writer::from_writer(out);
        for record in &records {
            out.serialize(record)?;
        }
        out.flush()?;

        Ok(Outcome {
            records,
            preferred_overrides,
            missing_iban,
            missing_statistical_code,
            missing_pec,
        })
    }

    fn load_accounts(
        data: impl std::io::Read,
    ) -> Result<HashMap<String, Vec<AccountRecord>>, Error> {
        let mut csv = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .from_reader(data);
        let mut accounts: HashMap<String, Vec<AccountRecord>> = HashMap::new();
        for row in csv.records() {
            let row = row?;
            let field = |index: usize, kind: &'static str| {
                row.get(index)
                    .ok_or_else(|| Error::from_position(index, row.position(), kind))
            };
            let record = AccountRecord {
                owner_fiscal_code: field(super::ACCOUNT_OWNER_FISCAL_CODE, "fiscal code")?.to_string(),
                iban: field(super::ACCOUNT_IBAN, "IBAN")?.to_string(),
                status: field(super::ACCOUNT_STATUS, "status")?.to_string(),
                activation_date: field(super::ACCOUNT_ACTIVATION_DATE, "activation date")?.to_string(),
                description: field(super::ACCOUNT_DESCRIPTION, "description")?.to_string(),
            };
            accounts
                .entry(record.owner_fiscal_code.clone())
                .or_default()
                .push(record);
        }
        Ok(accounts)
    }

    /// The upstream export is already reduced to designated accounts; per institution
    /// the most recently activated row is authoritative, first one seen on a tie.
    fn load_preferred(
        data: impl std::io::Read,
        options: &iban::Options,
    ) -> Result<HashMap<String, String>, Error> {
        let mut csv = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .from_reader(data);
        let mut designated: HashMap<String, (time::Date, String)> = HashMap::new();
        for row in csv.records() {
            let row = row?;
            let field = |index: usize, kind: &'static str| {
                row.get(index)
                    .ok_or_else(|| Error::from_position(index, row.position(), kind))
            };
            let fiscal_code = field(super::PREFERRED_FISCAL_CODE, "fiscal code")?;
            let iban = field(super::PREFERRED_IBAN, "IBAN")?;
            let activated = iban::parse_activation_date(
                field(super::PREFERRED_ACTIVATION_DATE, "activation date")?,
                options.date_separator,
            )?;
            match designated.entry(fiscal_code.to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert((activated, iban.to_string()));
                }
                Entry::Occupied(mut slot) => {
                    if activated > slot.get().0 {
                        slot.insert((activated, iban.to_string()));
                    }
                }
            }
        }
        Ok(designated
            .into_iter()
            .map(|(fiscal_code, (_, iban))| (fiscal_code, iban))
            .collect())
    }

    /// Read a two-column projection of a `;`-separated export into a lookup map.
    fn load_keyed_column(
        data: impl std::io::Read,
        key_index: usize,
        value_index: usize,
    ) -> Result<HashMap<String, String>, Error> {
        let mut csv = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .from_reader(data);
        let mut map = HashMap::new();
        for row in csv.records() {
            let row = row?;
            let key = row
                .get(key_index)
                .ok_or_else(|| Error::from_position(key_index, row.position(), "key"))?;
            let value = row
                .get(value_index)
                .ok_or_else(|| Error::from_position(value_index, row.position(), "value"))?;
            map.insert(key.to_string(), value.to_string());
        }
        Ok(map)
    }
}
