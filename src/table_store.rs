//! Minimal client for the keyed table store holding the institution configuration.
//!
//! Entities live in one table per deployment environment and are addressed by
//! `(PartitionKey, RowKey)`. Writes keyed that way are idempotent, which is what
//! makes every load in this toolset safe to re-run after a partial failure.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("The deployment environment may not be an empty string")]
    EmptyEnvironment,
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("The table store rejected the request with status {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// All configuration entities share this partition.
pub const ORGANIZATION_PARTITION: &str = "org";

const STORAGE_API_VERSION: &str = "2019-02-02";
const ENTITY_FORMAT: &str = "application/json;odata=nometadata";

/// The storage emulator ships with this well-known account.
const LOCAL_ACCOUNT: &str = "devstoreaccount1";
const LOCAL_ENDPOINT: &str = "http://127.0.0.1:10002";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Environment {
    /// The storage emulator on this machine.
    Local,
    /// A named deployment environment, `d`, `u` or `p` in practice.
    Named(String),
}

impl std::str::FromStr for Environment {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "" => Err(Error::EmptyEnvironment),
            "local" => Ok(Environment::Local),
            name => Ok(Environment::Named(name.into())),
        }
    }
}

/// One institution's configuration entity, with the exact column names used both on
/// the wire and in the CSV snapshots of the table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigRecord {
    pub partition_key: String,
    pub row_key: String,
    pub timestamp: String,
    pub company_name: String,
    pub iban: String,
    pub pa_id_catasto: String,
    pub pa_id_cbill: String,
    pub pa_id_istat: String,
    pub pa_pec_email: String,
    pub pa_referent_email: String,
    pub pa_referent_name: String,
}

#[derive(Deserialize)]
struct EntityPage {
    value: Vec<ConfigRecord>,
}

pub struct Client {
    http: reqwest::blocking::Client,
    endpoint: String,
    table: String,
    sas: String,
}

impl Client {
    /// Address the configuration table of the given environment. The credential is an
    /// account shared access signature and travels as the query string of every request.
    pub fn new(environment: &Environment, sas: impl Into<String>) -> Self {
        let (endpoint, table) = match environment {
            // The emulator mirrors the production table name.
            Environment::Local => (
                format!("{LOCAL_ENDPOINT}/{LOCAL_ACCOUNT}"),
                "pagopapcanoneunicosaecconfigtable".to_string(),
            ),
            Environment::Named(name) => {
                let account = format!("pagopa{name}canoneunicosa");
                (
                    format!("https://{account}.table.core.windows.net"),
                    format!("{account}ecconfigtable"),
                )
            }
        };
        Client {
            http: reqwest::blocking::Client::new(),
            endpoint,
            table,
            sas: sas.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Write the entity under its `(PartitionKey, RowKey)`, inserting or replacing
    /// whatever is there. Re-running the same write leaves the same stored state.
    pub fn upsert_entity(&self, entity: &ConfigRecord) -> Result<(), Error> {
        self.put_entity(entity, false)
    }

    /// Replace an entity that must already exist.
    pub fn replace_entity(&self, entity: &ConfigRecord) -> Result<(), Error> {
        self.put_entity(entity, true)
    }

    fn put_entity(&self, entity: &ConfigRecord, must_exist: bool) -> Result<(), Error> {
        let url = format!(
            "{}/{}(PartitionKey='{}',RowKey='{}')?{}",
            self.endpoint, self.table, entity.partition_key, entity.row_key, self.sas
        );
        let mut request = self
            .http
            .put(url)
            .header("Accept", ENTITY_FORMAT)
            .header("x-ms-version", STORAGE_API_VERSION)
            .json(entity);
        if must_exist {
            request = request.header("If-Match", "*");
        }
        accept(request.send()?).map(|_| ())
    }

    pub fn list_entities(&self) -> Result<Vec<ConfigRecord>, Error> {
        self.query_entities(None)
    }

    /// Fetch all entities matching the optional `$filter`, following continuation
    /// headers until the result set is complete.
    pub fn query_entities(&self, filter: Option<&str>) -> Result<Vec<ConfigRecord>, Error> {
        let mut entities = Vec::new();
        let mut continuation: Option<(String, String)> = None;
        loop {
            let url = format!("{}/{}()?{}", self.endpoint, self.table, self.sas);
            let mut request = self
                .http
                .get(url)
                .header("Accept", ENTITY_FORMAT)
                .header("x-ms-version", STORAGE_API_VERSION);
            if let Some(filter) = filter {
                request = request.query(&[("$filter", filter)]);
            }
            if let Some((partition, row)) = &continuation {
                request = request.query(&[("NextPartitionKey", partition), ("NextRowKey", row)]);
            }
            let response = accept(request.send()?)?;
            continuation = next_page(response.headers());
            let page: EntityPage = response.json()?;
            entities.extend(page.value);
            if continuation.is_none() {
                return Ok(entities);
            }
        }
    }
}

fn accept(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, Error> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(Error::Rejected {
            status,
            body: response.text().unwrap_or_default(),
        })
    }
}

fn next_page(headers: &reqwest::header::HeaderMap) -> Option<(String, String)> {
    let value = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned)
    };
    Some((
        value("x-ms-continuation-NextPartitionKey")?,
        value("x-ms-continuation-NextRowKey")?,
    ))
}
