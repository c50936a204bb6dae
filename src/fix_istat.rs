//! Repair statistical codes in the stored configuration by matching entities
//! against the official municipality names of the ISTAT table.

use crate::table_store;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Store(#[from] table_store::Error),
    #[error("A {kind} column at index {index} in row at line {line} could not be found")]
    MissingColumn {
        index: usize,
        kind: &'static str,
        line: u64,
    },
}

pub struct Outcome {
    /// Codes written into their matching entity.
    pub updated: usize,
    /// Codes with no ISTAT row or no entity carrying the official name.
    pub unmatched: Vec<String>,
}

const ISTAT_STATISTICAL_CODE: usize = 4;
const ISTAT_MUNICIPALITY_NAME: usize = 5;

/// Municipalities are registered under this prefix in the configuration table.
fn official_label(municipality: &str) -> String {
    format!("Comune di {municipality}")
}

pub(crate) mod function {
    use super::{official_label, Error, Outcome, ISTAT_MUNICIPALITY_NAME, ISTAT_STATISTICAL_CODE};
    use crate::table_store::{Client, ORGANIZATION_PARTITION};
    use std::collections::HashMap;

    pub fn fix_istat_codes(
        istat: impl std::io::Read,
        codes: &[String],
        client: &Client,
    ) -> Result<Outcome, Error> {
        let official_names = load_official_names(istat)?;
        let entities =
            client.query_entities(Some(&format!("PartitionKey eq '{ORGANIZATION_PARTITION}'")))?;

        let mut updated = 0;
        let mut unmatched = Vec::new();
        for code in codes {
            let Some(municipality) = official_names.get(code) else {
                unmatched.push(code.clone());
                continue;
            };
            let official = official_label(municipality).to_lowercase();
            match entities
                .iter()
                .find(|entity| entity.company_name.to_lowercase() == official)
            {
                Some(entity) => {
                    let mut entity = entity.clone();
                    entity.pa_id_istat = code.clone();
                    client.replace_entity(&entity)?;
                    updated += 1;
                }
                None => unmatched.push(code.clone()),
            }
        }

        Ok(Outcome { updated, unmatched })
    }

    /// Statistical code to official municipality name, from the ISTAT table.
    fn load_official_names(
        data: impl std::io::Read,
    ) -> Result<HashMap<String, String>, Error> {
        let mut csv = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .from_reader(data);
        let mut names = HashMap::new();
        for row in csv.records() {
            let row = row?;
            let code = row.get(ISTAT_STATISTICAL_CODE).ok_or(Error::MissingColumn {
                index: ISTAT_STATISTICAL_CODE,
                kind: "statistical code",
                line: row.position().map(csv::Position::line).unwrap_or_default(),
            })?;
            let name = row.get(ISTAT_MUNICIPALITY_NAME).ok_or(Error::MissingColumn {
                index: ISTAT_MUNICIPALITY_NAME,
                kind: "municipality name",
                line: row.position().map(csv::Position::line).unwrap_or_default(),
            })?;
            names.insert(code.to_string(), name.to_string());
        }
        Ok(names)
    }
}
