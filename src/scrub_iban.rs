//! Remove stray whitespace from IBANs already stored in the configuration table.

use crate::table_store;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] table_store::Error),
}

pub struct Outcome {
    /// Entities examined.
    pub scanned: usize,
    /// Fiscal codes whose IBAN was rewritten.
    pub scrubbed: Vec<String>,
}

/// A well-formed Italian IBAN is exactly this long; anything longer carries
/// stray characters.
const ITALIAN_IBAN_LENGTH: usize = 27;

/// The cleaned-up IBAN, or `None` when the stored value is already within length.
pub fn scrub(iban: &str) -> Option<String> {
    (iban.len() > ITALIAN_IBAN_LENGTH).then(|| iban.replace(' ', ""))
}

pub(crate) mod function {
    use super::{scrub, Error, Outcome};
    use crate::table_store::Client;

    pub fn scrub_ibans(client: &Client) -> Result<Outcome, Error> {
        let entities = client.list_entities()?;
        let scanned = entities.len();
        let mut scrubbed = Vec::new();
        for mut entity in entities {
            if let Some(clean) = scrub(&entity.iban) {
                entity.iban = clean;
                client.replace_entity(&entity)?;
                scrubbed.push(entity.row_key);
            }
        }
        Ok(Outcome { scanned, scrubbed })
    }
}
