//! Verify that every institution a partner lists is present in a configuration-table
//! snapshot, by whichever identifier the partner file is keyed on.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("'{0}' is not one of 'fiscal-code', 'cadastral-code' or 'statistical-code'")]
    UnknownScanKey(String),
    #[error("A {kind} column at index {index} in row at line {line} could not be found")]
    MissingColumn {
        index: usize,
        kind: &'static str,
        line: u64,
    },
}

/// Which identifier to reconcile the partner file on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanKey {
    FiscalCode,
    CadastralCode,
    StatisticalCode,
}

impl ScanKey {
    /// (partner column, table column) for each identifier kind.
    fn columns(&self) -> (usize, usize) {
        match self {
            ScanKey::FiscalCode => (3, 1),
            ScanKey::CadastralCode => (2, 5),
            ScanKey::StatisticalCode => (1, 7),
        }
    }
}

impl std::str::FromStr for ScanKey {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "fiscal-code" => Ok(ScanKey::FiscalCode),
            "cadastral-code" => Ok(ScanKey::CadastralCode),
            "statistical-code" => Ok(ScanKey::StatisticalCode),
            other => Err(Error::UnknownScanKey(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Options {
    pub scan_key: ScanKey,
}

pub struct Outcome {
    /// Partner rows that were checked.
    pub checked: usize,
    /// Partner identifiers with no row in the table snapshot.
    pub missing: Vec<String>,
}

pub(crate) mod function {
    use super::{Error, Options, Outcome};
    use std::collections::HashSet;

    pub fn check_partner(
        partner: impl std::io::Read,
        table: impl std::io::Read,
        Options { scan_key }: Options,
    ) -> Result<Outcome, Error> {
        let (partner_index, table_index) = scan_key.columns();

        let mut table = csv::ReaderBuilder::new()
            .delimiter(b',')
            .has_headers(true)
            .from_reader(table);
        let mut known = HashSet::new();
        for row in table.records() {
            let row = row?;
            let key = row.get(table_index).ok_or(Error::MissingColumn {
                index: table_index,
                kind: "table key",
                line: row.position().map(csv::Position::line).unwrap_or_default(),
            })?;
            known.insert(key.to_string());
        }

        let mut partner = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .from_reader(partner);
        let mut checked = 0;
        let mut missing = Vec::new();
        for row in partner.records() {
            let row = row?;
            let key = row.get(partner_index).ok_or(Error::MissingColumn {
                index: partner_index,
                kind: "partner key",
                line: row.position().map(csv::Position::line).unwrap_or_default(),
            })?;
            checked += 1;
            if !known.contains(key) {
                missing.push(key.to_string());
            }
        }

        Ok(Outcome { checked, missing })
    }
}
