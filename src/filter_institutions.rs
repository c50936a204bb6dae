//! Cut a partner-facing snapshot of the institution registry down to a keep-list.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("A fiscal-code column at index {index} in row at line {line} could not be found")]
    MissingColumn { index: usize, line: u64 },
}

pub struct Outcome {
    /// Keep-list entries that had a registry row.
    pub matched: usize,
    /// Keep-list fiscal codes with no registry row, for manual follow-up.
    pub missing: Vec<String>,
}

/// Column layout partners receive; the registry export carries these fields in
/// this exact order.
const REGISTRY_HEADER: [&str; 33] = [
    "denominazioneEnte",
    "codAmm",
    "codiceFiscale",
    "dataAdesione",
    "codiceGs1Gln",
    "cognomeRp",
    "nomeRp",
    "codiceFiscaleRp",
    "mailRp",
    "telefonoRp",
    "cellulareRp",
    "tipoIntermediazione",
    "denominazioneIntermediarioPartner",
    "cognomeRt",
    "nomeRt",
    "codiceFiscaleRt",
    "mailRt",
    "telefonoRt",
    "cellulareRt",
    "statoConnessione",
    "modello",
    "dataCollaudo",
    "dataPreEsercizio",
    "dataEsercizio",
    "auxDigit",
    "codiceSegregazione",
    "applicationCode",
    "codiceInterbancario",
    "idStazione",
    "statoAssociazione",
    "dataStatoAssociazione",
    "versioneStazione",
    "flagBroadcast",
];

const REGISTRY_FISCAL_CODE: usize = 2;
const KEEP_FISCAL_CODE: usize = 0;

pub(crate) mod function {
    use super::{Error, Outcome, KEEP_FISCAL_CODE, REGISTRY_FISCAL_CODE, REGISTRY_HEADER};
    use std::collections::HashMap;

    pub fn filter_institutions(
        registry: impl std::io::Read,
        keep: impl std::io::Read,
        out: impl std::io::Write,
        missing_out: impl std::io::Write,
    ) -> Result<Outcome, Error> {
        let mut registry = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .from_reader(registry);
        let mut by_fiscal_code: HashMap<String, csv::StringRecord> = HashMap::new();
        for row in registry.records() {
            let row = row?;
            let fiscal_code = row.get(REGISTRY_FISCAL_CODE).ok_or(Error::MissingColumn {
                index: REGISTRY_FISCAL_CODE,
                line: row.position().map(csv::Position::line).unwrap_or_default(),
            })?;
            // The first row wins when an institution is exported twice.
            let fiscal_code = fiscal_code.to_string();
            by_fiscal_code.entry(fiscal_code).or_insert(row);
        }

        let mut keep = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .from_reader(keep);
        let mut out = csv::Writer::from_writer(out);
        out.write_record(REGISTRY_HEADER)?;
        let mut matched = 0;
        let mut missing = Vec::new();
        for row in keep.records() {
            let row = row?;
            let fiscal_code = row.get(KEEP_FISCAL_CODE).ok_or(Error::MissingColumn {
                index: KEEP_FISCAL_CODE,
                line: row.position().map(csv::Position::line).unwrap_or_default(),
            })?;
            match by_fiscal_code.get(fiscal_code) {
                Some(record) => {
                    out.write_record(record)?;
                    matched += 1;
                }
                None => missing.push(fiscal_code.to_string()),
            }
        }
        out.flush()?;

        let mut missing_out = csv::Writer::from_writer(missing_out);
        for fiscal_code in &missing {
            missing_out.write_record([fiscal_code.as_str()])?;
        }
        missing_out.flush()?;

        Ok(Outcome { matched, missing })
    }
}
