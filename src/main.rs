use crate::options::Args;
use anyhow::Context;
use clap::Parser;
use std::path::Path;

mod options {
    use std::path::PathBuf;

    #[derive(Debug, clap::Parser)]
    #[clap(
        name = "ectool",
        about = "Utilities to load and maintain the creditor-institution configuration table"
    )]
    pub enum Args {
        /// Join the registry, IBAN, contact and ISTAT exports into the configuration table,
        /// write it to CSV and push every record into the table store.
        BuildConfig {
            /// The institution registry export.
            #[clap(long)]
            registry: PathBuf,
            /// The IBAN export with one row per account.
            #[clap(long)]
            iban: PathBuf,
            /// The export of accounts designated upstream.
            #[clap(long)]
            preferred_iban: PathBuf,
            /// The IPA export with the institutions' certified mail addresses.
            #[clap(long)]
            ipa: PathBuf,
            /// The ISTAT table of administrative codes and official names.
            #[clap(long)]
            istat: PathBuf,
            /// Records to append for institutions missing from the registry; same columns as the output.
            #[clap(long)]
            supplement: Option<PathBuf>,
            /// Where to write the CSV snapshot of the table.
            #[clap(long, short = 'o')]
            output: PathBuf,
            /// 'local' or the name of the deployment environment to push to.
            #[clap(long)]
            env: String,
            /// Shared access signature for the storage account.
            #[clap(long)]
            key: String,
        },
        /// Cut the registry export down to a keep-list and collect fiscal codes that
        /// have no registry row into a separate file for manual follow-up.
        FilterInstitutions {
            /// The full institution registry export.
            #[clap(long)]
            registry: PathBuf,
            /// The list of fiscal codes to keep.
            #[clap(long)]
            keep: PathBuf,
            /// Where to write the filtered registry.
            #[clap(long, short = 'o')]
            output: PathBuf,
            /// Where to write fiscal codes that have no registry row.
            #[clap(long)]
            missing: PathBuf,
        },
        /// Check that every institution in a partner file is present in a previously
        /// produced configuration-table CSV.
        CheckPartner {
            /// The partner file to verify.
            #[clap(long)]
            partner: PathBuf,
            /// The configuration-table CSV to verify against.
            #[clap(long)]
            table: PathBuf,
            /// Identifier to reconcile on: 'fiscal-code', 'cadastral-code' or 'statistical-code'.
            #[clap(long, default_value = "fiscal-code")]
            scan_by: String,
        },
        /// Write official statistical codes into the stored entities whose company name
        /// matches the ISTAT registry.
        FixIstatCodes {
            /// The ISTAT table of administrative codes and official names.
            #[clap(long)]
            istat: PathBuf,
            /// The statistical codes to fix.
            codes: Vec<String>,
            /// 'local' or the name of the deployment environment.
            #[clap(long)]
            env: String,
            /// Shared access signature for the storage account.
            #[clap(long)]
            key: String,
        },
        /// Remove stray spaces from IBANs already stored in the configuration table.
        ScrubIbans {
            /// 'local' or the name of the deployment environment.
            #[clap(long)]
            env: String,
            /// Shared access signature for the storage account.
            #[clap(long)]
            key: String,
        },
        /// Re-align every stored IBAN with the account the institution designates
        /// through the partner API gateway.
        RefreshPreferred {
            /// Base URL of the partner API gateway.
            #[clap(long)]
            base_url: String,
            /// Subscription key expected by the gateway.
            #[clap(long)]
            subscription_key: String,
            /// Label that marks the designated account on the partner side.
            #[clap(long, default_value = "0201138TS")]
            label: String,
            /// 'local' or the name of the deployment environment.
            #[clap(long)]
            env: String,
            /// Shared access signature for the storage account.
            #[clap(long)]
            key: String,
        },
    }
}

fn main() -> anyhow::Result<()> {
    let args = options::Args::parse();
    match args {
        Args::BuildConfig {
            registry,
            iban,
            preferred_iban,
            ipa,
            istat,
            supplement,
            output,
            env,
            key,
        } => {
            let timestamp = time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .context("Could not format the run timestamp")?;
            let out = std::fs::File::create(&output).with_context(|| {
                format!("Could not create output file at '{}'", output.display())
            })?;
            let outcome = ectool::build_config(
                open(&registry)?,
                open(&iban)?,
                open(&preferred_iban)?,
                open(&ipa)?,
                open(&istat)?,
                supplement.as_deref().map(open).transpose()?,
                std::io::BufWriter::new(out),
                ectool::build_config::Options {
                    resolver: Default::default(),
                    timestamp,
                },
            )?;
            for fiscal_code in &outcome.missing_iban {
                println!("WARNING no active IBAN for institution {fiscal_code}");
            }
            for fiscal_code in &outcome.missing_statistical_code {
                println!("WARNING no statistical code for institution {fiscal_code}");
            }
            for fiscal_code in &outcome.missing_pec {
                println!("WARNING no PEC address for institution {fiscal_code}");
            }
            println!(
                "Records built: {} ({} externally designated)",
                outcome.records.len(),
                outcome.preferred_overrides
            );
            println!("Institutions without IBAN: {}", outcome.missing_iban.len());
            println!(
                "Institutions without statistical code: {}",
                outcome.missing_statistical_code.len()
            );
            println!("Institutions without PEC: {}", outcome.missing_pec.len());

            let client = ectool::table_store::Client::new(&env.parse()?, key);
            println!(
                "Pushing {} records to table '{}'",
                outcome.records.len(),
                client.table_name()
            );
            for record in &outcome.records {
                client.upsert_entity(record)?;
            }
            println!("Records stored: {}", outcome.records.len());
        }
        Args::FilterInstitutions {
            registry,
            keep,
            output,
            missing,
        } => {
            let out = std::fs::File::create(&output).with_context(|| {
                format!("Could not create output file at '{}'", output.display())
            })?;
            let mut missing_buffer = Vec::new();
            let outcome = ectool::filter_institutions(
                open(&registry)?,
                open(&keep)?,
                std::io::BufWriter::new(out),
                &mut missing_buffer,
            )?;
            for fiscal_code in &outcome.missing {
                println!("WARNING institution {fiscal_code} is not in the registry export");
            }
            if !outcome.missing.is_empty() {
                std::fs::write(&missing, missing_buffer).with_context(|| {
                    format!(
                        "Could not write missing-institutions file at '{}'",
                        missing.display()
                    )
                })?;
            }
            println!("Institutions kept: {}", outcome.matched);
            println!("Institutions missing: {}", outcome.missing.len());
        }
        Args::CheckPartner {
            partner,
            table,
            scan_by,
        } => {
            let outcome = ectool::check_partner(
                open(&partner)?,
                open(&table)?,
                ectool::check_partner::Options {
                    scan_key: scan_by.parse()?,
                },
            )?;
            for key in &outcome.missing {
                println!("No configuration found for code {key}");
            }
            println!("Codes checked: {}", outcome.checked);
            println!("Codes not found: {}", outcome.missing.len());
            if outcome.missing.is_empty() {
                println!("The partner file is compliant with the configuration table");
            } else {
                println!("The partner file is not compliant, please check the configuration");
            }
        }
        Args::FixIstatCodes {
            istat,
            codes,
            env,
            key,
        } => {
            let client = ectool::table_store::Client::new(&env.parse()?, key);
            let outcome = ectool::fix_istat_codes(open(&istat)?, &codes, &client)?;
            for code in &outcome.unmatched {
                println!("No entity found for statistical code {code}");
            }
            println!("Entities updated: {}", outcome.updated);
        }
        Args::ScrubIbans { env, key } => {
            let client = ectool::table_store::Client::new(&env.parse()?, key);
            let outcome = ectool::scrub_ibans(&client)?;
            for fiscal_code in &outcome.scrubbed {
                println!("Scrubbed IBAN of institution {fiscal_code}");
            }
            println!(
                "Entities scanned: {}, scrubbed: {}",
                outcome.scanned,
                outcome.scrubbed.len()
            );
        }
        Args::RefreshPreferred {
            base_url,
            subscription_key,
            label,
            env,
            key,
        } => {
            let client = ectool::table_store::Client::new(&env.parse()?, key);
            let outcome = ectool::refresh_preferred(
                &client,
                ectool::refresh_preferred::Options {
                    base_url,
                    subscription_key,
                    label,
                },
            )?;
            for fiscal_code in &outcome.undesignated {
                println!("No designated account for institution {fiscal_code}");
            }
            println!(
                "Entities examined: {}, updated: {}, already current: {}",
                outcome.examined,
                outcome.updated.len(),
                outcome.unchanged
            );
        }
    };
    Ok(())
}

fn open(path: &Path) -> anyhow::Result<impl std::io::Read> {
    Ok(std::io::Cursor::new(std::fs::read(path).with_context(
        || format!("Could not read from CSV file at '{}'", path.display()),
    )?))
}
