//! Selection of the one billable IBAN among all accounts a creditor institution exposes.

use time::macros::date;
use time::{Date, Month};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Activation date '{date}' does not split into day, month and year on '{separator}'")]
    MalformedDate { date: String, separator: char },
    #[error("Activation date '{date}' has a component that is not a number")]
    NonNumericDate {
        date: String,
        source: std::num::ParseIntError,
    },
    #[error("Activation date '{date}' does not name a calendar day")]
    DateOutOfRange {
        date: String,
        source: time::error::ComponentRange,
    },
}

/// Accounts without an activation date sort as if they had been activated here.
pub const UNDATED_SORTS_AS: Date = date!(1900 - 01 - 01);

/// One row of the IBAN export for a creditor institution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub owner_fiscal_code: String,
    pub iban: String,
    pub status: String,
    pub activation_date: String,
    pub description: String,
}

#[derive(Clone, Debug)]
pub struct Options {
    /// Substring of the status field that marks an account as active.
    pub active_marker: String,
    /// Substring of the description field by which an institution designates its
    /// authoritative account, or `None` to rely on activation dates alone.
    pub preferred_marker: Option<String>,
    /// Separator between the day, month and year tokens of the activation date.
    pub date_separator: char,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            active_marker: "ATTIVO".into(),
            preferred_marker: Some("CUP".into()),
            date_separator: '/',
        }
    }
}

/// Pick the account to bill against among all rows exported for one institution.
///
/// Rows whose status does not carry the active marker never participate, and with no
/// active row left there is no billable account, which is a valid outcome rather than
/// an error. An active row whose description carries the preferred label beats every
/// other row no matter how recent their activation; when several rows carry the label,
/// the last one in the input wins. Without a labelled row the most recently activated
/// account wins, and rows sharing an activation date keep their input order.
pub fn resolve<'a>(
    records: &'a [AccountRecord],
    options: &Options,
) -> Result<Option<&'a AccountRecord>, Error> {
    let active: Vec<&AccountRecord> = records
        .iter()
        .filter(|record| record.status.contains(&options.active_marker))
        .collect();
    if active.is_empty() {
        return Ok(None);
    }

    if let Some(marker) = options.preferred_marker.as_deref() {
        if let Some(designated) = active
            .iter()
            .filter(|record| record.description.contains(marker))
            .last()
            .copied()
        {
            return Ok(Some(designated));
        }
    }

    let mut dated = Vec::with_capacity(active.len());
    for record in active {
        dated.push((
            parse_activation_date(&record.activation_date, options.date_separator)?,
            record,
        ));
    }
    dated.sort_by(|lhs, rhs| rhs.0.cmp(&lhs.0));
    Ok(dated.first().map(|(_, record)| *record))
}

/// Parse a `DD<sep>MM<sep>YYYY` activation date.
///
/// Exports routinely leave the field empty; that case must short-circuit to the
/// sentinel before any splitting happens. Every other malformed value is a
/// data-quality problem that has to surface, not be defaulted away.
pub fn parse_activation_date(date: &str, separator: char) -> Result<Date, Error> {
    if date.is_empty() {
        return Ok(UNDATED_SORTS_AS);
    }
    let tokens: Vec<&str> = date.split(separator).collect();
    let &[day, month, year] = tokens.as_slice() else {
        return Err(Error::MalformedDate {
            date: date.into(),
            separator,
        });
    };
    let day: u8 = day.parse().map_err(|source| Error::NonNumericDate {
        date: date.into(),
        source,
    })?;
    let month: u8 = month.parse().map_err(|source| Error::NonNumericDate {
        date: date.into(),
        source,
    })?;
    let year: i32 = year.parse().map_err(|source| Error::NonNumericDate {
        date: date.into(),
        source,
    })?;
    let month = Month::try_from(month).map_err(|source| Error::DateOutOfRange {
        date: date.into(),
        source,
    })?;
    Date::from_calendar_date(year, month, day).map_err(|source| Error::DateOutOfRange {
        date: date.into(),
        source,
    })
}
