fn fixture(name: &str) -> std::fs::File {
    std::fs::File::open(std::path::Path::new("tests").join("fixtures").join(name)).unwrap()
}

mod iban {
    use ectool::iban::{parse_activation_date, resolve, AccountRecord, Error, Options, UNDATED_SORTS_AS};
    use time::macros::date;

    fn account(iban: &str, status: &str, activation_date: &str, description: &str) -> AccountRecord {
        AccountRecord {
            owner_fiscal_code: "80001230376".into(),
            iban: iban.into(),
            status: status.into(),
            activation_date: activation_date.into(),
            description: description.into(),
        }
    }

    #[test]
    fn most_recently_activated_account_wins() {
        let records = [
            account("IT-A", "ATTIVO", "01/01/2020", ""),
            account("IT-B", "ATTIVO", "15/06/2023", ""),
        ];
        let resolved = resolve(&records, &Options::default()).unwrap().unwrap();
        assert_eq!(resolved.iban, "IT-B");
    }

    #[test]
    fn empty_activation_date_sorts_earliest() {
        let records = [
            account("IT-A", "ATTIVO", "", ""),
            account("IT-B", "ATTIVO", "15/06/2023", ""),
        ];
        let resolved = resolve(&records, &Options::default()).unwrap().unwrap();
        assert_eq!(resolved.iban, "IT-B");
    }

    #[test]
    fn inactive_records_never_participate() {
        let records = [account("IT-A", "CESSATO", "15/06/2023", "")];
        assert!(
            resolve(&records, &Options::default()).unwrap().is_none(),
            "a sole inactive account still yields no billable account"
        );
    }

    #[test]
    fn status_marker_matches_as_substring() {
        let records = [account("IT-A", "ATTIVO - confermato", "01/01/2020", "")];
        let resolved = resolve(&records, &Options::default()).unwrap().unwrap();
        assert_eq!(resolved.iban, "IT-A");
    }

    #[test]
    fn labelled_account_beats_recency() {
        let records = [
            account("IT-A", "ATTIVO", "05/05/2019", "Conto canone unico CUP"),
            account("IT-B", "ATTIVO", "01/01/2024", "Conto generale"),
        ];
        let resolved = resolve(&records, &Options::default()).unwrap().unwrap();
        assert_eq!(resolved.iban, "IT-A");
    }

    #[test]
    fn last_labelled_account_wins() {
        let records = [
            account("IT-A", "ATTIVO", "01/01/2024", "CUP tesoreria"),
            account("IT-B", "ATTIVO", "05/05/2019", "CUP incassi"),
        ];
        let resolved = resolve(&records, &Options::default()).unwrap().unwrap();
        assert_eq!(resolved.iban, "IT-B");
    }

    #[test]
    fn label_scan_can_be_disabled() {
        let records = [
            account("IT-A", "ATTIVO", "05/05/2019", "CUP tesoreria"),
            account("IT-B", "ATTIVO", "01/01/2024", "Conto generale"),
        ];
        let options = Options {
            preferred_marker: None,
            ..Options::default()
        };
        let resolved = resolve(&records, &options).unwrap().unwrap();
        assert_eq!(resolved.iban, "IT-B");
    }

    #[test]
    fn ties_keep_input_order() {
        let records = [
            account("IT-A", "ATTIVO", "15/06/2023", ""),
            account("IT-B", "ATTIVO", "15/06/2023", ""),
        ];
        let resolved = resolve(&records, &Options::default()).unwrap().unwrap();
        assert_eq!(resolved.iban, "IT-A");
    }

    #[test]
    fn at_most_one_record_comes_back() {
        let records = [
            account("IT-A", "ATTIVO", "01/01/2020", ""),
            account("IT-B", "ATTIVO", "15/06/2023", ""),
            account("IT-C", "CESSATO", "31/12/2023", ""),
        ];
        assert!(resolve(&records, &Options::default()).unwrap().is_some());
        assert!(resolve(&[], &Options::default()).unwrap().is_none());
    }

    #[test]
    fn parses_day_month_year() {
        assert_eq!(
            parse_activation_date("15/06/2023", '/').unwrap(),
            date!(2023 - 06 - 15)
        );
        assert_eq!(
            parse_activation_date("15-06-2023", '-').unwrap(),
            date!(2023 - 06 - 15)
        );
    }

    #[test]
    fn empty_date_short_circuits_to_the_sentinel() {
        assert_eq!(parse_activation_date("", '/').unwrap(), UNDATED_SORTS_AS);
        assert_eq!(UNDATED_SORTS_AS, date!(1900 - 01 - 01));
    }

    #[test]
    fn malformed_dates_are_fatal_and_name_the_value() {
        let err = parse_activation_date("15/06", '/').unwrap_err();
        assert!(matches!(err, Error::MalformedDate { .. }));
        assert!(err.to_string().contains("15/06"));

        let err = parse_activation_date("June 15 2023", '/').unwrap_err();
        assert!(matches!(err, Error::MalformedDate { .. }));

        let err = parse_activation_date("aa/bb/cccc", '/').unwrap_err();
        assert!(matches!(err, Error::NonNumericDate { .. }));
        assert!(err.to_string().contains("aa/bb/cccc"));

        let err = parse_activation_date("32/01/2020", '/').unwrap_err();
        assert!(matches!(err, Error::DateOutOfRange { .. }));
        assert!(err.to_string().contains("32/01/2020"));
    }
}

mod build_config {
    use super::fixture;
    use ectool::build_config::Options;
    use ectool::table_store::ConfigRecord;
    use std::collections::HashMap;

    fn options() -> Options {
        Options {
            resolver: Default::default(),
            timestamp: "2024-05-06T10:00:00Z".into(),
        }
    }

    #[test]
    fn joins_registry_accounts_contacts_and_codes() {
        let mut out = Vec::new();
        let outcome = ectool::build_config(
            fixture("registry.csv"),
            fixture("iban_export.csv"),
            fixture("preferred_iban.csv"),
            fixture("ipa.csv"),
            fixture("istat.csv"),
            None::<std::fs::File>,
            &mut out,
            options(),
        )
        .unwrap();

        assert_eq!(outcome.records.len(), 6);
        assert_eq!(outcome.preferred_overrides, 1);
        assert_eq!(outcome.missing_iban, ["83000890155", "91234567890"]);
        assert_eq!(outcome.missing_statistical_code, ["91234567890"]);
        assert_eq!(outcome.missing_pec, ["91234567890"]);

        let by_key: HashMap<_, _> = outcome
            .records
            .iter()
            .map(|record| (record.row_key.as_str(), record))
            .collect();
        assert_eq!(
            by_key["80001230376"].iban, "IT43K0310412701000000821212",
            "the most recently activated account wins"
        );
        assert_eq!(
            by_key["80002150391"].iban, "IT88Z0306909606100000061230",
            "an empty activation date sorts earliest"
        );
        assert_eq!(
            by_key["83000890155"].iban, "",
            "no active account leaves the IBAN empty"
        );
        assert_eq!(
            by_key["90012345678"].iban, "IT75C0100503400000000218000",
            "the labelled account beats more recent ones"
        );
        assert_eq!(
            by_key["92021660346"].iban, "IT23H0200812609000110418246",
            "the upstream designation overrides local resolution"
        );

        assert_eq!(by_key["80001230376"].pa_id_catasto, "L810");
        assert_eq!(by_key["83000890155"].pa_id_catasto, "E063");
        assert_eq!(by_key["80001230376"].pa_id_istat, "037059");
        assert_eq!(by_key["91234567890"].pa_id_istat, "N/A");
        assert_eq!(by_key["80001230376"].pa_id_cbill, "ABC01");
        assert_eq!(
            by_key["80001230376"].pa_pec_email,
            "comune.vergato@cert.provincia.bo.it"
        );
        assert_eq!(by_key["91234567890"].pa_pec_email, "");
        assert_eq!(by_key["80001230376"].pa_referent_name, "Maria Rossi");
        assert_eq!(by_key["80001230376"].timestamp, "2024-05-06T10:00:00Z");

        let mut csv = csv::Reader::from_reader(out.as_slice());
        let headers = csv.headers().unwrap().clone();
        assert_eq!(headers.get(0), Some("PartitionKey"));
        assert_eq!(headers.get(1), Some("RowKey"));
        assert_eq!(headers.get(5), Some("PaIdCatasto"));
        assert_eq!(headers.get(7), Some("PaIdIstat"));
        let rows: Vec<ConfigRecord> = csv.deserialize().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].row_key, "80001230376", "registry order is preserved");
        assert_eq!(rows[0].partition_key, "org");
    }

    #[test]
    fn appends_supplement_records_last() {
        let mut out = Vec::new();
        let outcome = ectool::build_config(
            fixture("registry.csv"),
            fixture("iban_export.csv"),
            fixture("preferred_iban.csv"),
            fixture("ipa.csv"),
            fixture("istat.csv"),
            Some(fixture("supplement.csv")),
            &mut out,
            options(),
        )
        .unwrap();

        assert_eq!(outcome.records.len(), 7);
        let last = outcome.records.last().unwrap();
        assert_eq!(last.row_key, "84000730659");
        assert_eq!(last.company_name, "Comune di Ascea");
        assert_eq!(last.pa_id_istat, "065009");
    }

    #[test]
    fn malformed_activation_dates_abort_the_run() {
        let accounts = "id;codiceFiscale;denominazione;iban;bic;stato;dataAttivazione;descrizione\n\
                        1;80001230376;Comune di Vergato;IT60X0542811101000000123456;;ATTIVO;June 2023;Tesoreria\n";
        let err = ectool::build_config(
            fixture("registry.csv"),
            std::io::Cursor::new(accounts),
            fixture("preferred_iban.csv"),
            fixture("ipa.csv"),
            fixture("istat.csv"),
            None::<std::fs::File>,
            &mut Vec::new(),
            options(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("June 2023"));
    }
}

mod filter_institutions {
    use super::fixture;

    #[test]
    fn keeps_rows_in_keep_list_order_and_collects_the_missing() {
        let mut out = Vec::new();
        let mut missing_out = Vec::new();
        let outcome = ectool::filter_institutions(
            fixture("registry_full.csv"),
            fixture("keep.csv"),
            &mut out,
            &mut missing_out,
        )
        .unwrap();

        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.missing, ["99999999999"]);
        assert_eq!(String::from_utf8(missing_out).unwrap(), "99999999999\n");

        let mut csv = csv::Reader::from_reader(out.as_slice());
        assert_eq!(csv.headers().unwrap().get(2), Some("codiceFiscale"));
        assert_eq!(csv.headers().unwrap().len(), 33);
        let rows: Vec<csv::StringRecord> = csv.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(2), Some("80002150391"));
        assert_eq!(rows[1].get(2), Some("80001230376"));
        assert_eq!(
            rows[1].get(0),
            Some("Comune di Vergato"),
            "the first registry row wins when an institution is exported twice"
        );
    }
}

mod check_partner {
    use super::fixture;
    use ectool::check_partner::{Options, Outcome, ScanKey};

    fn check(scan_by: &str) -> Outcome {
        ectool::check_partner(
            fixture("partner.csv"),
            fixture("config_table.csv"),
            Options {
                scan_key: scan_by.parse().unwrap(),
            },
        )
        .unwrap()
    }

    #[test]
    fn by_fiscal_code() {
        let outcome = check("fiscal-code");
        assert_eq!(outcome.checked, 3);
        assert_eq!(outcome.missing, ["83000890155"]);
    }

    #[test]
    fn by_cadastral_code() {
        let outcome = check("cadastral-code");
        assert_eq!(outcome.missing, ["E063"]);
    }

    #[test]
    fn by_statistical_code() {
        let outcome = check("statistical-code");
        assert_eq!(outcome.missing, ["015108"]);
    }

    #[test]
    fn unknown_scan_keys_are_rejected() {
        assert!("row-key".parse::<ScanKey>().is_err());
    }
}

#[test]
fn normalize_cadastral_code() {
    for (input, expected) in [
        ("c_h501", "H501"),
        ("C_A460", "A460"),
        ("c_l810", "L810"),
        ("L810", "L810"),
        ("c_", ""),
        ("", ""),
    ] {
        assert_eq!(ectool::normalize_cadastral_code(input), expected, "{input}");
    }
}

#[test]
fn scrub_leaves_well_formed_ibans_alone() {
    assert_eq!(ectool::scrub_iban::scrub("IT60X0542811101000000123456"), None);
    assert_eq!(
        ectool::scrub_iban::scrub("IT60 X054 2811 1010 0000 0123 456").as_deref(),
        Some("IT60X0542811101000000123456")
    );
}
