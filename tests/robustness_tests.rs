use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

const HEADER: &str = "action,merchant_no,merchant_tx_ref,amount,currency,channel_code,candidate_id";

fn run(rows: &[&str]) -> assert_cmd::assert::Assert {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "{HEADER}").unwrap();
    for row in rows {
        writeln!(csv, "{row}").unwrap();
    }
    Command::new(cargo_bin!("paygate"))
        .arg(csv.path())
        .arg("--catalog")
        .arg("tests/fixtures/catalog.json")
        .assert()
}

#[test]
fn test_unknown_action_is_skipped() {
    run(&["refund,M1,tx-1,10,BRL,PIX,", "create,M1,tx-2,10,BRL,PIX,"])
        .success()
        .stderr(predicate::str::contains("Error reading request"))
        .stdout(predicate::str::contains("create,M1,tx-2,P"))
        .stdout(predicate::str::contains("tx-1").not());
}

#[test]
fn test_malformed_amount_reported_per_row() {
    run(&["create,M1,tx-1,ten,BRL,PIX,", "create,M1,tx-2,,BRL,PIX,"])
        .success()
        .stdout(predicate::str::contains("create,M1,tx-1,,,,,malformed amount: ten"))
        .stdout(predicate::str::contains(
            "create,M1,tx-2,,,,,missing required field: amount",
        ));
}

#[test]
fn test_whitespace_and_short_rows_tolerated() {
    run(&["  create , M1 , tx-1 , 10.25 , brl , PIX ", "query, M1, tx-1"])
        .success()
        .stdout(predicate::str::contains("query,M1,tx-1,P"))
        .stdout(predicate::str::contains(",processing,10.25,,"));
}

#[test]
fn test_unknown_merchant_and_bad_candidate() {
    run(&["create,NOBODY,tx-1,10,BRL,PIX,", "create,M1,tx-2,10,BRL,PIX,not-a-number"])
        .success()
        .stdout(predicate::str::contains("merchant not found: NOBODY"))
        .stderr(predicate::str::contains("Error reading request"));
}

#[test]
fn test_empty_input_writes_nothing() {
    run(&[])
        .success()
        .stdout(predicate::str::is_empty());
}
