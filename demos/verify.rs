//! cargo run --example verify -- tests/data/chain.pem records.json <signature>
//!
//! `records.json` is either a JSON array of records or a collection listing
//! with the records under `data`.

use content_signature::{RecordSet, Value, Verifier};

use std::process::ExitCode;

fn main() -> ExitCode {
    stderrlog::new()
        .verbosity(3)
        .timestamp(stderrlog::Timestamp::Microsecond)
        .init()
        .unwrap();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [chain_path, records_path, signature] = args.as_slice() else {
        eprintln!("usage: verify <chain.pem> <records.json> <signature>");
        return ExitCode::from(2);
    };

    let chain: String = std::fs::read_to_string(chain_path).expect("Failed to read chain");
    let json: String = std::fs::read_to_string(records_path).expect("Failed to read records");

    let records: Vec<Value> = match Value::parse(&json).expect("Invalid records JSON") {
        Value::Array(items) => items,
        listing => match listing.get("data") {
            Some(Value::Array(items)) => items.clone(),
            _ => panic!("{records_path} is neither an array nor a listing with data"),
        },
    };

    let set: RecordSet = RecordSet::new(records.iter().cloned()).expect("Invalid records");
    log::info!("{} live records, sha256 {}", set.len(), set.hash());

    match Verifier::default().verify_records(&records, signature, &chain) {
        Ok(true) => {
            println!("signature valid");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            println!("signature INVALID");
            ExitCode::FAILURE
        }
        Err(e) => {
            println!("verification error: {e}");
            ExitCode::FAILURE
        }
    }
}
