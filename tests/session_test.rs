mod common;

use std::fs;
use std::io::Cursor;

use anyhow::Result;
use common::{dec, test_service};
use mis_ledger::application::LedgerService;
use mis_ledger::cli::run_session;
use mis_ledger::Category;

fn run_script(service: &mut LedgerService, script: &str) -> Result<String> {
    let mut input = Cursor::new(script.as_bytes().to_vec());
    let mut out = Vec::new();
    run_session(service, &mut input, &mut out)?;
    Ok(String::from_utf8(out)?)
}

#[test]
fn test_session_add_save_summary() -> Result<()> {
    let (mut service, path, _temp) = test_service()?;

    let output = run_script(
        &mut service,
        "add purchase --vendor \"Acme Co\" --rate 2.500 --qty 10 --date 2024-01-05\n\
         add sales --customer Bob --rate 3 --qty 12 --date 2024-01-06\n\
         pending\n\
         save\n\
         summary\n\
         quit\n",
    )?;

    assert!(output.contains("Purchase entry added: Acme Co = 25.000 BHD / 10,000.00 INR"));
    assert!(output.contains("Total INR: 10,000.00 | Total BHD: 25.000"));
    assert!(output.contains("Saved 1 purchase and 1 sales entries"));
    assert!(output.contains("Gross Profit (INR):"));
    assert!(output.contains("2,000.00"));
    assert!(!output.contains("Unsaved entries were discarded."));

    assert!(path.exists());
    let reopened = LedgerService::open(&path)?;
    assert_eq!(reopened.summary().gross_profit, dec("2000"));
    Ok(())
}

#[test]
fn test_session_survives_bad_input() -> Result<()> {
    let (mut service, _path, _temp) = test_service()?;

    let output = run_script(
        &mut service,
        "add purchase --vendor \"\" --rate abc --qty 1\n\
         add refund --vendor X --rate 1 --qty 1\n\
         add sales --customer \"Unclosed --rate 1 --qty 1\n\
         frobnicate\n\
         add sales --customer Eve --rate 1 --qty 2 --date 2024-05-01\n",
    )?;

    assert!(output.contains("counterparty must not be empty; unit_rate must be greater than zero"));
    assert!(output.contains("unknown category 'refund'"));
    assert!(output.contains("Unterminated quote"));
    assert!(output.contains("Sales entry added: Eve"));
    // Input ended without a save
    assert!(output.contains("Unsaved entries were discarded."));
    assert_eq!(service.pending(Category::Sales).len(), 1);
    assert!(service.pending(Category::Purchase).is_empty());
    Ok(())
}

#[test]
fn test_session_failed_save_is_reported() -> Result<()> {
    let (mut service, path, _temp) = test_service()?;
    fs::write(&path, b"locked or corrupt")?;

    let output = run_script(
        &mut service,
        "add sales --customer Bob --rate 1 --qty 1 --date 2024-01-01\n\
         save\n\
         pending sales\n",
    )?;

    assert!(output.contains("Error: Could not save Sales"));
    assert!(output.contains("Bob"));
    assert_eq!(service.pending(Category::Sales).len(), 1);
    Ok(())
}

#[test]
fn test_session_apply_and_export() -> Result<()> {
    let (mut service, _path, temp) = test_service()?;
    let edited = temp.path().join("edited.csv");
    fs::write(
        &edited,
        "Date,Customer,Item Rate (BHD),Quantity,INR,BHD\n\
         2024-01-01,Bob,2,3,1,1\n\
         2024-01-02,,5,5,5,5\n",
    )?;
    let csv_out = temp.path().join("sales.csv");

    let script = format!(
        "apply sales \"{}\"\napply sales \"{}\"\nshow sales\nexport \"{}\" --csv sales\n",
        edited.display(),
        edited.display(),
        csv_out.display()
    );
    let output = run_script(&mut service, &script)?;

    assert!(output.contains("Applied edited Sales table: 1 rows kept, 1 blank rows dropped"));
    assert_eq!(service.committed(Category::Sales).len(), 1);
    assert_eq!(
        service.committed(Category::Sales)[0].local_currency_value,
        dec("3000")
    );
    assert!(output.contains("Exported 1 Sales records"));

    let exported = fs::read_to_string(&csv_out)?;
    assert!(exported.starts_with("Date,Customer,Item Rate (BHD),Quantity,INR,BHD\n"));
    assert!(exported.contains("2024-01-01,Bob,2,3,3000,6"));
    Ok(())
}

#[test]
fn test_session_discard() -> Result<()> {
    let (mut service, path, _temp) = test_service()?;

    let output = run_script(
        &mut service,
        "add purchase --vendor A --rate 1 --qty 1\n\
         add sales --customer B --rate 1 --qty 1\n\
         discard purchase\n\
         discard\n\
         save\n",
    )?;

    assert!(output.contains("Discarded 1 pending entries"));
    assert!(output.contains("Nothing to save."));
    assert!(!service.ledger().has_pending());
    assert!(!path.exists());
    Ok(())
}
