use std::fs::File;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};

use crate::application::{
    AppError, CredentialVerifier, LedgerService, StaticCredentials, DEFAULT_PASSWORD,
    DEFAULT_USERNAME,
};
use crate::domain::{
    coerce_numeric, format_amount, Category, Record, TableTotals, FOREIGN_DP, LOCAL_DP,
    QUANTITY_DP, RATE_DP,
};
use crate::io::{export_records_csv, import_records_csv};
use crate::storage::DEFAULT_WORKBOOK;

const LOGIN_ATTEMPTS: usize = 3;

/// MIS ledger - purchase and sales entry backed by an Excel workbook
#[derive(Parser)]
#[command(name = "mis-ledger")]
#[command(about = "Record purchase and sales entries and append them to an Excel workbook")]
#[command(version)]
pub struct Cli {
    /// Workbook file path
    #[arg(short, long, env = "MIS_WORKBOOK", default_value = DEFAULT_WORKBOOK)]
    pub workbook: PathBuf,

    /// Username to log in with (prompted for if omitted)
    #[arg(short, long, env = "MIS_USERNAME")]
    pub username: Option<String>,

    /// Password to log in with (prompted for if omitted)
    #[arg(short, long, env = "MIS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Username the ledger accepts
    #[arg(long, env = "MIS_APP_USERNAME", default_value = DEFAULT_USERNAME, hide = true)]
    pub app_username: String,

    /// Password the ledger accepts
    #[arg(long, env = "MIS_APP_PASSWORD", default_value = DEFAULT_PASSWORD, hide = true, hide_env_values = true)]
    pub app_password: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Defaults to an interactive session
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive session (add, review, save, summary)
    Shell,

    /// Add one entry and save it to the workbook straight away
    Record {
        /// purchase or sales
        #[arg(value_parser = parse_category)]
        category: Category,

        #[command(flatten)]
        entry: EntryArgs,
    },

    /// Show purchase, sales and gross profit totals (INR)
    Summary {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the saved records of a category
    Show {
        #[arg(value_parser = parse_category)]
        category: Category,
    },

    /// Write the saved ledger to a new workbook, or one category to CSV
    Export {
        /// Output file
        path: PathBuf,

        /// Export only this category, as CSV
        #[arg(long, value_parser = parse_category)]
        csv: Option<Category>,
    },
}

/// Fields of a purchase or sales entry
#[derive(Args, Debug, Clone)]
pub struct EntryArgs {
    /// Vendor or customer name
    #[arg(long, visible_aliases = ["vendor", "customer"])]
    pub party: String,

    /// Item rate in BHD
    #[arg(long, allow_negative_numbers = true)]
    pub rate: String,

    /// Quantity
    #[arg(long, visible_alias = "quantity", allow_negative_numbers = true)]
    pub qty: String,

    /// Date of the entry (YYYY-MM-DD, defaults to today)
    #[arg(long)]
    pub date: Option<String>,
}

impl EntryArgs {
    fn date(&self) -> Result<NaiveDate> {
        match &self.date {
            Some(date_str) => parse_date(date_str)
                .with_context(|| format!("Invalid date format '{}'. Use YYYY-MM-DD", date_str)),
            None => Ok(Local::now().date_naive()),
        }
    }
}

/// One line typed into the interactive session
#[derive(Parser)]
#[command(name = "mis", no_binary_name = true, disable_version_flag = true)]
struct SessionLine {
    #[command(subcommand)]
    command: SessionCommand,
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Queue a new entry (not saved until `save`)
    Add {
        #[arg(value_parser = parse_category)]
        category: Category,

        #[command(flatten)]
        entry: EntryArgs,
    },

    /// List queued entries with running totals
    Pending {
        #[arg(value_parser = parse_category)]
        category: Option<Category>,
    },

    /// List saved records of a category
    Show {
        #[arg(value_parser = parse_category)]
        category: Category,
    },

    /// Append all queued entries to the workbook
    Save,

    /// Drop queued entries without saving
    Discard {
        #[arg(value_parser = parse_category)]
        category: Option<Category>,
    },

    /// Replace the saved records of a category with an edited CSV table
    Apply {
        #[arg(value_parser = parse_category)]
        category: Category,

        /// CSV file with the same header as the workbook sheet
        path: PathBuf,
    },

    /// Show totals over saved records
    Summary {
        #[arg(long)]
        json: bool,
    },

    /// Write the session's ledger to a new workbook, or one category to CSV
    Export {
        path: PathBuf,

        #[arg(long, value_parser = parse_category)]
        csv: Option<Category>,
    },

    /// Re-read saved records from the workbook
    Reload,

    /// End the session; queued entries are dropped
    #[command(visible_aliases = ["exit", "logout"])]
    Quit,
}

impl Cli {
    fn verifier(&self) -> StaticCredentials {
        StaticCredentials::new(&self.app_username, &self.app_password)
    }

    pub fn run(self) -> Result<()> {
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        let mut out = std::io::stdout();

        let verifier = self.verifier();
        login(
            &verifier,
            self.username.as_deref(),
            self.password.as_deref(),
            &mut input,
            &mut out,
        )?;

        match self.command.unwrap_or(Commands::Shell) {
            Commands::Shell => {
                let mut service = open_session(self.workbook, &mut out)?;
                run_session(&mut service, &mut input, &mut out)?;
            }

            Commands::Record { category, entry } => {
                let mut service = LedgerService::open(self.workbook)?;
                let record = service.add(
                    category,
                    &entry.party,
                    coerce_numeric(&entry.rate),
                    coerce_numeric(&entry.qty),
                    entry.date()?,
                )?;
                service.save_category(category)?;
                writeln!(
                    out,
                    "Saved {} entry: {} x {} @ {} BHD = {} BHD / {} INR",
                    category,
                    record.counterparty,
                    format_amount(record.quantity, QUANTITY_DP),
                    format_amount(record.unit_rate, RATE_DP),
                    format_amount(record.foreign_currency_value, FOREIGN_DP),
                    format_amount(record.local_currency_value, LOCAL_DP)
                )?;
            }

            Commands::Summary { json } => {
                let service = LedgerService::open(self.workbook)?;
                print_summary(&service, json, &mut out)?;
            }

            Commands::Show { category } => {
                let service = LedgerService::open(self.workbook)?;
                print_records(
                    category,
                    service.committed(category),
                    service.committed_totals(category),
                    &mut out,
                )?;
            }

            Commands::Export { path, csv } => {
                let service = LedgerService::open(self.workbook)?;
                export(&service, &path, csv, &mut out)?;
            }
        }
        Ok(())
    }
}

/// Check credentials, prompting on `input` for whatever was not supplied.
///
/// Supplied credentials get one try; prompted ones get a few.
pub fn login<R: BufRead, W: Write>(
    verifier: &dyn CredentialVerifier,
    username: Option<&str>,
    password: Option<&str>,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    let attempts = if username.is_some() && password.is_some() {
        1
    } else {
        LOGIN_ATTEMPTS
    };

    for _ in 0..attempts {
        let user = match username {
            Some(u) => u.to_string(),
            None => prompt("Username: ", input, out)?,
        };
        let pass = match password {
            Some(p) => p.to_string(),
            None => prompt("Password: ", input, out)?,
        };

        match verifier.authenticate(&user, &pass) {
            Ok(()) => {
                tracing::info!(user = %user, "logged in");
                return Ok(());
            }
            Err(e) => writeln!(out, "{}. Try again.", e)?,
        }
    }
    Err(AppError::Authentication.into())
}

fn prompt<R: BufRead, W: Write>(label: &str, input: &mut R, out: &mut W) -> Result<String> {
    write!(out, "{}", label)?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("No input");
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Open the workbook for a session, falling back to an empty ledger if it cannot be read.
fn open_session<W: Write>(workbook: PathBuf, out: &mut W) -> Result<LedgerService> {
    match LedgerService::open(workbook.clone()) {
        Ok(service) => {
            writeln!(out, "Data is stored at: {}", workbook.display())?;
            Ok(service)
        }
        Err(e) => {
            tracing::warn!("{}", e);
            writeln!(out, "Warning: {}", e)?;
            writeln!(out, "Starting with an empty ledger; saving may fail until the file is fixed.")?;
            Ok(LedgerService::new(workbook))
        }
    }
}

/// Read and run session commands until `quit` or end of input.
///
/// Every command error is reported and the session carries on.
pub fn run_session<R: BufRead, W: Write>(
    service: &mut LedgerService,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    writeln!(out, "Type `help` for commands.")?;
    loop {
        write!(out, "mis> ")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let words = match split_words(&line) {
            Ok(words) => words,
            Err(e) => {
                writeln!(out, "Error: {}", e)?;
                continue;
            }
        };
        if words.is_empty() {
            continue;
        }

        let command = match SessionLine::try_parse_from(words) {
            Ok(parsed) => parsed.command,
            Err(e) => {
                // Covers `help` too, which clap reports as an "error".
                write!(out, "{}", e.render())?;
                continue;
            }
        };

        if matches!(command, SessionCommand::Quit) {
            break;
        }
        if let Err(e) = run_session_command(service, command, out) {
            tracing::debug!("command failed: {:#}", e);
            writeln!(out, "Error: {:#}", e)?;
        }
    }

    if service.ledger().has_pending() {
        writeln!(out, "Unsaved entries were discarded.")?;
    }
    Ok(())
}

fn run_session_command<W: Write>(
    service: &mut LedgerService,
    command: SessionCommand,
    out: &mut W,
) -> Result<()> {
    match command {
        SessionCommand::Add { category, entry } => {
            let record = service.add(
                category,
                &entry.party,
                coerce_numeric(&entry.rate),
                coerce_numeric(&entry.qty),
                entry.date()?,
            )?;
            writeln!(
                out,
                "{} entry added: {} = {} BHD / {} INR",
                category,
                record.counterparty,
                format_amount(record.foreign_currency_value, FOREIGN_DP),
                format_amount(record.local_currency_value, LOCAL_DP)
            )?;
        }

        SessionCommand::Pending { category } => {
            let categories = match category {
                Some(c) => vec![c],
                None => Category::ALL.to_vec(),
            };
            for category in categories {
                print_records(
                    category,
                    service.pending(category),
                    service.pending_totals(category),
                    out,
                )?;
            }
        }

        SessionCommand::Show { category } => {
            print_records(
                category,
                service.committed(category),
                service.committed_totals(category),
                out,
            )?;
        }

        SessionCommand::Save => {
            if !service.ledger().has_pending() {
                writeln!(out, "Nothing to save.")?;
            } else {
                let report = service.save()?;
                writeln!(
                    out,
                    "Saved {} purchase and {} sales entries to {}",
                    report.purchase,
                    report.sales,
                    service.workbook_path().display()
                )?;
            }
        }

        SessionCommand::Discard { category } => {
            let categories = match category {
                Some(c) => vec![c],
                None => Category::ALL.to_vec(),
            };
            let dropped: usize = categories.into_iter().map(|c| service.discard(c)).sum();
            writeln!(out, "Discarded {} pending entries", dropped)?;
        }

        SessionCommand::Apply { category, path } => {
            let file = File::open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            let result = import_records_csv(category, file).map_err(AppError::Import)?;
            let kept = service.apply_table(category, result.records);
            writeln!(
                out,
                "Applied edited {} table: {} rows kept, {} blank rows dropped",
                category, kept, result.skipped
            )?;
        }

        SessionCommand::Summary { json } => print_summary(service, json, out)?,

        SessionCommand::Export { path, csv } => export(service, &path, csv, out)?,

        SessionCommand::Reload => {
            service.reload()?;
            writeln!(out, "Reloaded {}", service.workbook_path().display())?;
        }

        SessionCommand::Quit => {}
    }
    Ok(())
}

fn export<W: Write>(
    service: &LedgerService,
    path: &std::path::Path,
    csv: Option<Category>,
    out: &mut W,
) -> Result<()> {
    match csv {
        Some(category) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let count = export_records_csv(category, service.committed(category), file)
                .map_err(AppError::Export)?;
            writeln!(out, "Exported {} {} records to {}", count, category, path.display())?;
        }
        None => {
            service.export_workbook(path)?;
            writeln!(out, "Exported workbook to {}", path.display())?;
        }
    }
    Ok(())
}

fn print_summary<W: Write>(service: &LedgerService, json: bool, out: &mut W) -> Result<()> {
    let summary = service.summary();
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;
        return Ok(());
    }

    writeln!(out, "Summary Overview")?;
    writeln!(
        out,
        "  Total Purchase (INR): {:>16}",
        format_amount(summary.total_purchase, LOCAL_DP)
    )?;
    writeln!(
        out,
        "  Total Sales (INR):    {:>16}",
        format_amount(summary.total_sales, LOCAL_DP)
    )?;
    writeln!(
        out,
        "  Gross Profit (INR):   {:>16}",
        format_amount(summary.gross_profit, LOCAL_DP)
    )?;
    Ok(())
}

fn print_records<W: Write>(
    category: Category,
    records: &[Record],
    totals: TableTotals,
    out: &mut W,
) -> Result<()> {
    if records.is_empty() {
        writeln!(out, "No {} entries.", category)?;
        return Ok(());
    }

    writeln!(out, "{}", category)?;
    writeln!(
        out,
        "{:<10}  {:<24} {:>10} {:>10} {:>14} {:>12}",
        "DATE",
        category.counterparty_label().to_uppercase(),
        "RATE (BHD)",
        "QUANTITY",
        "INR",
        "BHD"
    )?;
    writeln!(out, "{}", "-".repeat(86))?;
    for r in records {
        writeln!(
            out,
            "{:<10}  {:<24} {:>10} {:>10} {:>14} {:>12}",
            r.date.format("%Y-%m-%d"),
            r.counterparty,
            format_amount(r.unit_rate, RATE_DP),
            format_amount(r.quantity, QUANTITY_DP),
            format_amount(r.local_currency_value, LOCAL_DP),
            format_amount(r.foreign_currency_value, FOREIGN_DP)
        )?;
    }
    writeln!(
        out,
        "Total INR: {} | Total BHD: {}",
        format_amount(totals.total_local, LOCAL_DP),
        format_amount(totals.total_foreign, FOREIGN_DP)
    )?;
    Ok(())
}

/// Split a command line into words, honouring single and double quotes.
fn split_words(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for ch in line.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                in_word = true;
            }
            None if ch.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(ch);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        bail!("Unterminated quote");
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn parse_date(date_str: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")?)
}

fn parse_category(s: &str) -> Result<Category, String> {
    Category::from_str(s).ok_or_else(|| format!("unknown category '{}' (use purchase or sales)", s))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_split_words() -> Result<()> {
        assert_eq!(
            split_words("add purchase --party \"Acme Co\" --rate 2.5\n")?,
            vec!["add", "purchase", "--party", "Acme Co", "--rate", "2.5"]
        );
        assert_eq!(split_words("  ")?, Vec::<String>::new());
        assert_eq!(split_words("a '' b")?, vec!["a", "", "b"]);
        assert!(split_words("add \"open").is_err());
        Ok(())
    }

    #[test]
    fn test_parse_category() {
        assert_eq!(parse_category("purchase"), Ok(Category::Purchase));
        assert_eq!(parse_category("Sales"), Ok(Category::Sales));
        assert!(parse_category("refund").is_err());
    }

    #[test]
    fn test_session_line_parsing() {
        let line = SessionLine::try_parse_from([
            "add", "sales", "--customer", "Bob", "--rate", "1.5", "--qty", "2",
        ])
        .unwrap();
        match line.command {
            SessionCommand::Add { category, entry } => {
                assert_eq!(category, Category::Sales);
                assert_eq!(entry.party, "Bob");
                assert_eq!(entry.date, None);
            }
            _ => panic!("expected add"),
        }

        assert!(matches!(
            SessionLine::try_parse_from(["exit"]).unwrap().command,
            SessionCommand::Quit
        ));
        assert!(SessionLine::try_parse_from(["add", "refund"]).is_err());
    }

    #[test]
    fn test_login_with_supplied_credentials() {
        let verifier = StaticCredentials::default();
        let mut input = Cursor::new(Vec::new());
        let mut out = Vec::new();

        assert!(login(&verifier, Some("admin"), Some("admin123"), &mut input, &mut out).is_ok());
        assert!(login(&verifier, Some("admin"), Some("nope"), &mut input, &mut out).is_err());
    }

    #[test]
    fn test_login_prompts_and_retries() {
        let verifier = StaticCredentials::default();
        let mut input = Cursor::new(b"admin\nwrong\nadmin\nadmin123\n".to_vec());
        let mut out = Vec::new();

        assert!(login(&verifier, None, None, &mut input, &mut out).is_ok());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Invalid credentials. Try again."));
    }

    #[test]
    fn test_login_gives_up_at_end_of_input() {
        let verifier = StaticCredentials::default();
        let mut input = Cursor::new(b"admin\n".to_vec());
        let mut out = Vec::new();

        assert!(login(&verifier, None, None, &mut input, &mut out).is_err());
    }
}
