//! `FieldVault` log inspection CLI.
//!
//! Operates on log files exported from a storage card: verifies the
//! hash chain, reports the chain head, and prints records.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fv_chain::{SCHEMA_HEADER, line_hash};
use fv_logger::{VerificationResult, verify};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// `FieldVault` log inspection CLI.
#[derive(Parser)]
#[command(name = "fv-admin")]
#[command(about = "FieldVault log inspection CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify the hash chain of an exported log.
    Verify {
        /// Path to the exported log file.
        file: PathBuf,
    },

    /// Print the chain head and record count.
    Head {
        /// Path to the exported log file.
        file: PathBuf,
    },

    /// Print log records.
    Show {
        /// Path to the exported log file.
        file: PathBuf,

        /// Only print the last N records.
        #[arg(short, long)]
        last: Option<usize>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "fv_admin=info,fv_logger=info".parse().expect("valid filter")
        }))
        .with(fmt::layer())
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Verify { file } => {
            let text = load_log(&file)?;
            match verify(&text)? {
                VerificationResult::Verified { records } => {
                    println!("OK: {records} record(s), chain intact");
                    Ok(ExitCode::SUCCESS)
                }
                VerificationResult::TamperedGenesis => {
                    println!("TAMPERED: first record does not start the chain at genesis");
                    Ok(ExitCode::FAILURE)
                }
                VerificationResult::Tampered { index } => {
                    println!("TAMPERED: chain breaks at record {index}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }

        Commands::Head { file } => {
            let text = load_log(&file)?;
            let records = records_after_header(&text)?;
            println!("Records: {}", records.len());
            match records.last() {
                Some(line) => println!("Head: {}", line_hash(line)),
                None => println!("Head: genesis (empty log)"),
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Show { file, last } => {
            let text = load_log(&file)?;
            let records = records_after_header(&text)?;
            let skip = match last {
                Some(n) => records.len().saturating_sub(n),
                None => 0,
            };
            for (i, line) in records.iter().enumerate().skip(skip) {
                println!("[{i}] {line}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Validates the schema header and returns the record lines after it.
///
/// A foreign header means a different logger generation wrote the
/// file; reporting a head hash or record count for it would be
/// misleading, so every subcommand refuses it the same way.
fn records_after_header(text: &str) -> Result<Vec<&str>> {
    let mut lines = text.lines();
    let header = lines.next().unwrap_or("");
    anyhow::ensure!(
        header == SCHEMA_HEADER,
        "not a FieldVault log: first line is {header:?}"
    );
    Ok(lines.collect())
}

/// Reads an exported log, discarding any trailing NUL padding left
/// over from a raw card image dump.
fn load_log(path: &Path) -> Result<String> {
    let raw = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8(raw[..end].to_vec())
        .with_context(|| format!("{} is not UTF-8 text", path.display()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use fv_chain::{GENESIS, LogRecord, SCHEMA_HEADER};
    use fv_types::{Activity, Sample};

    use super::*;

    fn sample_log() -> String {
        let sample = Sample {
            timestamp: "2026-03-14T09:26:53".into(),
            rf_power_dbm: -61.32,
            lat: 51.470012,
            lon: -0.454299,
            altitude_m: 24.7,
            activity: Activity::Still,
        };
        let record = LogRecord::from_sample(&sample, GENESIS);
        format!("{SCHEMA_HEADER}\n{}\n", record.canonical_line())
    }

    #[test]
    fn foreign_header_is_refused_for_inspection() {
        assert!(records_after_header("time,value\n1,2").is_err());
        assert!(records_after_header("").is_err());

        let log = sample_log();
        let records = records_after_header(&log).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn load_log_strips_image_padding() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let text = sample_log();
        file.write_all(text.as_bytes()).unwrap();
        file.write_all(&[0u8; 512]).unwrap();

        let loaded = load_log(file.path()).unwrap();
        assert_eq!(loaded, text);
        assert!(verify(&loaded).unwrap().is_verified());
    }
}
