use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{parse_listing, RosterEntry};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_URL: &str = "http://127.0.0.1:5000";

#[derive(Parser)]
#[command(name = "rollcall", about = "rollcall attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish the current session to the attendance store now
    Upload {
        /// Base URL of a running rollcalld
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
    /// Show the daemon's session status
    Status {
        /// Base URL of a running rollcalld
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
    /// Check a roster JSON file before handing it to the daemon
    Roster {
        /// Path to the roster listing
        file: PathBuf,
    },
}

#[derive(Deserialize)]
struct UploadReply {
    status: String,
    session_id: String,
}

#[derive(Deserialize)]
struct StatusReply {
    session_id: String,
    started_at: String,
    connected: bool,
    recognized: usize,
    uploaded: bool,
    roster_size: usize,
}

/// Counts of what a roster file will and will not contribute.
#[derive(Debug, Default, PartialEq, Eq)]
struct RosterSummary {
    entries: usize,
    missing_reg_no: usize,
    missing_photo: usize,
    duplicate_reg_no: usize,
}

impl RosterSummary {
    fn of(entries: &[RosterEntry]) -> Self {
        let mut summary = Self {
            entries: entries.len(),
            ..Self::default()
        };
        let mut seen = HashSet::new();
        for entry in entries {
            match entry.reg_no.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
                Some(id) => {
                    if !seen.insert(id) {
                        summary.duplicate_reg_no += 1;
                    }
                }
                None => summary.missing_reg_no += 1,
            }
            if entry.photo_url.as_deref().map_or(true, |p| p.trim().is_empty()) {
                summary.missing_photo += 1;
            }
        }
        summary
    }
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

fn read_roster(path: &Path) -> Result<Vec<RosterEntry>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    parse_listing(&text).with_context(|| format!("{} is not a roster listing", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    match cli.command {
        Commands::Upload { url } => {
            let url = endpoint(&url, "upload_attendance");
            tracing::debug!(%url, "requesting upload");
            let reply: UploadReply = client
                .post(&url)
                .send()
                .await
                .with_context(|| format!("cannot reach rollcalld at {url}"))?
                .error_for_status()?
                .json()
                .await?;
            println!("{}: {}", reply.status, reply.session_id);
        }
        Commands::Status { url } => {
            let url = endpoint(&url, "status");
            let reply: StatusReply = client
                .get(&url)
                .send()
                .await
                .with_context(|| format!("cannot reach rollcalld at {url}"))?
                .error_for_status()?
                .json()
                .await?;
            println!("session:     {}", reply.session_id);
            println!("started:     {}", reply.started_at);
            let client = if reply.connected { "connected" } else { "not connected" };
            println!("client:      {client}");
            println!("recognized:  {} of {}", reply.recognized, reply.roster_size);
            println!("uploaded:    {}", if reply.uploaded { "yes" } else { "no" });
        }
        Commands::Roster { file } => {
            let entries = read_roster(&file)?;
            let summary = RosterSummary::of(&entries);
            println!("entries:           {}", summary.entries);
            println!("missing reg_no:    {}", summary.missing_reg_no);
            println!("missing photo_url: {}", summary.missing_photo);
            println!("duplicate reg_no:  {}", summary.duplicate_reg_no);
            if summary.missing_reg_no + summary.missing_photo + summary.duplicate_reg_no > 0 {
                println!("entries with problems are skipped when the daemon loads the roster");
            }
        }
    }

    Ok(())
}
