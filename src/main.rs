//! CLI entry point for `p7mfix`.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use p7mfix::batch::{Phase, RepairOptions, RepairReport, Repairer};
use p7mfix::config::Config;
use p7mfix::imap::{ImapOps, ImapSession, Uid};
use p7mfix::model::candidate::{CandidateSet, StructureFetch};
use p7mfix::parser::{eml, mime};
use p7mfix::rewrite;

/// Characters of the raw message printed by `show`.
const SHOW_CHARS: usize = 1000;

#[derive(Parser)]
#[command(
    name = "p7mfix",
    version,
    about = "Repair IMAP messages whose S/MIME payload arrived as a plain smime.p7m attachment"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: $P7MFIX_CONFIG or the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List the folders on the server
    Folders,
    /// Find mis-wrapped messages in a folder (read-only)
    Scan {
        #[arg(short, long)]
        folder: String,
        #[arg(long)]
        json: bool,
    },
    /// Rewrite mis-wrapped messages and store the repaired copies
    Fix {
        #[arg(short, long)]
        folder: String,
        /// Only repair these UIDs (default: every candidate)
        #[arg(long = "uid", value_name = "UID")]
        uids: Vec<Uid>,
        /// Append repaired messages to this folder
        #[arg(long, value_name = "FOLDER")]
        upload_to: Option<String>,
        /// Copy originals to this folder and flag them \Deleted
        #[arg(long, value_name = "FOLDER")]
        trash_to: Option<String>,
        /// Also write repaired messages as .eml files here
        #[arg(long, value_name = "DIR")]
        save_dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Permanently remove messages flagged \Deleted in a folder
    Expunge {
        #[arg(short, long)]
        folder: String,
    },
    /// Rewrite a local .eml file
    Rewrite {
        file: PathBuf,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show where a message lives and the start of its source
    Show {
        #[arg(short, long)]
        folder: String,
        #[arg(long)]
        uid: Uid,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = p7mfix::config::load_config(cli.config.as_deref())?;

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Folders => cmd_folders(&config),
        Commands::Scan { folder, json } => cmd_scan(&config, &folder, json),
        Commands::Fix {
            folder,
            uids,
            upload_to,
            trash_to,
            save_dir,
            json,
        } => {
            let mut options = config.repair.to_options();
            if upload_to.is_some() {
                options.upload_folder = upload_to;
            }
            if trash_to.is_some() {
                options.trash_folder = trash_to;
            }
            if save_dir.is_some() {
                options.save_dir = save_dir;
            }
            cmd_fix(&config, &folder, &uids, options, json)
        }
        Commands::Expunge { folder } => cmd_expunge(&config, &folder),
        Commands::Rewrite { file, output } => cmd_rewrite(&config, &file, output.as_deref()),
        Commands::Show { folder, uid } => cmd_show(&config, &folder, uid),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_path = p7mfix::config::log_file_path(config);
    match (log_path.parent(), log_path.file_name()) {
        (Some(log_dir), Some(log_name)) if std::fs::create_dir_all(log_dir).is_ok() => {
            let file_appender = tracing_appender::rolling::never(log_dir, log_name);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        _ => {
            // Fall back to stderr only
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
        }
    }
}

/// Connect and log in, prompting for the password when the config has none.
fn connect(config: &Config) -> anyhow::Result<ImapSession> {
    let server = &config.main;
    server.validate()?;
    let password = match &server.password {
        Some(password) => password.clone(),
        None => rpassword::prompt_password(format!("Password for {}: ", server.username))?,
    };
    ImapSession::connect(server, &password)
        .with_context(|| format!("Could not log in to {}", server.host))
}

fn progress_bar() -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg:<12} [{bar:40.cyan/blue}] {pos}/{len}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Structures => "Structures",
        Phase::Scan => "Scanning",
        Phase::Repair => "Repairing",
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "p7mfix", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::stdout().write_all(&buf)?;
    Ok(())
}

fn cmd_folders(config: &Config) -> anyhow::Result<()> {
    let mut session = connect(config)?;
    let folders = session.list_folders()?;
    for folder in &folders {
        println!("{}", folder.name);
    }
    session.logout()?;
    Ok(())
}

/// Fetch structures for every UID in the selected folder and scan them.
fn find_candidates(
    session: &mut ImapSession,
    options: RepairOptions,
) -> anyhow::Result<(BTreeMap<Uid, StructureFetch>, CandidateSet)> {
    let uids = session.search("ALL")?;
    let pb = progress_bar()?;
    let progress = |phase: Phase, done: usize, total: usize| {
        pb.set_message(phase_label(phase));
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    };

    let mut repairer = Repairer::new(session, options).with_progress(&progress);
    let structures = repairer.fetch_structures(&uids)?;
    let candidates = repairer.find_candidates(&structures)?;
    pb.finish_and_clear();
    Ok((structures, candidates))
}

fn cmd_scan(config: &Config, folder: &str, json: bool) -> anyhow::Result<()> {
    let mut session = connect(config)?;
    let info = session.select_folder(folder, true)?;
    let start = Instant::now();
    let (structures, candidates) = find_candidates(&mut session, config.repair.to_options())?;
    let elapsed = start.elapsed();
    session.logout()?;

    if json {
        let output = serde_json::json!({
            "folder": info.name,
            "uid_validity": info.uid_validity,
            "scanned": structures.len(),
            "candidates": candidates.values().collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_candidates_table(&candidates);
        println!(
            "  {} candidate(s) among {} message(s) in {:.2?}",
            candidates.len(),
            structures.len(),
            elapsed
        );
        println!();
    }
    Ok(())
}

fn cmd_fix(
    config: &Config,
    folder: &str,
    uids: &[Uid],
    options: RepairOptions,
    json: bool,
) -> anyhow::Result<()> {
    if options.upload_folder.is_none() && options.save_dir.is_none() {
        eprintln!("  No --upload-to or --save-dir: repaired messages will not be stored");
    }

    let mut session = connect(config)?;
    session.select_folder(folder, false)?;
    let (_, mut candidates) = find_candidates(&mut session, options.clone())?;

    let chosen: Vec<Uid> = if uids.is_empty() {
        candidates.keys().copied().collect()
    } else {
        uids.to_vec()
    };
    if chosen.is_empty() {
        println!("  No candidates in {folder}.");
        session.logout()?;
        return Ok(());
    }

    let pb = progress_bar()?;
    pb.set_message(phase_label(Phase::Repair));
    pb.set_length(chosen.len() as u64);
    let progress = |_phase: Phase, done: usize, _total: usize| pb.set_position(done as u64);
    let reports = Repairer::new(&mut session, options)
        .with_progress(&progress)
        .repair(&mut candidates, &chosen)?;
    pb.finish_and_clear();
    session.logout()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_reports_table(&reports);
    }
    Ok(())
}

fn cmd_expunge(config: &Config, folder: &str) -> anyhow::Result<()> {
    let mut session = connect(config)?;
    session.select_folder(folder, false)?;
    let removed = session.expunge()?;
    session.logout()?;
    println!("  Expunged {removed} message(s) from {folder}");
    Ok(())
}

fn cmd_rewrite(config: &Config, file: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let original = eml::load_eml(file)?;
    let options = config.repair.to_options();
    let rewritten = rewrite::rewrite_with(&original, &options.rewrite)
        .with_context(|| format!("Could not rewrite {}", file.display()))?;
    let bytes = rewritten.to_bytes();

    match output {
        Some(path) => {
            std::fs::write(path, &bytes)
                .with_context(|| format!("Could not write {}", path.display()))?;
            print_summary(&mime::summarize(&rewritten));
            println!("  {:<14} {}", "Written to", path.display());
            println!();
        }
        None => std::io::stdout().write_all(&bytes)?,
    }
    Ok(())
}

fn cmd_show(config: &Config, folder: &str, uid: Uid) -> anyhow::Result<()> {
    let mut session = connect(config)?;
    let info = session.select_folder(folder, true)?;
    let raw = session.fetch_message(uid)?;
    let host = session.host().to_string();
    session.logout()?;

    println!("Server:      {host}");
    println!("Folder:      {}", info.name);
    match info.uid_validity {
        Some(validity) => println!("UIDVALIDITY: {validity}"),
        None => println!("UIDVALIDITY: -"),
    }
    println!("UID:         {uid}");
    println!();
    let text: String = String::from_utf8_lossy(&raw).chars().take(SHOW_CHARS).collect();
    println!("{text}");
    Ok(())
}

/// Print candidates as a human-readable table.
fn print_candidates_table(candidates: &CandidateSet) {
    println!();
    if candidates.is_empty() {
        println!("  No candidates found.");
        println!();
        return;
    }

    println!(
        "  {:>8} {:<17} {:<25} {:<40}",
        "UID", "Date", "From", "Subject"
    );
    println!("  {}", "-".repeat(93));

    for record in candidates.values() {
        let date = record
            .date_sent
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let from: String = record.sender().chars().take(24).collect();
        let subject: String = record.subject.chars().take(39).collect();
        println!("  {:>8} {:<17} {:<25} {:<40}", record.uid, date, from, subject);
    }
    println!();
}

/// Print repair outcomes as a human-readable table.
fn print_reports_table(reports: &[RepairReport]) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {:>8} {:<12} {:>10}  {}", "UID", "State", "Size", "Stored");
    println!("  {}", "-".repeat(60));
    for report in reports {
        let mut stored = Vec::new();
        if let Some(folder) = &report.uploaded_to {
            stored.push(folder.clone());
        }
        if let Some(path) = &report.saved_to {
            stored.push(path.display().to_string());
        }
        println!(
            "  {:>8} {:<12} {:>10}  {}",
            report.uid,
            format!("{:?}", report.state),
            format_size(report.bytes, BINARY),
            stored.join(", ")
        );
    }
    println!();
    println!("  Repaired {} message(s)", reports.len());
    println!();
}

/// Print a message summary in a human-readable table.
fn print_summary(summary: &mime::MessageSummary) {
    use humansize::{format_size, BINARY};

    let from: Vec<String> = summary.from.iter().map(|a| a.display()).collect();
    println!();
    println!("  {:<14} {}", "Subject", summary.subject);
    println!("  {:<14} {}", "From", from.join(", "));
    if let Some(date) = summary.date {
        println!("  {:<14} {}", "Date", date.format("%Y-%m-%d %H:%M"));
    }
    println!("  {:<14} {}", "Content-Type", summary.content_type);
    println!("  {:<14} {}", "Parts", summary.part_count);
    println!("  {:<14} {}", "Size", format_size(summary.size, BINARY));
    if let Some(preview) = &summary.text_preview {
        println!();
        for line in preview.lines().take(8) {
            println!("  | {line}");
        }
    }
}
