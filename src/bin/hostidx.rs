//! hostidx: CLI tool for building and inspecting hostblock index files.

use clap::{Parser, Subcommand};
use hostblock::tokenizer::{strip_supported_wildcard, HostTokenizer};
use hostblock::{IndexBuilder, IndexReader};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "hostidx")]
#[command(version)]
#[command(about = "Build and inspect hostblock binary index files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a binary index from one or more hosts files
    Build {
        /// Input hosts files, merged in order
        #[arg(short, long, required = true)]
        input: Vec<PathBuf>,

        /// Output index file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Validate an index file and print its header
    Check {
        /// Index file to check
        index: PathBuf,
    },

    /// Look up hostnames in an index
    Query {
        /// Index file to query
        #[arg(short, long)]
        index: PathBuf,

        /// Hostnames to look up
        #[arg(required = true)]
        hosts: Vec<String>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> hostblock::Result<ExitCode> {
    match cli.command {
        Commands::Build { input, output } => {
            let mut builder = IndexBuilder::new();
            let mut processed = 0u64;
            for path in &input {
                let mut tokenizer = HostTokenizer::new(fs::File::open(path)?);
                while let Some(entry) = tokenizer.next_entry()? {
                    let host = if entry.wildcard {
                        match strip_supported_wildcard(entry.host) {
                            Some(stripped) => stripped,
                            None => continue,
                        }
                    } else {
                        entry.host
                    };
                    let host = String::from_utf8_lossy(host).to_ascii_lowercase();
                    if host == "localhost" {
                        continue;
                    }
                    processed += 1;
                    builder.add(&host);
                }
            }
            builder.persist(&output)?;
            println!(
                "Indexed {} unique of {} entries into {}",
                builder.len(),
                processed,
                output.display()
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::Check { index } => {
            let reader = IndexReader::open(&index, true)?;
            let header = reader.header();
            println!("File:      {}", index.display());
            println!("Version:   {}", header.version);
            println!("Entries:   {}", header.entry_count);
            println!("Buckets:   {}", header.bucket_count);
            println!("Payload:   {} bytes", header.payload_size);
            println!("Timestamp: {}", header.timestamp);
            println!("Checksum:  OK");
            Ok(ExitCode::SUCCESS)
        }

        Commands::Query { index, hosts } => {
            let reader = IndexReader::open(&index, false)?;
            let mut any_blocked = false;
            for host in &hosts {
                let host = host.to_ascii_lowercase();
                let blocked = reader.contains(host.trim_end_matches('.'));
                any_blocked |= blocked;
                println!("{}\t{}", host, if blocked { "BLOCKED" } else { "ALLOWED" });
            }
            // grep-style exit code: success when something matched
            Ok(if any_blocked {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
