use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "hrrt-recon")]
#[command(about = "Archive HRRT scanner output and keep the scan index in step", long_about = None)]
pub struct Cli {
    /// Log at info level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Report copies that would be made without writing anything
    #[arg(long, global = true)]
    pub dummy: bool,

    /// Use the local database
    #[arg(long, global = true)]
    pub local: bool,

    /// Use the test roots, bucket and database
    #[arg(long, global = true)]
    pub test: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Parse scanner files in a directory and summarise subjects and scans
    Parse { dir: PathBuf },
    /// Copy scanner files from a directory to the backup tree, then to the cloud
    Archive { dir: PathBuf },
    /// Print checksums of scanner files in a directory
    Checksum { dir: PathBuf },
    /// Write synthetic scanner files into the ACS test root (requires --test)
    Makedata,
    /// Bring the index in line with every configured backend
    Reconcile,
    /// Check every ACS file has a verified copy downstream
    Verify,
    /// Delete everything under the test roots (requires --test)
    ClearTest,
    /// Print configuration values
    PrintConfig,
}
