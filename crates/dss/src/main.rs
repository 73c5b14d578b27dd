//! DSS client and admin tool (dss).
//!
//! Talks to the manager for registration, volume management, and the
//! phase-1/phase-2 operations, and directly to the disk nodes for
//! block traffic.
//!
//! # Usage
//!
//! ```text
//! dss [OPTIONS] <COMMAND>
//!
//! Commands:
//!   register       Register a user with the manager
//!   deregister     Deregister a user
//!   configure      Configure a new DSS over free disks
//!   ls             List DSSs and their files
//!   copy           Copy a local file into a DSS
//!   read           Read a file back and verify parity
//!   disk-failure   Fail one random disk of a DSS and recover it
//!   decommission   Tear a DSS down and free its disks
//!   dump-state     Print the manager's internal state
//!
//! Options:
//!   -a, --address <ADDRESS>  Manager address [default: 127.0.0.1]
//!   -p, --port <PORT>        Manager port [default: 7400]
//!   -v, --verbose            Enable verbose logging
//! ```

mod common;
mod failure;
mod io;
mod volume;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dss_proto::defaults::DEFAULT_MANAGER_PORT;
use dss_proto::DssResult;
use tracing_subscriber::EnvFilter;

/// DSS client and admin tool.
#[derive(Parser)]
#[command(name = "dss", version, about = "DSS client tool")]
struct Cli {
    /// Manager address
    #[arg(short = 'a', long, default_value = "127.0.0.1")]
    address: String,

    /// Manager port
    #[arg(short = 'p', long, default_value_t = DEFAULT_MANAGER_PORT)]
    port: u16,

    /// Enable verbose/debug logging
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a user with the manager
    Register {
        /// User name (alphabetic, at most 15 characters)
        name: String,
        /// Address to advertise
        #[arg(long, default_value = "127.0.0.1")]
        advertise: String,
        /// Management port to advertise
        #[arg(long, default_value_t = 7600)]
        mgmt_port: u16,
        /// Command port to advertise
        #[arg(long, default_value_t = 7601)]
        cmd_port: u16,
    },
    /// Deregister a user
    Deregister { name: String },
    /// Configure a new DSS over n free disks
    Configure {
        /// DSS name (alphabetic, at most 15 characters)
        name: String,
        /// Number of member disks (at least 3)
        n: usize,
        /// Striping unit in bytes (power of two in [128, 1M])
        striping_unit: usize,
    },
    /// List DSSs, their disks, and their files
    Ls,
    /// Copy a local file into a DSS chosen by the manager
    Copy {
        /// Path of the file to copy
        path: PathBuf,
        /// Owning user
        #[arg(short = 'u', long)]
        user: String,
    },
    /// Read a file back, verify parity, and write it locally
    Read {
        /// DSS holding the file
        volume: String,
        /// File name
        file: String,
        /// Requesting user (must own the file)
        #[arg(short = 'u', long)]
        user: String,
        /// Output path (defaults to <file>.out)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
        /// Per-block probability of injecting a single-bit fault
        #[arg(long, default_value_t = 0.0)]
        corrupt: f64,
    },
    /// Fail one random member disk of a DSS and rebuild its blocks
    DiskFailure { volume: String },
    /// Tear a DSS down and release its disks
    Decommission { volume: String },
    /// Print the manager's internal state
    DumpState,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        common::exit_error(&e.to_string());
    }
}

async fn run(cli: Cli) -> DssResult<()> {
    let manager = common::manager_addr(&cli.address, cli.port)?;

    match cli.command {
        Commands::Register {
            name,
            advertise,
            mgmt_port,
            cmd_port,
        } => volume::register_user(manager, &name, &advertise, mgmt_port, cmd_port).await,
        Commands::Deregister { name } => volume::deregister_user(manager, &name).await,
        Commands::Configure {
            name,
            n,
            striping_unit,
        } => volume::configure(manager, &name, n, striping_unit).await,
        Commands::Ls => volume::ls(manager).await,
        Commands::Copy { path, user } => io::copy(manager, &path, &user).await,
        Commands::Read {
            volume,
            file,
            user,
            output,
            corrupt,
        } => io::read(manager, &volume, &file, &user, output, corrupt).await,
        Commands::DiskFailure { volume } => failure::disk_failure(manager, &volume).await,
        Commands::Decommission { volume } => failure::decommission(manager, &volume).await,
        Commands::DumpState => volume::dump_state(manager).await,
    }
}
