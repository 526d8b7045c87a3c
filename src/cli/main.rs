//! CLI binary entry point for reporting-etl

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use reporting_etl::cli::commands::init::{InitArgs, handle_init};
use reporting_etl::cli::commands::queue::{QueueArgs, handle_queue};
use reporting_etl::cli::commands::run::{RunArgs, handle_run};
use reporting_etl::cli::commands::warehouse::{
    DataSourceArgs, MasterArgs, ProvisionArgs, RefreshArgs, handle_backfilter, handle_master,
    handle_post_process, handle_provision, handle_refresh,
};
use reporting_etl::cli::logging;

#[derive(Parser)]
#[command(name = "reporting-etl")]
#[command(about = "Provision, ingest and backfilter the reporting warehouse")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ./reporting-etl.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// `0` or `1`
fn flag_arg() -> clap::builder::RangedI64ValueParser<u8> {
    clap::value_parser!(u8).range(0..=1)
}

#[derive(Subcommand)]
enum Commands {
    /// Run one data source: pull, process, ingest, backfilter, post-process
    Run {
        /// Data source name
        data_source: String,
        #[arg(long, default_value_t = 1, value_parser = flag_arg())]
        pull: u8,
        #[arg(long, default_value_t = 1, value_parser = flag_arg())]
        ingest: u8,
        #[arg(long, default_value_t = 1, value_parser = flag_arg())]
        backfilter: u8,
        #[arg(long = "post-process", default_value_t = 1, value_parser = flag_arg())]
        post_process: u8,
        /// Skip provisioning and the dimension refresh
        #[arg(long, default_value_t = 0, value_parser = flag_arg())]
        expedited: u8,
        /// JSON records file (overrides the configured input)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Only load records whose FIELD falls inside the date window
        #[arg(long, value_name = "FIELD")]
        date_field: Option<String>,
        /// Run as if today were this date (YYYY-MM-DD)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Create every missing table
    Provision,
    /// Refresh lookup and source tables from the configuration workbook
    Refresh {
        /// Refresh even when today is not a refresh day
        #[arg(long)]
        force: bool,
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Resolve entity columns for one data source's table
    Backfilter { data_source: String },
    /// Run the post-processing SQL scripts for one data source
    PostProcess { data_source: String },
    /// Rebuild the master table
    Master,
    /// Run every queued data source in order
    Queue {
        #[arg(long)]
        today: Option<NaiveDate>,
        #[arg(long, default_value_t = 0, value_parser = flag_arg())]
        expedited: u8,
    },
    /// Write a sample configuration file
    Init {
        /// Target directory
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let config = cli.config;
    let result = match cli.command {
        Commands::Run {
            data_source,
            pull,
            ingest,
            backfilter,
            post_process,
            expedited,
            input,
            date_field,
            today,
        } => {
            let args = RunArgs {
                config,
                data_source,
                pull: pull == 1,
                ingest: ingest == 1,
                backfilter: backfilter == 1,
                post_process: post_process == 1,
                expedited: expedited == 1,
                input,
                date_field,
                today,
            };
            handle_run(&args)
        }
        Commands::Provision => handle_provision(&ProvisionArgs { config }),
        Commands::Refresh { force, today } => handle_refresh(&RefreshArgs {
            config,
            force,
            today,
        }),
        Commands::Backfilter { data_source } => handle_backfilter(&DataSourceArgs {
            config,
            data_source,
        }),
        Commands::PostProcess { data_source } => handle_post_process(&DataSourceArgs {
            config,
            data_source,
        }),
        Commands::Master => handle_master(&MasterArgs { config }),
        Commands::Queue { today, expedited } => handle_queue(&QueueArgs {
            config,
            today,
            expedited: expedited == 1,
        }),
        Commands::Init { dir, force } => handle_init(&InitArgs { dir, force }),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
