//! CLI interface: command definitions and handlers.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "conflux",
    version,
    about = "Event correlator: dedup, parent/child suppression, ITSM ticketing"
)]
pub struct Cli {
    /// Path to a config file (defaults to ./conflux.yaml plus CONFLUX_* env)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP ingress server
    Serve,

    /// Run a correlation worker with the periodic housekeeping scheduler
    Worker,

    /// Run the SNMP trap listener
    StartSnmpListener,

    /// Bulk-load asset topology documents into the store
    LoadAssetMapping {
        /// Path of the asset mapping JSON file
        file: PathBuf,

        /// Execute the enrich policy after loading
        #[arg(short, long)]
        enrich: bool,
    },

    /// Reconcile ingest pipelines and enrich policies with the rule tables
    UpdatePipelines,

    /// Push the events index template
    UpdateIndexTemplate,

    /// Drive a scripted sequence of events against a running instance
    TestCase {
        /// Test case id to execute
        case: String,

        /// Perform setup (required the first time)
        #[arg(short, long)]
        setup: bool,

        /// Directory holding the test case fixtures
        #[arg(long, default_value = "fixtures")]
        data_dir: PathBuf,
    },
}
