// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier - an always-on messaging integration engine.
//!
//! Binary entry point: the long-running `serve` process plus one-shot
//! administrative commands against the same database.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod admin;
mod runtime;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use courier_config::CourierConfig;

/// Courier - webhooks, reconciliation, trickle campaigns and compliance.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    /// Config file to load instead of the standard lookup hierarchy.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the gateway and every scheduled task until interrupted.
    Serve,
    /// Backfill provider history missed by webhooks.
    Reconcile {
        /// Overlap before the checkpoint, in seconds.
        #[arg(long)]
        lookback_secs: Option<u64>,
    },
    /// Manage trickle campaigns.
    #[command(subcommand)]
    Campaign(CampaignCommand),
    /// Print counts per status category as JSON.
    Status,
    /// Run the synthetic round-trip health check once.
    HealthCheck,
    /// List dead-lettered retry entries.
    DeadLetters {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Opt a contact out administratively.
    OptOut {
        contact: String,
        #[arg(long, default_value = "admin")]
        reason: String,
    },
    /// Opt a contact back in administratively.
    OptIn { contact: String },
}

#[derive(Subcommand, Debug)]
enum CampaignCommand {
    /// Create a draft campaign.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        body: String,
        #[arg(long)]
        daily_cap: u32,
        #[arg(long)]
        batch_size: Option<u32>,
    },
    /// Append contacts, one per line, from a file or stdin (`-`).
    AddMembers { campaign_id: String, file: PathBuf },
    Activate { campaign_id: String },
    Pause { campaign_id: String },
    Resume { campaign_id: String },
}

fn load_config(path: Option<&PathBuf>) -> CourierConfig {
    let loaded = match path {
        Some(path) => courier_config::load_and_validate_path(path),
        None => courier_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            courier_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Reconcile { lookback_secs }) => admin::reconcile(config, lookback_secs).await,
        Some(Commands::Campaign(cmd)) => match cmd {
            CampaignCommand::Create {
                name,
                body,
                daily_cap,
                batch_size,
            } => admin::create_campaign(config, name, body, daily_cap, batch_size).await,
            CampaignCommand::AddMembers { campaign_id, file } => {
                admin::add_members(config, &campaign_id, &file).await
            }
            CampaignCommand::Activate { campaign_id } => {
                admin::transition(config, &campaign_id, admin::Transition::Activate).await
            }
            CampaignCommand::Pause { campaign_id } => {
                admin::transition(config, &campaign_id, admin::Transition::Pause).await
            }
            CampaignCommand::Resume { campaign_id } => {
                admin::transition(config, &campaign_id, admin::Transition::Resume).await
            }
        },
        Some(Commands::Status) => admin::status(config).await,
        Some(Commands::HealthCheck) => admin::health_check(config).await,
        Some(Commands::DeadLetters { limit }) => admin::dead_letters(config, limit).await,
        Some(Commands::OptOut { contact, reason }) => {
            admin::opt_out(config, &contact, &reason).await
        }
        Some(Commands::OptIn { contact }) => admin::opt_in(config, &contact).await,
        None => {
            println!("courier: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
