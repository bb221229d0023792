//! Storekeep CLI - migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! storekeep migrate
//!
//! # Load the plan catalog and show it
//! storekeep plans sync config/plans.yaml
//! storekeep plans list
//!
//! # Promo codes
//! storekeep coupons create --code LAUNCH20 --kind percentage --value 20 --duration 3
//! storekeep coupons list
//! storekeep coupons deactivate LAUNCH20
//!
//! # Job queue
//! storekeep jobs stats
//! storekeep jobs retry-dead
//! storekeep jobs purge --older-than-days 30
//!
//! # Metafield editor layout
//! storekeep layout load config/layout.yaml
//! ```
//!
//! All commands read `DATABASE_URL` (a `.env` file is honoured).

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "storekeep")]
#[command(author, version, about = "Storekeep operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage the plan catalog
    Plans {
        #[command(subcommand)]
        action: PlansAction,
    },
    /// Manage promo codes
    Coupons {
        #[command(subcommand)]
        action: CouponsAction,
    },
    /// Inspect and maintain the job queue
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },
    /// Manage the metafield editor layout
    Layout {
        #[command(subcommand)]
        action: LayoutAction,
    },
}

#[derive(Subcommand)]
enum PlansAction {
    /// Upsert plans from a YAML catalog
    Sync {
        /// Path to the catalog file
        file: String,

        /// Deactivate plans missing from the file
        #[arg(long)]
        prune: bool,
    },
    /// List all plans
    List,
}

#[derive(Subcommand)]
enum CouponsAction {
    /// Create a promo code
    Create {
        /// Code merchants enter (case-insensitive)
        #[arg(short, long)]
        code: String,

        /// `percentage` or `fixed_amount`
        #[arg(short, long, default_value = "percentage")]
        kind: String,

        /// Percentage (0-100) or amount off
        #[arg(short, long)]
        value: String,

        /// Billing intervals the discount lasts (omit for forever)
        #[arg(short, long)]
        duration: Option<i32>,

        /// Restrict to one plan handle
        #[arg(short, long)]
        plan: Option<String>,

        /// Maximum number of shops that can redeem it
        #[arg(short, long)]
        max_redemptions: Option<i32>,

        /// Expiry date (YYYY-MM-DD, end of day UTC)
        #[arg(short, long)]
        expires: Option<String>,
    },
    /// List all promo codes
    List,
    /// Deactivate a promo code
    Deactivate {
        /// Code to deactivate
        code: String,
    },
}

#[derive(Subcommand)]
enum JobsAction {
    /// Job counts by kind and status
    Stats,
    /// Requeue every dead job
    RetryDead,
    /// Delete completed jobs
    Purge {
        /// Keep jobs completed within this many days
        #[arg(long, default_value_t = 30)]
        older_than_days: i64,
    },
}

#[derive(Subcommand)]
enum LayoutAction {
    /// Replace the layout with the contents of a YAML file
    Load {
        /// Path to the layout file
        file: String,
    },
    /// Print the current layout
    Show,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CliError> {
    let pool = commands::connect().await?;

    match cli.command {
        Commands::Migrate => commands::migrate::run(&pool).await?,
        Commands::Plans { action } => match action {
            PlansAction::Sync { file, prune } => commands::plans::sync(&pool, &file, prune).await?,
            PlansAction::List => commands::plans::list(&pool).await?,
        },
        Commands::Coupons { action } => match action {
            CouponsAction::Create {
                code,
                kind,
                value,
                duration,
                plan,
                max_redemptions,
                expires,
            } => {
                let args = commands::coupons::CreateArgs {
                    code,
                    kind,
                    value,
                    duration,
                    plan,
                    max_redemptions,
                    expires,
                };
                commands::coupons::create(&pool, &args).await?;
            }
            CouponsAction::List => commands::coupons::list(&pool).await?,
            CouponsAction::Deactivate { code } => commands::coupons::deactivate(&pool, &code).await?,
        },
        Commands::Jobs { action } => match action {
            JobsAction::Stats => commands::jobs::stats(&pool).await?,
            JobsAction::RetryDead => commands::jobs::retry_dead(&pool).await?,
            JobsAction::Purge { older_than_days } => {
                commands::jobs::purge(&pool, older_than_days).await?;
            }
        },
        Commands::Layout { action } => match action {
            LayoutAction::Load { file } => commands::layout::load(&pool, &file).await?,
            LayoutAction::Show => commands::layout::show(&pool).await?,
        },
    }
    Ok(())
}
