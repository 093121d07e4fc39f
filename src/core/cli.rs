use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "optcoin-bot")]
#[command(about = "Multi-account order automation for the OPTCOIN site", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Log every account in and refresh its saved session
    Login {
        /// Accounts file (CSV or JSON); falls back to OPTCOIN_USERNAME/OPTCOIN_PASSWORD
        #[arg(short, long, value_name = "FILE")]
        accounts: Option<String>,

        /// Max accounts processed at once (clamped to 1..=10)
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Automation backend to use
        #[arg(long, default_value = "playwright")]
        backend: String,

        /// Browser mode: headless or visible
        #[arg(long, default_value = "headless")]
        mode: String,

        /// Walk the accounts without touching the browser
        #[arg(long, default_value = "false")]
        dry_run: bool,

        /// Block analytics traffic for lighter, faster contexts
        #[arg(long, default_value = "false")]
        performant: bool,
    },
    /// Submit one order number across all accounts
    SubmitOrder {
        /// The order number to recognize and confirm
        #[arg(value_name = "ORDER_NUMBER")]
        order_number: String,

        /// Accounts file (CSV or JSON); falls back to OPTCOIN_USERNAME/OPTCOIN_PASSWORD
        #[arg(short, long, value_name = "FILE")]
        accounts: Option<String>,

        /// Max accounts processed at once (clamped to 1..=10)
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Automation backend to use
        #[arg(long, default_value = "playwright")]
        backend: String,

        /// Browser mode: headless or visible
        #[arg(long, default_value = "headless")]
        mode: String,

        /// Walk the accounts without touching the browser
        #[arg(long, default_value = "false")]
        dry_run: bool,

        /// Skip the interactive confirmation prompt
        #[arg(short, long, default_value = "false")]
        yes: bool,

        /// Block analytics traffic for lighter, faster contexts
        #[arg(long, default_value = "false")]
        performant: bool,
    },
    /// Run the webhook server that accepts order triggers over HTTP
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to bind
        #[arg(long)]
        port: Option<u16>,
    },
}
