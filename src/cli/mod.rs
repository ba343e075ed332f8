pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "ess-mobile-api")]
#[command(about = "Employee Self Service mobile API server")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server")]
    Serve {
        #[arg(long, help = "Port to listen on (overrides ESS_PORT)")]
        port: Option<u16>,
        #[arg(long, help = "Address to bind (overrides ESS_HOST)")]
        host: Option<String>,
    },

    #[command(about = "List registered mobile endpoints")]
    Endpoints,

    #[command(about = "Create the document table in Postgres")]
    Migrate,

    #[command(about = "Create a user, optionally linked to a new Employee")]
    CreateUser(commands::user::CreateUserArgs),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Serve { port, host } => commands::serve::handle(host, port).await,
        Commands::Endpoints => commands::endpoints::handle(output_format),
        Commands::Migrate => commands::migrate::handle(output_format).await,
        Commands::CreateUser(args) => commands::user::handle(args, output_format).await,
    }
}
