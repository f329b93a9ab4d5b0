pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::GlobalOptions;

#[derive(Debug, Parser)]
#[command(
    name = "offerdesk",
    about = "Offer review operator CLI",
    long_about = "Review pending offers, follow processing status, and submit or delete offers.",
    after_help = "Examples:\n  offerdesk --demo offers\n  offerdesk --demo submit DEMO-1 --exclude L4\n  offerdesk config"
)]
pub struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Read configuration from this file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Use the built-in demo backend instead of the server")]
    demo: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "List pending offers with their face value")]
    Offers,
    #[command(about = "Show one offer's lines through the client's column profile")]
    Show { offer_id: String },
    #[command(about = "Fetch the processing status feed once and summarize it")]
    Status,
    #[command(about = "Run the status poller and report board updates")]
    Watch {
        #[arg(long, help = "Stop after this many board updates (default: until ctrl-c)")]
        ticks: Option<u32>,
    },
    #[command(about = "Submit an offer's selected lines to the ERP")]
    Submit {
        offer_id: String,
        #[arg(long = "exclude", value_name = "LINE", help = "Deselect this line before submitting")]
        exclude: Vec<String>,
    },
    #[command(about = "Delete an offer on the server")]
    Delete { offer_id: String },
    #[command(about = "Show the column profile, optionally toggling column visibility")]
    Columns {
        #[arg(long = "toggle", value_name = "KEY", help = "Flip visibility of this column")]
        toggle: Vec<String>,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = GlobalOptions { config_path: cli.config, demo: cli.demo };

    // Config errors are reported by the command itself.
    if let Ok(config) = commands::load_config("logging", &options) {
        if let Err(error) = logging::init_logging(&config.logging) {
            eprintln!("{error:#}");
        }
    }

    let result = match cli.command {
        Command::Offers => commands::offers::list(&options),
        Command::Show { offer_id } => commands::offers::show(&options, &offer_id),
        Command::Status => commands::status::run(&options),
        Command::Watch { ticks } => commands::status::watch(&options, ticks),
        Command::Submit { offer_id, exclude } => {
            commands::lifecycle::submit(&options, &offer_id, &exclude)
        }
        Command::Delete { offer_id } => commands::lifecycle::delete(&options, &offer_id),
        Command::Columns { toggle } => commands::columns::run(&options, &toggle),
        Command::Config => commands::config::run(&options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
