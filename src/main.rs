mod cli;
mod engine;
mod error;
mod export;
mod intake;
mod model;
mod orchestrator;
mod session;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;
mod viewmodel;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let silent = args.silent;
    let headless = args.silent || args.json || args.text;

    match cli::run(args).await {
        // Headless modes exit explicitly so scripts get a clean status code.
        Ok(()) if headless => std::process::exit(0),
        Ok(()) => Ok(()),
        Err(e) if silent => {
            println!("{}", e);
            std::process::exit(1);
        }
        Err(e) => Err(e),
    }
}
