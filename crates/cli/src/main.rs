use std::process;

use clap::{Parser, Subcommand};

mod serve;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Chargegate - idempotent payment-charge API", long_about = None)]
struct Opts {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Start the charge API server
    Serve(serve::ServeCommand),
}

#[tokio::main]
async fn main() {
    let opts: Opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            let _ = e.print();
            process::exit(e.exit_code());
        }
    };

    // Load environment variables from a .env file when one is present.
    let _ = dotenvy::dotenv();

    let result = match opts.command {
        Command::Serve(cmd) => cmd.execute().await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
