use clap::Parser;
use exec_cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        eprintln!("execd: {e}");
        std::process::exit(1);
    }
}
