//! Process entrypoint: parses CLI flags and launches the Riven scheduler.

#[tokio::main]
async fn main() {
    let exit_code = riven_cli::run().await;
    std::process::exit(exit_code);
}
