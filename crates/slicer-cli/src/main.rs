#[tokio::main]
async fn main() {
    if let Err(e) = slicer_cli::run_cli().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
