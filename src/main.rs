use clap::Parser;

#[tokio::main]
async fn main() {
    let args = howai_lib::Args::parse();

    if let Err(e) = howai_lib::run(args).await {
        eprintln!("Error: {}", e);
        eprintln!("{}", e.recovery_suggestion());
        std::process::exit(1);
    }
}
