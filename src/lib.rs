pub mod agent;
pub mod ai;
pub mod cli;
pub mod executor;
pub mod models;

pub use cli::Args;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Start the assistant with parsed arguments
pub async fn run(args: Args) -> models::error::Result<()> {
    // Initialize logging; stdout belongs to the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "howai_lib=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting howai");

    cli::repl::run(args).await
}
