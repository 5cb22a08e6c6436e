use anyhow::{Context, Result};
use clap::Parser;
use docsearch::config::{IndexCli, Mode};
use docsearch::pipeline;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docsearch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = IndexCli::parse();
    let config = cli.build_config().context("invalid configuration")?;

    let summary = pipeline::run(&config)
        .await
        .with_context(|| format!("indexing {:?} failed", config.docs_dir))?;

    match &config.mode {
        Mode::Local { output } => println!("wrote {}", output.display()),
        Mode::DryRun => println!("dry run: no remote index was modified"),
        Mode::Remote(remote) => println!("synced index {}", remote.index_name),
    }
    println!("{summary}");
    Ok(())
}
