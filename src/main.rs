use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    namebook::logging::init().context("init logging")?;

    let cli = namebook::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        namebook::cli::Command::Pages(args) => {
            namebook::preview::run(args).await.context("pages")?;
        }
        namebook::cli::Command::Render(args) => {
            namebook::pdf::run(args).await.context("render")?;
        }
        namebook::cli::Command::Deliver(args) => {
            namebook::app::delivery::run(args)
                .await
                .context("deliver")?;
        }
    }

    Ok(())
}
