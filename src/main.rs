//! Cell Ensemble - Main Entry Point

use clap::Parser;
use cell_ensemble::cli::{cmd_inspect, cmd_predict, cmd_score, cmd_search, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cell_ensemble=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Search { data, validation, config, output, seed, trials, id_column, label_column } => {
            cmd_search(
                &data,
                validation.as_deref(),
                config.as_deref(),
                &output,
                seed,
                trials,
                &id_column,
                &label_column,
            )?;
        }
        Commands::Predict { registry, data, output, k, id_column, label_column } => {
            cmd_predict(&registry, &data, output.as_deref(), k, &id_column, &label_column)?;
        }
        Commands::Score { data, truth, pred } => {
            cmd_score(&data, &truth, &pred)?;
        }
        Commands::Inspect { registry } => {
            cmd_inspect(&registry)?;
        }
    }

    Ok(())
}
