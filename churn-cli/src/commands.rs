//! Subcommand handlers.

use crate::{Commands, ConfigAction};
use churn_core::config::{ChurnConfig, WORKSPACE_CONFIG_FILE, load_config};
use churn_core::{PipelineContext, run_preprocess};
use std::path::Path;

pub(crate) async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace, config_path),
        Commands::Preprocess => {
            let ctx = open_context(workspace, config_path, |_| {})?;
            let report = run_preprocess(&ctx).await?;
            tracing::info!(run_id = %ctx.run_id(), rows = report.rows, "Preprocessing run complete");
            println!(
                "Data preprocessing complete: {} rows written to {}",
                report.rows, report.location
            );
            ctx.close();
            Ok(())
        }
        Commands::Train { no_plot } => {
            let ctx = open_context(workspace, config_path, |config| {
                if no_plot {
                    config.report.show_plot = false;
                }
            })?;
            let mut stdout = std::io::stdout();
            let results = churn_ml::run_training(&ctx, &mut stdout).await?;
            let report = &ctx.config().report;
            if report.show_plot {
                tracing::info!(path = %report.roc_curve_path.display(), "ROC curves written");
            }
            tracing::info!(run_id = %ctx.run_id(), models = results.len(), "Training run complete");
            ctx.close();
            Ok(())
        }
        Commands::Notify => {
            let ctx = open_context(workspace, config_path, |_| {})?;
            let sent = churn_core::events::run_notify(&ctx).await?;
            println!("Sent {sent} churn event(s)");
            ctx.close();
            Ok(())
        }
        Commands::Alarm { event } => {
            let config = load_config(Some(workspace), config_path)
                .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
            let alarm = churn_core::alarms::run_alarm(&config.alarms, &event).await?;
            println!(
                "Sent {} notification for alarm {}",
                alarm.alarm_data.state.value, alarm.alarm_data.alarm_name
            );
            Ok(())
        }
    }
}

/// Load layered configuration, apply command overrides, open the context.
fn open_context(
    workspace: &Path,
    config_path: Option<&Path>,
    overrides: impl FnOnce(&mut ChurnConfig),
) -> anyhow::Result<PipelineContext> {
    let mut config = load_config(Some(workspace), config_path)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    overrides(&mut config);
    Ok(PipelineContext::open(config)?)
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let path = workspace.join(WORKSPACE_CONFIG_FILE);
            if path.exists() {
                println!("Configuration file already exists at: {}", path.display());
                return Ok(());
            }
            std::fs::write(&path, ChurnConfig::default().to_toml()?)?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), config_path)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            println!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
