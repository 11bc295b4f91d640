//! Model management commands.

use dwight_backend::BackendLifecycle;
use dwight_engine::{filter_library, mark_installed, popular_models, EngineConfig, OllamaClient, PullProgress};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use super::format_size;

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {msg}";

/// List installed models.
pub(crate) async fn list(config: &EngineConfig) -> miette::Result<()> {
    let client = OllamaClient::new(&config.base_url);
    let models = client
        .list_models()
        .await
        .map_err(|e| miette::miette!("Failed to list models: {}", e))?;

    if models.is_empty() {
        println!("No models installed.");
        println!();
        println!("To install one, run:");
        println!("  dwight models pull llama3.2:3b");
        return Ok(());
    }

    println!("Installed models:");
    for model in models {
        println!("  - {:<32} {:>10}  {}", model.name, format_size(model.size), model.modified_at);
    }
    println!();
    println!("Backend: {}", client.base_url());

    Ok(())
}

/// Pull a model, showing the registry's progress records.
pub(crate) async fn pull(config: &EngineConfig, name: &str) -> miette::Result<()> {
    config
        .lifecycle()
        .ensure_running()
        .await
        .map_err(|e| miette::miette!("Backend is not available: {}", e))?;

    let client = OllamaClient::new(&config.base_url);
    if client.is_model_present(name).await.unwrap_or(false) {
        println!("Model '{}' is already installed.", name);
        return Ok(());
    }

    println!("Pulling model: {}", name);
    println!("This may take a while depending on your connection...");
    println!();

    let pb = ProgressBar::new_spinner();
    let mut sized = false;
    if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
        pb.set_style(style);
    }

    let result = client
        .pull_with_progress(name, |progress: &PullProgress| {
            match (progress.total, progress.completed) {
                (Some(total), completed) if total > 0 => {
                    if !sized {
                        if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
                            pb.set_style(style.progress_chars("#>-"));
                        }
                        sized = true;
                    }
                    pb.set_length(total);
                    pb.set_position(completed.unwrap_or(0));
                }
                _ => pb.tick(),
            }
            pb.set_message(progress.status.clone());
        })
        .await;

    match result {
        Ok(status) => {
            pb.finish_with_message(status);
            println!();
            println!("Model '{}' is ready.", name);
            Ok(())
        }
        Err(e) => {
            pb.abandon();
            Err(miette::miette!("Failed to pull '{}': {}", name, e))
        }
    }
}

/// Show the curated library, marking what is installed.
pub(crate) async fn library(config: &EngineConfig, filter: Option<&str>) -> miette::Result<()> {
    let mut models = popular_models();

    let client = OllamaClient::new(&config.base_url);
    match client.list_models().await {
        Ok(installed) => {
            let names: Vec<_> = installed.into_iter().map(|m| m.name).collect();
            mark_installed(&mut models, &names);
        }
        Err(e) => warn!("could not read installed models: {}", e),
    }

    let models = filter_library(&models, filter.unwrap_or(""));
    if models.is_empty() {
        println!("No library models match.");
        return Ok(());
    }

    println!("Model library:");
    for model in &models {
        let marker = if model.installed { "installed" } else { "" };
        println!("  {:<22} {:>6}  {:<9}  {}", model.name, model.size, marker, model.description);
        println!("  {:<22} tags: {}", "", model.tags.join(", "));
    }
    println!();
    println!("Pull one with: dwight models pull <name>");

    Ok(())
}
