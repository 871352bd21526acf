//! Model management commands.

use freewrite_ai::{EngineConfig, DEFAULT_LLAMA_PORT};
use freewrite_local_ai::{paths, DownloadOutcome, DownloadState, ModelEvent};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;

use super::{ensure_runnable, model_manager, runtime_registry};

/// List catalog models and their state.
pub(crate) fn list() -> miette::Result<()> {
    let manager = model_manager()?;

    println!("Models:");
    for status in manager.snapshot() {
        let marker = if status.selected { "*" } else { " " };
        let state = match status.state {
            DownloadState::Absent => "not downloaded".to_string(),
            DownloadState::Downloading { progress } => {
                format!("downloading ({:.0}%)", progress * 100.0)
            }
            DownloadState::Downloaded => "downloaded".to_string(),
            DownloadState::Failed => "failed".to_string(),
        };
        println!(
            "{} {:<28} {:<16} {:>9}  {:<11}  {}",
            marker,
            status.descriptor.id,
            status.descriptor.display_name,
            status.descriptor.estimated_size(),
            status.descriptor.weights,
            state
        );
    }

    println!();
    println!("Models directory: {}", manager.models_root().display());
    if manager.selected().is_none() {
        println!();
        println!("No model selected. To download one, run:");
        println!("  freewrite models pull <id>");
    }

    Ok(())
}

/// Download a model, rendering progress from the manager's events.
pub(crate) async fn pull(id: &str) -> miette::Result<()> {
    let manager = model_manager()?;
    let descriptor = manager
        .catalog()
        .lookup(id)
        .map_err(|e| miette::miette!("{}", e))?
        .clone();

    if manager.is_downloaded(id) {
        println!("Model '{}' is already downloaded.", descriptor.display_name);
        return Ok(());
    }
    ensure_runnable(&runtime_registry(&EngineConfig::from_env()), &descriptor)?;

    println!(
        "Downloading {} ({})",
        descriptor.display_name,
        descriptor.estimated_size()
    );
    println!("This may take a while depending on your connection...");
    println!();

    let pb = ProgressBar::new(descriptor.size_bytes);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut events = manager.subscribe();
    let renderer = {
        let pb = pb.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ModelEvent::DownloadProgress {
                        model_id,
                        downloaded_bytes,
                        total_bytes,
                        ..
                    }) if model_id == id => {
                        if total_bytes > 0 {
                            pb.set_length(total_bytes);
                        }
                        pb.set_position(downloaded_bytes);
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    let result = manager.download(id).await;
    renderer.abort();
    pb.finish_and_clear();

    match result {
        Ok(DownloadOutcome::Installed) => {
            println!("Model downloaded successfully!");
            println!("Location: {}", manager.model_dir(id).display());
            if manager.selected().as_deref() == Some(id) {
                println!("Selected '{}' for generation.", id);
            }
            Ok(())
        }
        Ok(DownloadOutcome::AlreadyInProgress) => {
            println!("A download for '{}' is already running.", id);
            Ok(())
        }
        Err(e) => Err(miette::miette!("Failed to download model: {}", e)),
    }
}

/// Select a downloaded model.
pub(crate) fn select(id: &str) -> miette::Result<()> {
    let manager = model_manager()?;
    let descriptor = manager
        .catalog()
        .lookup(id)
        .map_err(|e| miette::miette!("{}", e))?;
    ensure_runnable(&runtime_registry(&EngineConfig::from_env()), descriptor)?;

    manager
        .select(id)
        .map_err(|e| miette::miette!("Failed to select model: {}", e))?;

    println!("Selected '{}'.", id);
    Ok(())
}

/// Delete a downloaded model.
pub(crate) async fn rm(id: &str) -> miette::Result<()> {
    let manager = model_manager()?;
    let was_selected = manager.selected().as_deref() == Some(id);

    manager
        .delete(id)
        .await
        .map_err(|e| miette::miette!("Failed to delete model: {}", e))?;

    println!("Deleted '{}'.", id);
    if was_selected {
        println!("No model is selected now.");
    }
    Ok(())
}

/// Show information about paths and engine configuration.
pub(crate) fn info() -> miette::Result<()> {
    let manager = model_manager()?;
    let config = EngineConfig::from_env();

    println!("Freewrite Local AI Configuration");
    println!("================================");
    println!();
    println!("Models directory: {}", manager.models_root().display());
    match paths::selection_path() {
        Ok(path) => println!("Selection file:   {}", path.display()),
        Err(e) => println!("Selection file:   unavailable ({})", e),
    }
    match paths::custom_passes_path() {
        Ok(path) => println!("Custom passes:    {}", path.display()),
        Err(e) => println!("Custom passes:    unavailable ({})", e),
    }
    match paths::catalog_path() {
        Ok(path) => println!("Extra catalog:    {}", path.display()),
        Err(e) => println!("Extra catalog:    unavailable ({})", e),
    }
    println!();
    println!(
        "Selected model:   {}",
        manager.selected().as_deref().unwrap_or("(none)")
    );
    println!("Downloaded:       {}", manager.downloaded_models().join(", "));
    println!();
    println!("Server binary:    {}", config.llama_server.display());
    println!(
        "Server port:      {} (default {})",
        config.llama_port, DEFAULT_LLAMA_PORT
    );
    println!("Temperature:      {}", config.temperature);
    println!(
        "Architectures:    {}",
        runtime_registry(&config).architectures().join(", ")
    );

    Ok(())
}
