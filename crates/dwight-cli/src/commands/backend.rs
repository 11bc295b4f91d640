//! Backend lifecycle commands.

use dwight_backend::BackendLifecycle;
use dwight_engine::{BackendKind, EngineConfig};

/// Make sure the backend is up, starting the container if it is managed.
pub(crate) async fn start(config: &EngineConfig) -> miette::Result<()> {
    if config.backend == BackendKind::Docker {
        println!("Starting the Ollama container...");
    }

    config
        .lifecycle()
        .ensure_running()
        .await
        .map_err(|e| miette::miette!("Backend is not available: {}", e))?;

    println!("Backend is running at {}", config.base_url);
    Ok(())
}

/// Stop a managed backend. An external one is left alone.
pub(crate) async fn stop(config: &EngineConfig) -> miette::Result<()> {
    config
        .lifecycle()
        .stop()
        .await
        .map_err(|e| miette::miette!("Failed to stop backend: {}", e))?;

    match config.backend {
        BackendKind::Docker => println!("Backend stopped."),
        BackendKind::External => println!("Backend is managed externally; nothing to stop."),
    }
    Ok(())
}
