//! Info command - show configuration and data locations.

use dwight_engine::{paths, AppSettings, BackendKind, EngineConfig, ProfileSet};

pub(crate) fn run(config: &EngineConfig) -> miette::Result<()> {
    println!("Dwight");
    println!("======");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    let backend = match config.backend {
        BackendKind::External => "external (ollama serve)",
        BackendKind::Docker => "docker (ollama/ollama container)",
    };
    println!("Backend:");
    println!("  URL:       {}", config.base_url);
    println!("  Managed:   {}", backend);
    println!("  Streaming: {}", if config.stream { "on" } else { "off" });
    println!(
        "  Pulls:     poll every {}s, give up after {}s",
        config.pull.interval.as_secs(),
        config.pull.deadline.as_secs()
    );
    println!();

    let settings = AppSettings::load(&paths::settings_path(&config.data_dir))
        .map_err(|e| miette::miette!("Failed to load settings: {}", e))?;
    let profiles = ProfileSet::load(&paths::profiles_path(&config.data_dir))
        .map_err(|e| miette::miette!("Failed to load profiles: {}", e))?;
    let current = profiles.current();

    println!("Chat:");
    println!("  User:      {}", settings.user_name);
    println!("  Timeout:   {}s", settings.chat_timeout);
    println!("  Profile:   {} ({})", current.name, current.model);
    println!();

    println!("Data:");
    println!("  Root:          {}", config.data_dir.display());
    println!("  Settings:      {}", paths::settings_path(&config.data_dir).display());
    println!("  Profiles:      {}", paths::profiles_path(&config.data_dir).display());
    println!("  Conversations: {}", paths::conversations_dir(&config.data_dir).display());
    println!("  Exports:       {}", paths::exports_dir(&config.data_dir).display());
    println!();
    println!("Environment: DWIGHT_OLLAMA_URL, DWIGHT_DATA_DIR, DWIGHT_STREAM, DWIGHT_BACKEND, RUST_LOG");

    Ok(())
}
