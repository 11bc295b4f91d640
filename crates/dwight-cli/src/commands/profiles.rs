//! Profile commands.

use dwight_engine::{paths, EngineConfig, ProfileSet};

use super::profile_index;

fn load(config: &EngineConfig) -> miette::Result<ProfileSet> {
    ProfileSet::load(&paths::profiles_path(&config.data_dir))
        .map_err(|e| miette::miette!("Failed to load profiles: {}", e))
}

/// List profiles, marking the current one.
pub(crate) fn list(config: &EngineConfig) -> miette::Result<()> {
    let profiles = load(config)?;

    println!("Profiles:");
    for (i, profile) in profiles.profiles().iter().enumerate() {
        let marker = if i == profiles.current_index() { '*' } else { ' ' };
        println!(
            "{} {}. {:<18} {:<22} temperature {:.1}",
            marker,
            i + 1,
            profile.name,
            profile.model,
            profile.temperature
        );
    }
    println!();
    println!("Profiles file: {}", paths::profiles_path(&config.data_dir).display());

    Ok(())
}

/// Make profile `number` (1-based) current and persist the choice.
pub(crate) fn select(config: &EngineConfig, number: usize) -> miette::Result<()> {
    let mut profiles = load(config)?;
    let index = profile_index(number)?;

    let profile = profiles
        .set_current(index)
        .map_err(|e| miette::miette!("Cannot select profile {}: {}", number, e))?;
    println!("Now using {} ({})", profile.name, profile.model);

    profiles
        .save(&paths::profiles_path(&config.data_dir))
        .map_err(|e| miette::miette!("Failed to save profiles: {}", e))?;

    Ok(())
}
