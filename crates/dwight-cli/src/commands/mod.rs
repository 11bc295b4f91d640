//! CLI commands.

pub mod backend;
pub mod chat;
pub mod conversations;
pub mod info;
pub mod models;
pub mod profiles;

/// Profiles are numbered from 1 on the command line.
pub(crate) fn profile_index(number: usize) -> miette::Result<usize> {
    number
        .checked_sub(1)
        .ok_or_else(|| miette::miette!("Profile numbers start at 1"))
}

/// Human-readable byte count.
pub(crate) fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
