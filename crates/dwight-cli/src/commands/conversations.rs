//! Saved conversation commands.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use dwight_engine::{export_file_name, paths, ConversationStore, EngineConfig, ExportFormat};

fn open_store(config: &EngineConfig) -> ConversationStore {
    ConversationStore::new(paths::conversations_dir(&config.data_dir))
}

/// List saved conversations, optionally filtered by a search query.
pub(crate) fn list(config: &EngineConfig, query: Option<&str>) -> miette::Result<()> {
    let store = open_store(config);
    let conversations = match query {
        Some(q) => store.search(q),
        None => store.list(),
    }
    .map_err(|e| miette::miette!("Failed to read conversations: {}", e))?;

    if conversations.is_empty() {
        match query {
            Some(q) => println!("No conversations match '{}'.", q),
            None => println!("No saved conversations."),
        }
        return Ok(());
    }

    for meta in conversations {
        println!(
            "{}  {}  {:<40}  {} ({} messages)",
            meta.id,
            meta.last_modified.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            meta.title,
            meta.model,
            meta.message_count
        );
    }

    Ok(())
}

/// Print a conversation as plain text.
pub(crate) fn show(config: &EngineConfig, id: &str) -> miette::Result<()> {
    let text = open_store(config)
        .export_plain_text(id)
        .map_err(|e| miette::miette!("Cannot show '{}': {}", id, e))?;
    println!("{}", text);
    Ok(())
}

/// Export a conversation, by default into the exports directory.
pub(crate) fn export(config: &EngineConfig, id: &str, format: &str, output: Option<&Path>) -> miette::Result<()> {
    let format: ExportFormat = format.parse().map_err(|e| miette::miette!("{}", e))?;
    let path = export_to(
        &open_store(config),
        id,
        format,
        output,
        &paths::exports_dir(&config.data_dir),
    )?;
    println!("Exported {} to {}", id, path.display());
    Ok(())
}

fn export_to(
    store: &ConversationStore,
    id: &str,
    format: ExportFormat,
    output: Option<&Path>,
    exports_dir: &Path,
) -> miette::Result<PathBuf> {
    let conversation = store
        .load(id)
        .map_err(|e| miette::miette!("Cannot export '{}': {}", id, e))?;
    let content = store
        .export(id, format)
        .map_err(|e| miette::miette!("Cannot export '{}': {}", id, e))?;

    let path = match output {
        Some(path) => path.to_path_buf(),
        None => exports_dir.join(export_file_name(&conversation.metadata(), format)),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| miette::miette!("Failed to create {}: {}", parent.display(), e))?;
    }
    fs::write(&path, content).map_err(|e| miette::miette!("Failed to write {}: {}", path.display(), e))?;

    Ok(path)
}

/// Delete a saved conversation.
pub(crate) fn delete(config: &EngineConfig, id: &str) -> miette::Result<()> {
    open_store(config)
        .delete(id)
        .map_err(|e| miette::miette!("Cannot delete '{}': {}", id, e))?;
    println!("Deleted {}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwight_engine::{ChatMessage, Conversation};
    use tempfile::TempDir;

    fn saved(store: &ConversationStore) -> String {
        let mut conversation = Conversation::new(
            "llama3.2:3b",
            "Fast",
            vec![ChatMessage::user("What is a monad?")],
            Vec::new(),
        );
        store.save(&mut conversation).unwrap();
        conversation.id
    }

    #[test]
    fn test_export_into_exports_dir() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path().join("conversations"));
        let id = saved(&store);

        let exports = dir.path().join("exports");
        let path = export_to(&store, &id, ExportFormat::Markdown, None, &exports).unwrap();

        assert!(path.starts_with(&exports));
        assert_eq!(path.extension().unwrap(), "md");
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("What is a monad?"));
    }

    #[test]
    fn test_export_to_explicit_path() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path().join("conversations"));
        let id = saved(&store);

        let target = dir.path().join("out").join("chat.json");
        let path = export_to(&store, &id, ExportFormat::Json, Some(&target), dir.path()).unwrap();

        assert_eq!(path, target);
        let content = fs::read_to_string(&target).unwrap();
        assert!(content.contains(&id));
    }

    #[test]
    fn test_export_missing_conversation() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path());
        assert!(export_to(&store, "conv_1", ExportFormat::Text, None, dir.path()).is_err());
    }
}
