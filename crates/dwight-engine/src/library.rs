//! Curated list of popular models offered for download.

/// A model from the curated library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryModel {
    pub name: &'static str,
    pub description: &'static str,
    pub tags: &'static [&'static str],
    /// Approximate download size.
    pub size: &'static str,
    pub installed: bool,
}

const fn entry(
    name: &'static str,
    description: &'static str,
    tags: &'static [&'static str],
    size: &'static str,
) -> LibraryModel {
    LibraryModel {
        name,
        description,
        tags,
        size,
        installed: false,
    }
}

const POPULAR: &[LibraryModel] = &[
    entry("llama3.2:3b", "Meta's Llama 3.2, fast and capable (3B params)", &["general", "chat", "code"], "2.0GB"),
    entry("llama3.2:1b", "Meta's Llama 3.2, ultra-fast lightweight (1B params)", &["general", "chat"], "1.3GB"),
    entry("qwen2.5-coder:7b", "Alibaba's Qwen 2.5 Coder, strong at code (7B params)", &["code", "programming"], "4.7GB"),
    entry("qwen2.5-coder:14b", "Alibaba's Qwen 2.5 Coder, advanced coding (14B params)", &["code", "programming"], "9.0GB"),
    entry("phi3:3.8b", "Microsoft Phi-3, small but powerful (3.8B params)", &["general", "chat"], "2.3GB"),
    entry("gemma2:2b", "Google Gemma 2, efficient and fast (2B params)", &["general", "chat"], "1.6GB"),
    entry("mistral:7b", "Mistral AI, balanced performance (7B params)", &["general", "chat", "code"], "4.1GB"),
    entry("llama3.1:8b", "Meta's Llama 3.1, strong general model (8B params)", &["general", "chat", "reasoning"], "4.7GB"),
    entry("codellama:7b", "Meta's Code Llama, specialized for code (7B params)", &["code", "programming"], "3.8GB"),
    entry("deepseek-coder:6.7b", "DeepSeek Coder, advanced code generation (6.7B params)", &["code", "programming"], "3.8GB"),
    entry("llava:7b", "LLaVA, vision and language (7B params)", &["vision", "multimodal"], "4.5GB"),
    entry("neural-chat:7b", "Intel's Neural Chat, tuned for conversation (7B params)", &["chat", "conversation"], "4.1GB"),
];

pub fn popular_models() -> Vec<LibraryModel> {
    POPULAR.to_vec()
}

/// Flag entries whose name exactly matches an installed model.
pub fn mark_installed<S: AsRef<str>>(models: &mut [LibraryModel], installed: &[S]) {
    for model in models.iter_mut() {
        model.installed = installed.iter().any(|name| name.as_ref() == model.name);
    }
}

/// Case-insensitive match on name, description or any tag. Empty query keeps all.
pub fn filter_library(models: &[LibraryModel], query: &str) -> Vec<LibraryModel> {
    let query = query.trim().to_lowercase();
    models
        .iter()
        .filter(|m| {
            query.is_empty()
                || m.name.to_lowercase().contains(&query)
                || m.description.to_lowercase().contains(&query)
                || m.tags.iter().any(|t| t.contains(query.as_str()))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_popular_models() {
        let models = popular_models();
        assert_eq!(models.len(), 12);
        assert!(models.iter().all(|m| !m.installed));
        assert_eq!(models[0].name, "llama3.2:3b");
    }

    #[test]
    fn test_mark_installed_exact() {
        let mut models = popular_models();
        mark_installed(&mut models, &["llama3.2:3b", "mistral"]);

        let installed: Vec<_> = models.iter().filter(|m| m.installed).map(|m| m.name).collect();
        assert_eq!(installed, vec!["llama3.2:3b"]);
    }

    #[test]
    fn test_filter_library() {
        let models = popular_models();
        assert_eq!(filter_library(&models, "").len(), 12);

        let vision = filter_library(&models, "Vision");
        assert_eq!(vision.len(), 1);
        assert_eq!(vision[0].name, "llava:7b");

        let code: Vec<_> = filter_library(&models, "programming").into_iter().map(|m| m.name).collect();
        assert!(code.contains(&"codellama:7b"));
        assert!(!code.contains(&"gemma2:2b"));
    }
}
