//! System prompts for the A/B conditions of the study.
//!
//! Prompt text lives in `<prompt_dir>/<lang>/<LANG>_prompt_<VARIANT>.txt`.
//! Files are read once and held for the life of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::debug;

use crate::models::Language;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("invalid prompt variant name '{0}'")]
    InvalidVariant(String),

    #[error("failed to read prompt file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Experimental conditions. Each conversation gets one at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptVariant {
    ControlCondition,
    MotivationalLearning,
    Perspective,
    ChristmasDinner,
    CriticalThinking,
}

impl PromptVariant {
    pub const ALL: [PromptVariant; 5] = [
        PromptVariant::ControlCondition,
        PromptVariant::MotivationalLearning,
        PromptVariant::Perspective,
        PromptVariant::ChristmasDinner,
        PromptVariant::CriticalThinking,
    ];

    pub fn id(self) -> &'static str {
        match self {
            PromptVariant::ControlCondition => "A_control_condition",
            PromptVariant::MotivationalLearning => "B_motivational_learning",
            PromptVariant::Perspective => "C_perspective",
            PromptVariant::ChristmasDinner => "D_christmas_dinner",
            PromptVariant::CriticalThinking => "E_critical_thinking",
        }
    }

    /// File stem stored on the conversation, e.g. `EN_prompt_A_control_condition`.
    pub fn full_name(self, language: Language) -> String {
        format!("{}_prompt_{}", language.code(), self.id())
    }
}

/// Uniform draw over all variants. Draws are independent; nothing balances
/// group sizes.
pub fn assign_variant() -> PromptVariant {
    *PromptVariant::ALL
        .choose(&mut rand::thread_rng())
        .unwrap_or(&PromptVariant::ControlCondition)
}

pub struct PromptStore {
    root: PathBuf,
    cache: RwLock<HashMap<(Language, String), Arc<str>>>,
}

impl PromptStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the system prompt for `variant_name` (a full file stem).
    pub async fn get(&self, language: Language, variant_name: &str) -> Result<Arc<str>, PromptError> {
        if !is_valid_variant_name(variant_name) {
            return Err(PromptError::InvalidVariant(variant_name.to_string()));
        }

        let key = (language, variant_name.to_string());
        let cached = self.read_cache().get(&key).cloned();
        if let Some(text) = cached {
            return Ok(text);
        }

        let path = self
            .root
            .join(language.code().to_ascii_lowercase())
            .join(format!("{variant_name}.txt"));
        let text: Arc<str> = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| PromptError::Io {
                path: path.clone(),
                source,
            })?
            .into();
        debug!("Loaded system prompt from {}", path.display());

        // Two concurrent misses may both read the file; the first insert wins.
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        Ok(Arc::clone(cache.entry(key).or_insert(text)))
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, HashMap<(Language, String), Arc<str>>> {
        self.cache.read().unwrap_or_else(|e| e.into_inner())
    }
}

fn is_valid_variant_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn write_prompt(root: &Path, lang: &str, name: &str, text: &str) {
        let dir = root.join(lang);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{name}.txt")), text).unwrap();
    }

    #[test]
    fn test_full_name_format() {
        assert_eq!(
            PromptVariant::Perspective.full_name(Language::Pt),
            "PT_prompt_C_perspective"
        );
    }

    #[test]
    fn test_assign_variant_covers_all_variants() {
        let seen: HashSet<&str> = (0..500).map(|_| assign_variant().id()).collect();
        assert_eq!(seen.len(), PromptVariant::ALL.len());
    }

    #[tokio::test]
    async fn test_loads_from_language_folder() {
        let dir = tempfile::tempdir().unwrap();
        write_prompt(dir.path(), "en", "EN_prompt_A_control_condition", "be helpful");
        let store = PromptStore::new(dir.path());

        let text = store
            .get(Language::En, "EN_prompt_A_control_condition")
            .await
            .unwrap();
        assert_eq!(&*text, "be helpful");
    }

    #[tokio::test]
    async fn test_caches_after_first_read() {
        let dir = tempfile::tempdir().unwrap();
        write_prompt(dir.path(), "pt", "PT_prompt_C_perspective", "original");
        let store = PromptStore::new(dir.path());

        let first = store.get(Language::Pt, "PT_prompt_C_perspective").await.unwrap();
        write_prompt(dir.path(), "pt", "PT_prompt_C_perspective", "changed on disk");
        let second = store.get(Language::Pt, "PT_prompt_C_perspective").await.unwrap();

        assert_eq!(&*first, "original");
        assert_eq!(&*second, "original");
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = PromptStore::new(dir.path());
        let err = store.get(Language::En, "EN_prompt_Z_missing").await.unwrap_err();
        assert!(matches!(err, PromptError::Io { .. }));
    }

    #[tokio::test]
    async fn test_rejects_path_like_variant_names() {
        let store = PromptStore::new("/nonexistent");
        for name in ["../secrets", "en/EN_prompt", "", "a.b"] {
            let err = store.get(Language::En, name).await.unwrap_err();
            assert!(matches!(err, PromptError::InvalidVariant(_)), "{name:?}");
        }
    }

    #[tokio::test]
    async fn test_shipped_prompt_files_exist_for_every_variant() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("prompts");
        let store = PromptStore::new(root);
        for language in Language::ALL {
            for variant in PromptVariant::ALL {
                let text = store.get(language, &variant.full_name(language)).await.unwrap();
                assert!(!text.trim().is_empty());
            }
        }
    }
}
