use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use rowscript_api::engine::{EngineFactory, ScriptEngine};
use rowscript_api::error::StepError;

/// Language the registry falls back to when a requested name is unknown.
pub const DEFAULT_LANGUAGE: &str = "rhai";

/// Registry of script-engine factories, keyed by lowercased language name
/// and alias.
///
/// Uses interior mutability so factories can be registered at runtime;
/// read-mostly after first population. The step core only queries it.
pub struct EngineRegistry {
    factories: RwLock<HashMap<String, Arc<dyn EngineFactory>>>,
    default_language: String,
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("languages", &self.languages())
            .field("default_language", &self.default_language)
            .finish()
    }
}

impl EngineRegistry {
    pub fn new(default_language: &str) -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            default_language: default_language.to_ascii_lowercase(),
        }
    }

    pub fn register(&self, factory: Arc<dyn EngineFactory>) {
        let mut guard = match self.factories.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("engine registry write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        let language = factory.language().to_ascii_lowercase();
        for alias in factory.aliases() {
            guard.insert(alias.to_ascii_lowercase(), factory.clone());
        }
        tracing::debug!(language = %language, "registered script engine");
        guard.insert(language, factory);
    }

    /// Instantiate an engine for the given language, falling back to the
    /// default language when the name is unknown.
    pub fn engine(&self, language: &str) -> Result<Box<dyn ScriptEngine>, StepError> {
        let guard = match self.factories.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("engine registry read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        let key = language.to_ascii_lowercase();
        if let Some(factory) = guard.get(&key) {
            return factory.create();
        }
        tracing::debug!(
            language = %language,
            default = %self.default_language,
            "unknown script language, falling back to default"
        );
        match guard.get(&self.default_language) {
            Some(factory) => factory.create(),
            None => Err(StepError::Engine(format!(
                "no script engine registered for '{language}' and the default '{}' is unavailable",
                self.default_language
            ))),
        }
    }

    /// Registered language names (aliases included), sorted.
    pub fn languages(&self) -> Vec<String> {
        let guard = match self.factories.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("engine registry read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        let mut names: Vec<String> = guard.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Process-wide registry, lazily initialized with the default language.
pub fn global() -> &'static EngineRegistry {
    static GLOBAL: OnceLock<EngineRegistry> = OnceLock::new();
    GLOBAL.get_or_init(|| EngineRegistry::new(DEFAULT_LANGUAGE))
}
