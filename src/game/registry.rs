//! Module Registry
//!
//! Immutable key -> module mapping, built once at process start and shared
//! behind an `Arc`. There is no runtime registration.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::game::glyph_order::GlyphOrder;
use crate::game::machine::EngineError;
use crate::game::module::PuzzleModule;

/// Lookup table of every puzzle module this server can run.
#[derive(Clone)]
pub struct ModuleRegistry {
    modules: BTreeMap<&'static str, Arc<dyn PuzzleModule>>,
}

impl ModuleRegistry {
    /// Build a registry from an explicit module list.
    ///
    /// Later entries with a duplicate key replace earlier ones.
    pub fn from_modules(modules: Vec<Arc<dyn PuzzleModule>>) -> Self {
        let modules = modules
            .into_iter()
            .map(|module| (module.key(), module))
            .collect();
        Self { modules }
    }

    /// Registry containing every built-in module.
    pub fn builtin() -> Self {
        Self::from_modules(vec![Arc::new(GlyphOrder) as Arc<dyn PuzzleModule>])
    }

    /// Resolve a module by key.
    pub fn get(&self, key: &str) -> Result<&Arc<dyn PuzzleModule>, EngineError> {
        self.modules
            .get(key)
            .ok_or_else(|| EngineError::ModuleNotFound(key.to_string()))
    }

    /// Whether a key is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.modules.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.modules.keys().copied()
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("keys", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_glyph_order() {
        let registry = ModuleRegistry::builtin();
        assert!(registry.contains("glyphOrder"));
        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["glyphOrder"]);
        assert_eq!(registry.get("glyphOrder").unwrap().key(), "glyphOrder");
    }

    #[test]
    fn test_unknown_key_is_not_found() {
        let registry = ModuleRegistry::builtin();
        let err = registry.get("wireCutting").err().unwrap();
        assert!(matches!(err, EngineError::ModuleNotFound(ref key) if key == "wireCutting"));
    }

    #[test]
    fn test_empty_registry() {
        let registry = ModuleRegistry::from_modules(Vec::new());
        assert!(registry.is_empty());
        assert!(registry.get("glyphOrder").is_err());
    }
}
