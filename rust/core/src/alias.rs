//! # ALIAS RESOLUTION
//!
//! Maps alternate names onto one canonical identifier. The registry keys every
//! cache and graph operation by the canonical identifier.

use crate::config::RegistryConfig;
use crate::errors::{RegistryError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Resolve an identifier to its canonical form.
pub trait AliasResolver: Send + Sync {
    /// Canonical identifier for `id`; `id` itself when it is not an alias.
    fn canonical_name(&self, id: &str) -> String;
}

/// Resolver for scopes without aliases.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityAliases;

impl AliasResolver for IdentityAliases {
    fn canonical_name(&self, id: &str) -> String {
        id.to_string()
    }
}

/// **ALIAS TABLE**
///
/// **GUARANTEE**: Alias chains never form a cycle, so `canonical_name`
/// always terminates.
#[derive(Debug)]
pub struct AliasTable {
    /// alias -> name it points at (which may itself be an alias)
    aliases: RwLock<HashMap<String, String>>,
    allow_overriding: bool,
}

impl AliasTable {
    /// Empty table; `allow_overriding` decides whether an alias may be re-pointed.
    pub fn new(allow_overriding: bool) -> Self {
        Self {
            aliases: RwLock::new(HashMap::new()),
            allow_overriding,
        }
    }

    /// Table following the alias overriding policy of `config`.
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(config.allow_alias_overriding)
    }

    /// Bind `alias` to `name`. Binding a name to itself removes the alias.
    pub fn register_alias(&self, name: &str, alias: &str) -> Result<()> {
        let mut aliases = self.aliases.write();
        if alias == name {
            aliases.remove(alias);
            return Ok(());
        }
        if let Some(existing) = aliases.get(alias) {
            if existing == name {
                return Ok(());
            }
            if !self.allow_overriding {
                return Err(RegistryError::AliasConflict {
                    alias: alias.to_string(),
                    name: name.to_string(),
                    existing: existing.clone(),
                });
            }
        }
        if Self::has_alias_in(&aliases, alias, name) {
            return Err(RegistryError::CircularAlias {
                alias: alias.to_string(),
                name: name.to_string(),
            });
        }
        log::debug!("Registering alias '{}' for '{}'", alias, name);
        aliases.insert(alias.to_string(), name.to_string());
        Ok(())
    }

    /// Drop `alias`; returns whether it existed.
    pub fn remove_alias(&self, alias: &str) -> bool {
        self.aliases.write().remove(alias).is_some()
    }

    /// Whether `id` is registered as an alias.
    pub fn is_alias(&self, id: &str) -> bool {
        self.aliases.read().contains_key(id)
    }

    /// All aliases that resolve (directly or transitively) to `name`.
    pub fn aliases_of(&self, name: &str) -> Vec<String> {
        let aliases = self.aliases.read();
        let mut found = Vec::new();
        Self::collect_aliases(&aliases, name, &mut found);
        found.sort();
        found
    }

    /// Whether `alias` resolves, directly or through a chain, to `name`.
    pub fn has_alias(&self, name: &str, alias: &str) -> bool {
        Self::has_alias_in(&self.aliases.read(), name, alias)
    }

    fn has_alias_in(aliases: &HashMap<String, String>, name: &str, alias: &str) -> bool {
        aliases.iter().any(|(registered_alias, registered_name)| {
            registered_name == name
                && (registered_alias == alias || Self::has_alias_in(aliases, registered_alias, alias))
        })
    }

    fn collect_aliases(aliases: &HashMap<String, String>, name: &str, found: &mut Vec<String>) {
        for (alias, target) in aliases {
            if target == name {
                found.push(alias.clone());
                Self::collect_aliases(aliases, alias, found);
            }
        }
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AliasResolver for AliasTable {
    fn canonical_name(&self, id: &str) -> String {
        let aliases = self.aliases.read();
        let mut canonical = id;
        while let Some(target) = aliases.get(canonical) {
            canonical = target.as_str();
        }
        canonical.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_aliases() {
        assert_eq!(IdentityAliases.canonical_name("db"), "db");
    }

    #[test]
    fn test_canonical_name_follows_chain() {
        let table = AliasTable::default();
        table.register_alias("dataSource", "db").unwrap();
        table.register_alias("db", "primaryDb").unwrap();

        assert_eq!(table.canonical_name("primaryDb"), "dataSource");
        assert_eq!(table.canonical_name("db"), "dataSource");
        assert_eq!(table.canonical_name("dataSource"), "dataSource");
        assert_eq!(table.aliases_of("dataSource"), vec!["db", "primaryDb"]);
    }

    #[test]
    fn test_circular_alias_rejected() {
        let table = AliasTable::default();
        table.register_alias("a", "b").unwrap();
        table.register_alias("b", "c").unwrap();

        let err = table.register_alias("c", "a").unwrap_err();
        assert!(matches!(err, RegistryError::CircularAlias { .. }));
        assert_eq!(table.canonical_name("c"), "a");
    }

    #[test]
    fn test_override_policy() {
        let strict = AliasTable::new(false);
        strict.register_alias("first", "handle").unwrap();
        strict.register_alias("first", "handle").unwrap();
        let err = strict.register_alias("second", "handle").unwrap_err();
        assert!(matches!(err, RegistryError::AliasConflict { existing, .. } if existing == "first"));

        let lenient = AliasTable::new(true);
        lenient.register_alias("first", "handle").unwrap();
        lenient.register_alias("second", "handle").unwrap();
        assert_eq!(lenient.canonical_name("handle"), "second");
    }

    #[test]
    fn test_from_config_policy() {
        let config = RegistryConfig {
            allow_alias_overriding: false,
            ..RegistryConfig::default()
        };
        let table = AliasTable::from_config(&config);
        table.register_alias("first", "handle").unwrap();
        assert!(table.register_alias("second", "handle").is_err());
    }

    #[test]
    fn test_self_alias_removes_binding() {
        let table = AliasTable::default();
        table.register_alias("svc", "service").unwrap();
        assert!(table.is_alias("service"));
        table.register_alias("service", "service").unwrap();
        assert!(!table.is_alias("service"));
        assert!(!table.remove_alias("service"));
    }
}
