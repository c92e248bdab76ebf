use crate::ability::{AbilityDef, Attribute};
use crate::{AbilityError, ConfigError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// TOML layout of an ability file
#[derive(Debug, Deserialize)]
struct AbilityFileConfig {
    #[serde(default)]
    abilities: Vec<AbilityDef>,
}

/// Registry of stone abilities, loaded from TOML files
#[derive(Debug, Clone, Default)]
pub struct AbilityCatalog {
    abilities: HashMap<String, AbilityDef>,
}

impl AbilityCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from definitions; later duplicates are rejected
    pub fn from_defs(defs: impl IntoIterator<Item = AbilityDef>) -> Result<Self, ConfigError> {
        let mut catalog = Self::new();
        for def in defs {
            catalog.insert(def, None)?;
        }
        Ok(catalog)
    }

    /// Load all ability files from a directory (recursively)
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let mut catalog = Self::new();
        catalog.load_dir(dir)?;
        Ok(catalog)
    }

    /// Parse a single ability file's contents
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: AbilityFileConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            error: e,
            path: None,
        })?;
        Self::from_defs(config.abilities)
    }

    fn load_dir(&mut self, dir: &Path) -> Result<(), ConfigError> {
        if !dir.exists() {
            return Ok(());
        }

        let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::Io {
            error: e,
            path: Some(dir.to_path_buf()),
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| ConfigError::Io {
                error: e,
                path: Some(dir.to_path_buf()),
            })?;
            let path = entry.path();

            if path.is_dir() {
                self.load_dir(&path)?;
            } else if path.extension().is_some_and(|ext| ext == "toml") {
                self.load_file(&path)?;
            }
        }

        Ok(())
    }

    fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            error: e,
            path: Some(path.to_path_buf()),
        })?;

        let config: AbilityFileConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            error: e,
            path: Some(path.to_path_buf()),
        })?;

        for def in config.abilities {
            self.insert(def, Some(path))?;
        }
        debug!(path = %path.display(), total = self.abilities.len(), "loaded ability file");
        Ok(())
    }

    fn insert(&mut self, def: AbilityDef, path: Option<&Path>) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::Validation {
            message,
            path: path.map(Path::to_path_buf),
        };

        if def.id.trim().is_empty() {
            return Err(invalid("ability with empty id".to_string()));
        }
        if self.abilities.contains_key(&def.id) {
            return Err(invalid(format!("duplicate ability id '{}'", def.id)));
        }

        self.abilities.insert(def.id.clone(), def);
        Ok(())
    }

    /// Get an ability by ID
    pub fn get(&self, id: &str) -> Option<&AbilityDef> {
        self.abilities.get(id)
    }

    /// Check if an ability exists
    pub fn contains(&self, id: &str) -> bool {
        self.abilities.contains_key(id)
    }

    /// List all ability IDs
    pub fn ability_ids(&self) -> impl Iterator<Item = &str> {
        self.abilities.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.abilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abilities.is_empty()
    }

    /// Resolve an ability that is about to be paid for with `attribute` stones
    pub fn resolve(&self, id: &str, attribute: &Attribute) -> Result<&AbilityDef, AbilityError> {
        let def = self
            .get(id)
            .ok_or_else(|| AbilityError::UnknownAbility(id.to_string()))?;
        if !def.allows(attribute) {
            return Err(AbilityError::AttributeNotAllowed {
                ability: id.to_string(),
                attribute: attribute.clone(),
            });
        }
        Ok(def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::StoneEffect;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_ability_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(format!("{}.toml", name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    const STRIKE: &str = r#"
[[abilities]]
id = "press_the_attack"
name = "Press the Attack"
attributes = ["fire"]

[abilities.effect]
type = "extra_attack"
amount = 1
"#;

    #[test]
    fn test_parse_abilities() {
        let catalog = AbilityCatalog::parse(STRIKE).unwrap();
        let def = catalog.get("press_the_attack").unwrap();
        assert_eq!(def.name, "Press the Attack");
        assert_eq!(def.effect, StoneEffect::ExtraAttack { amount: 1 });
        assert!(def.allows(&Attribute::from("fire")));
        assert!(!def.allows(&Attribute::from("water")));
    }

    #[test]
    fn test_effect_defaults_to_narrative() {
        let catalog = AbilityCatalog::parse(
            r#"
[[abilities]]
id = "taunt"
"#,
        )
        .unwrap();
        let def = catalog.get("taunt").unwrap();
        assert_eq!(def.effect, StoneEffect::Narrative);
        assert!(def.allows(&Attribute::from("anything")));
    }

    #[test]
    fn test_load_directory_recursively() {
        let dir = TempDir::new().unwrap();
        create_ability_file(dir.path(), "fire", STRIKE);
        let nested = dir.path().join("water");
        std::fs::create_dir(&nested).unwrap();
        create_ability_file(
            &nested,
            "flow",
            r#"
[[abilities]]
id = "flowing_step"

[abilities.effect]
type = "extra_movement"
meters = 2
"#,
        );
        std::fs::write(dir.path().join("notes.txt"), "not toml at all [").unwrap();

        let catalog = AbilityCatalog::load(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("press_the_attack"));
        assert!(catalog.contains("flowing_step"));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let catalog = AbilityCatalog::load(&dir.path().join("nope")).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let dir = TempDir::new().unwrap();
        create_ability_file(dir.path(), "a", STRIKE);
        create_ability_file(dir.path(), "b", STRIKE);

        let err = AbilityCatalog::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_parse_error_carries_path() {
        let dir = TempDir::new().unwrap();
        create_ability_file(dir.path(), "broken", "[[abilities]\nid = ");

        match AbilityCatalog::load(dir.path()).unwrap_err() {
            ConfigError::Parse { path, .. } => {
                assert!(path.unwrap().ends_with("broken.toml"));
            }
            other => panic!("Expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve() {
        let catalog = AbilityCatalog::parse(STRIKE).unwrap();
        let fire = Attribute::from("fire");
        let water = Attribute::from("water");

        assert!(catalog.resolve("press_the_attack", &fire).is_ok());
        assert_eq!(
            catalog.resolve("press_the_attack", &water).unwrap_err(),
            AbilityError::AttributeNotAllowed {
                ability: "press_the_attack".to_string(),
                attribute: water.clone(),
            }
        );
        assert_eq!(
            catalog.resolve("fireball", &fire).unwrap_err(),
            AbilityError::UnknownAbility("fireball".to_string())
        );
    }
}
