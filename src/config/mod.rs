//! Configuration module for ui-datasource
//!
//! This module handles:
//! - Project files (`.dsproj.toml`): reflected types, the declared tag
//!   namespace and authored bindings, as consumed by `datasource-check`
//! - Runtime settings for the registry and notifier (see [`settings`])
//!
//! # Project file layout
//!
//! ```toml
//! name = "hud"
//!
//! [[types]]
//! name = "PlayerStats"
//! size = 8
//! fields = [
//!     { name = "health", type = "float", offset = 0, size = 4 },
//!     { name = "mana", type = "float", offset = 4, size = 4 },
//! ]
//!
//! [[namespace]]
//! tag = "player.stats"
//! types = ["PlayerStats"]
//!
//! [[bindings]]
//! id = "hp_bar"
//! tag = "player.stats"
//! path = "health"
//! expect = "float"
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{DatasourceError, Result, ResultExt};
use crate::schema::{EnumDescription, StaticReflection, StructDescription, TypeDescription};
use crate::validator::{BindingDeclaration, DeclaredNamespace, NamespaceEntry};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Project file extension
pub const PROJECT_FILE_EXTENSION: &str = "dsproj.toml";

/// Current project file format version
pub const PROJECT_VERSION: u32 = 1;

fn default_version() -> u32 {
    PROJECT_VERSION
}

/// Authoring-time project description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    /// File format version
    #[serde(default = "default_version")]
    pub version: u32,

    pub name: String,

    /// Reflected struct types
    #[serde(default)]
    pub types: Vec<StructDescription>,

    /// Reflected enum types
    #[serde(default)]
    pub enums: Vec<EnumDescription>,

    /// Tags producers may register, with their candidate types
    #[serde(default)]
    pub namespace: Vec<NamespaceEntry>,

    #[serde(default)]
    pub bindings: Vec<BindingDeclaration>,
}

impl Default for ProjectFile {
    fn default() -> Self {
        Self {
            version: PROJECT_VERSION,
            name: String::new(),
            types: Vec::new(),
            enums: Vec::new(),
            namespace: Vec::new(),
            bindings: Vec::new(),
        }
    }
}

impl ProjectFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Load a project file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read project file {:?}", path))?;

        let project: ProjectFile = toml::from_str(&content)
            .map_err(|e| DatasourceError::Config(e.to_string()))
            .with_context(|| format!("Failed to parse project file {:?}", path))?;

        if project.version > PROJECT_VERSION {
            return Err(DatasourceError::Config(format!(
                "Project file {:?} has version {}, newest supported is {}",
                path, project.version, PROJECT_VERSION
            )));
        }

        tracing::debug!(
            "Loaded project '{}': {} types, {} enums, {} bindings",
            project.name,
            project.types.len(),
            project.enums.len(),
            project.bindings.len()
        );
        Ok(project)
    }

    /// Save the project file to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create project directory")?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| DatasourceError::Serialization(e.to_string()))
            .with_context(|| format!("Failed to serialize project '{}'", self.name))?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write project file {:?}", path))
    }

    /// Reflection provider over the project's declared types
    pub fn reflection(&self) -> StaticReflection {
        let mut reflection = StaticReflection::new();
        for description in &self.types {
            reflection.insert(TypeDescription::Struct(description.clone()));
        }
        for description in &self.enums {
            reflection.insert(TypeDescription::Enum(description.clone()));
        }
        reflection
    }

    pub fn namespace(&self) -> Result<DeclaredNamespace> {
        Ok(DeclaredNamespace::from_entries(&self.namespace)?)
    }

    pub fn with_type(mut self, description: StructDescription) -> Self {
        self.types.push(description);
        self
    }

    pub fn with_enum(mut self, description: EnumDescription) -> Self {
        self.enums.push(description);
        self
    }

    pub fn with_namespace(mut self, entry: NamespaceEntry) -> Self {
        self.namespace.push(entry);
        self
    }

    pub fn with_binding(mut self, binding: BindingDeclaration) -> Self {
        self.bindings.push(binding);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, ReflectionProvider};
    use crate::types::TypeTag;

    const SAMPLE: &str = r#"
name = "hud"

[[types]]
name = "PlayerStats"
size = 12
fields = [
    { name = "health", type = "float", offset = 0, size = 4 },
    { name = "stance", type = { enum = "Stance" }, offset = 4, size = 1 },
    { name = "slots", type = { array = { element = "int", count = 2 } }, offset = 8, size = 4 },
]

[[enums]]
name = "Stance"
variants = [{ name = "Idle", value = 0 }, { name = "Guard", value = 1 }]

[[namespace]]
tag = "player.stats"
types = ["PlayerStats"]

[[namespace]]
tag = "enemy"
children = ["PlayerStats"]

[[bindings]]
id = "hp_bar"
tag = "player.stats"
path = "health"
expect = "float"
"#;

    #[test]
    fn test_parse_sample() {
        let project: ProjectFile = toml::from_str(SAMPLE).unwrap();
        assert_eq!(project.version, PROJECT_VERSION);
        assert_eq!(project.types[0].fields.len(), 3);
        assert_eq!(
            project.types[0].fields[2].ty,
            FieldType::array(FieldType::Int, 2)
        );
        assert_eq!(project.bindings[0].expect, Some(TypeTag::Float));

        let reflection = project.reflection();
        assert_eq!(reflection.len(), 2);
        assert!(reflection.describe("Stance").is_some());
        assert_eq!(project.namespace().unwrap().len(), 2);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hud").join("hud.dsproj.toml");
        let project: ProjectFile = toml::from_str(SAMPLE).unwrap();
        project.save(&path).unwrap();
        assert_eq!(ProjectFile::load(&path).unwrap(), project);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ProjectFile::load(dir.path().join("absent.dsproj.toml")).unwrap_err();
        assert!(matches!(missing.root_cause(), DatasourceError::Io(_)));
        assert!(missing.to_string().starts_with("Failed to read project file"));

        let future = dir.path().join("future.dsproj.toml");
        std::fs::write(&future, "version = 99\nname = \"x\"\n").unwrap();
        let err = ProjectFile::load(&future).unwrap_err();
        assert!(err.to_string().contains("version 99"));
    }

    #[test]
    fn test_bad_namespace_tag() {
        let project = ProjectFile::new("bad").with_namespace(NamespaceEntry {
            tag: "has space".into(),
            types: vec![],
            children: vec![],
        });
        assert!(matches!(project.namespace(), Err(DatasourceError::Tag(_))));
    }
}
