//! Saving and loading documents
//!
//! A save file is JSON holding both graphs plus the evaluation settings.

use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::PersistenceError;
use crate::evaluation::{Document, EditingContext, TimeSettings};
use crate::nodes::factory::NodeRegistry;
use crate::nodes::persistence::GraphSnapshot;

/// Save file data structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveData {
    pub version: String,
    pub metadata: SaveMetadata,
    pub context: EditingContext,
    pub time: TimeSettings,
    pub resolution: [u32; 2],
    pub composite: GraphSnapshot,
    pub scene: GraphSnapshot,
}

/// Metadata for save files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveMetadata {
    /// RFC 3339 timestamps
    pub created: String,
    pub modified: String,
    pub creator: String,
    pub description: String,
}

impl SaveData {
    pub fn capture(document: &Document, created: Option<&str>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            version: constants::FILE_FORMAT_VERSION.to_string(),
            metadata: SaveMetadata {
                created: created.map(str::to_string).unwrap_or_else(|| now.clone()),
                modified: now,
                creator: constants::CREATOR.to_string(),
                description: String::new(),
            },
            context: document.context,
            time: document.time,
            resolution: document.resolution,
            composite: GraphSnapshot::capture(&document.composite),
            scene: GraphSnapshot::capture(&document.scene),
        }
    }

    /// Rebuild a document; results of earlier evaluations are not saved
    pub fn restore(&self, registry: &NodeRegistry) -> Result<Document, PersistenceError> {
        Ok(Document {
            composite: self.composite.restore(registry)?,
            scene: self.scene.restore(registry)?,
            context: self.context,
            time: self.time,
            resolution: self.resolution,
            ..Document::default()
        })
    }
}

/// Tracks the file a document belongs to
#[derive(Debug, Default)]
pub struct FileManager {
    /// None for a new, unsaved document
    current_file_path: Option<PathBuf>,
    created: Option<String>,
    is_modified: bool,
}

impl FileManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_file_path(&self) -> Option<&PathBuf> {
        self.current_file_path.as_ref()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.is_modified
    }

    pub fn mark_modified(&mut self) {
        self.is_modified = true;
    }

    /// File name with a `*` when modified
    pub fn display_name(&self) -> String {
        let name = self
            .current_file_path
            .as_ref()
            .and_then(|path| path.file_name())
            .and_then(|name| name.to_str())
            .unwrap_or("Untitled");
        if self.is_modified {
            format!("{}*", name)
        } else {
            name.to_string()
        }
    }

    pub fn new_file(&mut self) {
        *self = Self::default();
    }

    pub fn save_to_file(&mut self, path: &Path, document: &Document) -> Result<(), PersistenceError> {
        let data = SaveData::capture(document, self.created.as_deref());
        std::fs::write(path, serde_json::to_string_pretty(&data)?)?;
        info!("Saved {}", path.display());

        self.current_file_path = Some(path.to_path_buf());
        self.created = Some(data.metadata.created);
        self.is_modified = false;
        Ok(())
    }

    /// Save to the current path
    pub fn save(&mut self, document: &Document) -> Result<(), PersistenceError> {
        let path = self.current_file_path.clone().ok_or_else(|| {
            PersistenceError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "no file path set"))
        })?;
        self.save_to_file(&path, document)
    }

    pub fn load_from_file(&mut self, path: &Path, registry: &NodeRegistry) -> Result<Document, PersistenceError> {
        let content = std::fs::read_to_string(path)?;
        let data: SaveData = serde_json::from_str(&content)?;
        let document = data.restore(registry)?;
        info!("Loaded {} (format {})", path.display(), data.version);

        self.current_file_path = Some(path.to_path_buf());
        self.created = Some(data.metadata.created);
        self.is_modified = false;
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::factory::builtin_registry;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("opgraph-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_display_name() {
        let mut manager = FileManager::new();
        assert_eq!(manager.display_name(), "Untitled");
        manager.mark_modified();
        assert_eq!(manager.display_name(), "Untitled*");
    }

    #[test]
    fn test_save_without_path_fails() {
        let mut manager = FileManager::new();
        assert!(manager.save(&Document::new()).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let registry = builtin_registry();
        let mut document = Document::new();
        document.context = EditingContext::Scene;
        document.time.current = 42;
        let object = document.scene.add_node(registry.create_node("scene.object").unwrap());
        document.scene.active_node = Some(object);

        let path = temp_path();
        let mut manager = FileManager::new();
        manager.mark_modified();
        manager.save_to_file(&path, &document).unwrap();
        assert!(!manager.has_unsaved_changes());
        assert_eq!(manager.current_file_path(), Some(&path));

        let mut other = FileManager::new();
        let loaded = other.load_from_file(&path, registry).unwrap();
        assert_eq!(loaded.context, EditingContext::Scene);
        assert_eq!(loaded.time.current, 42);
        assert_eq!(loaded.scene.len(), 1);
        assert_eq!(loaded.scene.active_node, loaded.scene.find_node("Object"));
        assert_eq!(other.created, manager.created);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_resave_keeps_creation_time() {
        let path = temp_path();
        let mut manager = FileManager::new();
        manager.save_to_file(&path, &Document::new()).unwrap();
        let created = manager.created.clone();
        manager.save(&Document::new()).unwrap();
        assert_eq!(manager.created, created);
        std::fs::remove_file(&path).unwrap();
    }
}
