//! Persisted document: the theme and every object of the canvas.
//!
//! JSON with camelCase keys; objects are tagged by `"type"`. A live connection
//! is never persisted, so every bridge is written (and read back) as
//! `disconnected`.

use crate::error::{Result, WireCanvasError};
use crate::graph::Object;
use crate::types::{ConnectionStatus, Theme};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Snapshot of the whole canvas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    pub theme: Theme,
    pub objects: Vec<Object>,
}

impl Document {
    pub fn new(theme: Theme, objects: Vec<Object>) -> Self {
        let mut document = Self { theme, objects };
        document.reset_connections();
        document
    }

    /// Force every bridge to `disconnected`.
    fn reset_connections(&mut self) {
        for object in &mut self.objects {
            if let Some(bridge) = object.as_bridge_mut() {
                bridge.connection_status = ConnectionStatus::Disconnected;
            }
        }
    }

    /// Parse a document from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        let mut document: Self = serde_json::from_str(content)?;
        document.reset_connections();
        Ok(document)
    }

    /// Serialize as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        let mut persisted = self.clone();
        persisted.reset_connections();
        Ok(serde_json::to_string_pretty(&persisted)?)
    }

    /// Load a document from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            WireCanvasError::Config(format!("Failed to read document {:?}: {}", path, e))
        })?;
        Self::from_json(&content).map_err(|e| e.with_context(format!("Parsing {:?}", path)))
    }

    /// Load a document, starting empty only if the file does not exist yet.
    ///
    /// A file that exists but does not parse is an error: the caller saves back
    /// to the same path, so an empty fallback would overwrite the user's canvas.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No document at {:?}, starting empty", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Save the document to disk as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                WireCanvasError::Config(format!("Failed to create document directory: {}", e))
            })?;
        }

        let content = self.to_json()?;
        std::fs::write(path, content).map_err(|e| {
            WireCanvasError::Config(format!("Failed to write document {:?}: {}", path, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{InputMapping, Instruction, OutputMapping, OutputMode, ShapeKind};
    use crate::types::{PropertyMap, PropertyValue};
    use tempfile::TempDir;

    fn sample() -> Document {
        let mut slider = Object::slider("s1");
        slider.merge(
            &PropertyMap::new()
                .with("targetId", "c1")
                .with("targetProperty", "width")
                .with("value", 42.5),
        );
        let mut block = Object::sequenced_block("b1");
        if let Some(b) = block.as_block_mut() {
            b.push_instruction(Instruction::new("c1", "x", 10.0));
            b.push_instruction(Instruction::new("c1", "x", 20.0));
        }
        let mut bridge = Object::bridge("br");
        if let Some(b) = bridge.as_bridge_mut() {
            b.connection_status = ConnectionStatus::Connected;
            b.input_mappings.push(InputMapping::default());
            b.output_mappings.push(OutputMapping {
                source_id: Some("s1".into()),
                property: Some("value".into()),
                pin: 9,
                mode: OutputMode::Pwm,
            });
        }
        Document {
            theme: Theme {
                name: "dark".to_string(),
                background_color: "#101010".to_string(),
            },
            objects: vec![Object::shape("c1", ShapeKind::Circle), slider, Object::switch("sw"), block, bridge],
        }
    }

    #[test]
    fn test_document_json_shape() {
        let json: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert_eq!(json["theme"]["backgroundColor"], "#101010");
        assert_eq!(json["objects"][0]["type"], "shape");
        assert_eq!(json["objects"][1]["value"], 42.5);
        assert_eq!(json["objects"][3]["type"], "sequencedBlock");
        assert_eq!(json["objects"][3]["instructions"][1]["order"], 2);
        assert_eq!(json["objects"][4]["connectionStatus"], "disconnected");
        assert_eq!(json["objects"][4]["outputMappings"][0]["mode"], "PWM");
        assert_eq!(json["objects"][4]["inputMappings"][0]["mode"], "Analog");
    }

    #[test]
    fn test_load_save_is_stable() {
        let first = sample().to_json().unwrap();
        let reloaded = Document::from_json(&first).unwrap();
        let second = reloaded.to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_hand_written_document_round_trips() {
        let text = r##"{
          "theme": {"name": "light", "backgroundColor": "#ffffff"},
          "objects": [
            {"type": "shape", "id": "c", "kind": "rect", "x": 5, "label": "door"},
            {"type": "switch", "id": "sw", "valueOn": "255", "currentState": 1},
            {"type": "bridge", "id": "br", "connectionStatus": "connected"}
          ]
        }"##;
        let doc = Document::from_json(text).unwrap();
        assert_eq!(doc.objects.len(), 3);
        assert_eq!(doc.objects[0].get("label"), Some(PropertyValue::Text("door".into())));
        assert_eq!(doc.objects[1].numeric("currentState"), Some(1.0));
        assert_eq!(
            doc.objects[2].as_bridge().map(|b| b.connection_status),
            Some(ConnectionStatus::Disconnected)
        );

        let json: serde_json::Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
        assert_eq!(json["objects"][0]["x"], 5);
        assert_eq!(json["objects"][0]["label"], "door");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docs").join("board.json");
        let doc = sample();
        doc.save(&path).unwrap();

        let loaded = Document::load(&path).unwrap();
        assert_eq!(loaded.theme, doc.theme);
        assert_eq!(loaded.objects.len(), doc.objects.len());
        assert_eq!(loaded.objects[1], doc.objects[1]);
    }

    #[test]
    fn test_open_refuses_unparseable_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Document::open(&path).is_err());
        assert!(Document::load(&path).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_open_refuses_one_bad_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.json");
        let text = r#"{"objects": [
            {"type": "slider", "id": "s1", "value": 10},
            {"type": "switch", "id": "sw", "currentState": true}
        ]}"#;
        std::fs::write(&path, text).unwrap();
        assert!(Document::open(&path).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert_eq!(Document::open(dir.path().join("absent.json")).unwrap(), Document::default());
    }
}
