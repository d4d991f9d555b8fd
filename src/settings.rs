//! Plugin settings: node types, relation types and the legal relations
//! between them, plus path and UI preferences.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::format::{validate_node_format, FormatError};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Node type '{name}': {source}")]
    Format {
        name: String,
        #[source]
        source: FormatError,
    },
    #[error("Node type '{0}': {1}")]
    Name(String, NameError),
    #[error("Discourse relation {source_id} -> {destination_id} references unknown {kind} '{id}'")]
    DanglingRelation {
        source_id: String,
        destination_id: String,
        kind: &'static str,
        id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("Name is required")]
    Empty,
    #[error("A node type named '{0}' already exists")]
    Duplicate(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscourseNodeType {
    pub id: String,
    pub name: String,
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Whether shapes of this type show the document's first image.
    #[serde(default)]
    pub key_image: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscourseRelationType {
    pub id: String,
    pub label: String,
    pub complement: String,
    pub color: String,
}

/// A legal relation type between two node types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscourseRelation {
    pub source_id: String,
    pub destination_id: String,
    pub relationship_type_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub node_types: Vec<DiscourseNodeType>,
    #[serde(default)]
    pub relation_types: Vec<DiscourseRelationType>,
    #[serde(default)]
    pub discourse_relations: Vec<DiscourseRelation>,
    /// Folder new discourse nodes are created in. Empty means vault root.
    #[serde(default)]
    pub nodes_folder_path: String,
    #[serde(default = "default_canvas_folder_path")]
    pub canvas_folder_path: String,
    #[serde(default = "default_canvas_attachments_folder_path")]
    pub canvas_attachments_folder_path: String,
    #[serde(default)]
    pub show_ids_in_frontmatter: bool,
}

fn default_canvas_folder_path() -> String {
    "Discourse Canvas".to_string()
}

fn default_canvas_attachments_folder_path() -> String {
    "attachments".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        let node = |id: &str, name: &str, format: &str, color: &str, description: &str| {
            DiscourseNodeType {
                id: id.to_string(),
                name: name.to_string(),
                format: format.to_string(),
                template: None,
                description: Some(description.to_string()),
                shortcut: name.chars().next().map(String::from),
                color: Some(color.to_string()),
                tag: None,
                key_image: false,
            }
        };
        let relation_type = |id: &str, label: &str, complement: &str, color: &str| {
            DiscourseRelationType {
                id: id.to_string(),
                label: label.to_string(),
                complement: complement.to_string(),
                color: color.to_string(),
            }
        };
        let relation = |src: &str, dst: &str, rel: &str| DiscourseRelation {
            source_id: src.to_string(),
            destination_id: dst.to_string(),
            relationship_type_id: rel.to_string(),
        };

        Self {
            node_types: vec![
                node("question", "Question", "QUE - {content}", "#99890e", "Research question"),
                node("claim", "Claim", "CLM - {content}", "#7da13e", "Assertion backed by evidence"),
                node("evidence", "Evidence", "EVD - {content}", "#dc0c4a", "Observation or result"),
            ],
            relation_types: vec![
                relation_type("supports", "supports", "is supported by", "#099268"),
                relation_type("opposes", "opposes", "is opposed by", "#e03131"),
                relation_type("informs", "informs", "is informed by", "#adb5bd"),
            ],
            discourse_relations: vec![
                relation("evidence", "question", "informs"),
                relation("evidence", "claim", "supports"),
                relation("evidence", "claim", "opposes"),
                relation("claim", "question", "informs"),
            ],
            nodes_folder_path: String::new(),
            canvas_folder_path: default_canvas_folder_path(),
            canvas_attachments_folder_path: default_canvas_attachments_folder_path(),
            show_ids_in_frontmatter: false,
        }
    }
}

impl Settings {
    /// Parse settings from JSON. Missing lists are empty, missing folder and
    /// display preferences take their defaults; the built-in node and
    /// relation types are never merged in.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let settings = Self::from_json(&json)?;
        tracing::debug!(
            node_types = settings.node_types.len(),
            relation_types = settings.relation_types.len(),
            "Loaded settings from {}",
            path.display()
        );
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every node type and every discourse relation reference.
    pub fn validate(&self) -> Result<(), SettingsError> {
        for node_type in &self.node_types {
            validate_node_format(&node_type.format).map_err(|source| SettingsError::Format {
                name: node_type.name.clone(),
                source,
            })?;
            validate_node_name(&node_type.name, &self.node_types, Some(&node_type.id))
                .map_err(|e| SettingsError::Name(node_type.name.clone(), e))?;
        }

        let node_ids: HashSet<&str> = self.node_types.iter().map(|n| n.id.as_str()).collect();
        let relation_ids: HashSet<&str> =
            self.relation_types.iter().map(|r| r.id.as_str()).collect();

        for rel in &self.discourse_relations {
            let dangling = |kind: &'static str, id: &str| SettingsError::DanglingRelation {
                source_id: rel.source_id.clone(),
                destination_id: rel.destination_id.clone(),
                kind,
                id: id.to_string(),
            };
            if !node_ids.contains(rel.source_id.as_str()) {
                return Err(dangling("node type", &rel.source_id));
            }
            if !node_ids.contains(rel.destination_id.as_str()) {
                return Err(dangling("node type", &rel.destination_id));
            }
            if !relation_ids.contains(rel.relationship_type_id.as_str()) {
                return Err(dangling("relation type", &rel.relationship_type_id));
            }
        }
        Ok(())
    }
}

/// Validate a node type name against the other configured node types.
/// `current_id` excludes the node type being edited from the duplicate check.
pub fn validate_node_name(
    name: &str,
    node_types: &[DiscourseNodeType],
    current_id: Option<&str>,
) -> Result<(), NameError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(NameError::Empty);
    }
    let duplicate = node_types.iter().any(|n| {
        Some(n.id.as_str()) != current_id && n.name.trim().eq_ignore_ascii_case(trimmed)
    });
    if duplicate {
        return Err(NameError::Duplicate(trimmed.to_string()));
    }
    Ok(())
}
