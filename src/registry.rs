//! Read-only lookups over [`Settings`].

use crate::format::compile;
use crate::settings::{DiscourseNodeType, DiscourseRelationType, Settings};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),
    #[error("Unknown relation type: {0}")]
    UnknownRelationType(String),
}

/// A relation type as seen from one endpoint, with the label that reads
/// correctly from that side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectedRelation<'a> {
    pub relation_type: &'a DiscourseRelationType,
    pub label: &'a str,
    /// True when the queried source is the relation's declared destination.
    pub reversed: bool,
}

pub struct Registry<'a> {
    settings: &'a Settings,
}

impl<'a> Registry<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    pub fn node_type(&self, id: &str) -> Option<&'a DiscourseNodeType> {
        self.settings.node_types.iter().find(|n| n.id == id)
    }

    pub fn relation_type(&self, id: &str) -> Option<&'a DiscourseRelationType> {
        self.settings.relation_types.iter().find(|r| r.id == id)
    }

    pub fn require_node_type(&self, id: &str) -> Result<&'a DiscourseNodeType, RegistryError> {
        self.node_type(id)
            .ok_or_else(|| RegistryError::UnknownNodeType(id.to_string()))
    }

    pub fn require_relation_type(
        &self,
        id: &str,
    ) -> Result<&'a DiscourseRelationType, RegistryError> {
        self.relation_type(id)
            .ok_or_else(|| RegistryError::UnknownRelationType(id.to_string()))
    }

    /// Node type display name, or an empty string for a stale id.
    pub fn node_type_name(&self, id: &str) -> &'a str {
        match self.node_type(id) {
            Some(node_type) => &node_type.name,
            None => {
                tracing::debug!("Node type {} not found, using empty name", id);
                ""
            }
        }
    }

    pub fn relation_allowed(&self, source_id: &str, destination_id: &str, relation_id: &str) -> bool {
        self.settings.discourse_relations.iter().any(|r| {
            r.source_id == source_id
                && r.destination_id == destination_id
                && r.relationship_type_id == relation_id
        })
    }

    /// Relation types legal between two node types in either direction.
    /// A relation declared `other -> node` is reported with its complement
    /// label.
    pub fn relation_types_between(
        &self,
        node_id: &str,
        other_id: &str,
    ) -> Vec<DirectedRelation<'a>> {
        let mut out: Vec<DirectedRelation<'a>> = Vec::new();
        for rel in &self.settings.discourse_relations {
            let reversed = if rel.source_id == node_id && rel.destination_id == other_id {
                false
            } else if rel.source_id == other_id && rel.destination_id == node_id {
                true
            } else {
                continue;
            };
            let Some(relation_type) = self.relation_type(&rel.relationship_type_id) else {
                continue;
            };
            let already = out
                .iter()
                .any(|d| d.relation_type.id == relation_type.id && d.reversed == reversed);
            if already {
                continue;
            }
            let label = if reversed {
                relation_type.complement.as_str()
            } else {
                relation_type.label.as_str()
            };
            out.push(DirectedRelation {
                relation_type,
                label,
                reversed,
            });
        }
        out
    }

    /// First node type whose format matches the title.
    pub fn node_type_for_title(&self, title: &str) -> Option<&'a DiscourseNodeType> {
        self.settings.node_types.iter().find(|n| {
            compile(&n.format)
                .map(|m| m.is_match(title))
                .unwrap_or(false)
        })
    }
}
