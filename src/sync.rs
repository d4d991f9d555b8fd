//! Writes relation links into both endpoint documents' frontmatter.
//!
//! For a relation `source -R-> target`, `source`'s list under `R.id` gains a
//! link to `target` and `target`'s list under the same key gains a link to
//! `source`. Links are compared by their normalized form, so linking the same
//! pair twice changes nothing.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_yaml::Value;

use crate::frontmatter::FrontmatterError;
use crate::registry::Registry;
use crate::settings::Settings;

/// A document's structured metadata block.
pub type Frontmatter = serde_yaml::Mapping;

/// Edit applied to a document's metadata inside [`MetadataStore::update_metadata`].
pub type MetadataMutator<'f> = dyn for<'m> FnMut(&'m mut Frontmatter) + Send + 'f;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Frontmatter(#[from] FrontmatterError),
    #[error("{0}")]
    Other(String),
}

/// Host access to document metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn read_metadata(&self, doc: &str) -> Result<Frontmatter, StoreError>;

    /// Read, mutate and write back one document's metadata as a single step.
    async fn update_metadata(
        &self,
        doc: &str,
        mutator: &mut MetadataMutator<'_>,
    ) -> Result<(), StoreError>;
}

/// Host link resolution.
pub trait LinkResolver: Send + Sync {
    /// Document a link target (without brackets) points to, seen from
    /// `relative_to`.
    fn resolve_link_target(&self, raw: &str, relative_to: &str) -> Option<String>;

    /// Text that links to `doc` from `relative_to`, without brackets.
    fn canonical_link_text(&self, doc: &str, relative_to: &str) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    SourceToTarget,
    TargetToSource,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceToTarget => f.write_str("source -> target"),
            Self::TargetToSource => f.write_str("target -> source"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Unknown relation type: {0}")]
    UnknownRelationType(String),
    #[error("Failed to write {direction} link for relation '{relation}' in {document}: {source}")]
    WriteFailed {
        relation: String,
        direction: Direction,
        document: String,
        #[source]
        source: StoreError,
    },
    #[error(
        "Relation '{relation}' half applied: {applied} link written, {failed} link failed in {document}: {source}"
    )]
    PartialSync {
        relation: String,
        applied: Direction,
        failed: Direction,
        document: String,
        #[source]
        source: StoreError,
    },
}

/// Whether each direction added a new link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOutcome {
    pub forward_added: bool,
    pub reverse_added: bool,
}

/// Per-document async locks so read-modify-write cycles on one document
/// never interleave. Entries live only while some task holds or awaits them.
#[derive(Debug, Default)]
struct DocumentLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DocumentLocks {
    fn lock_for(&self, doc: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(doc.to_string()).or_default().clone()
    }

    /// Give back a lock obtained from [`Self::lock_for`], dropping the entry
    /// when no other task refers to it.
    fn release(&self, doc: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if map.get(doc).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            map.remove(doc);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Strip `[[...]]` decoration and resolve to the canonical link text seen
/// from `relative_to`. Unresolvable links become their bare target, without
/// alias.
pub fn normalize_link<R: LinkResolver + ?Sized>(resolver: &R, link: &str, relative_to: &str) -> String {
    let trimmed = link.trim();
    let stripped = trimmed.strip_prefix("[[").unwrap_or(trimmed);
    let stripped = stripped.strip_suffix("]]").unwrap_or(stripped);
    let target = stripped.split('|').next().unwrap_or(stripped).trim();

    match resolver.resolve_link_target(target, relative_to) {
        Some(doc) => resolver.canonical_link_text(&doc, relative_to),
        None => target.to_string(),
    }
}

pub struct RelationSynchronizer<'a, S, R> {
    settings: &'a Settings,
    store: &'a S,
    resolver: &'a R,
    locks: DocumentLocks,
}

impl<'a, S, R> RelationSynchronizer<'a, S, R>
where
    S: MetadataStore,
    R: LinkResolver,
{
    pub fn new(settings: &'a Settings, store: &'a S, resolver: &'a R) -> Self {
        Self {
            settings,
            store,
            resolver,
            locks: DocumentLocks::default(),
        }
    }

    /// Record `source -relation-> target` in both documents.
    pub async fn link_relation(
        &self,
        source: &str,
        target: &str,
        relation_type_id: &str,
    ) -> Result<LinkOutcome, SyncError> {
        let key = self.relation_key(relation_type_id)?;

        let forward_added = self
            .append_link(source, target, &key)
            .await
            .map_err(|e| SyncError::WriteFailed {
                relation: key.clone(),
                direction: Direction::SourceToTarget,
                document: source.to_string(),
                source: e,
            })?;

        let reverse_added = match self.append_link(target, source, &key).await {
            Ok(added) => added,
            Err(e) => {
                tracing::error!(
                    relation = %key,
                    "Linked {} -> {} but failed the reciprocal write: {}",
                    source,
                    target,
                    e
                );
                return Err(SyncError::PartialSync {
                    relation: key,
                    applied: Direction::SourceToTarget,
                    failed: Direction::TargetToSource,
                    document: target.to_string(),
                    source: e,
                });
            }
        };

        tracing::debug!(
            relation = %key,
            forward_added,
            reverse_added,
            "Linked {} -> {}",
            source,
            target
        );
        Ok(LinkOutcome {
            forward_added,
            reverse_added,
        })
    }

    /// Write a single direction, e.g. to finish a relation after
    /// [`SyncError::PartialSync`]. Returns whether a link was added.
    pub async fn link_direction(
        &self,
        source: &str,
        target: &str,
        relation_type_id: &str,
        direction: Direction,
    ) -> Result<bool, SyncError> {
        let key = self.relation_key(relation_type_id)?;
        let (doc, other) = match direction {
            Direction::SourceToTarget => (source, target),
            Direction::TargetToSource => (target, source),
        };
        self.append_link(doc, other, &key)
            .await
            .map_err(|e| SyncError::WriteFailed {
                relation: key,
                direction,
                document: doc.to_string(),
                source: e,
            })
    }

    fn relation_key(&self, relation_type_id: &str) -> Result<String, SyncError> {
        match Registry::new(self.settings).relation_type(relation_type_id) {
            Some(relation_type) => Ok(relation_type.id.clone()),
            None => {
                tracing::warn!("Cannot link documents: unknown relation type {}", relation_type_id);
                Err(SyncError::UnknownRelationType(relation_type_id.to_string()))
            }
        }
    }

    /// Append a link to `other` under `key` in `doc`, unless an equivalent
    /// link is already there.
    async fn append_link(&self, doc: &str, other: &str, key: &str) -> Result<bool, StoreError> {
        let lock = self.locks.lock_for(doc);
        let result = {
            let _guard = lock.lock().await;
            self.write_link(doc, other, key).await
        };
        self.locks.release(doc, lock);
        result
    }

    async fn write_link(&self, doc: &str, other: &str, key: &str) -> Result<bool, StoreError> {
        let resolver = self.resolver;
        let link = format!("[[{}]]", resolver.canonical_link_text(other, doc));
        let candidate = normalize_link(resolver, &link, doc);
        let key = Value::String(key.to_string());
        let mut added = false;

        self.store
            .update_metadata(doc, &mut |fm: &mut Frontmatter| {
                let mut links = match fm.get(&key) {
                    Some(Value::Sequence(seq)) => seq.clone(),
                    _ => Vec::new(),
                };
                let present = links
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|existing| normalize_link(resolver, existing, doc) == candidate);
                if present {
                    added = false;
                    return;
                }
                links.push(Value::String(link.clone()));
                fm.insert(key.clone(), Value::Sequence(links));
                added = true;
            })
            .await?;

        Ok(added)
    }
}
