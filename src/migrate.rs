//! Versioned schema migrations for persisted canvas shape records.
//!
//! Records are kept as raw JSON so fields no migration knows about survive a
//! load/save cycle untouched. A [`MigrationSequence`] is an ordered table of
//! upgrades under one stable id; the stored version for that id lives in the
//! snapshot's `schema.sequences` table.

use serde_json::{Map, Value};

use crate::measure::{FontFamily, SizeStyle};

/// Sequence id for discourse node shape props. Never change it: saved
/// canvases look their version up under this key.
pub const DISCOURSE_NODE_SEQUENCE_ID: &str = "com.tldraw.shape.discourse-node";
pub const DISCOURSE_NODE_SHAPE_TYPE: &str = "discourse-node";

pub type AppliesTo = fn(&Value) -> bool;
pub type Upgrade = fn(Value) -> Value;

/// One schema step. `upgrade` must be idempotent and only add fields that
/// are absent.
#[derive(Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub applies_to: AppliesTo,
    pub upgrade: Upgrade,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Migration sequence {0} has no migrations")]
    Empty(String),
    #[error("Migration sequence {sequence}: expected version {expected}, found {found} ({name})")]
    VersionOrder {
        sequence: String,
        expected: u32,
        found: u32,
        name: &'static str,
    },
    #[error("Canvas snapshot is not a JSON object")]
    NotAnObject,
    #[error("Invalid canvas JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// What happened to a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No migration in the sequence applies to this kind of record.
    Skipped,
    UpToDate { version: u32 },
    Migrated { from: u32, to: u32, applied: Vec<u32> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    pub from_version: u32,
    pub to_version: u32,
    pub migrated: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct MigrationSequence {
    id: String,
    migrations: Vec<Migration>,
}

impl MigrationSequence {
    /// Build a sequence. Versions must run 1, 2, 3, ... in table order.
    pub fn new(id: impl Into<String>, migrations: Vec<Migration>) -> Result<Self, MigrationError> {
        let id = id.into();
        if migrations.is_empty() {
            return Err(MigrationError::Empty(id));
        }
        for (i, m) in migrations.iter().enumerate() {
            let expected = i as u32 + 1;
            if m.version != expected {
                return Err(MigrationError::VersionOrder {
                    sequence: id,
                    expected,
                    found: m.version,
                    name: m.name,
                });
            }
        }
        Ok(Self { id, migrations })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn latest_version(&self) -> u32 {
        self.migrations.last().map(|m| m.version).unwrap_or(0)
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Apply every migration newer than `from` that applies to the record,
    /// in ascending version order.
    pub fn migrate_record(&self, record: Value, from: u32) -> (Value, MigrationOutcome) {
        if !self.migrations.iter().any(|m| (m.applies_to)(&record)) {
            return (record, MigrationOutcome::Skipped);
        }
        let latest = self.latest_version();
        if from >= latest {
            if from > latest {
                tracing::warn!(
                    sequence = %self.id,
                    "Record at version {} is newer than latest known {}",
                    from,
                    latest
                );
            }
            return (record, MigrationOutcome::UpToDate { version: from });
        }

        let mut applied = Vec::new();
        let record = self
            .migrations
            .iter()
            .filter(|m| m.version > from)
            .fold(record, |record, m| {
                if (m.applies_to)(&record) {
                    applied.push(m.version);
                    (m.upgrade)(record)
                } else {
                    record
                }
            });

        (
            record,
            MigrationOutcome::Migrated {
                from,
                to: latest,
                applied,
            },
        )
    }

    /// Migrate every record in a canvas snapshot
    /// (`{"store": {...}, "schema": {"sequences": {...}}}`) and stamp the
    /// sequence version.
    pub fn migrate_snapshot(&self, snapshot: &mut Value) -> Result<SnapshotReport, MigrationError> {
        let root = snapshot.as_object_mut().ok_or(MigrationError::NotAnObject)?;
        let from = stored_version(root, &self.id);
        let to = from.max(self.latest_version());

        let mut report = SnapshotReport {
            from_version: from,
            to_version: to,
            ..SnapshotReport::default()
        };

        if let Some(store) = root.get_mut("store") {
            let records: Vec<&mut Value> = match store {
                Value::Object(map) => map.values_mut().collect(),
                Value::Array(list) => list.iter_mut().collect(),
                _ => {
                    tracing::warn!("Canvas store is neither a map nor a list, leaving it as-is");
                    Vec::new()
                }
            };
            for slot in records {
                let record = std::mem::take(slot);
                let (record, outcome) = self.migrate_record(record, from);
                *slot = record;
                match outcome {
                    MigrationOutcome::Skipped => report.skipped += 1,
                    MigrationOutcome::Migrated { .. } => report.migrated += 1,
                    MigrationOutcome::UpToDate { .. } => {}
                }
            }
        }

        stamp_version(root, &self.id, to);
        tracing::debug!(
            sequence = %self.id,
            migrated = report.migrated,
            skipped = report.skipped,
            "Canvas migrated from version {} to {}",
            from,
            to
        );
        Ok(report)
    }

    /// Parse, migrate and re-serialize a snapshot.
    pub fn migrate_snapshot_json(&self, json: &str) -> Result<(String, SnapshotReport), MigrationError> {
        let mut snapshot: Value = serde_json::from_str(json)?;
        let report = self.migrate_snapshot(&mut snapshot)?;
        Ok((serde_json::to_string_pretty(&snapshot)?, report))
    }
}

fn stored_version(root: &Map<String, Value>, id: &str) -> u32 {
    root.get("schema")
        .and_then(|s| s.get("sequences"))
        .and_then(|s| s.get(id))
        .and_then(Value::as_u64)
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

fn stamp_version(root: &mut Map<String, Value>, id: &str, version: u32) {
    let schema = root
        .entry("schema")
        .or_insert_with(|| Value::Object(Map::new()));
    if !schema.is_object() {
        *schema = Value::Object(Map::new());
    }
    let Some(schema) = schema.as_object_mut() else {
        return;
    };
    let sequences = schema
        .entry("sequences")
        .or_insert_with(|| Value::Object(Map::new()));
    if !sequences.is_object() {
        *sequences = Value::Object(Map::new());
    }
    if let Some(sequences) = sequences.as_object_mut() {
        sequences.insert(id.to_string(), Value::from(version));
    }
}

pub fn is_discourse_node_shape(record: &Value) -> bool {
    record.get("typeName").and_then(Value::as_str) == Some("shape")
        && record.get("type").and_then(Value::as_str) == Some(DISCOURSE_NODE_SHAPE_TYPE)
}

/// Set `key` to `default` when absent or null.
fn set_default(props: &mut Map<String, Value>, key: &str, default: &str) {
    match props.get(key) {
        None | Some(Value::Null) => {
            props.insert(key.to_string(), Value::from(default));
        }
        Some(_) => {}
    }
}

fn add_size_and_font_family(mut record: Value) -> Value {
    match record.get_mut("props").and_then(Value::as_object_mut) {
        Some(props) => {
            set_default(props, "size", SizeStyle::default().as_str());
            set_default(props, "fontFamily", FontFamily::default().as_str());
        }
        None => {
            let id = record.get("id").and_then(Value::as_str).unwrap_or("?");
            tracing::warn!(id, "Discourse node shape has no props object, skipping size/font defaults");
        }
    }
    record
}

/// The discourse node shape migrations, oldest first. Append only.
pub fn discourse_node_migrations() -> MigrationSequence {
    let migrations = vec![Migration {
        version: 1,
        name: "addSizeAndFontFamily",
        applies_to: is_discourse_node_shape,
        upgrade: add_size_and_font_family,
    }];
    MigrationSequence {
        id: DISCOURSE_NODE_SEQUENCE_ID.to_string(),
        migrations,
    }
}
