//! A vault of markdown files on disk, used by the CLI as metadata store and
//! link resolver.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::frontmatter;
use crate::sync::{Frontmatter, LinkResolver, MetadataMutator, MetadataStore, StoreError};

/// Markdown documents under `root`, addressed by `/`-separated paths
/// relative to it.
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
    documents: Vec<String>,
}

impl FsVault {
    /// Open a vault and index its markdown files.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let mut files = Vec::new();
        collect_md_files(&root, &mut files).map_err(|source| StoreError::Io {
            path: root.display().to_string(),
            source,
        })?;

        let mut documents: Vec<String> = files
            .iter()
            .filter_map(|p| p.strip_prefix(&root).ok())
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .collect();
        documents.sort();

        tracing::debug!("Indexed {} documents under {}", documents.len(), root.display());
        Ok(Self { root, documents })
    }

    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    fn full_path(&self, doc: &str) -> PathBuf {
        self.root.join(doc)
    }

    fn read(&self, doc: &str) -> Result<String, StoreError> {
        let path = self.full_path(doc);
        if !path.is_file() {
            return Err(StoreError::NotFound(doc.to_string()));
        }
        fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: doc.to_string(),
            source,
        })
    }

    fn contains(&self, doc: &str) -> bool {
        self.documents.binary_search_by(|d| d.as_str().cmp(doc)).is_ok()
    }

    fn with_basename<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s String> + 's {
        self.documents.iter().filter(move |d| stem(d) == name)
    }
}

fn collect_md_files(root: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        if path.is_dir() {
            collect_md_files(&path, out)?;
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) == Some("md") {
            out.push(path);
        }
    }
    Ok(())
}

/// File name without directory or `.md` extension.
fn stem(doc: &str) -> &str {
    let name = doc.rsplit('/').next().unwrap_or(doc);
    name.strip_suffix(".md").unwrap_or(name)
}

fn parent(doc: &str) -> &str {
    doc.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn with_md(path: &str) -> String {
    if path.ends_with(".md") {
        path.to_string()
    } else {
        format!("{path}.md")
    }
}

#[async_trait]
impl MetadataStore for FsVault {
    async fn read_metadata(&self, doc: &str) -> Result<Frontmatter, StoreError> {
        let content = self.read(doc)?;
        Ok(frontmatter::parse(&content)?.frontmatter)
    }

    async fn update_metadata(
        &self,
        doc: &str,
        mutator: &mut MetadataMutator<'_>,
    ) -> Result<(), StoreError> {
        let content = self.read(doc)?;
        let parsed = frontmatter::parse(&content)?;
        let mut fm = parsed.frontmatter;
        mutator(&mut fm);

        let rendered = frontmatter::render(&fm, parsed.body)?;
        if rendered != content {
            fs::write(self.full_path(doc), rendered).map_err(|source| StoreError::Io {
                path: doc.to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

impl LinkResolver for FsVault {
    fn resolve_link_target(&self, raw: &str, relative_to: &str) -> Option<String> {
        let target = raw.split('#').next().unwrap_or(raw).trim();
        if target.is_empty() {
            return None;
        }

        if target.contains('/') {
            let candidates = [
                with_md(target),
                with_md(&format!("{}/{}", parent(relative_to), target)),
            ];
            return candidates
                .into_iter()
                .map(|c| c.trim_start_matches('/').to_string())
                .find(|c| self.contains(c));
        }

        let name = target.strip_suffix(".md").unwrap_or(target);
        let dir = parent(relative_to);
        self.with_basename(name)
            .find(|d| parent(d) == dir)
            .or_else(|| self.with_basename(name).next())
            .cloned()
    }

    fn canonical_link_text(&self, doc: &str, _relative_to: &str) -> String {
        let name = stem(doc);
        if self.with_basename(name).count() > 1 {
            doc.strip_suffix(".md").unwrap_or(doc).to_string()
        } else {
            name.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::sync::RelationSynchronizer;
    use serde_yaml::Value;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sample_vault() -> (tempfile::TempDir, FsVault) {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Discourse Nodes/EVD - Mice sleep more.md", "Mice slept 2h longer.\n");
        write(
            dir.path(),
            "Discourse Nodes/CLM - Sleep aids memory.md",
            "---\nnodeTypeId: claim\n---\nClaim body\n",
        );
        write(dir.path(), "a/Notes.md", "");
        write(dir.path(), "b/Notes.md", "");
        write(dir.path(), ".obsidian/ignored.md", "");
        write(dir.path(), "image.png", "");
        let vault = FsVault::open(dir.path()).unwrap();
        (dir, vault)
    }

    #[test]
    fn test_indexes_markdown_only() {
        let (_dir, vault) = sample_vault();
        assert_eq!(
            vault.documents(),
            &[
                "Discourse Nodes/CLM - Sleep aids memory.md",
                "Discourse Nodes/EVD - Mice sleep more.md",
                "a/Notes.md",
                "b/Notes.md",
            ]
        );
    }

    #[test]
    fn test_resolve_links() {
        let (_dir, vault) = sample_vault();
        assert_eq!(
            vault.resolve_link_target("CLM - Sleep aids memory", "x.md").as_deref(),
            Some("Discourse Nodes/CLM - Sleep aids memory.md")
        );
        assert_eq!(
            vault.resolve_link_target("Notes", "b/Other.md").as_deref(),
            Some("b/Notes.md")
        );
        assert_eq!(
            vault.resolve_link_target("a/Notes#Heading", "b/Other.md").as_deref(),
            Some("a/Notes.md")
        );
        assert_eq!(vault.resolve_link_target("Missing", "x.md"), None);
    }

    #[test]
    fn test_canonical_link_text() {
        let (_dir, vault) = sample_vault();
        assert_eq!(
            vault.canonical_link_text("Discourse Nodes/CLM - Sleep aids memory.md", "x.md"),
            "CLM - Sleep aids memory"
        );
        assert_eq!(vault.canonical_link_text("a/Notes.md", "x.md"), "a/Notes");
    }

    #[tokio::test]
    async fn test_link_relation_on_disk() {
        let (dir, vault) = sample_vault();
        let settings = Settings::default();
        let evidence = "Discourse Nodes/EVD - Mice sleep more.md";
        let claim = "Discourse Nodes/CLM - Sleep aids memory.md";
        let sync = RelationSynchronizer::new(&settings, &vault, &vault);

        sync.link_relation(evidence, claim, "supports").await.unwrap();
        sync.link_relation(evidence, claim, "supports").await.unwrap();

        let claim_fm = vault.read_metadata(claim).await.unwrap();
        assert_eq!(claim_fm.get("nodeTypeId").and_then(Value::as_str), Some("claim"));
        let links = claim_fm.get("supports").and_then(Value::as_sequence).unwrap();
        assert_eq!(links, &vec![Value::String("[[EVD - Mice sleep more]]".to_string())]);

        let text = fs::read_to_string(dir.path().join(evidence)).unwrap();
        assert!(text.starts_with("---\nsupports:\n"));
        assert!(text.ends_with("---\nMice slept 2h longer.\n"));
    }

    #[tokio::test]
    async fn test_missing_document() {
        let (_dir, vault) = sample_vault();
        let err = vault.read_metadata("nope.md").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
