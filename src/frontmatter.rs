//! YAML frontmatter blocks at the top of markdown documents.

use serde_yaml::{Mapping, Value};

#[derive(Debug, thiserror::Error)]
pub enum FrontmatterError {
    #[error("Invalid frontmatter YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Frontmatter is not a key/value mapping")]
    NotAMapping,
    #[error("Frontmatter block is not closed")]
    Unterminated,
}

/// A markdown document split into its frontmatter and body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document<'a> {
    pub frontmatter: Mapping,
    pub body: &'a str,
}

/// Split `content` into frontmatter and body. Documents without a leading
/// `---` line have empty frontmatter.
pub fn parse(content: &str) -> Result<Document<'_>, FrontmatterError> {
    let Some(rest) = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    else {
        return Ok(Document {
            frontmatter: Mapping::new(),
            body: content,
        });
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let frontmatter = match serde_yaml::from_str::<Value>(yaml)? {
                Value::Null => Mapping::new(),
                Value::Mapping(map) => map,
                _ => return Err(FrontmatterError::NotAMapping),
            };
            return Ok(Document { frontmatter, body });
        }
        offset += line.len();
    }
    Err(FrontmatterError::Unterminated)
}

/// Render frontmatter followed by the body. Empty frontmatter renders no
/// block.
pub fn render(frontmatter: &Mapping, body: &str) -> Result<String, FrontmatterError> {
    if frontmatter.is_empty() {
        return Ok(body.to_string());
    }
    let yaml = serde_yaml::to_string(frontmatter)?;
    let mut out = String::with_capacity(yaml.len() + body.len() + 8);
    out.push_str("---\n");
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("---\n");
    out.push_str(body);
    Ok(out)
}
