use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use forgeline_core::{ForgeError, ForgeResult};
use tracing::warn;

/// A prompt template loaded from disk: its raw text (with `<<NAME>>`
/// placeholder tokens still present) and the placeholders it declares it
/// recognizes.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub name: String,
    pub version: String,
    pub raw_text: String,
    pub placeholders: Vec<String>,
}

impl PromptTemplate {
    /// Render the template, substituting every `<<NAME>>` token found in
    /// `fields`. Placeholders with no matching field remain literal in the
    /// output; unfilled placeholders are a warning, never an error.
    pub fn render(&self, fields: &HashMap<String, String>) -> String {
        let mut out = self.raw_text.clone();
        for (key, value) in fields {
            out = out.replace(&format!("<<{key}>>"), value);
        }
        for placeholder in &self.placeholders {
            if out.contains(&format!("<<{placeholder}>>")) {
                warn!(
                    template = %self.name,
                    version = %self.version,
                    placeholder,
                    "prompt placeholder left unfilled"
                );
            }
        }
        out
    }
}

fn extract_placeholders(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("<<") {
        let after = &rest[start + 2..];
        if let Some(end) = after.find(">>") {
            let name = &after[..end];
            if !name.is_empty() && name.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
                let name = name.to_string();
                if !found.contains(&name) {
                    found.push(name);
                }
            }
            rest = &after[end + 2..];
        } else {
            break;
        }
    }
    found
}

/// Loads `<name>_prompt_<version>.md` files from a template directory,
/// caching the parsed [`PromptTemplate`] in memory after first load.
pub struct PromptLoader {
    dir: PathBuf,
    cache: RwLock<HashMap<(String, String), PromptTemplate>>,
}

impl PromptLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Load (or return the cached) template for `name`+`version`.
    pub async fn load(&self, name: &str, version: &str) -> ForgeResult<PromptTemplate> {
        let key = (name.to_string(), version.to_string());
        if let Some(template) = self.cache.read().expect("cache lock poisoned").get(&key) {
            return Ok(template.clone());
        }
        self.reload(name, version).await
    }

    /// Force a fresh read from disk, bypassing and refreshing the cache.
    /// Exposed for tests that edit a template mid-run.
    pub async fn reload(&self, name: &str, version: &str) -> ForgeResult<PromptTemplate> {
        let filename = format!("{name}_prompt_{version}.md");
        let path = self.dir.join(&filename);
        let raw_text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ForgeError::IoFailure(format!("reading prompt template {}: {e}", path.display()))
        })?;
        let placeholders = extract_placeholders(&raw_text);
        let template = PromptTemplate {
            name: name.to_string(),
            version: version.to_string(),
            raw_text,
            placeholders,
        };

        self.cache
            .write()
            .expect("cache lock poisoned")
            .insert((name.to_string(), version.to_string()), template.clone());

        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_template(dir: &std::path::Path, name: &str, version: &str, contents: &str) {
        tokio::fs::write(dir.join(format!("{name}_prompt_{version}.md")), contents)
            .await
            .expect("write template");
    }

    #[tokio::test]
    async fn render_substitutes_known_placeholders() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_template(dir.path(), "architecture", "v1", "Target MCU: <<MCU>>\n<<CONSTRAINTS>>").await;

        let loader = PromptLoader::new(dir.path());
        let template = loader.load("architecture", "v1").await.expect("load ok");

        let mut fields = HashMap::new();
        fields.insert("MCU".to_string(), "ESP32".to_string());
        fields.insert("CONSTRAINTS".to_string(), "low power".to_string());

        let rendered = template.render(&fields);
        assert_eq!(rendered, "Target MCU: ESP32\nlow power");
    }

    #[tokio::test]
    async fn unfilled_placeholder_remains_literal() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_template(dir.path(), "code", "v2", "Module: <<MODULE>>, extra: <<RAG_CONTEXT>>").await;

        let loader = PromptLoader::new(dir.path());
        let template = loader.load("code", "v2").await.expect("load ok");

        let mut fields = HashMap::new();
        fields.insert("MODULE".to_string(), "uart0".to_string());

        let rendered = template.render(&fields);
        assert_eq!(rendered, "Module: uart0, extra: <<RAG_CONTEXT>>");
    }

    #[tokio::test]
    async fn missing_template_file_is_io_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loader = PromptLoader::new(dir.path());
        let err = loader.load("nope", "v1").await.expect_err("should fail");
        assert!(matches!(err, ForgeError::IoFailure(_)));
    }

    #[tokio::test]
    async fn second_load_hits_cache_even_if_file_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_template(dir.path(), "quality", "v1", "first <<X>>").await;
        let loader = PromptLoader::new(dir.path());
        let _ = loader.load("quality", "v1").await.expect("load ok");

        write_template(dir.path(), "quality", "v1", "second <<X>>").await;
        let cached = loader.load("quality", "v1").await.expect("load ok");
        assert!(cached.raw_text.starts_with("first"));

        let fresh = loader.reload("quality", "v1").await.expect("reload ok");
        assert!(fresh.raw_text.starts_with("second"));
    }
}
