use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// A platform-shared post template as declared in `config/templates.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub name: String,
    pub category: String,
    pub structure: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TemplatesFile {
    pub templates: Vec<TemplateConfig>,
}

/// Load and validate the platform template seed file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_templates(path: &Path) -> Result<TemplatesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::TemplatesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let file: TemplatesFile = serde_yaml::from_str(&content)?;
    validate_templates(&file)?;
    Ok(file)
}

fn validate_templates(file: &TemplatesFile) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for template in &file.templates {
        if template.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "template name must be non-empty".to_string(),
            ));
        }
        if template.structure.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "template '{}' has an empty structure",
                template.name
            )));
        }
        if !seen.insert(template.name.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate template name: '{}'",
                template.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(name: &str, structure: &str) -> TemplateConfig {
        TemplateConfig {
            name: name.to_string(),
            category: "story".to_string(),
            structure: structure.to_string(),
            examples: Vec::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn parses_yaml_with_optional_fields_missing() {
        let yaml = "templates:\n  - name: Listicle\n    category: how_to\n    structure: |\n      Hook\n      1. Point\n";
        let file: TemplatesFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.templates.len(), 1);
        assert!(file.templates[0].examples.is_empty());
        validate_templates(&file).unwrap();
    }

    #[test]
    fn validate_rejects_duplicate_names() {
        let file = TemplatesFile {
            templates: vec![template("Listicle", "a"), template("listicle", "b")],
        };
        let err = validate_templates(&file).unwrap_err();
        assert!(err.to_string().contains("duplicate template name"));
    }

    #[test]
    fn validate_rejects_empty_structure() {
        let file = TemplatesFile {
            templates: vec![template("Story arc", "  ")],
        };
        assert!(validate_templates(&file).is_err());
    }

    #[test]
    fn shipped_seed_file_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/templates.yaml");
        let file = load_templates(&path).unwrap();
        assert!(!file.templates.is_empty());
    }
}
