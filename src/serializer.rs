//! Serialization module for converting OpenAPI documents to YAML or JSON format.
//!
//! This module provides functions to serialize the generated document and the diagnostic
//! report into standard formats and write them to files or return them as strings.

use crate::diagnostics::DiagnosticReport;
use crate::openapi_builder::OpenApiDocument;
use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::Path;

/// Serializes an OpenAPI document to YAML format.
///
/// Paths, properties and responses keep the order in which they were added, so the output
/// follows the route table and the field order of each resource.
///
/// # Errors
///
/// Returns an error if serialization fails.
///
/// # Example
///
/// ```
/// use indexmap::IndexMap;
/// use openapi_from_laravel::openapi_builder::OpenApiBuilder;
/// use openapi_from_laravel::schema_generator::SchemaGenerator;
/// use openapi_from_laravel::serializer::serialize_yaml;
///
/// let resources = IndexMap::new();
/// let doc = OpenApiBuilder::new().build(SchemaGenerator::new(&resources), &IndexMap::new());
/// let yaml = serialize_yaml(&doc).unwrap();
/// assert!(yaml.contains("openapi: 3.0.3"));
/// ```
pub fn serialize_yaml(doc: &OpenApiDocument) -> Result<String> {
    debug!("Serializing OpenAPI document to YAML");
    serde_yaml::to_string(doc).context("Failed to serialize OpenAPI document to YAML")
}

/// Serializes an OpenAPI document to JSON format with pretty printing.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn serialize_json(doc: &OpenApiDocument) -> Result<String> {
    debug!("Serializing OpenAPI document to JSON");
    serde_json::to_string_pretty(doc).context("Failed to serialize OpenAPI document to JSON")
}

/// Serializes the diagnostic report of a run as pretty JSON
pub fn serialize_diagnostics(report: &DiagnosticReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize diagnostic report")
}

/// Writes string content to a file.
///
/// Creates the file and any missing parent directories, or overwrites an existing file.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to.
pub fn write_to_file(content: &str, path: &Path) -> Result<()> {
    debug!("Writing content to file: {}", path.display());

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    fs::write(path, content)
        .with_context(|| format!("Failed to write to file: {}", path.display()))?;

    debug!("Successfully wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCollector;
    use crate::openapi_builder::{Info, Operation, PathItem, Response};
    use crate::schema_generator::Schema;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn create_test_document() -> OpenApiDocument {
        OpenApiDocument {
            openapi: "3.0.3".to_string(),
            info: Info {
                title: "Test API".to_string(),
                version: "1.0.0".to_string(),
                description: Some("A test API".to_string()),
            },
            servers: Vec::new(),
            paths: IndexMap::new(),
            components: None,
            security: None,
            tags: Vec::new(),
        }
    }

    fn document_with_paths() -> OpenApiDocument {
        let mut doc = create_test_document();
        for path in ["/api/zebras", "/api/apples"] {
            let mut responses = IndexMap::new();
            responses.insert(
                "200".to_string(),
                Response {
                    description: "Successful response".to_string(),
                    content: None,
                },
            );
            let item = PathItem {
                get: Some(Operation {
                    summary: Some(format!("GET {}", path)),
                    responses,
                    ..Operation::default()
                }),
                ..PathItem::default()
            };
            doc.paths.insert(path.to_string(), item);
        }
        doc
    }

    #[test]
    fn test_serialize_yaml() {
        let yaml = serialize_yaml(&create_test_document()).unwrap();

        assert!(yaml.contains("openapi: 3.0.3"));
        assert!(yaml.contains("title: Test API"));
        assert!(yaml.contains("description: A test API"));
        assert!(!yaml.contains("components"));
    }

    #[test]
    fn test_serialize_json() {
        let json = serialize_json(&create_test_document()).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["openapi"], "3.0.3");
        assert_eq!(parsed["info"]["title"], "Test API");
        // Pretty printed
        assert!(json.contains('\n'));
    }

    #[test]
    fn test_paths_keep_insertion_order() {
        let doc = document_with_paths();

        let yaml = serialize_yaml(&doc).unwrap();
        let zebras = yaml.find("/api/zebras").unwrap();
        let apples = yaml.find("/api/apples").unwrap();
        assert!(zebras < apples);

        let json = serialize_json(&doc).unwrap();
        assert!(json.find("/api/zebras").unwrap() < json.find("/api/apples").unwrap());
    }

    #[test]
    fn test_schema_keywords_are_renamed() {
        let mut doc = create_test_document();
        let mut schema = Schema::typed("string");
        schema.max_length = Some(255);
        let mut components = crate::openapi_builder::Components::default();
        components.schemas.insert("Name".to_string(), schema);
        components.schemas.insert("Ref".to_string(), Schema::reference("Name"));
        doc.components = Some(components);

        let json = serialize_json(&doc).unwrap();
        assert!(json.contains("\"maxLength\": 255"));
        assert!(json.contains("\"$ref\": \"#/components/schemas/Name\""));
    }

    #[test]
    fn test_roundtrip_yaml_serialization() {
        let doc = document_with_paths();
        let yaml = serialize_yaml(&doc).unwrap();
        let back: OpenApiDocument = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_diagnostics_json() {
        let mut collector = DiagnosticCollector::new();
        collector.warning("route:GET api/ping", "Closure route; handler not analyzed");
        let json = serialize_diagnostics(&collector.finish()).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["warnings"][0]["severity"], "warning");
        assert_eq!(parsed["errors"], serde_json::json!([]));
    }

    #[test]
    fn test_write_to_file_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docs/api/openapi.yaml");

        write_to_file("openapi: 3.0.3\n", &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "openapi: 3.0.3\n");

        write_to_file("openapi: 3.1.0\n", &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "openapi: 3.1.0\n");
    }
}
