use crate::parser::ast::short_name;
use crate::request_analyzer::ParameterDefinition;
use crate::resource_analyzer::{ConditionKind, ResourceFieldInfo, ResourceKind, ResourceStructure};
use crate::type_inference::{nest_fields, TypeInfo};
use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema generator - converts analyzed resources into OpenAPI component schemas
pub struct SchemaGenerator<'a> {
    /// Resource structures produced by the route analysis
    resources: &'a IndexMap<String, ResourceStructure>,
    /// Component name chosen for each resource class
    names: IndexMap<String, String>,
    /// Generated component schemas, by component name
    schemas: IndexMap<String, Schema>,
}

/// OpenAPI Schema object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// The type of the schema (string, integer, object, array, etc.); absent for "any value"
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    /// Format for primitive types (e.g. "email", "date-time", "binary")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Properties for object types, in declaration order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, Schema>>,
    /// Required field names for object types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    /// Items schema for array types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    /// Used to make a reference nullable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_of: Option<Vec<Schema>>,
    /// Reference to another schema
    #[serde(rename = "$ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Schema {
    pub fn typed(schema_type: impl Into<String>) -> Self {
        Self {
            schema_type: Some(schema_type.into()),
            ..Self::default()
        }
    }

    pub fn reference(component: &str) -> Self {
        Self {
            reference: Some(format!("#/components/schemas/{}", component)),
            ..Self::default()
        }
    }

    pub fn array_of(items: Schema) -> Self {
        Self {
            schema_type: Some("array".to_string()),
            items: Some(Box::new(items)),
            ..Self::default()
        }
    }

    /// An object schema; `required` is omitted when empty
    pub fn object(properties: IndexMap<String, Schema>, required: Vec<String>) -> Self {
        Self {
            schema_type: Some("object".to_string()),
            properties: Some(properties),
            required: if required.is_empty() { None } else { Some(required) },
            ..Self::default()
        }
    }

    /// Mark as nullable; references are wrapped in `allOf` since siblings of `$ref` are ignored
    pub fn into_nullable(self) -> Self {
        if self.reference.is_some() {
            return Self {
                nullable: Some(true),
                all_of: Some(vec![self]),
                ..Self::default()
            };
        }
        Self {
            nullable: Some(true),
            ..self
        }
    }

    /// Whether this schema, or anything nested in it, is a binary upload
    pub fn has_binary(&self) -> bool {
        self.format.as_deref() == Some("binary")
            || self.items.as_ref().is_some_and(|i| i.has_binary())
            || self
                .properties
                .as_ref()
                .is_some_and(|p| p.values().any(Schema::has_binary))
    }
}

/// Convert an inferred input type into a schema
pub fn from_type_info(info: &TypeInfo) -> Schema {
    let mut schema = match info.schema_type.as_str() {
        "file" => {
            let mut schema = Schema::typed("string");
            schema.format = Some("binary".to_string());
            schema
        }
        other => {
            let mut schema = Schema::typed(other);
            schema.format = info.format.clone();
            schema
        }
    };

    schema.description = describe_type(info);
    schema.minimum = info.minimum;
    schema.maximum = info.maximum;
    schema.min_length = info.min_length;
    schema.max_length = info.max_length;
    schema.min_items = info.min_items;
    schema.max_items = info.max_items;
    schema.pattern = info.pattern.clone();
    schema.default = info.default.clone();
    if !info.enum_values.is_empty() {
        schema.enum_values = Some(info.enum_values.clone());
    }
    if info.nullable {
        schema.nullable = Some(true);
    }

    if let Some(items) = &info.items {
        schema.items = Some(Box::new(from_type_info(items)));
    } else if info.schema_type == "array" {
        schema.items = Some(Box::new(Schema::default()));
    }
    if !info.properties.is_empty() {
        let required = info
            .properties
            .iter()
            .filter(|(_, p)| p.required)
            .map(|(name, _)| name.clone())
            .collect();
        let properties = info
            .properties
            .iter()
            .map(|(name, p)| (name.clone(), from_type_info(p)))
            .collect();
        schema.properties = Some(properties);
        schema.required = if info.properties.values().any(|p| p.required) {
            Some(required)
        } else {
            None
        };
    }
    schema
}

fn describe_type(info: &TypeInfo) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(description) = &info.description {
        parts.push(description.clone());
    }
    if let Some(file) = &info.file {
        if !file.mime_types.is_empty() {
            parts.push(format!("Allowed types: {}", file.mime_types.join(", ")));
        }
        if let Some(max) = file.max_size {
            parts.push(format!("Max size: {} KB", max));
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(". "))
    }
}

/// Object schema for a set of body or form fields, dot-notation names nested
pub fn parameters_schema(parameters: &[ParameterDefinition]) -> Schema {
    let fields: IndexMap<String, TypeInfo> = parameters
        .iter()
        .map(|p| {
            let mut info = p.schema.clone();
            if info.description.is_none() {
                info.description = Some(p.description.clone());
            }
            (p.name.clone(), info)
        })
        .collect();
    let nested = nest_fields(fields);

    let required = nested
        .iter()
        .filter(|(_, info)| info.required)
        .map(|(name, _)| name.clone())
        .collect();
    let properties = nested
        .iter()
        .map(|(name, info)| (name.clone(), from_type_info(info)))
        .collect();
    Schema::object(properties, required)
}

impl<'a> SchemaGenerator<'a> {
    /// Create a new SchemaGenerator over the analyzed resources
    pub fn new(resources: &'a IndexMap<String, ResourceStructure>) -> Self {
        debug!("Initializing SchemaGenerator with {} resources", resources.len());
        Self {
            resources,
            names: IndexMap::new(),
            schemas: IndexMap::new(),
        }
    }

    /// Reference to the component of a resource class, generating it on first use
    pub fn resource_schema(&mut self, fqcn: &str) -> Schema {
        if let Some(name) = self.names.get(fqcn) {
            return Schema::reference(name);
        }
        let Some(structure) = self.resources.get(fqcn) else {
            warn!("Resource {} was not analyzed; documenting it as a free-form object", fqcn);
            return Schema::typed("object");
        };

        let name = self.component_name(fqcn);
        self.names.insert(fqcn.to_string(), name.clone());
        // Placeholder so self-referencing resources terminate
        self.schemas.insert(name.clone(), Schema::default());

        let schema = self.structure_schema(structure);
        debug!("Generated component schema {}", name);
        self.schemas.insert(name.clone(), schema);
        Schema::reference(&name)
    }

    /// The body a resource class produces, without the response envelope
    fn structure_schema(&mut self, structure: &ResourceStructure) -> Schema {
        if structure.kind == ResourceKind::ResourceCollection && structure.properties.is_empty() {
            let items = match &structure.collects {
                Some(collects) => self.resource_schema(collects),
                None => Schema::typed("object"),
            };
            return Schema::array_of(items);
        }

        let mut schema = self.object_schema(&structure.properties);
        let mut notes = Vec::new();
        if !structure.available_includes.is_empty() {
            notes.push(format!(
                "Available includes: {}",
                structure.available_includes.join(", ")
            ));
        }
        if !structure.default_includes.is_empty() {
            notes.push(format!(
                "Default includes: {}",
                structure.default_includes.join(", ")
            ));
        }
        if !notes.is_empty() {
            schema.description = Some(notes.join(". "));
        }
        schema
    }

    /// Object schema for a field map; conditional fields are never required
    pub fn object_schema(&mut self, fields: &IndexMap<String, ResourceFieldInfo>) -> Schema {
        let mut properties = IndexMap::new();
        let mut required = Vec::new();
        for (name, field) in fields {
            if !field.is_conditional() {
                required.push(name.clone());
            }
            properties.insert(name.clone(), self.field_schema(field));
        }
        Schema::object(properties, required)
    }

    /// Schema for one resource field
    pub fn field_schema(&mut self, field: &ResourceFieldInfo) -> Schema {
        let mut schema = if let Some(class) = &field.resource {
            self.resource_schema(class)
        } else if let Some(items) = &field.items {
            Schema::array_of(self.field_schema(items))
        } else if !field.properties.is_empty() {
            self.object_schema(&field.properties)
        } else {
            match field.field_type.as_str() {
                "mixed" => Schema::default(),
                "array" => Schema::array_of(Schema::default()),
                other => Schema::typed(other),
            }
        };

        if schema.reference.is_none() {
            schema.format = field.format.clone();
            schema.example = field.example.clone();
            schema.description = field
                .conditional
                .as_ref()
                .map(|c| describe_condition(c.kind, c.relation.as_deref()));
        }
        if field.nullable {
            schema = schema.into_nullable();
        }
        schema
    }

    /// Analyzed structure of a resource class
    pub fn resource(&self, fqcn: &str) -> Option<&'a ResourceStructure> {
        self.resources.get(fqcn)
    }

    /// Register a component that does not come from a resource
    pub fn add_component(&mut self, name: &str, schema: Schema) -> Schema {
        self.schemas.entry(name.to_string()).or_insert(schema);
        Schema::reference(name)
    }

    /// Generated component schemas
    pub fn get_schemas(&self) -> &IndexMap<String, Schema> {
        &self.schemas
    }

    pub fn into_schemas(self) -> IndexMap<String, Schema> {
        self.schemas
    }

    /// Short class name, or the dotted full name when two classes share it
    fn component_name(&self, fqcn: &str) -> String {
        let short = short_name(fqcn).to_string();
        if self.schemas.contains_key(&short) {
            fqcn.trim_start_matches('\\').replace('\\', ".")
        } else {
            short
        }
    }
}

fn describe_condition(kind: ConditionKind, relation: Option<&str>) -> String {
    match (kind, relation) {
        (ConditionKind::WhenLoaded, Some(relation)) => {
            format!("Present when the `{}` relation is loaded", relation)
        }
        (ConditionKind::WhenCounted, Some(relation)) => {
            format!("Present when `{}` is counted", relation)
        }
        (ConditionKind::WhenAggregated, Some(relation)) => {
            format!("Present when `{}` is aggregated", relation)
        }
        (ConditionKind::WhenNotNull, _) => "Omitted when null".to_string(),
        (ConditionKind::WhenHas, _) => "Present when the attribute is set".to_string(),
        (ConditionKind::Include, Some(relation)) => {
            format!("Present when `{}` is requested with ?include", relation)
        }
        _ => "Conditionally present".to_string(),
    }
}
