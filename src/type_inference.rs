//! Type inference from validation rule tokens.
//!
//! [`infer`] maps a list of rule tokens (`["required", "integer", "min:0"]`) to a
//! [`TypeInfo`]: the OpenAPI type and format, numeric or length bounds, enum values, file
//! upload metadata and the required/nullable state. It is a pure function; the base type is
//! picked by the first entry of a fixed precedence table that any token matches, so
//! `["string", "integer"]` and `["integer", "string"]` both infer `integer`.
//!
//! [`nest_fields`] then assembles dot-notation field names (`user.name`, `items.*.id`) into
//! nested object and array shapes.

use crate::rules::{RuleArgs, RuleMarker, RuleToken};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mime extensions accepted by Laravel's `image` rule
const IMAGE_MIMES: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "svg", "webp"];

/// Tokens that make a field required only under some condition
const CONDITIONAL_REQUIRED: &[&str] = &[
    "required_if",
    "required_unless",
    "required_with",
    "required_with_all",
    "required_without",
    "required_without_all",
    "required_if_accepted",
    "required_array_keys",
];

/// Structured type descriptor for one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeInfo {
    /// OpenAPI type, or `file` for uploads
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
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
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
    /// Short name of the backing enum class, when the values came from one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_class: Option<String>,
    /// Fallback value the application applies when the field is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    /// Set by `required_if`, `required_with` and friends
    #[serde(default)]
    pub conditionally_required: bool,
    /// The conditional `required_*` tokens, verbatim
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_conditions: Vec<String>,
    #[serde(default)]
    pub nullable: bool,
    /// `prohibited*`/`exclude*`: the field is never part of the validated payload
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Class names of custom rule objects applied to the field
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_rules: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, TypeInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<TypeInfo>>,
}

/// Upload metadata for `file`/`image`/`mimes` fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    #[serde(default)]
    pub is_image: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mime_types: Vec<String>,
    /// Kilobytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u64>,
    /// Kilobytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(default)]
    pub multiple: bool,
}

/// Image constraints from a `dimensions:` token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_width: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_height: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u64>,
    /// `3/2` or `1.5`, as written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<String>,
}

impl TypeInfo {
    pub fn new(schema_type: impl Into<String>) -> Self {
        Self {
            schema_type: schema_type.into(),
            format: None,
            minimum: None,
            maximum: None,
            min_length: None,
            max_length: None,
            min_items: None,
            max_items: None,
            pattern: None,
            enum_values: Vec::new(),
            enum_class: None,
            default: None,
            required: false,
            conditionally_required: false,
            required_conditions: Vec::new(),
            nullable: false,
            hidden: false,
            file: None,
            description: None,
            custom_rules: Vec::new(),
            properties: IndexMap::new(),
            items: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn is_file(&self) -> bool {
        self.schema_type == "file"
    }

    fn is_numeric(&self) -> bool {
        matches!(self.schema_type.as_str(), "integer" | "number")
    }

    /// Whether this field or any nested field is an upload
    pub fn contains_file(&self) -> bool {
        self.is_file()
            || self.properties.values().any(TypeInfo::contains_file)
            || self.items.as_ref().is_some_and(|i| i.contains_file())
    }

    fn file_mut(&mut self) -> &mut FileInfo {
        self.file.get_or_insert_with(FileInfo::default)
    }
}

/// Base type picked for a token name
#[derive(Debug, Clone, Copy)]
struct BaseType {
    schema_type: &'static str,
    format: Option<&'static str>,
}

const fn base(schema_type: &'static str, format: Option<&'static str>) -> BaseType {
    BaseType {
        schema_type,
        format,
    }
}

/// First entry with a matching token name wins
const PRECEDENCE: &[(&[&str], BaseType)] = &[
    (&["integer"], base("integer", None)),
    (&["numeric", "decimal"], base("number", None)),
    (
        &["boolean", "accepted", "accepted_if", "declined", "declined_if"],
        base("boolean", None),
    ),
    (&["array", "list"], base("array", None)),
    (&["email"], base("string", Some("email"))),
    (
        &[
            "date",
            "date_format",
            "date_equals",
            "before",
            "before_or_equal",
            "after",
            "after_or_equal",
        ],
        base("string", Some("date-time")),
    ),
    (&["uuid"], base("string", Some("uuid"))),
    (&["url", "active_url"], base("string", Some("uri"))),
    (&["ip"], base("string", Some("ip"))),
    (&["ipv4"], base("string", Some("ipv4"))),
    (&["ipv6"], base("string", Some("ipv6"))),
    (&["json"], base("string", Some("json"))),
    (&["password", "current_password"], base("string", Some("password"))),
    (
        &["image", "file", "mimes", "mimetypes", "extensions", "dimensions"],
        base("file", None),
    ),
    (&["string"], base("string", None)),
];

fn base_type(tokens: &[RuleToken]) -> BaseType {
    let names: Vec<&str> = tokens.iter().filter_map(RuleToken::name).collect();
    for (candidates, base) in PRECEDENCE {
        if names.iter().any(|n| candidates.contains(n)) {
            return *base;
        }
    }

    // An enum marker with integer-backed cases and no explicit type
    let integer_enum = tokens.iter().any(|t| {
        matches!(
            t,
            RuleToken::Marker(RuleMarker::Enum { values, .. })
                if !values.is_empty() && values.iter().all(Value::is_i64)
        )
    });
    if integer_enum {
        base("integer", None)
    } else {
        base("string", None)
    }
}

/// Infer the type descriptor of one field from its rule tokens
pub fn infer(tokens: &[RuleToken]) -> TypeInfo {
    let base = base_type(tokens);
    let mut info = TypeInfo::new(base.schema_type);
    info.format = base.format.map(str::to_string);

    let mut required = false;
    let mut sometimes = false;

    for token in tokens {
        match token {
            RuleToken::Plain(raw) => {
                let name = token.name().unwrap_or(raw);
                let param = token.parameter();
                match name {
                    "required" => required = true,
                    "sometimes" => sometimes = true,
                    "nullable" => info.nullable = true,
                    n if CONDITIONAL_REQUIRED.contains(&n) => {
                        info.conditionally_required = true;
                        info.required_conditions.push(raw.clone());
                    }
                    n if n.starts_with("prohibited") || n.starts_with("exclude") => {
                        info.hidden = true
                    }
                    _ => apply_constraint(&mut info, name, param),
                }
            }
            RuleToken::Marker(RuleMarker::Enum { class, values }) => {
                info.enum_class = Some(class.clone());
                for value in values {
                    if !info.enum_values.contains(value) {
                        info.enum_values.push(value.clone());
                    }
                }
            }
            RuleToken::Marker(RuleMarker::CustomRule { class, args }) => {
                info.custom_rules.push(describe_custom(class, args));
            }
        }
    }

    if info.file.as_ref().is_some_and(|f| f.is_image && f.mime_types.is_empty()) {
        info.file_mut().mime_types = IMAGE_MIMES.iter().map(|m| m.to_string()).collect();
    }

    info.required = required && !sometimes;
    info
}

/// Infer a field and apply what its name implies (`photos.*` file → multiple upload)
pub fn infer_field(name: &str, tokens: &[RuleToken]) -> TypeInfo {
    let mut info = infer(tokens);
    if name.ends_with(".*") && info.is_file() {
        info.file_mut().multiple = true;
    }
    info
}

fn describe_custom(class: &str, args: &RuleArgs) -> String {
    let rendered = match args {
        RuleArgs::Positional(values) if values.is_empty() => return class.to_string(),
        RuleArgs::Positional(values) => values
            .iter()
            .map(render_json)
            .collect::<Vec<_>>()
            .join(", "),
        RuleArgs::Named(map) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, render_json(v)))
            .collect::<Vec<_>>()
            .join(", "),
    };
    format!("{}({})", class, rendered)
}

fn render_json(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn apply_constraint(info: &mut TypeInfo, name: &str, param: Option<&str>) {
    match (name, param) {
        ("min", Some(p)) => apply_bound(info, p, None),
        ("max", Some(p)) => apply_bound(info, "", Some(p)),
        ("size", Some(p)) => apply_bound(info, p, Some(p)),
        ("between", Some(p)) => {
            if let Some((lo, hi)) = p.split_once(',') {
                apply_bound(info, lo, Some(hi));
            }
        }
        ("in", Some(p)) => {
            if p.is_empty() || p == "..." {
                return;
            }
            for raw in p.split(',') {
                let value = enum_literal(info, raw.trim().trim_matches('"'));
                if !info.enum_values.contains(&value) {
                    info.enum_values.push(value);
                }
            }
        }
        ("digits", Some(p)) => apply_digits(info, p, p),
        ("digits_between", Some(p)) => {
            if let Some((lo, hi)) = p.split_once(',') {
                apply_digits(info, lo, hi);
            }
        }
        ("regex", Some(p)) => info.pattern = Some(strip_delimiters(p)),
        ("alpha", _) => info.pattern = Some("^[a-zA-Z]+$".to_string()),
        ("alpha_num", _) => info.pattern = Some("^[a-zA-Z0-9]+$".to_string()),
        ("alpha_dash", _) => info.pattern = Some("^[a-zA-Z0-9_-]+$".to_string()),
        ("date_format", Some(p)) => info.description = Some(format!("Format: {}", p)),
        ("image", _) => info.file_mut().is_image = true,
        ("file", _) => {
            info.file_mut();
        }
        ("mimes" | "mimetypes" | "extensions", Some(p)) => {
            let file = info.file_mut();
            for mime in p.split(',').map(str::trim).filter(|m| !m.is_empty()) {
                if !file.mime_types.iter().any(|m| m == mime) {
                    file.mime_types.push(mime.to_string());
                }
            }
        }
        ("dimensions", Some(p)) => {
            let file = info.file_mut();
            file.is_image = true;
            file.dimensions = Some(parse_dimensions(p));
        }
        _ => debug!("No type information in rule '{}'", name),
    }
}

/// `min`/`max` land on the bound matching the base type
fn apply_bound(info: &mut TypeInfo, min: &str, max: Option<&str>) {
    let min = min.trim();
    let max = max.map(str::trim);
    if info.is_numeric() {
        if let Ok(v) = min.parse::<f64>() {
            info.minimum = Some(v);
        }
        if let Some(v) = max.and_then(|m| m.parse::<f64>().ok()) {
            info.maximum = Some(v);
        }
        return;
    }

    let lo = min.parse::<u64>().ok();
    let hi = max.and_then(|m| m.parse::<u64>().ok());
    match info.schema_type.as_str() {
        "array" => {
            info.min_items = lo.or(info.min_items);
            info.max_items = hi.or(info.max_items);
        }
        "file" => {
            let file = info.file_mut();
            file.min_size = lo.or(file.min_size);
            file.max_size = hi.or(file.max_size);
        }
        _ => {
            info.min_length = lo.or(info.min_length);
            info.max_length = hi.or(info.max_length);
        }
    }
}

fn apply_digits(info: &mut TypeInfo, lo: &str, hi: &str) {
    let (Ok(lo), Ok(hi)) = (lo.trim().parse::<u32>(), hi.trim().parse::<u32>()) else {
        return;
    };
    if info.is_numeric() {
        info.minimum = Some(if lo <= 1 { 0.0 } else { 10f64.powi(lo as i32 - 1) });
        info.maximum = Some(10f64.powi(hi as i32) - 1.0);
    } else if lo == hi {
        info.pattern = Some(format!("^[0-9]{{{}}}$", lo));
    } else {
        info.pattern = Some(format!("^[0-9]{{{},{}}}$", lo, hi));
    }
}

fn enum_literal(info: &TypeInfo, raw: &str) -> Value {
    match info.schema_type.as_str() {
        "integer" => raw.parse::<i64>().map(Value::from).unwrap_or_else(|_| Value::from(raw)),
        "number" => raw.parse::<f64>().map(Value::from).unwrap_or_else(|_| Value::from(raw)),
        "boolean" => match raw {
            "true" | "1" => Value::from(true),
            "false" | "0" => Value::from(false),
            _ => Value::from(raw),
        },
        _ => Value::from(raw),
    }
}

/// `/^[a-z]+$/i` → `^[a-z]+$`
fn strip_delimiters(pattern: &str) -> String {
    let mut chars = pattern.chars();
    let Some(delimiter) = chars.next() else {
        return String::new();
    };
    if delimiter.is_alphanumeric() || delimiter == '\\' {
        return pattern.to_string();
    }
    match pattern.rfind(delimiter) {
        Some(end) if end > 0 => pattern[delimiter.len_utf8()..end].to_string(),
        _ => pattern.to_string(),
    }
}

fn parse_dimensions(param: &str) -> Dimensions {
    let mut dims = Dimensions::default();
    for part in param.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let value = value.trim();
        let number = value.parse::<u64>().ok();
        match key.trim() {
            "width" => dims.width = number,
            "height" => dims.height = number,
            "min_width" => dims.min_width = number,
            "max_width" => dims.max_width = number,
            "min_height" => dims.min_height = number,
            "max_height" => dims.max_height = number,
            "ratio" => dims.ratio = Some(value.to_string()),
            other => debug!("Unknown dimensions constraint '{}'", other),
        }
    }
    dims
}

/// Assemble dot-notation fields into nested shapes.
///
/// `user.name` becomes property `name` of object `user`; `items.*.id` becomes property `id`
/// of the items of array `items`. Parents that have no rules of their own are created as
/// optional containers.
pub fn nest_fields(fields: IndexMap<String, TypeInfo>) -> IndexMap<String, TypeInfo> {
    let mut root = IndexMap::new();
    for (name, info) in fields {
        let segments: Vec<&str> = name.split('.').collect();
        insert_path(&mut root, &segments, info);
    }
    root
}

fn insert_path(map: &mut IndexMap<String, TypeInfo>, segments: &[&str], info: TypeInfo) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        match map.get_mut(*head) {
            Some(slot) => absorb(slot, info),
            None => {
                map.insert(head.to_string(), info);
            }
        }
        return;
    }
    let node = map
        .entry(head.to_string())
        .or_insert_with(|| TypeInfo::new("object"));
    descend(node, rest, info);
}

fn descend(node: &mut TypeInfo, segments: &[&str], info: TypeInfo) {
    if segments[0] != "*" {
        node.schema_type = "object".to_string();
        insert_path(&mut node.properties, segments, info);
        return;
    }

    node.schema_type = "array".to_string();
    let rest = &segments[1..];
    if rest.is_empty() {
        match node.items.as_deref_mut() {
            Some(slot) => absorb(slot, info),
            None => node.items = Some(Box::new(info)),
        }
    } else {
        let item = node
            .items
            .get_or_insert_with(|| Box::new(TypeInfo::new("object")));
        descend(item, rest, info);
    }
}

/// Replace an implicit container with the field's own rules, keeping collected children
fn absorb(slot: &mut TypeInfo, mut info: TypeInfo) {
    if info.properties.is_empty() {
        info.properties = std::mem::take(&mut slot.properties);
    }
    if info.items.is_none() {
        info.items = slot.items.take();
    }
    if !info.properties.is_empty() {
        info.schema_type = "object".to_string();
    } else if info.items.is_some() {
        info.schema_type = "array".to_string();
    }
    *slot = info;
}
