//! Route extraction and per-route analysis.
//!
//! The route table itself is produced by the host framework (`php artisan route:list --json`)
//! and loaded by [`route_table`]. Each record becomes a [`RouteInfo`]; the
//! [`analyzer::RouteAnalyzer`] then resolves its controller method and runs the request,
//! resource and controller analyzers on it.
//!
//! # Example
//!
//! ```no_run
//! use openapi_from_laravel::extractor::{route_table, RouteInfo};
//! use std::path::Path;
//!
//! let records = route_table::load_route_table(Path::new("routes.json")).unwrap();
//! let routes: Vec<RouteInfo> = records.iter().map(RouteInfo::from_record).collect();
//! println!("Found {} routes", routes.len());
//! ```

pub mod analyzer;
pub mod auth;
pub mod controller;
pub mod route_table;

use crate::type_inference::TypeInfo;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::LazyLock;

/// `{id}`, `{slug?}`, `{user:uuid}`
static PATH_PARAMETER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)(?::(\w+))?(\?)?\}").expect("valid path parameter regex"));

/// One route as supplied by the host framework's router.
///
/// Accepts both the field names of `route:list --json` (`method: "GET|HEAD"`,
/// `action: "App\Http\Controllers\UserController@index"`, `name`) and explicit ones
/// (`httpMethods`, `controllerClass`, `methodName`, `routeName`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecord {
    pub uri: String,
    #[serde(alias = "method", alias = "methods", deserialize_with = "one_or_many")]
    pub http_methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_name: Option<String>,
    #[serde(default, alias = "name", skip_serializing_if = "Option::is_none")]
    pub route_name: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub middleware: Vec<String>,
    /// `Controller@method`, `Controller` (invokable) or `Closure`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Parameter constraints from `->where()`
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub wheres: IndexMap<String, String>,
}

/// A `"GET|HEAD"` string or a list of strings
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => s
            .split(['|', ','])
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        OneOrMany::Many(list) => list,
    })
}

impl RouteRecord {
    /// Controller class and method, `None` for closure routes
    pub fn handler(&self) -> Option<(String, String)> {
        if let Some(class) = &self.controller_class {
            let method = self
                .method_name
                .clone()
                .unwrap_or_else(|| "__invoke".to_string());
            return Some((class.trim_start_matches('\\').to_string(), method));
        }
        let action = self.action.as_deref()?.trim();
        if action.is_empty() || action.eq_ignore_ascii_case("closure") {
            return None;
        }
        let (class, method) = match action.split_once('@') {
            Some((class, method)) => (class, method),
            None => (action, "__invoke"),
        };
        Some((class.trim_start_matches('\\').to_string(), method.to_string()))
    }
}

/// HTTP methods that can be documented.
///
/// `HEAD` is dropped when a route is converted, as every `GET` route also answers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
}

impl HttpMethod {
    pub fn parse(method: &str) -> Option<Self> {
        match method.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "OPTIONS" => Some(HttpMethod::Options),
            "HEAD" => Some(HttpMethod::Head),
            _ => None,
        }
    }

    /// Upper-case verb as used in rule conditions (`POST`)
    pub fn verb(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
        }
    }

    /// Whether input is read from the query string rather than the body
    pub fn reads_query(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head | HttpMethod::Delete)
    }
}

/// A `{placeholder}` in a route URI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathParameter {
    pub name: String,
    pub required: bool,
    /// Binding field from `{user:slug}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding_field: Option<String>,
    pub schema: TypeInfo,
}

/// Everything known about a route before its handler is analyzed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteInfo {
    pub uri: String,
    pub methods: Vec<HttpMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middleware: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path_parameters: Vec<PathParameter>,
}

impl RouteInfo {
    pub fn from_record(record: &RouteRecord) -> Self {
        let mut methods: Vec<HttpMethod> = record
            .http_methods
            .iter()
            .filter_map(|m| HttpMethod::parse(m))
            .filter(|m| *m != HttpMethod::Head)
            .collect();
        methods.dedup();
        if methods.is_empty()
            && record.http_methods.iter().any(|m| m.eq_ignore_ascii_case("HEAD"))
        {
            methods.push(HttpMethod::Head);
        }

        let (controller, action) = match record.handler() {
            Some((controller, action)) => (Some(controller), Some(action)),
            None => (None, None),
        };

        Self {
            uri: record.uri.trim_start_matches('/').to_string(),
            methods,
            controller,
            action,
            name: record.route_name.clone(),
            middleware: record.middleware.clone(),
            path_parameters: parse_path_parameters(&record.uri, &record.wheres),
        }
    }

    /// `/api/users/{user}` with optional markers and binding fields removed
    pub fn openapi_path(&self) -> String {
        let path = PATH_PARAMETER_PATTERN.replace_all(&self.uri, "{${1}}");
        format!("/{}", path.trim_start_matches('/'))
    }

    /// Short label for diagnostics (`GET api/users`)
    pub fn label(&self) -> String {
        let verbs: Vec<&str> = self.methods.iter().map(HttpMethod::verb).collect();
        format!("{} {}", verbs.join("|"), self.uri)
    }
}

/// Path parameters of a URI, typed from `->where()` constraints or their names
pub fn parse_path_parameters(uri: &str, wheres: &IndexMap<String, String>) -> Vec<PathParameter> {
    PATH_PARAMETER_PATTERN
        .captures_iter(uri)
        .filter_map(|capture| {
            let name = capture.get(1)?.as_str().to_string();
            let binding_field = capture.get(2).map(|m| m.as_str().to_string());
            let required = capture.get(3).is_none();
            let mut schema = match wheres.get(&name) {
                Some(constraint) => schema_from_constraint(constraint),
                None => schema_from_name(&name, binding_field.as_deref()),
            };
            schema.required = required;
            Some(PathParameter {
                name,
                required,
                binding_field,
                schema,
            })
        })
        .collect()
}

fn schema_from_constraint(constraint: &str) -> TypeInfo {
    match constraint {
        "[0-9]+" | "\\d+" | "[0-9]*" => TypeInfo::new("integer"),
        c if c.contains("[\\da-fA-F]{8}") || c.contains("[0-9a-fA-F]{8}") => {
            TypeInfo::new("string").with_format("uuid")
        }
        c => {
            let mut schema = TypeInfo::new("string");
            schema.pattern = Some(format!("^{}$", c));
            schema
        }
    }
}

fn schema_from_name(name: &str, binding_field: Option<&str>) -> TypeInfo {
    let key = binding_field.unwrap_or(name).to_ascii_lowercase();
    if key == "uuid" || key.ends_with("_uuid") {
        return TypeInfo::new("string").with_format("uuid");
    }
    if key == "slug" || key.ends_with("_slug") || (binding_field.is_some() && key != "id") {
        return TypeInfo::new("string");
    }
    if key == "id" || key.ends_with("_id") || (!key.contains('_') && binding_field.is_none()) {
        // Implicit model binding resolves by primary key
        return TypeInfo::new("integer");
    }
    TypeInfo::new("string")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_from_route_list_json() {
        let record: RouteRecord = serde_json::from_str(
            r#"{
                "domain": null,
                "method": "GET|HEAD",
                "uri": "api/users/{user}",
                "name": "users.show",
                "action": "App\\Http\\Controllers\\UserController@show",
                "middleware": ["api", "auth:sanctum"]
            }"#,
        )
        .unwrap();

        assert_eq!(record.http_methods, vec!["GET", "HEAD"]);
        assert_eq!(record.route_name.as_deref(), Some("users.show"));
        assert_eq!(
            record.handler(),
            Some((
                "App\\Http\\Controllers\\UserController".to_string(),
                "show".to_string()
            ))
        );

        let route = RouteInfo::from_record(&record);
        assert_eq!(route.methods, vec![HttpMethod::Get]);
        assert_eq!(route.path_parameters[0].name, "user");
        assert_eq!(route.path_parameters[0].schema.schema_type, "integer");
        assert_eq!(route.openapi_path(), "/api/users/{user}");
        assert_eq!(route.label(), "GET api/users/{user}");
    }

    #[test]
    fn test_record_with_explicit_fields() {
        let record: RouteRecord = serde_json::from_str(
            r#"{
                "uri": "/api/posts/{post:slug}/comments/{comment?}",
                "httpMethods": ["POST"],
                "controllerClass": "\\App\\Http\\Controllers\\CommentController",
                "methodName": "store",
                "routeName": "comments.store",
                "middleware": "api",
                "wheres": {"comment": "[0-9]+"}
            }"#,
        )
        .unwrap();

        let route = RouteInfo::from_record(&record);
        assert_eq!(route.controller.as_deref(), Some("App\\Http\\Controllers\\CommentController"));
        assert_eq!(route.middleware, vec!["api"]);
        assert_eq!(route.openapi_path(), "/api/posts/{post}/comments/{comment}");

        let post = &route.path_parameters[0];
        assert_eq!(post.binding_field.as_deref(), Some("slug"));
        assert_eq!(post.schema.schema_type, "string");
        let comment = &route.path_parameters[1];
        assert!(!comment.required);
        assert_eq!(comment.schema.schema_type, "integer");
    }

    #[test]
    fn test_closure_and_invokable_handlers() {
        let closure: RouteRecord =
            serde_json::from_str(r#"{"uri": "api/ping", "method": "GET", "action": "Closure"}"#)
                .unwrap();
        assert_eq!(closure.handler(), None);

        let invokable: RouteRecord = serde_json::from_str(
            r#"{"uri": "api/stats", "method": "GET", "action": "App\\Http\\Controllers\\StatsController"}"#,
        )
        .unwrap();
        assert_eq!(invokable.handler().unwrap().1, "__invoke");
    }

    #[test]
    fn test_path_parameter_schemas() {
        let wheres = IndexMap::from([("code".to_string(), "[A-Z]{3}".to_string())]);
        let params = parse_path_parameters("api/{uuid}/{code}/{order_ref}", &wheres);
        assert_eq!(params[0].schema.format.as_deref(), Some("uuid"));
        assert_eq!(params[1].schema.pattern.as_deref(), Some("^[A-Z]{3}$"));
        assert_eq!(params[2].schema.schema_type, "string");
    }

    #[test]
    fn test_route_info_roundtrip() {
        let record: RouteRecord = serde_json::from_str(
            r#"{"uri": "api/users/{user}", "method": "PUT|PATCH", "action": "App\\Http\\Controllers\\UserController@update", "middleware": ["auth:api"]}"#,
        )
        .unwrap();
        let route = RouteInfo::from_record(&record);
        assert_eq!(route.methods, vec![HttpMethod::Put, HttpMethod::Patch]);

        let json = serde_json::to_string(&route).unwrap();
        let back: RouteInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, route);

        let json = serde_json::to_string(&record).unwrap();
        let back: RouteRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
