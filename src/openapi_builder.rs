use crate::config::{CallbackConfig, RouteMatcher, ServerConfig};
use crate::extractor::analyzer::RouteAnalysis;
use crate::extractor::auth::{AuthenticationScheme, SchemeType};
use crate::extractor::controller::{Pagination, PaginationKind};
use crate::extractor::{HttpMethod, RouteInfo};
use crate::request_analyzer::{ParameterDefinition, ParameterLocation};
use crate::schema_generator::{from_type_info, parameters_schema, Schema, SchemaGenerator};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Component holding Laravel's 422 payload
const VALIDATION_ERROR: &str = "ValidationError";

/// OpenAPI document builder
pub struct OpenApiBuilder {
    /// OpenAPI info section
    info: Info,
    servers: Vec<ServerConfig>,
    /// Paths collection (URL path -> PathItem), in route-table order
    paths: IndexMap<String, PathItem>,
    tags: Vec<Tag>,
    callbacks: Vec<CallbackConfig>,
    /// Route patterns, used to strip the API prefix before picking a tag
    matcher: Option<RouteMatcher>,
    operation_ids: HashSet<String>,
    uses_validation_error: bool,
}

/// OpenAPI Info object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    /// API title
    pub title: String,
    /// API version
    pub version: String,
    /// API description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// OpenAPI PathItem object - represents all operations for a single path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,
}

impl PathItem {
    fn slot(&mut self, method: HttpMethod) -> &mut Option<Operation> {
        match method {
            HttpMethod::Get => &mut self.get,
            HttpMethod::Post => &mut self.post,
            HttpMethod::Put => &mut self.put,
            HttpMethod::Delete => &mut self.delete,
            HttpMethod::Patch => &mut self.patch,
            HttpMethod::Options => &mut self.options,
            HttpMethod::Head => &mut self.head,
        }
    }

    pub fn operation(&self, method: HttpMethod) -> Option<&Operation> {
        match method {
            HttpMethod::Get => self.get.as_ref(),
            HttpMethod::Post => self.post.as_ref(),
            HttpMethod::Put => self.put.as_ref(),
            HttpMethod::Delete => self.delete.as_ref(),
            HttpMethod::Patch => self.patch.as_ref(),
            HttpMethod::Options => self.options.as_ref(),
            HttpMethod::Head => self.head.as_ref(),
        }
    }

    fn operations_mut(&mut self) -> impl Iterator<Item = &mut Operation> {
        [
            &mut self.get,
            &mut self.post,
            &mut self.put,
            &mut self.delete,
            &mut self.patch,
            &mut self.options,
            &mut self.head,
        ]
        .into_iter()
        .filter_map(Option::as_mut)
    }
}

/// OpenAPI Operation object - represents a single API operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    /// Parameters (path, query, header)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<Parameter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    /// Responses by status code
    pub responses: IndexMap<String, Response>,
    /// Requirement alternatives; an empty map makes authentication optional
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<IndexMap<String, Vec<String>>>>,
    /// Callback name → runtime expression → path item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callbacks: Option<IndexMap<String, IndexMap<String, PathItem>>>,
}

/// OpenAPI Parameter object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Parameter location (path, query, header)
    #[serde(rename = "in")]
    pub location: String,
    pub required: bool,
    pub schema: Schema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// OpenAPI RequestBody object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    /// Content types and their schemas
    pub content: IndexMap<String, MediaType>,
}

/// OpenAPI MediaType object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaType {
    pub schema: Schema,
}

/// OpenAPI Response object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<IndexMap<String, MediaType>>,
}

impl Response {
    fn described(description: &str) -> Self {
        Self {
            description: description.to_string(),
            content: None,
        }
    }

    fn json(description: &str, schema: Schema) -> Self {
        Self {
            description: description.to_string(),
            content: Some(json_content(schema)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
}

/// OpenAPI SecurityScheme object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityScheme {
    #[serde(rename = "type")]
    pub scheme_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flows: Option<IndexMap<String, OAuthFlow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthFlow {
    pub token_url: String,
    pub scopes: IndexMap<String, String>,
}

impl From<&AuthenticationScheme> for SecurityScheme {
    fn from(auth: &AuthenticationScheme) -> Self {
        let mut scheme = SecurityScheme {
            scheme_type: String::new(),
            scheme: None,
            bearer_format: None,
            name: None,
            location: None,
            flows: None,
            description: auth.description.clone(),
        };
        match &auth.scheme {
            SchemeType::Bearer { format } => {
                scheme.scheme_type = "http".to_string();
                scheme.scheme = Some("bearer".to_string());
                scheme.bearer_format = format.clone();
            }
            SchemeType::Basic => {
                scheme.scheme_type = "http".to_string();
                scheme.scheme = Some("basic".to_string());
            }
            SchemeType::ApiKey { name, location } => {
                scheme.scheme_type = "apiKey".to_string();
                scheme.name = Some(name.clone());
                scheme.location = Some(location.clone());
            }
            SchemeType::OAuth2 { token_url, scopes } => {
                scheme.scheme_type = "oauth2".to_string();
                let flow = OAuthFlow {
                    token_url: token_url.clone(),
                    scopes: scopes.iter().map(|s| (s.clone(), s.clone())).collect(),
                };
                let mut flows = IndexMap::new();
                flows.insert("password".to_string(), flow.clone());
                flows.insert("clientCredentials".to_string(), flow);
                scheme.flows = Some(flows);
            }
        }
        scheme
    }
}

/// OpenAPI Components object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Components {
    /// Schema definitions
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub schemas: IndexMap<String, Schema>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub security_schemes: IndexMap<String, SecurityScheme>,
}

/// Complete OpenAPI document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiDocument {
    /// OpenAPI version
    pub openapi: String,
    pub info: Info,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<ServerConfig>,
    pub paths: IndexMap<String, PathItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
    /// Requirement shared by every operation, hoisted out of them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<IndexMap<String, Vec<String>>>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl OpenApiBuilder {
    /// Create a new OpenApiBuilder with default info
    pub fn new() -> Self {
        debug!("Initializing OpenApiBuilder");
        Self {
            info: Info {
                title: "API Documentation".to_string(),
                version: "1.0.0".to_string(),
                description: None,
            },
            servers: Vec::new(),
            paths: IndexMap::new(),
            tags: Vec::new(),
            callbacks: Vec::new(),
            matcher: None,
            operation_ids: HashSet::new(),
            uses_validation_error: false,
        }
    }

    /// Set custom info for the API
    pub fn with_info(
        mut self,
        title: String,
        version: String,
        description: Option<String>,
    ) -> Self {
        self.info = Info {
            title,
            version,
            description,
        };
        self
    }

    pub fn with_servers(mut self, servers: Vec<ServerConfig>) -> Self {
        self.servers = servers;
        self
    }

    pub fn with_callbacks(mut self, callbacks: Vec<CallbackConfig>) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_matcher(mut self, matcher: RouteMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Add one operation per HTTP method of an analyzed route
    pub fn add_route(&mut self, analysis: &RouteAnalysis, schema_gen: &mut SchemaGenerator) {
        let route = &analysis.route;
        let openapi_path = route.openapi_path();
        let tag = self.tag_for(route);
        if !self.tags.iter().any(|t| t.name == tag) {
            self.tags.push(Tag { name: tag.clone() });
        }

        for &method in &route.methods {
            debug!("Adding route: {} {}", method.verb(), openapi_path);
            let operation = self.operation(analysis, method, &tag, schema_gen);
            let slot = self.paths.entry(openapi_path.clone()).or_default().slot(method);
            if slot.is_some() {
                debug!("{} {} already documented; keeping the first", method.verb(), openapi_path);
                continue;
            }
            *slot = Some(operation);
        }
    }

    fn operation(
        &mut self,
        analysis: &RouteAnalysis,
        method: HttpMethod,
        tag: &str,
        schema_gen: &mut SchemaGenerator,
    ) -> Operation {
        let route = &analysis.route;
        let inputs = analysis.parameters(method);

        let mut parameters: Vec<Parameter> = route
            .path_parameters
            .iter()
            .map(|p| Parameter {
                name: p.name.clone(),
                location: "path".to_string(),
                // OpenAPI path parameters are always required
                required: true,
                schema: from_type_info(&p.schema),
                description: (!p.required).then(|| "Optional segment".to_string()),
            })
            .collect();
        for input in inputs.iter().filter(|p| p.location != ParameterLocation::Body) {
            parameters.push(Parameter {
                name: query_name(&input.name),
                location: location_name(input.location).to_string(),
                required: input.required,
                schema: from_type_info(&input.schema),
                description: Some(input.description.clone()),
            });
        }
        let pagination = analysis.controller.as_ref().and_then(|c| c.pagination.as_ref());
        if let Some(pagination) = pagination {
            let name = match pagination.kind {
                PaginationKind::Cursor => "cursor",
                _ => "page",
            };
            if !parameters.iter().any(|p| p.name == name) {
                let schema = match pagination.kind {
                    PaginationKind::Cursor => Schema::typed("string"),
                    _ => Schema::typed("integer"),
                };
                parameters.push(Parameter {
                    name: name.to_string(),
                    location: "query".to_string(),
                    required: false,
                    schema,
                    description: None,
                });
            }
        }

        let body: Vec<ParameterDefinition> = inputs
            .into_iter()
            .filter(|p| p.location == ParameterLocation::Body)
            .collect();
        let request_body = if body.is_empty() {
            None
        } else {
            let schema = parameters_schema(&body);
            let media = if schema.has_binary() {
                "multipart/form-data"
            } else {
                "application/json"
            };
            let mut content = IndexMap::new();
            content.insert(media.to_string(), MediaType { schema });
            Some(RequestBody {
                description: None,
                required: body.iter().any(|p| p.required),
                content,
            })
        };

        let security = analysis.auth.as_ref().map(|auth| {
            let mut requirement = IndexMap::new();
            requirement.insert(auth.scheme.clone(), auth.scopes.clone());
            if auth.required {
                vec![requirement]
            } else {
                vec![requirement, IndexMap::new()]
            }
        });

        Operation {
            tags: vec![tag.to_string()],
            summary: Some(format!("{} {}", method.verb(), route.openapi_path())),
            description: analysis
                .request
                .as_ref()
                .filter(|r| r.rule_set.has_conditions)
                .map(|_| "Validation rules depend on request conditions.".to_string()),
            operation_id: Some(self.operation_id(route, method)),
            parameters: if parameters.is_empty() { None } else { Some(parameters) },
            request_body,
            responses: self.responses(analysis, method, schema_gen),
            security,
            callbacks: self.callbacks_for(route),
        }
    }

    fn responses(
        &mut self,
        analysis: &RouteAnalysis,
        method: HttpMethod,
        schema_gen: &mut SchemaGenerator,
    ) -> IndexMap<String, Response> {
        let mut responses = IndexMap::new();
        let controller = analysis.controller.as_ref();
        let status = success_status(analysis, method);

        let body = if status == 204 {
            None
        } else {
            let pagination = controller.and_then(|c| c.pagination.as_ref());
            let item = analysis.response().map(|response| {
                let schema = schema_gen.resource_schema(&response.class);
                let is_array_component = schema_gen.resource(&response.class).is_some_and(|s| {
                    s.kind == crate::resource_analyzer::ResourceKind::ResourceCollection
                });
                if response.collection && !is_array_component {
                    Schema::array_of(schema)
                } else {
                    schema
                }
            });
            match (item, pagination) {
                (Some(data), Some(pagination)) => Some(paginated(data, pagination)),
                (None, Some(pagination)) => Some(paginated(
                    Schema::array_of(Schema::typed("object")),
                    pagination,
                )),
                (Some(data), None) => {
                    let structure =
                        analysis.response().and_then(|r| schema_gen.resource(&r.class));
                    let wrap = structure
                        .map(|s| s.wrap.clone())
                        .unwrap_or(Some("data".to_string()));
                    let mut body = match wrap {
                        Some(key) => {
                            let mut properties = IndexMap::new();
                            properties.insert(key.clone(), data);
                            Schema::object(properties, vec![key])
                        }
                        None => data,
                    };
                    if let (Some(structure), Some(properties)) =
                        (structure, body.properties.as_mut())
                    {
                        for (name, field) in &structure.additional {
                            properties.insert(name.clone(), schema_gen.field_schema(field));
                        }
                    }
                    Some(body)
                }
                (None, None) => None,
            }
        };
        let description = reason(status);
        responses.insert(
            status.to_string(),
            match body {
                Some(schema) => Response::json(description, schema),
                None => Response::described(description),
            },
        );

        if analysis.auth.as_ref().is_some_and(|a| a.required) {
            responses.insert("401".to_string(), Response::described("Unauthenticated."));
        }
        if analysis.request.as_ref().is_some_and(|r| r.authorizes) {
            responses.insert(
                "403".to_string(),
                Response::described("This action is unauthorized."),
            );
        }
        for &code in controller.map(|c| c.error_statuses.as_slice()).unwrap_or_default() {
            responses
                .entry(code.to_string())
                .or_insert_with(|| Response::described(reason(code)));
        }
        if analysis.validates() {
            self.uses_validation_error = true;
            responses.insert(
                "422".to_string(),
                Response::json("Validation failed.", Schema::reference(VALIDATION_ERROR)),
            );
        }
        responses
    }

    /// Tag from the first literal URI segment after the matched route prefix
    fn tag_for(&self, route: &RouteInfo) -> String {
        let uri = match &self.matcher {
            Some(matcher) => matcher.strip_prefix(&route.uri),
            None => route.uri.as_str(),
        };
        uri.split('/')
            .find(|segment| !segment.is_empty() && !segment.starts_with('{'))
            .unwrap_or("default")
            .to_string()
    }

    /// Route name (suffixed with the verb for multi-method routes), else `<method><Path>`
    fn operation_id(&mut self, route: &RouteInfo, method: HttpMethod) -> String {
        let verb = method.verb().to_ascii_lowercase();
        let base = match &route.name {
            Some(name) if route.methods.len() > 1 => format!("{}.{}", name, verb),
            Some(name) => name.clone(),
            None => {
                let path: String = route
                    .uri
                    .split(['/', '-', '_', '.'])
                    .map(|segment| segment.trim_matches(|c| c == '{' || c == '}' || c == '?'))
                    .filter(|segment| !segment.is_empty())
                    .map(|segment| {
                        let mut chars = segment.chars();
                        match chars.next() {
                            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                            None => String::new(),
                        }
                    })
                    .collect();
                format!("{}{}", verb, path)
            }
        };
        let mut id = base.clone();
        let mut suffix = 2;
        while !self.operation_ids.insert(id.clone()) {
            id = format!("{}{}", base, suffix);
            suffix += 1;
        }
        id
    }

    fn callbacks_for(
        &self,
        route: &RouteInfo,
    ) -> Option<IndexMap<String, IndexMap<String, PathItem>>> {
        let mut callbacks = IndexMap::new();
        for callback in &self.callbacks {
            let target = callback.route.trim_start_matches('/');
            if route.name.as_deref() != Some(target) && route.uri != target {
                continue;
            }
            let Some(method) = HttpMethod::parse(&callback.method) else {
                debug!("Ignoring callback {} with method {}", callback.name, callback.method);
                continue;
            };
            let mut responses = IndexMap::new();
            responses.insert("200".to_string(), Response::described("Callback received."));
            let mut item = PathItem::default();
            *item.slot(method) = Some(Operation {
                summary: callback.description.clone(),
                request_body: Some(RequestBody {
                    description: None,
                    required: true,
                    content: json_content(Schema::typed("object")),
                }),
                responses,
                ..Operation::default()
            });
            let mut expressions = IndexMap::new();
            expressions.insert(callback.expression.clone(), item);
            callbacks.insert(callback.name.clone(), expressions);
        }
        if callbacks.is_empty() {
            None
        } else {
            Some(callbacks)
        }
    }

    /// Build the final OpenAPI document
    pub fn build(
        self,
        schema_gen: SchemaGenerator,
        schemes: &IndexMap<String, AuthenticationScheme>,
    ) -> OpenApiDocument {
        debug!("Building final OpenAPI document");

        let mut schema_gen = schema_gen;
        if self.uses_validation_error {
            schema_gen.add_component(VALIDATION_ERROR, validation_error_schema());
        }
        let components = Components {
            schemas: schema_gen.into_schemas(),
            security_schemes: schemes
                .iter()
                .map(|(name, scheme)| (name.clone(), SecurityScheme::from(scheme)))
                .collect(),
        };
        let empty = components.schemas.is_empty() && components.security_schemes.is_empty();
        let components = if empty { None } else { Some(components) };

        let mut paths = self.paths;
        let security = hoist_security(&mut paths);

        OpenApiDocument {
            openapi: "3.0.3".to_string(),
            info: self.info,
            servers: self.servers,
            paths,
            components,
            security,
            tags: self.tags,
        }
    }
}

impl Default for OpenApiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Move a requirement list that every operation repeats to the document level
fn hoist_security(
    paths: &mut IndexMap<String, PathItem>,
) -> Option<Vec<IndexMap<String, Vec<String>>>> {
    let mut shared: Option<Vec<IndexMap<String, Vec<String>>>> = None;
    for operation in paths.values_mut().flat_map(PathItem::operations_mut) {
        match (&operation.security, &shared) {
            (None, _) => return None,
            (Some(security), Some(seen)) if security != seen => return None,
            (Some(security), None) => shared = Some(security.clone()),
            _ => {}
        }
    }
    let shared = shared?;
    for operation in paths.values_mut().flat_map(PathItem::operations_mut) {
        operation.security = None;
    }
    debug!("Hoisted security requirement shared by every operation");
    Some(shared)
}

fn json_content(schema: Schema) -> IndexMap<String, MediaType> {
    let mut content = IndexMap::new();
    content.insert("application/json".to_string(), MediaType { schema });
    content
}

fn location_name(location: ParameterLocation) -> &'static str {
    match location {
        ParameterLocation::Body => "body",
        ParameterLocation::Query => "query",
        ParameterLocation::Path => "path",
        ParameterLocation::Header => "header",
    }
}

/// `filter.status` → `filter[status]`, `ids.*` → `ids[]`
fn query_name(name: &str) -> String {
    let mut segments = name.split('.');
    let mut out = segments.next().unwrap_or_default().to_string();
    for segment in segments {
        if segment == "*" {
            out.push_str("[]");
        } else {
            out.push_str(&format!("[{}]", segment));
        }
    }
    out
}

/// 201 for `store`, 204 for `destroy`, unless the controller sets a status itself
fn success_status(analysis: &RouteAnalysis, method: HttpMethod) -> u16 {
    if let Some(status) = analysis.controller.as_ref().and_then(|c| c.success_status) {
        return status;
    }
    match analysis.route.action.as_deref() {
        Some("store") if method == HttpMethod::Post => 201,
        Some("destroy") if method == HttpMethod::Delete => 204,
        _ => 200,
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "Successful response",
        201 => "Created",
        202 => "Accepted",
        204 => "No content",
        400 => "Bad request",
        401 => "Unauthenticated.",
        403 => "This action is unauthorized.",
        404 => "Not found",
        409 => "Conflict",
        422 => "Validation failed.",
        429 => "Too many requests",
        _ => "Response",
    }
}

fn validation_error_schema() -> Schema {
    let mut errors = Schema::typed("object");
    errors.description = Some("Messages keyed by field name".to_string());
    let mut properties = IndexMap::new();
    let mut message = Schema::typed("string");
    message.example = Some(Value::from("The given data was invalid."));
    properties.insert("message".to_string(), message);
    properties.insert("errors".to_string(), errors);
    Schema::object(properties, vec!["message".to_string(), "errors".to_string()])
}

/// Laravel's paginated resource envelope around `data`
fn paginated(data: Schema, pagination: &Pagination) -> Schema {
    let data = if data.schema_type.as_deref() == Some("array") {
        data
    } else {
        Schema::array_of(data)
    };
    let string = || Schema::typed("string");
    let nullable_string = || Schema::typed("string").into_nullable();
    let integer = || Schema::typed("integer");
    let nullable_integer = || Schema::typed("integer").into_nullable();

    let mut links = IndexMap::new();
    links.insert("first".to_string(), nullable_string());
    links.insert("last".to_string(), nullable_string());
    links.insert("prev".to_string(), nullable_string());
    links.insert("next".to_string(), nullable_string());

    let mut per_page = integer();
    per_page.example = Some(Value::from(pagination.per_page));

    let mut meta = IndexMap::new();
    match pagination.kind {
        PaginationKind::LengthAware => {
            meta.insert("current_page".to_string(), integer());
            meta.insert("from".to_string(), nullable_integer());
            meta.insert("last_page".to_string(), integer());
            meta.insert("path".to_string(), string());
            meta.insert("per_page".to_string(), per_page);
            meta.insert("to".to_string(), nullable_integer());
            meta.insert("total".to_string(), integer());
        }
        PaginationKind::Simple => {
            meta.insert("current_page".to_string(), integer());
            meta.insert("from".to_string(), nullable_integer());
            meta.insert("path".to_string(), string());
            meta.insert("per_page".to_string(), per_page);
            meta.insert("to".to_string(), nullable_integer());
        }
        PaginationKind::Cursor => {
            meta.insert("path".to_string(), string());
            meta.insert("per_page".to_string(), per_page);
            meta.insert("next_cursor".to_string(), nullable_string());
            meta.insert("prev_cursor".to_string(), nullable_string());
        }
    }

    let mut properties = IndexMap::new();
    properties.insert("data".to_string(), data);
    properties.insert("links".to_string(), Schema::object(links, Vec::new()));
    properties.insert("meta".to_string(), Schema::object(meta, Vec::new()));
    Schema::object(
        properties,
        vec!["data".to_string(), "links".to_string(), "meta".to_string()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::auth::RouteAuthentication;
    use crate::extractor::controller::{ControllerAnalysis, ResponseRef};
    use crate::extractor::RouteRecord;
    use crate::request_analyzer::RequestAnalysis;
    use crate::resource_analyzer::ResourceStructure;
    use crate::rules::{ConditionalRuleSet, RuleMap, RuleToken};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn route(json: Value) -> RouteInfo {
        let record: RouteRecord = serde_json::from_value(json).unwrap();
        RouteInfo::from_record(&record)
    }

    fn controller(method: &str) -> ControllerAnalysis {
        serde_json::from_value(json!({
            "controller": "App\\Http\\Controllers\\PostController",
            "method": method
        }))
        .unwrap()
    }

    fn request(rules: &[(&str, &[&str])]) -> RequestAnalysis {
        let mut map = RuleMap::new();
        for (field, tokens) in rules {
            map.insert(field.to_string(), tokens.iter().map(|t| RuleToken::plain(*t)).collect());
        }
        RequestAnalysis {
            class: "App\\Http\\Requests\\StorePostRequest".to_string(),
            rule_set: ConditionalRuleSet::unconditional(map),
            attributes: IndexMap::new(),
            messages: IndexMap::new(),
            authorizes: true,
        }
    }

    fn resources() -> IndexMap<String, ResourceStructure> {
        let post: ResourceStructure = serde_json::from_value(json!({
            "class": "App\\Http\\Resources\\PostResource",
            "kind": "json_resource",
            "properties": {
                "id": {"type": "integer", "source": "property"},
                "title": {"type": "string", "source": "property"}
            },
            "wrap": "data",
            "valid": true
        }))
        .unwrap();
        let mut resources = IndexMap::new();
        resources.insert(post.class.clone(), post);
        resources
    }

    fn sanctum() -> Option<RouteAuthentication> {
        Some(RouteAuthentication {
            scheme: "sanctum".to_string(),
            required: true,
            middleware: "auth:sanctum".to_string(),
            scopes: Vec::new(),
        })
    }

    #[test]
    fn test_store_route_operation() {
        let mut controller = controller("store");
        controller.response = Some(ResponseRef {
            class: "App\\Http\\Resources\\PostResource".to_string(),
            collection: false,
        });
        let analysis = RouteAnalysis {
            route: route(json!({
                "method": "POST",
                "uri": "api/posts",
                "name": "posts.store",
                "action": "App\\Http\\Controllers\\PostController@store"
            })),
            controller: Some(controller),
            request: Some(request(&[
                ("title", &["required", "string", "max:120"]),
                ("cover", &["image"]),
            ])),
            auth: sanctum(),
        };

        let resources = resources();
        let mut schema_gen = SchemaGenerator::new(&resources);
        let mut builder =
            OpenApiBuilder::new().with_matcher(RouteMatcher::new(&["api/*".to_string()]).unwrap());
        builder.add_route(&analysis, &mut schema_gen);
        let document = builder.build(schema_gen, &IndexMap::new());

        let operation = document.paths["/api/posts"].post.as_ref().unwrap();
        assert_eq!(operation.operation_id.as_deref(), Some("posts.store"));
        assert_eq!(operation.tags, vec!["posts"]);
        assert_eq!(
            operation.responses.keys().collect::<Vec<_>>(),
            vec!["201", "401", "403", "422"]
        );
        let created = operation.responses["201"].content.as_ref().unwrap();
        let envelope = &created["application/json"].schema;
        assert_eq!(
            envelope.properties.as_ref().unwrap()["data"].reference.as_deref(),
            Some("#/components/schemas/PostResource")
        );

        let body = operation.request_body.as_ref().unwrap();
        assert!(body.required);
        assert!(body.content.contains_key("multipart/form-data"));
        // The only operation's requirement moves to the document
        assert_eq!(operation.security, None);
        assert_eq!(
            document.security,
            Some(vec![IndexMap::from([("sanctum".to_string(), Vec::new())])])
        );

        let components = document.components.unwrap();
        assert!(components.schemas.contains_key("PostResource"));
        assert!(components.schemas.contains_key(VALIDATION_ERROR));
    }

    #[test]
    fn test_paginated_index_and_destroy() {
        let mut index = controller("index");
        index.response = Some(ResponseRef {
            class: "App\\Http\\Resources\\PostResource".to_string(),
            collection: true,
        });
        index.pagination = Some(Pagination {
            kind: PaginationKind::Simple,
            model: Some("App\\Models\\Post".to_string()),
            per_page: 20,
        });
        let list = RouteAnalysis {
            route: route(json!({"method": "GET|HEAD", "uri": "api/posts", "action": "App\\Http\\Controllers\\PostController@index"})),
            controller: Some(index),
            request: None,
            auth: None,
        };
        let destroy = RouteAnalysis {
            route: route(json!({"method": "DELETE", "uri": "api/posts/{post}", "action": "App\\Http\\Controllers\\PostController@destroy"})),
            controller: Some(controller("destroy")),
            request: None,
            auth: None,
        };

        let resources = resources();
        let mut schema_gen = SchemaGenerator::new(&resources);
        let mut builder = OpenApiBuilder::new();
        builder.add_route(&list, &mut schema_gen);
        builder.add_route(&destroy, &mut schema_gen);
        let document = builder.build(schema_gen, &IndexMap::new());

        let get = document.paths["/api/posts"].get.as_ref().unwrap();
        assert_eq!(get.operation_id.as_deref(), Some("getApiPosts"));
        let parameters = get.parameters.as_ref().unwrap();
        assert_eq!(parameters[0].name, "page");
        let schema = &get.responses["200"].content.as_ref().unwrap()["application/json"].schema;
        let properties = schema.properties.as_ref().unwrap();
        assert_eq!(properties["data"].schema_type.as_deref(), Some("array"));
        let meta = properties["meta"].properties.as_ref().unwrap();
        assert!(!meta.contains_key("total"));
        assert_eq!(meta["per_page"].example, Some(json!(20)));

        let delete = document.paths["/api/posts/{post}"].delete.as_ref().unwrap();
        assert!(delete.responses["204"].content.is_none());
        let path = &delete.parameters.as_ref().unwrap()[0];
        assert_eq!(path.location, "path");
        assert_eq!(path.schema.schema_type.as_deref(), Some("integer"));
        assert_eq!(document.tags, vec![Tag { name: "api".to_string() }]);
    }

    #[test]
    fn test_callbacks_and_security_schemes() {
        let analysis = RouteAnalysis {
            route: route(json!({
                "method": "POST",
                "uri": "api/webhooks",
                "name": "webhooks.store",
                "action": "App\\Http\\Controllers\\WebhookController@store"
            })),
            controller: None,
            request: None,
            auth: Some(RouteAuthentication {
                scheme: "passport".to_string(),
                required: false,
                middleware: "auth:api".to_string(),
                scopes: vec!["hooks".to_string()],
            }),
        };
        let callback = CallbackConfig {
            route: "webhooks.store".to_string(),
            name: "delivery".to_string(),
            expression: "{$request.body#/callback_url}".to_string(),
            method: "post".to_string(),
            description: Some("Delivery report".to_string()),
        };
        let mut schemes = IndexMap::new();
        schemes.insert(
            "passport".to_string(),
            AuthenticationScheme {
                name: "passport".to_string(),
                scheme: SchemeType::OAuth2 {
                    token_url: "/oauth/token".to_string(),
                    scopes: vec!["hooks".to_string()],
                },
                description: None,
            },
        );

        let resources = IndexMap::new();
        let mut schema_gen = SchemaGenerator::new(&resources);
        let mut builder = OpenApiBuilder::new().with_callbacks(vec![callback]);
        builder.add_route(&analysis, &mut schema_gen);
        let document = builder.build(schema_gen, &schemes);

        let operation = document.paths["/api/webhooks"].post.as_ref().unwrap();
        let callbacks = operation.callbacks.as_ref().unwrap();
        assert!(callbacks["delivery"]["{$request.body#/callback_url}"].post.is_some());
        // Optional authentication lists an empty alternative
        assert_eq!(document.security.as_ref().unwrap().len(), 2);
        assert!(!operation.responses.contains_key("401"));

        let scheme = &document.components.as_ref().unwrap().security_schemes["passport"];
        assert_eq!(scheme.scheme_type, "oauth2");
        assert_eq!(scheme.flows.as_ref().unwrap()["password"].scopes.len(), 1);
    }

    #[test]
    fn test_document_roundtrip() {
        let analysis = RouteAnalysis {
            route: route(json!({"method": "PUT|PATCH", "uri": "api/posts/{post}", "name": "posts.update", "action": "App\\Http\\Controllers\\PostController@update"})),
            controller: Some(controller("update")),
            request: Some(request(&[("title", &["sometimes", "string"])])),
            auth: sanctum(),
        };
        let resources = resources();
        let mut schema_gen = SchemaGenerator::new(&resources);
        let mut builder =
            OpenApiBuilder::new().with_info("Blog".to_string(), "2.0.0".to_string(), None);
        builder.add_route(&analysis, &mut schema_gen);
        let document = builder.build(schema_gen, &IndexMap::new());

        let item = &document.paths["/api/posts/{post}"];
        assert_eq!(
            item.operation(HttpMethod::Patch).unwrap().operation_id.as_deref(),
            Some("posts.update.patch")
        );

        let json = serde_json::to_string(&document).unwrap();
        let back: OpenApiDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, document);
    }
}
