//! Per-route orchestration.
//!
//! [`RouteAnalyzer`] turns route records into [`RouteAnalysis`] values: it resolves each
//! route's controller method, analyzes the FormRequest and the response resource it names
//! (through the documentation cache), detects authentication, and keeps a registry of every
//! resource reached so the document builder can emit them as components. Failures are
//! recorded per route and never stop the run.

use super::auth::{AuthDetector, AuthenticationScheme, RouteAuthentication};
use super::controller::{ControllerAnalysis, ControllerAnalyzer, ResponseRef};
use super::{HttpMethod, RouteInfo, RouteRecord};
use crate::cache::{CacheStats, DocumentationCache};
use crate::class_resolver::ClassResolver;
use crate::config::RouteMatcher;
use crate::diagnostics::DiagnosticCollector;
use crate::error::{Error, Result};
use crate::request_analyzer::{
    build_parameters, ParameterDefinition, ParameterLocation, RequestAnalysis, RequestAnalyzer,
};
use crate::resource_analyzer::{ResourceAnalyzer, ResourceStructure};
use crate::type_inference::TypeInfo;
use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Everything learned about one route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteAnalysis {
    pub route: RouteInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<ControllerAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<RouteAuthentication>,
}

impl RouteAnalysis {
    fn bare(route: RouteInfo, auth: Option<RouteAuthentication>) -> Self {
        Self {
            route,
            controller: None,
            request: None,
            auth,
        }
    }

    /// Response resource named by the controller
    pub fn response(&self) -> Option<&ResponseRef> {
        self.controller.as_ref()?.response.as_ref()
    }

    /// Whether any validation (FormRequest or inline) applies
    pub fn validates(&self) -> bool {
        self.request.as_ref().is_some_and(RequestAnalysis::has_rules)
            || self.controller.as_ref().is_some_and(|c| !c.inline_rules.is_empty())
    }

    /// Input parameters for one HTTP method.
    ///
    /// Validated fields come first and win over fields only known from how the controller
    /// reads the request. Reads go to the query string for `GET`/`DELETE` and to the body
    /// otherwise, except `query()` reads which are always query parameters. Headers read by
    /// the controller are header parameters; path placeholders are never repeated here.
    pub fn parameters(&self, method: HttpMethod) -> Vec<ParameterDefinition> {
        let location = if method.reads_query() {
            ParameterLocation::Query
        } else {
            ParameterLocation::Body
        };

        let mut parameters = match &self.request {
            Some(request) => request.parameters(method.verb(), location),
            None => Vec::new(),
        };
        let Some(controller) = &self.controller else {
            return self.without_path_names(parameters);
        };

        let labels = self
            .request
            .as_ref()
            .map(|r| r.attributes.clone())
            .unwrap_or_default();
        for inline in build_parameters(&controller.inline_rules, &labels, location) {
            if !parameters.iter().any(|p| p.name == inline.name) {
                parameters.push(inline);
            }
        }

        for input in &controller.inputs {
            if let Some(existing) = parameters.iter_mut().find(|p| p.name == input.name) {
                if existing.schema.default.is_none() {
                    existing.schema.default = input.default.clone();
                }
                continue;
            }
            let mut schema = input.schema.clone();
            schema.default = input.default.clone();
            let input_location = if input.query_only {
                ParameterLocation::Query
            } else {
                location
            };
            parameters.push(ParameterDefinition::untyped(&input.name, input_location, schema));
        }

        for header in &controller.headers {
            parameters.push(ParameterDefinition::untyped(
                header,
                ParameterLocation::Header,
                TypeInfo::new("string"),
            ));
        }

        self.without_path_names(parameters)
    }

    fn without_path_names(
        &self,
        mut parameters: Vec<ParameterDefinition>,
    ) -> Vec<ParameterDefinition> {
        parameters.retain(|p| {
            p.location == ParameterLocation::Header
                || !self.route.path_parameters.iter().any(|path| path.name == p.name)
        });
        parameters
    }
}

/// Runs the analyzers over a route table
pub struct RouteAnalyzer {
    resolver: ClassResolver,
    cache: DocumentationCache,
    matcher: RouteMatcher,
    auth: AuthDetector,
    /// Memoised FormRequest analyses for this run, `None` for classes that failed
    requests: HashMap<String, Option<RequestAnalysis>>,
    /// Every resource reached from a route, nested ones included
    resources: IndexMap<String, ResourceStructure>,
    /// Resources that were attempted and could not be analyzed
    failed_resources: Vec<String>,
}

impl RouteAnalyzer {
    pub fn new(
        resolver: ClassResolver,
        cache: DocumentationCache,
        matcher: RouteMatcher,
        auth: AuthDetector,
    ) -> Self {
        Self {
            resolver,
            cache,
            matcher,
            auth,
            requests: HashMap::new(),
            resources: IndexMap::new(),
            failed_resources: Vec::new(),
        }
    }

    /// Analyze every record selected by the route patterns, in table order
    pub fn analyze_routes(
        &mut self,
        records: &[RouteRecord],
        diagnostics: &mut DiagnosticCollector,
    ) -> Vec<RouteAnalysis> {
        let mut analyses = Vec::new();
        for record in records {
            if !self.matcher.matches(&record.uri) {
                debug!("Skipping {} (no matching route pattern)", record.uri);
                continue;
            }
            let route = RouteInfo::from_record(record);
            if route.methods.is_empty() {
                diagnostics.warning(
                    format!("route:{}", route.uri),
                    format!("No documentable HTTP method in {:?}", record.http_methods),
                );
                continue;
            }
            analyses.push(self.analyze_route(route, diagnostics));
        }
        info!(
            "Analyzed {} route(s), {} resource(s)",
            analyses.len(),
            self.resources.len()
        );
        analyses
    }

    /// Analyze one route. Problems are recorded against the route and the analysis keeps
    /// whatever could be learned.
    pub fn analyze_route(
        &mut self,
        route: RouteInfo,
        diagnostics: &mut DiagnosticCollector,
    ) -> RouteAnalysis {
        let context = format!("route:{}", route.label());
        let auth = self.auth.detect(&route.middleware);

        let (Some(controller), Some(action)) = (route.controller.clone(), route.action.clone())
        else {
            diagnostics.warning(context, "Closure route; handler not analyzed");
            return RouteAnalysis::bare(route, auth);
        };

        let analysis = match self.analyze_controller(&controller, &action) {
            Ok(Some(analysis)) => analysis,
            Ok(None) => {
                let missing = Error::MissingClass(format!("{}@{}", controller, action));
                diagnostics.record(&context, &missing);
                return RouteAnalysis::bare(route, auth);
            }
            Err(e) => {
                diagnostics.record(&context, &e);
                return RouteAnalysis::bare(route, auth);
            }
        };

        let request = match &analysis.form_request {
            Some(fqcn) => self.request(fqcn, diagnostics),
            None => None,
        };
        if let Some(response) = &analysis.response {
            self.resource(&response.class, diagnostics);
        }

        RouteAnalysis {
            route,
            controller: Some(analysis),
            request,
            auth,
        }
    }

    /// Every resource analyzed so far, keyed by class
    pub fn resources(&self) -> &IndexMap<String, ResourceStructure> {
        &self.resources
    }

    pub fn security_schemes(&self) -> &IndexMap<String, AuthenticationScheme> {
        self.auth.schemes()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn analyze_controller(
        &mut self,
        controller: &str,
        action: &str,
    ) -> Result<Option<ControllerAnalysis>> {
        let Some(class) = self.resolver.find_class(controller)? else {
            return Ok(None);
        };
        let dependencies = self.resolver.dependency_files(&class);
        let resolver = &mut self.resolver;
        self.cache.remember_with(
            &format!("controller:{}@{}", controller, action),
            &dependencies,
            || {
                let (analysis, files) = resolver.track(|resolver| {
                    ControllerAnalyzer::new(resolver).analyze(controller, action)
                });
                analysis.map(|analysis| (analysis, files))
            },
        )
    }

    fn request(
        &mut self,
        fqcn: &str,
        diagnostics: &mut DiagnosticCollector,
    ) -> Option<RequestAnalysis> {
        if let Some(known) = self.requests.get(fqcn) {
            return known.clone();
        }
        let context = format!("request:{}", fqcn);
        let analysis = match self.analyze_request(fqcn) {
            Ok(Some(analysis)) => Some(analysis),
            Ok(None) => {
                diagnostics.record(&context, &Error::MissingClass(fqcn.to_string()));
                None
            }
            Err(e) => {
                diagnostics.record(&context, &e);
                None
            }
        };
        self.requests.insert(fqcn.to_string(), analysis.clone());
        analysis
    }

    fn analyze_request(&mut self, fqcn: &str) -> Result<Option<RequestAnalysis>> {
        let Some(class) = self.resolver.find_class(fqcn)? else {
            return Ok(None);
        };
        let dependencies = self.resolver.dependency_files(&class);
        let resolver = &mut self.resolver;
        self.cache
            .remember_with(&format!("request:{}", fqcn), &dependencies, || {
                // enum, rule and delegated classes read by the rules count as dependencies
                let (analysis, files) = resolver
                    .track(|resolver| RequestAnalyzer::new(resolver).analyze_class(&class));
                analysis.map(|analysis| (analysis, files))
            })
            .map(Some)
    }

    /// Analyze a resource and, transitively, the resources it nests or collects
    fn resource(&mut self, fqcn: &str, diagnostics: &mut DiagnosticCollector) {
        let mut pending = vec![fqcn.to_string()];
        while let Some(class) = pending.pop() {
            if self.resources.contains_key(&class) || self.failed_resources.contains(&class) {
                continue;
            }
            let context = format!("resource:{}", class);
            match self.analyze_resource(&class) {
                Ok(Some(structure)) => {
                    if !structure.valid {
                        diagnostics.warning(&context, "No toArray() or transform() method found");
                    }
                    pending.extend(structure.nested_resources.iter().cloned());
                    pending.extend(structure.collects.iter().cloned());
                    self.resources.insert(class, structure);
                }
                Ok(None) => {
                    diagnostics.record(&context, &Error::MissingClass(class.clone()));
                    self.failed_resources.push(class);
                }
                Err(e) => {
                    diagnostics.record(&context, &e);
                    self.failed_resources.push(class);
                }
            }
        }
    }

    fn analyze_resource(&mut self, fqcn: &str) -> Result<Option<ResourceStructure>> {
        let Some(class) = self.resolver.find_class(fqcn)? else {
            return Ok(None);
        };
        let dependencies = self.resolver.dependency_files(&class);
        self.cache.remember_resource(
            &format!("resource:{}", fqcn),
            &dependencies,
            &mut self.resolver,
            |resolver| ResourceAnalyzer::new(resolver).analyze_class(&class).map(Some),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_resolver::resolver_for;
    use crate::detector::DetectionResult;
    use crate::scanner::ClassIndex;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const FILES: &[(&str, &str)] = &[
        (
            "app/Http/Controllers/OrderController.php",
            r#"<?php
namespace App\Http\Controllers;

use App\Http\Requests\StoreOrderRequest;
use App\Http\Resources\OrderResource;
use App\Models\Order;
use Illuminate\Http\Request;

class OrderController extends Controller
{
    public function index(Request $request)
    {
        $request->validate(['status' => 'in:open,closed']);
        $sort = $request->query('sort', 'created_at');
        return OrderResource::collection(Order::paginate());
    }

    public function store(StoreOrderRequest $request)
    {
        return new OrderResource(Order::create($request->validated()));
    }

    public function show(Order $order)
    {
        return new OrderResource($order);
    }
}
"#,
        ),
        (
            "app/Http/Requests/StoreOrderRequest.php",
            r#"<?php
namespace App\Http\Requests;
use Illuminate\Foundation\Http\FormRequest;
class StoreOrderRequest extends FormRequest {
    public function rules() {
        return ['customer_id' => 'required|integer', 'note' => 'nullable|string'];
    }
}
"#,
        ),
        (
            "app/Http/Resources/OrderResource.php",
            r#"<?php
namespace App\Http\Resources;
use Illuminate\Http\Resources\Json\JsonResource;
class OrderResource extends JsonResource {
    public function toArray($request) {
        return ['id' => $this->id, 'customer' => new CustomerResource($this->customer)];
    }
}
"#,
        ),
        (
            "app/Http/Resources/CustomerResource.php",
            r#"<?php
namespace App\Http\Resources;
use Illuminate\Http\Resources\Json\JsonResource;
class CustomerResource extends JsonResource {
    public function toArray($request) { return ['id' => $this->id, 'name' => $this->name]; }
}
"#,
        ),
    ];

    fn analyzer(dir: &TempDir) -> RouteAnalyzer {
        with_resolver(dir, resolver_for(dir, FILES))
    }

    fn with_resolver(dir: &TempDir, resolver: ClassResolver) -> RouteAnalyzer {
        RouteAnalyzer::new(
            resolver,
            DocumentationCache::new(dir.path().join("cache"), true),
            RouteMatcher::new(&["api/*".to_string()]).unwrap(),
            AuthDetector::new(DetectionResult::default(), "bearer"),
        )
    }

    fn records() -> Vec<RouteRecord> {
        serde_json::from_str(
            r#"[
                {"method": "GET|HEAD", "uri": "api/orders", "action": "App\\Http\\Controllers\\OrderController@index", "middleware": ["api", "auth:sanctum"]},
                {"method": "POST", "uri": "api/orders", "action": "App\\Http\\Controllers\\OrderController@store", "middleware": ["api", "auth:sanctum"]},
                {"method": "GET|HEAD", "uri": "api/orders/{order}", "action": "App\\Http\\Controllers\\OrderController@show"},
                {"method": "GET|HEAD", "uri": "api/health", "action": "Closure"},
                {"method": "GET|HEAD", "uri": "api/missing", "action": "App\\Http\\Controllers\\MissingController@index"},
                {"method": "GET|HEAD", "uri": "up", "action": "Closure"}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_routes_are_analyzed_and_failures_recorded() {
        let dir = TempDir::new().unwrap();
        let mut analyzer = analyzer(&dir);
        let mut diagnostics = DiagnosticCollector::new();
        let analyses = analyzer.analyze_routes(&records(), &mut diagnostics);

        // `up` is outside the api/* pattern
        assert_eq!(analyses.len(), 5);
        assert_eq!(analyses[0].auth.as_ref().unwrap().scheme, "sanctum");
        assert!(analyses[2].auth.is_none());
        assert!(analyses[3].controller.is_none());
        assert!(analyses[4].controller.is_none());

        let resources: Vec<&str> = analyzer.resources().keys().map(String::as_str).collect();
        assert_eq!(
            resources,
            vec![
                "App\\Http\\Resources\\OrderResource",
                "App\\Http\\Resources\\CustomerResource"
            ]
        );
        assert_eq!(analyzer.security_schemes().len(), 1);

        let report = diagnostics.finish();
        assert_eq!(report.warnings.len(), 2);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_parameters_merge_validation_and_reads() {
        let dir = TempDir::new().unwrap();
        let mut analyzer = analyzer(&dir);
        let mut diagnostics = DiagnosticCollector::new();
        let analyses = analyzer.analyze_routes(&records(), &mut diagnostics);

        let index = analyses[0].parameters(HttpMethod::Get);
        let names: Vec<(&str, ParameterLocation)> =
            index.iter().map(|p| (p.name.as_str(), p.location)).collect();
        assert_eq!(
            names,
            vec![("status", ParameterLocation::Query), ("sort", ParameterLocation::Query)]
        );
        assert_eq!(index[0].schema.enum_values.len(), 2);
        assert_eq!(index[1].schema.default, Some(serde_json::json!("created_at")));

        let store = analyses[1].parameters(HttpMethod::Post);
        assert_eq!(store.len(), 2);
        assert!(store[0].required);
        assert_eq!(store[0].location, ParameterLocation::Body);
        assert!(analyses[1].validates());
        assert!(!analyses[2].validates());
    }

    #[test]
    fn test_second_run_hits_cache() {
        let dir = TempDir::new().unwrap();
        let mut first = analyzer(&dir);
        first.analyze_routes(&records(), &mut DiagnosticCollector::new());
        assert_eq!(first.cache_stats().hits, 0);

        // Same files, untouched on disk
        let paths: Vec<_> = FILES.iter().map(|(name, _)| dir.path().join(name)).collect();
        let resolver = ClassResolver::new(ClassIndex::build(dir.path(), &paths)).unwrap();
        let mut second = with_resolver(&dir, resolver);
        let analyses = second.analyze_routes(&records(), &mut DiagnosticCollector::new());
        let stats = second.cache_stats();
        // three controller actions, one request, two resources
        assert_eq!(stats.hits, 6);
        assert_eq!(stats.misses, 0);
        assert_eq!(
            analyses[1].request.as_ref().unwrap().class,
            "App\\Http\\Requests\\StoreOrderRequest"
        );
    }

    #[test]
    fn test_enum_change_invalidates_request_entry() {
        const STATUS: &str = "<?php\nnamespace App\\Enums;\nenum Status: string {\n    case A = 'a';\n    case B = 'b';\n}\n";
        let files: &[(&str, &str)] = &[
            (
                "app/Http/Controllers/TicketController.php",
                r#"<?php
namespace App\Http\Controllers;
use App\Http\Requests\UpdateTicketRequest;
class TicketController extends Controller {
    public function update(UpdateTicketRequest $request) {
        return response()->noContent();
    }
}
"#,
            ),
            (
                "app/Http/Requests/UpdateTicketRequest.php",
                r#"<?php
namespace App\Http\Requests;
use App\Enums\Status;
use Illuminate\Foundation\Http\FormRequest;
use Illuminate\Validation\Rule;
class UpdateTicketRequest extends FormRequest {
    public function rules() {
        return ['status' => ['required', Rule::enum(Status::class)]];
    }
}
"#,
            ),
            ("app/Enums/Status.php", STATUS),
        ];
        let records: Vec<RouteRecord> = serde_json::from_str(
            r#"[{"method": "PUT", "uri": "api/tickets/{ticket}", "action": "App\\Http\\Controllers\\TicketController@update"}]"#,
        )
        .unwrap();
        let statuses = |analyzer: &mut RouteAnalyzer| {
            let analyses = analyzer.analyze_routes(&records, &mut DiagnosticCollector::new());
            let parameters = analyses[0].parameters(HttpMethod::Put);
            let status = parameters.iter().find(|p| p.name == "status").unwrap();
            status.schema.enum_values.len()
        };

        let dir = TempDir::new().unwrap();
        let mut first = with_resolver(&dir, resolver_for(&dir, files));
        assert_eq!(statuses(&mut first), 2);

        std::fs::write(
            dir.path().join("app/Enums/Status.php"),
            STATUS.replace("    case B = 'b';\n", "    case B = 'b';\n    case C = 'c';\n"),
        )
        .unwrap();
        let paths: Vec<_> = files.iter().map(|(name, _)| dir.path().join(name)).collect();
        let resolver = ClassResolver::new(ClassIndex::build(dir.path(), &paths)).unwrap();
        let mut second = with_resolver(&dir, resolver);
        assert_eq!(statuses(&mut second), 3);
        assert!(second.cache_stats().misses >= 1);
    }
}
