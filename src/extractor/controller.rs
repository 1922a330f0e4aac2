//! Controller method analysis.
//!
//! Finds what a controller action validates (FormRequest parameter or inline `validate()`),
//! what it returns (resource, collection, transformer), whether it paginates, and which
//! request inputs and headers it reads.

use crate::class_resolver::{ClassResolver, ResolvedClass};
use crate::error::Result;
use crate::parser::ast::{short_name, Arg, Expr, Literal, MethodDecl, Stmt};
use crate::request_analyzer::FORM_REQUEST;
use crate::resource_analyzer::{ResourceAnalyzer, RESOURCE_COLLECTION};
use crate::rules::{RuleMap, RuleSetExtractor};
use crate::type_inference::TypeInfo;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Laravel's default page size
pub const DEFAULT_PER_PAGE: i64 = 15;

/// Paginator flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationKind {
    /// `paginate()`: totals and page links
    LengthAware,
    /// `simplePaginate()`: next/previous only
    Simple,
    /// `cursorPaginate()`: opaque cursors
    Cursor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub kind: PaginationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub per_page: i64,
}

/// The resource class a controller action answers with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRef {
    pub class: String,
    /// A list of `class` items (`::collection()` or a ResourceCollection)
    pub collection: bool,
}

/// A request value read in the controller body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAccess {
    pub name: String,
    /// Read through `query()`, so never from the body
    pub query_only: bool,
    pub schema: TypeInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Everything learned from one controller method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerAnalysis {
    pub controller: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseRef>,
    #[serde(default, skip_serializing_if = "RuleMap::is_empty")]
    pub inline_rules: RuleMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputAccess>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<String>,
    #[serde(default)]
    pub bearer_token: bool,
    /// Explicit success status (`response()->json($x, 201)`, `noContent()`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_status: Option<u16>,
    /// `abort(404)`, `findOrFail()` and similar
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_statuses: Vec<u16>,
}

impl ControllerAnalysis {
    fn new(controller: &str, method: &str) -> Self {
        Self {
            controller: controller.to_string(),
            method: method.to_string(),
            form_request: None,
            response: None,
            inline_rules: RuleMap::new(),
            pagination: None,
            inputs: Vec::new(),
            headers: Vec::new(),
            bearer_token: false,
            success_status: None,
            error_statuses: Vec::new(),
        }
    }
}

/// Analyzer for controller actions
pub struct ControllerAnalyzer<'r> {
    resolver: &'r mut ClassResolver,
}

impl<'r> ControllerAnalyzer<'r> {
    pub fn new(resolver: &'r mut ClassResolver) -> Self {
        Self { resolver }
    }

    /// Analyze `controller::method`.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the controller or the method cannot be found.
    ///
    /// # Errors
    ///
    /// Returns a `ParseFailure` if the controller file does not parse.
    pub fn analyze(
        &mut self,
        controller: &str,
        method: &str,
    ) -> Result<Option<ControllerAnalysis>> {
        let Some(class) = self.resolver.find_class(controller)? else {
            debug!("Controller {} not found", controller);
            return Ok(None);
        };
        let Some((owner, decl)) = self.resolver.find_method(&class, method)? else {
            debug!("{} has no {}() method", controller, method);
            return Ok(None);
        };
        let analysis = self.analyze_method(&class.fqcn, &owner, &decl);
        info!(
            "Analyzed {}::{} (request: {}, response: {})",
            short_name(controller),
            method,
            analysis.form_request.as_deref().map(short_name).unwrap_or("-"),
            analysis
                .response
                .as_ref()
                .map(|r| short_name(&r.class))
                .unwrap_or("-")
        );
        Ok(Some(analysis))
    }

    fn analyze_method(
        &mut self,
        controller: &str,
        owner: &ResolvedClass,
        decl: &MethodDecl,
    ) -> ControllerAnalysis {
        let mut analysis = ControllerAnalysis::new(controller, &decl.name);

        let mut request_vars = Vec::new();
        for param in &decl.params {
            let Some(hint) = &param.type_hint else {
                continue;
            };
            for name in hint.class_names() {
                let fqcn = owner.resolve_name(name);
                if analysis.form_request.is_none()
                    && self.resolver.is_subclass_of(&fqcn, FORM_REQUEST)
                {
                    analysis.form_request = Some(fqcn.clone());
                }
                if short_name(&fqcn).ends_with("Request") {
                    request_vars.push(param.name.clone());
                }
            }
        }

        analysis.inline_rules =
            RuleSetExtractor::with_resolver(&mut *self.resolver).extract_inline(owner, decl);

        let mut exprs = Vec::new();
        for stmt in &decl.body {
            stmt.walk_exprs(&mut |e| exprs.push(e));
        }
        for expr in &exprs {
            self.inspect(owner, expr, &request_vars, &mut analysis);
        }

        analysis.response = self.response_from_body(owner, &decl.body);
        if analysis.response.is_none() {
            analysis.response = self.response_from_return_type(owner, decl);
        }
        if let (Some(response), Some(_)) =
            (analysis.response.as_mut(), analysis.pagination.as_ref())
        {
            response.collection = true;
        }
        analysis
    }

    fn inspect(
        &mut self,
        owner: &ResolvedClass,
        expr: &Expr,
        request_vars: &[String],
        analysis: &mut ControllerAnalysis,
    ) {
        match expr {
            Expr::MethodCall {
                object,
                method,
                args,
                ..
            } => {
                if let Some(kind) = pagination_kind(method) {
                    if analysis.pagination.is_none() {
                        analysis.pagination = Some(Pagination {
                            kind,
                            model: chain_model(owner, object),
                            per_page: per_page(args),
                        });
                    }
                    return;
                }
                if is_request(object, request_vars) {
                    self.request_access(owner, method, args, analysis);
                    return;
                }
                match method.as_str() {
                    "setStatusCode" => set_status(analysis, int_arg(args, 0)),
                    "noContent" => set_status(analysis, Some(204)),
                    "json" if is_response_helper(object) => set_status(analysis, int_arg(args, 1)),
                    "findOrFail" | "firstOrFail" | "sole" => push_error(analysis, 404),
                    _ => {}
                }
            }
            Expr::StaticCall {
                class,
                method,
                args,
            } => {
                if let Some(kind) = pagination_kind(method) {
                    if analysis.pagination.is_none() {
                        analysis.pagination = Some(Pagination {
                            kind,
                            model: Some(owner.resolve_name(class)),
                            per_page: per_page(args),
                        });
                    }
                } else if matches!(method.as_str(), "findOrFail" | "firstOrFail") {
                    push_error(analysis, 404);
                }
            }
            Expr::Call { function, args } => match function.trim_start_matches('\\') {
                "request" if !args.is_empty() => {
                    self.request_access(owner, "input", args, analysis)
                }
                "response" => set_status(analysis, int_arg(args, 1)),
                "abort" => {
                    if let Some(status) = int_arg(args, 0) {
                        push_error(analysis, status);
                    }
                }
                "abort_if" | "abort_unless" => {
                    if let Some(status) = int_arg(args, 1) {
                        push_error(analysis, status);
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    /// `$request->integer('page', 1)`, `$request->header('X-Tenant')`, `$request->bearerToken()`
    fn request_access(
        &mut self,
        owner: &ResolvedClass,
        method: &str,
        args: &[Arg],
        analysis: &mut ControllerAnalysis,
    ) {
        if method == "bearerToken" {
            analysis.bearer_token = true;
            return;
        }
        let Some(name) = args.first().and_then(|a| a.value.as_str_literal()) else {
            return;
        };
        if matches!(method, "header" | "hasHeader") {
            if !analysis.headers.iter().any(|h| h.eq_ignore_ascii_case(name)) {
                analysis.headers.push(name.to_string());
            }
            return;
        }

        let default = args.get(1).and_then(|a| match &a.value {
            Expr::Literal(lit) if *lit != Literal::Null => Some(lit.to_json()),
            _ => None,
        });
        let schema = match method {
            "integer" => TypeInfo::new("integer"),
            "float" => TypeInfo::new("number"),
            "boolean" => TypeInfo::new("boolean"),
            "date" => TypeInfo::new("string").with_format("date-time"),
            "array" | "collect" => TypeInfo::new("array"),
            "file" | "hasFile" => TypeInfo::new("file"),
            "enum" => {
                let mut schema = TypeInfo::new("string");
                if let Some(Expr::ClassConst { class, .. }) = args.get(1).map(|a| &a.value) {
                    let fqcn = owner.resolve_name(class);
                    if let Some(values) = self.resolver.enum_values(&fqcn) {
                        if values.iter().all(Value::is_i64) && !values.is_empty() {
                            schema.schema_type = "integer".to_string();
                        }
                        schema.enum_values = values;
                    }
                    schema.enum_class = Some(short_name(class).to_string());
                }
                schema
            }
            "input" | "query" | "get" | "post" | "json" | "string" | "str" | "has" | "filled"
            | "missing" | "exists" | "whenHas" | "whenFilled" => match &default {
                Some(Value::Number(n)) if n.is_i64() => TypeInfo::new("integer"),
                Some(Value::Number(_)) => TypeInfo::new("number"),
                Some(Value::Bool(_)) => TypeInfo::new("boolean"),
                _ => TypeInfo::new("string"),
            },
            _ => return,
        };

        if let Some(existing) = analysis.inputs.iter_mut().find(|i| i.name == name) {
            if existing.schema.schema_type == "string" && schema.schema_type != "string" {
                existing.schema = schema;
            }
            existing.query_only &= method == "query";
            existing.default = existing.default.take().or(default);
            return;
        }
        analysis.inputs.push(InputAccess {
            name: name.to_string(),
            query_only: method == "query",
            schema,
            default,
        });
    }

    /// The resource built by a `return` statement, following `->response()->...` chains
    fn response_from_body(&mut self, owner: &ResolvedClass, body: &[Stmt]) -> Option<ResponseRef> {
        let mut returns = Vec::new();
        collect_returns(body, &mut returns);
        returns
            .into_iter()
            .find_map(|expr| self.response_from_expr(owner, expr))
    }

    fn response_from_expr(&mut self, owner: &ResolvedClass, expr: &Expr) -> Option<ResponseRef> {
        let mut current = expr;
        loop {
            match current {
                Expr::New { class, .. } => {
                    let fqcn = owner.resolve_name(class);
                    if !self.is_resource(&fqcn) {
                        return None;
                    }
                    let collection = self.resolver.is_subclass_of(&fqcn, RESOURCE_COLLECTION);
                    return Some(ResponseRef { class: fqcn, collection });
                }
                Expr::StaticCall { class, method, .. } => {
                    let fqcn = owner.resolve_name(class);
                    if !self.is_resource(&fqcn) {
                        return None;
                    }
                    return match method.as_str() {
                        "collection" => Some(ResponseRef { class: fqcn, collection: true }),
                        "make" => {
                            let collection =
                                self.resolver.is_subclass_of(&fqcn, RESOURCE_COLLECTION);
                            Some(ResponseRef { class: fqcn, collection })
                        }
                        _ => None,
                    };
                }
                // fractal($books, new BookTransformer)
                Expr::Call { function, args } if function.trim_start_matches('\\') == "fractal" => {
                    let class = transformer_arg(owner, args)?;
                    let collection = matches!(
                        args.first().map(|a| &a.value),
                        Some(Expr::Variable(name)) if name.ends_with('s')
                    );
                    return Some(ResponseRef { class, collection });
                }
                // fractal()->collection($x, new T), $this->response->item($x, new T)
                Expr::MethodCall { method, args, object, .. } => {
                    if matches!(method.as_str(), "item" | "collection") {
                        if let Some(class) = transformer_arg(owner, args) {
                            return Some(ResponseRef {
                                class,
                                collection: method == "collection",
                            });
                        }
                    }
                    current = object;
                }
                _ => return None,
            }
        }
    }

    fn response_from_return_type(
        &mut self,
        owner: &ResolvedClass,
        decl: &MethodDecl,
    ) -> Option<ResponseRef> {
        let hint = decl.return_type.as_ref()?;
        for name in hint.class_names() {
            let fqcn = owner.resolve_name(name);
            if self.is_resource(&fqcn) {
                let collection = self.resolver.is_subclass_of(&fqcn, RESOURCE_COLLECTION);
                return Some(ResponseRef { class: fqcn, collection });
            }
        }
        None
    }

    fn is_resource(&mut self, fqcn: &str) -> bool {
        ResourceAnalyzer::new(&mut *self.resolver).is_resource(fqcn)
    }
}

fn collect_returns<'a>(body: &'a [Stmt], out: &mut Vec<&'a Expr>) {
    for stmt in body {
        match stmt {
            Stmt::Return(Some(expr)) => out.push(expr),
            Stmt::If {
                then_branch,
                else_ifs,
                else_branch,
                ..
            } => {
                collect_returns(then_branch, out);
                for else_if in else_ifs {
                    collect_returns(&else_if.body, out);
                }
                if let Some(else_branch) = else_branch {
                    collect_returns(else_branch, out);
                }
            }
            Stmt::Block(inner) | Stmt::Loop(inner) => collect_returns(inner, out),
            Stmt::Try { body, .. } => collect_returns(body, out),
            Stmt::Switch { cases, .. } => {
                for case in cases {
                    collect_returns(&case.body, out);
                }
            }
            _ => {}
        }
    }
}

fn transformer_arg(owner: &ResolvedClass, args: &[Arg]) -> Option<String> {
    match args.get(1).map(|a| &a.value) {
        Some(Expr::New { class, .. }) => Some(owner.resolve_name(class)),
        _ => None,
    }
}

fn pagination_kind(method: &str) -> Option<PaginationKind> {
    match method {
        "paginate" | "fastPaginate" => Some(PaginationKind::LengthAware),
        "simplePaginate" => Some(PaginationKind::Simple),
        "cursorPaginate" => Some(PaginationKind::Cursor),
        _ => None,
    }
}

/// `paginate(20)` or `paginate($request->input('per_page', 25))`
fn per_page(args: &[Arg]) -> i64 {
    let arg = args
        .iter()
        .find(|a| a.name.as_deref() == Some("perPage"))
        .or_else(|| args.iter().find(|a| a.name.is_none()));
    match arg.map(|a| &a.value) {
        Some(Expr::Literal(Literal::Int(n))) => *n,
        Some(Expr::MethodCall { args, .. }) | Some(Expr::Call { args, .. }) => {
            int_arg(args, 1).map(i64::from).unwrap_or(DEFAULT_PER_PAGE)
        }
        _ => DEFAULT_PER_PAGE,
    }
}

/// Model at the root of a query chain (`User::where(...)->latest()`)
fn chain_model(owner: &ResolvedClass, object: &Expr) -> Option<String> {
    let mut current = object;
    loop {
        match current {
            Expr::MethodCall { object, .. } => current = object,
            Expr::StaticCall { class, .. } => return Some(owner.resolve_name(class)),
            _ => return None,
        }
    }
}

fn is_request(expr: &Expr, request_vars: &[String]) -> bool {
    match expr {
        Expr::Variable(name) => request_vars.iter().any(|v| v == name),
        Expr::Call { function, args } => {
            function.trim_start_matches('\\') == "request" && args.is_empty()
        }
        Expr::PropertyFetch { object, property, .. } => object.is_this() && property == "request",
        _ => false,
    }
}

fn is_response_helper(expr: &Expr) -> bool {
    matches!(expr, Expr::Call { function, .. } if function.trim_start_matches('\\') == "response")
}

fn int_arg(args: &[Arg], index: usize) -> Option<u16> {
    match args.get(index).map(|a| &a.value) {
        Some(Expr::Literal(Literal::Int(n))) => u16::try_from(*n).ok(),
        _ => None,
    }
}

fn set_status(analysis: &mut ControllerAnalysis, status: Option<u16>) {
    if let Some(status) = status.filter(|s| (200..300).contains(s)) {
        analysis.success_status.get_or_insert(status);
    }
}

fn push_error(analysis: &mut ControllerAnalysis, status: u16) {
    if !analysis.error_statuses.contains(&status) {
        analysis.error_statuses.push(status);
    }
}
