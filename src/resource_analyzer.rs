//! Response structure analysis for API Resources and Fractal transformers.
//!
//! The analyzer reads the array returned by a resource's `toArray()` (or a transformer's
//! `transform()`) and infers one [`ResourceFieldInfo`] per key. Conditional wrappers
//! (`when`, `whenLoaded`, `whenCounted`, ...), nested resources and enum `->value` access are
//! recognised; anything else falls back to a name-based heuristic or `mixed`.

use crate::class_resolver::{ClassResolver, ResolvedClass};
use crate::error::Result;
use crate::parser::ast::{short_name, ArrayItem, Expr, Literal, Stmt};
use crate::parser::render;
use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const JSON_RESOURCE: &str = "Illuminate\\Http\\Resources\\Json\\JsonResource";
pub const RESOURCE_COLLECTION: &str = "Illuminate\\Http\\Resources\\Json\\ResourceCollection";
pub const FRACTAL_TRANSFORMER: &str = "League\\Fractal\\TransformerAbstract";

/// Where a field's value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// A model attribute (`$this->name`)
    Property,
    /// A backed enum case (`$this->status->value`)
    Enum,
    /// A loaded relation without its own resource
    Relation,
    /// Another resource class
    Resource,
    Literal,
    Computed,
}

/// Wrapper deciding whether a field is present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionKind {
    When,
    WhenLoaded,
    WhenCounted,
    WhenAggregated,
    WhenNotNull,
    WhenHas,
    MergeWhen,
    /// Fractal include, present only when requested
    Include,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalInfo {
    pub kind: ConditionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    /// Rendered condition for `when`/`mergeWhen`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default)]
    pub has_transform: bool,
}

impl ConditionalInfo {
    fn new(kind: ConditionKind) -> Self {
        Self {
            kind,
            relation: None,
            expression: None,
            has_transform: false,
        }
    }
}

/// One inferred output field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFieldInfo {
    /// OpenAPI type, or `mixed` when unknown
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub nullable: bool,
    pub source: FieldSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, ResourceFieldInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ResourceFieldInfo>>,
    /// Fully qualified name of the resource producing this value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional: Option<ConditionalInfo>,
}

impl ResourceFieldInfo {
    pub fn new(field_type: impl Into<String>, source: FieldSource) -> Self {
        Self {
            field_type: field_type.into(),
            nullable: false,
            source,
            format: None,
            example: None,
            properties: IndexMap::new(),
            items: None,
            resource: None,
            conditional: None,
        }
    }

    pub fn mixed() -> Self {
        Self::new("mixed", FieldSource::Computed)
    }

    fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    fn with_example(mut self, example: Value) -> Self {
        self.example = Some(example);
        self
    }

    fn array_of(item: ResourceFieldInfo, source: FieldSource) -> Self {
        let mut field = Self::new("array", source);
        field.items = Some(Box::new(item));
        field
    }

    fn resource(fqcn: String) -> Self {
        let mut field = Self::new("object", FieldSource::Resource);
        field.resource = Some(fqcn);
        field
    }

    pub fn is_conditional(&self) -> bool {
        self.conditional.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    JsonResource,
    ResourceCollection,
    Transformer,
}

/// Output shape of one resource class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStructure {
    pub class: String,
    pub kind: ResourceKind,
    pub properties: IndexMap<String, ResourceFieldInfo>,
    /// Top-level keys added by `with()`
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub additional: IndexMap<String, ResourceFieldInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_includes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_includes: Vec<String>,
    /// Resource classes referenced by this one, for cache invalidation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested_resources: Vec<String>,
    /// Resource wrapped by a ResourceCollection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collects: Option<String>,
    /// Envelope key (`data` unless `$wrap` says otherwise)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrap: Option<String>,
    /// False when the class has no transformation method
    pub valid: bool,
}

impl ResourceStructure {
    fn empty(class: &str, kind: ResourceKind) -> Self {
        Self {
            class: class.to_string(),
            kind,
            properties: IndexMap::new(),
            additional: IndexMap::new(),
            available_includes: Vec::new(),
            default_includes: Vec::new(),
            nested_resources: Vec::new(),
            collects: None,
            wrap: Some("data".to_string()),
            valid: false,
        }
    }
}

/// The class being analyzed and the name its transform input goes by
struct Context<'a> {
    class: &'a ResolvedClass,
    /// Transformer parameter (`$user` in `transform(User $user)`)
    subject: Option<String>,
    /// Model attributes cast to a backed enum, with the type of the enum's values
    enum_casts: HashMap<String, &'static str>,
}

impl Context<'_> {
    /// `$this`, `$this->resource` or the transformer's parameter
    fn is_subject(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Variable(name) => {
                name == "this" || self.subject.as_deref() == Some(name.as_str())
            }
            Expr::PropertyFetch {
                object, property, ..
            } => object.is_this() && property == "resource",
            _ => false,
        }
    }
}

/// Analyzer for resource and transformer classes
pub struct ResourceAnalyzer<'r> {
    resolver: &'r mut ClassResolver,
}

impl<'r> ResourceAnalyzer<'r> {
    pub fn new(resolver: &'r mut ClassResolver) -> Self {
        Self { resolver }
    }

    /// Whether a class can shape a response
    pub fn is_resource(&mut self, fqcn: &str) -> bool {
        self.resolver.is_subclass_of(fqcn, JSON_RESOURCE)
            || self.resolver.is_subclass_of(fqcn, RESOURCE_COLLECTION)
            || self.resolver.is_subclass_of(fqcn, FRACTAL_TRANSFORMER)
    }

    /// Analyze a resource by name.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the class cannot be found.
    ///
    /// # Errors
    ///
    /// Returns a `ParseFailure` if the class file does not parse.
    pub fn analyze(&mut self, fqcn: &str) -> Result<Option<ResourceStructure>> {
        let Some(class) = self.resolver.find_class(fqcn)? else {
            debug!("Resource {} not found", fqcn);
            return Ok(None);
        };
        self.analyze_class(&class).map(Some)
    }

    pub fn analyze_class(&mut self, class: &ResolvedClass) -> Result<ResourceStructure> {
        let kind = self.kind_of(class);
        let mut structure = ResourceStructure::empty(&class.fqcn, kind);
        structure.wrap = self.wrap_key(class, kind);
        if kind == ResourceKind::ResourceCollection {
            structure.collects = self.collected_resource(class);
        }

        let method = match kind {
            ResourceKind::Transformer => "transform",
            _ => "toArray",
        };
        if let Some((owner, decl)) = self.resolver.find_method(class, method)? {
            let (subject, model_hint) = match (kind, decl.params.first()) {
                (ResourceKind::Transformer, Some(param)) => (
                    Some(param.name.clone()),
                    param.type_hint.as_ref().and_then(|hint| {
                        hint.class_names().next().map(|n| owner.resolve_name(n))
                    }),
                ),
                _ => (None, None),
            };
            let enum_casts = self.enum_casts(class, model_hint);
            let ctx = Context {
                class: &owner,
                subject,
                enum_casts,
            };
            structure.properties = self.returned_fields(&ctx, &decl.body)?;
            structure.valid = true;
        } else {
            debug!("{} has no {}() method", class.fqcn, method);
        }

        if let Some((owner, decl)) = self.resolver.find_method(class, "with")? {
            let ctx = Context {
                class: &owner,
                subject: None,
                enum_casts: HashMap::new(),
            };
            structure.additional = self.returned_fields(&ctx, &decl.body)?;
        }

        if kind == ResourceKind::Transformer {
            structure.available_includes = string_list_property(class, "availableIncludes");
            structure.default_includes = string_list_property(class, "defaultIncludes");
            self.add_includes(class, &mut structure)?;
        }

        let mut nested = Vec::new();
        for field in structure.properties.values() {
            collect_resources(field, &mut nested);
        }
        if let Some(collects) = &structure.collects {
            if !nested.contains(collects) {
                nested.push(collects.clone());
            }
        }
        nested.retain(|n| !n.eq_ignore_ascii_case(&class.fqcn));
        structure.nested_resources = nested;

        info!(
            "Analyzed resource {}: {} field(s), {} nested resource(s)",
            class.fqcn,
            structure.properties.len(),
            structure.nested_resources.len()
        );
        Ok(structure)
    }

    /// Enum casts of the model behind a resource: the transformer's parameter type, else
    /// `App\Models\User` (or `App\User`) for `UserResource`/`UserTransformer`
    fn enum_casts(
        &mut self,
        class: &ResolvedClass,
        model_hint: Option<String>,
    ) -> HashMap<String, &'static str> {
        let mut candidates: Vec<String> = model_hint.into_iter().collect();
        let short = class.short_name();
        let base = short
            .strip_suffix("Resource")
            .or_else(|| short.strip_suffix("Transformer"))
            .unwrap_or_default();
        if !base.is_empty() {
            candidates.push(format!("App\\Models\\{}", base));
            candidates.push(format!("App\\{}", base));
        }

        let Some(model) = candidates
            .iter()
            .find_map(|fqcn| self.resolver.find_class(fqcn).ok().flatten())
        else {
            return HashMap::new();
        };

        let mut casts = HashMap::new();
        for (attribute, cast) in cast_entries(&model) {
            if let Ok(Some(resolved)) = self.resolver.find_enum(&cast) {
                debug!("{}::${} is cast to enum {}", model.fqcn, attribute, resolved.fqcn);
                casts.insert(attribute, resolved.value_type());
            }
        }
        casts
    }

    fn kind_of(&mut self, class: &ResolvedClass) -> ResourceKind {
        if self.resolver.is_subclass_of(&class.fqcn, FRACTAL_TRANSFORMER) {
            ResourceKind::Transformer
        } else if self.resolver.is_subclass_of(&class.fqcn, RESOURCE_COLLECTION) {
            ResourceKind::ResourceCollection
        } else {
            ResourceKind::JsonResource
        }
    }

    /// `public static $wrap = 'user';` overrides the envelope, `null` removes it
    fn wrap_key(&self, class: &ResolvedClass, kind: ResourceKind) -> Option<String> {
        if kind == ResourceKind::Transformer {
            return Some("data".to_string());
        }
        match class.decl().property("wrap").and_then(|p| p.default.as_ref()) {
            Some(Expr::Literal(Literal::String(key))) => Some(key.clone()),
            Some(Expr::Literal(Literal::Null)) => None,
            _ => Some("data".to_string()),
        }
    }

    /// `$collects`, else the Laravel naming convention (`UserCollection` → `UserResource`/`User`)
    fn collected_resource(&mut self, class: &ResolvedClass) -> Option<String> {
        if let Some(Expr::ClassConst { class: name, .. }) =
            class.decl().property("collects").and_then(|p| p.default.as_ref())
        {
            return Some(class.resolve_name(name));
        }
        let base = class.short_name().strip_suffix("Collection")?;
        let namespace = class.fqcn.rsplit_once('\\').map(|(ns, _)| ns);
        for candidate in [format!("{}Resource", base), base.to_string()] {
            let fqcn = match namespace {
                Some(ns) => format!("{}\\{}", ns, candidate),
                None => candidate,
            };
            if matches!(self.resolver.find_class(&fqcn), Ok(Some(_))) {
                return Some(fqcn);
            }
        }
        None
    }

    /// Fields of every array returned by a method body, first return winning per key
    fn returned_fields(
        &mut self,
        ctx: &Context,
        body: &[Stmt],
    ) -> Result<IndexMap<String, ResourceFieldInfo>> {
        let mut vars: HashMap<String, IndexMap<String, ResourceFieldInfo>> = HashMap::new();
        let mut fields = IndexMap::new();
        self.walk(ctx, body, &mut vars, &mut fields)?;
        Ok(fields)
    }

    fn walk(
        &mut self,
        ctx: &Context,
        body: &[Stmt],
        vars: &mut HashMap<String, IndexMap<String, ResourceFieldInfo>>,
        fields: &mut IndexMap<String, ResourceFieldInfo>,
    ) -> Result<()> {
        for stmt in body {
            match stmt {
                Stmt::Expr(Expr::Assign {
                    target,
                    op: None,
                    value,
                }) => match target.as_ref() {
                    Expr::Variable(name) => {
                        if let Some(found) = self.fields_of(ctx, value, vars)? {
                            vars.insert(name.clone(), found);
                        }
                    }
                    Expr::Index {
                        target: inner,
                        index: Some(index),
                    } => {
                        if let (Expr::Variable(name), Some(key)) =
                            (inner.as_ref(), index.as_str_literal())
                        {
                            let field = self.field(ctx, value);
                            vars.entry(name.clone())
                                .or_default()
                                .insert(key.to_string(), field);
                        }
                    }
                    _ => {}
                },
                Stmt::Return(Some(expr)) => {
                    if let Some(found) = self.fields_of(ctx, expr, vars)? {
                        for (key, field) in found {
                            fields.entry(key).or_insert(field);
                        }
                    }
                }
                Stmt::If {
                    then_branch,
                    else_ifs,
                    else_branch,
                    ..
                } => {
                    self.walk(ctx, then_branch, vars, fields)?;
                    for else_if in else_ifs {
                        self.walk(ctx, &else_if.body, vars, fields)?;
                    }
                    if let Some(else_branch) = else_branch {
                        self.walk(ctx, else_branch, vars, fields)?;
                    }
                }
                Stmt::Block(inner) | Stmt::Loop(inner) => self.walk(ctx, inner, vars, fields)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Keyed fields of an array-valued expression, `None` when it is not one
    fn fields_of(
        &mut self,
        ctx: &Context,
        expr: &Expr,
        vars: &HashMap<String, IndexMap<String, ResourceFieldInfo>>,
    ) -> Result<Option<IndexMap<String, ResourceFieldInfo>>> {
        match expr {
            Expr::Array(items) => Ok(Some(self.array_fields(ctx, items, vars)?)),
            Expr::Variable(name) => Ok(vars.get(name).cloned()),
            Expr::Call { function, args } if function.eq_ignore_ascii_case("array_merge") => {
                let mut merged = IndexMap::new();
                for arg in args {
                    if let Some(found) = self.fields_of(ctx, &arg.value, vars)? {
                        merged.extend(found);
                    }
                }
                Ok(Some(merged))
            }
            Expr::Binary { op, left, right } if op == "+" => {
                let mut merged = self.fields_of(ctx, left, vars)?.unwrap_or_default();
                if let Some(found) = self.fields_of(ctx, right, vars)? {
                    for (key, field) in found {
                        merged.entry(key).or_insert(field);
                    }
                }
                Ok(Some(merged))
            }
            Expr::StaticCall { class, method, .. } if class.eq_ignore_ascii_case("parent") => {
                let Some(parent) = self.resolver.parent_of(ctx.class)? else {
                    return Ok(None);
                };
                match self.resolver.find_method(&parent, method)? {
                    Some((owner, decl)) => {
                        let parent_ctx = Context {
                            class: &owner,
                            subject: ctx.subject.clone(),
                            enum_casts: ctx.enum_casts.clone(),
                        };
                        self.returned_fields(&parent_ctx, &decl.body).map(Some)
                    }
                    None => Ok(None),
                }
            }
            _ => {
                debug!("Unresolved resource payload: {}", render(expr));
                Ok(None)
            }
        }
    }

    fn array_fields(
        &mut self,
        ctx: &Context,
        items: &[ArrayItem],
        vars: &HashMap<String, IndexMap<String, ResourceFieldInfo>>,
    ) -> Result<IndexMap<String, ResourceFieldInfo>> {
        let mut fields = IndexMap::new();
        for item in items {
            match &item.key {
                Some(key) => {
                    let Some(key) = key_name(key) else {
                        continue;
                    };
                    let field = self.field(ctx, &item.value);
                    fields.insert(key, field);
                }
                None if item.spread => {
                    if let Some(found) = self.fields_of(ctx, &item.value, vars)? {
                        fields.extend(found);
                    }
                }
                None => self.merged_fields(ctx, &item.value, vars, &mut fields)?,
            }
        }
        Ok(fields)
    }

    /// `$this->merge([...])` and `$this->mergeWhen($cond, [...])` list items
    fn merged_fields(
        &mut self,
        ctx: &Context,
        expr: &Expr,
        vars: &HashMap<String, IndexMap<String, ResourceFieldInfo>>,
        fields: &mut IndexMap<String, ResourceFieldInfo>,
    ) -> Result<()> {
        let Expr::MethodCall {
            object,
            method,
            args,
            ..
        } = expr
        else {
            return Ok(());
        };
        if !object.is_this() {
            return Ok(());
        }
        let (payload, condition) = match (method.as_str(), args.as_slice()) {
            ("merge", [payload, ..]) => (payload, None),
            ("mergeWhen", [condition, payload, ..]) => (payload, Some(condition)),
            _ => return Ok(()),
        };
        let payload = callable_result(&payload.value).unwrap_or(&payload.value);
        if let Some(found) = self.fields_of(ctx, payload, vars)? {
            for (key, mut field) in found {
                if let Some(condition) = condition {
                    let mut info = ConditionalInfo::new(ConditionKind::MergeWhen);
                    info.expression = Some(render(&condition.value));
                    field.conditional = Some(info);
                }
                fields.insert(key, field);
            }
        }
        Ok(())
    }

    /// Type of a single field value
    fn field(&mut self, ctx: &Context, expr: &Expr) -> ResourceFieldInfo {
        match expr {
            Expr::Literal(lit) => literal_field(lit),
            Expr::Interpolated(_) => ResourceFieldInfo::new("string", FieldSource::Computed),
            Expr::Array(items) => {
                if items.iter().any(|i| i.key.is_some()) {
                    let vars = HashMap::new();
                    let mut field = ResourceFieldInfo::new("object", FieldSource::Computed);
                    field.properties = self.array_fields(ctx, items, &vars).unwrap_or_default();
                    field
                } else {
                    let item = match items.first() {
                        Some(first) => self.field(ctx, &first.value),
                        None => ResourceFieldInfo::mixed(),
                    };
                    ResourceFieldInfo::array_of(item, FieldSource::Computed)
                }
            }
            Expr::Cast { to, expr: inner } => {
                let source = self.field(ctx, inner).source;
                let field_type = match to.to_ascii_lowercase().as_str() {
                    "int" | "integer" => "integer",
                    "float" | "double" => "number",
                    "bool" | "boolean" => "boolean",
                    "string" => "string",
                    "array" => "array",
                    "object" => "object",
                    _ => "mixed",
                };
                ResourceFieldInfo::new(field_type, source)
            }
            Expr::Binary { op, left, right } => match op.as_str() {
                "??" | "?:" => {
                    let mut field = self.field(ctx, left);
                    let fallback = self.field(ctx, right);
                    field.nullable = fallback.nullable;
                    field
                }
                "==" | "===" | "!=" | "!==" | "<>" | "<" | ">" | "<=" | ">=" | "&&" | "||"
                | "and" | "or" | "xor" | "instanceof" => {
                    ResourceFieldInfo::new("boolean", FieldSource::Computed)
                }
                "." => ResourceFieldInfo::new("string", FieldSource::Computed),
                "+" | "-" | "*" | "/" | "%" | "**" => {
                    ResourceFieldInfo::new("number", FieldSource::Computed)
                }
                _ => ResourceFieldInfo::mixed(),
            },
            Expr::Unary { op, operand } => match op.as_str() {
                "!" => ResourceFieldInfo::new("boolean", FieldSource::Computed),
                "-" | "+" => ResourceFieldInfo::new("number", FieldSource::Computed),
                _ => self.field(ctx, operand),
            },
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => {
                let first = match then {
                    Some(then) => self.field(ctx, then),
                    None => self.field(ctx, condition),
                };
                let second = self.field(ctx, otherwise);
                pick_alternative(first, second)
            }
            Expr::PropertyFetch {
                object,
                property,
                nullsafe,
            } => {
                let mut field = self.property_access(ctx, object, property);
                field.nullable |= *nullsafe;
                field
            }
            Expr::MethodCall {
                object,
                method,
                args,
                nullsafe,
            } => {
                if object.is_this() {
                    if let Some(field) = self.conditional_wrapper(ctx, method, args) {
                        return field;
                    }
                }
                let mut field = method_result(method);
                field.nullable |= *nullsafe;
                field
            }
            Expr::New { class, args } => {
                self.resource_field(ctx, class, args.first().map(|a| &a.value), false)
            }
            Expr::StaticCall {
                class,
                method,
                args,
            } => match method.to_ascii_lowercase().as_str() {
                "collection" => {
                    self.resource_field(ctx, class, args.first().map(|a| &a.value), true)
                }
                "make" => self.resource_field(ctx, class, args.first().map(|a| &a.value), false),
                _ => ResourceFieldInfo::mixed(),
            },
            Expr::Call { function, .. } => function_result(function),
            Expr::ArrowFn { body, .. } => self.field(ctx, body),
            Expr::Closure { .. } => match callable_result(expr) {
                Some(result) => self.field(ctx, result),
                None => ResourceFieldInfo::mixed(),
            },
            Expr::Match { arms, .. } => match arms.first() {
                Some(arm) => self.field(ctx, &arm.body),
                None => ResourceFieldInfo::mixed(),
            },
            _ => ResourceFieldInfo::mixed(),
        }
    }

    fn property_access(
        &mut self,
        ctx: &Context,
        object: &Expr,
        property: &str,
    ) -> ResourceFieldInfo {
        if ctx.is_subject(object) {
            return property_field(property);
        }
        if let Expr::PropertyFetch {
            object: owner,
            property: enum_property,
            nullsafe,
        } = object
        {
            if property == "value" && ctx.is_subject(owner) {
                let field_type = ctx
                    .enum_casts
                    .get(enum_property.as_str())
                    .copied()
                    .unwrap_or("string");
                let mut field = ResourceFieldInfo::new(field_type, FieldSource::Enum);
                field.nullable = *nullsafe;
                debug!("Enum field {} read through ->value", enum_property);
                return field;
            }
            if property == "name" && ctx.is_subject(owner) && enum_like(enum_property) {
                return ResourceFieldInfo::new("string", FieldSource::Enum);
            }
        }
        // `$this->author->name`: the last segment still says something
        let mut field = property_field(property);
        if field.field_type == "mixed" {
            field.source = FieldSource::Computed;
        }
        field
    }

    /// `$this->when(...)` and friends; `None` for any other `$this->` method
    fn conditional_wrapper(
        &mut self,
        ctx: &Context,
        method: &str,
        args: &[crate::parser::ast::Arg],
    ) -> Option<ResourceFieldInfo> {
        let arg = |i: usize| args.get(i).map(|a| &a.value);
        let relation = || arg(0).and_then(|e| e.as_str_literal()).map(str::to_string);

        let (mut field, mut info) = match method {
            "when" => {
                let mut info = ConditionalInfo::new(ConditionKind::When);
                info.expression = arg(0).map(render);
                let field = match arg(1) {
                    Some(value) => self.field(ctx, value),
                    None => ResourceFieldInfo::mixed(),
                };
                (field, info)
            }
            "whenLoaded" => {
                let mut info = ConditionalInfo::new(ConditionKind::WhenLoaded);
                info.relation = relation();
                let field = match arg(1) {
                    Some(transform) => {
                        info.has_transform = true;
                        self.field(ctx, transform)
                    }
                    None => relation_field(info.relation.as_deref().unwrap_or_default()),
                };
                (field, info)
            }
            "whenCounted" => {
                let mut info = ConditionalInfo::new(ConditionKind::WhenCounted);
                info.relation = relation();
                info.has_transform = arg(1).is_some();
                (ResourceFieldInfo::new("integer", FieldSource::Computed), info)
            }
            "whenAggregated" => {
                let mut info = ConditionalInfo::new(ConditionKind::WhenAggregated);
                info.relation = relation();
                info.has_transform = arg(3).is_some();
                (ResourceFieldInfo::new("number", FieldSource::Computed), info)
            }
            "whenNotNull" => {
                let info = ConditionalInfo::new(ConditionKind::WhenNotNull);
                let field = match arg(0) {
                    Some(value) => self.field(ctx, value),
                    None => ResourceFieldInfo::mixed(),
                };
                (field, info)
            }
            "whenHas" => {
                let mut info = ConditionalInfo::new(ConditionKind::WhenHas);
                info.relation = relation();
                let field = match arg(1) {
                    Some(value) => {
                        info.has_transform = true;
                        self.field(ctx, value)
                    }
                    None => property_field(info.relation.as_deref().unwrap_or_default()),
                };
                (field, info)
            }
            _ => return None,
        };

        // A nested resource built from a relation keeps the inner gate
        if let Some(inner) = field.conditional.take() {
            if info.relation.is_none() {
                info.relation = inner.relation;
            }
        }
        field.nullable = field.nullable && info.kind != ConditionKind::WhenNotNull;
        field.conditional = Some(info);
        Some(field)
    }

    /// `new UserResource(...)`, `UserResource::make(...)`, `UserResource::collection(...)`
    fn resource_field(
        &mut self,
        ctx: &Context,
        class: &str,
        input: Option<&Expr>,
        collection: bool,
    ) -> ResourceFieldInfo {
        let fqcn = ctx.class.resolve_name(class);
        let is_collection_class =
            !collection && self.resolver.is_subclass_of(&fqcn, RESOURCE_COLLECTION);
        let mut field = if collection {
            ResourceFieldInfo::array_of(ResourceFieldInfo::resource(fqcn), FieldSource::Resource)
        } else if is_collection_class {
            let mut field = ResourceFieldInfo::new("array", FieldSource::Resource);
            field.resource = Some(fqcn);
            field
        } else if self.is_resource(&fqcn) || short_name(&fqcn).ends_with("Resource") {
            ResourceFieldInfo::resource(fqcn)
        } else {
            return ResourceFieldInfo::new("object", FieldSource::Computed);
        };

        if let Some(Expr::MethodCall {
            object,
            method,
            args,
            ..
        }) = input
        {
            if object.is_this() && method == "whenLoaded" {
                let mut info = ConditionalInfo::new(ConditionKind::WhenLoaded);
                info.relation = args
                    .first()
                    .and_then(|a| a.value.as_str_literal())
                    .map(str::to_string);
                field.conditional = Some(info);
            }
        }
        if let Some(Expr::PropertyFetch { nullsafe: true, .. }) = input {
            field.nullable = true;
        }
        field
    }

    /// Fractal `include{Name}()` methods become conditional fields
    fn add_includes(
        &mut self,
        class: &ResolvedClass,
        structure: &mut ResourceStructure,
    ) -> Result<()> {
        let mut names = structure.available_includes.clone();
        for name in &structure.default_includes {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }

        for name in names {
            let method = format!("include{}", studly(&name));
            let Some((owner, decl)) = self.resolver.find_method(class, &method)? else {
                debug!("{} lists include '{}' without {}()", class.fqcn, name, method);
                continue;
            };
            let returned = decl.body.iter().find_map(|s| match s {
                Stmt::Return(Some(expr)) => Some(expr),
                _ => None,
            });
            let mut field = match returned {
                Some(Expr::MethodCall {
                    object,
                    method,
                    args,
                    ..
                }) if object.is_this() => {
                    let transformer = args.get(1).and_then(|a| match &a.value {
                        Expr::New { class, .. } => Some(owner.resolve_name(class)),
                        _ => None,
                    });
                    match (method.as_str(), transformer) {
                        ("item", Some(t)) => ResourceFieldInfo::resource(t),
                        ("collection", Some(t)) => ResourceFieldInfo::array_of(
                            ResourceFieldInfo::resource(t),
                            FieldSource::Resource,
                        ),
                        ("primitive", _) => ResourceFieldInfo::mixed(),
                        ("null", _) => ResourceFieldInfo::new("null", FieldSource::Literal),
                        _ => ResourceFieldInfo::mixed(),
                    }
                }
                _ => ResourceFieldInfo::mixed(),
            };
            if !structure.default_includes.contains(&name) {
                let mut info = ConditionalInfo::new(ConditionKind::Include);
                info.relation = Some(name.clone());
                field.conditional = Some(info);
            }
            structure.properties.insert(name, field);
        }
        Ok(())
    }
}

/// Body of an arrow function or the first `return` of a closure
fn callable_result(expr: &Expr) -> Option<&Expr> {
    match expr {
        Expr::ArrowFn { body, .. } => Some(body),
        Expr::Closure { body, .. } => body.iter().find_map(|s| match s {
            Stmt::Return(Some(value)) => Some(value),
            _ => None,
        }),
        _ => None,
    }
}

fn key_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Literal(Literal::String(s)) => Some(s.clone()),
        Expr::Literal(Literal::Int(i)) => Some(i.to_string()),
        _ => None,
    }
}

fn literal_field(lit: &Literal) -> ResourceFieldInfo {
    let field_type = match lit {
        Literal::String(_) => "string",
        Literal::Int(_) => "integer",
        Literal::Float(_) => "number",
        Literal::Bool(_) => "boolean",
        Literal::Null => "null",
    };
    let mut field = ResourceFieldInfo::new(field_type, FieldSource::Literal);
    if matches!(lit, Literal::Null) {
        field.nullable = true;
    } else {
        field.example = Some(lit.to_json());
    }
    field
}

/// Prefer the non-null side of `a ? b : null`, marking the result nullable
fn pick_alternative(first: ResourceFieldInfo, second: ResourceFieldInfo) -> ResourceFieldInfo {
    match (first.field_type.as_str(), second.field_type.as_str()) {
        ("null", _) => ResourceFieldInfo {
            nullable: true,
            ..second
        },
        (_, "null") => ResourceFieldInfo {
            nullable: true,
            ..first
        },
        ("mixed", _) => second,
        _ => first,
    }
}

/// Best-effort type of a model attribute from its name
fn property_field(name: &str) -> ResourceFieldInfo {
    let lower = name.to_ascii_lowercase();
    let field = |t: &str| ResourceFieldInfo::new(t, FieldSource::Property);

    if lower == "id" || lower.ends_with("_id") {
        field("integer").with_example(Value::from(1))
    } else if lower.ends_with("_at") || lower == "date" || lower.ends_with("_date") {
        field("string")
            .with_format("date-time")
            .with_example(Value::from("2024-01-01T00:00:00.000000Z"))
    } else if lower.starts_with("is_") || lower.starts_with("has_") || lower.starts_with("can_") {
        field("boolean").with_example(Value::from(true))
    } else if lower.ends_with("_count") || lower == "count" {
        field("integer").with_example(Value::from(0))
    } else if lower == "email" || lower.ends_with("_email") {
        field("string")
            .with_format("email")
            .with_example(Value::from("user@example.com"))
    } else if lower == "uuid" || lower.ends_with("_uuid") {
        field("string").with_format("uuid")
    } else if lower == "url" || lower.ends_with("_url") || lower == "link" {
        field("string").with_format("uri")
    } else if ["price", "amount", "total", "balance", "rate"]
        .iter()
        .any(|n| lower == *n || lower.ends_with(&format!("_{}", n)))
    {
        field("number")
    } else if ["name", "title", "description", "slug", "body", "content", "status", "type"]
        .iter()
        .any(|n| lower == *n || lower.ends_with(&format!("_{}", n)))
    {
        field("string")
    } else {
        field("mixed")
    }
}

/// A relation loaded without a dedicated resource: plural names are lists
fn relation_field(relation: &str) -> ResourceFieldInfo {
    let item = ResourceFieldInfo::new("object", FieldSource::Relation);
    if relation.ends_with('s') && !relation.ends_with("ss") {
        ResourceFieldInfo::array_of(item, FieldSource::Relation)
    } else {
        item
    }
}

fn enum_like(property: &str) -> bool {
    matches!(property, "status" | "type" | "role" | "state" | "kind")
        || property.ends_with("_status")
}

fn method_result(method: &str) -> ResourceFieldInfo {
    let computed = |t: &str| ResourceFieldInfo::new(t, FieldSource::Computed);
    match method {
        "toIso8601String" | "toIso8601ZuluString" | "toDateTimeString" | "toISOString"
        | "toAtomString" | "toRfc3339String" => computed("string").with_format("date-time"),
        "toDateString" => computed("string").with_format("date"),
        "format" | "diffForHumans" | "toString" | "__toString" => computed("string"),
        "count" | "timestamp" => computed("integer"),
        "sum" | "avg" | "average" | "min" | "max" => computed("number"),
        "toArray" | "all" | "pluck" | "keys" | "values" | "map" => computed("array"),
        "isEmpty" | "isNotEmpty" | "exists" | "contains" | "is" | "isNot" => computed("boolean"),
        _ => ResourceFieldInfo::mixed(),
    }
}

fn function_result(function: &str) -> ResourceFieldInfo {
    let computed = |t: &str| ResourceFieldInfo::new(t, FieldSource::Computed);
    match function.trim_start_matches('\\').to_ascii_lowercase().as_str() {
        "route" | "url" | "asset" | "secure_url" => computed("string").with_format("uri"),
        "now" | "today" => computed("string").with_format("date-time"),
        "count" | "intval" | "strlen" => computed("integer"),
        "floatval" | "round" => computed("number"),
        "boolval" | "is_null" | "empty" | "isset" | "in_array" => computed("boolean"),
        "__" | "trans" | "strval" | "ucfirst" | "strtolower" | "strtoupper" | "sprintf" => {
            computed("string")
        }
        _ => ResourceFieldInfo::mixed(),
    }
}

fn collect_resources(field: &ResourceFieldInfo, out: &mut Vec<String>) {
    if let Some(resource) = &field.resource {
        if !out.contains(resource) {
            out.push(resource.clone());
        }
    }
    for nested in field.properties.values() {
        collect_resources(nested, out);
    }
    if let Some(items) = &field.items {
        collect_resources(items, out);
    }
}

/// `author_profile` → `AuthorProfile`
fn studly(name: &str) -> String {
    name.split(['_', '-', '.'])
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// `attribute => Enum::class` pairs of a model's `$casts` property and `casts()` method
fn cast_entries(model: &ResolvedClass) -> Vec<(String, String)> {
    let property = model.decl().property("casts").and_then(|p| p.default.as_ref());
    let method = model.decl().method("casts").and_then(|m| {
        m.body.iter().find_map(|stmt| match stmt {
            Stmt::Return(Some(expr)) => Some(expr),
            _ => None,
        })
    });

    let mut entries = Vec::new();
    for source in [property, method].into_iter().flatten() {
        let Expr::Array(items) = source else {
            continue;
        };
        for item in items {
            let Some(attribute) = item.key.as_ref().and_then(|k| k.as_str_literal()) else {
                continue;
            };
            if let Expr::ClassConst { class, constant } = &item.value {
                if constant.eq_ignore_ascii_case("class") {
                    entries.push((attribute.to_string(), model.resolve_name(class)));
                }
            }
        }
    }
    entries
}

fn string_list_property(class: &ResolvedClass, name: &str) -> Vec<String> {
    match class.decl().property(name).and_then(|p| p.default.as_ref()) {
        Some(Expr::Array(items)) => items
            .iter()
            .filter_map(|i| i.value.as_str_literal().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}
