//! FormRequest analysis: validation rules, attribute labels, messages and authorization.

use crate::class_resolver::{ClassResolver, ResolvedClass};
use crate::error::Result;
use crate::parser::ast::{ArrayItem, Expr, Literal, Stmt};
use crate::rules::{ConditionalRuleSet, RuleMap, RuleSetExtractor, RuleToken};
use crate::type_inference::{infer_field, TypeInfo};
use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Base class every validated request extends
pub const FORM_REQUEST: &str = "Illuminate\\Foundation\\Http\\FormRequest";

/// Where a parameter is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Body,
    Query,
    Path,
    Header,
}

/// One inferred input field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    /// Field name as validated, dot notation included (`items.*.id`)
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    pub required: bool,
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
    /// Raw validation tokens
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleToken>,
    /// Full type descriptor (format, bounds, enum, file metadata)
    pub schema: TypeInfo,
}

impl ParameterDefinition {
    /// Build a parameter from its rule tokens
    pub fn from_rules(
        name: &str,
        tokens: &[RuleToken],
        location: ParameterLocation,
        label: Option<&str>,
    ) -> Self {
        let schema = infer_field(name, tokens);
        let label = label.map(str::to_string).unwrap_or_else(|| humanize(name));
        Self {
            name: name.to_string(),
            location,
            required: schema.required,
            param_type: schema.schema_type.clone(),
            description: describe(&label, &schema),
            rules: tokens.to_vec(),
            schema,
        }
    }

    /// A parameter known only from how the controller reads it
    pub fn untyped(name: &str, location: ParameterLocation, schema: TypeInfo) -> Self {
        Self {
            name: name.to_string(),
            location,
            required: schema.required,
            param_type: schema.schema_type.clone(),
            description: humanize(name),
            rules: Vec::new(),
            schema,
        }
    }
}

/// Parameters for every field of a rule mapping, in declaration order
pub fn build_parameters(
    rules: &RuleMap,
    attributes: &IndexMap<String, String>,
    location: ParameterLocation,
) -> Vec<ParameterDefinition> {
    rules
        .iter()
        .map(|(name, tokens)| {
            let label = attributes.get(name).map(String::as_str);
            ParameterDefinition::from_rules(name, tokens, location, label)
        })
        .filter(|p| !p.schema.hidden)
        .collect()
}

/// `items.*.unit_price` → `Items unit price`
pub fn humanize(field: &str) -> String {
    let words = field
        .split('.')
        .filter(|s| *s != "*")
        .collect::<Vec<_>>()
        .join(" ")
        .replace(['_', '-'], " ");
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn describe(label: &str, schema: &TypeInfo) -> String {
    let mut parts = vec![label.to_string()];
    if !schema.required_conditions.is_empty() {
        parts.push(format!(
            "Required when: {}",
            schema.required_conditions.join(", ")
        ));
    }
    if !schema.custom_rules.is_empty() {
        parts.push(format!("Validated by: {}", schema.custom_rules.join(", ")));
    }
    if let Some(extra) = &schema.description {
        parts.push(extra.clone());
    }
    parts.join(". ")
}

/// Everything learned from one FormRequest class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestAnalysis {
    pub class: String,
    pub rule_set: ConditionalRuleSet,
    /// `attributes()`: field → human label
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, String>,
    /// `messages()`: `field.rule` → message
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub messages: IndexMap<String, String>,
    /// `authorize()` exists and is not a bare `return true`
    pub authorizes: bool,
}

impl RequestAnalysis {
    /// Parameters validated for one HTTP verb
    pub fn parameters(&self, verb: &str, location: ParameterLocation) -> Vec<ParameterDefinition> {
        let rules = self.rule_set.rules_for_method(verb);
        build_parameters(&rules, &self.attributes, location)
    }

    pub fn has_rules(&self) -> bool {
        !self.rule_set.is_empty()
    }
}

/// Analyzer for FormRequest classes
pub struct RequestAnalyzer<'r> {
    resolver: &'r mut ClassResolver,
}

impl<'r> RequestAnalyzer<'r> {
    pub fn new(resolver: &'r mut ClassResolver) -> Self {
        Self { resolver }
    }

    /// Whether a class extends the framework's FormRequest
    pub fn is_form_request(&mut self, fqcn: &str) -> bool {
        self.resolver.is_subclass_of(fqcn, FORM_REQUEST)
    }

    /// Analyze a FormRequest.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the class cannot be found (a missing class is not analyzed).
    ///
    /// # Errors
    ///
    /// Returns a `ParseFailure` if the class file (or one of its ancestors) does not parse.
    pub fn analyze(&mut self, fqcn: &str) -> Result<Option<RequestAnalysis>> {
        let Some(class) = self.resolver.find_class(fqcn)? else {
            debug!("FormRequest {} not found", fqcn);
            return Ok(None);
        };
        self.analyze_class(&class).map(Some)
    }

    pub fn analyze_class(&mut self, class: &ResolvedClass) -> Result<RequestAnalysis> {
        let rule_set = RuleSetExtractor::with_resolver(&mut *self.resolver).extract(class, "rules");
        let attributes = self.string_map(class, "attributes")?;
        let messages = self.string_map(class, "messages")?;
        let authorizes = match self.resolver.find_method(class, "authorize")? {
            Some((_, decl)) => !returns_only_true(&decl.body),
            None => false,
        };

        info!(
            "Analyzed request {}: {} field(s), {} label(s)",
            class.fqcn,
            rule_set.merged.len(),
            attributes.len()
        );
        Ok(RequestAnalysis {
            class: class.fqcn.clone(),
            rule_set,
            attributes,
            messages,
            authorizes,
        })
    }

    /// Literal `key => 'text'` pairs returned by a method such as `attributes()`
    fn string_map(
        &mut self,
        class: &ResolvedClass,
        method: &str,
    ) -> Result<IndexMap<String, String>> {
        let mut map = IndexMap::new();
        let Some((_, decl)) = self.resolver.find_method(class, method)? else {
            return Ok(map);
        };
        let mut arrays = Vec::new();
        returned_arrays(&decl.body, &mut arrays);
        for items in arrays {
            for item in items {
                let (Some(key), Some(text)) = (item.key.as_ref(), item.value.as_str_literal())
                else {
                    continue;
                };
                if let Some(key) = literal_key(key) {
                    map.entry(key).or_insert_with(|| text.to_string());
                }
            }
        }
        Ok(map)
    }
}

fn literal_key(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Literal(Literal::String(s)) => Some(s.clone()),
        Expr::Literal(Literal::Int(i)) => Some(i.to_string()),
        _ => None,
    }
}

/// Array literals reachable from `return` statements, including `array_merge(...)` arguments
fn returned_arrays<'a>(body: &'a [Stmt], out: &mut Vec<&'a Vec<ArrayItem>>) {
    for stmt in body {
        match stmt {
            Stmt::Return(Some(expr)) => collect_arrays(expr, out),
            Stmt::If {
                then_branch,
                else_ifs,
                else_branch,
                ..
            } => {
                returned_arrays(then_branch, out);
                for else_if in else_ifs {
                    returned_arrays(&else_if.body, out);
                }
                if let Some(else_branch) = else_branch {
                    returned_arrays(else_branch, out);
                }
            }
            Stmt::Block(inner) => returned_arrays(inner, out),
            _ => {}
        }
    }
}

fn collect_arrays<'a>(expr: &'a Expr, out: &mut Vec<&'a Vec<ArrayItem>>) {
    match expr {
        Expr::Array(items) => out.push(items),
        Expr::Call { function, args } if function.eq_ignore_ascii_case("array_merge") => {
            for arg in args {
                collect_arrays(&arg.value, out);
            }
        }
        Expr::Binary { op, left, right } if op == "+" => {
            collect_arrays(left, out);
            collect_arrays(right, out);
        }
        _ => {}
    }
}

fn returns_only_true(body: &[Stmt]) -> bool {
    matches!(body, [Stmt::Return(Some(Expr::Literal(Literal::Bool(true))))])
}
