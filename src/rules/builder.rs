//! Framework rule builders: `Rule::in(...)`, `Password::min(8)`, `new Enum(...)`, ...
//!
//! Each builder maps to the plain tokens the framework would produce. Arguments that are not
//! statically known collapse to `...` placeholders instead of failing.

use super::evaluator::{field_tokens, Resolution, Value};
use super::{RuleArgs, RuleMarker, RuleToken};
use crate::parser::ast::{short_name, Literal};
use indexmap::IndexMap;

/// An evaluated call argument
#[derive(Debug, Clone)]
pub(crate) struct BuiltArg {
    pub name: Option<String>,
    pub value: Resolution<Value>,
    pub rendered: String,
    /// Fully qualified class of a `Foo::class` argument
    pub class_ref: Option<String>,
    /// Values of the enum named by `class_ref`, when it resolves to one
    pub enum_values: Option<Vec<serde_json::Value>>,
}

impl BuiltArg {
    fn scalar(&self) -> Option<&Literal> {
        match &self.value {
            Resolution::Resolved(Value::Literal(literal)) => Some(literal),
            _ => None,
        }
    }

    fn string(&self) -> Option<String> {
        match self.scalar()? {
            Literal::String(s) => Some(s.clone()),
            Literal::Int(_) | Literal::Float(_) => self.scalar().map(Literal::to_php_string),
            _ => None,
        }
    }

    /// Literal values of a scalar or list argument, `None` when any is dynamic
    fn literal_list(&self) -> Option<Vec<String>> {
        match &self.value {
            Resolution::Resolved(Value::Literal(literal)) => Some(vec![literal.to_php_string()]),
            Resolution::Resolved(Value::Tokens(tokens)) => tokens
                .iter()
                .map(|t| t.as_str().map(str::to_string))
                .collect(),
            Resolution::Resolved(Value::Map(map)) if map.is_empty() => Some(Vec::new()),
            _ => None,
        }
    }

    /// `key => literal` pairs of a keyed array argument
    fn pairs(&self) -> Vec<(String, String)> {
        match &self.value {
            Resolution::Resolved(Value::Map(map)) => map
                .iter()
                .filter_map(|(key, tokens)| {
                    let value = tokens.first()?.as_str()?;
                    Some((key.clone(), value.to_string()))
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Truthiness of a literal argument, `None` when decided at runtime
    fn truthiness(&self) -> Option<bool> {
        Some(match self.scalar()? {
            Literal::Bool(b) => *b,
            Literal::Null => false,
            Literal::Int(i) => *i != 0,
            Literal::Float(f) => *f != 0.0,
            Literal::String(s) => !s.is_empty() && s != "0",
        })
    }

    fn tokens(&self) -> Vec<RuleToken> {
        field_tokens(self.value.clone())
    }

    /// JSON form used in custom-rule descriptors
    fn to_json(&self) -> serde_json::Value {
        match &self.value {
            Resolution::Resolved(Value::Literal(literal)) => literal.to_json(),
            Resolution::Resolved(Value::Tokens(tokens))
                if tokens.iter().all(|t| t.as_str().is_some()) =>
            {
                serde_json::Value::Array(
                    tokens
                        .iter()
                        .filter_map(|t| t.as_str())
                        .map(serde_json::Value::from)
                        .collect(),
                )
            }
            Resolution::Resolved(Value::Map(map)) if !map.is_empty() => {
                let object = map
                    .iter()
                    .map(|(key, tokens)| {
                        let value = match tokens.as_slice() {
                            [single] => serde_json::to_value(single).unwrap_or_default(),
                            many => serde_json::to_value(many).unwrap_or_default(),
                        };
                        (key.clone(), value)
                    })
                    .collect();
                serde_json::Value::Object(object)
            }
            _ => serde_json::Value::from(self.rendered.as_str()),
        }
    }
}

/// Static facades that build rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuilderFamily {
    Rule,
    Password,
    File,
}

pub(crate) fn family(class_short_name: &str) -> Option<BuilderFamily> {
    match class_short_name.to_ascii_lowercase().as_str() {
        "rule" => Some(BuilderFamily::Rule),
        "password" => Some(BuilderFamily::Password),
        "file" => Some(BuilderFamily::File),
        _ => None,
    }
}

type Handler = fn(&[BuiltArg]) -> Vec<RuleToken>;

const RULE_BUILDERS: &[(&str, Handler)] = &[
    ("in", build_in),
    ("notIn", build_not_in),
    ("exists", build_exists),
    ("unique", build_unique),
    ("requiredIf", build_required_if),
    ("prohibitedIf", build_prohibited_if),
    ("excludeIf", build_exclude_if),
    ("when", build_when),
    ("enum", build_enum),
    ("dimensions", build_dimensions),
    ("imageFile", build_image),
    ("file", build_file),
];

const NEW_BUILDERS: &[(&str, Handler)] = &[
    ("In", build_in),
    ("NotIn", build_not_in),
    ("Exists", build_exists),
    ("Unique", build_unique),
    ("Enum", build_enum),
    ("Password", build_password),
    ("Dimensions", build_dimensions),
    ("File", build_file),
    ("ImageFile", build_image),
    ("RequiredIf", build_required_if),
];

/// `Rule::method(...)`, `Password::method(...)`, `File::method(...)`
pub(crate) fn build_static(
    family: BuilderFamily,
    method: &str,
    args: &[BuiltArg],
) -> Vec<RuleToken> {
    match family {
        BuilderFamily::Rule => match lookup(RULE_BUILDERS, method) {
            Some(handler) => handler(args),
            None => vec![RuleToken::plain(method)],
        },
        BuilderFamily::Password if method.eq_ignore_ascii_case("min") => build_password(args),
        BuilderFamily::Password => vec![RuleToken::plain("password")],
        BuilderFamily::File if method.eq_ignore_ascii_case("image") => build_image(args),
        BuilderFamily::File if method.eq_ignore_ascii_case("types") => {
            let mut tokens = build_file(args);
            match joined_literals(args) {
                Some(types) if !types.is_empty() => {
                    tokens.push(RuleToken::Plain(format!("mimes:{}", types.join(","))))
                }
                Some(_) => {}
                None => tokens.push(RuleToken::plain("mimes:...")),
            }
            tokens
        }
        BuilderFamily::File => build_file(args),
    }
}

/// `new In(...)`, `new Enum(...)`, ... for the framework's own rule classes
pub(crate) fn build_new(class_short_name: &str, args: &[BuiltArg]) -> Vec<RuleToken> {
    match lookup(NEW_BUILDERS, class_short_name) {
        Some(handler) => handler(args),
        None => vec![custom_rule(class_short_name, args)],
    }
}

/// Descriptor of a project-defined rule object
pub(crate) fn custom_rule(class: &str, args: &[BuiltArg]) -> RuleToken {
    let args = if args.iter().any(|a| a.name.is_some()) {
        RuleArgs::Named(
            args.iter()
                .enumerate()
                .map(|(i, arg)| (arg.name.clone().unwrap_or_else(|| i.to_string()), arg.to_json()))
                .collect::<IndexMap<_, _>>(),
        )
    } else {
        RuleArgs::Positional(args.iter().map(BuiltArg::to_json).collect())
    };
    RuleToken::Marker(RuleMarker::CustomRule {
        class: short_name(class).to_string(),
        args,
    })
}

fn lookup(table: &[(&str, Handler)], name: &str) -> Option<Handler> {
    table
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, handler)| *handler)
}

/// Every argument's literal values flattened, `None` when any argument is dynamic
fn joined_literals(args: &[BuiltArg]) -> Option<Vec<String>> {
    let mut values = Vec::new();
    for arg in args {
        values.extend(arg.literal_list()?);
    }
    Some(values)
}

fn list_rule(name: &str, args: &[BuiltArg]) -> Vec<RuleToken> {
    match joined_literals(args) {
        Some(values) => vec![RuleToken::Plain(format!("{}:{}", name, values.join(",")))],
        None => vec![RuleToken::Plain(format!("{}:...", name))],
    }
}

fn build_in(args: &[BuiltArg]) -> Vec<RuleToken> {
    list_rule("in", args)
}

fn build_not_in(args: &[BuiltArg]) -> Vec<RuleToken> {
    list_rule("not_in", args)
}

fn table_rule(name: &str, args: &[BuiltArg]) -> Vec<RuleToken> {
    match args.first().and_then(BuiltArg::string) {
        Some(table) => vec![RuleToken::Plain(format!("{}:{}", name, table))],
        None => vec![RuleToken::Plain(format!("{}:...", name))],
    }
}

fn build_exists(args: &[BuiltArg]) -> Vec<RuleToken> {
    table_rule("exists", args)
}

fn build_unique(args: &[BuiltArg]) -> Vec<RuleToken> {
    table_rule("unique", args)
}

fn conditional_presence(name: &str, args: &[BuiltArg]) -> Vec<RuleToken> {
    let values: Vec<String> = args.iter().filter_map(BuiltArg::string).collect();
    vec![RuleToken::Plain(format!("{}:{}", name, values.join(",")))]
}

fn build_required_if(args: &[BuiltArg]) -> Vec<RuleToken> {
    conditional_presence("required_if", args)
}

fn build_prohibited_if(args: &[BuiltArg]) -> Vec<RuleToken> {
    conditional_presence("prohibited_if", args)
}

fn build_exclude_if(args: &[BuiltArg]) -> Vec<RuleToken> {
    conditional_presence("exclude_if", args)
}

/// `Rule::when(condition, then, otherwise)`
fn build_when(args: &[BuiltArg]) -> Vec<RuleToken> {
    match args.first().and_then(BuiltArg::truthiness) {
        Some(true) => args.get(1).map(BuiltArg::tokens).unwrap_or_default(),
        Some(false) => args.get(2).map(BuiltArg::tokens).unwrap_or_default(),
        None => vec![RuleToken::plain("sometimes")],
    }
}

fn build_enum(args: &[BuiltArg]) -> Vec<RuleToken> {
    match args.first().and_then(|a| a.class_ref.as_deref().map(|c| (c, a))) {
        Some((class, arg)) => vec![RuleToken::Marker(RuleMarker::Enum {
            class: short_name(class).to_string(),
            values: arg.enum_values.clone().unwrap_or_default(),
        })],
        None => vec![RuleToken::plain("__enum__")],
    }
}

fn build_dimensions(args: &[BuiltArg]) -> Vec<RuleToken> {
    let mut constraints: Vec<String> = args
        .first()
        .map(|a| a.pairs().into_iter().map(|(k, v)| format!("{}={}", k, v)).collect())
        .unwrap_or_default();
    constraints.extend(
        args.iter()
            .filter_map(|a| Some(format!("{}={}", a.name.as_ref()?, a.string()?))),
    );
    if constraints.is_empty() {
        vec![RuleToken::plain("dimensions")]
    } else {
        vec![RuleToken::Plain(format!("dimensions:{}", constraints.join(",")))]
    }
}

fn build_password(args: &[BuiltArg]) -> Vec<RuleToken> {
    let mut tokens = vec![RuleToken::plain("password")];
    if let Some(min) = args.first().and_then(BuiltArg::string) {
        tokens.push(RuleToken::Plain(format!("min:{}", min)));
    }
    tokens
}

fn build_image(_args: &[BuiltArg]) -> Vec<RuleToken> {
    vec![RuleToken::plain("image")]
}

fn build_file(_args: &[BuiltArg]) -> Vec<RuleToken> {
    vec![RuleToken::plain("file")]
}
