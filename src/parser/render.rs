//! Pretty-printer turning AST fragments back into PHP-like source text.
//!
//! Used wherever a value cannot be evaluated statically: the rendered text becomes the
//! fallback token (e.g. `exists:...` builders keep `$this->getTable()` verbatim).

use super::ast::*;

/// Render an expression as PHP source
pub fn render(expr: &Expr) -> String {
    match expr {
        Expr::Literal(lit) => render_literal(lit),
        Expr::Interpolated(raw) | Expr::Other(raw) => raw.clone(),
        Expr::Variable(name) => format!("${}", name),
        Expr::Constant(name) => name.clone(),
        Expr::Array(items) => format!(
            "[{}]",
            items.iter().map(render_item).collect::<Vec<_>>().join(", ")
        ),
        Expr::Assign { target, op, value } => format!(
            "{} {} {}",
            render(target),
            op.as_deref().unwrap_or("="),
            render(value)
        ),
        Expr::Binary { op, left, right } => {
            format!("{} {} {}", render(left), op, render(right))
        }
        Expr::Unary { op, operand } => format!("{}{}", op, render(operand)),
        Expr::Ternary {
            condition,
            then,
            otherwise,
        } => match then {
            Some(then) => format!(
                "{} ? {} : {}",
                render(condition),
                render(then),
                render(otherwise)
            ),
            None => format!("{} ?: {}", render(condition), render(otherwise)),
        },
        Expr::Call { function, args } => format!("{}({})", function, render_args(args)),
        Expr::MethodCall {
            object,
            method,
            args,
            nullsafe,
        } => format!(
            "{}{}{}({})",
            render(object),
            if *nullsafe { "?->" } else { "->" },
            method,
            render_args(args)
        ),
        Expr::StaticCall {
            class,
            method,
            args,
        } => format!("{}::{}({})", class, method, render_args(args)),
        Expr::PropertyFetch {
            object,
            property,
            nullsafe,
        } => format!(
            "{}{}{}",
            render(object),
            if *nullsafe { "?->" } else { "->" },
            property
        ),
        Expr::StaticProperty { class, property } => format!("{}::${}", class, property),
        Expr::ClassConst { class, constant } => format!("{}::{}", class, constant),
        Expr::New { class, args } => format!("new {}({})", class, render_args(args)),
        Expr::Closure { params, .. } => format!("function ({}) {{ ... }}", render_params(params)),
        Expr::ArrowFn { params, body } => {
            format!("fn ({}) => {}", render_params(params), render(body))
        }
        Expr::Match { subject, .. } => format!("match ({}) {{ ... }}", render(subject)),
        Expr::Cast { to, expr } => format!("({}) {}", to, render(expr)),
        Expr::Index { target, index } => match index {
            Some(index) => format!("{}[{}]", render(target), render(index)),
            None => format!("{}[]", render(target)),
        },
    }
}

pub fn render_literal(lit: &Literal) -> String {
    match lit {
        Literal::String(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) => format!("{:?}", f),
        Literal::Bool(b) => b.to_string(),
        Literal::Null => "null".to_string(),
    }
}

fn render_item(item: &ArrayItem) -> String {
    if item.spread {
        return format!("...{}", render(&item.value));
    }
    match &item.key {
        Some(key) => format!("{} => {}", render(key), render(&item.value)),
        None => render(&item.value),
    }
}

pub fn render_args(args: &[Arg]) -> String {
    args.iter()
        .map(|arg| {
            let value = render(&arg.value);
            match (&arg.name, arg.spread) {
                (_, true) => format!("...{}", value),
                (Some(name), false) => format!("{}: {}", name, value),
                (None, false) => value,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_params(params: &[Param]) -> String {
    params
        .iter()
        .map(|p| {
            let mut out = String::new();
            if let Some(hint) = &p.type_hint {
                if hint.nullable && hint.names.len() == 1 {
                    out.push('?');
                }
                out.push_str(&hint.names.join("|"));
                out.push(' ');
            }
            if p.variadic {
                out.push_str("...");
            }
            out.push('$');
            out.push_str(&p.name);
            out
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn this_call(method: &str) -> Expr {
        Expr::MethodCall {
            object: Box::new(Expr::Variable("this".to_string())),
            method: method.to_string(),
            args: vec![],
            nullsafe: false,
        }
    }

    #[test]
    fn test_render_method_call() {
        assert_eq!(render(&this_call("getTable")), "$this->getTable()");
    }

    #[test]
    fn test_render_static_call_with_named_args() {
        let expr = Expr::StaticCall {
            class: "Rule".to_string(),
            method: "unique".to_string(),
            args: vec![
                Arg::positional(Expr::string("users")),
                Arg {
                    name: Some("column".to_string()),
                    value: Expr::string("email"),
                    spread: false,
                },
            ],
        };
        assert_eq!(render(&expr), "Rule::unique('users', column: 'email')");
    }

    #[test]
    fn test_render_array_and_concat() {
        let expr = Expr::Array(vec![ArrayItem {
            key: Some(Expr::string("name")),
            value: Expr::Binary {
                op: ".".to_string(),
                left: Box::new(Expr::string("max:")),
                right: Box::new(Expr::Variable("max".to_string())),
            },
            spread: false,
        }]);
        assert_eq!(render(&expr), "['name' => 'max:' . $max]");
    }

    #[test]
    fn test_render_string_escapes_quotes() {
        assert_eq!(render_literal(&Literal::String("it's".to_string())), "'it\\'s'");
    }
}
