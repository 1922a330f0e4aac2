//! Lowering from the tree-sitter concrete syntax tree to the typed [`ast`](super::ast).
//!
//! Node kinds come from the `tree-sitter-php` grammar. Field lookups fall back to positional
//! named children so that minor grammar revisions keep working.

use super::ast::*;
use tree_sitter::Node;

pub(crate) struct Lowerer<'s> {
    source: &'s [u8],
}

fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

fn all_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn has_token(node: Node, token: &str) -> bool {
    all_children(node)
        .iter()
        .any(|c| !c.is_named() && c.kind() == token)
}

fn trim_ns(name: &str) -> String {
    name.trim().trim_start_matches('\\').to_string()
}

impl<'s> Lowerer<'s> {
    pub(crate) fn new(source: &'s str) -> Self {
        Self {
            source: source.as_bytes(),
        }
    }

    fn text(&self, node: Node) -> String {
        node.utf8_text(self.source).unwrap_or_default().to_string()
    }

    /// Lower the whole `program` node
    pub(crate) fn lower_program(&self, root: Node) -> SourceFile {
        let mut file = SourceFile::default();
        self.collect_items(root, &mut file);
        file
    }

    fn collect_items(&self, node: Node, file: &mut SourceFile) {
        for child in named_children(node) {
            match child.kind() {
                "namespace_definition" => {
                    let name = child.child_by_field_name("name").or_else(|| {
                        named_children(child)
                            .into_iter()
                            .find(|c| c.kind() == "namespace_name")
                    });
                    if let Some(name) = name {
                        file.namespace = Some(trim_ns(&self.text(name)));
                    }
                    if let Some(body) = child.child_by_field_name("body") {
                        self.collect_items(body, file);
                    }
                }
                "namespace_use_declaration" => self.lower_use_declaration(child, &mut file.imports),
                "class_declaration" => file.classes.push(self.lower_class(child, ClassKind::Class)),
                "trait_declaration" => file.classes.push(self.lower_class(child, ClassKind::Trait)),
                "interface_declaration" => {
                    file.classes.push(self.lower_class(child, ClassKind::Interface))
                }
                "enum_declaration" => file.enums.push(self.lower_enum(child)),
                "compound_statement" => self.collect_items(child, file),
                _ => {}
            }
        }
    }

    fn lower_use_declaration(&self, node: Node, imports: &mut Vec<UseImport>) {
        let mut prefix: Option<String> = None;
        for child in named_children(node) {
            match child.kind() {
                "namespace_name" | "qualified_name" => prefix = Some(trim_ns(&self.text(child))),
                "namespace_use_clause" | "namespace_use_group_clause" => {
                    if let Some(import) = self.lower_use_clause(child, None) {
                        imports.push(import);
                    }
                }
                "namespace_use_group" => {
                    for clause in named_children(child) {
                        if let Some(import) = self.lower_use_clause(clause, prefix.as_deref()) {
                            imports.push(import);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn lower_use_clause(&self, clause: Node, prefix: Option<&str>) -> Option<UseImport> {
        let alias_node = clause.child_by_field_name("alias");
        let kids = named_children(clause);
        let names: Vec<Node> = kids
            .iter()
            .copied()
            .filter(|k| matches!(k.kind(), "name" | "qualified_name" | "namespace_name"))
            .filter(|k| Some(k.id()) != alias_node.map(|a| a.id()))
            .collect();
        let name_node = names.first()?;

        let mut alias = alias_node.map(|a| self.text(a));
        if alias.is_none() {
            if let Some(aliasing) = kids.iter().find(|k| k.kind() == "namespace_aliasing_clause") {
                alias = named_children(*aliasing).first().map(|n| self.text(*n));
            } else if names.len() >= 2 {
                alias = names.last().map(|n| self.text(*n));
            }
        }

        let name = trim_ns(&self.text(*name_node));
        let name = match prefix {
            Some(prefix) => format!("{}\\{}", prefix.trim_matches('\\'), name),
            None => name,
        };
        Some(UseImport { name, alias })
    }

    fn lower_class(&self, node: Node, kind: ClassKind) -> ClassDecl {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or_default();
        let mut decl = ClassDecl {
            name,
            kind,
            extends: None,
            implements: Vec::new(),
            traits: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
            is_abstract: false,
        };

        for child in named_children(node) {
            match child.kind() {
                "base_clause" => {
                    decl.extends = named_children(child)
                        .first()
                        .map(|n| self.text(*n).trim().to_string());
                }
                "class_interface_clause" => {
                    decl.implements = named_children(child)
                        .iter()
                        .map(|n| self.text(*n).trim().to_string())
                        .collect();
                }
                "abstract_modifier" => decl.is_abstract = true,
                "declaration_list" => self.lower_members(child, &mut decl),
                _ => {}
            }
        }
        decl
    }

    fn lower_members(&self, list: Node, decl: &mut ClassDecl) {
        for member in named_children(list) {
            match member.kind() {
                "method_declaration" => decl.methods.push(self.lower_method(member)),
                "property_declaration" => decl.properties.extend(self.lower_property(member)),
                "use_declaration" => {
                    for name in named_children(member) {
                        if matches!(name.kind(), "name" | "qualified_name") {
                            decl.traits.push(self.text(name).trim().to_string());
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn lower_method(&self, node: Node) -> MethodDecl {
        let mut method = MethodDecl {
            name: node
                .child_by_field_name("name")
                .map(|n| self.text(n))
                .unwrap_or_default(),
            params: node
                .child_by_field_name("parameters")
                .map(|p| self.lower_params(p))
                .unwrap_or_default(),
            return_type: node
                .child_by_field_name("return_type")
                .map(|t| self.lower_type(t)),
            body: node
                .child_by_field_name("body")
                .map(|b| self.lower_block(b))
                .unwrap_or_default(),
            is_static: false,
            visibility: Visibility::Public,
        };

        for child in named_children(node) {
            match child.kind() {
                "static_modifier" => method.is_static = true,
                "visibility_modifier" => {
                    method.visibility = match self.text(child).to_ascii_lowercase().as_str() {
                        "protected" => Visibility::Protected,
                        "private" => Visibility::Private,
                        _ => Visibility::Public,
                    }
                }
                _ => {}
            }
        }
        method
    }

    fn lower_params(&self, node: Node) -> Vec<Param> {
        named_children(node)
            .into_iter()
            .filter(|p| {
                matches!(
                    p.kind(),
                    "simple_parameter" | "property_promotion_parameter" | "variadic_parameter"
                )
            })
            .map(|p| {
                let name = p
                    .child_by_field_name("name")
                    .or_else(|| {
                        named_children(p)
                            .into_iter()
                            .find(|c| c.kind() == "variable_name")
                    })
                    .map(|n| self.text(n).trim_start_matches('$').to_string())
                    .unwrap_or_default();
                Param {
                    name,
                    type_hint: p.child_by_field_name("type").map(|t| self.lower_type(t)),
                    default: p
                        .child_by_field_name("default_value")
                        .map(|d| self.lower_expr(d)),
                    variadic: p.kind() == "variadic_parameter",
                }
            })
            .collect()
    }

    pub(crate) fn lower_type(&self, node: Node) -> TypeHint {
        let mut hint = TypeHint::default();
        self.collect_type(node, &mut hint);
        hint
    }

    fn collect_type(&self, node: Node, hint: &mut TypeHint) {
        match node.kind() {
            "optional_type" => {
                hint.nullable = true;
                for child in named_children(node) {
                    self.collect_type(child, hint);
                }
            }
            "named_type" | "name" | "qualified_name" => {
                hint.names.push(self.text(node).trim().to_string())
            }
            "primitive_type" => {
                let name = self.text(node);
                if name.eq_ignore_ascii_case("null") {
                    hint.nullable = true;
                }
                hint.names.push(name);
            }
            _ => {
                for child in named_children(node) {
                    self.collect_type(child, hint);
                }
            }
        }
    }

    fn lower_property(&self, node: Node) -> Vec<PropertyDecl> {
        let kids = named_children(node);
        let is_static = kids.iter().any(|k| k.kind() == "static_modifier");

        kids.iter()
            .filter(|k| k.kind() == "property_element")
            .filter_map(|element| {
                let parts = named_children(*element);
                let var = element
                    .child_by_field_name("name")
                    .or_else(|| parts.iter().copied().find(|p| p.kind() == "variable_name"))?;
                let default = element
                    .child_by_field_name("default_value")
                    .map(|d| self.lower_expr(d))
                    .or_else(|| {
                        parts
                            .iter()
                            .find(|p| p.kind() == "property_initializer")
                            .and_then(|init| {
                                named_children(*init).first().map(|e| self.lower_expr(*e))
                            })
                    })
                    .or_else(|| {
                        parts
                            .iter()
                            .find(|p| p.id() != var.id())
                            .map(|e| self.lower_expr(*e))
                    });
                Some(PropertyDecl {
                    name: self.text(var).trim_start_matches('$').to_string(),
                    default,
                    is_static,
                })
            })
            .collect()
    }

    fn lower_enum(&self, node: Node) -> EnumDecl {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or_default();
        let kids = named_children(node);
        let backing_type = kids
            .iter()
            .find(|k| matches!(k.kind(), "primitive_type" | "named_type" | "union_type"))
            .map(|k| self.text(*k));

        let body = node
            .child_by_field_name("body")
            .or_else(|| kids.iter().copied().find(|k| k.kind() == "enum_declaration_list"));
        let mut cases = Vec::new();
        if let Some(body) = body {
            for case in named_children(body) {
                if case.kind() != "enum_case" {
                    continue;
                }
                let parts: Vec<Node> = named_children(case)
                    .into_iter()
                    .filter(|p| p.kind() != "attribute_list")
                    .collect();
                let case_name = case
                    .child_by_field_name("name")
                    .or_else(|| parts.first().copied())
                    .map(|n| self.text(n))
                    .unwrap_or_default();
                let value = case
                    .child_by_field_name("value")
                    .or_else(|| if parts.len() > 1 { parts.last().copied() } else { None })
                    .and_then(|v| match self.lower_expr(v) {
                        Expr::Literal(lit) => Some(lit),
                        _ => None,
                    });
                cases.push(EnumCase {
                    name: case_name,
                    value,
                });
            }
        }

        EnumDecl {
            name,
            backing_type,
            cases,
        }
    }

    pub(crate) fn lower_block(&self, node: Node) -> Vec<Stmt> {
        match node.kind() {
            "compound_statement" | "colon_block" => named_children(node)
                .into_iter()
                .filter_map(|s| self.lower_stmt(s))
                .collect(),
            _ => self.lower_stmt(node).into_iter().collect(),
        }
    }

    fn lower_stmt(&self, node: Node) -> Option<Stmt> {
        let stmt = match node.kind() {
            "expression_statement" => {
                let expr = named_children(node).into_iter().next()?;
                Stmt::Expr(self.lower_expr(expr))
            }
            "return_statement" => Stmt::Return(
                named_children(node)
                    .into_iter()
                    .next()
                    .map(|e| self.lower_expr(e)),
            ),
            "if_statement" => self.lower_if(node),
            "switch_statement" => self.lower_switch(node),
            "compound_statement" => Stmt::Block(self.lower_block(node)),
            "foreach_statement" | "for_statement" | "while_statement" | "do_statement" => {
                let body = node
                    .child_by_field_name("body")
                    .or_else(|| named_children(node).into_iter().last());
                Stmt::Loop(body.map(|b| self.lower_block(b)).unwrap_or_default())
            }
            "try_statement" => {
                let mut catches = Vec::new();
                let mut finally = None;
                for child in named_children(node) {
                    match child.kind() {
                        "catch_clause" => catches.push(
                            child
                                .child_by_field_name("body")
                                .map(|b| self.lower_block(b))
                                .unwrap_or_default(),
                        ),
                        "finally_clause" => {
                            finally = child.child_by_field_name("body").map(|b| self.lower_block(b))
                        }
                        _ => {}
                    }
                }
                Stmt::Try {
                    body: node
                        .child_by_field_name("body")
                        .map(|b| self.lower_block(b))
                        .unwrap_or_default(),
                    catches,
                    finally,
                }
            }
            "empty_statement" | "text_interpolation" | "php_tag" | "text" | "function_definition"
            | "class_declaration" | "named_label_statement" => return None,
            _ => Stmt::Other(self.text(node)),
        };
        Some(stmt)
    }

    fn lower_if(&self, node: Node) -> Stmt {
        let kids = named_children(node);
        let condition = node
            .child_by_field_name("condition")
            .or_else(|| kids.first().copied())
            .map(|c| self.lower_expr(c))
            .unwrap_or_else(|| Expr::Other(String::new()));
        let then_branch = node
            .child_by_field_name("body")
            .or_else(|| kids.get(1).copied())
            .map(|b| self.lower_block(b))
            .unwrap_or_default();

        let mut else_ifs = Vec::new();
        let mut else_branch = None;
        for child in kids {
            match child.kind() {
                "else_if_clause" => {
                    let parts = named_children(child);
                    let condition = child
                        .child_by_field_name("condition")
                        .or_else(|| parts.first().copied())
                        .map(|c| self.lower_expr(c))
                        .unwrap_or_else(|| Expr::Other(String::new()));
                    let body = child
                        .child_by_field_name("body")
                        .or_else(|| parts.get(1).copied())
                        .map(|b| self.lower_block(b))
                        .unwrap_or_default();
                    else_ifs.push(ElseIf { condition, body });
                }
                "else_clause" => {
                    let Some(body) = child
                        .child_by_field_name("body")
                        .or_else(|| named_children(child).into_iter().next())
                    else {
                        continue;
                    };
                    // `else if` written as two words nests a whole if statement
                    if body.kind() == "if_statement" {
                        if let Stmt::If {
                            condition,
                            then_branch,
                            else_ifs: nested,
                            else_branch: nested_else,
                        } = self.lower_if(body)
                        {
                            else_ifs.push(ElseIf {
                                condition,
                                body: then_branch,
                            });
                            else_ifs.extend(nested);
                            else_branch = nested_else;
                        }
                    } else {
                        else_branch = Some(self.lower_block(body));
                    }
                }
                _ => {}
            }
        }

        Stmt::If {
            condition,
            then_branch,
            else_ifs,
            else_branch,
        }
    }

    fn lower_switch(&self, node: Node) -> Stmt {
        let subject = node
            .child_by_field_name("condition")
            .map(|c| self.lower_expr(c))
            .unwrap_or_else(|| Expr::Other(String::new()));
        let block = node.child_by_field_name("body").or_else(|| {
            named_children(node)
                .into_iter()
                .find(|c| c.kind() == "switch_block")
        });

        let mut cases = Vec::new();
        if let Some(block) = block {
            for case in named_children(block) {
                let parts = named_children(case);
                match case.kind() {
                    "case_statement" => {
                        let Some(value) = case
                            .child_by_field_name("value")
                            .or_else(|| parts.first().copied())
                        else {
                            continue;
                        };
                        cases.push(SwitchCase {
                            test: Some(self.lower_expr(value)),
                            body: parts
                                .iter()
                                .filter(|p| p.id() != value.id())
                                .filter_map(|p| self.lower_stmt(*p))
                                .collect(),
                        });
                    }
                    "default_statement" => cases.push(SwitchCase {
                        test: None,
                        body: parts.iter().filter_map(|p| self.lower_stmt(*p)).collect(),
                    }),
                    _ => {}
                }
            }
        }
        Stmt::Switch { subject, cases }
    }

    pub(crate) fn lower_expr(&self, node: Node) -> Expr {
        match node.kind() {
            "parenthesized_expression" | "error_suppression_expression" => {
                match named_children(node).into_iter().next() {
                    Some(inner) => self.lower_expr(inner),
                    None => Expr::Other(self.text(node)),
                }
            }
            "string" => Expr::Literal(Literal::String(decode_single_quoted(&self.text(node)))),
            "encapsed_string" => {
                let plain = named_children(node).iter().all(|c| {
                    matches!(c.kind(), "string_content" | "string_value" | "escape_sequence")
                });
                if plain {
                    Expr::Literal(Literal::String(decode_double_quoted(&self.text(node))))
                } else {
                    Expr::Interpolated(self.text(node))
                }
            }
            "integer" => match parse_int(&self.text(node)) {
                Some(value) => Expr::Literal(Literal::Int(value)),
                None => Expr::Other(self.text(node)),
            },
            "float" => match self.text(node).replace('_', "").parse::<f64>() {
                Ok(value) => Expr::Literal(Literal::Float(value)),
                Err(_) => Expr::Other(self.text(node)),
            },
            "boolean" => Expr::Literal(Literal::Bool(self.text(node).eq_ignore_ascii_case("true"))),
            "null" => Expr::Literal(Literal::Null),
            "variable_name" => Expr::Variable(self.text(node).trim_start_matches('$').to_string()),
            "name" | "qualified_name" => {
                let text = self.text(node);
                match text.to_ascii_lowercase().as_str() {
                    "true" => Expr::Literal(Literal::Bool(true)),
                    "false" => Expr::Literal(Literal::Bool(false)),
                    "null" => Expr::Literal(Literal::Null),
                    _ => Expr::Constant(trim_ns(&text)),
                }
            }
            "array_creation_expression" => Expr::Array(self.lower_array_items(node)),
            "assignment_expression" | "reference_assignment_expression" => {
                let kids = named_children(node);
                let (Some(target), Some(value)) = (
                    node.child_by_field_name("left").or_else(|| kids.first().copied()),
                    node.child_by_field_name("right").or_else(|| kids.last().copied()),
                ) else {
                    return Expr::Other(self.text(node));
                };
                Expr::Assign {
                    target: Box::new(self.lower_expr(target)),
                    op: None,
                    value: Box::new(self.lower_expr(value)),
                }
            }
            "augmented_assignment_expression" => {
                let kids = named_children(node);
                let (Some(target), Some(value)) = (
                    node.child_by_field_name("left").or_else(|| kids.first().copied()),
                    node.child_by_field_name("right").or_else(|| kids.last().copied()),
                ) else {
                    return Expr::Other(self.text(node));
                };
                Expr::Assign {
                    target: Box::new(self.lower_expr(target)),
                    op: Some(self.operator_text(node)),
                    value: Box::new(self.lower_expr(value)),
                }
            }
            "binary_expression" => {
                let kids = named_children(node);
                let (Some(left), Some(right)) = (
                    node.child_by_field_name("left").or_else(|| kids.first().copied()),
                    node.child_by_field_name("right").or_else(|| kids.last().copied()),
                ) else {
                    return Expr::Other(self.text(node));
                };
                Expr::Binary {
                    op: self.operator_text(node).to_ascii_lowercase(),
                    left: Box::new(self.lower_expr(left)),
                    right: Box::new(self.lower_expr(right)),
                }
            }
            "unary_op_expression" => {
                let Some(operand) = node
                    .child_by_field_name("argument")
                    .or_else(|| node.child_by_field_name("operand"))
                    .or_else(|| named_children(node).into_iter().last())
                else {
                    return Expr::Other(self.text(node));
                };
                Expr::Unary {
                    op: self.operator_text(node),
                    operand: Box::new(self.lower_expr(operand)),
                }
            }
            "conditional_expression" => self.lower_conditional(node),
            "function_call_expression" => Expr::Call {
                function: node
                    .child_by_field_name("function")
                    .map(|f| trim_ns(&self.text(f)))
                    .unwrap_or_default(),
                args: self.lower_args_field(node),
            },
            "member_call_expression" | "nullsafe_member_call_expression" => {
                let Some(object) = node.child_by_field_name("object") else {
                    return Expr::Other(self.text(node));
                };
                Expr::MethodCall {
                    object: Box::new(self.lower_expr(object)),
                    method: node
                        .child_by_field_name("name")
                        .map(|n| self.text(n))
                        .unwrap_or_default(),
                    args: self.lower_args_field(node),
                    nullsafe: node.kind() == "nullsafe_member_call_expression",
                }
            }
            "scoped_call_expression" => Expr::StaticCall {
                class: node
                    .child_by_field_name("scope")
                    .map(|s| self.text(s).trim().to_string())
                    .unwrap_or_default(),
                method: node
                    .child_by_field_name("name")
                    .map(|n| self.text(n))
                    .unwrap_or_default(),
                args: self.lower_args_field(node),
            },
            "member_access_expression" | "nullsafe_member_access_expression" => {
                let Some(object) = node.child_by_field_name("object") else {
                    return Expr::Other(self.text(node));
                };
                Expr::PropertyFetch {
                    object: Box::new(self.lower_expr(object)),
                    property: node
                        .child_by_field_name("name")
                        .map(|n| self.text(n))
                        .unwrap_or_default(),
                    nullsafe: node.kind() == "nullsafe_member_access_expression",
                }
            }
            "scoped_property_access_expression" => Expr::StaticProperty {
                class: node
                    .child_by_field_name("scope")
                    .map(|s| self.text(s).trim().to_string())
                    .unwrap_or_default(),
                property: node
                    .child_by_field_name("name")
                    .map(|n| self.text(n).trim_start_matches('$').to_string())
                    .unwrap_or_default(),
            },
            "class_constant_access_expression" => {
                let text = self.text(node);
                match text.rfind("::") {
                    Some(idx) => Expr::ClassConst {
                        class: text[..idx].trim().to_string(),
                        constant: text[idx + 2..].trim().to_string(),
                    },
                    None => Expr::Other(text),
                }
            }
            "object_creation_expression" => {
                let kids = named_children(node);
                let args = kids
                    .iter()
                    .find(|k| k.kind() == "arguments")
                    .map(|a| self.lower_args(*a))
                    .unwrap_or_default();
                let class = kids
                    .iter()
                    .find(|k| !matches!(k.kind(), "arguments" | "attribute_list"))
                    .map(|k| {
                        if k.kind() == "anonymous_class" {
                            "class@anonymous".to_string()
                        } else {
                            self.text(*k).trim().to_string()
                        }
                    })
                    .unwrap_or_default();
                Expr::New { class, args }
            }
            "anonymous_function" | "anonymous_function_creation_expression" => Expr::Closure {
                params: node
                    .child_by_field_name("parameters")
                    .map(|p| self.lower_params(p))
                    .unwrap_or_default(),
                body: node
                    .child_by_field_name("body")
                    .map(|b| self.lower_block(b))
                    .unwrap_or_default(),
            },
            "arrow_function" => {
                let Some(body) = node.child_by_field_name("body") else {
                    return Expr::Other(self.text(node));
                };
                Expr::ArrowFn {
                    params: node
                        .child_by_field_name("parameters")
                        .map(|p| self.lower_params(p))
                        .unwrap_or_default(),
                    body: Box::new(self.lower_expr(body)),
                }
            }
            "match_expression" => self.lower_match(node),
            "cast_expression" => {
                let kids = named_children(node);
                let (Some(to), Some(value)) = (
                    node.child_by_field_name("type").or_else(|| kids.first().copied()),
                    node.child_by_field_name("value").or_else(|| kids.last().copied()),
                ) else {
                    return Expr::Other(self.text(node));
                };
                Expr::Cast {
                    to: self
                        .text(to)
                        .trim_matches(|c| c == '(' || c == ')' || c == ' ')
                        .to_ascii_lowercase(),
                    expr: Box::new(self.lower_expr(value)),
                }
            }
            "subscript_expression" => {
                let kids = named_children(node);
                let Some(target) = kids.first() else {
                    return Expr::Other(self.text(node));
                };
                Expr::Index {
                    target: Box::new(self.lower_expr(*target)),
                    index: kids.get(1).map(|i| Box::new(self.lower_expr(*i))),
                }
            }
            _ => Expr::Other(self.text(node)),
        }
    }

    fn operator_text(&self, node: Node) -> String {
        if let Some(op) = node.child_by_field_name("operator") {
            return self.text(op);
        }
        all_children(node)
            .into_iter()
            .find(|c| !c.is_named())
            .map(|c| c.kind().to_string())
            .unwrap_or_default()
    }

    fn lower_conditional(&self, node: Node) -> Expr {
        let kids = named_children(node);
        let condition = node
            .child_by_field_name("condition")
            .or_else(|| kids.first().copied());
        let alternative = node
            .child_by_field_name("alternative")
            .or_else(|| kids.last().copied());
        let body = node
            .child_by_field_name("body")
            .or_else(|| if kids.len() == 3 { kids.get(1).copied() } else { None });

        match (condition, alternative) {
            (Some(condition), Some(alternative)) => Expr::Ternary {
                condition: Box::new(self.lower_expr(condition)),
                then: body.map(|b| Box::new(self.lower_expr(b))),
                otherwise: Box::new(self.lower_expr(alternative)),
            },
            _ => Expr::Other(self.text(node)),
        }
    }

    fn lower_match(&self, node: Node) -> Expr {
        let kids = named_children(node);
        let subject = node
            .child_by_field_name("condition")
            .or_else(|| kids.first().copied())
            .map(|c| self.lower_expr(c))
            .unwrap_or_else(|| Expr::Other(String::new()));
        let block = node
            .child_by_field_name("body")
            .or_else(|| kids.iter().copied().find(|k| k.kind() == "match_block"));

        let mut arms = Vec::new();
        if let Some(block) = block {
            for arm in named_children(block) {
                let parts = named_children(arm);
                match arm.kind() {
                    "match_conditional_expression" => {
                        let conditions = arm
                            .child_by_field_name("conditional_expressions")
                            .or_else(|| parts.first().copied())
                            .map(|list| {
                                named_children(list)
                                    .into_iter()
                                    .map(|c| self.lower_expr(c))
                                    .collect()
                            })
                            .unwrap_or_default();
                        if let Some(body) = arm
                            .child_by_field_name("return_expression")
                            .or_else(|| parts.last().copied())
                        {
                            arms.push(MatchArm {
                                conditions: Some(conditions),
                                body: self.lower_expr(body),
                            });
                        }
                    }
                    "match_default_expression" => {
                        if let Some(body) = arm
                            .child_by_field_name("return_expression")
                            .or_else(|| parts.last().copied())
                        {
                            arms.push(MatchArm {
                                conditions: None,
                                body: self.lower_expr(body),
                            });
                        }
                    }
                    _ => {}
                }
            }
        }

        Expr::Match {
            subject: Box::new(subject),
            arms,
        }
    }

    fn lower_array_items(&self, node: Node) -> Vec<ArrayItem> {
        named_children(node)
            .into_iter()
            .filter(|item| item.kind() == "array_element_initializer")
            .filter_map(|item| {
                let kids: Vec<Node> = named_children(item)
                    .into_iter()
                    .filter(|k| k.kind() != "by_ref")
                    .collect();
                let first = kids.first()?;
                if first.kind() == "variadic_unpacking" {
                    let inner = named_children(*first).into_iter().next()?;
                    return Some(ArrayItem {
                        key: None,
                        value: self.lower_expr(inner),
                        spread: true,
                    });
                }
                let value = kids.last()?;
                let key = if has_token(item, "=>") && kids.len() >= 2 {
                    Some(self.lower_expr(*first))
                } else {
                    None
                };
                Some(ArrayItem {
                    key,
                    value: self.lower_expr(*value),
                    spread: false,
                })
            })
            .collect()
    }

    fn lower_args_field(&self, node: Node) -> Vec<Arg> {
        node.child_by_field_name("arguments")
            .or_else(|| {
                named_children(node)
                    .into_iter()
                    .find(|c| c.kind() == "arguments")
            })
            .map(|a| self.lower_args(a))
            .unwrap_or_default()
    }

    fn lower_args(&self, node: Node) -> Vec<Arg> {
        let mut args = Vec::new();
        for arg in named_children(node) {
            match arg.kind() {
                "argument" => {
                    let name_node = arg.child_by_field_name("name").or_else(|| {
                        let parts = named_children(arg);
                        if parts.len() >= 2 && parts[0].kind() == "name" && has_token(arg, ":") {
                            Some(parts[0])
                        } else {
                            None
                        }
                    });
                    let parts: Vec<Node> = named_children(arg)
                        .into_iter()
                        .filter(|p| Some(p.id()) != name_node.map(|n| n.id()))
                        .filter(|p| p.kind() != "reference_modifier")
                        .collect();
                    let Some(inner) = parts.last() else {
                        continue;
                    };
                    let name = name_node.map(|n| self.text(n));
                    if inner.kind() == "variadic_unpacking" {
                        if let Some(spread) = named_children(*inner).into_iter().next() {
                            args.push(Arg {
                                name,
                                value: self.lower_expr(spread),
                                spread: true,
                            });
                        }
                    } else {
                        args.push(Arg {
                            name,
                            value: self.lower_expr(*inner),
                            spread: false,
                        });
                    }
                }
                "variadic_placeholder" => {}
                _ => args.push(Arg::positional(self.lower_expr(arg))),
            }
        }
        args
    }
}

fn strip_quotes(raw: &str, quote: char) -> &str {
    let raw = raw.trim_start_matches(['b', 'B']);
    if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
        &raw[1..raw.len() - 1]
    } else {
        raw
    }
}

/// Decode a single-quoted PHP string literal (only `\'` and `\\` are escapes)
pub(crate) fn decode_single_quoted(raw: &str) -> String {
    let inner = strip_quotes(raw, '\'');
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next @ ('\'' | '\\')) = chars.peek() {
                out.push(next);
                chars.next();
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Decode a double-quoted PHP string without interpolation
pub(crate) fn decode_double_quoted(raw: &str) -> String {
    let inner = strip_quotes(raw, '"');
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let replacement = match chars.peek() {
            Some('n') => Some('\n'),
            Some('t') => Some('\t'),
            Some('r') => Some('\r'),
            Some('v') => Some('\u{0B}'),
            Some('e') => Some('\u{1B}'),
            Some('f') => Some('\u{0C}'),
            Some('0') => Some('\0'),
            Some('\\') => Some('\\'),
            Some('$') => Some('$'),
            Some('"') => Some('"'),
            _ => None,
        };
        match replacement {
            Some(r) => {
                out.push(r);
                chars.next();
            }
            None => out.push('\\'),
        }
    }
    out
}

fn parse_int(raw: &str) -> Option<i64> {
    let cleaned = raw.replace('_', "");
    let lower = cleaned.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else if lower.len() > 1 && lower.starts_with('0') {
        i64::from_str_radix(&lower[1..], 8).ok()
    } else {
        lower.parse().ok()
    }
}
