//! Printing - pure rendering of the Cypher IR to query text.
//!
//! Printing never consults request state: identical trees print identical
//! text, which is what makes snapshot assertions on generated Cypher
//! reliable. Identifiers are backtick-escaped unless they are plain
//! identifiers; values only ever appear as `$param` references or
//! engine-controlled literals.

use super::ast::{
    Clause, Expr, Literal, MapProjectionItem, NodePattern, Pattern, PatternDirection, Projection,
    ProjectionEntry, RelationshipPattern, SetItem, Statement,
};

/// Render a statement to query text.
pub fn print_statement(statement: &Statement) -> String {
    let mut out = String::new();
    print_clauses(&statement.clauses, 0, &mut out);
    out
}

/// Render a standalone expression (used by tests and diagnostics).
pub fn print_expression(expr: &Expr) -> String {
    let mut out = String::new();
    print_expr(expr, &mut out);
    out
}

/// Backtick-escape an identifier unless it is a safe plain identifier.
pub fn escape_identifier(name: &str) -> String {
    let mut chars = name.chars();
    let safe = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if safe {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

fn print_clauses(clauses: &[Clause], indent: usize, out: &mut String) {
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        print_clause(clause, indent, out);
    }
}

fn pad(indent: usize, out: &mut String) {
    for _ in 0..indent {
        out.push_str("    ");
    }
}

fn print_clause(clause: &Clause, indent: usize, out: &mut String) {
    match clause {
        Clause::Match {
            pattern,
            optional,
            where_clause,
        } => {
            pad(indent, out);
            if *optional {
                out.push_str("OPTIONAL ");
            }
            out.push_str("MATCH ");
            print_pattern(pattern, out);
            if let Some(predicate) = where_clause {
                out.push('\n');
                pad(indent, out);
                out.push_str("WHERE ");
                print_expr(predicate, out);
            }
        }
        Clause::Create { pattern } => {
            pad(indent, out);
            out.push_str("CREATE ");
            print_pattern(pattern, out);
        }
        Clause::Merge { pattern, on_create } => {
            pad(indent, out);
            out.push_str("MERGE ");
            print_pattern(pattern, out);
            if !on_create.is_empty() {
                out.push('\n');
                pad(indent, out);
                out.push_str("ON CREATE SET ");
                print_set_items(on_create, out);
            }
        }
        Clause::Set(items) => {
            pad(indent, out);
            out.push_str("SET ");
            print_set_items(items, out);
        }
        Clause::Delete { detach, targets } => {
            pad(indent, out);
            if *detach {
                out.push_str("DETACH ");
            }
            out.push_str("DELETE ");
            for (i, target) in targets.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                print_expr(target, out);
            }
        }
        Clause::With(projection) => print_projection("WITH", projection, indent, out),
        Clause::Return(projection) => print_projection("RETURN", projection, indent, out),
        Clause::Unwind { list, alias } => {
            pad(indent, out);
            out.push_str("UNWIND ");
            print_expr(list, out);
            out.push_str(" AS ");
            out.push_str(&escape_identifier(alias));
        }
        Clause::Call { imports, body } => {
            pad(indent, out);
            out.push_str("CALL {");
            out.push('\n');
            if !imports.is_empty() {
                pad(indent + 1, out);
                out.push_str("WITH ");
                for (i, import) in imports.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&escape_identifier(import));
                }
                out.push('\n');
            }
            print_clauses(body, indent + 1, out);
            out.push('\n');
            pad(indent, out);
            out.push('}');
        }
        Clause::Union { all, branches } => {
            for (i, branch) in branches.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                    pad(indent, out);
                    out.push_str(if *all { "UNION ALL" } else { "UNION" });
                    out.push('\n');
                }
                print_clauses(branch, indent, out);
            }
        }
        Clause::Foreach {
            variable,
            list,
            body,
        } => {
            pad(indent, out);
            out.push_str("FOREACH (");
            out.push_str(&escape_identifier(variable));
            out.push_str(" IN ");
            print_expr(list, out);
            out.push_str(" | ");
            for (i, inner) in body.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                let mut piece = String::new();
                print_clause(inner, 0, &mut piece);
                // FOREACH bodies are single-line.
                out.push_str(&piece.replace('\n', " "));
            }
            out.push(')');
        }
        Clause::Raw(text) => {
            for (i, line) in text.lines().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                pad(indent, out);
                out.push_str(line);
            }
        }
    }
}

fn print_projection(keyword: &str, projection: &Projection, indent: usize, out: &mut String) {
    pad(indent, out);
    out.push_str(keyword);
    if projection.distinct {
        out.push_str(" DISTINCT");
    }
    out.push(' ');
    for (i, ProjectionEntry { expr, alias }) in projection.items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        print_expr(expr, out);
        if let Some(alias) = alias {
            out.push_str(" AS ");
            out.push_str(&escape_identifier(alias));
        }
    }
    if let Some(predicate) = &projection.where_clause {
        out.push('\n');
        pad(indent, out);
        out.push_str("WHERE ");
        print_expr(predicate, out);
    }
    if !projection.order_by.is_empty() {
        out.push('\n');
        pad(indent, out);
        out.push_str("ORDER BY ");
        for (i, item) in projection.order_by.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            print_expr(&item.expr, out);
            out.push_str(if item.descending { " DESC" } else { " ASC" });
        }
    }
    if let Some(skip) = &projection.skip {
        out.push('\n');
        pad(indent, out);
        out.push_str("SKIP ");
        print_expr(skip, out);
    }
    if let Some(limit) = &projection.limit {
        out.push('\n');
        pad(indent, out);
        out.push_str("LIMIT ");
        print_expr(limit, out);
    }
}

fn print_set_items(items: &[SetItem], out: &mut String) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match item {
            SetItem::Property { target, key, value } => {
                out.push_str(&escape_identifier(target));
                out.push('.');
                out.push_str(&escape_identifier(key));
                out.push_str(" = ");
                print_expr(value, out);
            }
            SetItem::Labels { target, labels } => {
                out.push_str(&escape_identifier(target));
                for label in labels {
                    out.push(':');
                    out.push_str(&escape_identifier(label));
                }
            }
        }
    }
}

fn print_pattern(pattern: &Pattern, out: &mut String) {
    print_node(&pattern.start, out);
    for (rel, node) in &pattern.segments {
        print_relationship(rel, out);
        print_node(node, out);
    }
}

fn print_node(node: &NodePattern, out: &mut String) {
    out.push('(');
    if let Some(variable) = &node.variable {
        out.push_str(&escape_identifier(variable));
    }
    for label in &node.labels {
        out.push(':');
        out.push_str(&escape_identifier(label));
    }
    if !node.properties.is_empty() {
        out.push_str(" { ");
        print_property_map(&node.properties, out);
        out.push_str(" }");
    }
    out.push(')');
}

fn print_relationship(rel: &RelationshipPattern, out: &mut String) {
    out.push_str(match rel.direction {
        PatternDirection::Incoming => "<-[",
        _ => "-[",
    });
    if let Some(variable) = &rel.variable {
        out.push_str(&escape_identifier(variable));
    }
    if let Some(rel_type) = &rel.rel_type {
        out.push(':');
        out.push_str(&escape_identifier(rel_type));
    }
    if !rel.properties.is_empty() {
        out.push_str(" { ");
        print_property_map(&rel.properties, out);
        out.push_str(" }");
    }
    out.push_str(match rel.direction {
        PatternDirection::Outgoing => "]->",
        _ => "]-",
    });
}

fn print_property_map(properties: &[(String, Expr)], out: &mut String) {
    for (i, (key, value)) in properties.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&escape_identifier(key));
        out.push_str(": ");
        print_expr(value, out);
    }
}

fn needs_parens(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::BinaryOp { .. } | Expr::Case { .. } | Expr::IsNull(_) | Expr::IsNotNull(_)
    )
}

fn print_operand(expr: &Expr, out: &mut String) {
    if needs_parens(expr) {
        out.push('(');
        print_expr(expr, out);
        out.push(')');
    } else {
        print_expr(expr, out);
    }
}

fn print_expr(expr: &Expr, out: &mut String) {
    match expr {
        Expr::Variable(name) => out.push_str(&escape_identifier(name)),
        Expr::Param(name) => {
            out.push('$');
            out.push_str(name);
        }
        Expr::Literal(literal) => print_literal(literal, out),
        Expr::Property { base, key } => {
            print_operand(base, out);
            out.push('.');
            out.push_str(&escape_identifier(key));
        }
        Expr::Func { name, args } => {
            out.push_str(name);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                print_expr(arg, out);
            }
            out.push(')');
        }
        Expr::BinaryOp { lhs, op, rhs } => {
            print_operand(lhs, out);
            out.push(' ');
            out.push_str(op.as_str());
            out.push(' ');
            print_operand(rhs, out);
        }
        Expr::And(parts) => {
            out.push('(');
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push_str(" AND ");
                }
                print_expr(part, out);
            }
            out.push(')');
        }
        Expr::Or(parts) => {
            out.push('(');
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push_str(" OR ");
                }
                print_expr(part, out);
            }
            out.push(')');
        }
        Expr::Not(inner) => {
            out.push_str("NOT (");
            print_expr(inner, out);
            out.push(')');
        }
        Expr::IsNull(inner) => {
            print_operand(inner, out);
            out.push_str(" IS NULL");
        }
        Expr::IsNotNull(inner) => {
            print_operand(inner, out);
            out.push_str(" IS NOT NULL");
        }
        Expr::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                print_expr(item, out);
            }
            out.push(']');
        }
        Expr::Map(entries) => {
            out.push_str("{ ");
            for (i, (key, value)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&escape_identifier(key));
                out.push_str(": ");
                print_expr(value, out);
            }
            out.push_str(" }");
        }
        Expr::MapProjection { variable, items } => {
            out.push_str(&escape_identifier(variable));
            out.push_str(" { ");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match item {
                    MapProjectionItem::Property { key } => {
                        out.push('.');
                        out.push_str(&escape_identifier(key));
                    }
                    MapProjectionItem::Computed { alias, value } => {
                        out.push_str(&escape_identifier(alias));
                        out.push_str(": ");
                        print_expr(value, out);
                    }
                }
            }
            out.push_str(" }");
        }
        Expr::ListComprehension {
            variable,
            list,
            predicate,
            map,
        } => {
            out.push('[');
            out.push_str(&escape_identifier(variable));
            out.push_str(" IN ");
            print_expr(list, out);
            if let Some(predicate) = predicate {
                out.push_str(" WHERE ");
                print_expr(predicate, out);
            }
            if let Some(map) = map {
                out.push_str(" | ");
                print_expr(map, out);
            }
            out.push(']');
        }
        Expr::PatternComprehension {
            pattern,
            predicate,
            map,
        } => {
            out.push('[');
            print_pattern(pattern, out);
            if let Some(predicate) = predicate {
                out.push_str(" WHERE ");
                print_expr(predicate, out);
            }
            out.push_str(" | ");
            print_expr(map, out);
            out.push(']');
        }
        Expr::Slice { list, from, to } => {
            print_operand(list, out);
            out.push('[');
            if let Some(from) = from {
                print_expr(from, out);
            }
            out.push_str("..");
            if let Some(to) = to {
                print_expr(to, out);
            }
            out.push(']');
        }
        Expr::Index { list, index } => {
            print_operand(list, out);
            out.push('[');
            print_expr(index, out);
            out.push(']');
        }
        Expr::Case { when, then, alt } => {
            out.push_str("CASE WHEN ");
            print_expr(when, out);
            out.push_str(" THEN ");
            print_expr(then, out);
            out.push_str(" ELSE ");
            print_expr(alt, out);
            out.push_str(" END");
        }
    }
}

fn print_literal(literal: &Literal, out: &mut String) {
    match literal {
        Literal::Null => out.push_str("NULL"),
        Literal::Boolean(true) => out.push_str("true"),
        Literal::Boolean(false) => out.push_str("false"),
        Literal::Integer(value) => out.push_str(&value.to_string()),
        Literal::Float(value) => out.push_str(&value.to_string()),
        Literal::String(value) => {
            out.push('\'');
            out.push_str(&value.replace('\\', "\\\\").replace('\'', "\\'"));
            out.push('\'');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::ast::{BinaryOperator, OrderItem};

    fn simple_match() -> Statement {
        let mut stmt = Statement::new();
        stmt.push(Clause::Match {
            pattern: Pattern::node(NodePattern::with_labels("this", vec!["Movie".to_string()])),
            optional: false,
            where_clause: Some(Expr::binary(
                Expr::prop("this", "title"),
                BinaryOperator::Eq,
                Expr::Param("param0".to_string()),
            )),
        });
        stmt.push(Clause::Return(Projection::aliased(
            Expr::MapProjection {
                variable: "this".to_string(),
                items: vec![MapProjectionItem::Property {
                    key: "title".to_string(),
                }],
            },
            "this",
        )));
        stmt
    }

    #[test]
    fn test_print_simple_match() {
        let text = print_statement(&simple_match());
        assert_eq!(
            text,
            "MATCH (this:Movie)\nWHERE this.title = $param0\nRETURN this { .title } AS this"
        );
    }

    #[test]
    fn test_printing_is_idempotent() {
        let stmt = simple_match();
        assert_eq!(print_statement(&stmt), print_statement(&stmt));
    }

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("title"), "title");
        assert_eq!(escape_identifier("movie title"), "`movie title`");
        assert_eq!(escape_identifier("a`b"), "`a``b`");
        assert_eq!(escape_identifier("1st"), "`1st`");
    }

    #[test]
    fn test_call_subquery_indentation() {
        let mut stmt = Statement::new();
        stmt.push(Clause::Call {
            imports: vec!["this".to_string()],
            body: vec![Clause::Return(Projection::aliased(
                Expr::func("count", vec![Expr::var("this")]),
                "total",
            ))],
        });
        let text = print_statement(&stmt);
        assert_eq!(
            text,
            "CALL {\n    WITH this\n    RETURN count(this) AS total\n}"
        );
    }

    #[test]
    fn test_order_by_skip_limit() {
        let mut stmt = Statement::new();
        stmt.push(Clause::Return(Projection {
            items: vec![ProjectionEntry {
                expr: Expr::var("this"),
                alias: None,
            }],
            order_by: vec![OrderItem {
                expr: Expr::prop("this", "title"),
                descending: true,
            }],
            skip: Some(Expr::Param("param0".to_string())),
            limit: Some(Expr::Param("param1".to_string())),
            ..Default::default()
        }));
        let text = print_statement(&stmt);
        assert_eq!(
            text,
            "RETURN this\nORDER BY this.title DESC\nSKIP $param0\nLIMIT $param1"
        );
    }

    #[test]
    fn test_foreach_single_line() {
        let mut stmt = Statement::new();
        stmt.push(Clause::Foreach {
            variable: "_".to_string(),
            list: Expr::Case {
                when: Box::new(Expr::IsNull(Box::new(Expr::var("this1")))),
                then: Box::new(Expr::List(vec![])),
                alt: Box::new(Expr::List(vec![Expr::int(1)])),
            },
            body: vec![Clause::Merge {
                pattern: Pattern::hop(
                    NodePattern {
                        variable: Some("this0".to_string()),
                        ..Default::default()
                    },
                    RelationshipPattern::typed("ACTED_IN", PatternDirection::Incoming),
                    NodePattern {
                        variable: Some("this1".to_string()),
                        ..Default::default()
                    },
                ),
                on_create: vec![],
            }],
        });
        let text = print_statement(&stmt);
        assert!(text.starts_with("FOREACH (_ IN CASE WHEN this1 IS NULL THEN [] ELSE [1] END | "));
        assert!(text.contains("MERGE (this0)<-[:ACTED_IN]-(this1)"));
        assert!(!text.contains('\n'));
    }
}
