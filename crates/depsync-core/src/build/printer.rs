//! Canonical serialization of build-file statements.
//!
//! Output is deterministic: rule calls (any call with keyword arguments)
//! render one attribute per line with trailing commas; purely positional
//! calls such as `subinclude(...)` stay on one line; short lists stay
//! inline and long ones break one element per line.

use super::ast::{BinOp, CallExpr, Expr, Stmt};

const INDENT: &str = "    ";

/// Longest inline rendering for a list before it breaks across lines.
const MAX_INLINE: usize = 60;

/// Serialize a whole file.
pub fn print_file(stmts: &[Stmt]) -> String {
    let rendered: Vec<String> = stmts.iter().map(|s| print_stmt(s, 0)).collect();
    let mut out = rendered.join("\n\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn print_stmt(stmt: &Stmt, depth: usize) -> String {
    match stmt {
        Stmt::Call(call) => print_call(call, depth),
        Stmt::Assign { name, value } => format!("{name} = {}", print_expr(value, depth)),
        Stmt::Expr(expr) => print_expr(expr, depth),
    }
}

fn print_call(call: &CallExpr, depth: usize) -> String {
    if call.args.is_empty() {
        return format!("{}()", call.name);
    }

    if call.args.iter().all(|a| a.name.is_none()) {
        let args: Vec<String> = call
            .args
            .iter()
            .map(|a| print_expr(&a.value, depth))
            .collect();
        return format!("{}({})", call.name, args.join(", "));
    }

    let outer = INDENT.repeat(depth);
    let inner = INDENT.repeat(depth + 1);
    let mut out = format!("{}(\n", call.name);
    for arg in &call.args {
        let value = print_expr(&arg.value, depth + 1);
        match &arg.name {
            Some(name) => out.push_str(&format!("{inner}{name} = {value},\n")),
            None => out.push_str(&format!("{inner}{value},\n")),
        }
    }
    out.push_str(&format!("{outer})"));
    out
}

fn print_expr(expr: &Expr, depth: usize) -> String {
    match expr {
        Expr::Str(s) => quote(s),
        Expr::Int(n) => n.to_string(),
        Expr::Bool(true) => "True".to_string(),
        Expr::Bool(false) => "False".to_string(),
        Expr::None => "None".to_string(),
        Expr::Ident(name) => name.clone(),
        Expr::List(items) => print_list(items, depth),
        Expr::Dict(entries) => print_dict(entries, depth),
        Expr::Call(call) => print_call(call, depth),
        Expr::Binary { op, lhs, rhs } => {
            let op = match op {
                BinOp::Add => "+",
                BinOp::Sub => "-",
            };
            format!(
                "{} {op} {}",
                print_expr(lhs, depth),
                print_expr(rhs, depth)
            )
        }
    }
}

fn print_list(items: &[Expr], depth: usize) -> String {
    let rendered: Vec<String> = items.iter().map(|e| print_expr(e, depth + 1)).collect();
    let inline = format!("[{}]", rendered.join(", "));
    let breaks = rendered.len() > 1
        && (inline.len() > MAX_INLINE
            || items
                .iter()
                .any(|e| matches!(e, Expr::Call(_) | Expr::Dict(_))));
    if !breaks {
        return inline;
    }

    let outer = INDENT.repeat(depth);
    let inner = INDENT.repeat(depth + 1);
    let mut out = "[\n".to_string();
    for item in rendered {
        out.push_str(&format!("{inner}{item},\n"));
    }
    out.push_str(&format!("{outer}]"));
    out
}

fn print_dict(entries: &[(Expr, Expr)], depth: usize) -> String {
    let rendered: Vec<String> = entries
        .iter()
        .map(|(k, v)| format!("{}: {}", print_expr(k, depth + 1), print_expr(v, depth + 1)))
        .collect();
    let inline = format!("{{{}}}", rendered.join(", "));
    if inline.len() <= MAX_INLINE {
        return inline;
    }

    let outer = INDENT.repeat(depth);
    let inner = INDENT.repeat(depth + 1);
    let mut out = "{\n".to_string();
    for entry in rendered {
        out.push_str(&format!("{inner}{entry},\n"));
    }
    out.push_str(&format!("{outer}}}"));
    out
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
