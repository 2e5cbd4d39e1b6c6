use crate::language::ast::*;

pub fn format_program(program: &Program) -> String {
    let mut out = String::new();
    for (idx, class) in program.classes.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        format_class(&mut out, class);
    }
    out
}

fn format_class(out: &mut String, class: &Class) {
    out.push_str(&format!("class {}", class.name));
    if let Some(parent) = &class.parent {
        out.push_str(&format!(" inherits {}", parent));
    }
    out.push_str(" {\n");
    for feature in &class.features {
        match feature {
            Feature::Attribute(attr) => format_attribute(out, attr),
            Feature::Method(method) => format_method(out, method),
        }
    }
    out.push_str("};\n");
}

fn format_attribute(out: &mut String, attr: &AttrDecl) {
    out.push_str(&format!("  {} : {}", attr.name, attr.ty));
    if let Some(init) = &attr.init {
        out.push_str(&format!(" <- {}", format_expr(init, 2)));
    }
    out.push_str(";\n");
}

fn format_method(out: &mut String, method: &MethodDecl) {
    let params = method
        .params
        .iter()
        .map(|param| format!("{} : {}", param.name, param.ty))
        .collect::<Vec<_>>()
        .join(", ");
    out.push_str(&format!(
        "  {}({}) : {} {{\n",
        method.name, params, method.return_type
    ));
    out.push_str(&format!("    {}\n", format_expr(&method.body, 4)));
    out.push_str("  };\n");
}

/// Renders `expr` as if it started on a line indented by `indent` spaces.
fn format_expr(expr: &Expr, indent: usize) -> String {
    let pad = " ".repeat(indent);
    let inner = " ".repeat(indent + 2);
    match &expr.kind {
        ExprKind::Assign { name, value } => format!("{} <- {}", name, format_expr(value, indent)),
        ExprKind::Dispatch {
            receiver,
            method,
            args,
        } => {
            let args = format_args(args, indent);
            match receiver {
                Some(receiver) => format!("{}.{}({})", format_expr(receiver, indent), method, args),
                None => format!("{}({})", method, args),
            }
        }
        ExprKind::StaticDispatch {
            receiver,
            ancestor,
            method,
            args,
        } => format!(
            "{}@{}.{}({})",
            format_expr(receiver, indent),
            ancestor,
            method,
            format_args(args, indent)
        ),
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => format!(
            "if {} then {} else {} fi",
            format_expr(cond, indent),
            format_expr(then_branch, indent),
            format_expr(else_branch, indent)
        ),
        ExprKind::While { cond, body } => format!(
            "while {} loop {} pool",
            format_expr(cond, indent),
            format_expr(body, indent)
        ),
        ExprKind::Let { bindings, body } => {
            let bindings = bindings
                .iter()
                .map(|binding| {
                    let mut text = format!("{} : {}", binding.name, binding.ty);
                    if let Some(init) = &binding.init {
                        text.push_str(&format!(" <- {}", format_expr(init, indent)));
                    }
                    text
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("let {} in {}", bindings, format_expr(body, indent))
        }
        ExprKind::Case { scrutinee, arms } => {
            let mut text = format!("case {} of\n", format_expr(scrutinee, indent));
            for arm in arms {
                text.push_str(&format!(
                    "{}{} : {} => {};\n",
                    inner,
                    arm.name,
                    arm.ty,
                    format_expr(&arm.body, indent + 2)
                ));
            }
            text.push_str(&format!("{}esac", pad));
            text
        }
        ExprKind::Block(exprs) => {
            let mut text = String::from("{\n");
            for expr in exprs {
                text.push_str(&format!("{}{};\n", inner, format_expr(expr, indent + 2)));
            }
            text.push_str(&format!("{}}}", pad));
            text
        }
        ExprKind::Binary { op, left, right } => format!(
            "{} {} {}",
            format_expr(left, indent),
            op.symbol(),
            format_expr(right, indent)
        ),
        ExprKind::Unary { op, expr } => match op {
            UnaryOp::Not => format!("not {}", format_expr(expr, indent)),
            UnaryOp::Negate => format!("~{}", format_expr(expr, indent)),
            UnaryOp::IsVoid => format!("isvoid {}", format_expr(expr, indent)),
        },
        ExprKind::New(ty) => format!("new {}", ty),
        ExprKind::Paren(inner) => format!("({})", format_expr(inner, indent)),
        ExprKind::Identifier(name) => name.clone(),
        ExprKind::Integer(value) => value.to_string(),
        ExprKind::String(value) => format!("\"{}\"", escape(value)),
        ExprKind::Bool(value) => value.to_string(),
    }
}

fn format_args(args: &[Expr], indent: usize) -> String {
    args.iter()
        .map(|arg| format_expr(arg, indent))
        .collect::<Vec<_>>()
        .join(", ")
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out
}
