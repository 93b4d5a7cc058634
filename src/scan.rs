use swc_core::{
    common::{Span, Spanned},
    ecma::{
        ast::*,
        visit::{Visit, VisitWith},
    },
};

use crate::model::{ParamKind, ParamValue, ParameterValue};
use crate::source::ParsedSource;

// -----------------------------------------------------------------------------
// Scanned call sites
// -----------------------------------------------------------------------------

/// What the single argument of `new X(...)` looked like.
#[derive(Debug, Clone, PartialEq)]
pub enum SiteArgs {
    /// `new X()` or `new X({ ... })`.
    Params(Vec<ParameterValue>),
    /// Anything else (non-object argument, several arguments, spread).
    Unsupported,
}

/// One `[await ]new Ident(...)[.action()]` found at a declaration or
/// expression statement, before any registry lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedSite {
    pub binding: Option<String>,
    pub class_name: String,
    pub is_awaited: bool,
    pub has_action_call: bool,
    pub args: SiteArgs,
    /// Byte range of each parameter's source text, parallel to `SiteArgs::Params`.
    pub param_ranges: Vec<(usize, usize)>,
    pub start: usize,
    pub end: usize,
    pub start_line: usize,
    pub end_line: usize,
}

/// Walk `source` in pre-order and return every candidate call site in document order.
pub fn scan_call_sites(source: &ParsedSource<'_>, action_method: &str) -> Vec<ScannedSite> {
    let mut scanner = CallSiteScanner {
        source,
        action_method,
        sites: vec![],
    };
    source.module.visit_with(&mut scanner);
    scanner.sites
}

struct CallSiteScanner<'p, 'a> {
    source: &'p ParsedSource<'a>,
    action_method: &'p str,
    sites: Vec<ScannedSite>,
}

impl<'p, 'a> Visit for CallSiteScanner<'p, 'a> {
    fn visit_var_declarator(&mut self, d: &VarDeclarator) {
        if let Some(init) = &d.init {
            // Destructuring patterns have no single name; they count as anonymous.
            let binding = d.name.as_ident().map(|b| b.id.sym.to_string());
            self.try_record(init, binding);
        }
        d.visit_children_with(self);
    }

    fn visit_expr_stmt(&mut self, n: &ExprStmt) {
        self.try_record(&n.expr, None);
        n.visit_children_with(self);
    }
}

impl<'p, 'a> CallSiteScanner<'p, 'a> {
    fn try_record(&mut self, expr: &Expr, binding: Option<String>) {
        let outer = unwrap_parens(expr);
        let Some((new_expr, is_awaited, has_action_call)) =
            unwrap_instantiation(outer, self.action_method)
        else {
            return;
        };
        let Expr::Ident(callee) = unwrap_parens(&new_expr.callee) else {
            return;
        };
        let span = outer.span();
        let (start, end) = self.source.range(span);
        let (start_line, end_line) = self.source.lines(span);
        let (args, param_ranges) = self.read_args(new_expr);
        self.sites.push(ScannedSite {
            binding,
            class_name: callee.sym.to_string(),
            is_awaited,
            has_action_call,
            args,
            param_ranges,
            start,
            end,
            start_line,
            end_line,
        });
    }

    fn read_args(&self, n: &NewExpr) -> (SiteArgs, Vec<(usize, usize)>) {
        let args = n.args.as_deref().unwrap_or(&[]);
        match args {
            [] => (SiteArgs::Params(vec![]), vec![]),
            [only] if only.spread.is_none() => match unwrap_parens(&only.expr) {
                Expr::Object(obj) => {
                    let (params, ranges) = self.read_object(obj).into_iter().unzip();
                    (SiteArgs::Params(params), ranges)
                }
                _ => (SiteArgs::Unsupported, vec![]),
            },
            _ => (SiteArgs::Unsupported, vec![]),
        }
    }

    fn read_object(&self, obj: &ObjectLit) -> Vec<(ParameterValue, (usize, usize))> {
        let mut out = Vec::with_capacity(obj.props.len());
        for prop in &obj.props {
            let param = match prop {
                PropOrSpread::Prop(p) => match &**p {
                    Prop::KeyValue(kv) => match static_prop_name(&kv.key) {
                        Some(name) => {
                            let span = kv.value.span();
                            let param = ParameterValue::from_source(
                                name,
                                classify(&kv.value),
                                self.source.snippet(span),
                            );
                            (param, self.source.range(span))
                        }
                        None => self.verbatim(p.span()),
                    },
                    Prop::Shorthand(id) => (
                        ParameterValue::from_source(id.sym.to_string(), ParamKind::Unknown, id.sym.to_string()),
                        self.source.range(id.span),
                    ),
                    _ => self.verbatim(p.span()),
                },
                PropOrSpread::Spread(s) => self.verbatim(s.span()),
            };
            out.push(param);
        }
        out
    }

    // Methods, accessors, computed keys and spreads are kept as written.
    fn verbatim(&self, span: Span) -> (ParameterValue, (usize, usize)) {
        let text = self.source.snippet(span).to_string();
        let param = ParameterValue {
            name: text.clone(),
            kind: ParamKind::Unknown,
            value: ParamValue::Property(text),
        };
        (param, self.source.range(span))
    }
}

// -----------------------------------------------------------------------------
// Shape helpers
// -----------------------------------------------------------------------------

fn unwrap_parens(mut e: &Expr) -> &Expr {
    while let Expr::Paren(p) = e {
        e = &p.expr;
    }
    e
}

/// Peel `await` and a trailing `.action()` off `new X(...)`.
fn unwrap_instantiation<'e>(expr: &'e Expr, action_method: &str) -> Option<(&'e NewExpr, bool, bool)> {
    let mut cur = expr;
    let mut is_awaited = false;
    let mut has_action_call = false;

    if let Expr::Await(a) = cur {
        is_awaited = true;
        cur = unwrap_parens(&a.arg);
    }
    if let Expr::Call(c) = cur {
        let Callee::Expr(callee) = &c.callee else {
            return None;
        };
        let Expr::Member(m) = &**callee else {
            return None;
        };
        match &m.prop {
            MemberProp::Ident(p) if p.sym.as_ref() == action_method && c.args.is_empty() => {
                has_action_call = true;
                cur = unwrap_parens(&m.obj);
            }
            _ => return None,
        }
    }
    match cur {
        Expr::New(n) => Some((n, is_awaited, has_action_call)),
        _ => None,
    }
}

fn static_prop_name(key: &PropName) -> Option<String> {
    match key {
        PropName::Ident(i) => Some(i.sym.to_string()),
        PropName::Str(s) => Some(s.value.to_string()),
        PropName::Num(n) => Some(n.value.to_string()),
        _ => None,
    }
}

/// Kind of a parameter value expression, from its syntax alone.
pub fn classify(e: &Expr) -> ParamKind {
    match e {
        Expr::Lit(Lit::Str(_)) | Expr::Tpl(_) => ParamKind::String,
        Expr::Lit(Lit::Num(_)) => ParamKind::Number,
        Expr::Lit(Lit::Bool(_)) => ParamKind::Boolean,
        Expr::Array(_) => ParamKind::Array,
        Expr::Object(_) => ParamKind::Object,
        _ if env_reference_key(e).is_some() => ParamKind::EnvironmentReference,
        _ => ParamKind::Unknown,
    }
}

/// `process.env.KEY`, optionally followed by `!`, `as T` or `satisfies T`.
pub fn env_reference_key(e: &Expr) -> Option<String> {
    match e {
        Expr::TsNonNull(n) => env_reference_key(&n.expr),
        Expr::TsAs(a) => env_reference_key(&a.expr),
        Expr::TsSatisfies(s) => env_reference_key(&s.expr),
        Expr::Paren(p) => env_reference_key(&p.expr),
        Expr::Member(m) => detect_env_member(m),
        _ => None,
    }
}

fn member_key(prop: &MemberProp) -> Option<String> {
    match prop {
        MemberProp::Ident(key) => Some(key.sym.to_string()),
        MemberProp::Computed(c) => match &*c.expr {
            Expr::Lit(Lit::Str(s)) => Some(s.value.to_string()),
            _ => None,
        },
        MemberProp::PrivateName(_) => None,
    }
}

fn detect_env_member(m: &MemberExpr) -> Option<String> {
    let Expr::Member(obj) = &*m.obj else {
        return None;
    };
    let MemberProp::Ident(env) = &obj.prop else {
        return None;
    };
    if env.sym.as_ref() != "env" {
        return None;
    }
    match &*obj.obj {
        // process.env.X
        Expr::Ident(root) if root.sym.as_ref() == "process" => member_key(&m.prop),
        // import.meta.env.X
        Expr::MetaProp(meta) if meta.kind == MetaPropKind::ImportMeta => member_key(&m.prop),
        _ => None,
    }
}
