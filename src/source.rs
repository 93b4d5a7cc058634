use swc_core::{
    common::{sync::Lrc, BytePos, FileName, Globals, SourceFile, SourceMap, Span, Spanned, GLOBALS},
    ecma::{
        ast::{EsVersion, Expr, Module},
        parser::{error::Error as ParseError, parse_file_as_expr, parse_file_as_module, Syntax, TsSyntax},
    },
};

use crate::error::FlowError;

// -----------------------------------------------------------------------------
// Parsed flow source
// -----------------------------------------------------------------------------

/// A flow parsed with the TypeScript grammar, plus the text it came from so
/// spans can be turned back into exact byte ranges.
pub struct ParsedSource<'a> {
    pub text: &'a str,
    pub module: Module,
    cm: Lrc<SourceMap>,
    fm: Lrc<SourceFile>,
    // Bytes of `text` that precede the loaded file, i.e. a stripped BOM.
    lead: usize,
}

impl<'a> ParsedSource<'a> {
    /// Byte offset into `text` for a position inside this file.
    pub fn offset(&self, pos: BytePos) -> usize {
        (pos.0.saturating_sub(self.fm.start_pos.0) as usize + self.lead).min(self.text.len())
    }

    pub fn range(&self, span: Span) -> (usize, usize) {
        (self.offset(span.lo), self.offset(span.hi))
    }

    /// Exact source text covered by `span`.
    pub fn snippet(&self, span: Span) -> &'a str {
        let (lo, hi) = self.range(span);
        self.text.get(lo..hi).unwrap_or("")
    }

    /// 1-based first and last line of `span`.
    pub fn lines(&self, span: Span) -> (usize, usize) {
        if span.is_dummy() {
            return (0, 0);
        }
        let lo = self.cm.lookup_char_pos(span.lo);
        let hi = self.cm.lookup_char_pos(span.hi);
        (lo.line, hi.line)
    }
}

fn flow_syntax() -> Syntax {
    Syntax::Typescript(TsSyntax {
        tsx: false,
        decorators: true,
        ..Default::default()
    })
}

fn load(text: &str, name: &str) -> (Lrc<SourceMap>, Lrc<SourceFile>) {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(Lrc::new(FileName::Custom(name.to_string())), text.to_string());
    (cm, fm)
}

fn syntax_error(cm: &SourceMap, err: ParseError) -> FlowError {
    let span = err.span();
    let (line, column) = if span.is_dummy() {
        (0, 0)
    } else {
        let loc = cm.lookup_char_pos(span.lo);
        (loc.line, loc.col_display + 1)
    };
    FlowError::Syntax {
        message: err.kind().msg().to_string(),
        line,
        column,
    }
}

/// Parse flow source. Any diagnostic, recovered or not, fails the whole parse.
pub fn parse_flow(text: &str) -> Result<ParsedSource<'_>, FlowError> {
    let (cm, fm) = load(text, "flow.ts");
    let mut recovered = vec![];
    let parsed = GLOBALS.set(&Globals::new(), || {
        parse_file_as_module(&fm, flow_syntax(), EsVersion::latest(), None, &mut recovered)
    });
    let module = match parsed {
        Ok(m) => m,
        Err(err) => return Err(syntax_error(&cm, err)),
    };
    if let Some(err) = recovered.into_iter().next() {
        return Err(syntax_error(&cm, err));
    }
    let lead = text.len().saturating_sub(fm.src.len());
    Ok(ParsedSource {
        text,
        module,
        cm,
        fm,
        lead,
    })
}

/// Parse a standalone value expression (parameter literal text).
pub fn parse_value_expr(text: &str) -> Result<Box<Expr>, FlowError> {
    let (cm, fm) = load(text, "value.ts");
    let mut recovered = vec![];
    let parsed = GLOBALS.set(&Globals::new(), || {
        parse_file_as_expr(&fm, flow_syntax(), EsVersion::latest(), None, &mut recovered)
    });
    let expr = parsed.map_err(|err| syntax_error(&cm, err))?;
    if let Some(err) = recovered.into_iter().next() {
        return Err(syntax_error(&cm, err));
    }
    Ok(expr)
}
