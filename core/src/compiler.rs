//! Template compilation.
//!
//! [`compile`] walks a template's markup events once, selects the root
//! statement whose `id` matches, resolves every inner directive against the
//! bound parameters and returns the finished SQL.
//!
//! # Example
//!
//! ```
//! use sqlstencil_core::{compile, Param, TemplateDocument};
//!
//! let doc = TemplateDocument::parse(
//!     r#"<sqlMap>
//!          <select id="byName">SELECT * FROM users
//!            <dynamic prepend="WHERE">
//!              <isNotNull property="name" prepend="AND">name = #(name)#</isNotNull>
//!            </dynamic>
//!          </select>
//!        </sqlMap>"#,
//! )
//! .unwrap();
//!
//! let query = compile(&doc, "byName", &[Param::new("name", "ann")]).unwrap();
//! assert!(query.sql().ends_with("WHERE\nname = 'ann'"));
//! ```

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::error::{CompileError, MarkupError, Result};
use crate::markup::{MarkupEvent, MarkupSource, TemplateSource};
use crate::query::{
    ATTR_COMPARE_VALUE, ATTR_ID, ATTR_PREPEND, ATTR_PROPERTY, CompiledQuery, QueryArena, QueryId,
    QueryKind, is_sql_keyword,
};
use crate::value::{ParamMap, Param, Value};

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\(([^)#]+)\)#").expect("static regex must compile"));

/// Compiles the root statement `query_id` from `source` against `params`.
///
/// A fresh markup source is opened for every call and closed before
/// returning, whatever the outcome.
///
/// # Errors
///
/// - [`CompileError::QueryNotFound`] if no statement carries the id.
/// - [`CompileError::Malformed`] if the markup source fails.
/// - [`CompileError::IllegalStructure`] for directives outside a statement,
///   nested statements, and `selectKey` outside an `insert`.
pub fn compile<S>(source: &S, query_id: &str, params: &[Param]) -> Result<CompiledQuery>
where
    S: TemplateSource + ?Sized,
{
    let mut events = source.open()?;
    let compiler = Compiler {
        events: events.as_mut(),
        params: ParamMap::from_params(params),
        arena: QueryArena::new(),
    };
    let result = compiler.compile_root(query_id);
    events.close();

    if let Ok(query) = &result {
        debug!(query_id, kind = %query.kind(), sql = query.sql(), "Compiled query");
    }
    result
}

/// Replaces every `#(name)#` placeholder bound in `params`.
///
/// Text values are wrapped in single quotes; everything else uses its
/// default string form. Inserted values are not rescanned and unbound
/// placeholders are left untouched.
///
/// ```
/// use sqlstencil_core::{substitute_placeholders, Param, ParamMap};
///
/// let params = ParamMap::from_params(&[Param::new("id", 7), Param::new("name", "it's")]);
/// assert_eq!(
///     substitute_placeholders("id = #(id)# AND name = #(name)# AND x = #(x)#", &params),
///     "id = 7 AND name = 'it''s' AND x = #(x)#"
/// );
/// ```
pub fn substitute_placeholders(text: &str, params: &ParamMap) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures<'_>| match params.get(&caps[1]) {
            Some(Value::Text(s)) => format!("'{s}'"),
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Checks that `sql` starts with the keyword of one of `kinds`.
///
/// The comparison ignores leading whitespace and letter case.
///
/// # Errors
///
/// Returns [`CompileError::WrongStatement`] when no keyword matches.
pub fn check_statement(sql: &str, kinds: &[QueryKind]) -> Result<()> {
    let trimmed = sql.trim_start();
    let matches = kinds.iter().any(|kind| {
        let keyword = kind.tag_name();
        trimmed
            .get(..keyword.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(keyword))
    });
    if matches {
        return Ok(());
    }
    Err(CompileError::WrongStatement {
        expected: kinds
            .iter()
            .map(|k| k.tag_name())
            .collect::<Vec<_>>()
            .join(", "),
        sql: sql.to_string(),
    })
}

struct Compiler<'e, M: MarkupSource + ?Sized> {
    events: &'e mut M,
    params: ParamMap,
    arena: QueryArena,
}

impl<M: MarkupSource + ?Sized> Compiler<'_, M> {
    fn compile_root(mut self, query_id: &str) -> Result<CompiledQuery> {
        loop {
            match self.events.next_event()? {
                MarkupEvent::Start { name, attributes } => {
                    if let Some(kind) = QueryKind::from_statement_tag(&name) {
                        let selected = attributes
                            .iter()
                            .any(|(k, v)| k == ATTR_ID && v == query_id);
                        if !selected {
                            self.skip_element(&name)?;
                            continue;
                        }
                        let root = self.arena.push(kind, attributes, None);
                        self.fill(root, &name, true)?;
                        self.finish_root(root);
                        return Ok(CompiledQuery::new(self.arena, root));
                    }
                    if QueryKind::from_directive_tag(&name).is_some() {
                        return Err(CompileError::IllegalStructure(format!(
                            "<{name}> appears outside of a statement"
                        )));
                    }
                }
                MarkupEvent::Text(_) | MarkupEvent::End { .. } => {}
                MarkupEvent::EndOfStream => {
                    return Err(CompileError::QueryNotFound(query_id.to_string()));
                }
            }
        }
    }

    /// Consumes events up to the end of the element `name` that just opened.
    fn skip_element(&mut self, name: &str) -> Result<()> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.events.next_event()? {
                MarkupEvent::Start { .. } => depth += 1,
                MarkupEvent::End { .. } => depth -= 1,
                MarkupEvent::Text(_) => {}
                MarkupEvent::EndOfStream => return Err(unterminated(name)),
            }
        }
        Ok(())
    }

    /// Reads the body of element `name` into `owner`.
    ///
    /// With `own_text` unset the element is a transparent wrapper: its text
    /// is dropped but nested directives still attach to `owner`.
    fn fill(&mut self, owner: QueryId, name: &str, own_text: bool) -> Result<()> {
        loop {
            match self.events.next_event()? {
                MarkupEvent::Start {
                    name: child_name,
                    attributes,
                } => {
                    if let Some(kind) = QueryKind::from_directive_tag(&child_name) {
                        let child = self.open_directive(owner, kind, attributes)?;
                        self.fill(child, &child_name, true)?;
                        self.close_directive(child);
                    } else if QueryKind::from_statement_tag(&child_name).is_some() {
                        return Err(CompileError::IllegalStructure(format!(
                            "statement <{child_name}> nested inside <{name}>"
                        )));
                    } else {
                        self.fill(owner, &child_name, false)?;
                    }
                }
                MarkupEvent::Text(text) if own_text => self.append_text(owner, &text),
                MarkupEvent::Text(_) => {}
                MarkupEvent::End { .. } => return Ok(()),
                MarkupEvent::EndOfStream => return Err(unterminated(name)),
            }
        }
    }

    fn open_directive(
        &mut self,
        owner: QueryId,
        kind: QueryKind,
        attributes: Vec<(String, String)>,
    ) -> Result<QueryId> {
        let parent = self.arena.get(owner);
        if kind == QueryKind::SelectKey
            && (parent.kind() != QueryKind::Insert || parent.parent().is_some())
        {
            return Err(CompileError::IllegalStructure(format!(
                "<selectKey> must sit directly inside an <insert> statement, found inside <{}>",
                parent.kind()
            )));
        }

        let child = self.arena.push(kind, attributes, Some(owner));
        if kind == QueryKind::Dynamic {
            let node = self.arena.get_mut(child);
            let keyword = node.attribute(ATTR_PREPEND).is_some_and(is_sql_keyword);
            node.set_last_keyword_emitted(keyword);
        }
        Ok(child)
    }

    fn append_text(&mut self, owner: QueryId, text: &str) {
        let node = self.arena.get(owner);
        let kind = node.kind();
        match kind {
            QueryKind::SelectKey => {
                let resolved = substitute_placeholders(text, &self.params);
                self.arena.get_mut(owner).sql_mut().push_str(&resolved);
            }
            _ if kind.is_conditional() => {
                if !self.condition_holds(owner) {
                    return;
                }
                let Some(parent) = node.parent() else { return };
                let prepend = node.attribute(ATTR_PREPEND).map(str::to_string);
                let target = self.arena.get_mut(parent);
                push_line_break(target.sql_mut());
                if let Some(prepend) = prepend.filter(|p| !p.is_empty()) {
                    if !target.last_keyword_emitted() {
                        target.sql_mut().push_str(&prepend);
                        target.sql_mut().push('\n');
                    }
                }
                target.sql_mut().push_str(text);
                target.set_last_keyword_emitted(false);
            }
            _ => self.arena.get_mut(owner).sql_mut().push_str(text),
        }
    }

    fn close_directive(&mut self, child: QueryId) {
        let node = self.arena.get(child);
        let kind = node.kind();
        let Some(parent) = node.parent() else { return };

        if kind == QueryKind::SelectKey {
            let sql = node.sql().trim().to_string();
            self.arena.get_mut(child).set_sql(sql);
            self.arena.get_mut(parent).push_sub_query(child);
            return;
        }
        if node.sql().is_empty() || (kind.is_conditional() && !self.condition_holds(child)) {
            return;
        }

        let body = match node.attribute(ATTR_PREPEND).filter(|p| !p.is_empty()) {
            Some(prepend) if kind == QueryKind::Dynamic => format!("{prepend}\n{}", node.sql()),
            _ => node.sql().to_string(),
        };
        let target = self.arena.get_mut(parent);
        push_line_break(target.sql_mut());
        target.sql_mut().push_str(&body);
        target.set_last_keyword_emitted(false);
    }

    fn condition_holds(&self, id: QueryId) -> bool {
        let node = self.arena.get(id);
        let property = node.attribute(ATTR_PROPERTY).unwrap_or_default();
        let compare = node.attribute(ATTR_COMPARE_VALUE);
        match node.kind() {
            QueryKind::IsNull => self.params.is_null(property),
            QueryKind::IsNotNull => !self.params.is_null(property),
            QueryKind::IsEqual => compare.is_some_and(|c| c == self.params.string_form(property)),
            QueryKind::IsNotEqual => {
                compare.is_some_and(|c| c != self.params.string_form(property))
            }
            _ => true,
        }
    }

    fn finish_root(&mut self, root: QueryId) {
        let node = self.arena.get_mut(root);
        let sql = substitute_placeholders(node.sql().trim(), &self.params);
        node.set_sql(sql);
    }
}

fn push_line_break(buffer: &mut String) {
    if !buffer.is_empty() && !buffer.ends_with(['\n', '\r']) {
        buffer.push('\n');
    }
}

fn unterminated(name: &str) -> CompileError {
    CompileError::Malformed(MarkupError::Malformed {
        offset: 0,
        message: format!("stream ended inside <{name}>"),
    })
}
