//! Query tree built by the compiler.
//!
//! Queries live in a [`QueryArena`] and refer to each other by
//! [`QueryId`], so parents and children never hold references to one
//! another. The root is always a statement kind; every other node is an
//! inner directive.

use std::collections::HashMap;
use std::fmt;

/// Attribute selecting the root query.
pub const ATTR_ID: &str = "id";
/// Attribute naming the parameter a conditional directive inspects.
pub const ATTR_PROPERTY: &str = "property";
/// Attribute holding the value `isEqual`/`isNotEqual` compare against.
pub const ATTR_COMPARE_VALUE: &str = "compareValue";
/// Attribute holding the SQL fragment written before a directive's text.
pub const ATTR_PREPEND: &str = "prepend";
/// Attribute naming the property a `selectKey` result is written to.
pub const ATTR_KEY_PROPERTY: &str = "keyProperty";

/// Statement run by a `selectKey` directive with an empty body.
pub const DEFAULT_SELECT_KEY_SQL: &str = "SELECT last_insert_rowid()";

const SQL_KEYWORDS: [&str; 11] = [
    "SELECT", "FROM", "AS", "INSERT", "UPDATE", "DELETE", "VALUES", "SET", "WHERE", "AND", "OR",
];

/// Returns `true` if `word` is one of the tracked SQL reserved words.
///
/// ```
/// use sqlstencil_core::is_sql_keyword;
///
/// assert!(is_sql_keyword("WHERE"));
/// assert!(is_sql_keyword(" and "));
/// assert!(!is_sql_keyword("ORDER BY"));
/// ```
pub fn is_sql_keyword(word: &str) -> bool {
    let word = word.trim();
    SQL_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

/// Kind of a query node: a root statement or an inner directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
    Drop,
    Dynamic,
    IsNull,
    IsNotNull,
    IsEqual,
    IsNotEqual,
    SelectKey,
}

impl QueryKind {
    /// Maps a root element name (case-insensitive) to a statement kind.
    pub fn from_statement_tag(tag: &str) -> Option<Self> {
        [
            QueryKind::Select,
            QueryKind::Insert,
            QueryKind::Update,
            QueryKind::Delete,
            QueryKind::Drop,
        ]
        .into_iter()
        .find(|kind| kind.tag_name().eq_ignore_ascii_case(tag))
    }

    /// Maps an inner element name (case-sensitive) to a directive kind.
    pub fn from_directive_tag(tag: &str) -> Option<Self> {
        match tag {
            "dynamic" => Some(QueryKind::Dynamic),
            "isNull" => Some(QueryKind::IsNull),
            "isNotNull" => Some(QueryKind::IsNotNull),
            "isEqual" => Some(QueryKind::IsEqual),
            "isNotEqual" => Some(QueryKind::IsNotEqual),
            "selectKey" => Some(QueryKind::SelectKey),
            _ => None,
        }
    }

    /// Canonical element name; statement kinds use their SQL keyword.
    pub fn tag_name(self) -> &'static str {
        match self {
            QueryKind::Select => "SELECT",
            QueryKind::Insert => "INSERT",
            QueryKind::Update => "UPDATE",
            QueryKind::Delete => "DELETE",
            QueryKind::Drop => "DROP",
            QueryKind::Dynamic => "dynamic",
            QueryKind::IsNull => "isNull",
            QueryKind::IsNotNull => "isNotNull",
            QueryKind::IsEqual => "isEqual",
            QueryKind::IsNotEqual => "isNotEqual",
            QueryKind::SelectKey => "selectKey",
        }
    }

    pub fn is_statement(self) -> bool {
        matches!(
            self,
            QueryKind::Select
                | QueryKind::Insert
                | QueryKind::Update
                | QueryKind::Delete
                | QueryKind::Drop
        )
    }

    /// `isNull`, `isNotNull`, `isEqual` and `isNotEqual`.
    pub fn is_conditional(self) -> bool {
        matches!(
            self,
            QueryKind::IsNull | QueryKind::IsNotNull | QueryKind::IsEqual | QueryKind::IsNotEqual
        )
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_name())
    }
}

/// Index of a node inside its [`QueryArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(usize);

/// One statement or directive and its accumulated SQL text.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryNode {
    kind: QueryKind,
    attributes: HashMap<String, String>,
    sql: String,
    parent: Option<QueryId>,
    sub_queries: Vec<QueryId>,
    last_keyword_emitted: bool,
}

impl QueryNode {
    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    /// The SQL accumulated so far (final once compilation finished).
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parent(&self) -> Option<QueryId> {
        self.parent
    }

    /// `selectKey` children registered on an `insert` root.
    pub fn sub_queries(&self) -> &[QueryId] {
        &self.sub_queries
    }

    /// Whether the last fragment written here was a bare SQL keyword.
    pub fn last_keyword_emitted(&self) -> bool {
        self.last_keyword_emitted
    }

    pub(crate) fn sql_mut(&mut self) -> &mut String {
        &mut self.sql
    }

    pub(crate) fn set_sql(&mut self, sql: String) {
        self.sql = sql;
    }

    pub(crate) fn set_last_keyword_emitted(&mut self, emitted: bool) {
        self.last_keyword_emitted = emitted;
    }

    pub(crate) fn push_sub_query(&mut self, id: QueryId) {
        self.sub_queries.push(id);
    }
}

/// Owner of every node created during one compilation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryArena {
    nodes: Vec<QueryNode>,
}

impl QueryArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its id.
    pub fn push(
        &mut self,
        kind: QueryKind,
        attributes: impl IntoIterator<Item = (String, String)>,
        parent: Option<QueryId>,
    ) -> QueryId {
        let id = QueryId(self.nodes.len());
        self.nodes.push(QueryNode {
            kind,
            attributes: attributes.into_iter().collect(),
            sql: String::new(),
            parent,
            sub_queries: Vec::new(),
            last_keyword_emitted: false,
        });
        id
    }

    /// Returns the node for `id`.
    ///
    /// Ids are only minted by [`push`](Self::push), so an id from this
    /// arena is always valid.
    pub fn get(&self, id: QueryId) -> &QueryNode {
        &self.nodes[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: QueryId) -> &mut QueryNode {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A fully resolved root query and the arena holding its directives.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    arena: QueryArena,
    root: QueryId,
}

impl CompiledQuery {
    pub(crate) fn new(arena: QueryArena, root: QueryId) -> Self {
        Self { arena, root }
    }

    pub fn root(&self) -> &QueryNode {
        self.arena.get(self.root)
    }

    /// Statement kind of the root query.
    pub fn kind(&self) -> QueryKind {
        self.root().kind()
    }

    /// The final, substituted SQL text.
    pub fn sql(&self) -> &str {
        self.root().sql()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.root().attribute(name)
    }

    /// The `selectKey` directives attached to an `insert` root.
    pub fn select_keys(&self) -> impl Iterator<Item = &QueryNode> + '_ {
        self.root()
            .sub_queries()
            .iter()
            .map(|id| self.arena.get(*id))
    }

    pub fn arena(&self) -> &QueryArena {
        &self.arena
    }
}
