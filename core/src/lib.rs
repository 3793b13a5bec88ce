//! Query template compiler and shared SQL value types.
//!
//! This crate turns declarative query templates into SQL text:
//!
//! - [`Value`] / [`Param`] — typed parameters and their literal forms.
//! - [`MarkupSource`] / [`TemplateSource`] — the event stream a template is
//!   read from; [`TemplateDocument`] tokenizes XML-style template text.
//! - [`compile`] — selects one root statement by id and resolves its
//!   `dynamic`, `isNull`, `isNotNull`, `isEqual`, `isNotEqual` and
//!   `selectKey` directives into a [`CompiledQuery`].
//! - [`Bean`] / [`FromValue`] — moving record types to and from rows.
//!
//! # Example
//!
//! ```
//! use sqlstencil_core::*;
//!
//! let doc = TemplateDocument::parse(
//!     r#"<update id="rename">UPDATE users SET name = #(name)#<isNotNull property="id" prepend="WHERE">id = #(id)#</isNotNull></update>"#,
//! )
//! .unwrap();
//!
//! let params = [Param::new("name", "Ann"), Param::new("id", 3)];
//! let query = compile(&doc, "rename", &params).unwrap();
//!
//! assert_eq!(query.sql(), "UPDATE users SET name = 'Ann'\nWHERE\nid = 3");
//! assert!(check_statement(query.sql(), &[QueryKind::Update]).is_ok());
//! ```

mod bean;
mod compiler;
mod error;
mod markup;
mod query;
mod types;
mod value;

pub use bean::{Bean, FromValue, parse_bool, parse_field};
pub use compiler::{check_statement, compile, substitute_placeholders};
pub use error::{BeanError, CompileError, MarkupError, Result};
pub use markup::{EventStream, MarkupEvent, MarkupSource, TemplateDocument, TemplateSource};
pub use query::{
    ATTR_COMPARE_VALUE, ATTR_ID, ATTR_KEY_PROPERTY, ATTR_PREPEND, ATTR_PROPERTY,
    CompiledQuery, DEFAULT_SELECT_KEY_SQL, QueryArena, QueryId, QueryKind, QueryNode,
    is_sql_keyword,
};
pub use types::{Disposition, TransactionMode};
pub use value::{Param, ParamMap, TIMESTAMP_FORMAT, Value, escape_quotes};
