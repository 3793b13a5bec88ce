//! Template-driven selects and writes.
//!
//! A [`SqlMapper`] compiles a query from its template source, logs the
//! SQL, checks the statement keyword and runs it on a [`Session`]. Rows
//! come back as [`Bean`]s, scalars or keyed maps; writes go through the
//! session's automatic transactions.

use std::collections::HashMap;
use std::hash::Hash;

use rusqlite::Connection;
use sqlstencil_core::{
    ATTR_KEY_PROPERTY, Bean, BeanError, CompiledQuery, DEFAULT_SELECT_KEY_SQL, FromValue, Param,
    QueryKind, TemplateSource, Value, check_statement, compile,
};
use tracing::debug;

use crate::engine::{Engine, RowSet};
use crate::error::{MapperError, Result};
use crate::record::Record;
use crate::session::Session;

const SELECT: &[QueryKind] = &[QueryKind::Select];
const INSERT: &[QueryKind] = &[QueryKind::Insert];
const UPDATE: &[QueryKind] = &[QueryKind::Update];
const DELETE: &[QueryKind] = &[QueryKind::Delete, QueryKind::Drop];

/// Runs the queries of one template source on one session.
///
/// # Examples
///
/// ```
/// use rusqlite::Connection;
/// use sqlstencil_core::{Param, TemplateDocument};
/// use sqlstencil_sqlite::{Session, SqlMapper};
///
/// let session = Session::new(Connection::open_in_memory().unwrap());
/// session.execute_raw("CREATE TABLE tags (id INTEGER PRIMARY KEY, label TEXT)").unwrap();
///
/// let template = TemplateDocument::parse(r#"<sqlMap>
///   <insert id="add">INSERT INTO tags (label) VALUES (#(label)#)<selectKey keyProperty="id"/></insert>
///   <select id="labels">SELECT label FROM tags ORDER BY id</select>
/// </sqlMap>"#).unwrap();
///
/// let tags = SqlMapper::new(&session, &template);
/// let id = tags.insert("add", &[Param::new("label", "rust")]).unwrap();
/// assert_eq!(id, Some(sqlstencil_core::Value::Integer(1)));
/// assert_eq!(tags.select_values::<String>("labels", &[]).unwrap(), ["rust"]);
/// ```
pub struct SqlMapper<'a, S: TemplateSource + ?Sized, E: Engine = Connection> {
    session: &'a Session<E>,
    source: &'a S,
}

impl<'a, S: TemplateSource + ?Sized, E: Engine> SqlMapper<'a, S, E> {
    pub fn new(session: &'a Session<E>, source: &'a S) -> Self {
        Self { session, source }
    }

    pub fn session(&self) -> &'a Session<E> {
        self.session
    }

    pub fn source(&self) -> &'a S {
        self.source
    }

    fn prepare(&self, query_id: &str, params: &[Param], kinds: &[QueryKind]) -> Result<CompiledQuery> {
        let query = compile(self.source, query_id, params)?;
        debug!(query_id, sql = query.sql(), "Running mapped query");
        check_statement(query.sql(), kinds)?;
        Ok(query)
    }

    /// Runs a select and returns the raw rows.
    pub fn select_rows(&self, query_id: &str, params: &[Param]) -> Result<RowSet> {
        let query = self.prepare(query_id, params, SELECT)?;
        self.session.query(query.sql())
    }

    /// Fills one bean per row.
    ///
    /// Columns the bean does not know are skipped.
    pub fn select_list<T: Bean + Default>(&self, query_id: &str, params: &[Param]) -> Result<Vec<T>> {
        let rows = self.select_rows(query_id, params)?;
        rows.iter().map(|record| fill_bean(&record)).collect()
    }

    /// Zero or one bean.
    ///
    /// # Errors
    ///
    /// [`MapperError::ResultCount`] when more than one row comes back.
    pub fn select_one<T: Bean + Default>(&self, query_id: &str, params: &[Param]) -> Result<Option<T>> {
        let mut list = self.select_list(query_id, params)?;
        if list.len() > 1 {
            return Err(MapperError::ResultCount("zero or one"));
        }
        Ok(list.pop())
    }

    /// The single column of every row.
    ///
    /// # Errors
    ///
    /// [`MapperError::ColumnCount`] unless the result has exactly one column.
    pub fn select_values<T: FromValue>(&self, query_id: &str, params: &[Param]) -> Result<Vec<T>> {
        let rows = self.select_rows(query_id, params)?;
        if rows.column_count() != 1 {
            return Err(MapperError::ColumnCount("one"));
        }
        rows.iter().map(|record| record.get(0)).collect()
    }

    /// Zero or one scalar.
    pub fn select_value<T: FromValue>(&self, query_id: &str, params: &[Param]) -> Result<Option<T>> {
        let mut values = self.select_values(query_id, params)?;
        if values.len() > 1 {
            return Err(MapperError::ResultCount("zero or one"));
        }
        Ok(values.pop())
    }

    /// Beans keyed by the `key_property` column. Later rows win on
    /// duplicate keys.
    ///
    /// # Errors
    ///
    /// [`MapperError::ColumnCount`] when the result has one column or
    /// fewer, [`MapperError::ColumnNotFound`] when `key_property` is absent.
    pub fn select_map<K, T>(
        &self,
        query_id: &str,
        params: &[Param],
        key_property: &str,
    ) -> Result<HashMap<K, T>>
    where
        K: FromValue + Eq + Hash,
        T: Bean + Default,
    {
        let rows = self.select_map_rows(query_id, params)?;
        rows.iter()
            .map(|record| -> Result<(K, T)> { Ok((record.get(key_property)?, fill_bean(&record)?)) })
            .collect()
    }

    /// Scalars from `value_property` keyed by the `key_property` column.
    pub fn select_value_map<K, V>(
        &self,
        query_id: &str,
        params: &[Param],
        key_property: &str,
        value_property: &str,
    ) -> Result<HashMap<K, V>>
    where
        K: FromValue + Eq + Hash,
        V: FromValue,
    {
        let rows = self.select_map_rows(query_id, params)?;
        rows.iter()
            .map(|record| -> Result<(K, V)> {
                Ok((record.get(key_property)?, record.get(value_property)?))
            })
            .collect()
    }

    fn select_map_rows(&self, query_id: &str, params: &[Param]) -> Result<RowSet> {
        let rows = self.select_rows(query_id, params)?;
        if rows.column_count() <= 1 {
            return Err(MapperError::ColumnCount("higher than one"));
        }
        Ok(rows)
    }

    /// Runs an insert and, if it declares a `selectKey`, returns the key.
    ///
    /// The insert and the key query share one transaction.
    ///
    /// # Errors
    ///
    /// [`MapperError::SubQueryCount`] for more than one `selectKey`,
    /// [`MapperError::MissingKeyProperty`] when it lacks `keyProperty`,
    /// and [`MapperError::ResultCount`] or [`MapperError::ColumnCount`]
    /// when the key query returns anything but one value.
    pub fn insert(&self, query_id: &str, params: &[Param]) -> Result<Option<Value>> {
        Ok(self.insert_keyed(query_id, params)?.map(Param::into_value))
    }

    /// Inserts a bean and writes the generated key back into it.
    pub fn insert_bean<B: Bean>(&self, query_id: &str, bean: &mut B) -> Result<Option<Value>> {
        let Some(key) = self.insert_keyed(query_id, &bean.to_params())? else {
            return Ok(None);
        };
        bean.set_field(key.name(), key.value().as_text().as_deref())?;
        Ok(Some(key.into_value()))
    }

    fn insert_keyed(&self, query_id: &str, params: &[Param]) -> Result<Option<Param>> {
        let query = self.prepare(query_id, params, INSERT)?;
        let keys: Vec<_> = query.select_keys().collect();

        let select_key = match keys.as_slice() {
            [] => {
                self.session.execute(query.sql())?;
                return Ok(None);
            }
            [key] => key,
            _ => return Err(MapperError::SubQueryCount(keys.len())),
        };
        let key_property = select_key
            .attribute(ATTR_KEY_PROPERTY)
            .ok_or(MapperError::MissingKeyProperty)?;
        let key_sql = match select_key.sql().trim() {
            "" => DEFAULT_SELECT_KEY_SQL,
            sql => sql,
        };

        let (key, _) = self
            .session
            .transaction(self.session.default_mode(), |session| {
                session.execute(query.sql())?;
                let rows = session.query(key_sql)?;
                if rows.is_empty() {
                    return Ok(None);
                }
                if rows.column_count() != 1 {
                    return Err(MapperError::ColumnCount("one"));
                }
                if rows.len() != 1 {
                    return Err(MapperError::ResultCount("one"));
                }
                Ok(rows.scalar().cloned())
            })?;
        debug!(query_id, key = ?key, "Selected insert key");
        Ok(key.map(|value| Param::new(key_property, value)))
    }

    /// Runs an `UPDATE` and returns the number of changed rows.
    pub fn update(&self, query_id: &str, params: &[Param]) -> Result<usize> {
        self.write(query_id, params, UPDATE)
    }

    pub fn update_bean<B: Bean>(&self, query_id: &str, bean: &B) -> Result<usize> {
        self.update(query_id, &bean.to_params())
    }

    /// Runs a `DELETE` or `DROP` and returns the number of changed rows.
    pub fn delete(&self, query_id: &str, params: &[Param]) -> Result<usize> {
        self.write(query_id, params, DELETE)
    }

    pub fn delete_bean<B: Bean>(&self, query_id: &str, bean: &B) -> Result<usize> {
        self.delete(query_id, &bean.to_params())
    }

    fn write(&self, query_id: &str, params: &[Param], kinds: &[QueryKind]) -> Result<usize> {
        let query = self.prepare(query_id, params, kinds)?;
        self.session.execute(query.sql())
    }
}

fn fill_bean<T: Bean + Default>(record: &Record<'_>) -> Result<T> {
    let mut bean = T::default();
    for (column, value) in record.iter() {
        match bean.set_field(column, value.as_text().as_deref()) {
            Ok(()) | Err(BeanError::UnknownField(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(bean)
}
