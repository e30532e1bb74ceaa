//! Filtered reads over a single record table.
//!
//! A [`Query`] starts out unfiltered and is refined clause by clause. Narrowing
//! hooks receive the base query and hand back a refined one; the store renders
//! it into SQL with every value bound, never interpolated.

use sqlx::{QueryBuilder, Sqlite};

use crate::models::RecordId;

/// A column value bound into a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Integer(i64),
    Boolean(bool),
    Text(String),
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<Option<i64>> for Value {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Self::Null, Self::Integer)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

pub(crate) fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: Value) {
    match value {
        Value::Null => builder.push_bind(Option::<i64>::None),
        Value::Integer(value) => builder.push_bind(value),
        Value::Boolean(value) => builder.push_bind(value),
        Value::Text(value) => builder.push_bind(value),
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Clause {
    Eq(&'static str, Value),
    AnyEq(Vec<&'static str>, Value),
    In(&'static str, Vec<Value>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    clauses: Vec<Clause>,
}

impl Query {
    /// Every row of the table.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: RecordId) -> Self {
        Self::all().eq("id", id)
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Eq(column, value.into()));
        self
    }

    /// Matches rows where at least one of `columns` equals `value`.
    pub fn any_eq(mut self, columns: &[&'static str], value: impl Into<Value>) -> Self {
        self.clauses
            .push(Clause::AnyEq(columns.to_vec(), value.into()));
        self
    }

    pub fn is_in<V>(mut self, column: &'static str, values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<Value>,
    {
        self.clauses.push(Clause::In(
            column,
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn is_unfiltered(&self) -> bool {
        self.clauses.is_empty()
    }

    pub(crate) fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        for (idx, clause) in self.clauses.iter().enumerate() {
            builder.push(if idx == 0 { " WHERE " } else { " AND " });
            match clause {
                Clause::Eq(column, value) => {
                    builder.push(*column).push(" = ");
                    push_value(builder, value.clone());
                }
                Clause::AnyEq(columns, value) => {
                    builder.push("(");
                    for (col_idx, column) in columns.iter().enumerate() {
                        if col_idx > 0 {
                            builder.push(" OR ");
                        }
                        builder.push(*column).push(" = ");
                        push_value(builder, value.clone());
                    }
                    builder.push(")");
                }
                Clause::In(_, values) if values.is_empty() => {
                    // `IN ()` is not valid SQL; an empty set matches nothing.
                    builder.push("0 = 1");
                }
                Clause::In(column, values) => {
                    builder.push(*column).push(" IN (");
                    for (value_idx, value) in values.iter().enumerate() {
                        if value_idx > 0 {
                            builder.push(", ");
                        }
                        push_value(builder, value.clone());
                    }
                    builder.push(")");
                }
            }
        }
    }
}
