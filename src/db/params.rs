//! Binding `QueryParam` values to backend queries.
//!
//! Values are bound in `bind_order`, which the placeholder rewriter derives
//! from the statement text.

use crate::models::QueryParam;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Postgres, Sqlite};

macro_rules! bind_value {
    ($query:expr, $param:expr) => {
        match $param {
            QueryParam::Null => $query.bind(None::<String>),
            QueryParam::Bool(v) => $query.bind(*v),
            QueryParam::Int(v) => $query.bind(*v),
            QueryParam::Float(v) => $query.bind(*v),
            QueryParam::String(v) => $query.bind(v.as_str()),
            QueryParam::Bytes(v) => $query.bind(v.as_slice()),
        }
    };
}

pub(crate) fn bind_mysql<'q>(
    mut query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    values: &'q [QueryParam],
    bind_order: &[usize],
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    for &index in bind_order {
        query = bind_value!(query, &values[index]);
    }
    query
}

pub(crate) fn bind_postgres<'q>(
    mut query: sqlx::query::Query<'q, Postgres, PgArguments>,
    values: &'q [QueryParam],
    bind_order: &[usize],
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    for &index in bind_order {
        query = bind_value!(query, &values[index]);
    }
    query
}

pub(crate) fn bind_sqlite<'q>(
    mut query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    values: &'q [QueryParam],
    bind_order: &[usize],
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    for &index in bind_order {
        query = bind_value!(query, &values[index]);
    }
    query
}
