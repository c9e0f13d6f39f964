//! Declarative macros.
//!
//! `params!` builds a positional parameter list; `impl_db_dispatch!`
//! generates the per-backend match arms in the sqlx driver.

/// Build a `Vec<Value>` from heterogeneous expressions.
///
/// ```
/// use sluice::{params, Value};
///
/// let p = params![1, "two", None::<i64>, 4.5];
/// assert_eq!(p[1], Value::from("two"));
/// assert!(p[2].is_null());
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($value)),+]
    };
}

/// Macro for generating backend dispatch match arms.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(backend, {
///     MySql(c) => mysql_query(c, sql, params).await,
///     Postgres(c) => postgres_query(c, sql, params).await,
///     Sqlite(c) => sqlite_query(c, sql, params).await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($backend:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $backend {
            $(
                $crate::db::sqlx_driver::Backend::$variant($c) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
