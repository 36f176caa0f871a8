use chrono::{NaiveDate, NaiveDateTime};

/// A single bound value for a `?` placeholder.
///
/// On PostgreSQL each value is sent with the type of its variant, so the
/// server does not coerce across types: `Text` bound to a `DATE` or
/// `INTEGER` column is rejected where SQLite would accept it. Use `Date`,
/// `Timestamp` or `Int` for such columns, or cast in SQL (`?::date`).
/// `Null` is the exception and takes the type of its target.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Param::Bool(v)
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Param::Int(v.into())
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Int(v)
    }
}

impl From<u32> for Param {
    fn from(v: u32) -> Self {
        Param::Int(v.into())
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Param::Float(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

impl From<&String> for Param {
    fn from(v: &String) -> Self {
        Param::Text(v.clone())
    }
}

impl From<Vec<u8>> for Param {
    fn from(v: Vec<u8>) -> Self {
        Param::Bytes(v)
    }
}

impl From<NaiveDate> for Param {
    fn from(v: NaiveDate) -> Self {
        Param::Date(v)
    }
}

impl From<NaiveDateTime> for Param {
    fn from(v: NaiveDateTime) -> Self {
        Param::Timestamp(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map_or(Param::Null, Into::into)
    }
}

/// Ordered parameter list. Values are bound in the order the `?`s appear.
///
/// `()` converts to an empty list, so `db.all(sql, ())` is the
/// parameterless form of `db.all(sql, params![..])`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<Param>);

impl Params {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, value: impl Into<Param>) {
        self.0.push(value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.0.iter()
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::new()
    }
}

impl From<Vec<Param>> for Params {
    fn from(v: Vec<Param>) -> Self {
        Params(v)
    }
}

impl From<&[Param]> for Params {
    fn from(v: &[Param]) -> Self {
        Params(v.to_vec())
    }
}

impl<const N: usize> From<[Param; N]> for Params {
    fn from(v: [Param; N]) -> Self {
        Params(v.into())
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a Param;
    type IntoIter = std::slice::Iter<'a, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Build a [`Params`] list from mixed values.
///
/// ```
/// use fleetdb::params;
/// let p = params![7_i64, "ABC-123", None::<f64>];
/// assert_eq!(p.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::db::Params::new()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::db::Params::from(vec![$($crate::db::Param::from($value)),+])
    };
}
