//! SQLite-to-PostgreSQL rewrite of application SQL.
//!
//! Application queries are written once in the SQLite dialect with `?`
//! placeholders. When the PostgreSQL backend is active they pass through an
//! ordered list of text rewrites before execution:
//!
//! 1. column types (`INTEGER PRIMARY KEY [AUTOINCREMENT]`, `DATETIME`)
//! 2. `INSERT OR IGNORE INTO t (..) VALUES (..)` to `ON CONFLICT DO NOTHING`
//! 3. relative dates and `strftime` formats
//! 4. `sqlite_master` catalog lookups
//! 5. `?` placeholders to `$1..$N`
//!
//! The rewrite is textual. Comments and string literals are not parsed, so a
//! literal that happens to contain one of the patterns is rewritten as well.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::{self, Write};
use std::sync::LazyLock;

/// Which database driver backs the adapter. Selected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    #[serde(rename = "postgresql")]
    Postgres,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite",
            Backend::Postgres => "postgresql",
        }
    }

    /// Translate SQLite-flavoured SQL for this backend.
    /// SQLite input is returned untouched and borrowed.
    pub fn convert<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        match self {
            Backend::Sqlite => Cow::Borrowed(sql),
            Backend::Postgres => Cow::Owned(to_postgres(sql)),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const INTERVAL_UNITS: &str = "days?|weeks?|months?|years?|hours?|minutes?|seconds?";

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("static rewrite pattern")
}

static SERIAL_KEY: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\bINTEGER\s+PRIMARY\s+KEY(?:\s+AUTOINCREMENT)?\b")
});

// Trailing `(` marks the `datetime(...)` function, which rule 3e handles.
static DATETIME_TYPE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)\bDATETIME\b(\s*\()?"));

static INSERT_OR_IGNORE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\bINSERT\s+OR\s+IGNORE\s+INTO\s+(\w+)\s*\(([^)]+)\)\s*VALUES\s*")
});

/// Order matters: the interval forms must run before bare `date('now')`,
/// and `date('now')` before the generic `date(column)`.
static DATE_REWRITES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            pattern(&format!(
                r"(?i)\bdate\(\s*'now'\s*,\s*'\+(\d+)\s+({INTERVAL_UNITS})'\s*\)"
            )),
            "CURRENT_DATE + INTERVAL '${1} ${2}'",
        ),
        (
            pattern(&format!(
                r"(?i)\bdate\(\s*'now'\s*,\s*'-(\d+)\s+({INTERVAL_UNITS})'\s*\)"
            )),
            "CURRENT_DATE - INTERVAL '${1} ${2}'",
        ),
        (pattern(r"(?i)\bdate\(\s*'now'\s*\)"), "CURRENT_DATE"),
        (
            pattern(r"(?i)\bdate\(\s*([a-zA-Z_][a-zA-Z0-9_.]*)\s*\)"),
            "${1}::DATE",
        ),
        (pattern(r"(?i)\bdatetime\(\s*'now'\s*\)"), "CURRENT_TIMESTAMP"),
        (
            pattern(r"(?i)\bstrftime\(\s*'%Y-%m'\s*,\s*([a-zA-Z_][a-zA-Z0-9_.]*)\s*\)"),
            "TO_CHAR(${1}, 'YYYY-MM')",
        ),
        (
            pattern(r"(?i)\bstrftime\(\s*'%Y-W%W'\s*,\s*([a-zA-Z_][a-zA-Z0-9_.]*)\s*\)"),
            "TO_CHAR(${1}, 'IYYY-\"W\"IW')",
        ),
    ]
});

static CATALOG_REWRITES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (pattern(r"(?i)\bsqlite_master\b"), "information_schema.tables"),
        (pattern(r"(?i)\btype\s*=\s*'table'"), "table_type='BASE TABLE'"),
    ]
});

static INSERT_INTO: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)^\s*INSERT\s+INTO\s+\w+"));

static ANY_INSERT: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)^\s*(?:INSERT|REPLACE)\b"));

static RETURNING: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)\bRETURNING\b"));

/// Any statement that may create rows (`INSERT`, `INSERT OR ...`, `REPLACE`).
pub fn is_insert(sql: &str) -> bool {
    ANY_INSERT.is_match(sql)
}

/// A plain `INSERT INTO <table>` statement.
pub fn is_insert_into(sql: &str) -> bool {
    INSERT_INTO.is_match(sql)
}

/// Append `RETURNING id` to a plain `INSERT INTO` that has no RETURNING clause.
pub fn with_returning_id(sql: &str) -> Cow<'_, str> {
    if !is_insert_into(sql) || RETURNING.is_match(sql) {
        return Cow::Borrowed(sql);
    }
    let body = sql.trim_end().trim_end_matches(';').trim_end();
    Cow::Owned(format!("{body} RETURNING id"))
}

/// Full SQLite-to-PostgreSQL pipeline. Running it on its own output is a no-op.
pub fn to_postgres(sql: &str) -> String {
    let sql = rewrite_column_types(sql);
    let sql = rewrite_insert_or_ignore(&sql);
    let sql = apply_all(&DATE_REWRITES, sql);
    let sql = apply_all(&CATALOG_REWRITES, sql);
    number_placeholders(&sql)
}

fn apply_all(rewrites: &[(Regex, &'static str)], mut sql: String) -> String {
    for (re, replacement) in rewrites {
        if re.is_match(&sql) {
            sql = re.replace_all(&sql, *replacement).into_owned();
        }
    }
    sql
}

fn rewrite_column_types(sql: &str) -> String {
    let sql = SERIAL_KEY.replace_all(sql, "SERIAL PRIMARY KEY");
    DATETIME_TYPE
        .replace_all(&sql, |caps: &Captures<'_>| {
            if caps.get(1).is_some() {
                caps[0].to_string()
            } else {
                "TIMESTAMP".to_string()
            }
        })
        .into_owned()
}

fn rewrite_insert_or_ignore(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 24);
    let mut rest = sql;

    while let Some(caps) = INSERT_OR_IGNORE.captures(rest) {
        let Some(head) = caps.get(0) else { break };
        let Some(tuples_len) = tuple_list_len(&rest[head.end()..]) else {
            // Not a VALUES list we understand; leave this statement as written.
            out.push_str(&rest[..head.end()]);
            rest = &rest[head.end()..];
            continue;
        };
        let tuples_end = head.end() + tuples_len;

        out.push_str(&rest[..head.start()]);
        let _ = write!(
            out,
            "INSERT INTO {} ({}) VALUES {} ON CONFLICT DO NOTHING",
            &caps[1],
            &caps[2],
            &rest[head.end()..tuples_end]
        );
        rest = &rest[tuples_end..];
    }

    out.push_str(rest);
    out
}

/// Byte length of the `(..)[, (..)]*` list that `s` starts with.
fn tuple_list_len(s: &str) -> Option<usize> {
    let mut end = tuple_len(s)?;
    loop {
        let after = s[end..].trim_start();
        let Some(next) = after.strip_prefix(',').map(str::trim_start) else {
            return Some(end);
        };
        if !next.starts_with('(') {
            return Some(end);
        }
        let start = s.len() - next.len();
        end = start + tuple_len(next)?;
    }
}

/// Byte length of the parenthesised group `s` starts with. Quoted text is skipped.
fn tuple_len(s: &str) -> Option<usize> {
    if !s.starts_with('(') {
        return None;
    }
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// `?` to `$1, $2, ...` in encounter order. Purely positional, so it runs last.
fn number_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0usize;
    for c in sql.chars() {
        if c == '?' {
            n += 1;
            let _ = write!(out, "${n}");
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg(sql: &str) -> String {
        Backend::Postgres.convert(sql).into_owned()
    }

    #[test]
    fn sqlite_backend_is_a_pass_through() {
        let inputs = [
            "SELECT * FROM vehicles WHERE user_id = ? AND date(fecha) >= date('now', '-30 days')",
            "INSERT OR IGNORE INTO fines (a, b) VALUES (1, 2)",
            "CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, at DATETIME)",
            "",
        ];
        for sql in inputs {
            let converted = Backend::Sqlite.convert(sql);
            assert!(matches!(converted, Cow::Borrowed(_)));
            assert_eq!(converted, sql);
        }
    }

    #[test]
    fn primary_keys_and_datetime_columns() {
        assert_eq!(
            pg("CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, created_at DATETIME DEFAULT CURRENT_TIMESTAMP)"),
            "CREATE TABLE users (id SERIAL PRIMARY KEY, created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)"
        );
        assert_eq!(
            pg("CREATE TABLE t (id integer primary key, name TEXT)"),
            "CREATE TABLE t (id SERIAL PRIMARY KEY, name TEXT)"
        );
    }

    #[test]
    fn datetime_type_rule_leaves_function_for_later_rule() {
        assert_eq!(
            pg("UPDATE routes SET updated_at = datetime('now') WHERE id = ?"),
            "UPDATE routes SET updated_at = CURRENT_TIMESTAMP WHERE id = $1"
        );
    }

    #[test]
    fn insert_or_ignore_single_row() {
        assert_eq!(
            pg("INSERT OR IGNORE INTO fines (a, b) VALUES (1, 2)"),
            "INSERT INTO fines (a, b) VALUES (1, 2) ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn insert_or_ignore_with_nested_calls_and_quotes() {
        assert_eq!(
            pg("insert or ignore into users (username, nombre, created_at) VALUES (?, 'O''Brien (jr)', datetime('now'))"),
            "INSERT INTO users (username, nombre, created_at) VALUES ($1, 'O''Brien (jr)', CURRENT_TIMESTAMP) ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn insert_or_ignore_multi_row() {
        assert_eq!(
            pg("INSERT OR IGNORE INTO tags (name) VALUES (?), (?) , (?)"),
            "INSERT INTO tags (name) VALUES ($1), ($2) , ($3) ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn insert_or_ignore_from_select_passes_through() {
        assert_eq!(
            pg("INSERT OR IGNORE INTO archive (id) SELECT id FROM fines"),
            "INSERT OR IGNORE INTO archive (id) SELECT id FROM fines"
        );
    }

    #[test]
    fn relative_dates() {
        assert_eq!(pg("date('now', '+7 days')"), "CURRENT_DATE + INTERVAL '7 days'");
        assert_eq!(
            pg("date('now', '-365 days')"),
            "CURRENT_DATE - INTERVAL '365 days'"
        );
        assert_eq!(pg("date('now')"), "CURRENT_DATE");
        assert_eq!(
            pg("date('now','-12 months')"),
            "CURRENT_DATE - INTERVAL '12 months'"
        );
    }

    #[test]
    fn interval_rules_win_over_bare_now() {
        assert_eq!(
            pg("SELECT * FROM insurance_policies WHERE fecha_vencimiento BETWEEN date('now') AND date('now', '+30 days')"),
            "SELECT * FROM insurance_policies WHERE fecha_vencimiento BETWEEN CURRENT_DATE AND CURRENT_DATE + INTERVAL '30 days'"
        );
    }

    #[test]
    fn date_of_column_becomes_cast() {
        assert_eq!(
            pg("SELECT * FROM operators o WHERE date(o.fecha_vencimiento_licencia) <= date('now', '+15 days')"),
            "SELECT * FROM operators o WHERE o.fecha_vencimiento_licencia::DATE <= CURRENT_DATE + INTERVAL '15 days'"
        );
    }

    #[test]
    fn strftime_formats() {
        assert_eq!(
            pg("SELECT strftime('%Y-%m', fr.fecha) AS mes FROM fuel_records fr GROUP BY strftime('%Y-%m', fr.fecha)"),
            "SELECT TO_CHAR(fr.fecha, 'YYYY-MM') AS mes FROM fuel_records fr GROUP BY TO_CHAR(fr.fecha, 'YYYY-MM')"
        );
        assert_eq!(
            pg("SELECT strftime('%Y-W%W', fecha) FROM routes"),
            "SELECT TO_CHAR(fecha, 'IYYY-\"W\"IW') FROM routes"
        );
    }

    #[test]
    fn catalog_lookups() {
        assert_eq!(
            pg("SELECT name FROM sqlite_master WHERE type='table' AND name=?"),
            "SELECT name FROM information_schema.tables WHERE table_type='BASE TABLE' AND name=$1"
        );
    }

    #[test]
    fn placeholders_are_numbered_left_to_right() {
        let sql = "UPDATE vehicles SET marca = ?, modelo = ?, placas = ? WHERE id = ? AND user_id = ?";
        let converted = pg(sql);
        assert_eq!(
            converted,
            "UPDATE vehicles SET marca = $1, modelo = $2, placas = $3 WHERE id = $4 AND user_id = $5"
        );
        assert!(!converted.contains('?'));
    }

    #[test]
    fn placeholder_count_matches_question_marks() {
        for n in [0usize, 1, 9, 10, 23] {
            let sql = vec!["?"; n].join(", ");
            let converted = pg(&sql);
            let expected: Vec<String> = (1..=n).map(|i| format!("${i}")).collect();
            assert_eq!(converted, expected.join(", "));
        }
    }

    #[test]
    fn rewrite_is_idempotent() {
        let inputs = [
            "CREATE TABLE IF NOT EXISTS fines (id INTEGER PRIMARY KEY AUTOINCREMENT, created_at DATETIME DEFAULT CURRENT_TIMESTAMP)",
            "INSERT OR IGNORE INTO fines (a, b) VALUES (?, ?)",
            "SELECT strftime('%Y-%m', fecha), date(fecha) FROM fuel_records WHERE fecha >= date('now', '-6 months') AND x < datetime('now')",
            "SELECT name FROM sqlite_master WHERE type='table'",
        ];
        for sql in inputs {
            let once = pg(sql);
            assert_eq!(pg(&once), once, "second pass changed {once}");
        }
    }

    #[test]
    fn returning_id_is_appended_to_bare_inserts() {
        assert_eq!(
            with_returning_id("INSERT INTO vehicles (user_id, numero_vehiculo) VALUES ($1, $2)"),
            "INSERT INTO vehicles (user_id, numero_vehiculo) VALUES ($1, $2) RETURNING id"
        );
        assert_eq!(
            with_returning_id("  insert into fines (monto) VALUES ($1);\n"),
            "  insert into fines (monto) VALUES ($1) RETURNING id"
        );
        assert!(
            with_returning_id("INSERT INTO t (a) VALUES ($1) ON CONFLICT DO NOTHING")
                .ends_with("ON CONFLICT DO NOTHING RETURNING id")
        );
    }

    #[test]
    fn returning_id_leaves_other_statements_alone() {
        let untouched = [
            "INSERT INTO t (a) VALUES ($1) RETURNING id, a",
            "UPDATE t SET a = $1 WHERE id = $2",
            "DELETE FROM t WHERE id = $1",
            "INSERT OR IGNORE INTO t (a) VALUES (?)",
            "CREATE TABLE t (id SERIAL PRIMARY KEY)",
        ];
        for sql in untouched {
            assert!(matches!(with_returning_id(sql), Cow::Borrowed(_)), "{sql}");
        }
    }

    #[test]
    fn insert_detection() {
        assert!(is_insert("INSERT INTO t VALUES (1)"));
        assert!(is_insert("\n  insert or ignore into t VALUES (1)"));
        assert!(is_insert("REPLACE INTO t VALUES (1)"));
        assert!(!is_insert("UPDATE t SET inserted = 1"));
        assert!(is_insert_into("INSERT INTO t VALUES (1)"));
        assert!(!is_insert_into("INSERT OR IGNORE INTO t VALUES (1)"));
    }

    #[test]
    fn tuple_scanner_rejects_unbalanced_input() {
        assert_eq!(tuple_len("(1, (2)"), None);
        assert_eq!(tuple_len("1, 2)"), None);
        assert_eq!(tuple_len("(')')"), Some(5));
        assert_eq!(tuple_list_len("(1), (2) ON"), Some(8));
    }
}
