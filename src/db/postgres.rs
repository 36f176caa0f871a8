use crate::db::models::Row;
use crate::db::params::{Param, Params};
use crate::error::FleetDbError;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::{Oid, PgInterval, PgTimeTz};
use sqlx::postgres::{
    PgArgumentBuffer, PgArguments, PgConnectOptions, PgPoolOptions, PgRow, PgSslMode,
    PgTypeInfo, PgTypeKind, PgValueFormat, PgValueRef,
};
use sqlx::query::Query;
use sqlx::{Column, Encode, Pool, Postgres, Row as _, Type, TypeInfo, ValueRef};
use std::fmt::Write;
use std::str::FromStr;
use tracing::debug;
use url::Url;

pub type PgPool = Pool<Postgres>;

/// Build a lazily connecting pool; nothing touches the network until first use.
///
/// TLS is off for local hosts and required (unverified) otherwise, unless the
/// URL carries its own `sslmode`.
pub fn connect_lazy(database_url: &str, pool_size: u32) -> Result<PgPool, FleetDbError> {
    let parsed = Url::parse(database_url)?;
    let explicit_ssl = parsed
        .query_pairs()
        .any(|(k, _)| k == "sslmode" || k == "ssl-mode");

    let mut connect_opts = PgConnectOptions::from_str(database_url)?;
    if !explicit_ssl {
        let mode = if is_local(&parsed, database_url) {
            PgSslMode::Disable
        } else {
            PgSslMode::Require
        };
        debug!(?mode, "postgres ssl mode");
        connect_opts = connect_opts.ssl_mode(mode);
    }

    Ok(PgPoolOptions::new()
        .max_connections(pool_size.max(1))
        .connect_lazy_with(connect_opts))
}

fn is_local(parsed: &Url, raw: &str) -> bool {
    matches!(
        parsed.host_str(),
        Some("localhost" | "127.0.0.1" | "[::1]" | "::1")
    ) || raw.contains("localhost")
}

/// NULL bound without a declared type, so the server infers it from context
/// (a typed NULL would fail against columns of another type).
#[derive(Debug, Clone, Copy)]
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl<'q> Encode<'q, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

pub(crate) fn bind<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &Params,
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            Param::Null => query.bind(UntypedNull),
            Param::Bool(v) => query.bind(*v),
            Param::Int(v) => query.bind(*v),
            Param::Float(v) => query.bind(*v),
            Param::Text(v) => query.bind(v.clone()),
            Param::Bytes(v) => query.bind(v.clone()),
            Param::Date(v) => query.bind(*v),
            Param::Timestamp(v) => query.bind(*v),
        };
    }
    query
}

/// `id` column of a row returned by `RETURNING id`, whatever its integer width.
pub(crate) fn returned_id(row: &PgRow) -> Option<i64> {
    row.try_get::<i64, _>("id")
        .ok()
        .or_else(|| row.try_get::<i32, _>("id").ok().map(i64::from))
        .or_else(|| row.try_get::<i16, _>("id").ok().map(i64::from))
}

pub(crate) fn row_to_json(row: &PgRow) -> Result<Row, FleetDbError> {
    let mut out = Row::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let info = raw.type_info();
            match info.name() {
                "BOOL" => Value::Bool(row.try_get_unchecked::<bool, _>(idx)?),
                "INT2" => Value::from(row.try_get_unchecked::<i16, _>(idx)?),
                "INT4" => Value::from(row.try_get_unchecked::<i32, _>(idx)?),
                "INT8" => Value::from(row.try_get_unchecked::<i64, _>(idx)?),
                "FLOAT4" => Value::from(f64::from(row.try_get_unchecked::<f32, _>(idx)?)),
                "FLOAT8" => Value::from(row.try_get_unchecked::<f64, _>(idx)?),
                "NUMERIC" => Value::String(numeric_value(&raw)?),
                "TEXT" | "VARCHAR" | "CHAR" | "NAME" => {
                    Value::String(row.try_get_unchecked::<String, _>(idx)?)
                }
                "DATE" => Value::String(row.try_get_unchecked::<NaiveDate, _>(idx)?.to_string()),
                "TIME" => Value::String(row.try_get_unchecked::<NaiveTime, _>(idx)?.to_string()),
                "TIMETZ" => {
                    let tz = row.try_get_unchecked::<PgTimeTz<NaiveTime, FixedOffset>, _>(idx)?;
                    Value::String(format!("{}{}", tz.time, tz.offset))
                }
                "INTERVAL" => Value::String(interval_text(&row.try_get_unchecked::<PgInterval, _>(idx)?)),
                "OID" => Value::from(row.try_get_unchecked::<Oid, _>(idx)?.0),
                "TIMESTAMP" => Value::String(
                    row.try_get_unchecked::<NaiveDateTime, _>(idx)?
                        .format("%Y-%m-%d %H:%M:%S%.f")
                        .to_string(),
                ),
                "TIMESTAMPTZ" => Value::String(
                    row.try_get_unchecked::<DateTime<Utc>, _>(idx)?
                        .to_rfc3339(),
                ),
                "JSON" | "JSONB" => row.try_get_unchecked::<Value, _>(idx)?,
                "BYTEA" => Value::String(STANDARD.encode(row.try_get_unchecked::<Vec<u8>, _>(idx)?)),
                "UUID" => Value::String(uuid_text(raw_bytes(&raw)?)),
                "TEXT[]" | "VARCHAR[]" => Value::from(row.try_get_unchecked::<Vec<String>, _>(idx)?),
                "INT4[]" => Value::from(row.try_get_unchecked::<Vec<i32>, _>(idx)?),
                "INT8[]" => Value::from(row.try_get_unchecked::<Vec<i64>, _>(idx)?),
                _ => Value::String(fallback_text(&raw)?),
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn raw_bytes<'r>(raw: &PgValueRef<'r>) -> Result<&'r [u8], FleetDbError> {
    raw.as_bytes()
        .map_err(|e| FleetDbError::DatabaseError(sqlx::Error::Decode(e)))
}

/// NUMERIC as its exact decimal text.
fn numeric_value(raw: &PgValueRef<'_>) -> Result<String, FleetDbError> {
    if raw.format() == PgValueFormat::Text {
        return Ok(raw
            .as_str()
            .map_err(|e| FleetDbError::DatabaseError(sqlx::Error::Decode(e)))?
            .to_string());
    }
    numeric_text(raw_bytes(raw)?).ok_or_else(|| {
        FleetDbError::DatabaseError(sqlx::Error::Decode("malformed NUMERIC value".into()))
    })
}

/// Render the binary NUMERIC wire format: ndigits, weight, sign and dscale
/// headers followed by base-10000 digit groups.
pub(crate) fn numeric_text(bytes: &[u8]) -> Option<String> {
    let word = |i: usize| -> Option<u16> {
        bytes
            .get(i * 2..i * 2 + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
    };
    let ndigits = usize::from(word(0)?);
    let weight = i64::from(word(1)? as i16);
    let sign = word(2)?;
    let dscale = usize::from(word(3)?);
    let digits = (0..ndigits)
        .map(|i| word(4 + i))
        .collect::<Option<Vec<u16>>>()?;

    match sign {
        0x0000 | 0x4000 => {}
        0xC000 => return Some("NaN".to_string()),
        0xD000 => return Some("Infinity".to_string()),
        0xF000 => return Some("-Infinity".to_string()),
        _ => return None,
    }

    let group = |pos: i64| -> u16 {
        usize::try_from(pos)
            .ok()
            .and_then(|p| digits.get(p).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == 0x4000 && digits.iter().any(|d| *d != 0) {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for pos in 0..=weight {
            if pos == 0 {
                let _ = write!(out, "{}", group(pos));
            } else {
                let _ = write!(out, "{:04}", group(pos));
            }
        }
    }
    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut pos = weight + 1;
        while frac.len() < dscale {
            let _ = write!(frac, "{:04}", group(pos));
            pos += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }
    Some(out)
}

fn uuid_text(bytes: &[u8]) -> String {
    if bytes.len() != 16 {
        return STANDARD.encode(bytes);
    }
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Postgres-style interval text: `1 year 2 mons 3 days 04:05:06.5`.
pub(crate) fn interval_text(iv: &PgInterval) -> String {
    fn unit(n: i64, name: &str) -> String {
        if n == 1 {
            format!("{n} {name}")
        } else {
            format!("{n} {name}s")
        }
    }

    let mut parts = Vec::new();
    let (years, months) = (iv.months / 12, iv.months % 12);
    if years != 0 {
        parts.push(unit(years.into(), "year"));
    }
    if months != 0 {
        parts.push(unit(months.into(), "mon"));
    }
    if iv.days != 0 {
        parts.push(unit(iv.days.into(), "day"));
    }
    if iv.microseconds != 0 || parts.is_empty() {
        let sign = if iv.microseconds < 0 { "-" } else { "" };
        let micros = iv.microseconds.unsigned_abs();
        let secs = micros / 1_000_000;
        let mut clock = format!(
            "{sign}{:02}:{:02}:{:02}",
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let frac = micros % 1_000_000;
        if frac != 0 {
            let digits = format!("{frac:06}");
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }
    parts.join(" ")
}

/// Types without a dedicated mapping. Text-format values and enum labels are
/// returned as written; other binary payloads are base64 encoded.
fn fallback_text(raw: &PgValueRef<'_>) -> Result<String, FleetDbError> {
    if raw.format() == PgValueFormat::Text {
        return Ok(raw
            .as_str()
            .map_err(|e| FleetDbError::DatabaseError(sqlx::Error::Decode(e)))?
            .to_string());
    }
    let bytes = raw_bytes(raw)?;
    let info = raw.type_info();
    let textual = matches!(info.kind(), PgTypeKind::Enum(_))
        || matches!(info.name(), "CITEXT" | "UNKNOWN" | "XML");
    if textual && let Ok(s) = std::str::from_utf8(bytes) {
        return Ok(s.to_string());
    }
    Ok(STANDARD.encode(bytes))
}
