use std::error::Error;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::{Row, Statement};

use super::codec;
use crate::error::AccessError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Build a result set using statement metadata for column names, so an empty result still
/// knows its columns.
///
/// # Errors
/// Returns errors from row value extraction.
pub fn build_result_set(stmt: &Statement, rows: &[Row]) -> Result<ResultSet, AccessError> {
    let column_names: Vec<String> = stmt
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let column_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(column_names, rows.len());
    for row in rows {
        let mut row_values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            row_values.push(postgres_extract_value(row, idx)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `AccessError::Statement` if the column cannot be decoded.
pub fn postgres_extract_value(row: &Row, idx: usize) -> Result<RowValues, AccessError> {
    let ty = row.columns()[idx].type_();

    let value = match *ty {
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| RowValues::Int(i64::from(v))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| RowValues::Int(i64::from(v))),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(RowValues::Int),
        Type::OID => row
            .try_get::<_, Option<u32>>(idx)?
            .map(|v| RowValues::Int(i64::from(v))),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| RowValues::Float(f64::from(v))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(RowValues::Float),
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(RowValues::Bool),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(RowValues::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| RowValues::Timestamp(v.naive_utc())),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(RowValues::Timestamp),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(idx)?.map(RowValues::JSON),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(RowValues::Blob),
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(idx)?
            .map(|v| RowValues::Text(v.to_string())),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            row.try_get::<_, Option<String>>(idx)?.map(RowValues::Text)
        }
        _ => row.try_get::<_, Option<Fallback>>(idx)?.map(|v| v.0),
    };

    Ok(value.unwrap_or(RowValues::Null))
}

/// Decoding for column types without a dedicated arm above.
///
/// Types with a known wire layout come back as their server text rendering; types whose
/// binary form is already text (enums, `citext`, `xml`) are read as text; anything else is
/// handed over as raw bytes.
struct Fallback(RowValues);

impl<'a> FromSql<'a> for Fallback {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let text = match *ty {
            Type::NUMERIC => codec::decode_numeric(raw)?,
            Type::UUID => codec::decode_uuid(raw)?,
            Type::INTERVAL => codec::decode_interval(raw)?,
            Type::INET => codec::decode_inet(raw, false)?,
            Type::CIDR => codec::decode_inet(raw, true)?,
            _ if sent_as_text(ty) => std::str::from_utf8(raw)?.to_string(),
            _ => return Ok(Fallback(RowValues::Blob(raw.to_vec()))),
        };
        Ok(Fallback(RowValues::Text(text)))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn sent_as_text(ty: &Type) -> bool {
    match ty.kind() {
        Kind::Enum(_) => true,
        Kind::Domain(base) => sent_as_text(base),
        _ => matches!(ty.name(), "citext" | "xml" | "ltree" | "lquery"),
    }
}
