use std::error::Error;

use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes;

use super::codec;
use crate::types::RowValues;

/// Borrowed view of arguments in the shape `tokio-postgres` expects.
pub struct Params<'a> {
    references: Vec<&'a (dyn ToSql + Sync)>,
}

impl<'a> Params<'a> {
    #[must_use]
    pub fn convert(params: &'a [RowValues]) -> Params<'a> {
        let mut references = Vec::with_capacity(params.len());
        for p in params {
            references.push(p as &(dyn ToSql + Sync));
        }
        Params { references }
    }

    #[must_use]
    pub fn as_refs(&self) -> &[&(dyn ToSql + Sync)] {
        &self.references
    }
}

fn narrow<T: TryFrom<i64>>(value: i64, ty: &Type) -> Result<T, Box<dyn Error + Sync + Send>> {
    T::try_from(value).map_err(|_| format!("{value} does not fit in {ty}").into())
}

fn numeric(text: &str, out: &mut bytes::BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
    codec::encode_numeric(text, out)?;
    Ok(IsNull::No)
}

impl ToSql for RowValues {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        // The server decides the parameter type; narrow to the width it asked for.
        match self {
            RowValues::Int(i) => match *ty {
                Type::NUMERIC => numeric(&i.to_string(), out),
                Type::INT2 => narrow::<i16>(*i, ty)?.to_sql(ty, out),
                Type::INT4 => narrow::<i32>(*i, ty)?.to_sql(ty, out),
                #[allow(clippy::cast_precision_loss)]
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                #[allow(clippy::cast_precision_loss)]
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                _ => (*i).to_sql(ty, out),
            },
            #[allow(clippy::cast_possible_truncation)]
            RowValues::Float(f) if *ty == Type::FLOAT4 => (*f as f32).to_sql(ty, out),
            RowValues::Float(f) if *ty == Type::NUMERIC => {
                if f.is_infinite() {
                    return Err(format!("{f} cannot be stored as numeric").into());
                }
                numeric(&f.to_string(), out)
            }
            RowValues::Float(f) => (*f).to_sql(ty, out),
            RowValues::Text(s) => match *ty {
                Type::NUMERIC => numeric(s, out),
                Type::UUID => {
                    codec::encode_uuid(s, out)?;
                    Ok(IsNull::No)
                }
                _ => s.to_sql(ty, out),
            },
            RowValues::Bool(b) => (*b).to_sql(ty, out),
            RowValues::Timestamp(dt) => match *ty {
                Type::TIMESTAMPTZ => dt.and_utc().to_sql(ty, out),
                Type::DATE => dt.date().to_sql(ty, out),
                _ => dt.to_sql(ty, out),
            },
            RowValues::Null => Ok(IsNull::Yes),
            RowValues::JSON(jsval) => jsval.to_sql(ty, out),
            RowValues::Blob(bytes) => bytes.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::TEXT
                | Type::VARCHAR
                | Type::BPCHAR
                | Type::CHAR
                | Type::NAME
                | Type::BOOL
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
                | Type::JSON
                | Type::JSONB
                | Type::BYTEA
                | Type::NUMERIC
                | Type::UUID
                | Type::UNKNOWN
        )
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_float_bind_to_numeric() {
        let mut out = bytes::BytesMut::new();
        RowValues::Float(1.5)
            .to_sql_checked(&Type::NUMERIC, &mut out)
            .unwrap();
        assert_eq!(codec::decode_numeric(&out).unwrap(), "1.5");

        let mut out = bytes::BytesMut::new();
        RowValues::Text("-12.250".into())
            .to_sql_checked(&Type::NUMERIC, &mut out)
            .unwrap();
        assert_eq!(codec::decode_numeric(&out).unwrap(), "-12.250");

        let mut out = bytes::BytesMut::new();
        RowValues::Int(42).to_sql_checked(&Type::NUMERIC, &mut out).unwrap();
        assert_eq!(codec::decode_numeric(&out).unwrap(), "42");
    }

    #[test]
    fn text_binds_to_uuid() {
        let mut out = bytes::BytesMut::new();
        RowValues::Text("A0EEBC99-9C0B-4EF8-BB6D-6BB9BD380A11".into())
            .to_sql_checked(&Type::UUID, &mut out)
            .unwrap();
        assert_eq!(
            codec::decode_uuid(&out).unwrap(),
            "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11"
        );
    }

    #[test]
    fn malformed_text_is_rejected_before_sending() {
        let mut out = bytes::BytesMut::new();
        assert!(RowValues::Text("abc".into())
            .to_sql_checked(&Type::NUMERIC, &mut out)
            .is_err());
        assert!(RowValues::Float(f64::INFINITY)
            .to_sql_checked(&Type::NUMERIC, &mut out)
            .is_err());
    }

    #[test]
    fn integers_narrow_to_the_parameter_width() {
        let mut out = bytes::BytesMut::new();
        RowValues::Int(7).to_sql_checked(&Type::INT4, &mut out).unwrap();
        assert_eq!(out.len(), 4);
        assert!(RowValues::Int(i64::MAX)
            .to_sql_checked(&Type::INT2, &mut bytes::BytesMut::new())
            .is_err());
    }
}
