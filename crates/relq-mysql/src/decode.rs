//! MySQL row decoding into JSON records.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use relq_core::Record;
use serde_json::{Number, Value as JsonValue};
use sqlx::{
    decode::Decode,
    mysql::{MySql, MySqlRow, MySqlValueRef},
    Column, Row, TypeInfo, Value as _, ValueRef,
};

/// Decode one MySQL value by its server type name.
///
/// DECIMAL stays a string so no precision is lost; binary strings become
/// text when they are valid UTF-8 and a byte array otherwise.
pub fn decode_value(vr: MySqlValueRef<'_>) -> Result<JsonValue> {
    if vr.is_null() {
        return Ok(JsonValue::Null);
    }

    let owned = ValueRef::to_owned(&vr);
    let tn = owned.as_ref().type_info().name().to_string();

    macro_rules! dec {
        ($t:ty) => {{
            <$t as Decode<'_, MySql>>::decode(owned.as_ref()).map_err(|e| {
                anyhow!(
                    "decode {} as {} failed: {}",
                    tn,
                    std::any::type_name::<$t>(),
                    e
                )
            })
        }};
    }

    let value = match tn.as_str() {
        // numerics + bool
        "BOOLEAN" => JsonValue::from(dec!(bool)?),
        "TINYINT" => JsonValue::from(dec!(i8)? as i64),
        "SMALLINT" => JsonValue::from(dec!(i16)? as i64),
        "INT" | "MEDIUMINT" => JsonValue::from(dec!(i32)? as i64),
        "BIGINT" => JsonValue::from(dec!(i64)?),
        "TINYINT UNSIGNED" => JsonValue::from(dec!(u8)? as u64),
        "SMALLINT UNSIGNED" => JsonValue::from(dec!(u16)? as u64),
        "INT UNSIGNED" | "MEDIUMINT UNSIGNED" => JsonValue::from(dec!(u32)? as u64),
        "BIGINT UNSIGNED" => JsonValue::from(dec!(u64)?),
        "FLOAT" => float(dec!(f32)? as f64),
        "DOUBLE" => float(dec!(f64)?),
        "YEAR" => JsonValue::from(dec!(u16)? as u64),
        s if s.starts_with("DECIMAL") || s.starts_with("NUMERIC") => {
            JsonValue::from(dec!(String)?)
        }

        // text
        "VARCHAR" | "CHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            JsonValue::from(dec!(String)?)
        }
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" | "BIT" => {
            bytes(dec!(Vec<u8>)?)
        }
        "JSON" => dec!(sqlx::types::Json<JsonValue>)?.0,

        // temporal, ISO-8601
        "DATE" => JsonValue::from(dec!(NaiveDate)?.to_string()),
        "TIME" => JsonValue::from(dec!(NaiveTime)?.to_string()),
        "DATETIME" => JsonValue::from(
            dec!(NaiveDateTime)?
                .and_utc()
                .to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
        ),
        "TIMESTAMP" => JsonValue::from(
            dec!(DateTime<Utc>)?.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
        ),

        other => bail!("Unsupported MySQL type: {other}"),
    };
    Ok(value)
}

fn float(f: f64) -> JsonValue {
    Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number)
}

fn bytes(raw: Vec<u8>) -> JsonValue {
    match String::from_utf8(raw) {
        Ok(s) => JsonValue::String(s),
        Err(e) => JsonValue::Array(e.into_bytes().into_iter().map(JsonValue::from).collect()),
    }
}

/// Decode a whole row, keyed by column label in select order.
pub fn decode_row(row: &MySqlRow) -> Result<Record> {
    let mut record = Record::new();
    for (i, col) in row.columns().iter().enumerate() {
        let vr = row
            .try_get_raw(i)
            .map_err(|e| anyhow!("column {} unavailable: {}", col.name(), e))?;
        record.insert(col.name().to_string(), decode_value(vr)?);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_floats_become_null() {
        assert_eq!(float(f64::NAN), JsonValue::Null);
        assert_eq!(float(1.5), JsonValue::from(1.5));
    }

    #[test]
    fn binary_strings() {
        assert_eq!(bytes(b"abc".to_vec()), JsonValue::from("abc"));
        assert_eq!(
            bytes(vec![0xff, 0x00]),
            JsonValue::Array(vec![JsonValue::from(255), JsonValue::from(0)])
        );
    }
}
