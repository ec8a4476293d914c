// Binary wire formats for server types that have no native Rust counterpart in this crate.
// Values of these types are exchanged as their text rendering.

use std::error::Error;
use std::fmt::Write as _;
use std::net::{Ipv4Addr, Ipv6Addr};

use tokio_util::bytes::{BufMut, BytesMut};

type CodecError = Box<dyn Error + Sync + Send>;

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;
const NBASE_DIGITS: usize = 4;

fn read_u16(raw: &[u8], at: usize) -> Result<u16, CodecError> {
    raw.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "truncated value".into())
}

fn read_i32(raw: &[u8], at: usize) -> Result<i32, CodecError> {
    raw.get(at..at + 4)
        .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| "truncated value".into())
}

fn read_i64(raw: &[u8], at: usize) -> Result<i64, CodecError> {
    let bytes: [u8; 8] = raw
        .get(at..at + 8)
        .and_then(|b| b.try_into().ok())
        .ok_or("truncated value")?;
    Ok(i64::from_be_bytes(bytes))
}

/// Render a binary `numeric` the way the server prints it (`1.5000`, `-0.05`, `NaN`).
pub(crate) fn decode_numeric(raw: &[u8]) -> Result<String, CodecError> {
    let ndigits = usize::from(read_u16(raw, 0)?);
    #[allow(clippy::cast_possible_wrap)]
    let weight = read_u16(raw, 2)? as i16;
    let sign = read_u16(raw, 4)?;
    let dscale = usize::from(read_u16(raw, 6)?);
    let digits = (0..ndigits)
        .map(|i| read_u16(raw, 8 + 2 * i))
        .collect::<Result<Vec<u16>, _>>()?;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(format!("invalid numeric sign {other:#x}").into()),
    }

    let digit_at = |pos: i32| -> u16 {
        usize::try_from(pos)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG {
        text.push('-');
    }
    let weight = i32::from(weight);
    if weight < 0 {
        text.push('0');
    } else {
        for pos in 0..=weight {
            let group = digit_at(pos);
            if pos == 0 {
                let _ = write!(text, "{group}");
            } else {
                let _ = write!(text, "{group:04}");
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + NBASE_DIGITS);
        let mut pos = weight + 1;
        while fraction.len() < dscale {
            let _ = write!(fraction, "{:04}", digit_at(pos));
            pos += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }
    Ok(text)
}

/// Encode decimal text (`-12.345`, `NaN`) as a binary `numeric`.
pub(crate) fn encode_numeric(text: &str, out: &mut BytesMut) -> Result<(), CodecError> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("nan") {
        out.put_u16(0);
        out.put_i16(0);
        out.put_u16(NUMERIC_NAN);
        out.put_u16(0);
        return Ok(());
    }

    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let valid = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !valid(int_part) || !valid(frac_part) {
        return Err(format!("{text:?} is not a decimal number").into());
    }

    let int_pad = (NBASE_DIGITS - int_part.len() % NBASE_DIGITS) % NBASE_DIGITS;
    let frac_pad = (NBASE_DIGITS - frac_part.len() % NBASE_DIGITS) % NBASE_DIGITS;
    let padded: Vec<u8> = std::iter::repeat_n(b'0', int_pad)
        .chain(int_part.bytes())
        .chain(frac_part.bytes())
        .chain(std::iter::repeat_n(b'0', frac_pad))
        .collect();
    let mut groups: Vec<u16> = padded
        .chunks(NBASE_DIGITS)
        .map(|chunk| chunk.iter().fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0')))
        .collect();

    let int_groups = (int_part.len() + int_pad) / NBASE_DIGITS;
    let mut weight = i32::try_from(int_groups).map_err(|_| "numeric too large")? - 1;
    let leading = groups.iter().take_while(|g| **g == 0).count();
    groups.drain(..leading);
    weight -= i32::try_from(leading).map_err(|_| "numeric too large")?;
    while groups.last() == Some(&0) {
        groups.pop();
    }
    if groups.is_empty() {
        weight = 0;
    }

    let ndigits = u16::try_from(groups.len()).map_err(|_| "numeric too large")?;
    let weight = i16::try_from(weight).map_err(|_| "numeric too large")?;
    let dscale = u16::try_from(frac_part.len()).map_err(|_| "numeric scale too large")?;
    out.put_u16(ndigits);
    out.put_i16(weight);
    out.put_u16(if negative && !groups.is_empty() {
        NUMERIC_NEG
    } else {
        NUMERIC_POS
    });
    out.put_u16(dscale);
    for group in groups {
        out.put_u16(group);
    }
    Ok(())
}

/// Canonical lower-case `8-4-4-4-12` form of a 16-byte `uuid`.
pub(crate) fn decode_uuid(raw: &[u8]) -> Result<String, CodecError> {
    if raw.len() != 16 {
        return Err(format!("uuid must be 16 bytes, got {}", raw.len()).into());
    }
    let mut text = String::with_capacity(36);
    for (i, byte) in raw.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            text.push('-');
        }
        let _ = write!(text, "{byte:02x}");
    }
    Ok(text)
}

/// Accepts hyphenated or plain hex, optionally in braces.
pub(crate) fn encode_uuid(text: &str, out: &mut BytesMut) -> Result<(), CodecError> {
    let hex: Vec<u8> = text
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .bytes()
        .filter(|b| *b != b'-')
        .collect();
    if hex.len() != 32 {
        return Err(format!("{text:?} is not a uuid").into());
    }
    for pair in hex.chunks(2) {
        let pair = std::str::from_utf8(pair)?;
        out.put_u8(u8::from_str_radix(pair, 16).map_err(|_| format!("{text:?} is not a uuid"))?);
    }
    Ok(())
}

fn plural(text: &mut String, value: i32, unit: &str) {
    if value != 0 {
        if !text.is_empty() {
            text.push(' ');
        }
        let suffix = if value.abs() == 1 { "" } else { "s" };
        let _ = write!(text, "{value} {unit}{suffix}");
    }
}

/// `interval` in the server's default output style: `1 year 2 mons 3 days 04:05:06.5`.
pub(crate) fn decode_interval(raw: &[u8]) -> Result<String, CodecError> {
    let micros = read_i64(raw, 0)?;
    let days = read_i32(raw, 8)?;
    let months = read_i32(raw, 12)?;

    let mut text = String::new();
    plural(&mut text, months / 12, "year");
    plural(&mut text, months % 12, "mon");
    plural(&mut text, days, "day");

    if micros != 0 || text.is_empty() {
        if !text.is_empty() {
            text.push(' ');
        }
        if micros < 0 {
            text.push('-');
        }
        let total = micros.unsigned_abs();
        let secs = total / 1_000_000;
        let frac = total % 1_000_000;
        let _ = write!(
            text,
            "{:02}:{:02}:{:02}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60
        );
        if frac != 0 {
            let digits = format!("{frac:06}");
            text.push('.');
            text.push_str(digits.trim_end_matches('0'));
        }
    }
    Ok(text)
}

/// `inet` / `cidr`: address, with `/bits` unless an `inet` covers a single host.
pub(crate) fn decode_inet(raw: &[u8], is_cidr_type: bool) -> Result<String, CodecError> {
    let header = raw.get(..4).ok_or("truncated value")?;
    let (family, bits, len) = (header[0], header[1], usize::from(header[3]));
    let addr = raw.get(4..4 + len).ok_or("truncated value")?;
    let (text, max_bits) = match family {
        2 => {
            let octets: [u8; 4] = addr.try_into().map_err(|_| "bad inet address length")?;
            (Ipv4Addr::from(octets).to_string(), 32)
        }
        3 => {
            let octets: [u8; 16] = addr.try_into().map_err(|_| "bad inet address length")?;
            (Ipv6Addr::from(octets).to_string(), 128)
        }
        other => return Err(format!("unknown inet family {other}").into()),
    };
    if is_cidr_type || bits != max_bits {
        Ok(format!("{text}/{bits}"))
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_round_trip(text: &str) -> String {
        let mut out = BytesMut::new();
        encode_numeric(text, &mut out).unwrap();
        decode_numeric(&out).unwrap()
    }

    #[test]
    fn numeric_keeps_scale_and_sign() {
        assert_eq!(numeric_round_trip("1.5"), "1.5");
        assert_eq!(numeric_round_trip("-0.05"), "-0.05");
        assert_eq!(numeric_round_trip("12345678.000"), "12345678.000");
        assert_eq!(numeric_round_trip("0"), "0");
        assert_eq!(numeric_round_trip("100000000"), "100000000");
        assert_eq!(numeric_round_trip("NaN"), "NaN");
    }

    #[test]
    fn numeric_decodes_server_layout() {
        // avg of 1 and 2: digits [1, 5000], weight 0, scale 16.
        let raw = [0, 2, 0, 0, 0, 0, 0, 16, 0, 1, 0x13, 0x88];
        assert_eq!(decode_numeric(&raw).unwrap(), "1.5000000000000000");
    }

    #[test]
    fn numeric_rejects_non_decimal_text() {
        let mut out = BytesMut::new();
        assert!(encode_numeric("1e5", &mut out).is_err());
        assert!(encode_numeric(".", &mut out).is_err());
    }

    #[test]
    fn uuid_round_trips_through_text() {
        let text = "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11";
        let mut out = BytesMut::new();
        encode_uuid(text, &mut out).unwrap();
        assert_eq!(out.len(), 16);
        assert_eq!(decode_uuid(&out).unwrap(), text);
        assert!(encode_uuid("not-a-uuid", &mut BytesMut::new()).is_err());
    }

    #[test]
    fn interval_uses_server_style() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(7_384_500_000i64).to_be_bytes());
        raw.extend_from_slice(&1i32.to_be_bytes());
        raw.extend_from_slice(&14i32.to_be_bytes());
        assert_eq!(
            decode_interval(&raw).unwrap(),
            "1 year 2 mons 1 day 02:03:04.5"
        );

        let zero = [0u8; 16];
        assert_eq!(decode_interval(&zero).unwrap(), "00:00:00");
    }

    #[test]
    fn inet_omits_full_host_mask() {
        assert_eq!(decode_inet(&[2, 32, 0, 4, 10, 0, 0, 1], false).unwrap(), "10.0.0.1");
        assert_eq!(decode_inet(&[2, 8, 1, 4, 10, 0, 0, 0], true).unwrap(), "10.0.0.0/8");
    }
}
