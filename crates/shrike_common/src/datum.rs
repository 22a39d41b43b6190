use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A single scalar value: the unit of data flowing through routing arguments,
/// bound parameters, and merged result rows. Small enum, no heap allocation
/// for fixed-size types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Text(String),
    /// Microseconds since Unix epoch.
    Timestamp(i64),
    /// Days since Unix epoch (1970-01-01).
    Date(i32),
    /// Fixed-point decimal: mantissa × 10^(-scale).
    Decimal(i128, u8),
    Bytes(Vec<u8>),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int64(v) => Some(*v),
            Datum::Boolean(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Int64(v) => Some(*v as f64),
            Datum::Float64(v) => Some(*v),
            Datum::Decimal(m, s) => Some(*m as f64 / 10f64.powi(*s as i32)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Stable binary encoding used by hash partitioning. Each value is
    /// prefixed with a type tag so that e.g. `Int64(0)` and `Text("")`
    /// never collide.
    pub fn encode_for_hash(&self, buf: &mut Vec<u8>) {
        match self {
            Datum::Null => buf.push(0x00),
            Datum::Boolean(b) => {
                buf.push(0x01);
                buf.push(*b as u8);
            }
            Datum::Int64(v) => {
                buf.push(0x02);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            Datum::Float64(v) => {
                buf.push(0x03);
                buf.extend_from_slice(&v.to_bits().to_le_bytes());
            }
            Datum::Text(s) => {
                buf.push(0x04);
                buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
            Datum::Timestamp(us) => {
                buf.push(0x05);
                buf.extend_from_slice(&us.to_le_bytes());
            }
            Datum::Date(days) => {
                buf.push(0x06);
                buf.extend_from_slice(&days.to_le_bytes());
            }
            Datum::Decimal(m, s) => {
                buf.push(0x07);
                buf.extend_from_slice(&m.to_le_bytes());
                buf.push(*s);
            }
            Datum::Bytes(b) => {
                buf.push(0x08);
                buf.extend_from_slice(&(b.len() as u32).to_le_bytes());
                buf.extend_from_slice(b);
            }
        }
    }

    /// Render as a SQL literal for translated statement text.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Datum::Null => "NULL".to_string(),
            Datum::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Datum::Int64(v) => v.to_string(),
            Datum::Float64(v) => v.to_string(),
            Datum::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Datum::Timestamp(_) | Datum::Date(_) => format!("'{}'", self),
            Datum::Decimal(m, s) => decimal_to_string(*m, *s),
            Datum::Bytes(b) => {
                let hex: String = b.iter().map(|x| format!("{:02x}", x)).collect();
                format!("x'{}'", hex)
            }
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Datum::Null => 0,
            Datum::Boolean(_) => 1,
            Datum::Int64(_) | Datum::Float64(_) | Datum::Decimal(_, _) => 2,
            Datum::Text(_) => 3,
            Datum::Timestamp(_) => 4,
            Datum::Date(_) => 5,
            Datum::Bytes(_) => 6,
        }
    }
}

/// Total order used for range-argument comparison and merge-side sorting.
/// Nulls sort first; numeric types compare cross-type by value; otherwise
/// values compare within their own type, with a stable rank between types.
impl Ord for Datum {
    fn cmp(&self, other: &Self) -> Ordering {
        use Datum::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Int64(a), Int64(b)) => a.cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            _ => {
                // Cross-type numeric comparison via f64.
                if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
                    return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
                }
                self.type_rank().cmp(&other.type_rank())
            }
        }
    }
}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Datum {}

/// Hash must agree with the cross-type numeric equality above: every
/// numeric variant hashes through its `f64` value, so `Int64(2)`,
/// `Float64(2.0)`, and `Decimal(200, 2)` land in the same bucket.
impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Datum::Int64(_) | Datum::Float64(_) | Datum::Decimal(_, _) => {
                state.write_u8(0xF0);
                let mut v = self.as_f64().unwrap_or(0.0);
                if v == 0.0 {
                    v = 0.0; // -0.0 and 0.0 compare equal
                }
                state.write_u64(v.to_bits());
            }
            other => {
                let mut buf = Vec::with_capacity(16);
                other.encode_for_hash(&mut buf);
                buf.hash(state);
            }
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Boolean(b) => write!(f, "{}", b),
            Datum::Int64(v) => write!(f, "{}", v),
            Datum::Float64(v) => write!(f, "{}", v),
            Datum::Text(s) => write!(f, "{}", s),
            Datum::Timestamp(us) => {
                let secs = us / 1_000_000;
                let nsecs = ((us % 1_000_000) * 1000) as u32;
                match chrono::DateTime::from_timestamp(secs, nsecs) {
                    Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
                    None => write!(f, "{}", us),
                }
            }
            Datum::Date(days) => {
                let epoch = chrono::NaiveDate::from_ymd_opt(1970, 1, 1)
                    .unwrap_or(chrono::NaiveDate::MIN);
                match epoch.checked_add_signed(chrono::Duration::days(*days as i64)) {
                    Some(d) => write!(f, "{}", d.format("%Y-%m-%d")),
                    None => write!(f, "{}", days),
                }
            }
            Datum::Decimal(m, s) => write!(f, "{}", decimal_to_string(*m, *s)),
            Datum::Bytes(b) => {
                for x in b {
                    write!(f, "{:02x}", x)?;
                }
                Ok(())
            }
        }
    }
}

fn decimal_to_string(mantissa: i128, scale: u8) -> String {
    if scale == 0 {
        return mantissa.to_string();
    }
    let neg = mantissa < 0;
    let abs = mantissa.unsigned_abs().to_string();
    let scale = scale as usize;
    let (int_part, frac_part) = if abs.len() > scale {
        let split = abs.len() - scale;
        (abs[..split].to_string(), abs[split..].to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", abs, width = scale))
    };
    format!("{}{}.{}", if neg { "-" } else { "" }, int_part, frac_part)
}

/// A single result row handed back from a worker cursor.
pub type Row = Vec<Datum>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_type_numeric_compare() {
        assert_eq!(Datum::Int64(2).cmp(&Datum::Float64(2.0)), Ordering::Equal);
        assert_eq!(Datum::Int64(2).cmp(&Datum::Float64(2.5)), Ordering::Less);
        assert_eq!(
            Datum::Decimal(250, 2).cmp(&Datum::Int64(2)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_null_sorts_first() {
        assert_eq!(Datum::Null.cmp(&Datum::Int64(i64::MIN)), Ordering::Less);
        assert_eq!(Datum::Text("".into()).cmp(&Datum::Null), Ordering::Greater);
    }

    #[test]
    fn test_hash_encoding_is_type_tagged() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        Datum::Int64(0).encode_for_hash(&mut a);
        Datum::Text(String::new()).encode_for_hash(&mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_sql_literal_escapes_quotes() {
        assert_eq!(
            Datum::Text("o'brien".into()).to_sql_literal(),
            "'o''brien'"
        );
        assert_eq!(Datum::Null.to_sql_literal(), "NULL");
        assert_eq!(Datum::Int64(42).to_sql_literal(), "42");
    }

    #[test]
    fn test_decimal_rendering() {
        assert_eq!(Datum::Decimal(12345, 2).to_sql_literal(), "123.45");
        assert_eq!(Datum::Decimal(-5, 3).to_sql_literal(), "-0.005");
    }
}
