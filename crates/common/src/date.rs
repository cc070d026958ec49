use std::fmt;

const TIME_SEPARATORS: [&[u8]; 5] = [b"-.", b"-.", b"T ", b":.", b":."];

/// A variable-precision timestamp: year, then optionally month, day, hour,
/// minute and second. Missing trailing components sort before present ones.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Date {
    tokens: Vec<u32>,
}

impl Date {
    /// Parses an ISO-8601 style timestamp, falling back to a bare year.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        match parse_iso_tokens(value) {
            Some(tokens) => Self::from_tokens(&tokens),
            None => value.parse::<i64>().ok().and_then(Self::from_year),
        }
    }

    /// Integers shaped like `yyyymmdd` are read as full dates.
    pub fn from_year(year: i64) -> Option<Self> {
        if (10_000_000..100_000_000).contains(&year) {
            Self::from_tokens(&[year / 10_000, (year / 100) % 100, year % 100])
        } else {
            Self::from_tokens(&[year])
        }
    }

    fn from_tokens(src: &[i64]) -> Option<Self> {
        const RANGES: [(i64, i64); 6] = [
            (1, u32::MAX as i64),
            (1, 12),
            (1, 31),
            (0, 23),
            (0, 59),
            (0, 59),
        ];
        let mut tokens = Vec::new();
        for (value, (min, max)) in src.iter().zip(RANGES.iter()) {
            if *value < *min || *value > *max {
                break;
            }
            tokens.push(*value as u32);
        }
        if tokens.is_empty() {
            None
        } else {
            Some(Self { tokens })
        }
    }

    pub fn year(&self) -> u32 {
        self.tokens[0]
    }

    pub fn month(&self) -> Option<u32> {
        self.tokens.get(1).copied()
    }

    pub fn day(&self) -> Option<u32> {
        self.tokens.get(2).copied()
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.tokens[0])?;
        let prefixes = ["-", "-", "T", ":", ":"];
        for (token, prefix) in self.tokens[1..].iter().zip(prefixes.iter()) {
            write!(f, "{}{:02}", prefix, token)?;
        }
        if self.tokens.len() > 3 {
            write!(f, "Z")?;
        }
        Ok(())
    }
}

fn parse_iso_tokens(value: &str) -> Option<Vec<i64>> {
    let bytes = value.as_bytes();
    let mut tokens = vec![fixed_digits(bytes, 0, 4)?];
    let mut pos = 4;
    for separators in TIME_SEPARATORS {
        if pos >= bytes.len() || (bytes[pos] == b'Z' && tokens.len() > 3) {
            break;
        }
        if !separators.contains(&bytes[pos]) {
            return None;
        }
        tokens.push(fixed_digits(bytes, pos + 1, 2)?);
        pos += 3;
    }
    match &bytes[pos..] {
        [] => Some(tokens),
        [b'Z'] if tokens.len() > 3 => Some(tokens),
        _ => None,
    }
}

fn fixed_digits(bytes: &[u8], start: usize, len: usize) -> Option<i64> {
    let slice = bytes.get(start..start + len)?;
    if !slice.iter().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(
        slice
            .iter()
            .fold(0i64, |acc, b| acc * 10 + i64::from(b - b'0')),
    )
}

/// The earliest and latest of a set of dates.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub min: Date,
    pub max: Date,
}

impl DateRange {
    pub fn from_dates<'a>(dates: impl IntoIterator<Item = &'a Date>) -> Option<Self> {
        let mut range: Option<DateRange> = None;
        for date in dates {
            range = Some(match range {
                None => DateRange {
                    min: date.clone(),
                    max: date.clone(),
                },
                Some(mut range) => {
                    if *date < range.min {
                        range.min = date.clone();
                    }
                    if *date > range.max {
                        range.max = date.clone();
                    }
                    range
                }
            });
        }
        range
    }
}
