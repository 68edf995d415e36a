use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParsingError {
    #[error("Invalid content range: {0}")]
    InvalidContentRange(String),
}

type Result<T> = std::result::Result<T, ParsingError>;

/// Row window reported by the backend in the `Content-Range` header,
/// like `0-9/25`, `*/0` or `10-19/*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub first: Option<u64>,
    pub last: Option<u64>,
    pub total: Option<u64>,
}

pub fn parse_content_range(s: &str) -> Result<ContentRange> {
    let invalid = || ParsingError::InvalidContentRange(s.to_string());
    let (range, total) = s.trim().split_once('/').ok_or_else(invalid)?;

    let total = match total {
        "*" => None,
        t => Some(t.parse::<u64>().map_err(|_| invalid())?),
    };
    let (first, last) = match range {
        "*" => (None, None),
        r => {
            let (first, last) = r.split_once('-').ok_or_else(invalid)?;
            let first = first.parse::<u64>().map_err(|_| invalid())?;
            let last = last.parse::<u64>().map_err(|_| invalid())?;
            (Some(first), Some(last))
        }
    };
    Ok(ContentRange { first, last, total })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_content_range() {
        assert_eq!(
            parse_content_range("0-9/25").unwrap(),
            ContentRange {
                first: Some(0),
                last: Some(9),
                total: Some(25)
            }
        );
        assert_eq!(
            parse_content_range("*/0").unwrap(),
            ContentRange {
                first: None,
                last: None,
                total: Some(0)
            }
        );
        assert_eq!(parse_content_range("10-19/*").unwrap().total, None);
        assert!(parse_content_range("garbage").is_err());
        assert!(parse_content_range("a-b/3").is_err());
    }
}
