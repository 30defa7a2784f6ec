//! Decrypted payload grammar: `<body>_<unix timestamp>`.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static TOKEN_PAYLOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A(.+)_([0-9]{10,})\z").expect("invalid token payload pattern")
});

// Printable ASCII letters, digits, whitespace and a fixed punctuation set.
// `_` is deliberately absent: it only ever separates body from timestamp.
static MESSAGE_PAYLOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\A([A-Za-z0-9 \t\r\n\x0B\x0C!@#$%^&*(),.?":{}|<>\[\]\\;'`~+=/\-]+)_([0-9]{10,})\z"#,
    )
    .expect("invalid message payload pattern")
});

/// Which body grammar applies.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadGrammar {
    /// Client identifier: any text (no line breaks).
    Token,
    /// Free-text message restricted to the printable allow-listed class.
    Message,
}

impl PayloadGrammar {
    fn pattern(self) -> &'static Regex {
        match self {
            Self::Token => &TOKEN_PAYLOAD,
            Self::Message => &MESSAGE_PAYLOAD,
        }
    }
}

#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload does not match the expected format")]
    InvalidFormat,

    #[error("payload timestamp out of range")]
    TimestampOutOfRange,
}

/// A payload split into body and issue time.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ParsedPayload<'a> {
    pub body: &'a str,
    pub issued_at: i64,
}

/// Split `text` into body and timestamp. The whole input must match.
pub fn parse(text: &str, grammar: PayloadGrammar) -> Result<ParsedPayload<'_>, PayloadError> {
    let captures = grammar
        .pattern()
        .captures(text)
        .ok_or(PayloadError::InvalidFormat)?;

    let (Some(body), Some(digits)) = (captures.get(1), captures.get(2)) else {
        return Err(PayloadError::InvalidFormat);
    };

    let issued_at = digits
        .as_str()
        .parse::<i64>()
        .map_err(|_| PayloadError::TimestampOutOfRange)?;

    Ok(ParsedPayload {
        body: body.as_str(),
        issued_at,
    })
}
