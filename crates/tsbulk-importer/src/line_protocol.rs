//! Line protocol tokenizer
//!
//! Format: measurement[,tag1=value1,...] field1=value1[,field2=value2...] [timestamp]
//!
//! Example: cpu,host=server01,region=us-west usage=64.5,cores=8i 1609459200000000000
//!
//! The tokenizer walks each line one character at a time. Three modifiers are
//! checked before the state transition: `escape` (set by `\`, the next character
//! is taken literally), `quote` (toggled by `"`, every structural character is
//! literal while it is set) and `bracket` (array valued tags such as
//! `t1=[a,b]`, a `,` inside the brackets does not end the tag value).

use crate::error::{ImportError, Result};
use std::collections::BTreeMap;
use tsbulk_core::{now_nanos, FieldValue, Point, Precision};

/// Position of the tokenizer inside a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Measurement,
    TagKey,
    TagValue,
    FieldKey,
    FieldValue,
    Timestamp,
}

/// Character classes the transition function is keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Escape,
    Quote,
    Comma,
    Equals,
    Space,
    OpenBracket,
    CloseBracket,
    Other,
}

impl CharClass {
    fn of(c: char) -> Self {
        match c {
            '\\' => CharClass::Escape,
            '"' => CharClass::Quote,
            ',' => CharClass::Comma,
            '=' => CharClass::Equals,
            ' ' => CharClass::Space,
            '[' => CharClass::OpenBracket,
            ']' => CharClass::CloseBracket,
            _ => CharClass::Other,
        }
    }
}

/// Whether the tokenizer keeps consuming the line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Stop,
}

type TokenResult<T> = std::result::Result<T, String>;

/// Per-line tokenizer state
struct Tokenizer {
    state: State,
    escape: bool,
    quote: bool,
    bracket: bool,
    quoted_value: bool,
    measurement: String,
    key: String,
    value: String,
    timestamp: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
}

impl Tokenizer {
    fn new() -> Self {
        Self {
            state: State::Measurement,
            escape: false,
            quote: false,
            bracket: false,
            quoted_value: false,
            measurement: String::new(),
            key: String::new(),
            value: String::new(),
            timestamp: String::new(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    fn feed(&mut self, c: char) -> TokenResult<Step> {
        if self.escape {
            self.escape = false;
            self.append(c);
            return Ok(Step::Continue);
        }

        let class = CharClass::of(c);
        match class {
            CharClass::Escape => {
                self.escape = true;
                return Ok(Step::Continue);
            }
            CharClass::Quote => {
                self.quote = !self.quote;
                if self.state == State::FieldValue {
                    self.quoted_value = true;
                }
                return Ok(Step::Continue);
            }
            _ if self.quote => {
                self.append(c);
                return Ok(Step::Continue);
            }
            _ => {}
        }

        self.transition(class, c)
    }

    fn transition(&mut self, class: CharClass, c: char) -> TokenResult<Step> {
        match (self.state, class) {
            (State::Measurement, CharClass::Comma) => self.state = State::TagKey,
            (State::TagValue, CharClass::Comma) if self.bracket => self.append(c),
            (State::TagValue, CharClass::Comma) => {
                self.commit()?;
                self.state = State::TagKey;
            }
            (State::FieldValue, CharClass::Comma) => {
                self.commit()?;
                self.state = State::FieldKey;
            }
            (State::TagKey | State::FieldKey, CharClass::Comma) => {
                return Err(format!("unexpected ',' in key '{}'", self.key));
            }
            (State::Timestamp, CharClass::Comma) => {
                return Err(format!("unexpected ',' in timestamp '{}'", self.timestamp));
            }

            (State::TagKey, CharClass::Equals) => self.state = State::TagValue,
            (State::FieldKey, CharClass::Equals) => self.state = State::FieldValue,

            (State::Timestamp, CharClass::Space) => {
                if !self.timestamp.is_empty() {
                    return Ok(Step::Stop);
                }
            }
            // repeated separator between the tag set and the field set
            (State::FieldKey, CharClass::Space) if self.key.is_empty() => {}
            (State::Measurement | State::TagKey | State::TagValue, CharClass::Space) => {
                self.commit()?;
                self.state = State::FieldKey;
            }
            (State::FieldKey | State::FieldValue, CharClass::Space) => {
                self.commit()?;
                self.state = State::Timestamp;
            }

            (State::TagValue, CharClass::OpenBracket) => {
                self.bracket = true;
                self.append(c);
            }
            (State::TagValue, CharClass::CloseBracket) => {
                self.bracket = false;
                self.append(c);
            }
            (_, CharClass::OpenBracket | CharClass::CloseBracket) => {
                return Err(format!("invalid tag value token: '{}'", c));
            }

            _ => self.append(c),
        }

        Ok(Step::Continue)
    }

    fn append(&mut self, c: char) {
        match self.state {
            State::Measurement => self.measurement.push(c),
            State::TagKey | State::FieldKey => self.key.push(c),
            State::TagValue | State::FieldValue => self.value.push(c),
            State::Timestamp => self.timestamp.push(c),
        }
    }

    /// Store the pending key/value pair, if any
    fn commit(&mut self) -> TokenResult<()> {
        let quoted = std::mem::take(&mut self.quoted_value);
        if self.key.is_empty() {
            self.value.clear();
            return Ok(());
        }

        let key = std::mem::take(&mut self.key);
        let value = std::mem::take(&mut self.value);
        match self.state {
            State::TagValue => {
                self.tags.insert(key, value);
            }
            State::FieldValue => {
                let value = if quoted {
                    FieldValue::String(value)
                } else {
                    infer_field_value(value).ok_or_else(|| format!("missing value for field '{}'", key))?
                };
                self.fields.insert(key, value);
            }
            State::TagKey | State::FieldKey => {
                return Err(format!("missing '=' after key '{}'", key));
            }
            State::Measurement | State::Timestamp => {}
        }
        Ok(())
    }

    fn finish(mut self, precision: Precision) -> TokenResult<Point> {
        if self.quote {
            return Err("unterminated quoted string".to_string());
        }
        self.commit()?;

        let timestamp = if self.timestamp.is_empty() {
            now_nanos()
        } else {
            let raw = self
                .timestamp
                .parse::<i64>()
                .map_err(|e| format!("invalid timestamp '{}': {}", self.timestamp, e))?;
            precision.to_nanos(raw).map_err(|e| e.to_string())?
        };

        let point = Point {
            measurement: self.measurement,
            tags: self.tags,
            fields: self.fields,
            timestamp,
        };
        point.validate().map_err(|e| e.to_string())?;
        Ok(point)
    }
}

/// Type an unquoted field value; `None` for an empty value
fn infer_field_value(raw: String) -> Option<FieldValue> {
    match raw.as_str() {
        "" => None,
        "t" | "T" | "true" | "True" | "TRUE" => Some(FieldValue::Boolean(true)),
        "f" | "F" | "false" | "False" | "FALSE" => Some(FieldValue::Boolean(false)),
        s => {
            let numeric = s
                .chars()
                .next()
                .map(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'))
                .unwrap_or(false);
            if numeric {
                if let Some(v) = s.strip_suffix('i').and_then(|n| n.parse::<i64>().ok()) {
                    return Some(FieldValue::Integer(v));
                }
                if let Ok(v) = s.parse::<f64>() {
                    return Some(FieldValue::Float(v));
                }
            }
            Some(FieldValue::String(s.to_string()))
        }
    }
}

fn tokenize(line: &str, precision: Precision) -> TokenResult<Option<Point>> {
    if line.starts_with('#') {
        return Ok(None);
    }

    let mut tokenizer = Tokenizer::new();
    for c in line.chars() {
        if tokenizer.feed(c)? == Step::Stop {
            break;
        }
    }
    tokenizer.finish(precision).map(Some)
}

/// Line protocol parser over a block of text
#[derive(Debug, Clone, Copy)]
pub struct LineProtocolParser<'a> {
    raw: &'a str,
    precision: Precision,
}

impl<'a> LineProtocolParser<'a> {
    /// Create a parser over `raw`, timestamps are taken as nanoseconds
    pub fn new(raw: &'a str) -> Self {
        Self {
            raw,
            precision: Precision::Nanos,
        }
    }

    /// Scale parsed timestamps from `precision` to nanoseconds
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Parse a single trimmed line. Comment lines yield `None`.
    pub fn parse_line(line: &str, precision: Precision) -> Result<Option<Point>> {
        tokenize(line, precision).map_err(ImportError::Parse)
    }

    /// Lazily parse every line; blank and comment lines are skipped.
    ///
    /// Each call starts from the beginning of the text.
    pub fn points(&self) -> impl Iterator<Item = Result<Point>> + 'a {
        let precision = self.precision;
        self.raw
            .lines()
            .enumerate()
            .filter_map(move |(idx, line)| {
                let line = line.trim();
                if line.is_empty() {
                    return None;
                }
                match tokenize(line, precision) {
                    Ok(point) => point.map(Ok),
                    Err(e) => Some(Err(ImportError::Parse(format!("line {}: {}", idx + 1, e)))),
                }
            })
    }

    /// Parse every line, stopping at the first malformed one
    pub fn parse(&self) -> Result<Vec<Point>> {
        self.points().collect()
    }
}
