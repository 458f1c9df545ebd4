//! Minimal `{placeholder}` templates for notification content.
//!
//! A template is plain text where `{name}` is replaced with the field `name`
//! of a serializable data record. `{{` and `}}` produce literal braces.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unterminated placeholder starting at byte {0}")]
    Unterminated(usize),

    #[error("unmatched '}}' at byte {0}")]
    UnmatchedClose(usize),

    #[error("empty placeholder at byte {0}")]
    EmptyPlaceholder(usize),

    #[error("unknown placeholder '{{{0}}}'")]
    UnknownField(String),

    #[error("no value for placeholder '{{{0}}}'")]
    MissingValue(String),

    #[error("template data is not a record")]
    NotARecord,

    #[error("failed to serialize template data: {0}")]
    Data(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(String),
}

#[derive(Debug, Clone)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parses a template, accepting only the placeholders listed in `fields`.
    ///
    /// This is the dry run done at configuration load: no data is needed to
    /// find syntax errors or references to fields that will never exist.
    pub fn parse(source: &str, fields: &[&str]) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some((_, '}')) => break,
                            Some((_, ch)) => name.push(ch),
                            None => return Err(TemplateError::Unterminated(pos)),
                        }
                    }

                    let name = name.trim();
                    if name.is_empty() {
                        return Err(TemplateError::EmptyPlaceholder(pos));
                    }
                    if !fields.contains(&name) {
                        return Err(TemplateError::UnknownField(name.to_string()));
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(name.to_string()));
                }
                '}' => return Err(TemplateError::UnmatchedClose(pos)),
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Text(literal));
        }

        Ok(Self { segments })
    }

    /// Hydrates the template with the fields of `data`.
    ///
    /// Nothing is returned unless every placeholder resolved.
    pub fn render<T: Serialize>(&self, data: &T) -> Result<String, TemplateError> {
        let value = serde_json::to_value(data)?;
        let record = value.as_object().ok_or(TemplateError::NotARecord)?;

        let mut output = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => output.push_str(text),
                Segment::Field(name) => match record.get(name) {
                    Some(serde_json::Value::String(s)) => output.push_str(s),
                    Some(serde_json::Value::Null) | None => {
                        return Err(TemplateError::MissingValue(name.clone()));
                    }
                    Some(other) => output.push_str(&other.to_string()),
                },
            }
        }

        Ok(output)
    }
}
