//! Message key templates.
//!
//! A template is literal text with `{{.Company}}` and `{{.EventType}}` actions,
//! e.g. `company.{{.Company}}.event.{{.EventType}}`. Whitespace inside the
//! braces is allowed. Templates are parsed once and rendered per message.

use thiserror::Error;

use crate::event::EventKind;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed action starting at byte {0}")]
    Unclosed(usize),

    #[error("unexpected '}}}}' at byte {0}")]
    UnexpectedClose(usize),

    #[error("unknown field '{0}' (expected .Company or .EventType)")]
    UnknownField(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Company,
    EventType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl KeyTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0usize;

        while !rest.is_empty() {
            let open = rest.find("{{");
            let close = rest.find("}}");

            match (open, close) {
                (None, None) => {
                    segments.push(Segment::Literal(rest.to_string()));
                    break;
                }
                (None, Some(c)) => return Err(TemplateError::UnexpectedClose(offset + c)),
                (Some(o), Some(c)) if c < o => {
                    return Err(TemplateError::UnexpectedClose(offset + c));
                }
                (Some(o), _) => {
                    if o > 0 {
                        segments.push(Segment::Literal(rest[..o].to_string()));
                    }
                    let inner_start = o + 2;
                    let end = rest[inner_start..]
                        .find("}}")
                        .map(|e| inner_start + e)
                        .ok_or(TemplateError::Unclosed(offset + o))?;
                    segments.push(parse_action(&rest[inner_start..end])?);
                    offset += end + 2;
                    rest = &rest[end + 2..];
                }
            }
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn render(&self, entity_id: &str, kind: EventKind) -> String {
        let mut out = String::with_capacity(self.source.len() + entity_id.len());
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push_str(s),
                Segment::Company => out.push_str(entity_id),
                Segment::EventType => out.push_str(kind.as_str()),
            }
        }
        out
    }
}

fn parse_action(inner: &str) -> Result<Segment, TemplateError> {
    match inner.trim() {
        ".Company" => Ok(Segment::Company),
        ".EventType" => Ok(Segment::EventType),
        other => Err(TemplateError::UnknownField(other.to_string())),
    }
}
