//! Buffered handler output.
//!
//! A handler either writes reply text directly or defers to a named template
//! that the dispatcher renders after the handler returns. The two are
//! mutually exclusive; whichever was written last wins.

use std::collections::BTreeMap;

use ussd_common::{Error, Result};

use crate::template::TemplateRegistry;
use crate::value::Value;

/// Substitution values for a deferred template.
pub type TemplateValues = BTreeMap<String, Value>;

/// Whether the dialog continues after this reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Expect another fragment (`CON`)
    Continue,
    /// Close the dialog (`END`)
    End,
}

impl Disposition {
    /// Wire verb token.
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Continue => "CON",
            Self::End => "END",
        }
    }

    pub const fn is_end(self) -> bool {
        matches!(self, Self::End)
    }
}

/// Format a reply line: verb, one space, text, trailing newline.
pub fn format_reply(disposition: Disposition, text: &str) -> String {
    let mut reply = String::with_capacity(text.len() + 5);
    reply.push_str(disposition.verb());
    reply.push(' ');
    reply.push_str(text);
    if !reply.ends_with('\n') {
        reply.push('\n');
    }
    reply
}

/// A template reference waiting to be rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredTemplate {
    pub name: String,
    pub values: TemplateValues,
    pub disposition: Disposition,
}

/// Per-request output accumulator.
#[derive(Debug, Default)]
pub struct BufferedResponse {
    buf: String,
    deferred: Option<DeferredTemplate>,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw reply text, dropping any pending template.
    pub fn write_raw(&mut self, text: &str) {
        self.deferred = None;
        self.buf.push_str(text);
    }

    /// Append a formatted `CON`/`END` line.
    pub fn write_reply(&mut self, disposition: Disposition, text: &str) {
        self.write_raw(&format_reply(disposition, text));
    }

    /// Defer to a template, discarding anything written so far.
    pub fn defer_to_template(
        &mut self,
        name: impl Into<String>,
        values: TemplateValues,
        disposition: Disposition,
    ) {
        self.buf.clear();
        self.deferred = Some(DeferredTemplate {
            name: name.into(),
            values,
            disposition,
        });
    }

    pub fn has_content(&self) -> bool {
        !self.buf.is_empty() || self.is_deferred()
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
            .as_ref()
            .is_some_and(|d| !ussd_common::util::is_empty_text(&d.name))
    }

    pub fn deferred(&self) -> Option<&DeferredTemplate> {
        self.deferred.as_ref()
    }

    /// Raw text written so far.
    pub fn raw(&self) -> &str {
        &self.buf
    }

    /// Produce the final reply body.
    pub fn resolve(&self, templates: &TemplateRegistry) -> Result<String> {
        if let Some(deferred) = self.deferred.as_ref().filter(|_| self.is_deferred()) {
            let text = templates.render(&deferred.name, &deferred.values)?;
            return Ok(format_reply(deferred.disposition, &text));
        }
        if self.buf.is_empty() {
            return Err(Error::Internal("handler produced no response".into()));
        }
        Ok(self.buf.clone())
    }
}
