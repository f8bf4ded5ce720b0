//! Transport-level and normalized requests.

use axum::body::Bytes;
use http::{header, HeaderMap, Method};
use std::collections::HashMap;
use std::sync::Arc;

use crate::response::{BufferedResponse, Disposition, TemplateValues};
use crate::session::{InputMode, Session};
use crate::value::Value;

/// Inbound HTTP request as seen by a protocol adapter.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportRequest {
    pub fn new(method: Method, query: Option<String>, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            query,
            headers,
            body,
        }
    }

    /// A form-encoded POST, the shape most carrier gateways use.
    pub fn form_post(body: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        Self::new(Method::POST, None, headers, Bytes::from(body.into()))
    }

    /// Decoded form fields from the body and the query string.
    ///
    /// Body fields take precedence, and the first occurrence of a repeated
    /// key wins. The body is only decoded when the content type is absent or
    /// `application/x-www-form-urlencoded`.
    pub fn form(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        if self.is_form_body() {
            collect_pairs(&self.body, &mut fields);
        }
        if let Some(query) = &self.query {
            collect_pairs(query.as_bytes(), &mut fields);
        }
        fields
    }

    fn is_form_body(&self) -> bool {
        match self.headers.get(header::CONTENT_TYPE) {
            None => true,
            Some(value) => value
                .to_str()
                .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
                .unwrap_or(false),
        }
    }
}

fn collect_pairs(input: &[u8], fields: &mut HashMap<String, String>) {
    for (key, value) in url::form_urlencoded::parse(input) {
        fields
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
}

/// Normalized request handed to menu handlers.
///
/// Borrows the request's [`BufferedResponse`]; everything a handler writes
/// goes there and is resolved by the dispatcher once the handler returns.
#[derive(Debug)]
pub struct UssdRequest<'a> {
    msisdn: String,
    option: String,
    input: String,
    session: Arc<Session>,
    response: &'a mut BufferedResponse,
    attributes: HashMap<String, Value>,
    extras: HashMap<String, String>,
}

impl<'a> UssdRequest<'a> {
    pub fn new(
        response: &'a mut BufferedResponse,
        session: Arc<Session>,
        msisdn: impl Into<String>,
    ) -> Self {
        Self {
            msisdn: msisdn.into(),
            option: String::new(),
            input: String::new(),
            session,
            response,
            attributes: HashMap::new(),
            extras: HashMap::new(),
        }
    }

    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.option = option.into();
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    /// Attach a transport-specific field (service code, network code, ...).
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Subscriber phone number.
    pub fn msisdn(&self) -> &str {
        &self.msisdn
    }

    /// Submitted option code. Meaningful in expect-option mode.
    pub fn option(&self) -> &str {
        &self.option
    }

    /// Submitted free-form input. Meaningful in expect-input mode.
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extras.get(key).map(String::as_str)
    }

    /// Reply and read the next fragment as an option code.
    pub fn continue_with(&mut self, text: impl AsRef<str>) {
        self.session.set_mode(InputMode::ExpectOption);
        self.response.write_reply(Disposition::Continue, text.as_ref());
    }

    /// Reply and read the next fragment as free-form input.
    pub fn prompt(&mut self, text: impl AsRef<str>) {
        self.session.set_mode(InputMode::ExpectInput);
        self.response.write_reply(Disposition::Continue, text.as_ref());
    }

    /// Reply and close the dialog.
    pub fn end(&mut self, text: impl AsRef<str>) {
        self.response.write_reply(Disposition::End, text.as_ref());
    }

    pub fn continue_with_template(&mut self, name: &str, values: TemplateValues) {
        self.session.set_mode(InputMode::ExpectOption);
        self.response
            .defer_to_template(name, values, Disposition::Continue);
    }

    pub fn prompt_with_template(&mut self, name: &str, values: TemplateValues) {
        self.session.set_mode(InputMode::ExpectInput);
        self.response
            .defer_to_template(name, values, Disposition::Continue);
    }

    pub fn end_with_template(&mut self, name: &str, values: TemplateValues) {
        self.response.defer_to_template(name, values, Disposition::End);
    }

    /// Write raw reply bytes, bypassing the `CON`/`END` helpers.
    pub fn write_raw(&mut self, text: &str) {
        self.response.write_raw(text);
    }

    /// Set a request-scoped attribute. Discarded when the request ends.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}
