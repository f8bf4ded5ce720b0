//! Africa's Talking USSD callback adapter.
//!
//! The gateway posts form fields `sessionId`, `serviceCode`, `phoneNumber`,
//! `networkCode` and `text`. `text` is cumulative: every fragment the
//! subscriber has sent so far, joined with `*`. An empty `text` marks the
//! first callback of a dialog.
//!
//! ```text
//! request 1: text=""        -> new session, option ""
//! request 2: text="1"       -> fragment "1"   (cursor 0 -> 2)
//! request 3: text="1*500"   -> fragment "500" (cursor 2 -> 6)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use ussd_common::util::is_empty_text;
use ussd_common::{Error, Result};

use crate::adapter::ProtocolAdapter;
use crate::request::{TransportRequest, UssdRequest};
use crate::response::BufferedResponse;
use crate::session::{InputMode, Session, SessionStore};

/// Registry name of this adapter.
pub const ADAPTER_NAME: &str = "africastalking";

/// Request extra carrying the dialled service code.
pub const EXTRA_SERVICE_CODE: &str = "serviceCode";
/// Request extra carrying the subscriber's network code.
pub const EXTRA_NETWORK_CODE: &str = "networkCode";

#[derive(Debug, Clone, PartialEq, Eq)]
struct CallbackFields {
    text: String,
    session_id: String,
    service_code: String,
    phone_number: String,
    network_code: String,
}

impl CallbackFields {
    fn from_form(mut form: HashMap<String, String>) -> Result<Self> {
        let mut take = |field: &str| {
            form.remove(field)
                .ok_or_else(|| Error::MissingField(field.to_string()))
        };
        Ok(Self {
            text: take("text")?,
            session_id: take("sessionId")?,
            service_code: take("serviceCode")?,
            phone_number: take("phoneNumber")?,
            network_code: take("networkCode")?,
        })
    }
}

/// Adapter for Africa's Talking form callbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct AfricasTalkingAdapter;

impl AfricasTalkingAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ProtocolAdapter for AfricasTalkingAdapter {
    fn name(&self) -> &'static str {
        ADAPTER_NAME
    }

    fn create_request<'a>(
        &self,
        response: &'a mut BufferedResponse,
        transport: &TransportRequest,
        store: &dyn SessionStore,
    ) -> Result<UssdRequest<'a>> {
        let fields = CallbackFields::from_form(transport.form())?;

        let (session, option, input) = if is_empty_text(&fields.text) {
            let session = Arc::new(Session::new(&fields.session_id));
            store.set(&fields.session_id, Arc::clone(&session));
            tracing::debug!(session_id = %fields.session_id, "Started new session");
            (session, String::new(), String::new())
        } else {
            let session = store
                .get(&fields.session_id)
                .ok_or_else(|| Error::SessionNotFound(fields.session_id.clone()))?;
            let (option, input) = read_fragment(&session, &fields.text)?;
            (session, option, input)
        };

        Ok(UssdRequest::new(response, session, fields.phone_number)
            .with_option(option)
            .with_input(input)
            .with_extra(EXTRA_SERVICE_CODE, fields.service_code)
            .with_extra(EXTRA_NETWORK_CODE, fields.network_code))
    }
}

/// Read the newest fragment of `text` at the session's cursor.
///
/// In expect-option mode the fragment becomes the option and any previous
/// input is cleared; in expect-input mode it becomes the input and the
/// option from the earlier round is kept, so the same handler matches again.
///
/// Returns the `(option, input)` pair as written, read under the same lock
/// as the update.
fn read_fragment(session: &Session, text: &str) -> Result<(String, String)> {
    session.update_cursor(|cursor| {
        let len = text.len();
        let pointer = if cursor.auto_adjust {
            cursor.read_pointer.min(len)
        } else {
            cursor.read_pointer
        };

        let fragment = text.get(pointer..).ok_or_else(|| {
            Error::InvalidRequest(format!(
                "read cursor {pointer} is outside submitted text of length {len}"
            ))
        })?;
        let fragment = fragment.to_string();

        // Skip past the `*` separator the gateway adds before the next fragment.
        cursor.read_pointer = len + 1;
        match cursor.mode {
            InputMode::ExpectInput => cursor.input = fragment,
            InputMode::ExpectOption => {
                cursor.input.clear();
                cursor.option = fragment;
            }
        }
        Ok((cursor.option.clone(), cursor.input.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InMemorySessionStore;

    fn callback(session_id: &str, text: &str) -> TransportRequest {
        let body: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("sessionId", session_id)
            .append_pair("serviceCode", "*384*1#")
            .append_pair("phoneNumber", "+265888000111")
            .append_pair("networkCode", "65001")
            .append_pair("text", text)
            .finish();
        TransportRequest::form_post(body)
    }

    fn create(
        store: &InMemorySessionStore,
        transport: &TransportRequest,
    ) -> Result<(String, String, Arc<Session>)> {
        let mut response = BufferedResponse::new();
        let request = AfricasTalkingAdapter.create_request(&mut response, transport, store)?;
        Ok((
            request.option().to_string(),
            request.input().to_string(),
            Arc::clone(request.session()),
        ))
    }

    #[test]
    fn test_first_contact_creates_session() {
        let store = InMemorySessionStore::new();
        let (option, input, session) = create(&store, &callback("ATUid_1", "")).unwrap();

        assert_eq!(option, "");
        assert_eq!(input, "");
        assert_eq!(session.id(), "ATUid_1");
        assert_eq!(session.mode(), InputMode::ExpectOption);
        assert!(store.get("ATUid_1").is_some());
    }

    #[test]
    fn test_continuation_reads_fragments() {
        let store = InMemorySessionStore::new();
        create(&store, &callback("s", "")).unwrap();

        let (option, _, _) = create(&store, &callback("s", "1")).unwrap();
        assert_eq!(option, "1");

        let (option, _, session) = create(&store, &callback("s", "1*3")).unwrap();
        assert_eq!(option, "3");
        assert_eq!(session.cursor().read_pointer, 4);
    }

    #[test]
    fn test_input_mode_keeps_option() {
        let store = InMemorySessionStore::new();
        create(&store, &callback("s", "")).unwrap();
        let (_, _, session) = create(&store, &callback("s", "3")).unwrap();
        session.set_mode(InputMode::ExpectInput);

        let (option, input, _) = create(&store, &callback("s", "3*0999123")).unwrap();
        assert_eq!(option, "3");
        assert_eq!(input, "0999123");
    }

    #[test]
    fn test_unknown_session() {
        let store = InMemorySessionStore::new();
        let err = create(&store, &callback("gone", "1")).unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(ref id) if id == "gone"));
        assert!(err.is_protocol());
    }

    #[test]
    fn test_missing_field() {
        let store = InMemorySessionStore::new();
        let transport = TransportRequest::form_post("sessionId=s&text=");
        let err = create(&store, &transport).unwrap_err();
        assert!(matches!(err, Error::MissingField(_)));
        assert!(err.is_protocol());
    }

    #[test]
    fn test_short_text_without_auto_adjust_is_rejected() {
        let store = InMemorySessionStore::new();
        create(&store, &callback("s", "")).unwrap();
        create(&store, &callback("s", "1*2*3")).unwrap();

        let err = create(&store, &callback("s", "1")).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_auto_adjust_clamps_cursor() {
        let store = InMemorySessionStore::new();
        create(&store, &callback("s", "")).unwrap();
        let (_, _, session) = create(&store, &callback("s", "1*2*3")).unwrap();
        session.set_auto_adjust_read_pointer(true);

        let (option, _, _) = create(&store, &callback("s", "1")).unwrap();
        assert_eq!(option, "");
        assert_eq!(session.cursor().read_pointer, 2);
    }

    #[test]
    fn test_read_fragment_returns_cursor_it_wrote() {
        let session = Session::new("s");
        assert_eq!(
            read_fragment(&session, "7").unwrap(),
            ("7".to_string(), String::new())
        );

        session.set_mode(InputMode::ExpectInput);
        let (option, input) = read_fragment(&session, "7*250").unwrap();
        assert_eq!((option.as_str(), input.as_str()), ("7", "250"));

        let cursor = session.cursor();
        assert_eq!((cursor.option, cursor.input), (option, input));
        assert_eq!(cursor.read_pointer, 6);
    }

    #[test]
    fn test_extras_exposed() {
        let store = InMemorySessionStore::new();
        let mut response = BufferedResponse::new();
        let transport = callback("s", "");
        let request = AfricasTalkingAdapter
            .create_request(&mut response, &transport, &store)
            .unwrap();

        assert_eq!(request.msisdn(), "+265888000111");
        assert_eq!(request.extra(EXTRA_SERVICE_CODE), Some("*384*1#"));
        assert_eq!(request.extra(EXTRA_NETWORK_CODE), Some("65001"));
    }
}
