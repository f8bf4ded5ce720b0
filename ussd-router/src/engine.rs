//! The routing engine.
//!
//! One call to [`Engine::handle`] serves one carrier callback:
//!
//! ```text
//! adapt → resolve screen → match option → run handler → update screen → resolve reply
//! ```
//!
//! The whole sequence runs inside `catch_unwind`, so a panicking handler
//! costs its own request an `END` reply and nothing else.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use ussd_common::logging::generate_trace_id;
use ussd_common::util::truncate_with_ellipsis;
use ussd_common::{Config, Error, ExpiryConfig, MessagesConfig, Result, ResultExt};

use crate::adapter::{AdapterRegistry, ProtocolAdapter};
use crate::menu::{MenuOption, MenuTree, RegisteredOption, RouteHandler};
use crate::request::{TransportRequest, UssdRequest};
use crate::response::{format_reply, BufferedResponse, Disposition};
use crate::session::{InMemorySessionStore, SessionStore};
use crate::state::ScreenStateCache;
use crate::sweeper::{Sweeper, Sweepers};
use crate::template::TemplateRegistry;

/// Longest fragment echoed into dispatch logs.
const LOG_FRAGMENT_CHARS: usize = 32;

/// Serves carrier callbacks against a menu tree.
pub struct Engine {
    adapter: Arc<dyn ProtocolAdapter>,
    menu: MenuTree,
    store: Arc<dyn SessionStore>,
    states: Arc<ScreenStateCache>,
    templates: TemplateRegistry,
    not_found: RouteHandler,
    messages: MessagesConfig,
    session_expiry: Expiry,
    state_expiry: Expiry,
    debug: bool,
}

/// Probe interval and time-to-live for one expiring map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Expiry {
    probe_interval: Duration,
    ttl: Duration,
}

impl From<ExpiryConfig> for Expiry {
    fn from(config: ExpiryConfig) -> Self {
        Self {
            probe_interval: config.probe_interval(),
            ttl: config.ttl(),
        }
    }
}

impl Engine {
    pub fn builder(adapter: Arc<dyn ProtocolAdapter>) -> EngineBuilder {
        EngineBuilder::new(adapter)
    }

    pub fn menu(&self) -> &MenuTree {
        &self.menu
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn states(&self) -> &Arc<ScreenStateCache> {
        &self.states
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn messages(&self) -> &MessagesConfig {
        &self.messages
    }

    pub fn adapter_name(&self) -> &'static str {
        self.adapter.name()
    }

    /// Spawn the screen-state and session eviction loops.
    ///
    /// Must be called from inside a tokio runtime. The loops stop when the
    /// returned handle is shut down or dropped.
    pub fn start_sweepers(&self) -> Sweepers {
        let states = Arc::clone(&self.states);
        let store = Arc::clone(&self.store);

        let sweepers = Sweepers {
            state: Sweeper::spawn(
                "screen-state",
                self.state_expiry.probe_interval,
                self.state_expiry.ttl,
                move |ttl| states.evict(ttl),
            ),
            session: Sweeper::spawn(
                "session",
                self.session_expiry.probe_interval,
                self.session_expiry.ttl,
                move |ttl| store.vacuum(ttl),
            ),
        };
        tracing::info!(
            state_ttl_ms = self.state_expiry.ttl.as_millis() as u64,
            session_ttl_ms = self.session_expiry.ttl.as_millis() as u64,
            "Eviction sweepers started"
        );
        sweepers
    }

    /// Serve one callback and return the reply body.
    ///
    /// Never panics and never returns an empty body.
    pub fn handle(&self, transport: &TransportRequest) -> String {
        let trace_id = generate_trace_id();
        let span = tracing::info_span!(
            "ussd_request",
            trace_id = %trace_id,
            session_id = tracing::field::Empty
        );
        let _entered = span.enter();

        let mut matched: Option<RegisteredOption> = None;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.route(transport, &mut matched)));

        match outcome {
            Ok(Ok(body)) => body,
            Ok(Err(err)) if err.is_protocol() => {
                tracing::warn!(error = %err, "Error creating request");
                format_reply(Disposition::End, &self.messages.session_closed)
            }
            Ok(Err(err)) => {
                tracing::error!(
                    error = %err,
                    kind = ?err.kind(),
                    handler = %describe(matched.as_ref()),
                    "Request failed"
                );
                format_reply(Disposition::End, &self.messages.internal_error)
            }
            Err(payload) => {
                tracing::error!(
                    panic = %panic_message(payload.as_ref()),
                    handler = %describe(matched.as_ref()),
                    "Handler panicked"
                );
                format_reply(Disposition::End, &self.messages.internal_error)
            }
        }
    }

    fn route(
        &self,
        transport: &TransportRequest,
        matched: &mut Option<RegisteredOption>,
    ) -> Result<String> {
        let mut response = BufferedResponse::new();

        {
            let mut request = self
                .adapter
                .create_request(&mut response, transport, self.store.as_ref())?;
            let session_id = request.session().id().to_string();
            tracing::Span::current().record("session_id", session_id.as_str());

            let screen = self.states.get(&session_id);
            let option = self.menu.find(request.option(), screen.as_deref());
            self.log_dispatch(screen.as_deref(), option, &request);

            match option {
                Some(option) => {
                    *matched = Some(option.clone());
                    let retain = option.handler().call(&mut request);
                    if !retain {
                        self.states.set(&session_id, option.name());
                    }
                }
                None => {
                    self.not_found.call(&mut request);
                }
            }
        }

        if !response.has_content() {
            tracing::warn!(
                handler = %describe(matched.as_ref()),
                "Session ended because there was no response from handler"
            );
            return Ok(format_reply(Disposition::End, &self.messages.no_response));
        }

        response
            .resolve(&self.templates)
            .context(describe(matched.as_ref()))
    }

    fn log_dispatch(
        &self,
        screen: Option<&str>,
        option: Option<&RegisteredOption>,
        request: &UssdRequest<'_>,
    ) {
        let screen = screen.unwrap_or("");
        let matched = option.map(RegisteredOption::name).unwrap_or("");
        let submitted = truncate_with_ellipsis(request.option(), LOG_FRAGMENT_CHARS);
        let input = truncate_with_ellipsis(request.input(), LOG_FRAGMENT_CHARS);
        if self.debug {
            tracing::info!(screen, option = %submitted, input = %input, matched, "Dispatch");
        } else {
            tracing::debug!(screen, option = %submitted, input = %input, matched, "Dispatch");
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("adapter", &self.adapter.name())
            .field("options", &self.menu.len())
            .field("templates", &self.templates)
            .field("debug", &self.debug)
            .finish()
    }
}

fn describe(option: Option<&RegisteredOption>) -> String {
    option.map_or_else(
        || "handler(option=,name=)".to_string(),
        RegisteredOption::describe,
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles an [`Engine`].
pub struct EngineBuilder {
    adapter: Arc<dyn ProtocolAdapter>,
    menu: Vec<MenuOption>,
    store: Option<Arc<dyn SessionStore>>,
    templates: TemplateRegistry,
    not_found: Option<RouteHandler>,
    messages: MessagesConfig,
    session_expiry: Expiry,
    state_expiry: Expiry,
    debug: bool,
}

impl EngineBuilder {
    pub fn new(adapter: Arc<dyn ProtocolAdapter>) -> Self {
        Self {
            adapter,
            menu: Vec::new(),
            store: None,
            templates: TemplateRegistry::new(),
            not_found: None,
            messages: MessagesConfig::default(),
            session_expiry: ExpiryConfig::default().into(),
            state_expiry: ExpiryConfig::default().into(),
            debug: false,
        }
    }

    /// Resolve the configured adapter from `registry` and apply the
    /// configured expiry, messages, debug flag and template directory.
    pub fn from_config(config: &Config, registry: &AdapterRegistry) -> Result<Self> {
        config.validate()?;
        let adapter = registry.get(&config.router.adapter)?;

        let mut builder = Self::new(adapter)
            .messages(config.messages.clone())
            .session_expiry(config.session)
            .state_expiry(config.state)
            .debug(config.router.debug);

        if let Some(dir) = &config.router.templates_dir {
            builder
                .templates
                .load_dir(dir)
                .context(format!("loading templates from {}", dir.display()))?;
        }
        Ok(builder)
    }

    /// Top-level menu options. Replaces any previously set menu.
    pub fn menu(mut self, options: impl IntoIterator<Item = MenuOption>) -> Self {
        self.menu = options.into_iter().collect();
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = templates;
        self
    }

    /// Register a single template source.
    pub fn template(mut self, name: &str, source: &str) -> Result<Self> {
        self.templates.register(name, source)?;
        Ok(self)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains(name)
    }

    /// Handler run when no option matches. Its return value is ignored and
    /// the screen state is left as it was.
    pub fn not_found<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut UssdRequest<'_>) -> bool + Send + Sync + 'static,
    {
        self.not_found = Some(RouteHandler::new(handler));
        self
    }

    pub fn messages(mut self, messages: MessagesConfig) -> Self {
        self.messages = messages;
        self
    }

    pub fn session_expiry(mut self, expiry: ExpiryConfig) -> Self {
        self.session_expiry = expiry.into();
        self
    }

    pub fn state_expiry(mut self, expiry: ExpiryConfig) -> Self {
        self.state_expiry = expiry.into();
        self
    }

    /// Set the session store probe interval and time-to-live.
    pub fn session_times(mut self, probe_interval: Duration, ttl: Duration) -> Self {
        self.session_expiry = Expiry { probe_interval, ttl };
        self
    }

    /// Set the screen-state cache probe interval and time-to-live.
    pub fn state_times(mut self, probe_interval: Duration, ttl: Duration) -> Self {
        self.state_expiry = Expiry { probe_interval, ttl };
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Flatten the menu and assemble the engine.
    pub fn build(self) -> Result<Engine> {
        let menu = MenuTree::new(self.menu)?;
        if menu.index_screen().is_none() {
            tracing::warn!("Menu has no index screen; first-contact requests will hit the not-found handler");
        }

        let not_found = self.not_found.unwrap_or_else(|| {
            let text = self.messages.invalid_option.clone();
            RouteHandler::new(move |request: &mut UssdRequest<'_>| {
                request.end(&text);
                false
            })
        });

        if self.session_expiry.probe_interval.is_zero() || self.state_expiry.probe_interval.is_zero() {
            return Err(Error::Config("probe interval must be greater than zero".into()));
        }

        tracing::info!(
            adapter = self.adapter.name(),
            options = menu.len(),
            templates = self.templates.len(),
            "Engine built"
        );

        Ok(Engine {
            adapter: self.adapter,
            menu,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemorySessionStore::new())),
            states: Arc::new(ScreenStateCache::new()),
            templates: self.templates,
            not_found,
            messages: self.messages,
            session_expiry: self.session_expiry,
            state_expiry: self.state_expiry,
            debug: self.debug,
        })
    }
}
