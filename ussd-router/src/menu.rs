//! Menu declaration and matching.
//!
//! Menus are declared as a tree of [`MenuOption`]s and flattened once into a
//! [`MenuTree`]. Each flattened entry remembers the screen (its parent's
//! name) that must be current for it to match. Matching is a linear scan in
//! pre-order; the first entry with the submitted code on the current screen
//! wins.
//!
//! Screens are identified by name. An option reused under several parents
//! with the same name (a "back" entry, say) parks the session on that one
//! screen regardless of where it was selected from.

use std::fmt;
use std::sync::Arc;

use ussd_common::util::is_empty_text;
use ussd_common::{Error, Result};

use crate::request::UssdRequest;

type HandlerFn = dyn Fn(&mut UssdRequest<'_>) -> bool + Send + Sync;

/// A menu handler.
///
/// Returns `true` to keep the session on its current screen, or `false` to
/// make the matched option's own name the next current screen.
#[derive(Clone)]
pub struct RouteHandler {
    func: Arc<HandlerFn>,
    ident: &'static str,
}

impl RouteHandler {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&mut UssdRequest<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            ident: std::any::type_name::<F>(),
        }
    }

    pub fn call(&self, request: &mut UssdRequest<'_>) -> bool {
        (self.func)(request)
    }

    /// Type name of the wrapped function, for diagnostics.
    pub fn ident(&self) -> &'static str {
        self.ident
    }
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RouteHandler").field(&self.ident).finish()
    }
}

/// A selectable menu entry and its nested entries.
#[derive(Debug, Clone)]
pub struct MenuOption {
    code: String,
    name: String,
    handler: RouteHandler,
    children: Vec<MenuOption>,
}

impl MenuOption {
    /// Declare an option. `name` must not be blank; it doubles as the screen
    /// identifier for the option's children.
    pub fn new<F>(code: impl Into<String>, name: impl Into<String>, handler: F) -> Result<Self>
    where
        F: Fn(&mut UssdRequest<'_>) -> bool + Send + Sync + 'static,
    {
        Self::with_handler(code, name, RouteHandler::new(handler))
    }

    pub fn with_handler(
        code: impl Into<String>,
        name: impl Into<String>,
        handler: RouteHandler,
    ) -> Result<Self> {
        let code = code.into();
        let name = name.into();
        if is_empty_text(&name) {
            return Err(Error::BlankOptionName { code });
        }
        Ok(Self {
            code,
            name,
            handler,
            children: Vec::new(),
        })
    }

    /// Nest an option under this one.
    pub fn child(mut self, option: MenuOption) -> Self {
        self.children.push(option);
        self
    }

    pub fn children(mut self, options: impl IntoIterator<Item = MenuOption>) -> Self {
        self.children.extend(options);
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A flattened option with its required current screen.
#[derive(Debug, Clone)]
pub struct RegisteredOption {
    code: String,
    name: String,
    parent_screen: Option<String>,
    handler: RouteHandler,
}

impl RegisteredOption {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Screen that must be current for this option to match; `None` for
    /// top-level options, which match sessions with no cached screen.
    pub fn parent_screen(&self) -> Option<&str> {
        self.parent_screen.as_deref()
    }

    pub fn handler(&self) -> &RouteHandler {
        &self.handler
    }

    /// One-line identity used in diagnostics.
    pub fn describe(&self) -> String {
        format!(
            "handler(option={},name={},fn={})",
            self.code,
            self.name,
            self.handler.ident()
        )
    }
}

/// Immutable, flattened menu.
#[derive(Debug, Clone, Default)]
pub struct MenuTree {
    options: Vec<RegisteredOption>,
    index_screen: Option<String>,
}

impl MenuTree {
    /// Flatten a menu declaration.
    ///
    /// At most one top-level option may have an empty code; it is the index
    /// screen reached on first contact.
    pub fn new(roots: impl IntoIterator<Item = MenuOption>) -> Result<Self> {
        let mut tree = Self::default();
        for root in roots {
            if root.code.is_empty() {
                if let Some(existing) = &tree.index_screen {
                    return Err(Error::DuplicateIndexScreen {
                        existing: existing.clone(),
                        rejected: root.name,
                    });
                }
                tree.index_screen = Some(root.name.clone());
            }
            tree.flatten(root, None);
        }
        Ok(tree)
    }

    fn flatten(&mut self, option: MenuOption, parent: Option<&str>) {
        let MenuOption {
            code,
            name,
            handler,
            children,
        } = option;

        self.options.push(RegisteredOption {
            code,
            name: name.clone(),
            parent_screen: parent.map(str::to_string),
            handler,
        });
        for child in children {
            self.flatten(child, Some(&name));
        }
    }

    /// First option with `code` whose required screen is `screen`.
    pub fn find(&self, code: &str, screen: Option<&str>) -> Option<&RegisteredOption> {
        self.options
            .iter()
            .find(|opt| opt.code == code && opt.parent_screen.as_deref() == screen)
    }

    pub fn index_screen(&self) -> Option<&str> {
        self.index_screen.as_deref()
    }

    /// Flattened options in registration (pre-order) order.
    pub fn options(&self) -> &[RegisteredOption] {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}
