//! HTTP routing table.
//!
//! Maps a command name to an HTTP method and a path template. Placeholders
//! `{sessionId}`, `{elementId}` and `{browsingContextId}` are filled from the
//! command context; any other `{name}` is taken out of the parameters.
//!
//! The default table covers the core of the W3C WebDriver vocabulary. Callers
//! extend it with [`CommandRoutes::insert`].

// ============================================================================
// Imports
// ============================================================================

use reqwest::Method;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

use super::Command;

// ============================================================================
// Route
// ============================================================================

/// How one command travels over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// HTTP method.
    pub method: Method,
    /// Path template, e.g. `/session/{sessionId}/element/{elementId}/click`.
    pub template: String,
    /// Whether resending after a connection reset is harmless.
    pub idempotent: bool,
}

impl Route {
    /// Creates a route; GET and HEAD are idempotent, everything else is not.
    #[must_use]
    pub fn new(method: Method, template: impl Into<String>) -> Self {
        let idempotent = method == Method::GET || method == Method::HEAD;
        Self {
            method,
            template: template.into(),
            idempotent,
        }
    }

    /// Overrides the idempotency flag.
    #[inline]
    #[must_use]
    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }
}

/// A route resolved against one command.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRoute {
    /// HTTP method.
    pub method: Method,
    /// Concrete path, placeholders substituted and percent-encoded.
    pub path: String,
    /// JSON body; `None` for methods that carry none.
    pub body: Option<Value>,
    /// Whether resending after a connection reset is harmless.
    pub idempotent: bool,
}

// ============================================================================
// CommandRoutes
// ============================================================================

/// Command name → [`Route`] table.
#[derive(Debug, Clone, Default)]
pub struct CommandRoutes {
    routes: FxHashMap<String, Route>,
}

impl CommandRoutes {
    /// Creates an empty table.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates the default W3C table.
    #[must_use]
    pub fn w3c() -> Self {
        const S: &str = "/session/{sessionId}";
        let table: &[(&str, Method, &str)] = &[
            ("newSession", Method::POST, "/session"),
            ("deleteSession", Method::DELETE, S),
            ("quit", Method::DELETE, S),
            ("status", Method::GET, "/status"),
            ("getTimeouts", Method::GET, "/timeouts"),
            ("setTimeouts", Method::POST, "/timeouts"),
            ("navigateTo", Method::POST, "/url"),
            ("getCurrentUrl", Method::GET, "/url"),
            ("back", Method::POST, "/back"),
            ("forward", Method::POST, "/forward"),
            ("refresh", Method::POST, "/refresh"),
            ("getTitle", Method::GET, "/title"),
            ("getWindowHandle", Method::GET, "/window"),
            ("closeWindow", Method::DELETE, "/window"),
            ("switchToWindow", Method::POST, "/window"),
            ("getWindowHandles", Method::GET, "/window/handles"),
            ("switchToFrame", Method::POST, "/frame"),
            ("switchToParentFrame", Method::POST, "/frame/parent"),
            ("findElement", Method::POST, "/element"),
            ("findElements", Method::POST, "/elements"),
            ("findElementFromElement", Method::POST, "/element/{elementId}/element"),
            ("findElementsFromElement", Method::POST, "/element/{elementId}/elements"),
            ("getElementText", Method::GET, "/element/{elementId}/text"),
            ("getElementAttribute", Method::GET, "/element/{elementId}/attribute/{name}"),
            ("getElementProperty", Method::GET, "/element/{elementId}/property/{name}"),
            ("elementClick", Method::POST, "/element/{elementId}/click"),
            ("elementClear", Method::POST, "/element/{elementId}/clear"),
            ("elementSendKeys", Method::POST, "/element/{elementId}/value"),
            ("executeScript", Method::POST, "/execute/sync"),
            ("executeAsyncScript", Method::POST, "/execute/async"),
            ("getAllCookies", Method::GET, "/cookie"),
            ("addCookie", Method::POST, "/cookie"),
            ("deleteAllCookies", Method::DELETE, "/cookie"),
            ("dismissAlert", Method::POST, "/alert/dismiss"),
            ("acceptAlert", Method::POST, "/alert/accept"),
            ("getAlertText", Method::GET, "/alert/text"),
            ("takeScreenshot", Method::GET, "/screenshot"),
        ];

        let mut routes = Self::empty();
        for (name, method, path) in table {
            let template = if path.starts_with("/session") || path.starts_with("/status") {
                (*path).to_string()
            } else {
                format!("{S}{path}")
            };
            routes.insert(*name, Route::new(method.clone(), template));
        }
        routes
    }

    /// Adds or replaces a route.
    pub fn insert(&mut self, name: impl Into<String>, route: Route) {
        self.routes.insert(name.into(), route);
    }

    /// Looks up a route.
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Route> {
        self.routes.get(name)
    }

    /// Returns the number of routes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if the table is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Resolves a command into method, path and body.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownCommand`] if no route exists
    /// - [`Error::InvalidArgument`] if a placeholder has no value
    pub fn resolve(&self, command: &Command) -> Result<ResolvedRoute> {
        let route = self
            .get(command.name())
            .ok_or_else(|| Error::unknown_command(command.name()))?;

        let mut params = command.parameters().clone();
        let path = fill_template(&route.template, command, &mut params)?;

        let body = if route.method == Method::POST || route.method == Method::PUT {
            Some(Value::Object(params))
        } else {
            None
        };

        Ok(ResolvedRoute {
            method: route.method.clone(),
            path,
            body,
            idempotent: route.idempotent,
        })
    }
}

// ============================================================================
// Template Expansion
// ============================================================================

/// Substitutes `{name}` placeholders; parameters used in the path are removed.
fn fill_template(
    template: &str,
    command: &Command,
    params: &mut Map<String, Value>,
) -> Result<String> {
    let mut path = String::with_capacity(template.len() + 32);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        path.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| Error::config(format!("unterminated placeholder in {template}")))?;
        let name = &after[..close];

        let value = placeholder_value(name, command, params).ok_or_else(|| {
            Error::invalid_argument(format!(
                "command {} needs `{name}` for {template}",
                command.name()
            ))
        })?;
        path.push_str(&urlencoding::encode(&value));

        rest = &after[close + 1..];
    }
    path.push_str(rest);

    Ok(path)
}

fn placeholder_value(
    name: &str,
    command: &Command,
    params: &mut Map<String, Value>,
) -> Option<String> {
    let context = command.context();
    match name {
        "sessionId" => context.session_id.as_ref().map(|id| id.to_string()),
        "elementId" => context.element_id.as_ref().map(|id| id.to_string()),
        "browsingContextId" => context.browsing_context_id.as_ref().map(|id| id.to_string()),
        _ => match params.remove(name)? {
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_new_session_route() {
        let routes = CommandRoutes::w3c();
        let command = Command::new("newSession").with_param("capabilities", json!({}));

        let resolved = routes.resolve(&command).expect("resolve");
        assert_eq!(resolved.method, Method::POST);
        assert_eq!(resolved.path, "/session");
        assert_eq!(resolved.body, Some(json!({"capabilities": {}})));
        assert!(!resolved.idempotent);
    }

    #[test]
    fn test_session_and_element_placeholders() {
        let routes = CommandRoutes::w3c();
        let command = Command::new("elementClick")
            .with_session("s 1")
            .with_element("e/2");

        let resolved = routes.resolve(&command).expect("resolve");
        assert_eq!(resolved.path, "/session/s%201/element/e%2F2/click");
        assert_eq!(resolved.body, Some(json!({})));
    }

    #[test]
    fn test_parameter_placeholder_removed_from_body() {
        let routes = CommandRoutes::w3c();
        let command = Command::new("getElementAttribute")
            .with_session("s")
            .with_element("e")
            .with_param("name", json!("href"));

        let resolved = routes.resolve(&command).expect("resolve");
        assert_eq!(resolved.path, "/session/s/element/e/attribute/href");
        assert_eq!(resolved.method, Method::GET);
        assert!(resolved.body.is_none());
        assert!(resolved.idempotent);
    }

    #[test]
    fn test_missing_placeholder() {
        let routes = CommandRoutes::w3c();
        let err = routes.resolve(&Command::new("getTitle")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_unknown_command() {
        let routes = CommandRoutes::w3c();
        let err = routes.resolve(&Command::new("teleport")).unwrap_err();
        assert!(matches!(err, Error::UnknownCommand { .. }));
    }

    #[test]
    fn test_custom_route() {
        let mut routes = CommandRoutes::empty();
        routes.insert(
            "getContext",
            Route::new(Method::GET, "/session/{sessionId}/moz/context"),
        );
        routes.insert(
            "setContext",
            Route::new(Method::POST, "/session/{sessionId}/moz/context").idempotent(true),
        );

        let resolved = routes
            .resolve(&Command::new("setContext").with_session("s"))
            .expect("resolve");
        assert!(resolved.idempotent);
        assert_eq!(routes.len(), 2);
    }

    #[test]
    fn test_w3c_table_prefixes_session() {
        let routes = CommandRoutes::w3c();
        assert_eq!(routes.get("getTitle").map(|r| r.template.as_str()), Some("/session/{sessionId}/title"));
        assert_eq!(routes.get("status").map(|r| r.template.as_str()), Some("/status"));
        assert_eq!(routes.get("quit").map(|r| r.method.clone()), Some(Method::DELETE));
    }
}
