//! Endpoint, alias and static file tables.
//!
//! Tables are fixed-size and searched linearly in registration order: first an
//! exact path match, then the path an alias maps it to.

use heapless::Vec;

use crate::error::RouteError;

use super::request::{Method, Request};
use super::response::Responder;

pub const MAX_ENDPOINTS: usize = 32;
pub const MAX_ALIASES: usize = 16;
pub const MAX_FILES: usize = 32;

pub type Handler<C> = fn(&Request, &mut Responder<'_>, &mut C);

struct Endpoint<C> {
    method: Method,
    uri: &'static str,
    handler: Handler<C>,
}

#[derive(Clone, Copy)]
struct Alias {
    from: &'static str,
    to: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StaticFile {
    pub path: &'static str,
    pub content_type: &'static str,
    pub body: &'static [u8],
}

/// Result of a lookup.
pub enum Route<C> {
    Handler(Handler<C>),
    File(StaticFile),
}

pub struct Router<C> {
    endpoints: Vec<Endpoint<C>, MAX_ENDPOINTS>,
    aliases: Vec<Alias, MAX_ALIASES>,
    files: Vec<StaticFile, MAX_FILES>,
    not_found: Option<Handler<C>>,
}

impl<C> Router<C> {
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            aliases: Vec::new(),
            files: Vec::new(),
            not_found: None,
        }
    }

    pub fn on(&mut self, method: Method, uri: &'static str, handler: Handler<C>) -> Result<(), RouteError> {
        self.endpoints
            .push(Endpoint { method, uri, handler })
            .map_err(|_| {
                log::warn!("http: no room for {} {}", method.as_str(), uri);
                RouteError::TableFull
            })
    }

    pub fn get(&mut self, uri: &'static str, handler: Handler<C>) -> Result<(), RouteError> {
        self.on(Method::Get, uri, handler)
    }

    pub fn post(&mut self, uri: &'static str, handler: Handler<C>) -> Result<(), RouteError> {
        self.on(Method::Post, uri, handler)
    }

    /// Requests for `from` are served as if they asked for `to`.
    pub fn alias(&mut self, from: &'static str, to: &'static str) -> Result<(), RouteError> {
        self.aliases
            .push(Alias { from, to })
            .map_err(|_| RouteError::TableFull)
    }

    /// Serve `body` on GET `path`, typed by the file extension.
    pub fn serve_file(&mut self, path: &'static str, body: &'static [u8]) -> Result<(), RouteError> {
        self.files
            .push(StaticFile {
                path,
                content_type: content_type_for(path),
                body,
            })
            .map_err(|_| RouteError::TableFull)
    }

    pub fn set_not_found(&mut self, handler: Handler<C>) {
        self.not_found = Some(handler);
    }

    pub fn not_found(&self) -> Option<Handler<C>> {
        self.not_found
    }

    pub fn lookup(&self, method: Method, path: &str) -> Option<Route<C>> {
        self.find(method, path).or_else(|| {
            let to = self.aliases.iter().find(|a| a.from == path)?.to;
            self.find(method, to)
        })
    }

    fn find(&self, method: Method, path: &str) -> Option<Route<C>> {
        if let Some(ep) = self
            .endpoints
            .iter()
            .find(|ep| ep.method == method && ep.uri == path)
        {
            return Some(Route::Handler(ep.handler));
        }
        if method == Method::Get {
            if let Some(file) = self.files.iter().find(|f| f.path == path) {
                return Some(Route::File(*file));
            }
        }
        None
    }
}

impl<C> Default for Router<C> {
    fn default() -> Self {
        Self::new()
    }
}

pub fn content_type_for(path: &str) -> &'static str {
    let ext = match path.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => return "text/plain",
    };
    let types: [(&str, &str); 14] = [
        ("html", "text/html"),
        ("htm", "text/html"),
        ("css", "text/css"),
        ("js", "application/javascript"),
        ("json", "application/json"),
        ("png", "image/png"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("gif", "image/gif"),
        ("ico", "image/x-icon"),
        ("svg", "image/svg+xml"),
        ("woff", "font/woff"),
        ("woff2", "font/woff2"),
        ("txt", "text/plain"),
    ];
    types
        .iter()
        .find(|(e, _)| e.eq_ignore_ascii_case(ext))
        .map_or("text/plain", |(_, t)| *t)
}
