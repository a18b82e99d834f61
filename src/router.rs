use crate::config::ServerConfig;
use crate::http::{HttpRequest, HttpResponse, Method};
use crate::prelude::{HTTP_METHOD_NOT_ALLOWED, HTTP_NOT_FOUND};
use std::sync::Arc;

pub type Handler = Arc<dyn Fn(&HttpRequest, &mut HttpResponse, &ServerConfig) + Send + Sync>;

struct RouteEntry {
    pattern: String,
    get: Option<Handler>,
    post: Option<Handler>,
}

impl RouteEntry {
    fn matches(&self, path: &str) -> bool {
        if self.pattern == path {
            return true;
        }
        if let Some(ext) = self.pattern.strip_prefix('*') {
            return path.ends_with(ext);
        }
        if let Some(prefix) = self.pattern.strip_suffix('*') {
            return path.starts_with(prefix);
        }
        false
    }

    fn handler_for(&self, method: Method) -> Option<&Handler> {
        match method {
            Method::Get => self.get.as_ref(),
            Method::Post => self.post.as_ref(),
        }
    }
}

/// Exact match wins outright; otherwise entries are tried in insertion
/// order, so suffix- and prefix-glob routes registered earlier take
/// precedence over ones registered later.
#[derive(Default)]
pub struct Router {
    entries: Vec<RouteEntry>,
    pre: Vec<Handler>,
    post: Vec<Handler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(&mut self, pattern: &str, method: Method, handler: Handler) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.pattern == pattern) {
            match method {
                Method::Get => entry.get = Some(handler),
                Method::Post => entry.post = Some(handler),
            }
            return;
        }
        let mut entry = RouteEntry { pattern: pattern.to_string(), get: None, post: None };
        match method {
            Method::Get => entry.get = Some(handler),
            Method::Post => entry.post = Some(handler),
        }
        self.entries.push(entry);
    }

    pub fn add_pre_handler(&mut self, handler: Handler) {
        self.pre.push(handler);
    }

    pub fn add_post_handler(&mut self, handler: Handler) {
        self.post.push(handler);
    }

    fn find(&self, path: &str) -> Option<&RouteEntry> {
        if let Some(exact) = self.entries.iter().find(|e| e.pattern == path) {
            return Some(exact);
        }
        self.entries.iter().find(|e| e.pattern != path && e.matches(path))
    }

    /// Runs the pre-handler chain, routes the request if no pre-handler
    /// short-circuited it, then always runs the post-handler chain.
    pub fn dispatch(&self, req: &HttpRequest, resp: &mut HttpResponse, cfg: &ServerConfig) {
        let mut short_circuited = false;
        for pre in &self.pre {
            pre(req, resp, cfg);
            if resp.handled && resp.status_code >= 400 {
                short_circuited = true;
                break;
            }
        }

        if !short_circuited {
            self.route(req, resp, cfg);
        }

        for post in &self.post {
            post(req, resp, cfg);
        }
    }

    fn route(&self, req: &HttpRequest, resp: &mut HttpResponse, cfg: &ServerConfig) {
        let method = match req.method {
            Some(m) => m,
            None => {
                resp.set_error_page(HTTP_NOT_FOUND);
                return;
            }
        };

        match self.find(&req.path) {
            Some(entry) => match entry.handler_for(method) {
                Some(handler) => handler(req, resp, cfg),
                None => {
                    resp.set_error_page(HTTP_METHOD_NOT_ALLOWED);
                }
            },
            None => {
                resp.set_error_page(HTTP_NOT_FOUND);
            }
        }
    }
}
