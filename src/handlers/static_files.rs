use crate::config::ServerConfig;
use crate::http::{HttpRequest, HttpResponse};
use crate::prelude::HTTP_FORBIDDEN;
use std::path::{Component, Path, PathBuf};

/// Serves a file out of the matched route's document root. Resolves the
/// request path under the root, refuses to serve outside of it, and falls
/// back to the route's `default_file` for directory requests.
pub fn handle(req: &HttpRequest, resp: &mut HttpResponse, cfg: &ServerConfig) {
    let route = match cfg.find_route(&req.path) {
        Some(r) => r,
        None => {
            resp.set_status(crate::prelude::HTTP_NOT_FOUND);
            return;
        }
    };

    let root = PathBuf::from(&route.root);
    let relative = req.path.trim_start_matches('/');
    let mut candidate = root.join(relative);

    if candidate.is_dir() {
        candidate.push(&route.default_file);
    }

    match resolve_within_root(&root, &candidate) {
        Some(resolved) => match req.range {
            Some(range) => resp.set_file_with_range(resolved, range),
            None => resp.set_file(resolved),
        },
        None => {
            resp.set_status(HTTP_FORBIDDEN);
            resp.set_error_page(HTTP_FORBIDDEN)
        }
    };
}

/// Returns the canonicalized path if it stays within `root`, else `None`.
/// Lexical normalization happens even when the file doesn't exist yet (so a
/// missing-file 404 downgrade still happens downstream, not a 403), but a
/// `..` that would escape the root is always rejected.
fn resolve_within_root(root: &Path, candidate: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }

    if !normalized.starts_with(normalize(root)) {
        return None;
    }

    Some(normalized)
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouteConfig, RouteKind};
    use crate::http::Method;
    use std::fs;

    #[test]
    fn serves_file_within_root() {
        let dir = std::env::temp_dir().join("reactor_httpd_static_test_ok");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("hello.txt"), b"hi").unwrap();

        let mut cfg = ServerConfig::default();
        cfg.routes.push(RouteConfig {
            path: "/".to_string(),
            methods: vec!["GET".to_string()],
            handler: RouteKind::Static,
            root: dir.to_string_lossy().to_string(),
            default_file: "index.html".to_string(),
        });

        let mut req = HttpRequest::new();
        req.method = Some(Method::Get);
        req.path = "/hello.txt".to_string();

        let mut resp = HttpResponse::new();
        handle(&req, &mut resp, &cfg);
        resp.finalize();
        assert_eq!(resp.status_code, 200);
    }

    #[test]
    fn rejects_path_traversal() {
        let dir = std::env::temp_dir().join("reactor_httpd_static_test_traversal");
        fs::create_dir_all(&dir).unwrap();

        let mut cfg = ServerConfig::default();
        cfg.routes.push(RouteConfig {
            path: "/".to_string(),
            methods: vec!["GET".to_string()],
            handler: RouteKind::Static,
            root: dir.to_string_lossy().to_string(),
            default_file: "index.html".to_string(),
        });

        let mut req = HttpRequest::new();
        req.method = Some(Method::Get);
        req.path = "/../../etc/passwd".to_string();

        let mut resp = HttpResponse::new();
        handle(&req, &mut resp, &cfg);
        assert_eq!(resp.status_code, HTTP_FORBIDDEN);
    }
}
