use crate::config::types::ServerConfig;
use std::collections::HashSet;
use std::path::Path;

/// Drops server blocks that conflict with each other or reference files that
/// do not exist, logging each drop. Mirrors the acceptance filter applied to
/// a virtual-host table: keep everything that can actually be bound and
/// served, discard everything that can't.
pub fn validate_configs(configs: Vec<ServerConfig>) -> Vec<ServerConfig> {
    let mut accepted: Vec<ServerConfig> = Vec::new();
    let mut seen: HashSet<(String, u16, String)> = HashSet::new();
    let mut bound_ports: HashSet<(String, u16)> = HashSet::new();

    for cfg in configs {
        if let Some(reason) = validate_single(&cfg) {
            proxy_log::warn!("dropping server block '{}': {}", cfg.server_name, reason);
            continue;
        }

        let mut conflict = false;
        for &port in &cfg.ports {
            let key = (cfg.host.clone(), port, cfg.server_name.clone());
            if seen.contains(&key) {
                proxy_log::warn!(
                    "dropping server block '{}': duplicate host:port:name {}:{}:{}",
                    cfg.server_name, cfg.host, port, cfg.server_name
                );
                conflict = true;
                break;
            }
            if is_wildcard(&cfg.host) {
                if bound_ports.iter().any(|(h, p)| *p == port && h != &cfg.host) {
                    proxy_log::warn!(
                        "dropping server block '{}': wildcard host conflicts with specific bind on port {}",
                        cfg.server_name, port
                    );
                    conflict = true;
                    break;
                }
            } else if bound_ports.contains(&("*".to_string(), port)) {
                proxy_log::warn!(
                    "dropping server block '{}': specific host conflicts with wildcard bind on port {}",
                    cfg.server_name, port
                );
                conflict = true;
                break;
            }
        }

        if conflict {
            continue;
        }

        for &port in &cfg.ports {
            seen.insert((cfg.host.clone(), port, cfg.server_name.clone()));
            bound_ports.insert((cfg.host.clone(), port));
        }
        accepted.push(cfg);
    }

    accepted
}

fn is_wildcard(host: &str) -> bool {
    host == "*" || host == "0.0.0.0"
}

fn validate_single(cfg: &ServerConfig) -> Option<String> {
    for (&code, path) in &cfg.error_pages {
        if !(100..=599).contains(&code) {
            return Some(format!("error page status code {} out of range", code));
        }
        if !Path::new(path).is_file() {
            return Some(format!("error page '{}' for status {} does not exist", path, code));
        }
    }

    for route in &cfg.routes {
        if !Path::new(&route.root).is_dir() {
            return Some(format!("route '{}' root '{}' is not a directory", route.path, route.root));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::RouteConfig;
    use std::fs;

    fn base(host: &str, port: u16, name: &str) -> ServerConfig {
        ServerConfig {
            host: host.to_string(),
            ports: vec![port],
            server_name: name.to_string(),
            routes: Vec::new(),
            error_pages: Default::default(),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_no_conflicts() {
        let a = base("127.0.0.1", 8080, "a");
        let b = base("127.0.0.1", 8081, "b");
        let out = validate_configs(vec![a, b]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_validate_virtual_hosts_ok() {
        let a = base("127.0.0.1", 8080, "alpha.test");
        let b = base("127.0.0.1", 8080, "beta.test");
        let out = validate_configs(vec![a, b]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_validate_conflict_drops_both() {
        let a = base("127.0.0.1", 8080, "dup");
        let b = base("127.0.0.1", 8080, "dup");
        let out = validate_configs(vec![a, b]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_validate_multi_port_partial_conflict() {
        let mut a = base("127.0.0.1", 8080, "a");
        a.ports.push(8081);
        let b = base("127.0.0.1", 8081, "a");
        let out = validate_configs(vec![a, b]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_validate_wildcard_conflict() {
        let a = base("0.0.0.0", 8080, "wild");
        let b = base("127.0.0.1", 8080, "specific");
        let out = validate_configs(vec![a, b]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_validate_wildcard_no_conflict() {
        let a = base("0.0.0.0", 8080, "wild");
        let b = base("127.0.0.1", 9090, "specific");
        let out = validate_configs(vec![a, b]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_validate_invalid_status_code() {
        let mut a = base("127.0.0.1", 8080, "a");
        a.error_pages.insert(999, "whatever.html".to_string());
        let out = validate_configs(vec![a]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_validate_missing_files() {
        let mut a = base("127.0.0.1", 8080, "a");
        a.error_pages.insert(404, "/nonexistent/path/404.html".to_string());
        let out = validate_configs(vec![a]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_validate_missing_root() {
        let mut a = base("127.0.0.1", 8080, "a");
        a.routes.push(RouteConfig { root: "/nonexistent/www/root".to_string(), ..Default::default() });
        let out = validate_configs(vec![a]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_validate_valid_files() {
        let dir = std::env::temp_dir().join("reactor_httpd_validate_test");
        fs::create_dir_all(&dir).unwrap();
        let page = dir.join("404.html");
        fs::write(&page, "<html></html>").unwrap();

        let mut a = base("127.0.0.1", 8080, "a");
        a.error_pages.insert(404, page.to_string_lossy().to_string());
        a.routes.push(RouteConfig { root: dir.to_string_lossy().to_string(), ..Default::default() });

        let out = validate_configs(vec![a]);
        assert_eq!(out.len(), 1);
    }
}
