use crate::config::types::{RouteConfig, ServerConfig};
use std::fmt;

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\x1b[1;36m\u{256d}\u{2500} server '{}' \u{2500}\u{256e}\x1b[0m", self.server_name)?;
        writeln!(f, "\x1b[1;36m\u{2502}\x1b[0m network     {}:{:?}", self.host, self.ports)?;
        writeln!(f, "\x1b[1;36m\u{2502}\x1b[0m default     {}", self.default_server)?;
        writeln!(f, "\x1b[1;36m\u{2502}\x1b[0m reactors    {}", self.num_sub_reactor)?;
        writeln!(f, "\x1b[1;36m\u{2502}\x1b[0m sendfile    {}", self.use_sendfile)?;
        writeln!(f, "\x1b[1;36m\u{2502}\x1b[0m thread pool {}", self.use_thread_pool)?;
        writeln!(f, "\x1b[1;36m\u{2502}\x1b[0m timeout     {}ms", self.timeout_ms)?;
        writeln!(f, "\x1b[1;36m\u{2502}\x1b[0m max conns   {}", self.max_connections)?;
        writeln!(f, "\x1b[1;36m\u{2502}\x1b[0m body limit  {} bytes", self.client_max_body_size)?;
        if !self.error_pages.is_empty() {
            writeln!(f, "\x1b[1;36m\u{2502}\x1b[0m error pages:")?;
            for (code, path) in &self.error_pages {
                writeln!(f, "\x1b[1;36m\u{2502}\x1b[0m   {} -> {}", code, path)?;
            }
        }
        writeln!(f, "\x1b[1;36m\u{2502}\x1b[0m routes:")?;
        for route in &self.routes {
            route.fmt_details(f)?;
        }
        writeln!(f, "\x1b[1;36m\u{2570}{}\u{256f}\x1b[0m", "\u{2500}".repeat(self.server_name.len() + 10))
    }
}

impl RouteConfig {
    fn fmt_details(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "\x1b[1;36m\u{2502}\x1b[0m   {} [{}] -> {:?} root={}",
            self.path,
            self.methods.join(","),
            self.handler,
            self.root
        )
    }
}

pub fn display_config(configs: &[ServerConfig]) {
    for cfg in configs {
        print!("{}", cfg);
    }
}
