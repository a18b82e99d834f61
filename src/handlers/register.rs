use crate::config::ServerConfig;
use crate::db::{UserError, UserRepository};
use crate::http::{HttpRequest, HttpResponse};
use crate::prelude::{HTTP_BAD_REQUEST, HTTP_CONFLICT, HTTP_CREATED, HTTP_INTERNAL_SERVER_ERROR};
use std::sync::Arc;

/// `POST /register` — creates a user from the `user`/`password` form fields.
pub fn make_handler(users: Arc<UserRepository>) -> impl Fn(&HttpRequest, &mut HttpResponse, &ServerConfig) + Send + Sync {
    move |req, resp, _cfg| {
        let username = req.form.get("user").cloned().unwrap_or_default();
        let password = req.form.get("password").cloned().unwrap_or_default();

        if username.is_empty() || password.is_empty() {
            resp.set_error_page(HTTP_BAD_REQUEST);
            return;
        }

        match users.create(&username, &password) {
            Ok(_user) => {
                resp.set_status(HTTP_CREATED);
                resp.set_header("Content-Type", "application/json");
                resp.set_body(format!("{{\"username\":\"{username}\"}}"));
            }
            Err(UserError::DuplicateUsername(_)) => {
                resp.set_error_page(HTTP_CONFLICT);
            }
            Err(_) => {
                resp.set_error_page(HTTP_INTERNAL_SERVER_ERROR);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Pool;
    use crate::http::Method;

    fn repo() -> Arc<UserRepository> {
        Arc::new(UserRepository::new(Pool::new(":memory:", 1).unwrap()).unwrap())
    }

    fn req_with_form(user: &str, password: &str) -> HttpRequest {
        let mut r = HttpRequest::new();
        r.method = Some(Method::Post);
        r.path = "/register".to_string();
        r.form.insert("user".to_string(), user.to_string());
        r.form.insert("password".to_string(), password.to_string());
        r
    }

    #[test]
    fn register_succeeds_for_new_user() {
        let handler = make_handler(repo());
        let cfg = ServerConfig::default();
        let mut resp = HttpResponse::new();
        handler(&req_with_form("jane", "hunter2"), &mut resp, &cfg);
        assert_eq!(resp.status_code, HTTP_CREATED);
    }

    #[test]
    fn register_rejects_duplicate() {
        let users = repo();
        users.create("jane", "hunter2").unwrap();
        let handler = make_handler(users);
        let cfg = ServerConfig::default();
        let mut resp = HttpResponse::new();
        handler(&req_with_form("jane", "hunter2"), &mut resp, &cfg);
        assert_eq!(resp.status_code, HTTP_CONFLICT);
    }

    #[test]
    fn register_rejects_missing_fields() {
        let handler = make_handler(repo());
        let cfg = ServerConfig::default();
        let mut resp = HttpResponse::new();
        handler(&req_with_form("", "hunter2"), &mut resp, &cfg);
        assert_eq!(resp.status_code, HTTP_BAD_REQUEST);
    }
}
