use crate::config::ServerConfig;
use crate::db::UserRepository;
use crate::http::{HttpRequest, HttpResponse};
use crate::prelude::{HTTP_BAD_REQUEST, HTTP_UNAUTHORIZED};
use std::sync::Arc;

/// `POST /login` — verifies the `user`/`password` form fields against the
/// repository and reports the outcome as a small JSON body.
pub fn make_handler(users: Arc<UserRepository>) -> impl Fn(&HttpRequest, &mut HttpResponse, &ServerConfig) + Send + Sync {
    move |req, resp, _cfg| {
        let username = req.form.get("user").cloned().unwrap_or_default();
        let password = req.form.get("password").cloned().unwrap_or_default();

        if username.is_empty() || password.is_empty() {
            resp.set_error_page(HTTP_BAD_REQUEST);
            return;
        }

        match users.verify(&username, &password) {
            Ok(user) => {
                resp.set_header("Content-Type", "application/json");
                resp.set_body(format!("{{\"username\":\"{}\"}}", user.username));
            }
            Err(_) => {
                resp.set_error_page(HTTP_UNAUTHORIZED);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Pool;
    use crate::http::Method;

    fn repo_with_user() -> Arc<UserRepository> {
        let repo = UserRepository::new(Pool::new(":memory:", 1).unwrap()).unwrap();
        repo.create("jane", "hunter2").unwrap();
        Arc::new(repo)
    }

    fn req_with_form(user: &str, password: &str) -> HttpRequest {
        let mut r = HttpRequest::new();
        r.method = Some(Method::Post);
        r.path = "/login".to_string();
        r.form.insert("user".to_string(), user.to_string());
        r.form.insert("password".to_string(), password.to_string());
        r
    }

    #[test]
    fn login_succeeds_with_correct_credentials() {
        let handler = make_handler(repo_with_user());
        let cfg = ServerConfig::default();
        let mut resp = HttpResponse::new();
        handler(&req_with_form("jane", "hunter2"), &mut resp, &cfg);
        assert!(!resp.handled || resp.status_code == 200 || resp.status_code == 0);
        assert_ne!(resp.status_code, HTTP_UNAUTHORIZED);
    }

    #[test]
    fn login_rejects_wrong_password() {
        let handler = make_handler(repo_with_user());
        let cfg = ServerConfig::default();
        let mut resp = HttpResponse::new();
        handler(&req_with_form("jane", "wrong"), &mut resp, &cfg);
        assert_eq!(resp.status_code, HTTP_UNAUTHORIZED);
    }

    #[test]
    fn login_rejects_missing_fields() {
        let handler = make_handler(repo_with_user());
        let cfg = ServerConfig::default();
        let mut resp = HttpResponse::new();
        handler(&req_with_form("", ""), &mut resp, &cfg);
        assert_eq!(resp.status_code, HTTP_BAD_REQUEST);
    }
}
