use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, users};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(users::router())
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    const FORM: &str = "application/x-www-form-urlencoded";

    fn form(method: Method, uri: &str, body: &str, token: Option<&str>) -> Request<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, FORM);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    fn bare(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        req.body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn signed_in(app: &Router) -> String {
        let (status, _) = send(
            app,
            form(Method::POST, "/signup", "username=alice&email=a%40x.com&password=secret1", None),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send(
            app,
            form(Method::POST, "/login", "email=a%40x.com&password=secret1", None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    fn multipart(token: &str, parts: &[(&str, Option<(&str, &str)>, &[u8])]) -> Request<Body> {
        let boundary = "XBOUNDARYX";
        let mut body = Vec::new();
        for (name, file, data) in parts {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            match file {
                Some((file_name, ct)) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {ct}\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method(Method::PUT)
            .uri("/user/update")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::fake());
        let res = app.oneshot(bare(Method::GET, "/health", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn signup_login_verify_flow() {
        let app = build_app(AppState::fake());
        let token = signed_in(&app).await;

        let (status, body) = send(&app, bare(Method::GET, "/auth/verify-token", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "a@x.com");
        assert!(body.get("password_hash").is_none());
        assert!(body["last_login"].is_string());
    }

    #[tokio::test]
    async fn signup_response_and_conflict() {
        let app = build_app(AppState::fake());
        let req = || form(Method::POST, "/signup", "username=bob&email=b%40x.com&password=pw1234", None);

        let (status, body) = send(&app, req()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["username"], "bob");
        assert_eq!(body["user"]["email"], "b@x.com");
        assert!(body["message"].is_string());

        let (status, body) = send(&app, req()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn bad_credentials_and_missing_fields() {
        let app = build_app(AppState::fake());
        signed_in(&app).await;

        let (status, body) = send(&app, form(Method::POST, "/login", "email=a%40x.com&password=nope", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid email or password");

        let (status, _) = send(&app, form(Method::POST, "/login", "email=a%40x.com", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn protected_routes_need_a_bearer_token() {
        let app = build_app(AppState::fake());
        for req in [
            bare(Method::GET, "/auth/verify-token", None),
            bare(Method::GET, "/user/allusers", None),
            bare(Method::DELETE, "/auth/logout", None),
            bare(Method::GET, "/user/allusers", Some("not-a-jwt")),
        ] {
            let (status, body) = send(&app, req).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn logout_and_directory() {
        let app = build_app(AppState::fake());
        let token = signed_in(&app).await;

        let (status, body) = send(&app, bare(Method::DELETE, "/auth/logout", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].is_string());

        let (status, body) = send(&app, bare(Method::GET, "/user/allusers", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        let list = body.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["username"], "alice");
    }

    #[tokio::test]
    async fn multipart_update_with_avatar() {
        let app = build_app(AppState::fake());
        let token = signed_in(&app).await;

        let req = multipart(
            &token,
            &[
                ("bio", None, b"hi there".as_slice()),
                ("birth_date", None, b"1991-04-05".as_slice()),
                ("avatar", Some(("me.png", "image/png")), [1u8, 2, 3, 4].as_slice()),
            ],
        );
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["bio"], "hi there");
        assert_eq!(body["user"]["birth_date"], "1991-04-05");
        assert_eq!(body["user"]["avatar_url"], "https://fake.local/avatars/me.png");
    }

    #[tokio::test]
    async fn multipart_update_rejects_bad_input() {
        let app = build_app(AppState::fake());
        let token = signed_in(&app).await;

        let (status, _) = send(&app, multipart(&token, &[("birth_date", None, b"yesterday".as_slice())])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, multipart(&token, &[("avatar", Some(("a.txt", "text/plain")), b"x".as_slice())])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let big = vec![0u8; 5 * 1024 * 1024 + 1];
        let (status, _) = send(&app, multipart(&token, &[("avatar", Some(("a.png", "image/png")), big.as_slice())])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // an empty file part counts as no avatar
        let (status, _) = send(&app, multipart(&token, &[("avatar", Some(("", "application/octet-stream")), b"".as_slice())])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_multipart_update_gets_json_error() {
        let app = build_app(AppState::fake());
        let token = signed_in(&app).await;

        let (status, body) = send(&app, form(Method::PUT, "/user/update", "bio=hello", Some(&token))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn password_change_then_account_deletion() {
        let app = build_app(AppState::fake());
        let token = signed_in(&app).await;

        let (status, _) = send(
            &app,
            form(Method::PUT, "/user/change-password", "current_password=wrong&new_password=brandnew", Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            form(Method::PUT, "/user/change-password", "current_password=secret1&new_password=brandnew", Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            form(Method::DELETE, "/user/delete-account", "password=secret1", Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            form(Method::DELETE, "/user/delete-account", "password=brandnew", Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // the token no longer maps to an account
        let (status, _) = send(&app, bare(Method::GET, "/auth/verify-token", Some(&token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
