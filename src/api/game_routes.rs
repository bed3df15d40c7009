use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use super::game_websocket;
use crate::auth::{bearer_token, AuthenticatedUser, CredentialVerifier};
use crate::error::{GameError, Result};
use crate::game::GameCoordinator;

/// All HTTP and WebSocket routes, with rejections rendered as JSON.
pub fn routes(
    coordinator: Arc<GameCoordinator>,
    verifier: Arc<dyn CredentialVerifier>,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    game_websocket_route(coordinator.clone(), verifier)
        .or(game_health_check())
        .or(game_stats_endpoint(coordinator))
        .recover(handle_rejection)
}

/// The realtime gateway. The upgrade is refused unless a valid bearer
/// credential is presented.
pub fn game_websocket_route(
    coordinator: Arc<GameCoordinator>,
    verifier: Arc<dyn CredentialVerifier>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("game")
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_authenticated_user(verifier))
        .and(with_coordinator(coordinator))
        .map(
            |ws: warp::ws::Ws, user: AuthenticatedUser, coordinator: Arc<GameCoordinator>| {
                ws.on_upgrade(move |websocket| {
                    game_websocket::handle_game_websocket(websocket, user, coordinator)
                })
            },
        )
}

pub fn game_health_check() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("game" / "health").and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({
            "status": "healthy",
            "service": "Quiz Live Server",
            "version": env!("CARGO_PKG_VERSION")
        }))
    })
}

pub fn game_stats_endpoint(
    coordinator: Arc<GameCoordinator>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("game" / "stats")
        .and(warp::get())
        .and(with_coordinator(coordinator))
        .then(|coordinator: Arc<GameCoordinator>| async move {
            warp::reply::json(&coordinator.stats().await)
        })
}

/// Resolves the handshake credential from `Authorization: Bearer` or the
/// `token` query parameter.
pub fn authenticate(
    verifier: &dyn CredentialVerifier,
    authorization: Option<&str>,
    query_token: Option<&str>,
) -> Result<AuthenticatedUser> {
    let token = authorization
        .and_then(bearer_token)
        .or_else(|| query_token.map(str::trim).filter(|t| !t.is_empty()))
        .ok_or(GameError::MissingCredential)?;
    verifier.verify(token)
}

fn with_authenticated_user(
    verifier: Arc<dyn CredentialVerifier>,
) -> impl Filter<Extract = (AuthenticatedUser,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::query::<HashMap<String, String>>())
        .and_then(move |authorization: Option<String>, query: HashMap<String, String>| {
            let verifier = verifier.clone();
            async move {
                authenticate(
                    verifier.as_ref(),
                    authorization.as_deref(),
                    query.get("token").map(String::as_str),
                )
                .map_err(|e| {
                    tracing::warn!(error = %e, "Rejected realtime handshake");
                    warp::reject::custom(e)
                })
            }
        })
}

fn with_coordinator(
    coordinator: Arc<GameCoordinator>,
) -> impl Filter<Extract = (Arc<GameCoordinator>,), Error = Infallible> + Clone {
    warp::any().map(move || coordinator.clone())
}

pub async fn handle_rejection(err: Rejection) -> std::result::Result<impl Reply, Infallible> {
    let (status, message) = if let Some(e) = err.find::<GameError>() {
        let status = if e.is_auth() {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::BAD_REQUEST
        };
        (status, e.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        tracing::debug!(rejection = ?err, "Unhandled rejection");
        (StatusCode::BAD_REQUEST, "Bad request".to_string())
    };

    let body = warp::reply::json(&serde_json::json!({ "error": message }));
    Ok(warp::reply::with_status(body, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtVerifier;

    struct StaticVerifier;

    impl CredentialVerifier for StaticVerifier {
        fn verify(&self, token: &str) -> Result<AuthenticatedUser> {
            if token == "good" {
                Ok(AuthenticatedUser {
                    user_id: Some("u1".to_string()),
                    role: None,
                    school_id: None,
                })
            } else {
                Err(GameError::invalid_credential("unknown token"))
            }
        }
    }

    #[test]
    fn test_authenticate_prefers_header() {
        let user = authenticate(&StaticVerifier, Some("Bearer good"), Some("bad")).unwrap();
        assert_eq!(user.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_authenticate_falls_back_to_query() {
        assert!(authenticate(&StaticVerifier, None, Some("good")).is_ok());
        assert!(authenticate(&StaticVerifier, Some("Basic xyz"), Some("good")).is_ok());
    }

    #[test]
    fn test_authenticate_missing_credential() {
        let err = authenticate(&StaticVerifier, None, None).unwrap_err();
        assert!(matches!(err, GameError::MissingCredential));
        let err = authenticate(&StaticVerifier, Some("Bearer "), Some("  ")).unwrap_err();
        assert!(matches!(err, GameError::MissingCredential));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let resp = warp::test::request()
            .method("GET")
            .path("/game/health")
            .reply(&game_health_check())
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let coordinator = GameCoordinator::new();
        coordinator.registry().get_or_create("R1").await;
        let verifier: Arc<dyn CredentialVerifier> = Arc::new(JwtVerifier::new("secret"));

        let resp = warp::test::request()
            .path("/game/stats")
            .reply(&routes(coordinator, verifier))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["rooms"], 1);
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let verifier: Arc<dyn CredentialVerifier> = Arc::new(JwtVerifier::new("secret"));
        let resp = warp::test::request()
            .path("/nope")
            .reply(&routes(GameCoordinator::new(), verifier))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
