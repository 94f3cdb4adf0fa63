use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};

use crate::server::handlers::{
    create_application_handler, delete_application_handler, delete_key_handler,
    generate_keys_handler, get_application_handler, get_key_handler, health_handler,
    list_applications_handler, list_keys_handler, revoke_key_handler, update_application_handler,
    validate_handler, AppState,
};
use crate::server::logging::request_logging_middleware;

/// Build the main application router for the Eclipse server.
///
/// # Routes
///
/// ## Applications
/// - `GET /api/apps?userId=` - List an owner's applications
/// - `POST /api/apps` - Register an application
/// - `GET /api/apps/:id` - Get an application
/// - `PUT /api/apps/:id` - Update name, version, language or status
/// - `DELETE /api/apps/:id` - Delete an application and all its keys
///
/// ## Keys
/// - `GET /api/keys?appId=&status=` - List keys
/// - `POST /api/keys/generate` - Generate a batch of keys
/// - `GET /api/keys/:key` - Get a key
/// - `POST /api/keys/:key/revoke` - Revoke a key
/// - `DELETE /api/keys/:key` - Delete a key
///
/// ## Client
/// - `POST /api/validate` - Validate a key, binding the hwid on first use
/// - `GET /health` - Liveness probe
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/apps",
            get(list_applications_handler).post(create_application_handler),
        )
        .route(
            "/api/apps/:id",
            get(get_application_handler)
                .put(update_application_handler)
                .delete(delete_application_handler),
        )
        .route("/api/keys", get(list_keys_handler))
        .route("/api/keys/generate", post(generate_keys_handler))
        .route(
            "/api/keys/:key",
            get(get_key_handler).delete(delete_key_handler),
        )
        .route("/api/keys/:key/revoke", post(revoke_key_handler))
        .route("/api/validate", post(validate_handler))
        .layer(from_fn(request_logging_middleware))
        .with_state(state)
}
