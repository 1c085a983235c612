//! Per-request units of work for axum applications.
//!
//! Every request gets its own [`TaskContext`], a unit of work is started
//! before the handler runs and finished after it: committed for successful
//! responses, rolled back for server errors. Requests dropped before the
//! handler finishes (client disconnects, timeouts) are rolled back too.
//!
//! Handlers reach the unit of work through request extensions:
//!
//! ```ignore
//! async fn create_user(Extension(unit): Extension<Arc<UnitOfWork>>) -> StatusCode {
//!     let session = unit.session();
//!     // ...
//!     StatusCode::CREATED
//! }
//! ```

use crate::core::TxError;
use crate::lifecycle::PersistencePlugin;
use crate::unit_of_work::TaskContext;
use axum::Json;
use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use http::{Method, StatusCode};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// How requests map onto units of work
#[derive(Debug, Clone, Copy, Default)]
pub struct WebTxPolicy {
    /// Open read-only units of work for GET, HEAD and OPTIONS
    pub readonly_safe_methods: bool,
}

impl WebTxPolicy {
    fn is_readonly(&self, method: &Method) -> bool {
        self.readonly_safe_methods
            && matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
    }
}

#[derive(Clone)]
pub struct WebUnitOfWork {
    plugin: Arc<PersistencePlugin>,
    policy: WebTxPolicy,
}

impl WebUnitOfWork {
    pub fn new(plugin: Arc<PersistencePlugin>) -> Self {
        Self {
            plugin,
            policy: WebTxPolicy::default(),
        }
    }

    pub fn policy(mut self, policy: WebTxPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Wrap every route of `router` in a unit of work
pub fn with_unit_of_work<S>(router: Router<S>, state: WebUnitOfWork) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(state, unit_of_work_middleware))
}

pub async fn unit_of_work_middleware(
    State(state): State<WebUnitOfWork>,
    mut request: Request,
    next: Next,
) -> Response {
    let ctx = TaskContext::labelled(format!("{} {}", request.method(), request.uri().path()));
    let readonly = state.policy.is_readonly(request.method());
    let plugin = &state.plugin;

    if let Err(err) = plugin.before_invocation(&ctx, readonly).await {
        return TxRejection(err).into_response();
    }
    let guard = plugin.registry().guard(&ctx);

    request.extensions_mut().insert(ctx.clone());
    if let Some(unit) = plugin.registry().current(&ctx).await {
        request.extensions_mut().insert(unit);
    }

    let response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            if let Err(err) = plugin.on_invocation_exception(&ctx).await {
                error!(task = %ctx, error = %err, "Rollback after handler panic failed");
            }
            guard.disarm();
            std::panic::resume_unwind(panic);
        }
    };

    let ended = if response.status().is_server_error() {
        plugin.on_invocation_exception(&ctx).await
    } else {
        plugin.after_invocation(&ctx).await
    };
    guard.disarm();

    match ended {
        Ok(()) => response,
        Err(err) => TxRejection(err).into_response(),
    }
}

/// A unit of work could not be started or finished
#[derive(Debug)]
pub struct TxRejection(pub TxError);

impl IntoResponse for TxRejection {
    fn into_response(self) -> Response {
        let code = match &self.0 {
            TxError::BeginFailed(_) => "begin_failed",
            TxError::CommitFailed(_) => "commit_failed",
            TxError::RollbackFailed(_) => "rollback_failed",
            TxError::ReentrantBegin(_) => "reentrant_begin",
        };
        error!(error = %self.0, code, "Unit of work failed");

        let body = Json(ErrorResponse {
            error: self.0.to_string(),
            code: code.to_string(),
        });

        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
