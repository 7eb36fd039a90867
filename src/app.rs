//! Route table.
//!
//! | Route | Stack |
//! |---|---|
//! | `POST /api/auth/verify` | Logging → handler |
//! | `POST /api/auth/resend-verification` | Logging → handler |
//! | `* /api/monitoring/health` | Validation(GET) → Monitoring → Logging → ErrorHandler → handler |
//! | `POST /api/redis` | Logging → handler |

use std::sync::Arc;

use crate::auth::AuthService;
use crate::health::{self, HealthReporter};
use crate::kv::{self, KeyValueStore};
use crate::method::Method;
use crate::middleware::{LogSink, Logging, MetricsSink, Pipeline};
use crate::request::RequestContext;
use crate::router::Router;

/// Every collaborator the routes need, built once at startup.
pub struct Services {
    pub auth: Arc<AuthService>,
    pub kv: Arc<dyn KeyValueStore>,
    pub health: Arc<dyn HealthReporter>,
    pub metrics: Arc<dyn MetricsSink>,
    pub logs: Arc<dyn LogSink>,
}

pub fn router(services: Services) -> Router {
    let Services { auth, kv: store, health: reporter, metrics, logs } = services;
    let logged = || Pipeline::new().layer(Logging::new(Arc::clone(&logs)));

    let verify = {
        let auth = Arc::clone(&auth);
        logged().handler(move |ctx: RequestContext| {
            let auth = Arc::clone(&auth);
            async move { auth.verify(ctx).await }
        })
    };

    let resend = logged().handler(move |ctx: RequestContext| {
        let auth = Arc::clone(&auth);
        async move { auth.resend_verification(ctx).await }
    });

    let redis = logged().handler(move |_ctx: RequestContext| {
        let store = Arc::clone(&store);
        async move { kv::read_item(store).await }
    });

    Router::new()
        .on(Method::Post, "/api/auth/verify", verify)
        .on(Method::Post, "/api/auth/resend-verification", resend)
        .any("/api/monitoring/health", health::route(reporter, metrics, Arc::clone(&logs)))
        .on(Method::Post, "/api/redis", redis)
}
