//! Method registry and dispatcher for the three API surfaces.
//!
//! Each surface owns a [`Registry`] mapping a method name to a route. A route
//! decodes and checks the method's options, then runs the handler with a
//! fresh [`CallContext`]. Nothing reaches a backend before the options pass.

pub mod chat;
pub mod kvstore;
pub mod messages;
pub mod resolve;
pub mod team;

use crate::domain::correlation::CorrelationId;
use crate::domain::envelope::{Call, Reply, API_VERSION};
use crate::domain::error::{codes, ApiError, ApiResult, GatewayError};
use crate::domain::methods::{get_method_info, ApiSurface, MethodInfo};
use crate::domain::options::MethodOptions;
use crate::domain::rate_limit::RateLimitCollector;
use crate::ports::outbound::{BackendResult, Session};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn, Span};

/// Per-call state handed to a handler
#[derive(Clone)]
pub struct CallContext {
    pub session: Arc<Session>,
    pub limits: RateLimitCollector,
    pub correlation_id: CorrelationId,
}

impl CallContext {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            limits: RateLimitCollector::new(),
            correlation_id: CorrelationId::new(),
        }
    }

    /// Unwrap a backend result, recording the rate limits it reported
    pub fn track<T>(&self, result: BackendResult<T>) -> ApiResult<T> {
        match result {
            Ok(limited) => {
                self.limits.record(limited.rate_limits);
                Ok(limited.value)
            }
            Err(e) => Err(ApiError::from(e)),
        }
    }
}

type HandlerFuture = BoxFuture<'static, ApiResult<Value>>;

type Invoke =
    Box<dyn Fn(CallContext, Option<&RawValue>) -> Result<HandlerFuture, GatewayError> + Send + Sync>;

/// A registered method
pub struct Route {
    pub info: &'static MethodInfo,
    invoke: Invoke,
}

/// Method table of one API surface
pub struct Registry {
    surface: ApiSurface,
    routes: HashMap<&'static str, Route>,
}

impl Registry {
    pub fn new(surface: ApiSurface) -> Self {
        Self {
            surface,
            routes: HashMap::new(),
        }
    }

    /// Register `handler` under `name`. The method must have metadata in the
    /// static method table for this surface.
    pub fn route<O, R, F, Fut>(mut self, name: &'static str, handler: F) -> Self
    where
        O: MethodOptions,
        R: Serialize + 'static,
        F: Fn(CallContext, O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<R>> + Send + 'static,
    {
        let Some(info) = get_method_info(self.surface, name) else {
            error!(surface = %self.surface, method = name, "No metadata for method, not registered");
            return self;
        };

        let invoke: Invoke = Box::new(move |ctx: CallContext, raw: Option<&RawValue>| {
            let options: O = decode_options(info, raw)?;
            let fut = handler(ctx, options);
            Ok(async move {
                let result = fut.await?;
                serde_json::to_value(result).map_err(|e| ApiError::internal(e.to_string()))
            }
            .boxed())
        });

        self.routes.insert(name, Route { info, invoke });
        self
    }

    pub fn surface(&self) -> ApiSurface {
        self.surface
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.routes.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn get(&self, method: &str) -> Option<&Route> {
        self.routes.get(method)
    }

    /// Route one call and build its reply.
    ///
    /// Transport-level failures (version, unknown method, bad options) are
    /// returned as `Err` and produce no reply.
    #[instrument(
        name = "dispatch",
        skip(self, session, call),
        fields(
            surface = %self.surface,
            method = %call.method,
            id = call.id,
            correlation_id = tracing::field::Empty
        )
    )]
    pub async fn dispatch(&self, session: &Arc<Session>, call: &Call) -> Result<Reply, GatewayError> {
        let version = call.params.effective_version();
        if version != API_VERSION {
            return Err(GatewayError::UnsupportedVersion {
                method: call.method.clone(),
                version,
            });
        }

        let route = self
            .routes
            .get(call.method.as_str())
            .ok_or_else(|| GatewayError::UnknownMethod {
                method: call.method.clone(),
                version,
            })?;

        let ctx = CallContext::new(Arc::clone(session));
        Span::current().record("correlation_id", tracing::field::display(ctx.correlation_id));

        let fut = (route.invoke)(ctx.clone(), call.params.options.as_deref())?;
        let outcome = match tokio::time::timeout(route.info.timeout, fut).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ApiError::new(
                codes::TIMEOUT,
                format!("{} timed out after {:?}", route.info.name, route.info.timeout),
            )),
        };

        let reply = match outcome {
            Ok(result) => {
                debug!("Call succeeded");
                Reply::success(call, attach_rate_limits(result, &ctx.limits))
            }
            Err(err) => {
                warn!(code = err.code, error = %err.message, "Call failed");
                Reply::failure(call, err)
            }
        };
        Ok(reply)
    }
}

fn decode_options<O: MethodOptions>(
    info: &MethodInfo,
    raw: Option<&RawValue>,
) -> Result<O, GatewayError> {
    let options = match raw {
        None if info.options_required => {
            return Err(GatewayError::invalid_options(
                info.name,
                API_VERSION,
                "empty options",
            ))
        }
        None => O::default(),
        Some(raw) => serde_json::from_str(raw.get())
            .map_err(|e| GatewayError::invalid_options(info.name, API_VERSION, e.to_string()))?,
    };
    options
        .check()
        .map_err(|reason| GatewayError::invalid_options(info.name, API_VERSION, reason))?;
    Ok(options)
}

/// Insert the aggregated rate limits under `ratelimits` when the result is
/// an object and at least one limit was reported.
fn attach_rate_limits(mut result: Value, limits: &RateLimitCollector) -> Value {
    if let Value::Object(ref mut map) = result {
        let summary = limits.summary();
        if !summary.is_empty() {
            if let Ok(value) = serde_json::to_value(summary) {
                map.insert("ratelimits".to_string(), value);
            }
        }
    }
    result
}

/// The three API surfaces
pub struct Surfaces {
    pub chat: Registry,
    pub team: Registry,
    pub kvstore: Registry,
}

impl Surfaces {
    pub fn new() -> Self {
        Self {
            chat: chat::routes(),
            team: team::routes(),
            kvstore: kvstore::routes(),
        }
    }

    pub fn get(&self, surface: ApiSurface) -> &Registry {
        match surface {
            ApiSurface::Chat => &self.chat,
            ApiSurface::Team => &self.team,
            ApiSurface::KvStore => &self.kvstore,
        }
    }
}

impl Default for Surfaces {
    fn default() -> Self {
        Self::new()
    }
}
