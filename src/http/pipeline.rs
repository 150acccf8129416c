//! Short-circuiting stage chain.
//!
//! Each stage inspects the [`Exchange`] and either lets the request
//! continue, answers it, or fails it. The first stage that does not
//! continue ends the chain; a chain that runs out of stages answers 501.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    response::{IntoResponse, Response},
};

use crate::http::error::ProxyError;
use crate::http::request::RequestContext;

/// What a stage decided.
pub enum Outcome {
    Continue,
    Respond(Response),
    Fail(ProxyError),
}

/// Per-request state handed from stage to stage.
pub struct Exchange {
    pub ctx: RequestContext,
    body: Option<Body>,
}

impl Exchange {
    pub fn new(ctx: RequestContext, body: Body) -> Self {
        Self {
            ctx,
            body: Some(body),
        }
    }

    /// Take the request body. Later calls get an empty body.
    pub fn take_body(&mut self) -> Body {
        self.body.take().unwrap_or_else(Body::empty)
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, exchange: &mut Exchange) -> Outcome;
}

/// Ordered list of stages.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub async fn execute(&self, mut exchange: Exchange) -> Response {
        for stage in &self.stages {
            match stage.run(&mut exchange).await {
                Outcome::Continue => continue,
                Outcome::Respond(response) => {
                    tracing::debug!(request_id = %exchange.ctx.id, stage = stage.name(), status = %response.status(), "Stage answered");
                    return response;
                }
                Outcome::Fail(err) => {
                    tracing::debug!(request_id = %exchange.ctx.id, stage = stage.name(), error = %err, "Stage failed request");
                    return err.into_response();
                }
            }
        }
        ProxyError::Unhandled.into_response()
    }
}
