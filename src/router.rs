use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::context::ServerContext;
use crate::protocol::envelope::{decode_request, encode_response};
use crate::protocol::{ErrorCode, Request, Response};
use crate::session::{Level, Session};

/// A single command implementation. The response arrives pre-populated as a
/// success with msg "OK"; handlers only touch what they change.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &ServerContext,
        session: &mut Session,
        req: &Request,
        resp: &mut Response,
    );
}

struct Route {
    required: Level,
    handler: Box<dyn CommandHandler>,
}

#[derive(Default)]
pub struct Router {
    routes: HashMap<String, Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, required: Level, handler: Box<dyn CommandHandler>) {
        let name = name.to_ascii_uppercase();
        if self.routes.insert(name.clone(), Route { required, handler }).is_some() {
            warn!("Command {} registered twice, keeping the latest", name);
        }
    }

    pub fn required_level(&self, name: &str) -> Option<Level> {
        self.routes.get(&name.to_ascii_uppercase()).map(|r| r.required)
    }

    /// Route an already-decoded request.
    pub async fn dispatch(
        &self,
        ctx: &ServerContext,
        session: &mut Session,
        req: &Request,
    ) -> Response {
        let name = req.cmd.to_ascii_uppercase();
        let Some(route) = self.routes.get(&name) else {
            debug!("Unknown command: {}", req.cmd);
            return Response::error(ErrorCode::UnknownCmd, "unknown cmd");
        };

        if let Err(resp) = check_permission(&name, session.level, route.required) {
            debug!("Rejected {} at level {}", name, session.level);
            return resp;
        }

        let mut resp = Response::default();
        route.handler.handle(ctx, session, req, &mut resp).await;
        resp
    }

    /// Bytes in, bytes out. Always yields an encoded response.
    pub async fn handle(
        &self,
        ctx: &ServerContext,
        session: &mut Session,
        payload: &[u8],
    ) -> Vec<u8> {
        let resp = match decode_request(payload) {
            Ok(req) => self.dispatch(ctx, session, &req).await,
            Err(e) => {
                debug!("Malformed request: {}", e);
                Response::error(e.code(), "bad request")
            }
        };

        match encode_response(&resp) {
            Ok(text) => text.into_bytes(),
            Err(e) => {
                error!("Failed to encode response: {}", e);
                let fallback = Response::error(ErrorCode::InternalError, "response too large");
                encode_response(&fallback).map(String::into_bytes).unwrap_or_default()
            }
        }
    }
}

fn check_permission(name: &str, current: Level, required: Level) -> Result<(), Response> {
    if current >= required {
        return Ok(());
    }
    if current == Level::Guest {
        let msg = if name == "LOGIN_HIGH" { "need low login" } else { "not login" };
        return Err(Response::error(ErrorCode::NotLogin, msg));
    }
    Err(Response::error(ErrorCode::NoPermission, "no permission"))
}
