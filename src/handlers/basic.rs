use async_trait::async_trait;

use super::{require_str, CATALOG};
use crate::context::ServerContext;
use crate::protocol::{Object, Request, Response, Value};
use crate::router::CommandHandler;
use crate::session::{Level, Session};

pub struct Ping;

#[async_trait]
impl CommandHandler for Ping {
    async fn handle(
        &self,
        _ctx: &ServerContext,
        _session: &mut Session,
        _req: &Request,
        resp: &mut Response,
    ) {
        resp.succeed("pong");
    }
}

pub struct Help;

/// Whether HELP should advertise `name` at `level`. Login commands disappear
/// once they no longer apply.
fn visible(name: &str, required: Level, level: Level) -> bool {
    match name {
        "LOGIN_LOW" => level == Level::Guest,
        "LOGIN_HIGH" => level == Level::Low,
        _ => level >= required,
    }
}

#[async_trait]
impl CommandHandler for Help {
    async fn handle(
        &self,
        _ctx: &ServerContext,
        session: &mut Session,
        _req: &Request,
        resp: &mut Response,
    ) {
        let commands: Vec<Value> = CATALOG
            .iter()
            .filter(|(name, required, _)| visible(name, *required, session.level))
            .map(|(name, _, desc)| {
                Value::Object(Object::new().with("name", *name).with("desc", *desc))
            })
            .collect();
        resp.set("commands", commands);
    }
}

pub struct Echo;

#[async_trait]
impl CommandHandler for Echo {
    async fn handle(
        &self,
        _ctx: &ServerContext,
        _session: &mut Session,
        req: &Request,
        resp: &mut Response,
    ) {
        let Some(text) = require_str(req, "text", resp) else {
            return;
        };
        resp.set("echo", text);
    }
}

pub struct WhoAmI;

#[async_trait]
impl CommandHandler for WhoAmI {
    async fn handle(
        &self,
        _ctx: &ServerContext,
        session: &mut Session,
        _req: &Request,
        resp: &mut Response,
    ) {
        resp.set("level", session.level.as_str());
        resp.set("username", session.username.as_str());
    }
}

pub struct Time;

#[async_trait]
impl CommandHandler for Time {
    async fn handle(
        &self,
        _ctx: &ServerContext,
        _session: &mut Session,
        _req: &Request,
        resp: &mut Response,
    ) {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        resp.set("time", now);
    }
}
