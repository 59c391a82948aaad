use async_trait::async_trait;
use tracing::{error, info, warn};

use super::require_str;
use crate::context::ServerContext;
use crate::crypto;
use crate::protocol::{ErrorCode, Request, Response};
use crate::router::CommandHandler;
use crate::session::{Level, Session};

fn describe(session: &Session, resp: &mut Response) {
    resp.set("level", session.level.as_str());
    resp.set("username", session.username.as_str());
}

pub struct LoginLow;

#[async_trait]
impl CommandHandler for LoginLow {
    async fn handle(
        &self,
        ctx: &ServerContext,
        session: &mut Session,
        req: &Request,
        resp: &mut Response,
    ) {
        if session.level != Level::Guest {
            resp.fail(ErrorCode::BadRequest, "already logged in");
            return;
        }
        let Some(username) = require_str(req, "username", resp) else {
            return;
        };
        let Some(password) = require_str(req, "password", resp) else {
            return;
        };

        if !ctx.config.check_low_credentials(username, password) {
            warn!("LOGIN_LOW failed for user: {}", username);
            resp.fail(ErrorCode::BadRequest, "auth failed");
            return;
        }

        session.level = Level::Low;
        session.username = username.to_string();
        session.low_username = username.to_string();
        info!("LOGIN_LOW success for user: {}", username);

        resp.succeed("login_low_ok");
        describe(session, resp);
    }
}

pub struct LoginHigh;

#[async_trait]
impl CommandHandler for LoginHigh {
    async fn handle(
        &self,
        ctx: &ServerContext,
        session: &mut Session,
        req: &Request,
        resp: &mut Response,
    ) {
        if session.level == Level::High {
            resp.fail(ErrorCode::BadRequest, "already logged in");
            return;
        }
        let Some(username) = require_str(req, "username", resp) else {
            return;
        };
        let Some(cipher_hex) = require_str(req, "password_cipher_hex", resp) else {
            return;
        };

        let Ok(submitted) = crypto::hex_to_bytes(cipher_hex) else {
            resp.fail(ErrorCode::BadRequest, "invalid password_cipher_hex");
            return;
        };

        let expected = ctx
            .config
            .key_bytes()
            .map_err(|e| e.to_string())
            .and_then(|key| {
                crypto::des_encrypt_ecb_pkcs7(ctx.config.admin_pass_plain.as_bytes(), &key)
                    .map_err(|e| e.to_string())
            });
        let expected = match expected {
            Ok(ct) => ct,
            Err(e) => {
                error!("Cannot compute admin challenge: {}", e);
                resp.fail(ErrorCode::InternalError, "internal error");
                return;
            }
        };

        if submitted != expected {
            warn!(
                "LOGIN_HIGH failed (claimed user: {}, low user: {})",
                username, session.low_username
            );
            resp.fail(ErrorCode::BadRequest, "auth failed");
            return;
        }

        session.level = Level::High;
        session.username = ctx.config.admin_user.clone();
        info!(
            "LOGIN_HIGH success (claimed user: {}, low user: {})",
            username, session.low_username
        );

        resp.succeed("login_high_ok");
        describe(session, resp);
    }
}

pub struct Logout;

#[async_trait]
impl CommandHandler for Logout {
    async fn handle(
        &self,
        _ctx: &ServerContext,
        session: &mut Session,
        _req: &Request,
        resp: &mut Response,
    ) {
        let from = session.level;
        let to = session.logout().await;
        info!("LOGOUT {} -> {}", from, to);
        resp.succeed("logout_ok");
        describe(session, resp);
    }
}
