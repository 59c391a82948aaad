//! Command handlers and the catalog they are registered from.

pub mod admin;
pub mod auth;
pub mod basic;
pub mod transfer;

use crate::protocol::{ErrorCode, Request, Response};
use crate::router::{CommandHandler, Router};
use crate::session::Level;

/// Name, minimum level and HELP description of every server command.
pub const CATALOG: &[(&str, Level, &str)] = &[
    ("PING", Level::Guest, "Ping server"),
    ("HELP", Level::Guest, "Show commands available for your level"),
    ("ECHO", Level::Guest, "Echo text back"),
    ("LOGIN_LOW", Level::Guest, "Login as low user"),
    ("WHOAMI", Level::Low, "Show current login level"),
    ("TIME", Level::Low, "Show server time"),
    ("LOGIN_HIGH", Level::Low, "Login as high user"),
    ("LOGOUT", Level::Low, "Logout one level"),
    ("LIST_FILES", Level::High, "List files on server"),
    ("UPLOAD_INIT", Level::High, "Start an upload"),
    ("UPLOAD_CHUNK", Level::High, "Send one upload chunk"),
    ("UPLOAD_FINISH", Level::High, "Commit the upload"),
    ("UPLOAD_ABORT", Level::High, "Abandon the upload"),
    ("DOWNLOAD_INIT", Level::High, "Start a download"),
    ("DOWNLOAD_CHUNK", Level::High, "Fetch one download chunk"),
    ("DOWNLOAD_ABORT", Level::High, "Abandon the download"),
    ("ADMIN_PING", Level::High, "High-level ping"),
    ("RUN", Level::High, "Run shell command on server"),
];

fn handler_for(name: &str) -> Option<Box<dyn CommandHandler>> {
    let handler: Box<dyn CommandHandler> = match name {
        "PING" => Box::new(basic::Ping),
        "HELP" => Box::new(basic::Help),
        "ECHO" => Box::new(basic::Echo),
        "WHOAMI" => Box::new(basic::WhoAmI),
        "TIME" => Box::new(basic::Time),
        "LOGIN_LOW" => Box::new(auth::LoginLow),
        "LOGIN_HIGH" => Box::new(auth::LoginHigh),
        "LOGOUT" => Box::new(auth::Logout),
        "LIST_FILES" => Box::new(transfer::ListFiles),
        "UPLOAD_INIT" => Box::new(transfer::UploadInit),
        "UPLOAD_CHUNK" => Box::new(transfer::UploadChunk),
        "UPLOAD_FINISH" => Box::new(transfer::UploadFinish),
        "UPLOAD_ABORT" => Box::new(transfer::UploadAbort),
        "DOWNLOAD_INIT" => Box::new(transfer::DownloadInit),
        "DOWNLOAD_CHUNK" => Box::new(transfer::DownloadChunk),
        "DOWNLOAD_ABORT" => Box::new(transfer::DownloadAbort),
        "ADMIN_PING" => Box::new(admin::AdminPing),
        "RUN" => Box::new(admin::Run),
        _ => return None,
    };
    Some(handler)
}

pub fn register_all(router: &mut Router) {
    for (name, level, _) in CATALOG {
        if let Some(handler) = handler_for(name) {
            router.register(name, *level, handler);
        }
    }
}

/// Router with every catalog command registered.
pub fn build_router() -> Router {
    let mut router = Router::new();
    register_all(&mut router);
    router
}

/// Fetch a required string argument, failing the response when absent.
pub(crate) fn require_str<'a>(req: &'a Request, key: &str, resp: &mut Response) -> Option<&'a str> {
    let value = req.args.get_str(key);
    if value.is_none() {
        resp.fail(ErrorCode::BadRequest, format!("args.{} required", key));
    }
    value
}
