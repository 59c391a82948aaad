use async_trait::async_trait;
use tokio::process::Command;
use tracing::{error, info, warn};

use super::require_str;
use crate::context::ServerContext;
use crate::protocol::codec::escaped_len;
use crate::protocol::{ErrorCode, Request, Response};
use crate::router::CommandHandler;
use crate::session::Session;

/// Per-stream cap on captured RUN output, measured in serialized bytes
pub const MAX_RUN_OUTPUT: usize = 60 * 1024;

pub struct AdminPing;

#[async_trait]
impl CommandHandler for AdminPing {
    async fn handle(
        &self,
        _ctx: &ServerContext,
        _session: &mut Session,
        _req: &Request,
        resp: &mut Response,
    ) {
        resp.succeed("admin_pong");
    }
}

pub struct Run;

fn shell(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

/// Lossy text whose escaped wire form stays within `MAX_RUN_OUTPUT` bytes.
fn capture(bytes: &[u8]) -> (String, bool) {
    let text = String::from_utf8_lossy(bytes);
    let mut escaped = 0;
    for (at, c) in text.char_indices() {
        escaped += escaped_len(c);
        if escaped > MAX_RUN_OUTPUT {
            return (text[..at].to_string(), true);
        }
    }
    (text.into_owned(), false)
}

#[async_trait]
impl CommandHandler for Run {
    async fn handle(
        &self,
        ctx: &ServerContext,
        session: &mut Session,
        req: &Request,
        resp: &mut Response,
    ) {
        let Some(command) = require_str(req, "command", resp) else {
            return;
        };
        if !ctx.config.allow_remote_exec {
            warn!("RUN refused for {}: remote exec disabled", session.username);
            resp.fail(ErrorCode::NoPermission, "remote exec disabled");
            return;
        }

        info!("RUN by {}: {}", session.username, command);
        let output = match shell(command).kill_on_drop(true).output().await {
            Ok(output) => output,
            Err(e) => {
                error!("RUN failed to start: {}", e);
                resp.fail(ErrorCode::InternalError, "run failed");
                return;
            }
        };

        let (stdout, stdout_cut) = capture(&output.stdout);
        let (stderr, stderr_cut) = capture(&output.stderr);
        resp.set("exit_code", i64::from(output.status.code().unwrap_or(-1)));
        resp.set("stdout", stdout);
        resp.set("stderr", stderr);
        resp.set("truncated", stdout_cut || stderr_cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::protocol::codec::serialize;
    use crate::protocol::envelope::{decode_response, encode_response};
    use crate::protocol::{Value, MAX_JSON_SIZE};

    #[test]
    fn capture_truncates_on_char_boundary() {
        let (text, cut) = capture(b"hello");
        assert_eq!(text, "hello");
        assert!(!cut);

        let long = "é".repeat(MAX_RUN_OUTPUT);
        let (text, cut) = capture(long.as_bytes());
        assert!(cut);
        assert!(text.len() <= MAX_RUN_OUTPUT);
        assert!(text.chars().all(|c| c == 'é'));
    }

    #[test]
    fn capture_budget_counts_escapes() {
        let raw = vec![0x01u8; MAX_RUN_OUTPUT];
        let (text, cut) = capture(&raw);
        assert!(cut);
        assert_eq!(text.len(), MAX_RUN_OUTPUT / 6);
        let wire = serialize(&Value::from(text.as_str()));
        assert!(wire.len() <= MAX_RUN_OUTPUT + 2);

        let (text, cut) = capture(b"\x1b[31mred\x1b[0m\n");
        assert!(!cut);
        assert_eq!(text, "\u{1b}[31mred\u{1b}[0m\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_output_with_control_bytes_fits_one_response() {
        let mut config = ServerConfig::default();
        config.allow_remote_exec = true;
        let ctx = ServerContext::new(config);
        let mut session = Session::new();
        let mut resp = Response::default();
        let zeros = "head -c 200000 /dev/zero; head -c 200000 /dev/zero >&2";
        let req = Request::new("RUN").arg("command", zeros);
        Run.handle(&ctx, &mut session, &req, &mut resp).await;
        assert!(resp.ok);
        assert_eq!(resp.data.get_bool("truncated"), Some(true));
        let wire = encode_response(&resp).unwrap();
        assert!(wire.len() <= MAX_JSON_SIZE);
        let back = decode_response(wire.as_bytes()).unwrap();
        assert_eq!(back.data.get_str("stdout").map(str::len), Some(MAX_RUN_OUTPUT / 6));
    }

    #[tokio::test]
    async fn run_is_disabled_by_default() {
        let ctx = ServerContext::new(ServerConfig::default());
        let mut session = Session::new();
        let mut resp = Response::default();
        let req = Request::new("RUN").arg("command", "echo hi");
        Run.handle(&ctx, &mut session, &req, &mut resp).await;
        assert_eq!(resp.code, ErrorCode::NoPermission);
        assert_eq!(resp.msg, "remote exec disabled");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_captures_output() {
        let mut config = ServerConfig::default();
        config.allow_remote_exec = true;
        let ctx = ServerContext::new(config);
        let mut session = Session::new();
        let mut resp = Response::default();
        let req = Request::new("RUN").arg("command", "echo hi; exit 3");
        Run.handle(&ctx, &mut session, &req, &mut resp).await;
        assert!(resp.ok);
        assert_eq!(resp.data.get_str("stdout"), Some("hi\n"));
        assert_eq!(resp.data.get_i64("exit_code"), Some(3));
        assert_eq!(resp.data.get_bool("truncated"), Some(false));
    }
}
