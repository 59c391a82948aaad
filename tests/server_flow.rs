use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use remoted::config::{OverwritePolicy, ServerConfig};
use remoted::protocol::{ErrorCode, Request, Response};
use remoted::{server, Client, ServerContext};

struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
    storage: TempDir,
    config: ServerConfig,
}

impl TestServer {
    async fn start_with(configure: impl FnOnce(&mut ServerConfig)) -> Self {
        let storage = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.storage_dir = storage.path().to_path_buf();
        configure(&mut config);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server::serve(
            listener,
            ServerContext::new(config.clone()),
            shutdown.clone(),
        ));
        Self { addr, shutdown, handle, storage, config }
    }

    async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    fn dir(&self) -> &Path {
        self.storage.path()
    }

    async fn guest(&self) -> Client {
        Client::connect(self.addr).await.unwrap()
    }

    async fn admin(&self) -> Client {
        let mut client = self.guest().await;
        client.login_low("user", "1234").await.unwrap();
        let key = self.config.key_bytes().unwrap();
        client.login_high("admin", "admin123", &key).await.unwrap();
        client
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

async fn call(client: &mut Client, req: Request) -> Response {
    client.call(&req).await.unwrap()
}

async fn upload_init(client: &mut Client, name: &str, size: i64, chunk: i64) -> Response {
    call(
        client,
        Request::new("UPLOAD_INIT")
            .arg("filename", name)
            .arg("file_size", size)
            .arg("chunk_size", chunk),
    )
    .await
}

async fn upload_chunk(client: &mut Client, id: &str, index: i64, data: &[u8]) -> Response {
    call(
        client,
        Request::new("UPLOAD_CHUNK")
            .arg("upload_id", id)
            .arg("chunk_index", index)
            .arg("data_b64", STANDARD.encode(data)),
    )
    .await
}

fn upload_id(resp: &Response) -> String {
    assert!(resp.ok, "{:?}", resp);
    resp.data.get_str("upload_id").unwrap().to_string()
}

#[tokio::test]
async fn privilege_levels_gate_commands() {
    let server = TestServer::start().await;
    let mut client = server.guest().await;

    let resp = call(&mut client, Request::new("PING")).await;
    assert_eq!(resp.msg, "pong");

    let resp = call(&mut client, Request::new("LIST_FILES")).await;
    assert_eq!(resp.code, ErrorCode::NotLogin);
    let resp = call(&mut client, Request::new("WHOAMI")).await;
    assert_eq!(resp.code, ErrorCode::NotLogin);

    let resp = client.login_low("user", "1234").await.unwrap();
    assert_eq!(resp.data.get_str("level"), Some("LOW"));

    let resp = call(&mut client, Request::new("LIST_FILES")).await;
    assert_eq!(resp.code, ErrorCode::NoPermission);
    let resp = call(&mut client, Request::new("whoami")).await;
    assert_eq!(resp.data.get_str("username"), Some("user"));

    let resp = call(&mut client, Request::new("ADMIN_PING")).await;
    assert_eq!(resp.code, ErrorCode::NoPermission);

    let key = server.config.key_bytes().unwrap();
    client.login_high("admin", "admin123", &key).await.unwrap();
    let resp = call(&mut client, Request::new("ADMIN_PING")).await;
    assert_eq!(resp.msg, "admin_pong");

    let resp = call(&mut client, Request::new("NOT_A_COMMAND")).await;
    assert_eq!(resp.code, ErrorCode::UnknownCmd);

    server.stop().await;
}

#[tokio::test]
async fn wrong_admin_passphrase_is_rejected() {
    let server = TestServer::start().await;
    let mut client = server.guest().await;
    client.login_low("user", "1234").await.unwrap();
    let key = server.config.key_bytes().unwrap();
    assert!(client.login_high("admin", "admin124", &key).await.is_err());

    let resp = call(&mut client, Request::new("WHOAMI")).await;
    assert_eq!(resp.data.get_str("level"), Some("LOW"));
    server.stop().await;
}

#[tokio::test]
async fn upload_in_three_chunks_then_download() {
    let server = TestServer::start().await;
    let mut client = server.admin().await;
    let payload = b"0123456789";

    let resp = upload_init(&mut client, "ten.bin", 10, 4).await;
    assert_eq!(resp.data.get_i64("chunk_size"), Some(4));
    assert_eq!(resp.data.get_i64("next_index"), Some(0));
    let id = upload_id(&resp);

    for (index, piece) in payload.chunks(4).enumerate() {
        let resp = upload_chunk(&mut client, &id, index as i64, piece).await;
        assert!(resp.ok, "{:?}", resp);
        assert_eq!(resp.data.get_i64("next_index"), Some(index as i64 + 1));
    }

    let resp = call(&mut client, Request::new("UPLOAD_FINISH").arg("upload_id", id.as_str())).await;
    assert_eq!(resp.msg, "upload_finish_ok");
    assert_eq!(resp.data.get_i64("size"), Some(10));
    assert_eq!(std::fs::read(server.dir().join("ten.bin")).unwrap(), payload);
    assert!(!server.dir().join("ten.bin.part").exists());

    let resp = call(
        &mut client,
        Request::new("DOWNLOAD_INIT").arg("filename", "ten.bin").arg("chunk_size", 4i64),
    )
    .await;
    assert_eq!(resp.data.get_i64("file_size"), Some(10));
    let download_id = resp.data.get_str("download_id").unwrap().to_string();

    let mut received = Vec::new();
    for index in 0..3i64 {
        let resp = call(
            &mut client,
            Request::new("DOWNLOAD_CHUNK")
                .arg("download_id", download_id.as_str())
                .arg("chunk_index", index),
        )
        .await;
        assert!(resp.ok, "{:?}", resp);
        received.extend(STANDARD.decode(resp.data.get_str("data_b64").unwrap()).unwrap());
        assert_eq!(resp.data.get_bool("is_last"), Some(index == 2));
    }
    assert_eq!(received, payload);

    let resp = call(&mut client, Request::new("DOWNLOAD_ABORT")).await;
    assert_eq!(resp.code, ErrorCode::TransferStateError);

    server.stop().await;
}

async fn download_chunk(client: &mut Client, id: &str, index: i64) -> Response {
    call(
        client,
        Request::new("DOWNLOAD_CHUNK")
            .arg("download_id", id)
            .arg("chunk_index", index),
    )
    .await
}

#[tokio::test]
async fn empty_file_downloads_as_one_final_chunk() {
    let server = TestServer::start().await;
    std::fs::write(server.dir().join("empty.bin"), b"").unwrap();
    let mut client = server.admin().await;

    let req = Request::new("DOWNLOAD_INIT").arg("filename", "empty.bin");
    let resp = call(&mut client, req).await;
    assert!(resp.ok, "{:?}", resp);
    assert_eq!(resp.data.get_i64("file_size"), Some(0));
    let id = resp.data.get_str("download_id").unwrap().to_string();

    let resp = download_chunk(&mut client, &id, 0).await;
    assert!(resp.ok, "{:?}", resp);
    assert_eq!(resp.data.get_i64("chunk_index"), Some(0));
    assert_eq!(resp.data.get_str("data_b64"), Some(""));
    assert_eq!(resp.data.get_bool("is_last"), Some(true));

    let resp = call(&mut client, Request::new("DOWNLOAD_ABORT")).await;
    assert_eq!(resp.code, ErrorCode::TransferStateError);

    let target = tempfile::tempdir().unwrap();
    let local = target.path().join("empty.copy");
    let size = client.download_file("empty.bin", &local, 1024).await.unwrap();
    assert_eq!(size, 0);
    assert_eq!(std::fs::read(&local).unwrap(), b"");

    server.stop().await;
}

#[tokio::test]
async fn download_chunk_index_must_follow_order() {
    let server = TestServer::start().await;
    std::fs::write(server.dir().join("ten.bin"), b"0123456789").unwrap();
    let mut client = server.admin().await;

    let req = Request::new("DOWNLOAD_INIT")
        .arg("filename", "ten.bin")
        .arg("chunk_size", 4i64);
    let resp = call(&mut client, req).await;
    let id = resp.data.get_str("download_id").unwrap().to_string();

    let resp = download_chunk(&mut client, &id, 1).await;
    assert_eq!(resp.code, ErrorCode::TransferStateError);
    assert_eq!(resp.msg, "chunk_index mismatch");
    assert_eq!(resp.data.get_i64("expected_index"), Some(0));

    let resp = download_chunk(&mut client, &id, 0).await;
    assert!(resp.ok, "{:?}", resp);
    assert_eq!(resp.data.get_i64("chunk_index"), Some(0));
    assert_eq!(resp.data.get_str("data_b64"), Some(STANDARD.encode(b"0123").as_str()));
    assert_eq!(resp.data.get_bool("is_last"), Some(false));

    let resp = download_chunk(&mut client, "D0_nope", 1).await;
    assert_eq!(resp.msg, "download_id mismatch");
    let resp = download_chunk(&mut client, &id, 0).await;
    assert_eq!(resp.data.get_i64("expected_index"), Some(1));

    server.stop().await;
}

#[tokio::test]
async fn concurrent_uploads_do_not_share_temp_files() {
    let server = TestServer::start().await;
    let mut first = server.admin().await;
    let mut second = server.admin().await;

    let resp = upload_init(&mut first, "x.bin", 8, 4).await;
    assert_eq!(resp.data.get_str("filename"), Some("x.bin"));
    let first_id = upload_id(&resp);
    assert!(upload_chunk(&mut first, &first_id, 0, b"abcd").await.ok);

    let resp = upload_init(&mut second, "x.bin", 8, 4).await;
    assert_eq!(resp.data.get_str("filename"), Some("x_1.bin"));
    let second_id = upload_id(&resp);
    assert!(upload_chunk(&mut second, &second_id, 0, b"WXYZ").await.ok);

    assert!(upload_chunk(&mut first, &first_id, 1, b"efgh").await.ok);
    let req = Request::new("UPLOAD_FINISH").arg("upload_id", first_id.as_str());
    let resp = call(&mut first, req).await;
    assert!(resp.ok, "{:?}", resp);
    assert_eq!(std::fs::read(server.dir().join("x.bin")).unwrap(), b"abcdefgh");
    assert!(server.dir().join("x_1.bin.part").exists());
    server.stop().await;

    let server = TestServer::start_with(|c| c.overwrite = OverwritePolicy::Overwrite).await;
    let mut first = server.admin().await;
    let mut second = server.admin().await;
    let first_id = upload_id(&upload_init(&mut first, "x.bin", 4, 4).await);
    assert!(upload_chunk(&mut first, &first_id, 0, b"abcd").await.ok);

    let resp = upload_init(&mut second, "x.bin", 4, 4).await;
    assert_eq!(resp.code, ErrorCode::TransferStateError);
    assert_eq!(resp.msg, "upload in progress for filename");

    let req = Request::new("UPLOAD_FINISH").arg("upload_id", first_id.as_str());
    assert!(call(&mut first, req).await.ok);
    assert_eq!(std::fs::read(server.dir().join("x.bin")).unwrap(), b"abcd");
    server.stop().await;
}

#[tokio::test]
async fn out_of_order_chunk_leaves_state_untouched() {
    let server = TestServer::start().await;
    let mut client = server.admin().await;

    let id = upload_id(&upload_init(&mut client, "o.bin", 8, 4).await);

    let resp = upload_chunk(&mut client, &id, 1, b"abcd").await;
    assert_eq!(resp.code, ErrorCode::TransferStateError);
    assert_eq!(resp.data.get_i64("expected_index"), Some(0));

    let resp = upload_chunk(&mut client, &id, 0, b"abcd").await;
    assert!(resp.ok);
    assert_eq!(resp.data.get_i64("received"), Some(4));

    let resp = upload_chunk(&mut client, "U0_nope", 1, b"efgh").await;
    assert_eq!(resp.code, ErrorCode::TransferStateError);
    assert_eq!(resp.msg, "upload_id mismatch");

    server.stop().await;
}

#[tokio::test]
async fn short_upload_fails_at_finish_and_cleans_up() {
    let server = TestServer::start().await;
    let mut client = server.admin().await;

    let id = upload_id(&upload_init(&mut client, "short.bin", 10, 4).await);
    assert!(upload_chunk(&mut client, &id, 0, b"abcd").await.ok);

    let resp = call(&mut client, Request::new("UPLOAD_FINISH").arg("upload_id", id.as_str())).await;
    assert_eq!(resp.code, ErrorCode::SizeMismatch);
    assert!(!server.dir().join("short.bin.part").exists());
    assert!(!server.dir().join("short.bin").exists());

    let resp = upload_chunk(&mut client, &id, 1, b"efgh").await;
    assert_eq!(resp.code, ErrorCode::TransferStateError);
    assert_eq!(resp.msg, "no upload in progress");

    server.stop().await;
}

#[tokio::test]
async fn overflowing_chunk_aborts_upload() {
    let server = TestServer::start().await;
    let mut client = server.admin().await;

    let id = upload_id(&upload_init(&mut client, "over.bin", 3, 4).await);
    let resp = upload_chunk(&mut client, &id, 0, b"abcd").await;
    assert_eq!(resp.code, ErrorCode::SizeMismatch);
    assert_eq!(resp.msg, "size overflow");
    assert!(!server.dir().join("over.bin.part").exists());

    server.stop().await;
}

#[tokio::test]
async fn transfer_state_and_lookup_errors() {
    let server = TestServer::start().await;
    let mut client = server.admin().await;

    let req = Request::new("DOWNLOAD_INIT").arg("filename", "missing.txt");
    let resp = call(&mut client, req).await;
    assert_eq!(resp.code, ErrorCode::FileNotFound);
    assert_eq!(resp.code.code(), 2002);

    let first = upload_init(&mut client, "dup.bin", 4, 4).await;
    let id = upload_id(&first);
    let resp = upload_init(&mut client, "dup.bin", 4, 4).await;
    assert_eq!(resp.code, ErrorCode::TransferStateError);
    assert_eq!(resp.code.code(), 2003);

    let resp = upload_init(&mut client, "../etc/passwd", 4, 4).await;
    assert_eq!(resp.code, ErrorCode::TransferStateError);

    let resp = call(&mut client, Request::new("UPLOAD_ABORT").arg("upload_id", id.as_str())).await;
    assert_eq!(resp.msg, "upload_aborted");
    assert!(!server.dir().join("dup.bin.part").exists());

    let resp = upload_init(&mut client, "../etc/passwd", 4, 4).await;
    assert_eq!(resp.code, ErrorCode::BadRequest);
    let resp = upload_init(&mut client, "zero.bin", 0, 4).await;
    assert_eq!(resp.code, ErrorCode::BadRequest);
    let resp = upload_init(&mut client, "huge.bin", 200 * 1024 * 1024, 4).await;
    assert_eq!(resp.msg, "file too large");

    server.stop().await;
}

#[tokio::test]
async fn existing_destination_follows_overwrite_policy() {
    let server = TestServer::start_with(|c| c.overwrite = OverwritePolicy::Reject).await;
    std::fs::write(server.dir().join("taken.txt"), b"old").unwrap();
    let mut client = server.admin().await;
    let resp = upload_init(&mut client, "taken.txt", 3, 4).await;
    assert_eq!(resp.code, ErrorCode::FileExists);
    server.stop().await;

    let server = TestServer::start().await;
    std::fs::write(server.dir().join("taken.txt"), b"old").unwrap();
    let mut client = server.admin().await;
    let resp = upload_init(&mut client, "taken.txt", 3, 4).await;
    assert_eq!(resp.data.get_str("filename"), Some("taken_1.txt"));
    server.stop().await;

    let server = TestServer::start_with(|c| c.overwrite = OverwritePolicy::Overwrite).await;
    std::fs::write(server.dir().join("taken.txt"), b"old").unwrap();
    let mut client = server.admin().await;
    let id = upload_id(&upload_init(&mut client, "taken.txt", 3, 4).await);
    assert!(upload_chunk(&mut client, &id, 0, b"new").await.ok);
    let resp = call(&mut client, Request::new("UPLOAD_FINISH").arg("upload_id", id.as_str())).await;
    assert!(resp.ok, "{:?}", resp);
    assert_eq!(std::fs::read(server.dir().join("taken.txt")).unwrap(), b"new");
    server.stop().await;
}

#[tokio::test]
async fn client_round_trip_and_listing() {
    let server = TestServer::start().await;
    let local_dir = tempfile::tempdir().unwrap();
    let source = local_dir.path().join("source.dat");
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&source, &payload).unwrap();
    std::fs::write(server.dir().join("leftover.part"), b"x").unwrap();

    let mut client = server.admin().await;
    let summary = client.upload_file(&source, "data.bin", 64 * 1024).await.unwrap();
    assert_eq!(summary.filename, "data.bin");
    assert_eq!(summary.size, payload.len() as u64);

    let files = client.list_files().await.unwrap();
    assert_eq!(files, vec!["data.bin".to_string()]);

    let target = local_dir.path().join("copy.dat");
    let size = client.download_file("data.bin", &target, 50_000).await.unwrap();
    assert_eq!(size, payload.len() as u64);
    assert_eq!(std::fs::read(&target).unwrap(), payload);

    assert!(client.download_file("nope.bin", &local_dir.path().join("nope"), 1024).await.is_err());

    server.stop().await;
}

#[tokio::test]
async fn disconnect_removes_partial_upload() {
    let server = TestServer::start().await;
    let mut client = server.admin().await;
    let id = upload_id(&upload_init(&mut client, "gone.bin", 8, 4).await);
    assert!(upload_chunk(&mut client, &id, 0, b"abcd").await.ok);

    let part = server.dir().join("gone.bin.part");
    assert!(part.exists());
    drop(client);

    for _ in 0..100 {
        if !part.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!part.exists());
    server.stop().await;
}

#[tokio::test]
async fn shutdown_releases_active_sessions() {
    let server = TestServer::start().await;
    let mut client = server.admin().await;
    let id = upload_id(&upload_init(&mut client, "held.bin", 8, 4).await);
    assert!(upload_chunk(&mut client, &id, 0, b"abcd").await.ok);

    let part = server.dir().join("held.bin.part");
    let dir = server.storage.path().to_path_buf();
    let storage = server.storage;
    server.shutdown.cancel();
    server.handle.await.unwrap().unwrap();

    assert!(!part.exists());
    assert!(dir.exists());
    drop(storage);
    drop(client);
}
