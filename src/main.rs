use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use remoted::config::{ServerConfig, DEFAULT_CONFIG_FILE, DEFAULT_MAX_CHUNK_BYTES};
use remoted::{crypto, server, Client};

#[derive(Parser)]
#[command(name = "remoted")]
#[command(about = "Remote command server with tiered login and chunked file transfer")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long, global = true, help = "Config file path")]
    config: Option<String>,

    #[arg(long, global = true, help = "Storage directory (overrides config)")]
    storage: Option<PathBuf>,

    #[arg(long, global = true, help = "Listen port (overrides config)")]
    listen_port: Option<u16>,

    #[arg(long, global = true, help = "Output as JSON")]
    json: bool,

    #[arg(long, global = true, help = "Log filter, e.g. remoted=debug")]
    log: Option<String>,

    #[arg(long, global = true, help = "Server address for client commands")]
    host: Option<String>,

    #[arg(long, global = true, default_value = "user", help = "Low-level username")]
    user: String,

    #[arg(long, global = true, default_value = "1234", help = "Low-level password")]
    password: String,

    #[arg(long, global = true, help = "Admin passphrase (defaults to config)")]
    admin_password: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the server (default)
    Serve,
    GenerateConfig {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE, help = "Config file path")]
        output: String,
    },
    /// Print the LOGIN_HIGH challenge for a passphrase under the configured key
    Cipher { plain: String },
    Ping,
    List,
    Upload {
        local: PathBuf,
        remote: Option<String>,
    },
    Download {
        remote: String,
        local: PathBuf,
    },
}

fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("remoted=info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Connect and climb to HIGH with the CLI credentials.
async fn connect_high(cli: &Cli, config: &ServerConfig) -> anyhow::Result<Client> {
    let host = cli
        .host
        .clone()
        .unwrap_or_else(|| format!("127.0.0.1:{}", config.port));
    let mut client = Client::connect(host.as_str())
        .await
        .with_context(|| format!("cannot reach {}", host))?;

    client.login_low(&cli.user, &cli.password).await?;
    let passphrase = cli
        .admin_password
        .clone()
        .unwrap_or_else(|| config.admin_pass_plain.clone());
    client
        .login_high(&config.admin_user, &passphrase, &config.key_bytes()?)
        .await?;
    Ok(client)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log.as_deref());

    if let Some(Commands::GenerateConfig { output }) = &cli.command {
        ServerConfig::default().save(output)?;
        if cli.json {
            println!("{}", serde_json::json!({
                "success": true,
                "config_file": output,
                "message": "Default configuration file created"
            }));
        } else {
            println!("⚙️  Generate Configuration");
            println!("========================");
            println!("✅ Default configuration written to {}", output);
        }
        return Ok(());
    }

    let mut config = ServerConfig::load_or_create(cli.config.as_deref())?;
    if let Some(storage) = &cli.storage {
        config.storage_dir = storage.clone();
    }
    if let Some(port) = cli.listen_port {
        config.port = port;
    }
    config.validate()?;

    match &cli.command {
        None | Some(Commands::Serve) => {
            info!("Starting remoted on {}:{}", config.bind_ip, config.port);
            let shutdown = CancellationToken::new();
            let token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received");
                    token.cancel();
                }
            });
            server::run(config, shutdown).await
        }
        Some(Commands::GenerateConfig { .. }) => Ok(()),
        Some(Commands::Cipher { plain }) => {
            let cipher = crypto::des_encrypt_hex(plain.as_bytes(), &config.key_bytes()?)?;
            if cli.json {
                println!("{}", serde_json::json!({ "password_cipher_hex": cipher }));
            } else {
                println!("{}", cipher);
            }
            Ok(())
        }
        Some(Commands::Ping) => {
            let host = cli
                .host
                .clone()
                .unwrap_or_else(|| format!("127.0.0.1:{}", config.port));
            let mut client = Client::connect(host.as_str()).await?;
            let resp = client.call(&remoted::protocol::Request::new("PING")).await?;
            if cli.json {
                println!("{}", serde_json::json!({
                    "ok": resp.ok,
                    "code": resp.code.code(),
                    "msg": resp.msg
                }));
            } else if resp.ok {
                println!("✅ {} says {}", host, resp.msg);
            } else {
                println!("❌ {} ({})", resp.msg, resp.code);
            }
            Ok(())
        }
        Some(Commands::List) => {
            let mut client = connect_high(&cli, &config).await?;
            let files = client.list_files().await?;
            if cli.json {
                println!("{}", serde_json::json!({ "files": files, "count": files.len() }));
            } else {
                println!("📋 Remote Files");
                println!("==============");
                if files.is_empty() {
                    println!("   No files found");
                }
                for file in &files {
                    println!("   {}", file);
                }
            }
            Ok(())
        }
        Some(Commands::Upload { local, remote }) => {
            let remote = match remote {
                Some(name) => name.clone(),
                None => local
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .context("local path has no usable file name")?,
            };
            let mut client = connect_high(&cli, &config).await?;
            let summary = client.upload_file(local, &remote, DEFAULT_MAX_CHUNK_BYTES).await?;
            if cli.json {
                println!("{}", serde_json::json!({
                    "filename": summary.filename,
                    "size": summary.size
                }));
            } else {
                println!("✅ Uploaded {} bytes as {}", summary.size, summary.filename);
            }
            Ok(())
        }
        Some(Commands::Download { remote, local }) => {
            let mut client = connect_high(&cli, &config).await?;
            let size = client.download_file(remote, local, DEFAULT_MAX_CHUNK_BYTES).await?;
            if cli.json {
                println!("{}", serde_json::json!({
                    "filename": remote,
                    "size": size,
                    "local": local
                }));
            } else {
                println!("✅ Downloaded {} ({} bytes) to {}", remote, size, local.display());
            }
            Ok(())
        }
    }
}
