use clap::{Parser, Subcommand};
use rand::{rngs::OsRng, RngCore};
use serde_json::json;

use crate::auth::{generate_jwt, Claims};
use crate::codec::MetadataCodec;

#[derive(Parser)]
#[command(name = "carrel")]
#[command(about = "Carrel CLI - operations for the document knowledge service")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the API server")]
    Serve {
        #[arg(long, help = "Port to bind (defaults to CARREL_PORT, then 3000)")]
        port: Option<u16>,
    },

    #[command(about = "Generate fresh server secrets as env assignments")]
    Keygen,

    #[command(about = "Mint a development bearer token against the configured key ring")]
    Token {
        #[arg(help = "Subject (caller identity)")]
        subject: String,
        #[arg(long, default_value = "free", help = "Billing tier claim (free or pro)")]
        tier: String,
        #[arg(long, default_value = "documents:read documents:write")]
        scope: String,
        #[arg(long, default_value = "carrel-dev")]
        issuer: String,
    },

    #[command(about = "Check a running server's health endpoint")]
    Health {
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        url: String,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve { port } => crate::serve(port).await,
        Commands::Keygen => keygen(cli.json),
        Commands::Token {
            subject,
            tier,
            scope,
            issuer,
        } => token(cli.json, subject, tier, scope, issuer),
        Commands::Health { url } => health(cli.json, &url).await,
    }
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

fn keygen(as_json: bool) -> anyhow::Result<()> {
    let tenant_secret = random_hex(32);
    let root_key = MetadataCodec::generate_root_key_hex();
    let jwt_secret = random_hex(32);

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "CARREL_TENANT_SECRET": tenant_secret,
                "CARREL_ROOT_KEY": root_key,
                "CARREL_JWT_KEYS": format!("k1:{}", jwt_secret),
            }))?
        );
    } else {
        println!("CARREL_TENANT_SECRET={}", tenant_secret);
        println!("CARREL_ROOT_KEY={}", root_key);
        println!("CARREL_JWT_KEYS=k1:{}", jwt_secret);
    }
    Ok(())
}

fn token(
    as_json: bool,
    subject: String,
    tier: String,
    scope: String,
    issuer: String,
) -> anyhow::Result<()> {
    let claims = Claims::new(subject, issuer, scope, Some(tier));
    let token = generate_jwt(&claims)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&json!({ "token": token }))?);
    } else {
        println!("{}", token);
    }
    Ok(())
}

async fn health(as_json: bool, base_url: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    let response = reqwest::get(&url).await?;
    let status = response.status();
    let body: serde_json::Value = response.json().await.unwrap_or(json!({}));

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "status": status.as_u16(),
                "body": body,
            }))?
        );
    } else {
        println!("{} {}", status.as_u16(), body);
    }

    if !status.is_success() {
        anyhow::bail!("health check returned {}", status);
    }
    Ok(())
}
