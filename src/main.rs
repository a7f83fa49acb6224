#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, CARREL_JWT_KEYS, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    carrel_api::serve(None).await
}
