//! The two-route demo API.
//!
//! ```text
//! cargo run --example hello_api
//! curl http://localhost:3000/
//! curl -X POST -d '{"x":5}' http://localhost:3000/post
//! ```
//!
//! Set `APP_ENV=production` to hide stack traces in error envelopes and
//! `RUST_LOG=jsonroute=debug` to see one log line per response.

use anyhow::Context as _;
use jsonroute::{RequestContext, Responder, Server};
use serde_json::json;
use tracing_subscriber::EnvFilter;

async fn welcome(_ctx: RequestContext, res: Responder) -> anyhow::Result<()> {
    res.respond_json(&json!({ "message": "Welcome to my API" }));
    Ok(())
}

async fn echo(ctx: RequestContext, res: Responder) -> anyhow::Result<()> {
    res.respond_json(&json!({ "message": "Post request received", "data": ctx.body() }));
    Ok(())
}

async fn greet(ctx: RequestContext, res: Responder) -> anyhow::Result<()> {
    let name = ctx
        .query()
        .and_then(|q| q.get_str("name"))
        .context("missing `name` query parameter")?;
    res.respond_json(&json!({
        "status": 200,
        "message": format!("Hello, {name}"),
        "data": { "ip": ctx.ip(), "country": ctx.country() },
    }));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "jsonroute=debug".into()),
        )
        .init();

    let mut server = Server::new();
    server.get("/", welcome).post("/post", echo).get("/greet", greet);

    server
        .listen(3000, "localhost", |addr| {
            println!("Server is running at http://{addr}");
        })
        .await?;
    Ok(())
}
