//! Minimal waymark demo: a few mounted middleware in front of one endpoint.
//!
//! Run with:
//!   RUST_LOG=trace cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/hello?name=alice
//!   curl -i http://localhost:3000/assets/logo.svg
//!   curl -i http://localhost:3000/admin/users
//!   curl -i -H 'authorization: Bearer x' http://localhost:3000/admin/users
//!   curl -i http://localhost:3000/slow/report

use std::time::Duration;

use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};
use waymark::{HttpNext, HttpRequest, Mount, Response};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let app = Mount::new(endpoint)
        .any(security_headers)
        .at("/assets", assets)
        .at("/admin", require_auth)
        .at("/slow", slow);

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    info!(addr = %listener.local_addr()?, "waymark demo listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let app = app.clone();

        tokio::spawn(async move {
            if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(stream), app)
                .await
            {
                error!(%peer, "connection error: {e}");
            }
        });
    }
}

// Every path.
fn security_headers(mut next: HttpNext) {
    let res = next.response_mut();
    res.set_header("x-content-type-options", "nosniff");
    res.set_header("x-frame-options", "DENY");
    next.proceed();
}

// Mounted at /assets. Sees `/logo.svg` for `/assets/logo.svg`, and answers
// itself. Nothing after it runs.
fn assets(mut next: HttpNext) {
    let file = next.request().path().to_owned();
    let res = next.response_mut();
    res.set_header("content-type", "text/plain; charset=utf-8");
    res.end(format!("pretend this is {file}\n"));
}

// Mounted at /admin. Fails the chain without credentials; the mount
// turns into a 500.
fn require_auth(next: HttpNext) {
    if next.request().header("authorization").is_some() {
        next.proceed();
    } else {
        next.fail("missing authorization header");
    }
}

// Mounted at /slow. Resumes the chain from a spawned task.
fn slow(next: HttpNext) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        next.proceed();
    });
}

async fn endpoint(req: HttpRequest) -> Response {
    let name = req
        .query()
        .and_then(|q| q.split('&').find_map(|kv| kv.strip_prefix("name=")))
        .unwrap_or("world");
    Response::text(format!("hello, {name} ({} {})\n", req.method(), req.path()))
}
