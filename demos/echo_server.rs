use std::sync::Arc;
use tcpx::{HandlerError, Request, Server, ServerBuilder};

const ECHO: u32 = 1;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let builder = ServerBuilder::new()
        .with_event_loops(2)
        .with_tcp_keepalive(Some(30))
        .route(ECHO, |req: &Request| -> Result<(), HandlerError> {
            tracing::info!(conn_id = %req.connection_id(), len = req.payload().len(), "echo");
            req.reply(ECHO, req.payload())?;
            Ok(())
        });

    let server = Arc::new(Server::from_builder(builder, "127.0.0.1:9000")?);

    let stopper = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tokio::task::spawn_blocking(move || stopper.stop()).await;
        }
    });

    server.start().await?;
    Ok(())
}
