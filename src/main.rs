use astrols::{create_service, discover_settings, init_logging};
use tower_lsp::Server;

#[tokio::main]
async fn main() {
    let (settings, _) = std::env::current_dir()
        .map(|dir| discover_settings(&dir))
        .unwrap_or_default();
    init_logging(settings.log.level.as_deref());
    tracing::info!("starting astrols {}", env!("CARGO_PKG_VERSION"));

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = create_service();
    Server::new(stdin, stdout, socket).serve(service).await;
}
