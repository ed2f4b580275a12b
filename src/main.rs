use std::net::SocketAddr;

use clap::Parser;
use helpnear::cli::{
    Args, build_config, build_geo_chain, init_logging, load_secrets, open_database,
    validate_frontend_url,
};
use helpnear::create_app;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(secrets) = load_secrets(&args) else {
        std::process::exit(1);
    };

    let Some(frontend_url) = validate_frontend_url(&args.frontend_url, args.production) else {
        std::process::exit(1);
    };

    let Some(geo) = build_geo_chain(&args) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = match listener.local_addr() {
        Ok(local_addr) => local_addr,
        Err(e) => {
            error!(error = %e, "Failed to get local address");
            std::process::exit(1);
        }
    };

    let config = build_config(&args, db, secrets, frontend_url, geo);
    let app = create_app(&config);

    info!(
        address = %local_addr,
        production = config.production,
        trust_proxy_hops = config.trust_proxy_hops,
        "Listening"
    );

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
