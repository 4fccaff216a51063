//! tsgate: multi-tenant gateway in front of a time-series engine.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tsgate_core::GatewayConfig;
use tsgate_server::{build_router, provision_raw_bucket, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--check" | "check" => {
                let code = check().await;
                std::process::exit(code);
            }
            "--help" | "-h" | "help" => {
                println!("tsgate: multi-tenant time-series gateway");
                println!();
                println!("Usage: tsgate [command]");
                println!();
                println!("Commands:");
                println!("  (none)     Start the server");
                println!("  check      Verify engine access and provision the raw bucket");
                println!("  help       Show this help message");
                println!();
                println!("Configuration is read from INFLUXDB_HOST, INFLUXDB_ORGANIZATION,");
                println!("INFLUXDB_TOKEN and the TSGATE_* variables.");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'tsgate help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let config = GatewayConfig::from_env()?;
    let port = config.port;
    info!("Configuration: {:?}", config);

    let engine = tsgate_engine::create_engine(&config)?;
    let state = Arc::new(AppState::new(config, engine));

    if let Err(e) = provision_raw_bucket(&state).await {
        error!("Insufficient permissions, exiting: {}", e);
        std::process::exit(1);
    }

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("tsgate listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// `tsgate check`: ping the engine and provision the raw bucket.
async fn check() -> i32 {
    let config = match GatewayConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            return 1;
        }
    };
    let engine = match tsgate_engine::create_engine(&config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Engine setup failed: {}", e);
            return 1;
        }
    };

    if let Err(e) = engine.ping().await {
        eprintln!("Engine unreachable: {}", e);
        return 1;
    }
    println!("Engine ({}) reachable", engine.name());

    let raw_bucket = config.raw_bucket.clone();
    let state = AppState::new(config, engine);
    match state.buckets.provision(&raw_bucket).await {
        Ok(bucket) => {
            println!("Bucket {} ready (retention {})", bucket.name, bucket.retention);
            0
        }
        Err(e) => {
            eprintln!("Bucket {} not ready: {}", raw_bucket, e);
            1
        }
    }
}
