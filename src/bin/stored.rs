use std::sync::Arc;
use celerix_objects::engine::{MemStore, Persistence};
use celerix_objects::server::Router;
use clap::Parser;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(author, version, about = "Celerix Objects key-value daemon", long_about = None)]
struct Args {
    #[arg(short, long, env = "CELERIX_OBJECTS_DATA_DIR", default_value = "data")]
    data_dir: String,

    #[arg(short, long, env = "CELERIX_OBJECTS_PORT", default_value = "7011")]
    port: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let persistence = Arc::new(Persistence::new(&args.data_dir)?);
    let initial_data = persistence.load_all()?;
    let store = Arc::new(MemStore::new(initial_data, Some(persistence)));

    let router = Router::new(store.clone());

    println!("Starting Celerix Objects Daemon...");
    println!("Engine started. Loaded {} keys.", store.len()?);
    println!("Celerix Objects listening on :{} (TCP)", args.port);

    tokio::select! {
        res = router.listen(&args.port) => {
            if let Err(e) = res {
                eprintln!("TCP Server failed: {}", e);
            }
        }
        _ = signal::ctrl_c() => {
            println!("\nShutdown signal received. Finalizing disk writes...");
            store.wait().await;
            println!("Persistence complete. Exiting.");
        }
    }

    Ok(())
}
