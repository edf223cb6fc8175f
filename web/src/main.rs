mod api;
mod memory_store;
mod state;
mod web_error;

use std::sync::{Arc, Weak};

use actix_web::{middleware, web, App, HttpServer};
use common::config::{self, ReplicaConfig};
use connection::{MutationObserverFactory, ReplicatedConnection, ServiceObserverFactory};
use relay_log::ReplicationService;

use crate::api::admin::replace_state;
use crate::api::price::get_price;
use crate::api::recover::{get_recover_state, post_recover};
use crate::memory_store::InMemoryObjectStore;
use crate::state::{AppState, REMOTE_DIR};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    common::log::init(common::log::LogOptions::default());

    let config_path = std::env::var("REPLICA_CONFIG_PATH").unwrap_or_else(|_| "replica.toml".to_string());
    let config = config::read_config(&config_path).unwrap_or_else(|_| {
        let default_config = ReplicaConfig::new(
            std::path::PathBuf::from("replica.sqlite3"),
            "URI:DIR2:unconfigured".to_string(),
        );
        config::setup(&config_path, default_config.clone()).ok();
        default_config
    });
    let sqlite = rusqlite::Connection::open(&config.db_path)
        .unwrap_or_else(|e| panic!("failed to open {}: {e}", config.db_path.display()));

    let mut replicated = ReplicatedConnection::open(sqlite, false);
    let shared_conn = replicated.shared_handle();

    let store = Arc::new(InMemoryObjectStore::new());
    let service = Arc::new(
        ReplicationService::new(shared_conn.clone(), Arc::clone(&store), REMOTE_DIR, config.threshold())
            .await
            .expect("failed to initialise replication service"),
    );

    let factory = Arc::new(ServiceObserverFactory::new(Arc::clone(&service)));
    replicated.add_mutation_observer(Arc::downgrade(&factory) as Weak<dyn MutationObserverFactory>);
    replicated.enable_replication();

    tokio::spawn(Arc::clone(&service).run());

    let app_state = web::Data::new(AppState {
        conn: shared_conn,
        recoverer: Arc::new(recover::Recoverer::new()),
        store,
        service,
    });

    tracing::info!("starting HTTP server at http://127.0.0.1:8080");

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .service(post_recover)
            .service(get_recover_state)
            .service(replace_state)
            .service(get_price)
            .wrap(middleware::Logger::default())
    })
    .workers(2)
    .bind(("127.0.0.1", 8080))?
    .run()
    .await
}
