use bank_connectors::{BankConnectorFactory, ExampleBankConnector, ExampleBankEndpoints};
use dotenv::dotenv;
use g2p_bridge::{api, config::BridgeEnv, db, fa::FaDeconstructor, mapper::MapperClient, workers};
use log::info;
use log4rs::config::RawConfig;
use std::{path::Path, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    dotenv().ok();
    let env = BridgeEnv::load()?;

    info!("Starting G2P Disbursement Bridge...");

    let db_pool = db::init_db(&env.database_url).await?;
    info!("Database initialized.");

    let timeout = Duration::from_secs(env.http_timeout_secs);

    let example_bank = ExampleBankConnector::new(
        &ExampleBankEndpoints {
            check_funds_url: env.bank_check_funds_url.clone(),
            block_funds_url: env.bank_block_funds_url.clone(),
            initiate_payment_url: env.bank_initiate_payment_url.clone(),
        },
        timeout,
    )?;
    let connectors = Arc::new(BankConnectorFactory::new().register(&env.example_bank_code, Arc::new(example_bank)));

    let mapper = Arc::new(MapperClient::new(&env.mapper_resolve_api_url, timeout)?);
    let fa = Arc::new(FaDeconstructor::from_env(&env)?);

    // Spawn the stage pipeline
    tokio::spawn(workers::funds_checker::run(
        db_pool.clone(),
        connectors.clone(),
        env.funds_available_check_attempts,
        env.funds_check_sleep_secs,
    ));
    tokio::spawn(workers::funds_blocker::run(
        db_pool.clone(),
        connectors.clone(),
        env.funds_blocked_attempts,
        env.funds_block_sleep_secs,
    ));
    tokio::spawn(workers::mapper_resolver::run(
        db_pool.clone(),
        mapper,
        fa,
        env.mapper_resolve_attempts,
        env.mapper_resolution_sleep_secs,
    ));
    tokio::spawn(workers::payment_dispatcher::run(
        db_pool.clone(),
        connectors.clone(),
        env.funds_disbursement_attempts,
        env.payment_dispatch_sleep_secs,
    ));
    tokio::spawn(workers::statement_processor::run(
        db_pool.clone(),
        connectors.clone(),
        env.statement_process_attempts,
        env.statement_process_sleep_secs,
    ));
    info!("G2P Disbursement Bridge started. Press Ctrl+C to shut down.");

    // Create Axum API router
    let app = api::create_router(db_pool.clone());
    let addr = format!("{}:{}", env.listen_ip, env.listen_port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Axum API server listening on {}", addr);
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down.");

    Ok(())
}

fn init_logging() {
    let config_path = "log4rs.yml";
    let path = Path::new(config_path);

    if path.exists() {
        match log4rs::init_file(path, Default::default()) {
            Ok(_) => {
                info!("Logging initialized from external configuration: {}", config_path);
                return;
            },
            Err(e) => {
                panic!("Failed to load external log4rs.yml: {}", e);
            },
        }
    }

    let yaml_content = include_str!("../resources/default_log4rs.yml");
    let config: RawConfig = serde_yaml::from_str(yaml_content).expect("Embedded logging configuration is invalid YAML");
    log4rs::init_raw_config(config).expect("Failed to initialize logging from embedded config");
    info!("Logging initialized from embedded defaults (no external log4rs.yml found)");
}
