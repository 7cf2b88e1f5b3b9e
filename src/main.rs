//! vigil: multi-network lending-protocol liquidation bot.
//!
//! Watches borrower positions on Aave-V2-style pools, classifies them into
//! health-factor zones, estimates the most profitable liquidation for each
//! under-water position and drives executions through a persisted queue.
//!
//! Startup pipeline: seed networks (probe RPC, record native balance),
//! fill the reserve-token table, create listeners, then start the zone
//! monitors, the queue check cycle, the deferred re-check consumer and one
//! event ingestor per listener.

use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vigil_chain::{
    address_key, EventIngestor, LendingPool, NetworkHandle, NetworkMap, NetworkProvider,
    SwapRouter, TransactionSender,
};
use vigil_core::{
    BotConfig, ExecutionDriver, LiquidationQueue, PositionTracker, QueueWorker, RecheckScheduler,
    ZoneMonitor,
};
use vigil_store::{ListenerRecord, NetworkRecord, Store, TokenRecord};

/// Environment variable names.
mod env {
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const PRIVATE_KEY: &str = "ACCOUNT_PRIVATE_KEY";
}

const LENDING_POOL_LISTENER: &str = "lending-pool";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vigil_core=debug,vigil_chain=debug")),
        )
        .init();

    let config = BotConfig::from_env();
    config.log_config();

    let database_url =
        std::env::var(env::DATABASE_URL).unwrap_or_else(|_| config.database_url.clone());
    let store = Store::connect(&database_url).await?;
    store.init_schema().await?;

    let private_key =
        std::env::var(env::PRIVATE_KEY).context("ACCOUNT_PRIVATE_KEY is not set")?;

    info!("Seeding networks...");
    let chains = Arc::new(seed_networks(&store, &config, &private_key).await?);
    if chains.is_empty() {
        anyhow::bail!("no reachable networks; check RPC endpoints");
    }

    info!("Filling reserve tokens...");
    fill_tokens(&store, &chains).await?;

    info!("Creating listeners...");
    let listeners = init_listeners(&store, &config, &chains).await?;

    // Component graph: tracker drives enrollment through the queue; the
    // worker cycle and all monitors funnel back into the tracker.
    let (recheck, mut recheck_rx) = RecheckScheduler::new();
    let driver = Arc::new(ExecutionDriver::new(store.clone(), Arc::clone(&chains)));
    let queue = Arc::new(LiquidationQueue::new(
        store.clone(),
        Arc::clone(&driver),
        Arc::clone(&recheck),
        config.queue.clone(),
    ));
    let tracker = Arc::new(PositionTracker::new(
        store.clone(),
        Arc::clone(&chains),
        Arc::clone(&queue),
        Arc::clone(&recheck),
        config.zones.clone(),
    ));
    let monitor = Arc::new(ZoneMonitor::new(
        store.clone(),
        Arc::clone(&tracker),
        config.zones.clone(),
        config.monitor.clone(),
    ));
    let worker = Arc::new(QueueWorker::new(
        store.clone(),
        Arc::clone(&tracker),
        Arc::clone(&driver),
        config.queue.clone(),
    ));

    // Deferred re-check consumer.
    {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move {
            while let Some(request) = recheck_rx.recv().await {
                if let Err(e) = tracker.refresh(&request.address, &request.network).await {
                    warn!(
                        user = %request.address,
                        network = %request.network,
                        error = %e,
                        "Deferred re-check failed"
                    );
                }
            }
        });
    }

    // One ingestor per listener; the cursor only advances after every user
    // in a batch has been refreshed.
    for listener in listeners {
        spawn_ingestor(&store, &config, &chains, &tracker, listener)?;
    }

    info!("Starting zone monitors...");
    Arc::clone(&monitor).spawn();

    info!("Starting liquidation queue...");
    tokio::spawn(Arc::clone(&worker).run());

    info!("vigil is running");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}

/// Probe every seeded network and build its handle. Unreachable networks
/// are recorded inactive and skipped, never deleted.
async fn seed_networks(
    store: &Store,
    config: &BotConfig,
    private_key: &str,
) -> Result<NetworkMap> {
    let mut chains = NetworkMap::new();

    for seed in &config.networks {
        let inactive = NetworkRecord {
            id: seed.id.clone(),
            rpc_url: seed.rpc_url.clone(),
            reserve_rpc_url: seed.reserve_rpc_url.clone(),
            balance: "0".to_string(),
            is_active: false,
        };

        let Some(rpc_url) = seed.rpc_url.clone() else {
            store.upsert_network(&inactive).await?;
            continue;
        };

        let provider = NetworkProvider::new(
            seed.id.clone(),
            rpc_url.clone(),
            seed.reserve_rpc_url.clone(),
        );
        let sender = Arc::new(TransactionSender::new(private_key, &rpc_url)?);

        let balance = match provider.native_balance(sender.address).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(network = %seed.id, error = %e, "Network unreachable, seeded inactive");
                store.upsert_network(&inactive).await?;
                continue;
            }
        };

        let addresses_provider: Address = seed
            .addresses_provider
            .parse()
            .with_context(|| format!("invalid addresses_provider for {}", seed.id))?;
        let data_provider: Address = seed
            .data_provider
            .parse()
            .with_context(|| format!("invalid data_provider for {}", seed.id))?;
        let pool =
            match LendingPool::connect(provider.clone(), addresses_provider, data_provider).await {
                Ok(pool) => pool,
                Err(e) => {
                    warn!(network = %seed.id, error = %e, "Pool resolution failed, seeded inactive");
                    store.upsert_network(&inactive).await?;
                    continue;
                }
            };

        let swap = match &seed.swap_router {
            Some(router) => {
                let router: Address = router
                    .parse()
                    .with_context(|| format!("invalid swap_router for {}", seed.id))?;
                Some(SwapRouter::new(provider.clone(), router))
            }
            None => None,
        };
        let reserve_token: Address = seed
            .reserve_token
            .parse()
            .with_context(|| format!("invalid reserve_token for {}", seed.id))?;
        let flash_loan_adapter = match &seed.flash_loan_adapter {
            Some(adapter) => Some(
                adapter
                    .parse::<Address>()
                    .with_context(|| format!("invalid flash_loan_adapter for {}", seed.id))?,
            ),
            None => None,
        };

        store
            .upsert_network(&NetworkRecord {
                id: seed.id.clone(),
                rpc_url: Some(rpc_url),
                reserve_rpc_url: seed.reserve_rpc_url.clone(),
                balance: balance.to_string(),
                is_active: true,
            })
            .await?;

        info!(network = %seed.id, wallet = %sender.address, "Network seeded");
        chains.insert(
            seed.id.clone(),
            Arc::new(NetworkHandle {
                network: seed.id.clone(),
                provider,
                pool,
                swap,
                sender,
                reserve_token,
                flash_loan_adapter,
            }),
        );
    }

    Ok(chains)
}

/// Fill the token table from the protocol data provider: risk parameters,
/// wrapper-token addresses and the bot wallet's balance of each reserve.
async fn fill_tokens(store: &Store, chains: &NetworkMap) -> Result<()> {
    for (id, handle) in chains {
        let tokens = handle.pool.all_reserves_tokens().await?;
        let count = tokens.len();

        for token in tokens {
            let configuration = handle.pool.reserve_configuration(token.address).await?;
            let wrappers = handle.pool.reserve_token_addresses(token.address).await?;
            let balance = handle
                .erc20_balance(token.address, handle.sender.address)
                .await?;

            store
                .upsert_token(&TokenRecord {
                    address: address_key(token.address),
                    network_id: id.clone(),
                    symbol: token.symbol,
                    decimals: configuration.decimals as i64,
                    ltv: configuration.ltv.to_string(),
                    liquidation_threshold: configuration.liquidation_threshold.to_string(),
                    liquidation_bonus: configuration.liquidation_bonus as i64,
                    reserve_factor: configuration.reserve_factor.to_string(),
                    usage_as_collateral: configuration.usage_as_collateral_enabled,
                    borrowing_enabled: configuration.borrowing_enabled,
                    stable_rate_enabled: configuration.stable_borrow_rate_enabled,
                    is_active: configuration.is_active,
                    is_frozen: configuration.is_frozen,
                    a_token: address_key(wrappers.a_token),
                    stable_debt_token: address_key(wrappers.stable_debt_token),
                    variable_debt_token: address_key(wrappers.variable_debt_token),
                    balance: balance.to_string(),
                })
                .await?;
        }

        info!(network = %id, tokens = count, "Reserve tokens filled");
    }
    Ok(())
}

/// Create a lending-pool listener per active network, keeping any existing
/// cursor, and return the rows to ingest from.
async fn init_listeners(
    store: &Store,
    config: &BotConfig,
    chains: &NetworkMap,
) -> Result<Vec<ListenerRecord>> {
    for (id, handle) in chains {
        let deploy_block = config
            .networks
            .iter()
            .find(|seed| &seed.id == id)
            .and_then(|seed| seed.deploy_block)
            .map(|block| block as i64);
        store
            .ensure_listener(
                &address_key(handle.pool.address()),
                LENDING_POOL_LISTENER,
                id,
                deploy_block,
            )
            .await?;
    }
    store.listeners(Some(LENDING_POOL_LISTENER)).await.map_err(Into::into)
}

/// Start one event ingestor and its batch consumer.
fn spawn_ingestor(
    store: &Store,
    config: &BotConfig,
    chains: &Arc<NetworkMap>,
    tracker: &Arc<PositionTracker>,
    listener: ListenerRecord,
) -> Result<()> {
    let Some(handle) = chains.get(&listener.network_id) else {
        warn!(network = %listener.network_id, "Listener without a network handle, skipped");
        return Ok(());
    };
    let contract: Address = listener
        .contract_address
        .parse()
        .with_context(|| format!("invalid listener address on {}", listener.network_id))?;

    let ingestor = EventIngestor::new(
        handle.provider.clone(),
        contract,
        config.ingestor.poll_interval(),
        config.ingestor.confirmations,
        config.ingestor.chunk_size,
        config.ingestor.backfill_concurrency,
    );
    let (mut rx, _task) = ingestor.start(listener.last_block.map(|block| block as u64));

    let store = store.clone();
    let tracker = Arc::clone(tracker);
    tokio::spawn(async move {
        while let Some(batch) = rx.recv().await {
            for user in &batch.users {
                if let Err(e) = tracker
                    .refresh(&address_key(*user), &listener.network_id)
                    .await
                {
                    warn!(
                        user = %user,
                        network = %listener.network_id,
                        block = batch.block_number,
                        error = %e,
                        "Event-driven refresh failed"
                    );
                }
            }
            if let Err(e) = store
                .advance_cursor(
                    &listener.contract_address,
                    &listener.network_id,
                    batch.block_number as i64,
                )
                .await
            {
                warn!(
                    network = %listener.network_id,
                    block = batch.block_number,
                    error = %e,
                    "Failed to advance listener cursor"
                );
            }
        }
    });
    Ok(())
}
