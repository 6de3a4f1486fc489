//! Application wiring.
//!
//! One session, one inbound dispatcher, and a set of periodic tasks that
//! share market state, the risk board and the execution gate. Every task
//! stops when the shared cancellation token fires.

use crate::account::AccountState;
use crate::command::{CommandHandler, CommandRequest};
use crate::config::AppConfig;
use crate::dispatch::Dispatcher;
use crate::error::{AppError, AppResult};
use crate::positions::PositionPoller;
use crate::scheduler::{drive, Schedule};
use skew_analytics::AnalyticsEngine;
use skew_core::CycleOutcome;
use skew_executor::{ExecutionGate, SpreadExecutor};
use skew_feed::{Ingest, MarketState, SubscriptionPlanner, SubscriptionUpdater};
use skew_persistence::JsonLinesStore;
use skew_risk::{RiskBoard, RiskManager, SpreadTarget};
use skew_telemetry::Metrics;
use skew_ws::{AuthSigner, Credentials, SessionManager, WsMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Inbound message buffer between the session and the dispatcher.
const MESSAGE_CHANNEL_CAPACITY: usize = 1000;
const COMMAND_CHANNEL_CAPACITY: usize = 16;
/// Session metrics refresh and store flush.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(5);
/// Grace period for tasks to stop after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Main application.
pub struct Application {
    config: AppConfig,
    target: SpreadTarget,
    session: Arc<SessionManager>,
    message_rx: mpsc::Receiver<WsMessage>,
    planner: SubscriptionPlanner,
    ingest: Ingest,
    store: Arc<JsonLinesStore>,
    state: Arc<MarketState>,
    board: Arc<RiskBoard>,
    gate: Arc<ExecutionGate>,
    account: Arc<AccountState>,
    command_tx: mpsc::Sender<CommandRequest>,
    command_rx: mpsc::Receiver<CommandRequest>,
    token: CancellationToken,
}

impl Application {
    /// Validate the configuration, open storage and load credentials.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let channels = config.channels();
        let expirations = config.expirations()?;
        let proxies = config.perpetual_proxies()?;
        let target = config.spread_target()?;

        let store = Arc::new(JsonLinesStore::open(config.store_config())?);
        let (quotes, marks, skewness) = store.row_counts();
        info!(quotes, marks, skewness, "Storage opened");

        let state = Arc::new(MarketState::new());
        let planner = SubscriptionPlanner::new(
            channels.clone(),
            expirations.clone(),
            proxies.clone(),
            config.strategy.otm_log_moneyness,
        );
        let ingest = Ingest::new(channels, &expirations, &proxies, state.clone(), store.clone());

        let signer = AuthSigner::load(&config.credentials.key_source())?;
        let credentials = Credentials {
            client_id: config.credentials.client_id()?,
            signer: Arc::new(signer),
        };

        let token = CancellationToken::new();
        let (message_tx, message_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let always_on = planner.always_on().into_iter().collect();
        let session = SessionManager::new(config.session_config(always_on), credentials, message_tx)
            .with_shutdown_token(token.clone());

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        info!(
            near = %target.near,
            far = %target.far,
            direction = %target.direction,
            amount = %target.amount,
            execution_enabled = config.strategy.execution_enabled,
            "Application configured"
        );

        Ok(Self {
            gate: Arc::new(ExecutionGate::new(config.strategy.execution_enabled)),
            config,
            target,
            session: Arc::new(session),
            message_rx,
            planner,
            ingest,
            store,
            state,
            board: Arc::new(RiskBoard::new()),
            account: Arc::new(AccountState::new()),
            command_tx,
            command_rx,
            token,
        })
    }

    /// Sender for operator commands.
    pub fn command_sender(&self) -> mpsc::Sender<CommandRequest> {
        self.command_tx.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run until shutdown.
    ///
    /// Returns an error when the session ends on its own or a periodic task
    /// reports a fatal outcome.
    pub async fn run(self) -> AppResult<()> {
        let Self {
            config,
            target,
            session,
            message_rx,
            planner,
            ingest,
            store,
            state,
            board,
            gate,
            account,
            command_tx,
            command_rx,
            token,
        } = self;
        drop(command_tx);

        let handle = session.write_handle();

        let session_task = {
            let session = session.clone();
            tokio::spawn(async move { session.run().await })
        };

        let dispatcher = Dispatcher::new(ingest, board.clone(), account.clone());
        let dispatch_task = tokio::spawn(dispatcher.run(message_rx, token.clone()));

        let commands = CommandHandler::new(
            handle.clone(),
            gate.clone(),
            board.clone(),
            account,
            state.clone(),
            target.clone(),
            config.risk.maintenance_margin_multiplier,
        )
        .with_heartbeat(session.heartbeat());
        let command_task = tokio::spawn(commands.run(command_rx, token.clone()));

        let mut tasks: Vec<JoinHandle<Option<CycleOutcome>>> = Vec::new();

        let updater = Arc::new(SubscriptionUpdater::new(
            planner,
            state.clone(),
            session.subscriptions(),
            handle.clone(),
            Duration::from_secs(config.subscription.retry_secs),
        ));
        tasks.push(tokio::spawn(drive(
            Schedule::every("subscription", Duration::from_secs(config.subscription.recompute_secs))
                .after(Duration::from_secs(config.subscription.initial_delay_secs)),
            token.clone(),
            move || {
                let updater = updater.clone();
                async move { updater.run_cycle().await }
            },
        )));

        let analytics_period = Duration::from_secs(config.analytics.period_secs);
        let analytics = Arc::new(AnalyticsEngine::new(
            config.analytics.clone(),
            config.expirations()?,
            store.clone(),
            state.clone(),
        ));
        tasks.push(tokio::spawn(drive(
            Schedule::every("analytics", analytics_period).after(analytics_period),
            token.clone(),
            move || {
                let analytics = analytics.clone();
                async move { analytics.run_cycle() }
            },
        )));

        let risk_period = Duration::from_secs(config.risk.period_secs);
        let risk = Arc::new(RiskManager::new(
            config.risk.clone(),
            target.clone(),
            store.clone(),
            state.clone(),
            board.clone(),
            handle.clone(),
        ));
        tasks.push(tokio::spawn(drive(
            Schedule::every("risk", risk_period).after(risk_period),
            token.clone(),
            move || {
                let risk = risk.clone();
                async move { risk.run_cycle().await }
            },
        )));

        let execution_period = Duration::from_secs(config.execution.period_secs);
        let executor = Arc::new(SpreadExecutor::new(target, state, board, gate, handle.clone()));
        tasks.push(tokio::spawn(drive(
            Schedule::every("execution", execution_period).after(execution_period),
            token.clone(),
            move || {
                let executor = executor.clone();
                async move { executor.run_cycle().await }
            },
        )));

        let poller = Arc::new(PositionPoller::new(config.strategy.currency.clone(), handle));
        tasks.push(tokio::spawn(drive(
            Schedule::every("positions", Duration::from_secs(config.positions.period_secs))
                .after(Duration::from_secs(config.positions.initial_delay_secs)),
            token.clone(),
            move || {
                let poller = poller.clone();
                async move { poller.run_cycle().await }
            },
        )));

        {
            let session = session.clone();
            let store = store.clone();
            tasks.push(tokio::spawn(drive(
                Schedule::every("housekeeping", HOUSEKEEPING_INTERVAL),
                token.clone(),
                move || {
                    let session = session.clone();
                    let store = store.clone();
                    async move { housekeeping(&session, &store) }
                },
            )));
        }

        info!(tasks = tasks.len(), "Application running");

        let mut session_task = session_task;
        let session_result = tokio::select! {
            joined = &mut session_task => Some(joined),
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                None
            }
            () = token.cancelled() => None,
        };

        token.cancel();
        let session_result = match session_result {
            Some(joined) => joined,
            None => session_task.await,
        }
        .map_err(|e| AppError::Task(format!("session task: {e}")))?;

        let mut fatal = None;
        for task in tasks {
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(Some(CycleOutcome::Fatal(reason)))) => fatal = Some(reason),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "Periodic task panicked"),
                Err(_) => warn!("Periodic task did not stop in time"),
            }
        }
        for (name, task) in [("dispatcher", dispatch_task), ("commands", command_task)] {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!(task = name, "Task did not stop in time");
            }
        }

        if let Err(e) = store.flush() {
            error!(error = %e, "Final storage flush failed");
        }
        Metrics::session_state(session.state().as_str());

        session_result?;
        if let Some(reason) = fatal {
            return Err(AppError::Task(reason));
        }
        info!("Shutdown complete");
        Ok(())
    }
}

fn housekeeping(session: &SessionManager, store: &JsonLinesStore) -> CycleOutcome {
    Metrics::session_state(session.state().as_str());
    Metrics::heartbeat_replies(session.heartbeat().reply_ack_count());
    if let Err(e) = store.flush() {
        warn!(error = %e, "Storage flush failed");
        return CycleOutcome::skipped(skew_core::SkipReason::Failed(e.to_string()));
    }
    debug!("Housekeeping done");
    CycleOutcome::Completed
}
