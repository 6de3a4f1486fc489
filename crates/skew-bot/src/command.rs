//! Operator commands.
//!
//! Grammar: `/trade <buy|sell> <amount> <instrument> [price]`,
//! `/cancel <order_id>`, `/edit <order_id> <price> [amount]`,
//! `/combo <side>:<amount>:<instrument>[:price] ...`, `/margin`,
//! `/positions`, `/toggle_risk <on|off>`, `/status`, `/metrics`, `/help`.
//!
//! The bundled source reads lines from stdin. Other sources push
//! [`CommandRequest`]s on the handler's channel.

use crate::account::AccountState;
use rust_decimal::Decimal;
use skew_core::OrderSide;
use skew_executor::ExecutionGate;
use skew_feed::MarketState;
use skew_risk::{MarginVerdict, RiskBoard, SpreadTarget};
use skew_ws::{ComboLeg, HeartbeatMonitor, OrderParams, WsWriteHandle};
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const HELP: &str = "\
/trade <buy|sell> <amount> <instrument> [price] - place an order
/cancel <order_id> - cancel an order
/edit <order_id> <price> [amount] - amend an open order
/combo <buy|sell>:<amount>:<instrument>[:price] ... - combo order, two or more legs
/margin - last portfolio simulation
/positions - current option positions
/toggle_risk <on|off> - enable or disable risk-reversal execution
/status - session, gate and spread status
/metrics - metrics in text exposition format";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Trade {
        side: OrderSide,
        amount: Decimal,
        instrument: String,
        price: Option<Decimal>,
    },
    Cancel {
        order_id: String,
    },
    Edit {
        order_id: String,
        price: Decimal,
        amount: Option<Decimal>,
    },
    Combo(Vec<ComboLeg>),
    Margin,
    Positions,
    ToggleRisk(bool),
    Status,
    Metrics,
    Help,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err(CommandError::Unknown(String::new()));
        };
        let args: Vec<&str> = words.collect();

        match head.trim_start_matches('/').to_ascii_lowercase().as_str() {
            "trade" => {
                const USAGE: &str = "/trade <buy|sell> <amount> <instrument> [price]";
                let [side, amount, instrument, rest @ ..] = args.as_slice() else {
                    return Err(CommandError::Usage(USAGE));
                };
                if rest.len() > 1 {
                    return Err(CommandError::Usage(USAGE));
                }
                let side = OrderSide::from_str(side)
                    .map_err(|_| CommandError::InvalidArgument(format!("side must be buy or sell, got {side}")))?;
                let amount = parse_positive(amount, "amount")?;
                let price = rest.first().map(|p| parse_positive(p, "price")).transpose()?;
                Ok(Self::Trade {
                    side,
                    amount,
                    instrument: instrument.to_string(),
                    price,
                })
            }
            "cancel" => match args.as_slice() {
                [order_id] => Ok(Self::Cancel {
                    order_id: order_id.to_string(),
                }),
                _ => Err(CommandError::Usage("/cancel <order_id>")),
            },
            "edit" => match args.as_slice() {
                [order_id, price, rest @ ..] if rest.len() <= 1 => Ok(Self::Edit {
                    order_id: order_id.to_string(),
                    price: parse_positive(price, "price")?,
                    amount: rest.first().map(|a| parse_positive(a, "amount")).transpose()?,
                }),
                _ => Err(CommandError::Usage("/edit <order_id> <price> [amount]")),
            },
            "combo" => {
                if args.len() < 2 {
                    return Err(CommandError::Usage("/combo <buy|sell>:<amount>:<instrument>[:price] ..."));
                }
                let legs = args.iter().map(|leg| parse_combo_leg(leg)).collect::<Result<_, _>>()?;
                Ok(Self::Combo(legs))
            }
            "margin" => Ok(Self::Margin),
            "positions" => Ok(Self::Positions),
            "toggle_risk" => match args.as_slice() {
                [flag] if flag.eq_ignore_ascii_case("on") => Ok(Self::ToggleRisk(true)),
                [flag] if flag.eq_ignore_ascii_case("off") => Ok(Self::ToggleRisk(false)),
                _ => Err(CommandError::Usage("/toggle_risk <on|off>")),
            },
            "status" => Ok(Self::Status),
            "metrics" => Ok(Self::Metrics),
            "help" | "start" => Ok(Self::Help),
            _ => Err(CommandError::Unknown(head.to_string())),
        }
    }
}

fn parse_positive(value: &str, name: &str) -> Result<Decimal, CommandError> {
    let parsed = Decimal::from_str(value)
        .map_err(|_| CommandError::InvalidArgument(format!("{name} is not a number: {value}")))?;
    if parsed <= Decimal::ZERO {
        return Err(CommandError::InvalidArgument(format!("{name} must be positive")));
    }
    Ok(parsed)
}

/// `<side>:<amount>:<instrument>[:price]`
fn parse_combo_leg(leg: &str) -> Result<ComboLeg, CommandError> {
    let parts: Vec<&str> = leg.split(':').collect();
    let [side, amount, instrument, rest @ ..] = parts.as_slice() else {
        return Err(CommandError::InvalidArgument(format!("combo leg {leg}")));
    };
    if rest.len() > 1 || instrument.is_empty() {
        return Err(CommandError::InvalidArgument(format!("combo leg {leg}")));
    }
    Ok(ComboLeg {
        instrument_name: instrument.to_string(),
        amount: parse_positive(amount, "amount")?,
        price: rest.first().map(|p| parse_positive(p, "price")).transpose()?,
        direction: OrderSide::from_str(side)
            .map_err(|_| CommandError::InvalidArgument(format!("side must be buy or sell, got {side}")))?,
    })
}

/// A command and where to send its reply.
#[derive(Debug)]
pub struct CommandRequest {
    pub command: Command,
    pub reply: Option<oneshot::Sender<String>>,
}

/// Executes commands against the running application.
pub struct CommandHandler {
    handle: WsWriteHandle,
    gate: Arc<ExecutionGate>,
    board: Arc<RiskBoard>,
    account: Arc<AccountState>,
    state: Arc<MarketState>,
    target: SpreadTarget,
    maintenance_multiplier: f64,
    heartbeat: Option<Arc<HeartbeatMonitor>>,
}

impl CommandHandler {
    pub fn new(
        handle: WsWriteHandle,
        gate: Arc<ExecutionGate>,
        board: Arc<RiskBoard>,
        account: Arc<AccountState>,
        state: Arc<MarketState>,
        target: SpreadTarget,
        maintenance_multiplier: f64,
    ) -> Self {
        Self {
            handle,
            gate,
            board,
            account,
            state,
            target,
            maintenance_multiplier,
            heartbeat: None,
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Arc<HeartbeatMonitor>) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    /// Serve requests until the channel closes or the token is cancelled.
    pub async fn run(self, mut rx: mpsc::Receiver<CommandRequest>, token: CancellationToken) {
        loop {
            let request = tokio::select! {
                () = token.cancelled() => break,
                request = rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            let reply = self.handle(request.command).await;
            if let Some(tx) = request.reply {
                let _ = tx.send(reply);
            }
        }
        debug!("Command handler stopped");
    }

    pub async fn handle(&self, command: Command) -> String {
        info!(?command, "Operator command");
        match command {
            Command::Trade {
                side,
                amount,
                instrument,
                price,
            } => {
                let params = OrderParams::with_optional_price(instrument, amount, price);
                match self.handle.place_order(side, &params).await {
                    Ok(()) => format!(
                        "Order sent: {side} {amount} {} ({})",
                        params.instrument_name,
                        price.map_or("market".to_string(), |p| format!("limit {p}"))
                    ),
                    Err(e) => format!("Order not sent: {e}"),
                }
            }
            Command::Cancel { order_id } => match self.handle.cancel(&order_id).await {
                Ok(()) => format!("Cancel sent for {order_id}"),
                Err(e) => format!("Cancel not sent: {e}"),
            },
            Command::Edit {
                order_id,
                price,
                amount,
            } => match self.handle.edit(&order_id, Some(price), amount).await {
                Ok(()) => format!("Edit sent for {order_id}: price {price}"),
                Err(e) => format!("Edit not sent: {e}"),
            },
            Command::Combo(legs) => match self.handle.create_combo(&legs).await {
                Ok(()) => format!("Combo order sent with {} legs", legs.len()),
                Err(e) => format!("Combo order not sent: {e}"),
            },
            Command::Margin => self.margin_report(),
            Command::Positions => self.positions_report(),
            Command::ToggleRisk(enabled) => {
                self.gate.set(enabled);
                format!(
                    "Risk reversal is now {}",
                    if enabled { "ENABLED" } else { "DISABLED" }
                )
            }
            Command::Status => self.status_report(),
            Command::Metrics => match skew_telemetry::gather_text() {
                Ok(text) => text,
                Err(e) => format!("Metrics unavailable: {e}"),
            },
            Command::Help => HELP.to_string(),
        }
    }

    fn margin_report(&self) -> String {
        let Some(sim) = self.board.simulation().latest() else {
            return "No portfolio simulation yet".to_string();
        };
        let verdict = MarginVerdict::evaluate(Some(&sim), self.maintenance_multiplier);
        format!(
            "Portfolio simulation ({} {}):\n\
             equity: {} {ccy}\n\
             projected maintenance margin: {} {ccy}\n\
             projected initial margin: {} {ccy}\n\
             margin balance: {} {ccy}\n\
             P&L: {} {ccy}\n\
             verdict: {verdict}",
            self.target.direction,
            self.target.amount,
            sim.equity,
            sim.projected_maintenance_margin,
            sim.projected_initial_margin,
            sim.margin_balance,
            sim.total_pl,
            ccy = self.target.currency(),
        )
    }

    fn positions_report(&self) -> String {
        let Some(snapshot) = self.account.positions() else {
            return "No position data yet".to_string();
        };
        if snapshot.positions.is_empty() {
            return format!("No open positions (as of {})", snapshot.received_at.format("%H:%M:%S"));
        }
        let mut out = format!("Positions as of {}:", snapshot.received_at.format("%H:%M:%S"));
        for position in &snapshot.positions {
            let _ = write!(out, "\n{position}");
        }
        out
    }

    fn status_report(&self) -> String {
        let risk = self.board.snapshot();
        let mut out = String::new();
        let _ = writeln!(out, "session: {}", self.handle.session_state());
        if let Some(heartbeat) = &self.heartbeat {
            let _ = writeln!(
                out,
                "heartbeat: {} test requests, {} replies acknowledged",
                heartbeat.test_request_count(),
                heartbeat.reply_ack_count()
            );
        }
        let _ = writeln!(
            out,
            "execution gate: {}",
            if self.gate.is_enabled() { "enabled" } else { "disabled" }
        );
        let _ = writeln!(
            out,
            "spread: {} {} / {} x {}",
            self.target.direction,
            self.target.near.label(),
            self.target.far.label(),
            self.target.amount
        );
        match self.target.resolve_legs(&self.state) {
            Some(legs) => {
                let _ = writeln!(
                    out,
                    "legs: {} {} {} {}",
                    legs.far_call, legs.far_put, legs.near_call, legs.near_put
                );
            }
            None => {
                let _ = writeln!(out, "legs: not selected");
            }
        }
        match risk.latest {
            Some(row) => {
                let _ = writeln!(out, "latest spread: iv {:.4}, price {:.6}", row.rr_iv, row.rr_price);
            }
            None => {
                let _ = writeln!(out, "latest spread: none");
            }
        }
        if let Some(mids) = risk.mids {
            let _ = writeln!(
                out,
                "leg mid iv: far call {}, far put {}, near call {}, near put {}",
                fmt_mid(mids.far_call.iv),
                fmt_mid(mids.far_put.iv),
                fmt_mid(mids.near_call.iv),
                fmt_mid(mids.near_put.iv)
            );
        }
        if let Some(bounds) = risk.bounds {
            let _ = writeln!(out, "iv bounds: [{:.4}, {:.4}]", bounds.lower, bounds.upper);
        }
        let _ = writeln!(
            out,
            "margin pre-check: SHORT {}, LONG {}",
            pass_label(risk.precheck_short),
            pass_label(risk.precheck_long)
        );
        match self.account.last_order_ack() {
            Some(ack) => {
                let _ = write!(out, "last order response: {ack}");
            }
            None => {
                let _ = write!(out, "last order response: none");
            }
        }
        out
    }
}

fn fmt_mid(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

fn pass_label(passed: bool) -> &'static str {
    if passed {
        "pass"
    } else {
        "fail"
    }
}

/// Read commands from stdin on a dedicated thread and print replies.
///
/// The thread ends at EOF or when the handler is gone.
pub fn spawn_stdin_source(tx: mpsc::Sender<CommandRequest>) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("command-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "stdin read failed");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let command = match Command::parse(&line) {
                    Ok(command) => command,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                };
                let (reply_tx, reply_rx) = oneshot::channel();
                let request = CommandRequest {
                    command,
                    reply: Some(reply_tx),
                };
                if tx.blocking_send(request).is_err() {
                    break;
                }
                match reply_rx.blocking_recv() {
                    Ok(reply) => println!("{reply}"),
                    Err(_) => break,
                }
            }
            debug!("stdin command source stopped");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use rust_decimal_macros::dec;
    use skew_core::{Channels, Expiration, SpreadDirection};
    use skew_risk::{LegMid, LegMids, PortfolioSimulation};
    use skew_ws::{SessionState, WsOutbound};

    #[test]
    fn test_parse_trade() {
        assert_eq!(
            Command::parse("/trade buy 0.1 BTC-28MAR25-90000-P 0.012"),
            Ok(Command::Trade {
                side: OrderSide::Buy,
                amount: dec!(0.1),
                instrument: "BTC-28MAR25-90000-P".to_string(),
                price: Some(dec!(0.012)),
            })
        );
        assert!(matches!(
            Command::parse("/trade SELL 1 BTC-PERPETUAL"),
            Ok(Command::Trade { side: OrderSide::Sell, price: None, .. })
        ));
        assert!(matches!(Command::parse("/trade buy 1"), Err(CommandError::Usage(_))));
        assert!(matches!(
            Command::parse("/trade hold 1 BTC-PERPETUAL"),
            Err(CommandError::InvalidArgument(_))
        ));
        assert!(matches!(
            Command::parse("/trade buy -1 BTC-PERPETUAL"),
            Err(CommandError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_parse_other_commands() {
        assert_eq!(
            Command::parse("/cancel 12345"),
            Ok(Command::Cancel {
                order_id: "12345".to_string()
            })
        );
        assert_eq!(Command::parse("/toggle_risk ON"), Ok(Command::ToggleRisk(true)));
        assert_eq!(Command::parse("toggle_risk off"), Ok(Command::ToggleRisk(false)));
        assert!(Command::parse("/toggle_risk maybe").is_err());
        assert_eq!(
            Command::parse("/edit 12345 0.015"),
            Ok(Command::Edit {
                order_id: "12345".to_string(),
                price: dec!(0.015),
                amount: None,
            })
        );
        assert!(matches!(Command::parse("/edit 12345"), Err(CommandError::Usage(_))));
        assert_eq!(Command::parse("/margin"), Ok(Command::Margin));
        assert_eq!(Command::parse("  /status  "), Ok(Command::Status));
        assert!(matches!(Command::parse("/set_expiration 28MAR25"), Err(CommandError::Unknown(_))));
    }

    struct Fixture {
        handler: CommandHandler,
        gate: Arc<ExecutionGate>,
        board: Arc<RiskBoard>,
        rx: mpsc::Receiver<WsOutbound>,
    }

    fn fixture() -> Fixture {
        let (tx, rx) = mpsc::channel(8);
        let handle = WsWriteHandle::new(tx, Arc::new(RwLock::new(SessionState::Ready)));
        let gate = Arc::new(ExecutionGate::new(false));
        let board = Arc::new(RiskBoard::new());
        let target = SpreadTarget {
            channels: Channels::new("BTC"),
            near: Expiration::parse("28MAR25").unwrap(),
            far: Expiration::parse("27JUN25").unwrap(),
            direction: SpreadDirection::Short,
            amount: dec!(0.1),
        };
        let handler = CommandHandler::new(
            handle,
            gate.clone(),
            board.clone(),
            Arc::new(AccountState::new()),
            Arc::new(MarketState::new()),
            target,
            1.2,
        );
        Fixture {
            handler,
            gate,
            board,
            rx,
        }
    }

    #[tokio::test]
    async fn test_trade_sends_limit_order() {
        let mut f = fixture();
        let reply = f
            .handler
            .handle(Command::parse("/trade sell 0.2 BTC-28MAR25-90000-P 0.01").unwrap())
            .await;
        assert!(reply.starts_with("Order sent"));

        let sent = f.rx.try_recv().unwrap();
        assert_eq!(sent.id, 1001);
        let payload: serde_json::Value = serde_json::from_str(&sent.payload).unwrap();
        assert_eq!(payload["method"], "private/sell");
        assert_eq!(payload["params"]["type"], "limit");
        assert_eq!(payload["params"]["price"], 0.01);
    }

    #[test]
    fn test_parse_combo() {
        let Ok(Command::Combo(legs)) =
            Command::parse("/combo sell:0.1:BTC-27JUN25-120000-C buy:0.1:BTC-28MAR25-110000-C:0.02")
        else {
            panic!("expected combo");
        };
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].direction, OrderSide::Sell);
        assert_eq!(legs[0].price, None);
        assert_eq!(legs[1].instrument_name, "BTC-28MAR25-110000-C");
        assert_eq!(legs[1].price, Some(dec!(0.02)));

        assert!(matches!(
            Command::parse("/combo sell:0.1:BTC-27JUN25-120000-C"),
            Err(CommandError::Usage(_))
        ));
        assert!(matches!(
            Command::parse("/combo sell:0.1 buy:0.1:BTC-PERPETUAL"),
            Err(CommandError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_edit_and_combo_are_sent() {
        let mut f = fixture();
        let reply = f.handler.handle(Command::parse("/edit 42 0.015 0.2").unwrap()).await;
        assert!(reply.starts_with("Edit sent"));
        let sent = f.rx.try_recv().unwrap();
        assert_eq!(sent.id, 1003);
        let payload: serde_json::Value = serde_json::from_str(&sent.payload).unwrap();
        assert_eq!(payload["params"]["order_id"], "42");
        assert_eq!(payload["params"]["amount"], 0.2);

        let reply = f
            .handler
            .handle(Command::parse("/combo sell:0.1:BTC-27JUN25-120000-C buy:0.1:BTC-28MAR25-110000-C").unwrap())
            .await;
        assert_eq!(reply, "Combo order sent with 2 legs");
        let sent = f.rx.try_recv().unwrap();
        assert_eq!(sent.id, 1004);
        let payload: serde_json::Value = serde_json::from_str(&sent.payload).unwrap();
        assert_eq!(payload["method"], "private/create_combo_order");
    }

    #[tokio::test]
    async fn test_toggle_risk_sets_gate() {
        let f = fixture();
        f.handler.handle(Command::ToggleRisk(true)).await;
        assert!(f.gate.is_enabled());
        let reply = f.handler.handle(Command::ToggleRisk(false)).await;
        assert!(reply.contains("DISABLED"));
        assert!(!f.gate.is_enabled());
    }

    #[tokio::test]
    async fn test_margin_and_status_reports() {
        let f = fixture();
        assert_eq!(f.handler.handle(Command::Margin).await, "No portfolio simulation yet");

        f.board.simulation().fill(PortfolioSimulation {
            equity: 1.0,
            projected_maintenance_margin: 0.9,
            projected_initial_margin: 0.5,
            margin_balance: 1.0,
            total_pl: 0.0,
        });
        let margin = f.handler.handle(Command::Margin).await;
        assert!(margin.contains("equity: 1 BTC"));
        assert!(!margin.contains("verdict: pass"));

        f.board.publish_mids(LegMids {
            timestamp_ms: 20_000,
            far_call: LegMid { price: Some(0.05), iv: Some(52.5) },
            far_put: LegMid { price: Some(0.04), iv: Some(50.5) },
            near_call: LegMid { price: Some(0.02), iv: None },
            near_put: LegMid { price: Some(0.03), iv: Some(55.5) },
        });
        let status = f.handler.handle(Command::Status).await;
        assert!(status.contains("leg mid iv: far call 52.50, far put 50.50, near call -, near put 55.50"));
        assert!(status.contains("session: ready"));
        assert!(status.contains("execution gate: disabled"));
        assert!(status.contains("legs: not selected"));
        assert!(status.contains("margin pre-check: SHORT fail, LONG fail"));
    }

    #[tokio::test]
    async fn test_run_replies_on_channel() {
        let f = fixture();
        let (tx, rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        let task = tokio::spawn(f.handler.run(rx, token.clone()));

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(CommandRequest {
            command: Command::Positions,
            reply: Some(reply_tx),
        })
        .await
        .unwrap();
        assert_eq!(reply_rx.await.unwrap(), "No position data yet");

        token.cancel();
        task.await.unwrap();
    }
}
