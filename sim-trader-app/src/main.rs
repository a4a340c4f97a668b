//! Scripted demo session against the simulated matching engine.

use anyhow::Result;
use lifecycle_core::{Bar, Order, Security, SessionConfig, Side, SimTradingSession};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn bar(symbol: &str, low: f64, high: f64, close: f64, ts: u64) -> Bar {
    Bar {
        security: Security::new(symbol),
        provider: "SIM".into(),
        open: close,
        high,
        low,
        close,
        timestamp: ts,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut session = SimTradingSession::new(SessionConfig::default());
    session.start().await?;
    info!("demo session started");

    // Open a long in AAPL on the next print.
    session.submit_order(
        Order::market("aapl-1", Security::new("AAPL"), Side::Buy, 40, "SIM")?
            .with_group("demo"),
    )?;
    session.on_bar(&bar("AAPL", 35.0, 36.0, 35.5, 1_000));

    // A resting sell limit in GOOG, admissible on the second bar.
    session.submit_order(
        Order::limit("goog-1", Security::new("GOOG"), Side::Sell, 10, 100.0, "SIM")?
            .with_group("demo"),
    )?;
    session.on_bar(&bar("GOOG", 90.0, 98.0, 95.0, 2_000));
    session.on_bar(&bar("GOOG", 105.0, 120.0, 110.0, 3_000));

    // Flatten the AAPL long to close the round trip.
    session.submit_order(
        Order::market("aapl-2", Security::new("AAPL"), Side::Sell, 40, "SIM")?
            .with_group("demo"),
    )?;
    session.on_bar(&bar("AAPL", 35.8, 36.3, 36.0, 4_000));

    tokio::time::sleep(Duration::from_millis(200)).await;

    for order_id in ["aapl-1", "goog-1", "aapl-2"] {
        if let Some(status) = session.order_status(order_id) {
            info!(order_id, %status, "final order status");
        }
    }
    for trade in session.closed_trades() {
        info!(
            trade_id = %trade.id,
            security = %trade.security,
            pnl = trade.realized_pnl,
            "closed round trip"
        );
    }

    let stats = session.statistics();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    session.stop().await;
    Ok(())
}
