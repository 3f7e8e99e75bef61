//! FIFO lot matching of buys against sells.

use chrono::{DateTime, Utc};
use satellite_core::types::{Trade, TradeSide};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::warn;

/// Quantities closer than this are treated as equal when matching lots.
const QUANTITY_EPSILON: f64 = 1e-9;

/// A sell matched against (part of) one buy lot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub buy_date: DateTime<Utc>,
    pub sell_date: DateTime<Utc>,
    pub quantity: f64,
    pub buy_price: f64,
    pub sell_price: f64,
    /// (sell - buy) * quantity.
    pub profit_loss: f64,
    /// (sell - buy) / buy.
    pub return_pct: f64,
}

/// Remaining quantity of one buy.
#[derive(Debug, Clone)]
struct OpenLot {
    buy_date: DateTime<Utc>,
    quantity: f64,
    price: f64,
}

impl OpenLot {
    fn close(
        &self,
        symbol: &str,
        quantity: f64,
        sell_price: f64,
        sell_date: DateTime<Utc>,
    ) -> ClosedTrade {
        ClosedTrade {
            symbol: symbol.to_string(),
            buy_date: self.buy_date,
            sell_date,
            quantity,
            buy_price: self.price,
            sell_price,
            profit_loss: (sell_price - self.price) * quantity,
            return_pct: (sell_price - self.price) / self.price,
        }
    }
}

/// Pair every sell with the oldest open buy lots of the same symbol.
///
/// Trades are grouped by symbol and replayed in execution order, so the
/// result does not depend on input order. A sell larger than the open
/// quantity closes what it can and the excess is dropped with a warning.
/// Output is ordered by sell date.
pub fn match_trades(trades: &[Trade]) -> Vec<ClosedTrade> {
    let mut by_symbol: BTreeMap<&str, Vec<&Trade>> = BTreeMap::new();
    for trade in trades {
        by_symbol.entry(trade.symbol.as_str()).or_default().push(trade);
    }

    let mut closed = Vec::new();
    for (symbol, mut symbol_trades) in by_symbol {
        symbol_trades.sort_by_key(|t| t.executed_at);

        let mut open: VecDeque<OpenLot> = VecDeque::new();
        for trade in symbol_trades {
            match trade.side {
                TradeSide::Buy => open.push_back(OpenLot {
                    buy_date: trade.executed_at,
                    quantity: trade.quantity,
                    price: trade.price,
                }),
                TradeSide::Sell => {
                    let mut remaining = trade.quantity;
                    while remaining > QUANTITY_EPSILON {
                        let Some(lot) = open.front_mut() else {
                            break;
                        };
                        if lot.quantity <= remaining + QUANTITY_EPSILON {
                            let quantity = lot.quantity;
                            closed.push(lot.close(symbol, quantity, trade.price, trade.executed_at));
                            remaining -= quantity;
                            open.pop_front();
                        } else {
                            closed.push(lot.close(symbol, remaining, trade.price, trade.executed_at));
                            lot.quantity -= remaining;
                            remaining = 0.0;
                        }
                    }

                    // A sell with no open lot at all is ignored silently
                    if remaining > QUANTITY_EPSILON && remaining < trade.quantity {
                        warn!(
                            symbol = %symbol,
                            excess_quantity = remaining,
                            sell_date = %trade.executed_at,
                            "SELL trade exceeds BUY quantity - possible data inconsistency"
                        );
                    }
                }
            }
        }
    }

    closed.sort_by_key(|c| c.sell_date);
    closed
}

/// Cumulative realized P&L, starting at 0, one point per closed trade in sell order.
pub fn equity_curve(closed: &[ClosedTrade]) -> Vec<f64> {
    if closed.is_empty() {
        return Vec::new();
    }

    let mut ordered: Vec<&ClosedTrade> = closed.iter().collect();
    ordered.sort_by_key(|c| c.sell_date);

    let mut curve = Vec::with_capacity(closed.len() + 1);
    curve.push(0.0);
    let mut cumulative = 0.0;
    for trade in ordered {
        cumulative += trade.profit_loss;
        curve.push(cumulative);
    }
    curve
}

/// Capital deployed by the matched lots: sum of buy_price * quantity.
pub fn initial_capital(closed: &[ClosedTrade]) -> f64 {
    closed.iter().map(|c| c.buy_price * c.quantity).sum()
}
