//! Risk-adjusted return ratios over per-trade returns.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution};

/// Trading periods per year used to de-annualize the risk-free rate.
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Stand-in for an infinite ratio (no downside, no gross loss) in the composite score.
pub const RATIO_SCORE_CAP: f64 = 10.0;

/// Largest peak-to-trough decline of an equity curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Drawdown {
    /// Fraction of the running peak, in [0, 1] while equity stays non-negative.
    pub max_drawdown: f64,
    pub peak_index: usize,
    pub trough_index: usize,
}

impl Drawdown {
    fn none() -> Self {
        Self {
            max_drawdown: 0.0,
            peak_index: 0,
            trough_index: 0,
        }
    }
}

/// Sample mean and standard deviation, `None` below two observations.
fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let data = Data::new(values.to_vec());
    Some((data.mean()?, data.std_dev()?))
}

/// Sample standard deviation, 0 below two observations.
pub fn std_dev(values: &[f64]) -> f64 {
    mean_std(values).map(|(_, std)| std).unwrap_or(0.0)
}

/// (mean - annual_rf / 252) / std. 0 with fewer than two returns or no dispersion.
pub fn sharpe_ratio(returns: &[f64], annual_risk_free_rate: f64) -> f64 {
    let Some((mean, std)) = mean_std(returns) else {
        return 0.0;
    };
    if std == 0.0 {
        return 0.0;
    }
    (mean - annual_risk_free_rate / TRADING_DAYS_PER_YEAR) / std
}

/// (mean - target) / std of the shortfalls below `target`.
///
/// +inf when no return falls below the target, 0 with fewer than two
/// returns or when the shortfalls have no dispersion.
pub fn sortino_ratio(returns: &[f64], target: f64) -> f64 {
    let Some((mean, _)) = mean_std(returns) else {
        return 0.0;
    };

    let shortfalls: Vec<f64> = returns
        .iter()
        .filter(|&&r| r < target)
        .map(|&r| r - target)
        .collect();
    if shortfalls.is_empty() {
        return f64::INFINITY;
    }

    let downside_std = std_dev(&shortfalls);
    if downside_std == 0.0 {
        return 0.0;
    }
    (mean - target) / downside_std
}

/// Largest decline from a running peak.
///
/// Points where the running peak is not positive are skipped: a curve that
/// starts at zero cannot express a relative drawdown until it has gained.
pub fn max_drawdown(equity: &[f64]) -> Drawdown {
    if equity.len() < 2 {
        return Drawdown::none();
    }

    let mut result = Drawdown::none();
    let mut peak = equity[0];
    let mut peak_index = 0;
    for (i, &value) in equity.iter().enumerate() {
        if value > peak {
            peak = value;
            peak_index = i;
        }
        if peak <= 0.0 {
            continue;
        }
        let drawdown = (peak - value) / peak;
        if drawdown > result.max_drawdown {
            result = Drawdown {
                max_drawdown: drawdown,
                peak_index,
                trough_index: i,
            };
        }
    }
    result
}

/// annualized_return / max_drawdown, 0 without a drawdown.
pub fn calmar_ratio(annualized_return: f64, max_drawdown: f64) -> f64 {
    if max_drawdown == 0.0 {
        return 0.0;
    }
    annualized_return / max_drawdown
}

/// Win rate in percent over decided trades, plus the win and loss counts.
///
/// Break-even trades count as neither.
pub fn win_rate(profit_losses: &[f64]) -> (f64, usize, usize) {
    let winning = profit_losses.iter().filter(|&&p| p > 0.0).count();
    let losing = profit_losses.iter().filter(|&&p| p < 0.0).count();
    let decided = winning + losing;
    if decided == 0 {
        return (0.0, winning, losing);
    }
    (winning as f64 / decided as f64 * 100.0, winning, losing)
}

/// Gross profit / gross loss. +inf without losses, 0 without any profit.
pub fn profit_factor(profit_losses: &[f64]) -> f64 {
    let gross_profit: f64 = profit_losses.iter().filter(|&&p| p > 0.0).sum();
    let gross_loss: f64 = profit_losses
        .iter()
        .filter(|&&p| p < 0.0)
        .map(|p| p.abs())
        .sum();

    if gross_loss == 0.0 {
        if gross_profit > 0.0 {
            return f64::INFINITY;
        }
        return 0.0;
    }
    gross_profit / gross_loss
}

/// Total return (fraction) compounded to a yearly rate over `days`.
///
/// Returns 0 when `days` is not positive or the return is a total loss.
pub fn annualize(total_return: f64, days: f64) -> f64 {
    if days <= 0.0 || total_return <= -1.0 {
        return 0.0;
    }
    (1.0 + total_return).powf(365.0 / days) - 1.0
}

/// Finite ratios pass through, NaN becomes 0 and +/-inf becomes +/-[`RATIO_SCORE_CAP`].
fn finite(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else if value.is_infinite() {
        RATIO_SCORE_CAP.copysign(value)
    } else {
        value
    }
}

/// Inputs of the composite score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreInputs {
    pub sharpe: f64,
    pub sortino: f64,
    pub profit_factor: f64,
    /// Percent, 0-100.
    pub win_rate: f64,
    pub calmar: f64,
}

/// 0.3 Sharpe + 0.3 Sortino + 0.2 (PF - 1) + 0.1 (WR / 100) + 0.1 Calmar.
///
/// Infinite ratios count as +/-[`RATIO_SCORE_CAP`] so the score stays finite.
pub fn composite_score(inputs: ScoreInputs) -> f64 {
    0.3 * finite(inputs.sharpe)
        + 0.3 * finite(inputs.sortino)
        + 0.2 * (finite(inputs.profit_factor) - 1.0)
        + 0.1 * (finite(inputs.win_rate) / 100.0)
        + 0.1 * finite(inputs.calmar)
}
