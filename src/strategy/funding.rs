//! Funding assessment and rebalance planning.
//!
//! The balance check and the balancer both reduce the account to a
//! two-digit code: tens digit for the base asset (2 = enough for one
//! trade, 1 = short), units digit for the quote asset (2 = enough to buy
//! one trade at the ask, 1 = short).

use serde::Serialize;
use std::fmt;

// ---------------------------------------------------------------------------
// Funding code
// ---------------------------------------------------------------------------

/// Whether each side of the account can fund one trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FundingCode {
    /// 22: both assets sufficient.
    BothSufficient,
    /// 12: base asset short.
    BaseShort,
    /// 21: quote asset short.
    QuoteShort,
    /// 11: both short.
    BothShort,
}

impl FundingCode {
    pub fn from_flags(base_ok: bool, quote_ok: bool) -> Self {
        match (base_ok, quote_ok) {
            (true, true) => FundingCode::BothSufficient,
            (false, true) => FundingCode::BaseShort,
            (true, false) => FundingCode::QuoteShort,
            (false, false) => FundingCode::BothShort,
        }
    }

    /// Base covers `trade_amount`; quote covers `ask_price * trade_amount`.
    pub fn assess(base: f64, quote: f64, ask_price: f64, trade_amount: f64) -> Self {
        Self::from_flags(base >= trade_amount, quote >= ask_price * trade_amount)
    }

    /// 20 or 10.
    pub fn base_flag(&self) -> u8 {
        match self {
            FundingCode::BothSufficient | FundingCode::QuoteShort => 20,
            FundingCode::BaseShort | FundingCode::BothShort => 10,
        }
    }

    /// 2 or 1.
    pub fn quote_flag(&self) -> u8 {
        match self {
            FundingCode::BothSufficient | FundingCode::BaseShort => 2,
            FundingCode::QuoteShort | FundingCode::BothShort => 1,
        }
    }

    pub fn code(&self) -> u8 {
        self.base_flag() + self.quote_flag()
    }
}

impl fmt::Display for FundingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// Balance check dispatch
// ---------------------------------------------------------------------------

/// What the balance check hands off to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckDispatch {
    Trade,
    Rebalance,
    Nothing,
}

pub fn dispatch_for(code: FundingCode, rebalancing_enabled: bool) -> CheckDispatch {
    match code {
        FundingCode::BothSufficient => CheckDispatch::Trade,
        _ if rebalancing_enabled => CheckDispatch::Rebalance,
        _ => CheckDispatch::Nothing,
    }
}

// ---------------------------------------------------------------------------
// Rebalance planning
// ---------------------------------------------------------------------------

/// Cached account numbers, as of the last successful balance check.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Funds {
    pub base_total: f64,
    pub base_available: f64,
    pub quote_total: f64,
    pub quote_available: f64,
    pub ask_price: f64,
    pub bid_price: f64,
}

/// Sizing knobs for the balancer, as fractions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RebalanceParams {
    pub trade_amount: f64,
    /// Share of the trade amount used for a replenishment order.
    pub balance_fraction: f64,
    /// Factor the trade amount shrinks to when both sides are short.
    pub shrink_fraction: f64,
}

/// The balancer's decision for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RebalancePlan {
    /// Buy `amount` base at the current ask.
    Buy { amount: f64 },
    /// Sell `amount` base at the current bid.
    Sell { amount: f64 },
    /// Not enough available quote to buy; cancel ask orders first.
    CancelAsks { needed: f64, available: f64 },
    /// Not enough available base to sell; cancel bid orders first.
    CancelBids { needed: f64, available: f64 },
    /// Totals are fine; clear resting orders and resume scaled trading.
    CancelAllAndTrade,
    /// Both totals short; shrink the trade size for good.
    ShrinkTradeAmount { from: f64, to: f64 },
}

/// Decide how to restore inventory from cached totals and prices.
pub fn plan_rebalance(funds: &Funds, params: &RebalanceParams) -> (FundingCode, RebalancePlan) {
    let amount = params.trade_amount;
    let code = FundingCode::assess(funds.base_total, funds.quote_total, funds.ask_price, amount);

    let plan = match code {
        FundingCode::BaseShort => {
            let needed = funds.ask_price * amount * params.balance_fraction;
            if funds.quote_available < needed {
                RebalancePlan::CancelAsks {
                    needed,
                    available: funds.quote_available,
                }
            } else {
                RebalancePlan::Buy {
                    amount: amount * params.balance_fraction,
                }
            }
        }
        FundingCode::QuoteShort => {
            let needed = amount * params.balance_fraction;
            if funds.base_available < needed {
                RebalancePlan::CancelBids {
                    needed,
                    available: funds.base_available,
                }
            } else {
                RebalancePlan::Sell { amount: needed }
            }
        }
        FundingCode::BothSufficient => RebalancePlan::CancelAllAndTrade,
        FundingCode::BothShort => RebalancePlan::ShrinkTradeAmount {
            from: amount,
            to: amount * params.shrink_fraction,
        },
    };

    (code, plan)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
