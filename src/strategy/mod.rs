//! Trading decisions as pure functions.
//!
//! Nothing here touches the network or shared state; the engine's duties
//! gather inputs, call into these modules, and act on the result.

pub mod funding;
pub mod pricing;
pub mod quota;
pub mod staleness;

pub use funding::{
    dispatch_for, plan_rebalance, CheckDispatch, FundingCode, Funds, RebalanceParams,
    RebalancePlan,
};
