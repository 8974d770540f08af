//! Simulated Trading Account
//!
//! Cash, holdings and running statistics for one environment instance.

use crate::rl::core::{ActionKind, TradeAction};

/// Result of applying one action to the account
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Fill {
    /// Shares bought (positive) or sold (negative)
    pub shares: f64,
    /// Transaction cost paid
    pub fee: f64,
}

impl Fill {
    pub fn is_empty(&self) -> bool {
        self.shares == 0.0
    }
}

/// Per-episode account state
///
/// Clamp policy: a buy spends at most `amount` of the cash balance
/// *including* fees, a sell liquidates at most `amount` of the holdings.
/// Neither the balance nor the holdings can go negative.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    initial_balance: f64,
    balance: f64,
    shares_held: f64,
    /// Average price paid for the shares currently held
    cost_basis: f64,
    total_shares_sold: f64,
    total_sales_value: f64,
    total_fees: f64,
    net_worth: f64,
    max_net_worth: f64,
    /// Price the account was last valued at
    last_price: f64,
    num_trades: usize,
    net_worth_history: Vec<f64>,
}

impl Account {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            initial_balance,
            balance: initial_balance,
            shares_held: 0.0,
            cost_basis: 0.0,
            total_shares_sold: 0.0,
            total_sales_value: 0.0,
            total_fees: 0.0,
            net_worth: initial_balance,
            max_net_worth: initial_balance,
            last_price: 0.0,
            num_trades: 0,
            net_worth_history: vec![initial_balance],
        }
    }

    /// Restore the opening state of an episode
    pub fn reset(&mut self) {
        *self = Self::new(self.initial_balance);
    }

    /// Apply a trade at `price`, charging `transaction_cost` of notional,
    /// then revalue the account at that price.
    pub fn execute(&mut self, action: TradeAction, price: f64, transaction_cost: f64) -> Fill {
        let amount = f64::from(action.amount).clamp(0.0, 1.0);

        let fill = match action.kind {
            ActionKind::Buy => self.buy(amount, price, transaction_cost),
            ActionKind::Sell => self.sell(amount, price, transaction_cost),
            ActionKind::Hold => Fill::default(),
        };

        if !fill.is_empty() {
            self.num_trades += 1;
            self.total_fees += fill.fee;
        }
        self.mark(price);
        fill
    }

    fn buy(&mut self, amount: f64, price: f64, fee_rate: f64) -> Fill {
        let budget = self.balance * amount;
        let shares = budget / (price * (1.0 + fee_rate));
        if shares <= 0.0 || !shares.is_finite() {
            return Fill::default();
        }

        let cost = shares * price;
        let fee = cost * fee_rate;
        let prev_cost = self.cost_basis * self.shares_held;

        self.balance = (self.balance - cost - fee).max(0.0);
        self.cost_basis = (prev_cost + cost) / (self.shares_held + shares);
        self.shares_held += shares;

        Fill {
            shares,
            fee,
        }
    }

    fn sell(&mut self, amount: f64, price: f64, fee_rate: f64) -> Fill {
        let shares = self.shares_held * amount;
        if shares <= 0.0 {
            return Fill::default();
        }

        let proceeds = shares * price;
        let fee = proceeds * fee_rate;

        self.balance += proceeds - fee;
        self.shares_held = (self.shares_held - shares).max(0.0);
        self.total_shares_sold += shares;
        self.total_sales_value += proceeds;

        Fill {
            shares: -shares,
            fee,
        }
    }

    /// Revalue holdings at `price`
    pub fn mark(&mut self, price: f64) {
        self.last_price = price;
        self.net_worth = self.balance + self.shares_held * price;
        if self.net_worth > self.max_net_worth {
            self.max_net_worth = self.net_worth;
        }
        if self.shares_held == 0.0 {
            self.cost_basis = 0.0;
        }
        self.net_worth_history.push(self.net_worth);
    }

    /// `net_worth == balance + shares_held * last_price` within `tolerance`
    pub fn is_consistent(&self, tolerance: f64) -> bool {
        let expected = self.balance + self.shares_held * self.last_price;
        (self.net_worth - expected).abs() <= tolerance * expected.abs().max(1.0)
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn shares_held(&self) -> f64 {
        self.shares_held
    }

    pub fn cost_basis(&self) -> f64 {
        self.cost_basis
    }

    pub fn total_shares_sold(&self) -> f64 {
        self.total_shares_sold
    }

    pub fn total_sales_value(&self) -> f64 {
        self.total_sales_value
    }

    pub fn total_fees(&self) -> f64 {
        self.total_fees
    }

    pub fn net_worth(&self) -> f64 {
        self.net_worth
    }

    pub fn max_net_worth(&self) -> f64 {
        self.max_net_worth
    }

    pub fn last_price(&self) -> f64 {
        self.last_price
    }

    pub fn num_trades(&self) -> usize {
        self.num_trades
    }

    pub fn profit(&self) -> f64 {
        self.net_worth - self.initial_balance
    }

    pub fn net_worth_history(&self) -> &[f64] {
        &self.net_worth_history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_all_then_sell_all_round_trip() {
        let mut account = Account::new(1000.0);
        let fill = account.execute(TradeAction::buy(1.0), 10.0, 0.0);

        assert!((fill.shares - 100.0).abs() < 1e-9);
        assert!(account.balance().abs() < 1e-9);
        assert!((account.net_worth() - 1000.0).abs() < 1e-9);
        assert_eq!(account.cost_basis(), 10.0);

        account.execute(TradeAction::sell(1.0), 12.0, 0.0);
        assert!((account.balance() - 1200.0).abs() < 1e-9);
        assert_eq!(account.shares_held(), 0.0);
        assert_eq!(account.cost_basis(), 0.0);
        assert_eq!(account.num_trades(), 2);
        assert!((account.total_sales_value() - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn test_buy_with_fee_never_overdraws() {
        let mut account = Account::new(1000.0);
        account.execute(TradeAction::buy(1.0), 10.0, 0.01);

        assert!(account.balance() >= 0.0);
        assert!(account.balance() < 1e-9);
        assert!((account.total_fees() + account.shares_held() * 10.0 - 1000.0).abs() < 1e-6);
        assert!(account.is_consistent(1e-9));
    }

    #[test]
    fn test_sell_without_holdings_is_noop() {
        let mut account = Account::new(1000.0);
        let fill = account.execute(TradeAction::sell(1.0), 10.0, 0.0);
        assert!(fill.is_empty());
        assert_eq!(account.num_trades(), 0);
        assert_eq!(account.balance(), 1000.0);
    }

    #[test]
    fn test_cost_basis_is_weighted_average() {
        let mut account = Account::new(1000.0);
        account.execute(TradeAction::buy(0.5), 10.0, 0.0); // 50 shares @ 10
        account.execute(TradeAction::buy(1.0), 20.0, 0.0); // 25 shares @ 20
        assert!((account.shares_held() - 75.0).abs() < 1e-9);
        assert!((account.cost_basis() - 1000.0 / 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_max_net_worth_tracks_peak() {
        let mut account = Account::new(100.0);
        account.execute(TradeAction::buy(1.0), 1.0, 0.0);
        account.mark(2.0);
        account.mark(1.5);
        assert_eq!(account.max_net_worth(), 200.0);
        assert_eq!(account.net_worth(), 150.0);
    }

    #[test]
    fn test_reset_restores_opening_state() {
        let mut account = Account::new(500.0);
        account.execute(TradeAction::buy(0.3), 7.0, 0.002);
        account.reset();
        assert_eq!(account, Account::new(500.0));
    }
}
