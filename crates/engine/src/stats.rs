//! Per-player betting statistics

use dicebank_core::{Amount, BetRecord, BetStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub total_bets: u64,
    pub wins: u64,
    pub total_wagered: Amount,
    pub total_won: Amount,
    pub biggest_win: Amount,
    /// Percentage of settled bets won, two decimal places
    pub win_rate: Decimal,
    /// Payouts minus stakes, in whole coins; negative when down
    pub profit: Decimal,
}

impl PlayerStats {
    /// Aggregate over settled bets; pending and failed bets are ignored
    pub fn from_bets<'a>(bets: impl IntoIterator<Item = &'a BetRecord>) -> Self {
        let mut stats = Self::default();

        for bet in bets.into_iter().filter(|b| b.status == BetStatus::Settled) {
            stats.total_bets += 1;
            stats.total_wagered = capped_add(stats.total_wagered, bet.stake, "total_wagered");
            if bet.is_win() {
                stats.wins += 1;
                stats.total_won = capped_add(stats.total_won, bet.payout, "total_won");
                stats.biggest_win = stats.biggest_win.max(bet.payout);
            }
        }

        if stats.total_bets > 0 {
            stats.win_rate = (Decimal::from(stats.wins) * Decimal::ONE_HUNDRED
                / Decimal::from(stats.total_bets))
            .round_dp(2);
        }
        stats.profit = stats.total_won.to_decimal() - stats.total_wagered.to_decimal();
        stats
    }
}

fn capped_add(total: Amount, amount: Amount, field: &'static str) -> Amount {
    total.checked_add(amount).unwrap_or_else(|| {
        tracing::warn!(field, total = %total, amount = %amount, "Stats total overflowed, capping");
        Amount::from_minor(u64::MAX)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicebank_core::{BetId, UserKey};
    use rust_decimal_macros::dec;

    fn settled(stake: u64, prediction: u8, outcome: u8, payout: u64) -> BetRecord {
        let mut bet = BetRecord::new(
            BetId::generate(),
            UserKey::from("alice"),
            Amount::from_whole(stake).unwrap(),
            prediction,
            "seed".into(),
        );
        bet.outcome = Some(outcome);
        bet.payout = Amount::from_whole(payout).unwrap();
        bet.status = BetStatus::Settled;
        bet
    }

    #[test]
    fn test_empty_history() {
        let stats = PlayerStats::from_bets(&Vec::<BetRecord>::new());
        assert_eq!(stats.total_bets, 0);
        assert_eq!(stats.win_rate, Decimal::ZERO);
        assert_eq!(stats.profit, Decimal::ZERO);
    }

    #[test]
    fn test_mixed_history() {
        let mut failed = settled(50, 1, 1, 0);
        failed.status = BetStatus::Failed;

        let bets = vec![
            settled(2, 4, 4, 11),
            settled(2, 3, 5, 0),
            settled(4, 6, 6, 22),
            failed,
        ];
        let stats = PlayerStats::from_bets(&bets);

        assert_eq!(stats.total_bets, 3);
        assert_eq!(stats.wins, 2);
        assert_eq!(stats.total_wagered, Amount::from_whole(8).unwrap());
        assert_eq!(stats.total_won, Amount::from_whole(33).unwrap());
        assert_eq!(stats.biggest_win, Amount::from_whole(22).unwrap());
        assert_eq!(stats.win_rate, dec!(66.67));
        assert_eq!(stats.profit, dec!(25));
    }

    #[test]
    fn test_overflowing_totals_are_capped() {
        let mut huge = settled(1, 2, 2, 1);
        huge.stake = Amount::from_minor(u64::MAX);
        huge.payout = Amount::from_minor(u64::MAX);
        let stats = PlayerStats::from_bets(&vec![huge.clone(), huge]);

        assert_eq!(stats.total_bets, 2);
        assert_eq!(stats.total_wagered, Amount::from_minor(u64::MAX));
        assert_eq!(stats.total_won, Amount::from_minor(u64::MAX));
    }

    #[test]
    fn test_losing_streak_profit_negative() {
        let bets = vec![settled(3, 1, 2, 0), settled(1, 1, 3, 0)];
        let stats = PlayerStats::from_bets(&bets);
        assert_eq!(stats.profit, dec!(-4));
        assert_eq!(stats.biggest_win, Amount::ZERO);
    }
}
