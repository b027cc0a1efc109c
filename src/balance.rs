/// ENFORCED BALANCE TYPE - Used by the talent ledger
///
/// This is the SINGLE source of truth for balance operations.
/// ALL balance mutations MUST go through these methods.
///
/// # Enforcement Strategy:
/// 1. Fields are PRIVATE - no direct access
/// 2. All mutations return Result - errors are explicit
/// 3. Version auto-increments - audit trail
/// 4. checked_add/sub - overflow and underflow protection
use serde::{Deserialize, Serialize};

use crate::core_types::Talents;

/// Talent balance of a single user
///
/// # Invariants (ENFORCED by private fields):
/// - Balance is never negative (unsigned + checked subtraction)
/// - No overflow/underflow (checked arithmetic)
/// - Version increments on every successful mutation
///
/// There is intentionally no reserved/escrow field: the insufficient-funds
/// check happens inside the ledger's atomic transfer, under the same lock
/// that applies the debit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TalentBalance {
    talents: Talents, // PRIVATE - ONLY modified through credit/debit
    version: u64,     // PRIVATE - incremented on every mutation
}

impl TalentBalance {
    /// Create a balance holding the given number of talents
    pub fn with_talents(talents: Talents) -> Self {
        Self {
            talents,
            version: 0,
        }
    }

    /// Current talent balance (read-only)
    #[inline(always)]
    pub const fn talents(&self) -> Talents {
        self.talents
    }

    /// Mutation version (read-only)
    #[inline(always)]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Credit talents to this balance
    ///
    /// # Errors
    /// Returns an error on overflow.
    pub fn credit(&mut self, amount: Talents) -> Result<(), &'static str> {
        self.talents = self
            .talents
            .checked_add(amount)
            .ok_or("Credit overflow")?;
        self.version = self.version.wrapping_add(1);
        Ok(())
    }

    /// Debit talents from this balance
    ///
    /// # Errors
    /// Returns an error when the balance holds fewer talents than `amount`.
    /// The balance is left untouched on failure.
    pub fn debit(&mut self, amount: Talents) -> Result<(), &'static str> {
        self.talents = self
            .talents
            .checked_sub(amount)
            .ok_or("Insufficient talents")?;
        self.version = self.version.wrapping_add(1);
        Ok(())
    }

    /// Check whether a debit of `amount` would succeed
    #[inline(always)]
    pub const fn can_debit(&self, amount: Talents) -> bool {
        self.talents >= amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_increases_balance_and_version() {
        let mut b = TalentBalance::default();
        b.credit(100).unwrap();
        assert_eq!(b.talents(), 100);
        assert_eq!(b.version(), 1);
    }

    #[test]
    fn debit_decreases_balance() {
        let mut b = TalentBalance::with_talents(100);
        b.debit(40).unwrap();
        assert_eq!(b.talents(), 60);
    }

    #[test]
    fn debit_beyond_balance_fails_and_leaves_state() {
        let mut b = TalentBalance::with_talents(10);
        let v = b.version();
        assert!(b.debit(11).is_err());
        assert_eq!(b.talents(), 10);
        assert_eq!(b.version(), v);
    }

    #[test]
    fn debit_exact_balance_reaches_zero() {
        let mut b = TalentBalance::with_talents(15);
        b.debit(15).unwrap();
        assert_eq!(b.talents(), 0);
    }

    #[test]
    fn credit_overflow_fails() {
        let mut b = TalentBalance::with_talents(u64::MAX);
        assert!(b.credit(1).is_err());
        assert_eq!(b.talents(), u64::MAX);
    }

    #[test]
    fn can_debit_is_consistent_with_debit() {
        let b = TalentBalance::with_talents(20);
        assert!(b.can_debit(20));
        assert!(!b.can_debit(21));
    }
}
