//! One-time starting bonus
//!
//! An identity that has never appeared in the ledger may claim coins from
//! the house once. With the die enabled the amount is a six-sided roll
//! times the per-pip amount; otherwise it is the flat amount.

use cs_ledger::identity_digest;
use rand::Rng;

use crate::context::CasinoContext;
use crate::error::CasinoResult;

/// Ledger method tag for starting bonuses
pub const STARTING_BONUS_METHOD: &str = "starting_bonus";

/// Why a bonus was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonusRejection {
    /// The identity already has ledger history
    AlreadyRegistered,
    /// A play or claim for the identity is in flight
    Busy,
}

/// A granted bonus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BonusAward {
    /// Die face, when the die is enabled
    pub die: Option<u8>,
    pub amount: u64,
    pub block_index: u64,
}

/// Roll a six-sided die
pub fn roll_die<R: Rng>(rng: &mut R) -> u8 {
    rng.random_range(1..=6)
}

/// Grant the starting bonus to `user_id` if they have never been seen
pub fn claim_starting_bonus<R: Rng>(
    ctx: &CasinoContext,
    user_id: &str,
    rng: &mut R,
) -> CasinoResult<Result<BonusAward, BonusRejection>> {
    let digest = identity_digest(user_id);
    let Some(_guard) = ctx.plays().reserve(&digest, ctx.settings().play_wait()) else {
        return Ok(Err(BonusRejection::Busy));
    };

    if ctx.get_balance(&digest)?.is_some() {
        return Ok(Err(BonusRejection::AlreadyRegistered));
    }

    let settings = ctx.settings();
    let (die, amount) = if ctx.machine().config().starting_bonus_die_enabled {
        let face = roll_die(rng);
        (Some(face), u64::from(face).saturating_mul(settings.starting_bonus_per_pip))
    } else {
        (None, settings.starting_bonus_flat)
    };

    let block = ctx.add_block_transaction(ctx.house(), &digest, amount, STARTING_BONUS_METHOD)?;
    log::info!("Starting bonus of {} granted (die {:?})", amount, die);

    Ok(Ok(BonusAward {
        die,
        amount,
        block_index: block.index,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CasinoError;
    use crate::settings::CasinoSettings;
    use cs_ledger::LedgerError;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_die_faces_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut seen = [false; 6];
        for _ in 0..500 {
            let face = roll_die(&mut rng);
            assert!((1..=6).contains(&face));
            seen[usize::from(face) - 1] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_bonus_once_per_identity() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = CasinoContext::open(CasinoSettings::in_dir(dir.path())).unwrap();
        let mut rng = StdRng::seed_from_u64(9);

        let award = claim_starting_bonus(&ctx, "alice", &mut rng).unwrap().unwrap();
        let face = award.die.unwrap();
        assert_eq!(award.amount, u64::from(face) * 100);
        assert_eq!(
            ctx.get_balance(&identity_digest("alice")).unwrap(),
            Some(award.amount as i64)
        );

        assert_eq!(
            claim_starting_bonus(&ctx, "alice", &mut rng).unwrap(),
            Err(BonusRejection::AlreadyRegistered)
        );
    }

    #[test]
    fn test_flat_bonus_without_die() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = CasinoContext::open(CasinoSettings::in_dir(dir.path())).unwrap();
        let mut config = ctx.machine().config();
        config.starting_bonus_die_enabled = false;
        config.save(ctx.machine().path()).unwrap();
        ctx.machine().reload().unwrap();

        let mut rng = StdRng::seed_from_u64(3);
        let award = claim_starting_bonus(&ctx, "bob", &mut rng).unwrap().unwrap();
        assert_eq!(award.die, None);
        assert_eq!(award.amount, 350);
    }

    #[test]
    fn test_oversized_bonus_refused() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CasinoSettings {
            starting_bonus_per_pip: u64::MAX,
            ..CasinoSettings::in_dir(dir.path())
        };
        let ctx = CasinoContext::open(settings).unwrap();
        let blocks = ctx.chain().len().unwrap();
        let mut rng = StdRng::seed_from_u64(5);

        let err = claim_starting_bonus(&ctx, "carl", &mut rng).unwrap_err();
        assert!(matches!(err, CasinoError::Ledger(LedgerError::AmountOutOfRange(u64::MAX))));
        assert_eq!(ctx.chain().len().unwrap(), blocks);
        assert_eq!(ctx.get_balance(&identity_digest("carl")).unwrap(), None);
        assert!(!ctx.plays().is_playing(&identity_digest("carl")));
    }
}
