//! Piecewise-linear functions of the wager
//!
//! Within one fee tier (and one side of the jackpot threshold) every fee,
//! payout and expectation is `slope · wager + intercept` with exact
//! rational coefficients. The expected return of the whole machine is a
//! list of such pieces covering `1..`.

use std::fmt;
use std::ops::{Add, Mul, Sub};

use num_rational::BigRational;
use num_traits::Zero;

use crate::fees::FeeTier;
use crate::rational::{int, zero};

/// `slope · wager + intercept`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linear {
    pub slope: BigRational,
    pub intercept: BigRational,
}

impl Linear {
    pub fn new(slope: BigRational, intercept: BigRational) -> Self {
        Self { slope, intercept }
    }

    pub fn constant(value: BigRational) -> Self {
        Self::new(zero(), value)
    }

    pub fn proportional(slope: BigRational) -> Self {
        Self::new(slope, zero())
    }

    /// The wager itself
    pub fn wager() -> Self {
        Self::proportional(int(1))
    }

    pub fn zero() -> Self {
        Self::new(zero(), zero())
    }

    pub fn eval(&self, wager: u64) -> BigRational {
        &self.slope * int(wager) + &self.intercept
    }
}

impl Add for Linear {
    type Output = Linear;

    fn add(self, rhs: Linear) -> Linear {
        Linear::new(self.slope + rhs.slope, self.intercept + rhs.intercept)
    }
}

impl Sub for Linear {
    type Output = Linear;

    fn sub(self, rhs: Linear) -> Linear {
        Linear::new(self.slope - rhs.slope, self.intercept - rhs.intercept)
    }
}

impl Mul<&BigRational> for Linear {
    type Output = Linear;

    fn mul(self, rhs: &BigRational) -> Linear {
        Linear::new(self.slope * rhs, self.intercept * rhs)
    }
}

impl fmt::Display for Linear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.slope.is_zero(), self.intercept.is_zero()) {
            (true, _) => write!(f, "{}", self.intercept),
            (false, true) => write!(f, "{}·w", self.slope),
            (false, false) => write!(f, "{}·w + {}", self.slope, self.intercept),
        }
    }
}

/// One wager interval of the expected-return function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    /// First wager covered
    pub start: u64,
    /// Last wager covered, `None` if unbounded
    pub end: Option<u64>,
    pub tier: FeeTier,
    pub jackpot_fee_paid: bool,
    pub expected_total_return: Linear,
}

impl Piece {
    pub fn contains(&self, wager: u64) -> bool {
        wager >= self.start && self.end.is_none_or(|end| wager <= end)
    }

    /// Expected total return minus the wager
    pub fn expected_return(&self) -> Linear {
        self.expected_total_return.clone() - Linear::wager()
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) if end == self.start => write!(f, "w = {}", self.start)?,
            Some(end) => write!(f, "{} ≤ w ≤ {}", self.start, end)?,
            None => write!(f, "w ≥ {}", self.start)?,
        }
        write!(f, " ({}", self.tier)?;
        if self.jackpot_fee_paid {
            write!(f, ", jackpot")?;
        }
        write!(f, "): {}", self.expected_total_return)
    }
}

/// Expected total return over every wager, ordered by `start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiecewiseReturn {
    pieces: Vec<Piece>,
}

impl PiecewiseReturn {
    pub fn new(mut pieces: Vec<Piece>) -> Self {
        pieces.sort_by_key(|p| p.start);
        Self { pieces }
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    pub fn piece_for(&self, wager: u64) -> Option<&Piece> {
        self.pieces.iter().find(|p| p.contains(wager))
    }

    pub fn expected_total_return(&self, wager: u64) -> Option<BigRational> {
        self.piece_for(wager)
            .map(|p| p.expected_total_return.eval(wager))
    }

    pub fn expected_return(&self, wager: u64) -> Option<BigRational> {
        self.expected_total_return(wager).map(|total| total - int(wager))
    }
}
