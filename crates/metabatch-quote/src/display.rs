//! Human-readable fee amounts.
//!
//! display = payment / 10^decimals, rounded half-up to 8 decimal places,
//! computed entirely in integers. The raw payment stays authoritative; this
//! value is only ever shown to the user.

use std::fmt;

use alloy_primitives::{U256, U512};
use serde::{Serialize, Serializer};

/// Fixed display precision.
pub const DISPLAY_DECIMALS: u32 = 8;

// Past this many token decimals every U256 payment rounds to zero.
const MAX_SIGNIFICANT_DECIMALS: u8 = 100;

/// A non-negative amount with exactly 8 fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisplayAmount {
    /// Amount in units of 10^-8.
    scaled: U512,
}

impl DisplayAmount {
    pub fn zero() -> Self {
        Self { scaled: U512::ZERO }
    }

    /// Amount in units of 10^-8.
    pub fn scaled(&self) -> U512 {
        self.scaled
    }
}

impl fmt::Display for DisplayAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = pow10(DISPLAY_DECIMALS as u8);
        let whole = self.scaled / unit;
        let frac = (self.scaled % unit).to::<u64>();
        write!(f, "{}.{:08}", whole, frac)
    }
}

impl Serialize for DisplayAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn pow10(exp: u8) -> U512 {
    U512::from(10u64).pow(U512::from(exp))
}

/// Convert a raw token payment to its display amount.
pub fn display_amount(payment: U256, decimals: u8) -> DisplayAmount {
    if decimals > MAX_SIGNIFICANT_DECIMALS {
        return DisplayAmount::zero();
    }
    let payment = U512::from_be_slice(&payment.to_be_bytes::<32>());
    let denom = pow10(decimals);
    let numerator = payment * pow10(DISPLAY_DECIMALS as u8) + denom / U512::from(2u64);
    DisplayAmount { scaled: numerator / denom }
}
