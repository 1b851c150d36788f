//! Deal sizing and pricing.
//!
//! Payloads are stored as pieces whose padded size is a power of two. The
//! padding scheme keeps 127 payload bytes in every 128 bytes of piece, so a
//! piece holds `padded * 127 / 128` bytes of data. The padded size also
//! selects the sector size tier used for pricing.

use autodeal_types::TokenAmount;
use thiserror::Error;

/// Smallest padded piece size the node accepts (256 KiB).
pub const MIN_PIECE_SIZE: u64 = 256 * 1024;

/// Bytes per GiB, the unit prices are quoted in.
pub const BYTES_PER_GIB: u64 = 1 << 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizingError {
    #[error("file size {0} is not positive")]
    NonPositive(i64),

    #[error("file size {0} is too large for any piece")]
    TooLarge(i64),
}

/// Padded piece size for a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PieceSize(u64);

impl PieceSize {
    /// Padded size in bytes, always a power of two.
    pub fn padded(&self) -> u64 {
        self.0
    }

    /// Payload capacity of the piece.
    pub fn unpadded(&self) -> u64 {
        self.0 - self.0 / 128
    }

    /// Sector size tier, in bytes, used for pricing.
    pub fn sector_size(&self) -> u64 {
        self.0
    }
}

/// Size of the padded payload before rounding up to a power of two.
pub fn padded_size(raw_size: u64) -> Option<u64> {
    raw_size.checked_mul(128).map(|n| n.div_ceil(127))
}

/// Smallest power-of-two piece (at least [`MIN_PIECE_SIZE`]) holding
/// `raw_size` bytes once padded.
pub fn compute_piece_size(raw_size: i64) -> Result<PieceSize, SizingError> {
    if raw_size <= 0 {
        return Err(SizingError::NonPositive(raw_size));
    }

    let padded = padded_size(raw_size as u64).ok_or(SizingError::TooLarge(raw_size))?;
    padded
        .max(MIN_PIECE_SIZE)
        .checked_next_power_of_two()
        .map(PieceSize)
        .ok_or(SizingError::TooLarge(raw_size))
}

/// Cost of a deal: sector size in GiB times the price per GiB.
///
/// Integer arithmetic in atto-units, rounded half up, saturating at the
/// largest representable amount.
pub fn compute_cost(sector_size: u64, price_per_gib: TokenAmount) -> TokenAmount {
    let numerator = price_per_gib.as_atto().saturating_mul(sector_size as u128);
    let gib = BYTES_PER_GIB as u128;
    let quotient = numerator / gib;
    let remainder = numerator % gib;
    let rounded = if remainder >= gib - remainder {
        quotient.saturating_add(1)
    } else {
        quotient
    };
    TokenAmount::from_atto(rounded)
}


#[cfg(test)]
mod proptest_sizing {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn piece_is_power_of_two_and_fits(raw in 1i64..(1i64 << 50)) {
            let piece = compute_piece_size(raw).unwrap();
            let padded = padded_size(raw as u64).unwrap();

            prop_assert!(piece.padded().is_power_of_two());
            prop_assert!(piece.padded() >= MIN_PIECE_SIZE);
            prop_assert!(piece.padded() >= padded);
            prop_assert!(piece.unpadded() >= raw as u64);
        }

        #[test]
        fn piece_is_smallest_fitting_power(raw in 1i64..(1i64 << 50)) {
            let piece = compute_piece_size(raw).unwrap();
            let padded = padded_size(raw as u64).unwrap();
            let half = piece.padded() / 2;

            prop_assert!(half < MIN_PIECE_SIZE || half < padded);
        }

        #[test]
        fn cost_is_deterministic(sector in any::<u64>(), atto in any::<u64>()) {
            let price = TokenAmount::from_atto(atto as u128);
            prop_assert_eq!(compute_cost(sector, price), compute_cost(sector, price));
        }

        #[test]
        fn cost_is_monotonic(
            sector in 0u64..(1u64 << 50),
            extra_sector in 0u64..(1u64 << 40),
            atto in 0u128..(1u128 << 80),
            extra_atto in 0u128..(1u128 << 60),
        ) {
            let price = TokenAmount::from_atto(atto);
            let higher_price = TokenAmount::from_atto(atto + extra_atto);
            let base = compute_cost(sector, price);

            prop_assert!(compute_cost(sector + extra_sector, price) >= base);
            prop_assert!(compute_cost(sector, higher_price) >= base);
        }
    }
}
