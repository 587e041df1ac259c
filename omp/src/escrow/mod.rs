//! Mutually-assured-destruction escrow rules.
//!
//! Both parties lock funds into a 2-of-2 output: the buyer the price,
//! shipping and a bond, the seller a bond. Neither can move the funds alone.
//! If they never agree on release or refund, either side can burn everything
//! once the destroy time lock expires, so stalling costs both bonds.

pub mod mad;

pub use mad::{EscrowTerms, Split};

use crate::error::{OmpError, OmpResult};
use crate::marketplace::{Cryptocurrency, EscrowConfig, EscrowType, OutputType};

/// Output types used by each part of the escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputTypes {
    /// Funding inputs and change outputs.
    pub funding: OutputType,
    /// The 2-of-2 escrow output.
    pub escrow: OutputType,
    /// Release and refund outputs.
    pub settlement: OutputType,
}

/// Fail unless the engine implements `escrow_type`.
pub fn ensure_supported(escrow_type: EscrowType) -> OmpResult<()> {
    match escrow_type {
        EscrowType::Mad | EscrowType::MadCt => Ok(()),
        EscrowType::Multisig | EscrowType::Fe => Err(OmpError::UnsupportedEscrowType(escrow_type)),
    }
}

/// Output types for an escrow configuration on `currency`.
///
/// `MAD` is transparent throughout. `MAD_CT` blinds inputs, change and the
/// escrow output; settlements use the listing's `releaseType`, blind unless
/// anonymous outputs were asked for.
pub fn output_types(config: &EscrowConfig, currency: Cryptocurrency) -> OmpResult<OutputTypes> {
    ensure_supported(config.escrow_type)?;
    match config.escrow_type {
        EscrowType::MadCt => {
            if !currency.supports_confidential() {
                return Err(OmpError::InvalidListing(format!(
                    "{currency} has no confidential outputs for MAD_CT"
                )));
            }
            let settlement = match config.release_type {
                None | Some(OutputType::Blind) => OutputType::Blind,
                Some(OutputType::Anon) => OutputType::Anon,
                Some(OutputType::Part) => {
                    return Err(OmpError::InvalidListing(
                        "MAD_CT releaseType must be BLIND or ANON".into(),
                    ))
                }
            };
            Ok(OutputTypes {
                funding: OutputType::Blind,
                escrow: OutputType::Blind,
                settlement,
            })
        }
        _ => match config.release_type {
            None | Some(OutputType::Part) => Ok(OutputTypes {
                funding: OutputType::Part,
                escrow: OutputType::Part,
                settlement: OutputType::Part,
            }),
            Some(other) => Err(OmpError::InvalidListing(format!(
                "MAD escrow cannot release to {other} outputs"
            ))),
        },
    }
}
