//! Deal submission parameters.
//!
//! [`DealDefaults`] are the process-wide settings read from the config file.
//! A [`DealConfig`] is derived from them per task by merging in the task's
//! own metadata, and must pass [`DealConfig::validate`] before any proposal.

use crate::{Task, TaskType, TokenAmount};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chain epochs per hour (30 second block time).
pub const EPOCHS_PER_HOUR: i64 = 120;

/// Shortest deal duration the network accepts, in epochs (180 days).
pub const MIN_DURATION_EPOCHS: i64 = 518_400;

/// Longest deal duration the network accepts, in epochs (~535 days).
pub const MAX_DURATION_EPOCHS: i64 = 1_540_000;

/// Reasons a [`DealConfig`] is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("sender wallet is required")]
    MissingSenderWallet,

    #[error("task {task} has no provider assigned")]
    MissingProvider { task: String },

    #[error("price per GiB must be positive")]
    ZeroPrice,

    #[error("price {price} exceeds task maximum {max_price}")]
    PriceAboveMax {
        price: TokenAmount,
        max_price: TokenAmount,
    },

    #[error(
        "duration {duration} epochs outside [{}, {}]",
        MIN_DURATION_EPOCHS,
        MAX_DURATION_EPOCHS
    )]
    DurationOutOfRange { duration: i64 },

    #[error("start epoch offset must be at least one hour")]
    InvalidStartOffset,

    #[error("deals need interactive confirmation, which unattended runs cannot give")]
    ConfirmationRequired,
}

/// Process-wide deal defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealDefaults {
    /// Wallet address the proposals are sent from.
    pub sender_wallet: String,
    /// Price per GiB of sector size.
    pub price_per_gib: TokenAmount,
    /// Hours between now and the requested deal start.
    #[serde(default = "default_start_epoch_hours")]
    pub start_epoch_hours: i64,
    /// Deal duration in epochs.
    #[serde(default = "default_duration_epochs")]
    pub duration_epochs: i64,
    #[serde(default)]
    pub verified_deal: bool,
    #[serde(default = "default_true")]
    pub fast_retrieval: bool,
    /// Send proposals without an interactive confirmation step. Unattended
    /// runs require this to stay `true`.
    #[serde(default = "default_true")]
    pub skip_confirmation: bool,
}

fn default_start_epoch_hours() -> i64 {
    96
}

fn default_duration_epochs() -> i64 {
    1_512_000
}

fn default_true() -> bool {
    true
}

impl Default for DealDefaults {
    fn default() -> Self {
        Self {
            sender_wallet: String::new(),
            price_per_gib: TokenAmount::ZERO,
            start_epoch_hours: default_start_epoch_hours(),
            duration_epochs: default_duration_epochs(),
            verified_deal: false,
            fast_retrieval: true,
            skip_confirmation: true,
        }
    }
}

/// Submission parameters for the offers of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealConfig {
    pub verified_deal: bool,
    pub fast_retrieval: bool,
    /// Must be `true`; see [`ConfigError::ConfirmationRequired`].
    pub skip_confirmation: bool,
    pub price_per_gib: TokenAmount,
    pub start_epoch_hours: i64,
    pub duration_epochs: i64,
    /// Storage provider the deal is proposed to.
    pub miner_fid: String,
    pub sender_wallet: String,
    /// Ceiling taken from the task, if it sets one.
    pub max_price: Option<TokenAmount>,
    /// Task this config was derived for, kept for error messages.
    pub task_uuid: String,
}

impl DealConfig {
    /// Merge a task's metadata into the process-wide defaults.
    ///
    /// Task fields win where present: provider, deal type, fast retrieval,
    /// duration and price ceiling.
    pub fn for_task(defaults: &DealDefaults, task: &Task) -> Self {
        let verified_deal = match task.task_type {
            Some(TaskType::Verified) => true,
            Some(TaskType::Regular) => false,
            None => defaults.verified_deal,
        };

        Self {
            verified_deal,
            fast_retrieval: task.fast_retrieval.unwrap_or(defaults.fast_retrieval),
            skip_confirmation: defaults.skip_confirmation,
            price_per_gib: defaults.price_per_gib,
            start_epoch_hours: defaults.start_epoch_hours,
            duration_epochs: task.duration.unwrap_or(defaults.duration_epochs),
            miner_fid: task.miner_fid.clone().unwrap_or_default(),
            sender_wallet: defaults.sender_wallet.clone(),
            max_price: task.max_price,
            task_uuid: task.uuid.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sender_wallet.trim().is_empty() {
            return Err(ConfigError::MissingSenderWallet);
        }

        if self.miner_fid.trim().is_empty() {
            return Err(ConfigError::MissingProvider {
                task: self.task_uuid.clone(),
            });
        }

        if self.price_per_gib.is_zero() {
            return Err(ConfigError::ZeroPrice);
        }

        if let Some(max_price) = self.max_price {
            if self.price_per_gib > max_price {
                return Err(ConfigError::PriceAboveMax {
                    price: self.price_per_gib,
                    max_price,
                });
            }
        }

        if !(MIN_DURATION_EPOCHS..=MAX_DURATION_EPOCHS).contains(&self.duration_epochs) {
            return Err(ConfigError::DurationOutOfRange {
                duration: self.duration_epochs,
            });
        }

        if self.start_epoch_hours <= 0 {
            return Err(ConfigError::InvalidStartOffset);
        }

        if !self.skip_confirmation {
            return Err(ConfigError::ConfirmationRequired);
        }

        Ok(())
    }

    /// Start epoch offset expressed in epochs.
    pub fn start_epoch_offset(&self) -> i64 {
        self.start_epoch_hours.saturating_mul(EPOCHS_PER_HOUR)
    }
}
