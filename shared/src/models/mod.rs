//! Domain Models
//!
//! Serde models for every table the engine owns. sqlx derives are
//! feature-gated so UI-side consumers do not pull the database stack.

pub mod fee;
pub mod ledger;
pub mod member;
pub mod redemption;
pub mod settings;
pub mod visit;

pub use fee::{FeeRecord, FeeRecordCreate, FeeStatus, RenewalType};
pub use ledger::{LedgerDirection, LedgerEntry, LedgerSource};
pub use member::{Member, MemberCreate, MemberStatus, MemberUpdate};
pub use redemption::{
    EffectiveLimits, RedemptionItem, RedemptionMirrorEntry, RedemptionStatus,
};
pub use settings::{AnnualFee, AnnualFeeCreate, ClubSettings, ClubSettingsUpdate};
pub use visit::{SessionStatus, VisitSession};
