//! System-wide settings
//!
//! A singleton document toggled by the admin surface and read-only from the
//! ledger's perspective. Every operation that depends on a toggle, cap, or
//! discount reads the settings inside its own transaction so a concurrent
//! admin change can never be half-applied.

use serde::{Deserialize, Serialize};

/// The system settings singleton
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSettings {
    /// When on, every balance-mutating operation is rejected for non-admins
    pub maintenance_mode: bool,

    /// Online-shop toggle; staff point-of-sale roles bypass it
    pub shop_enabled: bool,

    /// Master switch for the daily-earn and holding caps
    pub point_limit_enabled: bool,

    /// Storewide discount applied to every purchase total (0-100)
    pub global_discount_percent: u8,

    /// Maximum circulating points an account may earn per day
    pub daily_earn_cap: i64,

    /// Maximum circulating balance; overflow goes to the piggy bank
    pub holding_cap: i64,
}

impl Default for SystemSettings {
    fn default() -> Self {
        SystemSettings {
            maintenance_mode: false,
            shop_enabled: true,
            point_limit_enabled: true,
            global_discount_percent: 0,
            daily_earn_cap: 20,
            holding_cap: 100,
        }
    }
}
