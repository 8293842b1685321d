use crate::types::SystemSettings;
use clap::Parser;
use std::path::PathBuf;

/// Replay Lak ledger operations from a CSV log
#[derive(Parser, Debug)]
#[command(name = "lak-ledger")]
#[command(about = "Replay Lak ledger operations and print final balances", long_about = None)]
pub struct CliArgs {
    /// Input CSV file containing operation records
    #[arg(value_name = "INPUT", help = "Path to the operations CSV file")]
    pub input_file: PathBuf,

    /// Daily earn cap override
    #[arg(
        long = "daily-cap",
        value_name = "POINTS",
        help = "Maximum points an account may earn per day"
    )]
    pub daily_cap: Option<i64>,

    /// Holding cap override
    #[arg(
        long = "holding-cap",
        value_name = "POINTS",
        help = "Maximum circulating balance before overflow is banked"
    )]
    pub holding_cap: Option<i64>,

    /// Disable the daily and holding caps entirely
    #[arg(long = "no-limits", help = "Disable the point limit policy")]
    pub no_limits: bool,

    /// Storewide purchase discount
    #[arg(
        long = "discount",
        value_name = "PERCENT",
        help = "Storewide discount percent applied to every purchase (0-100)"
    )]
    pub discount: Option<u8>,
}

impl CliArgs {
    /// Build the settings the store is seeded with
    ///
    /// Starts from the defaults and applies whichever overrides were given.
    pub fn to_settings(&self) -> SystemSettings {
        let mut settings = SystemSettings::default();
        if let Some(daily_cap) = self.daily_cap {
            settings.daily_earn_cap = daily_cap;
        }
        if let Some(holding_cap) = self.holding_cap {
            settings.holding_cap = holding_cap;
        }
        if self.no_limits {
            settings.point_limit_enabled = false;
        }
        if let Some(discount) = self.discount {
            settings.global_discount_percent = discount.min(100);
        }
        settings
    }
}
