use core::{str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

/// How often a scheduled backup should run.
#[derive(Hash, Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Cadence {
    /// A backup should be made every hour.
    Hourly,

    /// A backup should be made every day.
    #[default]
    Daily,

    /// A backup should be made every week,
    Weekly,

    /// A backup should be made every month.
    Monthly,
}

impl Cadence {
    /// The minimum time between two backups of this cadence.
    pub fn interval(&self) -> Duration {
        match self {
            Self::Hourly => Duration::from_secs(60 * 60),
            Self::Daily => Duration::from_secs(60 * 60 * 24),
            Self::Weekly => Duration::from_secs(60 * 60 * 24 * 7),
            Self::Monthly => Duration::from_secs(60 * 60 * 24 * 30),
        }
    }
}

impl FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Hourly" => Ok(Self::Hourly),
            "Daily" => Ok(Self::Daily),
            "Weekly" => Ok(Self::Weekly),
            "Monthly" => Ok(Self::Monthly),
            _ => Err(format!("invalid cadence '{s}'")),
        }
    }
}
