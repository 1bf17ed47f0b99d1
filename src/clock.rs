use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Source of "now" for the reshape cycle and token signing.
///
/// Calendar-day keys are derived from `today()`, so the zone an
/// implementation reports in decides where the day boundary falls.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock in the configured application timezone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}

#[cfg(test)]
pub(crate) struct FixedClock {
    now: DateTime<Tz>,
}

#[cfg(test)]
impl FixedClock {
    /// Noon Shanghai time on the given day.
    pub(crate) fn on(year: i32, month: u32, day: u32) -> Self {
        use chrono::TimeZone;
        let now = chrono_tz::Asia::Shanghai
            .with_ymd_and_hms(year, month, day, 12, 0, 0)
            .unwrap();
        Self { now }
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        self.now
    }
}
