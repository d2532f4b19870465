//! Wall clock and countdown text shown under the pet

use chrono::NaiveDateTime;
use log::info;

const CLOCK_FORMAT: &str = "%Y-%m-%d %A\n%H:%M:%S";
const FINISHED_BANNER: &str = "Countdown finished!";
/// Seconds the banner stays up once a countdown reaches zero
const BANNER_TICKS: u32 = 3;
const URGENT_SECS: u32 = 10;
pub const MAX_COUNTDOWN_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockText {
    pub text: String,
    /// Highlighted rendering for the last seconds of a countdown
    pub urgent: bool,
}

/// Ticked once per second by the host
#[derive(Debug, Default)]
pub struct ClockDisplay {
    enabled: bool,
    remaining: Option<u32>,
    banner_ticks: u32,
}

impl ClockDisplay {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn remaining_secs(&self) -> Option<u32> {
        self.remaining
    }

    pub fn start_countdown(&mut self, minutes: u32) -> Result<(), String> {
        if minutes == 0 || minutes > MAX_COUNTDOWN_MINUTES {
            return Err(format!(
                "Countdown must be between 1 and {} minutes",
                MAX_COUNTDOWN_MINUTES
            ));
        }
        info!("[clock] Countdown started: {} min", minutes);
        self.remaining = Some(minutes * 60);
        self.banner_ticks = 0;
        Ok(())
    }

    pub fn cancel_countdown(&mut self) {
        self.remaining = None;
        self.banner_ticks = 0;
    }

    /// Advances one second and returns what to show at `now`.
    /// The second value is true on the tick the countdown reaches zero.
    pub fn tick(&mut self, now: NaiveDateTime) -> (Option<ClockText>, bool) {
        let mut finished = false;
        if self.banner_ticks > 0 {
            self.banner_ticks -= 1;
        } else if let Some(remaining) = self.remaining {
            let remaining = remaining.saturating_sub(1);
            if remaining == 0 {
                info!("[clock] Countdown finished");
                self.remaining = None;
                self.banner_ticks = BANNER_TICKS;
                finished = true;
            } else {
                self.remaining = Some(remaining);
            }
        }
        (self.render(now), finished)
    }

    /// Text for `now` without advancing anything
    pub fn render(&self, now: NaiveDateTime) -> Option<ClockText> {
        if self.banner_ticks > 0 {
            return Some(ClockText {
                text: FINISHED_BANNER.to_string(),
                urgent: true,
            });
        }
        if let Some(remaining) = self.remaining {
            return Some(ClockText {
                text: format!("Countdown\n{:02}:{:02}", remaining / 60, remaining % 60),
                urgent: remaining <= URGENT_SECS,
            });
        }
        self.enabled.then(|| ClockText {
            text: now.format(CLOCK_FORMAT).to_string(),
            urgent: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(12, 5, 9)
            .unwrap()
    }

    #[test]
    fn wall_clock_only_when_enabled() {
        let mut clock = ClockDisplay::new(true);
        assert_eq!(
            clock.render(noon()).unwrap().text,
            "2024-03-15 Friday\n12:05:09"
        );
        clock.set_enabled(false);
        assert_eq!(clock.render(noon()), None);
    }

    #[test]
    fn countdown_formats_and_turns_urgent() {
        let mut clock = ClockDisplay::new(false);
        clock.start_countdown(1).unwrap();
        assert_eq!(clock.render(noon()).unwrap().text, "Countdown\n01:00");

        for _ in 0..49 {
            clock.tick(noon());
        }
        let text = clock.render(noon()).unwrap();
        assert_eq!(text.text, "Countdown\n00:11");
        assert!(!text.urgent);

        let (text, finished) = clock.tick(noon());
        assert!(!finished);
        assert!(text.unwrap().urgent);
    }

    #[test]
    fn banner_shows_for_three_seconds_then_clock_returns() {
        let mut clock = ClockDisplay::new(true);
        clock.start_countdown(1).unwrap();
        for _ in 0..59 {
            assert!(!clock.tick(noon()).1);
        }
        let (text, finished) = clock.tick(noon());
        assert!(finished);
        assert_eq!(text.unwrap().text, "Countdown finished!");

        assert_eq!(clock.tick(noon()).0.unwrap().text, "Countdown finished!");
        assert_eq!(clock.tick(noon()).0.unwrap().text, "Countdown finished!");
        assert_eq!(clock.tick(noon()).0.unwrap().text, "2024-03-15 Friday\n12:05:09");
        assert_eq!(clock.remaining_secs(), None);
    }

    #[test]
    fn rejects_out_of_range_countdowns() {
        let mut clock = ClockDisplay::new(true);
        assert!(clock.start_countdown(0).is_err());
        assert!(clock.start_countdown(MAX_COUNTDOWN_MINUTES + 1).is_err());
        assert_eq!(clock.remaining_secs(), None);
    }
}
