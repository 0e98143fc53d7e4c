use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::config::SchedulerConfig;
use crate::schedule::{RaceRecord, ScheduleStore};

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Period after a race during which results are expected to appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl UpdateWindow {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.end
    }
}

pub fn calculate_window(race: &RaceRecord, cfg: &SchedulerConfig) -> Option<UpdateWindow> {
    let start = race.start_time()? + ChronoDuration::hours(cfg.offset_hours);
    let end = start + ChronoDuration::hours(cfg.update_window_hours);
    Some(UpdateWindow { start, end })
}

pub fn should_run_update(race: &RaceRecord, cfg: &SchedulerConfig, now: DateTime<Utc>) -> bool {
    calculate_window(race, cfg).is_some_and(|w| w.contains(now))
}

/// Raceweeks strictly between the cursor and the next schedulable race.
pub fn missed_raceweeks(cursor: u32, next: u32) -> Vec<u32> {
    match cursor.checked_add(1) {
        Some(first) if first < next => (first..next).collect(),
        _ => Vec::new(),
    }
}

/// First race after `cursor` whose window is computable and still open or
/// ahead; `last_raceweek + 1` when the season has run out.
pub fn next_schedulable_raceweek(
    schedule: &ScheduleStore,
    cursor: u32,
    cfg: &SchedulerConfig,
    now: DateTime<Utc>,
) -> u32 {
    schedule
        .races()
        .iter()
        .filter(|race| race.raceweek > cursor)
        .find(|race| calculate_window(race, cfg).is_some_and(|w| now < w.end))
        .map(|race| race.raceweek)
        .unwrap_or(schedule.last_raceweek().saturating_add(1))
}

/// What the scheduler drives. The orchestrator is the production implementation.
pub trait RaceweekUpdater {
    fn current_raceweek(&self) -> Result<u32>;
    /// Results for `race` have been published.
    fn result_is_ready(&self, race: &RaceRecord) -> bool;
    fn run_update(&self, raceweek: u32, now: DateTime<Utc>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    IdleWait { raceweek: u32 },
    InWindowPoll { raceweek: u32 },
    Done { raceweek: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    NoUpcomingRace,
    InvalidRaceTime { raceweek: u32 },
    CatchUp { missed: Vec<u32> },
    WaitUntil { raceweek: u32, start: DateTime<Utc> },
    Poll { raceweek: u32, window: UpdateWindow },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    CursorUnreadable,
    NoUpcomingRace,
    InvalidRaceTime(u32),
    CaughtUp { through: u32 },
    CatchUpStalled { at: u32 },
    WaitedForWindow(u32),
    Updated(u32),
    TimedOut(u32),
}

pub struct Scheduler<'a, C: Clock, U: RaceweekUpdater> {
    config: &'a SchedulerConfig,
    schedule: &'a ScheduleStore,
    clock: C,
    updater: &'a U,
    state: Option<SchedulerState>,
}

impl<'a, C: Clock, U: RaceweekUpdater> Scheduler<'a, C, U> {
    pub fn new(
        config: &'a SchedulerConfig,
        schedule: &'a ScheduleStore,
        clock: C,
        updater: &'a U,
    ) -> Self {
        Self {
            config,
            schedule,
            clock,
            updater,
            state: None,
        }
    }

    pub fn state(&self) -> Option<SchedulerState> {
        self.state
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Decide what to do about raceweek `cursor + 1` at `now`.
    pub fn plan(&self, cursor: u32, now: DateTime<Utc>) -> Plan {
        let Some(raceweek) = cursor.checked_add(1) else {
            return Plan::NoUpcomingRace;
        };
        let Some(race) = self.schedule.race(raceweek) else {
            return Plan::NoUpcomingRace;
        };
        let Some(window) = calculate_window(race, self.config) else {
            return Plan::InvalidRaceTime { raceweek };
        };
        if now >= window.end {
            let next = next_schedulable_raceweek(self.schedule, cursor, self.config, now);
            return Plan::CatchUp {
                missed: missed_raceweeks(cursor, next),
            };
        }
        if now < window.start {
            return Plan::WaitUntil {
                raceweek,
                start: window.start,
            };
        }
        Plan::Poll { raceweek, window }
    }

    pub fn run_forever(&mut self) -> ! {
        loop {
            self.tick();
        }
    }

    /// One planning pass, including whatever sleeping it implies.
    pub fn tick(&mut self) -> PassOutcome {
        let cursor = match self.updater.current_raceweek() {
            Ok(cursor) => cursor,
            Err(err) => {
                tracing::error!("cannot read raceweek cursor: {err:#}");
                self.clock.sleep(self.config.backoff);
                return PassOutcome::CursorUnreadable;
            }
        };

        match self.plan(cursor, self.clock.now()) {
            Plan::NoUpcomingRace => {
                tracing::info!("no upcoming race after raceweek {cursor}");
                self.clock.sleep(self.config.backoff);
                PassOutcome::NoUpcomingRace
            }
            Plan::InvalidRaceTime { raceweek } => {
                tracing::error!("raceweek {raceweek} has no usable race time");
                self.clock.sleep(self.config.backoff);
                PassOutcome::InvalidRaceTime(raceweek)
            }
            Plan::CatchUp { missed } => self.catch_up(cursor, &missed),
            Plan::WaitUntil { raceweek, start } => {
                self.state = Some(SchedulerState::IdleWait { raceweek });
                let wait = (start - self.clock.now()).to_std().unwrap_or_default();
                tracing::info!(
                    "raceweek {raceweek}: update window opens at {start}, sleeping {}s",
                    wait.as_secs()
                );
                self.clock.sleep(wait);
                PassOutcome::WaitedForWindow(raceweek)
            }
            Plan::Poll { raceweek, window } => self.poll(cursor, raceweek, window),
        }
    }

    fn catch_up(&mut self, cursor: u32, missed: &[u32]) -> PassOutcome {
        tracing::warn!("update windows missed for raceweeks {missed:?}");
        let mut through = cursor;
        for &raceweek in missed {
            let Some(race) = self.schedule.race(raceweek) else {
                break;
            };
            if !self.updater.result_is_ready(race) {
                tracing::warn!("raceweek {raceweek}: results still not published");
                self.clock.sleep(self.config.backoff);
                return PassOutcome::CatchUpStalled { at: raceweek };
            }
            if !self.run_and_check(raceweek) {
                self.clock.sleep(self.config.backoff);
                return PassOutcome::CatchUpStalled { at: raceweek };
            }
            through = raceweek;
        }
        self.state = Some(SchedulerState::Done { raceweek: through });
        PassOutcome::CaughtUp { through }
    }

    fn poll(&mut self, cursor: u32, raceweek: u32, window: UpdateWindow) -> PassOutcome {
        self.state = Some(SchedulerState::InWindowPoll { raceweek });
        tracing::info!(
            "raceweek {raceweek}: polling every {}s until {}",
            self.config.update_interval.as_secs(),
            window.end
        );
        let Some(race) = self.schedule.race(raceweek) else {
            return PassOutcome::NoUpcomingRace;
        };
        loop {
            match self.updater.current_raceweek() {
                Ok(current) if current >= raceweek => {
                    tracing::info!("raceweek {raceweek}: cursor already at {current}, polling stops");
                    self.state = Some(SchedulerState::Done { raceweek });
                    return PassOutcome::Updated(raceweek);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::error!("cannot read raceweek cursor: {err:#}");
                    self.clock.sleep(self.config.backoff);
                    return PassOutcome::CursorUnreadable;
                }
            }
            if !window.contains(self.clock.now()) {
                tracing::warn!("raceweek {raceweek}: update window closed without results");
                self.state = Some(SchedulerState::Done { raceweek: cursor });
                self.clock.sleep(self.config.backoff);
                return PassOutcome::TimedOut(raceweek);
            }
            if self.updater.result_is_ready(race) && self.run_and_check(raceweek) {
                self.state = Some(SchedulerState::Done { raceweek });
                return PassOutcome::Updated(raceweek);
            }
            tracing::debug!("raceweek {raceweek}: results not ready");
            self.clock.sleep(self.config.update_interval);
        }
    }

    /// Run the update and report whether the cursor reached `raceweek`.
    fn run_and_check(&self, raceweek: u32) -> bool {
        if let Err(err) = self.updater.run_update(raceweek, self.clock.now()) {
            tracing::error!("raceweek {raceweek}: update failed: {err:#}");
            return false;
        }
        match self.updater.current_raceweek() {
            Ok(cursor) if cursor >= raceweek => {
                tracing::info!("raceweek {raceweek}: scoreboard updated");
                true
            }
            Ok(cursor) => {
                tracing::warn!("raceweek {raceweek}: update ran but cursor is still {cursor}");
                false
            }
            Err(err) => {
                tracing::error!("cannot read raceweek cursor: {err:#}");
                false
            }
        }
    }
}
