use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::NaiveDate;
use delta_pivots::config::Config;
use delta_pivots::engine::{DEFAULT_ARCHIVE_CAPACITY, DIAGNOSTIC_CAPACITY};
use delta_pivots::pivot::PivotConfig;
use delta_pivots::{
    BarArchive, BarCompletion, EngineConfig, FixedSessionCalendar, LevelEngine, LevelError,
    SessionKey, SessionName, SessionSummary, Tick,
};

const MINUTE: i64 = 60_000;
const HOUR: i64 = 60 * MINUTE;
// 2024-03-04 18:00 at UTC-05:00, start of trading day 2024-03-04
const DAY0: i64 = 1_709_510_400_000 + 23 * HOUR;
const RTH_OPEN: i64 = DAY0 + 15 * HOUR + 30 * MINUTE;
const RTH_CLOSE: i64 = DAY0 + 22 * HOUR;

fn config(window: usize) -> EngineConfig {
    EngineConfig {
        pivot: PivotConfig {
            window_bars: NonZeroUsize::new(window).unwrap(),
            use_poc_as_pivot: false,
        },
        ..EngineConfig::default()
    }
}

fn engine(window: usize) -> LevelEngine<FixedSessionCalendar> {
    LevelEngine::new(config(window), FixedSessionCalendar::cme_equity_index()).unwrap()
}

fn signed_tick(ts: i64, price: f64, delta: i64) -> Tick {
    if delta >= 0 {
        Tick::ask(ts, price, delta.unsigned_abs())
    } else {
        Tick::bid(ts, price, delta.unsigned_abs())
    }
}

/// One tick per minute from the RTH open, then one tick after the close.
fn rth_session() -> Vec<Tick> {
    let bars = [
        (100.0, 10),
        (100.5, -5),
        (101.0, 40),
        (100.0, 2),
        (98.0, -60),
        (101.0, 1),
    ];
    let mut ticks: Vec<Tick> = bars
        .iter()
        .enumerate()
        .map(|(i, (price, delta))| {
            signed_tick(RTH_OPEN + i as i64 * MINUTE + 5_000, *price, *delta)
        })
        .collect();
    ticks.push(Tick::ask(RTH_CLOSE + MINUTE, 99.0, 1));
    ticks
}

fn run(engine: &mut LevelEngine<FixedSessionCalendar>, ticks: &[Tick]) -> Vec<SessionSummary> {
    let mut out: Vec<SessionSummary> =
        ticks.iter().filter_map(|t| engine.process_tick(t)).collect();
    out.extend(engine.flush());
    out
}

#[test]
fn rth_session_produces_summary_with_pivot() {
    let mut engine = engine(3);
    let summaries = run(&mut engine, &rth_session());
    assert_eq!(summaries.len(), 1);

    let summary = &summaries[0];
    let key = SessionKey {
        day: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
        session: SessionName::Rth,
    };
    assert_eq!(summary.key, key);
    assert_eq!(summary.start_time_ms, RTH_OPEN);
    assert_eq!(summary.end_time_ms, RTH_CLOSE);
    assert_eq!(summary.bar_count, 6);
    assert_eq!(summary.first_bar_index, Some(0));
    assert_eq!(summary.last_bar_index, Some(5));
    assert_eq!(summary.volume, 118);
    assert_eq!(summary.delta, -12);

    let va = summary.value_area.unwrap();
    assert!((va.point_of_control - 98.0).abs() < f64::EPSILON);

    let pivot = summary.pivot.as_ref().unwrap();
    assert_eq!(pivot.window_start_index, 3);
    assert_eq!(pivot.window_delta, -57);
    assert_eq!(pivot.representative_index, 4);
    assert_eq!(pivot.delta, -60);
    assert_eq!(pivot.start_time_ms, RTH_OPEN + 3 * MINUTE);
    assert!((pivot.pivot_price - 99.5).abs() < f64::EPSILON);
    assert!((pivot.breadth - 3.0).abs() < f64::EPSILON);

    assert_eq!(summary.extensions.len(), 3);
    assert!((summary.extensions[0].above - 104.0).abs() < f64::EPSILON);
    assert!((summary.extensions[0].below - 95.0).abs() < f64::EPSILON);

    assert_eq!(engine.last_summary(), Some(summary));
    assert_eq!(engine.archive().len(), 6);
    assert!(engine.active_session().is_none());
}

#[test]
fn replays_are_byte_identical() {
    let render = || {
        let mut engine = engine(3);
        run(&mut engine, &rth_session())
            .iter()
            .map(|s| serde_json::to_string(s).unwrap())
            .collect::<Vec<_>>()
    };
    assert_eq!(render(), render());
}

#[test]
fn archived_bars_are_not_recomputed() {
    let mut engine = engine(3);
    run(&mut engine, &rth_session());

    let first = engine.bar_value_area(4).unwrap().unwrap();
    let second = engine.bar_value_area(4).unwrap().unwrap();
    assert_eq!(first, second);
    assert!((first.point_of_control - 98.0).abs() < f64::EPSILON);

    let archive = engine.archive();
    let bar = archive.get(4).unwrap();
    assert_eq!(
        archive.insert((*bar).clone()).unwrap_err(),
        LevelError::BarAlreadyComplete(4)
    );
    assert!(Arc::ptr_eq(&archive.get(4).unwrap(), &bar));
}

#[test]
fn host_completed_bars_are_skipped() {
    let archive = Arc::new(BarArchive::new());
    archive.set_complete(0);
    archive.set_complete(1);
    let mut engine = LevelEngine::with_archive(
        config(3),
        FixedSessionCalendar::cme_equity_index(),
        Arc::clone(&archive),
    )
    .unwrap();
    let summaries = run(&mut engine, &rth_session());
    assert_eq!(summaries[0].first_bar_index, Some(2));
    assert_eq!(summaries[0].last_bar_index, Some(7));
    assert!(archive.get(0).is_none());
}

#[test]
fn out_of_order_and_invalid_ticks_are_dropped() {
    let mut engine = engine(3);
    assert!(engine.process_tick(&Tick::ask(RTH_OPEN + 10_000, 100.0, 1)).is_none());
    assert!(engine.process_tick(&Tick::ask(RTH_OPEN + 5_000, 100.0, 1)).is_none());
    assert!(engine.process_tick(&Tick::ask(RTH_OPEN + 20_000, f64::NAN, 1)).is_none());
    assert!(engine.process_tick(&Tick::bid(RTH_OPEN + 30_000, -1.0, 1)).is_none());

    assert_eq!(engine.ticks_accepted(), 1);
    assert_eq!(engine.ticks_dropped(), 3);
    let errors: Vec<&LevelError> = engine.diagnostics().map(|d| &d.error).collect();
    assert_eq!(errors.len(), 3);
    assert_eq!(
        errors[0],
        &LevelError::OutOfOrderTick {
            last_ms: RTH_OPEN + 10_000,
            observed_ms: RTH_OPEN + 5_000,
        }
    );
    assert!(matches!(errors[1], LevelError::InvalidTick(_)));
    assert!(matches!(errors[2], LevelError::InvalidTick(_)));

    let summary = engine.flush().unwrap();
    assert_eq!(summary.volume, 1);
}

#[test]
fn data_gap_recomputes_boundaries() {
    let mut engine = engine(3);
    assert!(engine.process_tick(&Tick::ask(RTH_OPEN + 1_000, 100.0, 4)).is_none());

    let later = RTH_OPEN + 3 * 24 * HOUR + 1_000;
    let summary = engine.process_tick(&Tick::ask(later, 101.0, 2)).unwrap();
    assert_eq!(summary.key.session, SessionName::Rth);
    assert_eq!(summary.volume, 4);
    assert!(summary.pivot.is_none());

    assert!(engine.diagnostics().any(|d| matches!(
        d.error,
        LevelError::StaleSessionBoundary { .. }
    )));
    let active = engine.active_session().unwrap();
    assert_eq!(active.day, NaiveDate::from_ymd_opt(2024, 3, 7).unwrap());
    assert_eq!(active.name, SessionName::Rth);
}

#[test]
fn sessions_rotate_through_the_day() {
    let mut engine = engine(1);
    let ticks = [
        Tick::ask(DAY0 + MINUTE, 100.0, 1),
        Tick::ask(DAY0 + 10 * HOUR, 100.0, 1),
        Tick::ask(RTH_OPEN + MINUTE, 100.0, 1),
    ];
    let summaries = run(&mut engine, &ticks);
    let names: Vec<SessionName> = summaries.iter().map(|s| s.key.session).collect();
    assert_eq!(
        names,
        vec![SessionName::Overnight, SessionName::London, SessionName::Rth]
    );
    assert!(summaries.iter().all(|s| s.pivot.is_some()));
}

#[test]
fn ticks_between_sessions_are_ignored() {
    let mut engine = engine(3);
    // 16:30 local, after RTH and before the next overnight
    assert!(engine.process_tick(&Tick::ask(RTH_CLOSE + 30 * MINUTE, 100.0, 7)).is_none());
    assert_eq!(engine.ticks_accepted(), 1);
    assert!(engine.active_session().is_none());
    assert!(engine.flush().is_none());
    assert!(engine.archive().is_empty());
}

#[test]
fn live_value_area_tracks_open_session() {
    let mut engine = engine(3);
    assert_eq!(engine.live_value_area(), Err(LevelError::EmptyDistribution));
    engine.process_tick(&Tick::ask(RTH_OPEN, 100.0, 10));
    engine.process_tick(&Tick::bid(RTH_OPEN + 1, 100.25, 30));
    let va = engine.live_value_area().unwrap();
    assert!((va.point_of_control - 100.25).abs() < f64::EPSILON);
    assert_eq!(va.total_volume, 40);
}

#[test]
fn flush_is_idempotent() {
    let mut engine = engine(3);
    engine.process_tick(&Tick::ask(RTH_OPEN, 100.0, 10));
    assert!(engine.flush().is_some());
    assert!(engine.flush().is_none());
    assert_eq!(engine.last_summary().map(|s| s.volume), Some(10));
}

#[test]
fn rejects_invalid_engine_config() {
    let cal = FixedSessionCalendar::cme_equity_index;
    let bad_tick = EngineConfig {
        tick_size: 0.0,
        ..EngineConfig::default()
    };
    assert!(LevelEngine::new(bad_tick, cal()).is_err());
    let bad_interval = EngineConfig {
        bar_interval_ms: 0,
        ..EngineConfig::default()
    };
    assert!(matches!(
        LevelEngine::new(bad_interval, cal()),
        Err(LevelError::Config(_))
    ));
}

#[test]
fn diagnostics_are_capped_and_drainable() {
    let mut engine = engine(3);
    let total = DIAGNOSTIC_CAPACITY as i64 + 100;
    for i in 0..total {
        engine.process_tick(&Tick::ask(RTH_OPEN + i, f64::NAN, 1));
    }
    assert_eq!(engine.ticks_dropped(), total as u64);
    assert_eq!(engine.diagnostics().len(), DIAGNOSTIC_CAPACITY);
    // oldest entries were discarded
    assert_eq!(engine.diagnostics().next().map(|d| d.timestamp_ms), Some(RTH_OPEN + 100));

    let drained = engine.take_diagnostics();
    assert_eq!(drained.len(), DIAGNOSTIC_CAPACITY);
    assert_eq!(engine.diagnostics().len(), 0);
    assert_eq!(engine.ticks_dropped(), total as u64);
}

#[test]
fn default_config_bounds_the_archive() {
    let config = Config::load_from(std::path::Path::new("config/default.toml")).unwrap();
    let mut engine =
        LevelEngine::new(config.engine_config().unwrap(), config.sessions.calendar().unwrap())
            .unwrap();

    // two full trading days of one tick per minute
    let mut summaries = 0;
    for m in 0..2 * 24 * 60 {
        if engine.process_tick(&Tick::ask(DAY0 + m * MINUTE, 100.0, 1)).is_some() {
            summaries += 1;
        }
    }
    let archive = engine.archive();
    assert_eq!(summaries, 6);
    assert!(archive.last_index().unwrap() as usize > 2 * DEFAULT_ARCHIVE_CAPACITY - 500);
    assert_eq!(archive.len(), DEFAULT_ARCHIVE_CAPACITY);
}

#[test]
fn weekend_close_is_not_reported_as_a_gap() {
    let mut engine = engine(3);
    // Friday 2024-03-08 15:00 local, RTH of trading day 2024-03-07
    let friday = DAY0 + 3 * 24 * HOUR + 21 * HOUR;
    // Sunday 2024-03-10 18:05 local
    let sunday = DAY0 + 6 * 24 * HOUR + 5 * MINUTE;
    assert!(engine.process_tick(&Tick::ask(friday, 100.0, 1)).is_none());
    let summary = engine.process_tick(&Tick::ask(sunday, 100.0, 1)).unwrap();
    assert_eq!(summary.key.session, SessionName::Rth);
    assert_eq!(engine.diagnostics().len(), 0);
    assert_eq!(
        engine.active_session().map(|s| s.name),
        Some(SessionName::Overnight)
    );
}

#[test]
fn first_bar_starts_at_session_open() {
    let config = EngineConfig {
        bar_interval_ms: 60 * MINUTE,
        ..config(1)
    };
    let mut engine =
        LevelEngine::new(config, FixedSessionCalendar::cme_equity_index()).unwrap();
    engine.process_tick(&Tick::ask(RTH_OPEN + 5 * MINUTE, 100.0, 3));
    engine.process_tick(&Tick::ask(RTH_OPEN + 40 * MINUTE, 101.0, 1));
    let summary = engine.flush().unwrap();

    let pivot = summary.pivot.unwrap();
    assert_eq!(pivot.window_start_index, 0);
    assert_eq!(pivot.start_time_ms, RTH_OPEN);
    let first = engine.archive().get(0).unwrap();
    assert_eq!(first.bar.open_time_ms, RTH_OPEN);
    assert_eq!(first.bar.close_time_ms, RTH_OPEN + 30 * MINUTE);
}
