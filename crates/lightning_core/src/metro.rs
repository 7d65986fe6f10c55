//! Tempo-driven ticker.
//!
//! A [`Metro`] owns one background thread while playing. The thread waits on a
//! periodic timer and, on each fire, hands the current tick count to the
//! subscriber (if any) and then to the registered callback. Stopping is a
//! rendezvous: the stop signal is received by the thread, which exits and is
//! joined before [`Metro::stop`] returns.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded, select, tick};

use crate::pattern::Pos;

/// Beats per minute.
pub type Tempo = f64;

/// Callback invoked by the tick thread with the raw tick count.
pub type MetroFunc = Arc<dyn Fn(Pos) + Send + Sync>;

/// Accepted values of D in a "1/D" bar subdivision.
pub const BAR_DIVISORS: [u32; 12] = [1, 2, 3, 4, 6, 8, 12, 16, 24, 32, 64, 128];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetroError {
    #[error(
        "invalid meter {0:?}: expected 1/D with D one of 1, 2, 3, 4, 6, 8, 12, 16, 24, 32, 64, 128"
    )]
    InvalidMeter(String),
    #[error("invalid tempo {0}: must be a positive number of beats per minute")]
    InvalidTempo(Tempo),
}

/// Parse a bar subdivision of the exact form "1/D".
pub fn parse_divisor(meter: &str) -> Result<u32, MetroError> {
    let invalid = || MetroError::InvalidMeter(meter.to_string());
    let (numerator, divisor) = meter.split_once('/').ok_or_else(invalid)?;
    if numerator != "1" {
        return Err(invalid());
    }
    BAR_DIVISORS
        .iter()
        .copied()
        .find(|d| d.to_string() == divisor)
        .ok_or_else(invalid)
}

/// Time between ticks: one bar (four beats) at `tempo`, split `bardiv` ways.
pub fn tick_interval(tempo: Tempo, bardiv: &str) -> Result<Duration, MetroError> {
    if !tempo.is_finite() || tempo <= 0.0 {
        return Err(MetroError::InvalidTempo(tempo));
    }
    let divisor = parse_divisor(bardiv)?;
    let ns_per_bar = 1e9 * (240.0 / tempo);
    let interval = Duration::from_nanos((ns_per_bar / divisor as f64) as u64);
    if interval.is_zero() {
        return Err(MetroError::InvalidTempo(tempo));
    }
    Ok(interval)
}

struct Running {
    interval: Duration,
    stop_tx: Sender<()>,
    handle: JoinHandle<Pos>,
}

pub struct Metro {
    tempo: Tempo,
    bardiv: String,
    func: Option<MetroFunc>,
    notify: Option<(Sender<Pos>, Receiver<Pos>)>,
    next_tick: Pos,
    running: Option<Running>,
}

impl Metro {
    pub fn new(tempo: Tempo, bardiv: impl Into<String>, func: Option<MetroFunc>) -> Self {
        Self {
            tempo,
            bardiv: bardiv.into(),
            func,
            notify: None,
            next_tick: 0,
            running: None,
        }
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn bardiv(&self) -> &str {
        &self.bardiv
    }

    pub fn is_playing(&self) -> bool {
        self.running.is_some()
    }

    /// Interval the running tick thread was started with.
    pub fn active_interval(&self) -> Option<Duration> {
        self.running.as_ref().map(|r| r.interval)
    }

    /// Tick count the next (or currently running) session started from.
    pub fn tick_count(&self) -> Pos {
        self.next_tick
    }

    /// Change tempo and subdivision. A running metro keeps its current
    /// interval until it is stopped and started again.
    pub fn set_tempo(&mut self, tempo: Tempo, bardiv: impl Into<String>) {
        self.tempo = tempo;
        self.bardiv = bardiv.into();
    }

    /// Replace the per-tick callback. Applies from the next start.
    pub fn set_func(&mut self, func: MetroFunc) {
        self.func = Some(func);
    }

    /// Single-slot stream of tick counts, delivered before the callback runs.
    ///
    /// While subscribed the tick thread blocks until the previous value has
    /// been read, so the receiver must be drained while playing. Applies from
    /// the next start.
    pub fn subscribe(&mut self) -> Receiver<Pos> {
        let (_, rx) = self.notify.get_or_insert_with(|| bounded(1));
        rx.clone()
    }

    pub fn start(&mut self) -> Result<(), MetroError> {
        if self.running.is_some() {
            return Ok(());
        }
        let interval = tick_interval(self.tempo, &self.bardiv)?;

        let (stop_tx, stop_rx) = bounded(0);
        let ticker = tick(interval);
        let notify = self.notify.as_ref().map(|(tx, _)| tx.clone());
        let func = self.func.clone();
        let first = self.next_tick;
        let handle = thread::spawn(move || count(ticker, stop_rx, notify, func, first));

        tracing::debug!(?interval, first, "metro started");
        self.running = Some(Running {
            interval,
            stop_tx,
            handle,
        });
        Ok(())
    }

    /// Stop ticking. Returns once the tick thread has exited; no tick is
    /// delivered after this returns.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        // send fails only if the thread already died
        let _ = running.stop_tx.send(());
        match running.handle.join() {
            Ok(next) => self.next_tick = next,
            Err(_) => tracing::error!("metro tick thread panicked"),
        }
        if let Some((_, rx)) = &self.notify {
            while rx.try_recv().is_ok() {}
        }
        tracing::debug!(next_tick = self.next_tick, "metro stopped");
    }
}

impl Drop for Metro {
    fn drop(&mut self) {
        self.stop();
    }
}

fn count(
    ticker: Receiver<Instant>,
    stop: Receiver<()>,
    notify: Option<Sender<Pos>>,
    func: Option<MetroFunc>,
    mut pos: Pos,
) -> Pos {
    loop {
        select! {
            recv(ticker) -> _ => {
                if let Some(tx) = &notify {
                    select! {
                        send(tx, pos) -> _ => {}
                        recv(stop) -> _ => return pos,
                    }
                }
                if let Some(f) = &func {
                    f(pos);
                }
                pos += 1;
            }
            recv(stop) -> _ => return pos,
        }
    }
}
