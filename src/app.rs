use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
    },
    time::{Duration, Instant},
};

use anyhow::Result;
use chrono::{DateTime, Local};
use ratatui::{backend::Backend, Terminal};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    config::Settings,
    history::{HistorySample, HistoryStore},
    input::{InputSource, KeyAction},
    navigation::NavigationState,
    quote::{Quote, QuoteFetcher},
    ui,
    watchlist::WatchItem,
};

/// How long one input poll may block. Short enough for a smooth countdown.
pub const INPUT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Result of one symbol fetch, sent from a fetch task back to the loop.
#[derive(Debug)]
pub struct FetchResult {
    pub tick: u64,
    /// Provider-facing symbol of the watch item that was fetched.
    pub symbol: String,
    /// Wall-clock start of the tick; every sample of a tick carries it.
    pub tick_started: DateTime<Local>,
    pub quote: Quote,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewMode {
    Table,
    /// Chart of the given provider-facing symbol.
    Chart(String),
    Exiting,
}

/// Single owner of the quote map, history and selection. Fetch tasks only
/// send results back over the channel; nothing else mutates this state.
pub struct App {
    settings: Settings,
    items: Vec<WatchItem>,
    quotes: HashMap<String, Quote>,
    history: HistoryStore,
    navigation: NavigationState,
    mode: ViewMode,
    fetcher: QuoteFetcher,
    runtime: Handle,
    fetch_sender: Sender<FetchResult>,
    fetch_receiver: Receiver<FetchResult>,
    in_flight: HashMap<String, JoinHandle<()>>,
    tick: u64,
    last_tick: Option<Instant>,
    last_update: Option<DateTime<Local>>,
}

impl App {
    pub fn new(settings: Settings, items: Vec<WatchItem>, fetcher: QuoteFetcher, runtime: Handle) -> Self {
        let (fetch_sender, fetch_receiver) = mpsc::channel();
        App {
            history: HistoryStore::new(settings.max_history),
            navigation: NavigationState::new(items.len()),
            settings,
            items,
            quotes: HashMap::new(),
            mode: ViewMode::Table,
            fetcher,
            runtime,
            fetch_sender,
            fetch_receiver,
            in_flight: HashMap::new(),
            tick: 0,
            last_tick: None,
            last_update: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn items(&self) -> &[WatchItem] {
        &self.items
    }

    pub fn quote(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.get(symbol)
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn navigation(&self) -> &NavigationState {
        &self.navigation
    }

    pub fn mode(&self) -> &ViewMode {
        &self.mode
    }

    pub fn is_exiting(&self) -> bool {
        self.mode == ViewMode::Exiting
    }

    pub fn is_fetching(&self) -> bool {
        !self.in_flight.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn last_update(&self) -> Option<DateTime<Local>> {
        self.last_update
    }

    pub fn selected_item(&self) -> Option<&WatchItem> {
        self.navigation.selected().and_then(|i| self.items.get(i))
    }

    pub fn item(&self, symbol: &str) -> Option<&WatchItem> {
        self.items.iter().find(|i| i.display_symbol == symbol)
    }

    /// Ticks only run from the table view.
    pub fn is_tick_due(&self, now: Instant) -> bool {
        if self.mode != ViewMode::Table {
            return false;
        }
        match self.last_tick {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.settings.refresh_interval,
        }
    }

    /// Elapsed fraction of the refresh interval, in `0.0..=1.0`.
    pub fn refresh_progress(&self, now: Instant) -> f64 {
        let Some(last) = self.last_tick else {
            return 0.0;
        };
        let interval = self.settings.refresh_interval.as_secs_f64();
        if interval <= 0.0 {
            return 1.0;
        }
        (now.saturating_duration_since(last).as_secs_f64() / interval).clamp(0.0, 1.0)
    }

    pub fn seconds_until_refresh(&self, now: Instant) -> u64 {
        let Some(last) = self.last_tick else {
            return 0;
        };
        let remaining = self
            .settings
            .refresh_interval
            .saturating_sub(now.saturating_duration_since(last));
        // Round up so the display reads 30..1 rather than 29..0.
        remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
    }

    /// Spawn one fetch task per watch item. Symbols whose previous fetch is
    /// still running are skipped for this tick.
    pub fn start_tick(&mut self, now: Instant) {
        self.reap_lost_fetches();
        self.tick += 1;
        self.last_tick = Some(now);
        let tick = self.tick;
        let tick_started = Local::now();

        let mut skipped = Vec::new();
        for item in &self.items {
            let symbol = item.display_symbol.clone();
            if self.in_flight.contains_key(&symbol) {
                skipped.push(symbol);
                continue;
            }

            let fetcher = self.fetcher.clone();
            let sender = self.fetch_sender.clone();
            let task_symbol = symbol.clone();
            let handle = self.runtime.spawn(async move {
                let quote = fetcher.fetch(&task_symbol).await;
                let _ = sender.send(FetchResult {
                    tick,
                    symbol: task_symbol,
                    tick_started,
                    quote,
                });
            });
            self.in_flight.insert(symbol, handle);
        }

        if skipped.is_empty() {
            info!(tick, symbols = self.items.len(), "refresh tick started");
        } else {
            warn!(tick, skipped = %skipped.join(", "), "refresh tick started, previous fetch still running for some symbols");
        }
    }

    /// Forget fetch tasks that ended without sending a result (panicked or
    /// aborted), so their symbols are fetched again and show an error.
    fn reap_lost_fetches(&mut self) {
        let finished: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(symbol, _)| symbol.clone())
            .collect();
        if finished.is_empty() {
            return;
        }

        // A task sends its result before it finishes, so anything still
        // registered after draining the channel was lost.
        self.process_fetch_results();
        for symbol in finished {
            if self.in_flight.remove(&symbol).is_some() {
                warn!(%symbol, "fetch task ended without a result");
                let quote = Quote::failed(&symbol, "fetch failed: task aborted".to_string());
                self.quotes.insert(symbol, quote);
            }
        }
    }

    /// Drain finished fetches without blocking. Returns true if anything changed.
    pub fn process_fetch_results(&mut self) -> bool {
        let mut updated = false;
        while let Ok(result) = self.fetch_receiver.try_recv() {
            if self.is_exiting() {
                debug!(symbol = %result.symbol, tick = result.tick, "discarding fetch result after exit");
                continue;
            }
            self.apply_result(result);
            updated = true;
        }
        updated
    }

    /// Merge one fetch result into the owned state.
    pub fn apply_result(&mut self, result: FetchResult) {
        self.in_flight.remove(&result.symbol);

        if let Some(price) = result.quote.price.filter(|_| result.quote.is_ok()) {
            self.history.append(
                &result.symbol,
                HistorySample {
                    timestamp: result.tick_started,
                    price,
                },
            );
        }
        self.last_update = Some(result.quote.fetched_at);
        self.quotes.insert(result.symbol, result.quote);
    }

    pub fn handle_action(&mut self, action: KeyAction) {
        let next = match (self.mode.clone(), action) {
            (ViewMode::Exiting, _) => return,
            (_, KeyAction::Interrupt) => ViewMode::Exiting,
            (ViewMode::Table, KeyAction::MoveUp) => {
                self.navigation.move_up();
                return;
            }
            (ViewMode::Table, KeyAction::MoveDown) => {
                self.navigation.move_down();
                return;
            }
            (ViewMode::Table, KeyAction::Select) => match self.selected_item() {
                Some(item) => ViewMode::Chart(item.display_symbol.clone()),
                None => return,
            },
            (ViewMode::Table, KeyAction::Refresh) => {
                self.start_tick(Instant::now());
                return;
            }
            (ViewMode::Table, KeyAction::Exit) => ViewMode::Exiting,
            (ViewMode::Chart(_), KeyAction::Exit | KeyAction::Select) => ViewMode::Table,
            _ => return,
        };

        info!(from = ?self.mode, to = ?next, "view changed");
        self.mode = next;
        if self.is_exiting() {
            self.cancel_fetches();
        }
    }

    /// Leave the loop from whatever view is active.
    pub fn shutdown(&mut self) {
        if !self.is_exiting() {
            info!(from = ?self.mode, "shutting down");
            self.mode = ViewMode::Exiting;
        }
        self.cancel_fetches();
    }

    fn cancel_fetches(&mut self) {
        for (symbol, handle) in self.in_flight.drain() {
            debug!(%symbol, "aborting outstanding fetch");
            handle.abort();
        }
        while self.fetch_receiver.try_recv().is_ok() {}
    }
}

/// Main loop: merge fetch results, start due ticks, draw, poll input.
/// The terminal mode is restored before returning.
pub fn run_app<B: Backend, I: InputSource>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    input: &mut I,
    interrupted: &AtomicBool,
) -> Result<()> {
    loop {
        app.process_fetch_results();

        if interrupted.load(Ordering::SeqCst) {
            info!("interrupt received");
            app.handle_action(KeyAction::Interrupt);
        }
        if app.is_exiting() {
            break;
        }

        let now = Instant::now();
        if app.is_tick_due(now) {
            app.start_tick(now);
        }

        terminal.draw(|f| ui::draw(f, app, now))?;

        let action = input.read_key(INPUT_POLL_TIMEOUT)?;
        app.handle_action(action);
    }

    app.shutdown();
    input.restore()?;
    Ok(())
}
