use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use std::time::Instant;

use chrono::Utc;

use crate::game::event::{EventKind, EventPayload, GameEvent};
use crate::game::middleware::{ChainOutcome, Middleware, Next};

/// Error surfaced by a listener. Caught per-handler; siblings still run.
#[derive(Debug)]
pub struct HandlerError(pub String);

impl Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for HandlerError {}

pub type Handler = Box<dyn FnMut(&GameEvent) -> Result<(), HandlerError> + Send>;

/// Opaque unsubscribe handle; pair it with the event kind in `off`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ListenerId(u64);

#[derive(Clone, Copy, Debug)]
pub struct ListenerOptions {
    pub once: bool,
    /// Higher fires earlier; ties keep registration order.
    pub priority: i32,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self { once: false, priority: 0 }
    }
}

/// Per-emit options. Handlers always run to completion on the room's own
/// task; `sequential` selects strictly-ordered delivery over the default
/// fan-out, which differs only in logging today.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmitOptions {
    pub sequential: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BusStats {
    pub events_emitted: u64,
    pub events_processed: u64,
    pub events_cancelled: u64,
    pub errors_handled: u64,
    pub handler_errors: u64,
    pub avg_processing_micros: f64,
}

struct Registration {
    id: u64,
    priority: i32,
    once: bool,
    handler: Handler,
}

/// In-room pub/sub: typed events, priority-ordered delivery, a composable
/// middleware chain, and a capped history ring for observability.
pub struct EventBus {
    game_code: String,
    enabled: bool,
    next_listener_id: u64,
    next_event_id: u64,
    listeners: HashMap<EventKind, Vec<Registration>>,
    middleware: Vec<Box<dyn Middleware>>,
    history: VecDeque<GameEvent>,
    max_history: usize,
    stats: BusStats,
}

impl EventBus {
    pub fn new(game_code: String, max_history: usize) -> Self {
        Self {
            game_code,
            enabled: true,
            next_listener_id: 0,
            next_event_id: 0,
            listeners: HashMap::new(),
            middleware: Vec::new(),
            history: VecDeque::new(),
            max_history: max_history.max(1),
            stats: BusStats::default(),
        }
    }

    pub fn on(
        &mut self,
        kind: EventKind,
        handler: Handler,
        options: ListenerOptions,
    ) -> ListenerId {
        self.next_listener_id += 1;
        let id = self.next_listener_id;
        self.listeners.entry(kind).or_default().push(Registration {
            id,
            priority: options.priority,
            once: options.once,
            handler,
        });
        ListenerId(id)
    }

    pub fn once(&mut self, kind: EventKind, handler: Handler, priority: i32) -> ListenerId {
        self.on(kind, handler, ListenerOptions { once: true, priority })
    }

    pub fn off(&mut self, kind: EventKind, listener: ListenerId) -> bool {
        let Some(regs) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = regs.len();
        regs.retain(|r| r.id != listener.0);
        regs.len() != before
    }

    pub fn remove_all_listeners(&mut self, kind: Option<EventKind>) {
        match kind {
            Some(kind) => {
                self.listeners.remove(&kind);
            }
            None => self.listeners.clear(),
        }
    }

    pub fn add_middleware(&mut self, middleware: Box<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    pub fn listener_count(&self, kind: Option<EventKind>) -> usize {
        match kind {
            Some(kind) => self.listeners.get(&kind).map_or(0, Vec::len),
            None => self.listeners.values().map(Vec::len).sum(),
        }
    }

    /// The most recent `limit` events, oldest first.
    pub fn history(&self, limit: usize) -> Vec<GameEvent> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn stats(&self) -> BusStats {
        self.stats
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn destroy(&mut self) {
        self.enabled = false;
        self.listeners.clear();
        self.middleware.clear();
        self.history.clear();
    }

    /// Returns true iff no middleware cancelled delivery. The event lands in
    /// the history ring either way; handler errors are logged and counted
    /// without aborting siblings.
    pub fn emit(&mut self, kind: EventKind, payload: EventPayload, options: EmitOptions) -> bool {
        if !self.enabled {
            return false;
        }
        self.stats.events_emitted += 1;
        self.next_event_id += 1;
        let event = GameEvent {
            kind,
            payload,
            timestamp: Utc::now(),
            event_id: self.next_event_id,
            game_code: self.game_code.clone(),
        };
        log::trace!(
            "[{}] emit {} #{} (sequential={})",
            self.game_code,
            kind.as_str(),
            event.event_id,
            options.sequential
        );

        self.history.push_back(event.clone());
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }

        let started = Instant::now();
        let mut middleware = std::mem::take(&mut self.middleware);
        let listeners = &mut self.listeners;
        let mut deliver = |event: GameEvent| -> ChainOutcome {
            let Some(regs) = listeners.get_mut(&event.kind) else {
                return ChainOutcome::Delivered { handlers: 0, failures: 0 };
            };
            // The handler set is fixed at emit time: listeners cannot reach
            // the bus from inside a callback.
            let mut order: Vec<usize> = (0..regs.len()).collect();
            order.sort_by_key(|&i| std::cmp::Reverse(regs[i].priority));

            let mut failures = 0usize;
            let mut spent: Vec<u64> = Vec::new();
            for index in order {
                let reg = &mut regs[index];
                if let Err(err) = (reg.handler)(&event) {
                    failures += 1;
                    log::warn!(
                        "handler {} failed on {}: {err}",
                        reg.id,
                        event.kind.as_str()
                    );
                }
                if reg.once {
                    spent.push(reg.id);
                }
            }
            let handlers = regs.len();
            if !spent.is_empty() {
                regs.retain(|r| !spent.contains(&r.id));
            }
            ChainOutcome::Delivered { handlers, failures }
        };

        let outcome = Next::new(&mut middleware, &mut deliver).run(event);
        self.middleware = middleware;

        match outcome {
            ChainOutcome::Delivered { failures, .. } => {
                self.stats.events_processed += 1;
                self.stats.handler_errors += failures as u64;
                let elapsed = started.elapsed().as_micros() as f64;
                let n = self.stats.events_processed as f64;
                self.stats.avg_processing_micros += (elapsed - self.stats.avg_processing_micros) / n;
                true
            }
            ChainOutcome::Cancelled { by, reason } => {
                log::debug!(
                    "[{}] {} cancelled by `{by}`: {reason}",
                    self.game_code,
                    kind.as_str()
                );
                self.stats.events_cancelled += 1;
                self.stats.errors_handled += 1;
                false
            }
            ChainOutcome::Failed { by, reason } => {
                log::error!(
                    "[{}] {} aborted, `{by}` failed without a catch: {reason}",
                    self.game_code,
                    kind.as_str()
                );
                self.stats.events_cancelled += 1;
                self.stats.errors_handled += 1;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn warning(message: &str) -> EventPayload {
        EventPayload::SystemWarning { message: message.into() }
    }

    fn bus() -> EventBus {
        EventBus::new("1234".into(), 8)
    }

    #[test]
    fn handlers_fire_in_priority_order() {
        let mut bus = bus();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for (label, priority) in [("low", 0), ("high", 10), ("mid", 5)] {
            let seen = Arc::clone(&seen);
            bus.on(
                EventKind::SystemWarning,
                Box::new(move |_| {
                    seen.lock().unwrap().push(label);
                    Ok(())
                }),
                ListenerOptions { once: false, priority },
            );
        }
        assert!(bus.emit(EventKind::SystemWarning, warning("x"), EmitOptions::default()));
        assert_eq!(*seen.lock().unwrap(), vec!["high", "mid", "low"]);
    }

    #[test]
    fn once_listener_runs_exactly_once() {
        let mut bus = bus();
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        bus.once(
            EventKind::SystemWarning,
            Box::new(move |_| {
                *counter.lock().unwrap() += 1;
                Ok(())
            }),
            0,
        );
        bus.emit(EventKind::SystemWarning, warning("a"), EmitOptions::default());
        bus.emit(EventKind::SystemWarning, warning("b"), EmitOptions::default());
        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(bus.listener_count(Some(EventKind::SystemWarning)), 0);
    }

    #[test]
    fn off_restores_prior_listener_count() {
        let mut bus = bus();
        let before = bus.listener_count(Some(EventKind::SystemWarning));
        let id = bus.on(
            EventKind::SystemWarning,
            Box::new(|_| Ok(())),
            ListenerOptions::default(),
        );
        assert!(bus.off(EventKind::SystemWarning, id));
        assert_eq!(bus.listener_count(Some(EventKind::SystemWarning)), before);
        assert!(!bus.off(EventKind::SystemWarning, id));
    }

    #[test]
    fn handler_error_does_not_abort_siblings() {
        let mut bus = bus();
        let ran = Arc::new(Mutex::new(false));
        bus.on(
            EventKind::SystemWarning,
            Box::new(|_| Err(HandlerError("broken".into()))),
            ListenerOptions { once: false, priority: 10 },
        );
        let flag = Arc::clone(&ran);
        bus.on(
            EventKind::SystemWarning,
            Box::new(move |_| {
                *flag.lock().unwrap() = true;
                Ok(())
            }),
            ListenerOptions::default(),
        );
        assert!(bus.emit(EventKind::SystemWarning, warning("x"), EmitOptions::default()));
        assert!(*ran.lock().unwrap());
        assert_eq!(bus.stats().handler_errors, 1);
    }

    #[test]
    fn history_ring_evicts_oldest() {
        let mut bus = EventBus::new("1234".into(), 3);
        for i in 0..5 {
            bus.emit(
                EventKind::SystemWarning,
                warning(&format!("w{i}")),
                EmitOptions::default(),
            );
        }
        assert_eq!(bus.history_len(), 3);
        let history = bus.history(10);
        assert_eq!(history.first().unwrap().event_id, 3);
        assert_eq!(history.last().unwrap().event_id, 5);
    }

    #[test]
    fn middleware_cancellation_skips_handlers_and_processing_count() {
        struct CancelAll;
        impl Middleware for CancelAll {
            fn name(&self) -> &'static str {
                "cancelAll"
            }
            fn handle(&mut self, _event: GameEvent, _next: Next<'_>) -> ChainOutcome {
                ChainOutcome::Cancelled { by: "cancelAll", reason: "nope".into() }
            }
        }

        let mut bus = bus();
        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        bus.on(
            EventKind::SystemWarning,
            Box::new(move |_| {
                *flag.lock().unwrap() = true;
                Ok(())
            }),
            ListenerOptions::default(),
        );
        bus.add_middleware(Box::new(CancelAll));
        assert!(!bus.emit(EventKind::SystemWarning, warning("x"), EmitOptions::default()));
        assert!(!*ran.lock().unwrap());
        let stats = bus.stats();
        assert_eq!(stats.events_emitted, 1);
        assert_eq!(stats.events_processed, 0);
        assert_eq!(stats.events_cancelled, 1);
    }

    #[test]
    fn disabled_bus_drops_emits() {
        let mut bus = bus();
        bus.set_enabled(false);
        assert!(!bus.emit(EventKind::SystemWarning, warning("x"), EmitOptions::default()));
        assert_eq!(bus.stats().events_emitted, 0);
        assert_eq!(bus.history_len(), 0);
    }
}
