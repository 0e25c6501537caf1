use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::game::event::{EventKind, GameEvent};

/// Result of pushing an event through the remainder of the chain plus
/// handler dispatch.
#[derive(Debug)]
pub enum ChainOutcome {
    Delivered { handlers: usize, failures: usize },
    Cancelled { by: &'static str, reason: String },
    Failed { by: &'static str, reason: String },
}

/// One link in the emit pipeline. `next` runs the rest of the chain and
/// finally the handler fan-out, so a link may observe, replace, time or
/// cancel everything downstream of it.
pub trait Middleware: Send {
    fn name(&self) -> &'static str;
    fn handle(&mut self, event: GameEvent, next: Next<'_>) -> ChainOutcome;
}

pub struct Next<'a> {
    rest: &'a mut [Box<dyn Middleware>],
    terminal: &'a mut dyn FnMut(GameEvent) -> ChainOutcome,
}

impl<'a> Next<'a> {
    pub fn new(
        chain: &'a mut [Box<dyn Middleware>],
        terminal: &'a mut dyn FnMut(GameEvent) -> ChainOutcome,
    ) -> Self {
        Self { rest: chain, terminal }
    }

    pub fn run(self, event: GameEvent) -> ChainOutcome {
        match self.rest.split_first_mut() {
            None => (self.terminal)(event),
            Some((head, tail)) => head.handle(
                event,
                Next {
                    rest: tail,
                    terminal: self.terminal,
                },
            ),
        }
    }
}

/// Catches failures escaping the links below it and turns them into a
/// logged cancellation instead of letting the emit report an internal error.
pub struct ErrorHandlingMiddleware;

impl Middleware for ErrorHandlingMiddleware {
    fn name(&self) -> &'static str {
        "errorHandling"
    }

    fn handle(&mut self, event: GameEvent, next: Next<'_>) -> ChainOutcome {
        let kind = event.kind;
        match next.run(event) {
            ChainOutcome::Failed { by, reason } => {
                log::error!("middleware `{by}` failed on {}: {reason}", kind.as_str());
                ChainOutcome::Cancelled { by, reason }
            }
            other => other,
        }
    }
}

/// Times full downstream delivery and logs a warning past the threshold.
/// Never cancels.
pub struct PerformanceMiddleware {
    threshold: Duration,
    slow_events: u64,
}

impl PerformanceMiddleware {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold, slow_events: 0 }
    }

    pub fn slow_events(&self) -> u64 {
        self.slow_events
    }
}

impl Middleware for PerformanceMiddleware {
    fn name(&self) -> &'static str {
        "performance"
    }

    fn handle(&mut self, event: GameEvent, next: Next<'_>) -> ChainOutcome {
        let kind = event.kind;
        let started = Instant::now();
        let outcome = next.run(event);
        let elapsed = started.elapsed();
        if elapsed > self.threshold {
            self.slow_events += 1;
            log::warn!(
                "slow event {}: {}ms (threshold {}ms)",
                kind.as_str(),
                elapsed.as_millis(),
                self.threshold.as_millis()
            );
        }
        outcome
    }
}

struct LimitWindow {
    started: Instant,
    count: u32,
}

/// Per-room, per-event-type counter over a fixed window. The window restarts
/// after `window` of quiescence; the `max_events + 1`-th emit inside a
/// window is cancelled.
pub struct RateLimitMiddleware {
    window: Duration,
    max_events: u32,
    exempt: HashSet<EventKind>,
    counters: HashMap<EventKind, LimitWindow>,
}

impl RateLimitMiddleware {
    pub fn new(window: Duration, max_events: u32, exempt: HashSet<EventKind>) -> Self {
        Self {
            window,
            max_events,
            exempt,
            counters: HashMap::new(),
        }
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rateLimiting"
    }

    fn handle(&mut self, event: GameEvent, next: Next<'_>) -> ChainOutcome {
        if self.exempt.contains(&event.kind) {
            return next.run(event);
        }
        let now = Instant::now();
        let window = self.window;
        let counter = self
            .counters
            .entry(event.kind)
            .or_insert(LimitWindow { started: now, count: 0 });
        if now.duration_since(counter.started) >= window {
            counter.started = now;
            counter.count = 0;
        }
        counter.count += 1;
        if counter.count > self.max_events {
            return ChainOutcome::Cancelled {
                by: self.name(),
                reason: format!("rate limit exceeded for {}", event.kind.as_str()),
            };
        }
        next.run(event)
    }
}

/// Rejects events whose payload variant disagrees with the declared kind or
/// whose fields break the registry constraints. In non-strict mode it only
/// warns.
pub struct ValidationMiddleware {
    strict: bool,
}

impl ValidationMiddleware {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }
}

impl Middleware for ValidationMiddleware {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn handle(&mut self, event: GameEvent, next: Next<'_>) -> ChainOutcome {
        let declared = event.kind;
        let actual = event.payload.kind();
        let problem = if declared != actual {
            Some(format!(
                "payload of {} emitted under {}",
                actual.as_str(),
                declared.as_str()
            ))
        } else {
            event.payload.check_fields().err()
        };

        match problem {
            None => next.run(event),
            Some(reason) if self.strict => ChainOutcome::Cancelled {
                by: self.name(),
                reason,
            },
            Some(reason) => {
                log::warn!("invalid event {}: {reason}", declared.as_str());
                next.run(event)
            }
        }
    }
}

/// Structured line per event; payload included on request, noisy kinds
/// excludable. Never cancels.
pub struct LoggingMiddleware {
    include_payload: bool,
    exclude: HashSet<EventKind>,
}

impl LoggingMiddleware {
    pub fn new(include_payload: bool, exclude: HashSet<EventKind>) -> Self {
        Self { include_payload, exclude }
    }
}

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn handle(&mut self, event: GameEvent, next: Next<'_>) -> ChainOutcome {
        if !self.exclude.contains(&event.kind) {
            if self.include_payload {
                match serde_json::to_string(&event.payload) {
                    Ok(payload) => log::debug!(
                        "[{}] event {} #{} {payload}",
                        event.game_code,
                        event.kind.as_str(),
                        event.event_id
                    ),
                    Err(_) => log::debug!(
                        "[{}] event {} #{}",
                        event.game_code,
                        event.kind.as_str(),
                        event.event_id
                    ),
                }
            } else {
                log::debug!(
                    "[{}] event {} #{}",
                    event.game_code,
                    event.kind.as_str(),
                    event.event_id
                );
            }
        }
        next.run(event)
    }
}

/// The recommended chain, outermost first. Any other composition is legal.
pub fn standard_stack(
    slow_threshold: Duration,
    rate_window: Duration,
    rate_max: u32,
    strict_validation: bool,
) -> Vec<Box<dyn Middleware>> {
    let exempt: HashSet<EventKind> = [
        EventKind::SystemWarning,
        EventKind::SystemError,
        EventKind::GameError,
    ]
    .into_iter()
    .collect();
    vec![
        Box::new(ErrorHandlingMiddleware),
        Box::new(PerformanceMiddleware::new(slow_threshold)),
        Box::new(RateLimitMiddleware::new(rate_window, rate_max, exempt)),
        Box::new(ValidationMiddleware::new(strict_validation)),
        Box::new(LoggingMiddleware::new(false, HashSet::new())),
    ]
}
