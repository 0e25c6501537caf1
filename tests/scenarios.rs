use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

use warlock::content::StaticCatalog;
use warlock::game::GameConfig;
use warlock::game::bus::{EmitOptions, EventBus};
use warlock::game::event::{EventKind, EventPayload, MONSTER_TARGET};
use warlock::game::middleware::{ChainOutcome, Middleware, Next, standard_stack};
use warlock::game::phase::GamePhase;
use warlock::game::processor::ActionData;
use warlock::game::room::{Room, RoomInput, RoomSnapshot};
use warlock::server::protocol::SessionManager;

struct Harness {
    room: Room,
    sessions: Arc<SessionManager>,
    receivers: Vec<UnboundedReceiver<Vec<u8>>>,
}

const SEATS: [(&str, &str); 4] = [
    ("artisan", "pyromancer"),
    ("orc", "warrior"),
    ("kinfolk", "priest"),
    ("lich", "wizard"),
];

/// A seated lobby with real outbound channels, one per player.
fn harness(players: usize, config: GameConfig) -> Harness {
    let sessions = Arc::new(SessionManager::default());
    let mut room = Room::new(
        "1234".into(),
        Arc::new(StaticCatalog::default()),
        config,
        Arc::clone(&sessions),
    );
    let mut receivers = Vec::new();
    for i in 0..players {
        let (connection_id, rx) = sessions.connect();
        receivers.push(rx);
        let id = format!("p{}", i + 1);
        room.handle_input(RoomInput::Join {
            player_id: id.clone(),
            connection_id,
            player_name: format!("Player{}", i + 1),
        });
        let (race, class) = SEATS[i % SEATS.len()];
        room.handle_input(RoomInput::SelectCharacter {
            player_id: id,
            race: race.into(),
            class: class.into(),
        });
    }
    room.handle_input(RoomInput::StartGame {
        player_id: "p1".into(),
    });
    assert_eq!(room.phase().phase(), GamePhase::Action);
    Harness {
        room,
        sessions,
        receivers,
    }
}

fn drain(rx: &mut UnboundedReceiver<Vec<u8>>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(bytes) = rx.try_recv() {
        frames.push(serde_json::from_slice(&bytes).expect("valid JSON frame"));
    }
    frames
}

fn frames_of_type<'a>(frames: &'a [Value], name: &str) -> Vec<&'a Value> {
    frames.iter().filter(|f| f["type"] == name).collect()
}

fn attack(ability: &str, target: &str) -> ActionData {
    ActionData {
        action_type: ability.into(),
        target_id: Some(target.into()),
        ..ActionData::default()
    }
}

// S1: happy-path submission, private ack, resolution effects.
#[test]
fn s1_submission_ack_is_private_and_resolution_applies_damage() {
    // Corruption is disabled so a randomly-assigned warlock cannot flip the
    // round's outcome under the test's nose.
    let mut h = harness(
        3,
        GameConfig {
            conversion_chance: 0.0,
            ..GameConfig::default()
        },
    );
    h.room.handle_input(RoomInput::PerformAction {
        player_id: "p1".into(),
        data: attack("fireball", "p2"),
    });

    assert!(h.room.state().player("p1").unwrap().has_submitted_action);
    let p1_frames = drain(&mut h.receivers[0]);
    let p2_frames = drain(&mut h.receivers[1]);
    assert_eq!(frames_of_type(&p1_frames, "actionSubmitted").len(), 1);
    assert!(frames_of_type(&p2_frames, "actionSubmitted").is_empty());

    // Remaining players commit; the round resolves on the last submission.
    h.room.handle_input(RoomInput::PerformAction {
        player_id: "p2".into(),
        data: attack("slash", MONSTER_TARGET),
    });
    h.room.handle_input(RoomInput::PerformAction {
        player_id: "p3".into(),
        data: attack("smite", MONSTER_TARGET),
    });
    assert_eq!(h.room.phase().phase(), GamePhase::Results);

    let p1_frames = drain(&mut h.receivers[0]);
    assert_eq!(frames_of_type(&p1_frames, "actionExecuted").len(), 1);
    let damage_frames = frames_of_type(&p1_frames, "damageApplied");
    assert!(
        damage_frames
            .iter()
            .any(|f| f["targetId"] == "p2" && f["abilityId"] == "fireball")
    );

    let p2 = h.room.state().player("p2").unwrap();
    assert!(p2.hp < p2.max_hp);
    assert_eq!(
        h.room.state().player("p1").unwrap().cooldown_remaining("fireball"),
        2
    );
}

// S3: the rate limiter admits exactly the window budget.
#[test]
fn s3_rate_limiter_cancels_the_overflow() {
    let mut bus = EventBus::new("1234".into(), 2000);
    for middleware in standard_stack(
        Duration::from_millis(100),
        Duration::from_secs(60),
        100,
        true,
    ) {
        bus.add_middleware(middleware);
    }

    let mut passed = 0;
    let mut cancelled = 0;
    for i in 0..120 {
        let ok = bus.emit(
            EventKind::ActionSubmitted,
            EventPayload::ActionSubmitted {
                player_id: "p1".into(),
                action_type: "ability".into(),
                target_id: None,
                ability_id: Some(format!("spam{i}")),
                command_id: None,
            },
            EmitOptions::default(),
        );
        if ok { passed += 1 } else { cancelled += 1 }
    }
    assert_eq!(passed, 100);
    assert_eq!(cancelled, 20);

    let stats = bus.stats();
    assert_eq!(stats.events_emitted, 120);
    assert_eq!(stats.events_processed, 100);
    assert_eq!(stats.errors_handled, 20);
}

// S4: reconnect with a fresh connection id preserves the committed action.
#[test]
fn s4_reconnect_keeps_the_submission_and_receives_a_snapshot() {
    let mut h = harness(3, GameConfig::default());
    h.room.handle_input(RoomInput::PerformAction {
        player_id: "p2".into(),
        data: attack("slash", MONSTER_TARGET),
    });
    h.room.handle_input(RoomInput::Disconnect {
        player_id: "p2".into(),
    });
    assert!(!h.room.state().player("p2").unwrap().connected);

    let (new_connection, mut new_rx) = h.sessions.connect();
    h.room.handle_input(RoomInput::Reconnect {
        player_id: "p2".into(),
        connection_id: new_connection,
    });

    let p2 = h.room.state().player("p2").unwrap();
    assert!(p2.connected);
    assert!(p2.has_submitted_action);

    let frames = drain(&mut new_rx);
    let snapshot = frames_of_type(&frames, "stateSnapshot");
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0]["you"]["id"], "p2");

    // The disconnect surfaces in the results stream, after reconnection.
    h.room.resolve_now("timeout");
    let history = h.room.bus().history(512);
    let disconnect_at = history
        .iter()
        .position(|e| e.kind == EventKind::PlayerDisconnected)
        .expect("queued disconnect event");
    let reconnect_at = history
        .iter()
        .position(|e| e.kind == EventKind::PlayerReconnected)
        .expect("reconnect event");
    assert!(reconnect_at < disconnect_at);
}

// S5: majority-ready fast-forward after the grace window.
#[test]
fn s5_majority_ready_advances_after_grace() {
    let config = GameConfig {
        results_grace_millis: 10,
        ..GameConfig::default()
    };
    let mut h = harness(4, config);
    h.room.resolve_now("timeout");
    if h.room.is_over() {
        return;
    }
    assert_eq!(h.room.phase().phase(), GamePhase::Results);
    let round_before = h.room.phase().round();

    for id in ["p1", "p2", "p3"] {
        h.room.handle_input(RoomInput::NextReady {
            player_id: id.into(),
        });
    }
    assert_eq!(h.room.phase().phase(), GamePhase::Results);

    std::thread::sleep(Duration::from_millis(15));
    h.room.tick();
    assert_eq!(h.room.phase().phase(), GamePhase::Action);
    assert_eq!(h.room.phase().round(), round_before + 1);
    assert_eq!(h.room.phase().ready_count(), 0);

    let transitions = h
        .room
        .bus()
        .history(1024)
        .iter()
        .filter(|e| {
            matches!(
                &e.payload,
                EventPayload::PhaseChanged { old_phase: GamePhase::Results, new_phase: GamePhase::Action, .. }
            )
        })
        .count();
    assert_eq!(transitions, 1);
}

// S6: a custom middleware cancels foreign events before any handler runs.
#[test]
fn s6_custom_authorization_middleware_cancels_foreign_events() {
    struct RoomGuard {
        allowed: Vec<String>,
    }
    impl Middleware for RoomGuard {
        fn name(&self) -> &'static str {
            "roomGuard"
        }
        fn handle(&mut self, event: warlock::game::event::GameEvent, next: Next<'_>) -> ChainOutcome {
            let foreign = match &event.payload {
                EventPayload::ActionSubmitted { player_id, .. } => {
                    !self.allowed.contains(player_id)
                }
                _ => false,
            };
            if foreign {
                ChainOutcome::Cancelled {
                    by: "roomGuard",
                    reason: "player is not in this room".into(),
                }
            } else {
                next.run(event)
            }
        }
    }

    let mut bus = EventBus::new("1234".into(), 64);
    bus.add_middleware(Box::new(RoomGuard {
        allowed: vec!["p1".into()],
    }));
    let delivered = std::sync::Arc::new(std::sync::Mutex::new(0));
    let counter = std::sync::Arc::clone(&delivered);
    bus.on(
        EventKind::ActionSubmitted,
        Box::new(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        }),
        Default::default(),
    );

    let submitted = |player: &str| EventPayload::ActionSubmitted {
        player_id: player.into(),
        action_type: "ability".into(),
        target_id: None,
        ability_id: None,
        command_id: None,
    };

    assert!(bus.emit(EventKind::ActionSubmitted, submitted("p1"), EmitOptions::default()));
    assert!(!bus.emit(EventKind::ActionSubmitted, submitted("intruder"), EmitOptions::default()));

    assert_eq!(*delivered.lock().unwrap(), 1);
    let stats = bus.stats();
    assert_eq!(stats.events_emitted, 2);
    assert_eq!(stats.events_processed, 1);
}

// Warm restart: a phase-boundary snapshot restores to a playable room.
#[test]
fn snapshot_restores_into_a_playable_room() {
    let mut h = harness(3, GameConfig::default());
    h.room.handle_input(RoomInput::PerformAction {
        player_id: "p1".into(),
        data: attack("fireball", MONSTER_TARGET),
    });

    let encoded = serde_json::to_string(&h.room.snapshot()).unwrap();
    let decoded: RoomSnapshot = serde_json::from_str(&encoded).unwrap();

    let sessions = Arc::new(SessionManager::default());
    let mut restored = Room::restore(
        decoded,
        Arc::new(StaticCatalog::default()),
        GameConfig::default(),
        sessions,
    );
    assert_eq!(restored.phase().phase(), GamePhase::Action);
    assert!(restored.state().player("p1").unwrap().has_submitted_action);

    // The restored room still resolves a round. The in-flight command queue
    // is not part of the snapshot, so the pending action is re-driven from
    // the client on reconnect; the phase machinery itself must work.
    restored.resolve_now("timeout");
    assert_ne!(restored.phase().phase(), GamePhase::Action);
}

// Universal invariants over a few full rounds of play.
#[test]
fn hp_bounds_and_history_cap_hold_over_rounds() {
    let config = GameConfig {
        max_history: 64,
        ..GameConfig::default()
    };
    let mut h = harness(4, config);
    for _ in 0..5 {
        if h.room.is_over() {
            break;
        }
        for (i, (_, class)) in SEATS.iter().enumerate().take(4) {
            let ability = match *class {
                "pyromancer" => "fireball",
                "warrior" => "slash",
                "priest" => "smite",
                _ => "magicMissile",
            };
            h.room.handle_input(RoomInput::PerformAction {
                player_id: format!("p{}", i + 1),
                data: attack(ability, MONSTER_TARGET),
            });
        }
        if h.room.phase().phase() == GamePhase::Action {
            h.room.resolve_now("timeout");
        }
        for player in h.room.state().public_roster() {
            assert!(player.hp <= player.max_hp);
            if !player.is_alive {
                assert_eq!(player.hp, 0);
            }
        }
        assert!(h.room.bus().history_len() <= 64);
        if h.room.is_over() {
            break;
        }
        for i in 0..4 {
            h.room.handle_input(RoomInput::NextReady {
                player_id: format!("p{}", i + 1),
            });
        }
    }
}
