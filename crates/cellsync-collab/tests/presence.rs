use std::time::Duration;

use cellsync_collab::{
    BrokerConnection, ClientPresence, CollabConfig, CollabSession, Event, LocalBroker, Message, Seq,
};
use cellsync_core::{ClientId, Position, SheetId};
use cellsync_engine::{EngineConfig, SpreadsheetEngine};
use cellsync_history::Command;
use tokio::time::advance;

type Session = CollabSession<BrokerConnection>;

fn config() -> CollabConfig {
    CollabConfig {
        debounce: Duration::from_millis(100),
        presence_timeout: Duration::from_secs(10),
        channel_capacity: 256,
        ..CollabConfig::default()
    }
}

fn session(broker: &LocalBroker, id: &str, name: &str) -> Session {
    let engine = SpreadsheetEngine::new(ClientId::from(id)).unwrap();
    CollabSession::new(engine, broker.connect(), name, config())
}

fn sheet1() -> SheetId {
    SheetId::from("sheet1")
}

fn settle(sessions: &mut [&mut Session]) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let before = sessions[0].transport().broker().seq();
        for session in sessions.iter_mut() {
            events.extend(session.sync().unwrap());
        }
        if sessions[0].transport().broker().seq() == before {
            return events;
        }
    }
}

/// Past the debounce window
async fn wait() {
    advance(Duration::from_millis(200)).await;
}

fn at(client: &str, name: &str, col: u32, row: u32) -> ClientPresence {
    ClientPresence {
        client: ClientId::from(client),
        name: name.to_string(),
        position: Some(Position::new(sheet1(), col, row)),
    }
}

fn trio(broker: &LocalBroker) -> (Session, Session, Session) {
    let mut alice = session(broker, "alice", "Alice");
    let mut bob = session(broker, "bob", "Bob");
    let mut charlie = session(broker, "charlie", "Charlie");
    alice.join().unwrap();
    bob.join().unwrap();
    charlie.join().unwrap();
    settle(&mut [&mut alice, &mut bob, &mut charlie]);
    (alice, bob, charlie)
}

fn presence_from(broker: &LocalBroker, client: &str, after: Seq) -> Vec<Position> {
    broker
        .log()
        .into_iter()
        .filter(|envelope| envelope.seq > after)
        .filter_map(|envelope| match envelope.message {
            Message::Presence { client: from, position, .. } if from == ClientId::from(client) => Some(position),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_everyone_starts_in_a1() {
    let broker = LocalBroker::from_config(&config());
    let (alice, bob, charlie) = trio(&broker);

    let expected = vec![at("alice", "Alice", 0, 0), at("bob", "Bob", 0, 0), at("charlie", "Charlie", 0, 0)];
    for session in [&alice, &bob, &charlie] {
        assert_eq!(session.connected_clients(), expected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_active_cell_is_transferred() {
    let broker = LocalBroker::from_config(&config());
    let (mut alice, mut bob, mut charlie) = trio(&broker);
    let mark = broker.seq();

    alice.dispatch(Command::SelectCell { col: 2, row: 2 }).unwrap();
    bob.dispatch(Command::MovePosition {
        delta_col: 1,
        delta_row: 1,
    })
    .unwrap();
    settle(&mut [&mut alice, &mut bob, &mut charlie]);
    // Still inside the debounce window
    assert_eq!(broker.seq(), mark);

    wait().await;
    settle(&mut [&mut alice, &mut bob, &mut charlie]);
    let expected = vec![at("alice", "Alice", 2, 2), at("bob", "Bob", 1, 1), at("charlie", "Charlie", 0, 0)];
    for session in [&alice, &bob, &charlie] {
        assert_eq!(session.connected_clients(), expected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_selecting_same_cell_sends_nothing() {
    let broker = LocalBroker::from_config(&config());
    let (mut alice, mut bob, mut charlie) = trio(&broker);

    alice.dispatch(Command::SelectCell { col: 1, row: 0 }).unwrap();
    wait().await;
    settle(&mut [&mut alice, &mut bob, &mut charlie]);
    let mark = broker.seq();

    alice.dispatch(Command::SelectCell { col: 1, row: 0 }).unwrap();
    wait().await;
    alice.sync().unwrap();
    assert_eq!(broker.seq(), mark);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_moves_are_coalesced() {
    let broker = LocalBroker::from_config(&config());
    let mut alice = session(&broker, "alice", "Alice");
    alice.join().unwrap();
    alice.sync().unwrap();
    let mark = broker.seq();

    alice.dispatch(Command::SelectCell { col: 1, row: 0 }).unwrap();
    advance(Duration::from_millis(50)).await;
    alice.sync().unwrap();
    alice.dispatch(Command::SelectCell { col: 2, row: 0 }).unwrap();
    advance(Duration::from_millis(50)).await;
    alice.sync().unwrap();
    alice.dispatch(Command::SelectCell { col: 3, row: 0 }).unwrap();
    assert!(presence_from(&broker, "alice", mark).is_empty());

    advance(Duration::from_millis(150)).await;
    alice.sync().unwrap();
    assert_eq!(presence_from(&broker, "alice", mark), vec![Position::new(sheet1(), 3, 0)]);
}

#[tokio::test(start_paused = true)]
async fn test_cursor_follows_remote_insert() {
    let broker = LocalBroker::from_config(&config());
    let (mut alice, mut bob, mut charlie) = trio(&broker);
    alice.dispatch(Command::SelectCell { col: 1, row: 0 }).unwrap();
    wait().await;
    settle(&mut [&mut alice, &mut bob, &mut charlie]);

    bob.dispatch(Command::InsertColumns {
        sheet: sheet1(),
        index: 1,
        count: 2,
    })
    .unwrap();
    settle(&mut [&mut alice, &mut bob, &mut charlie]);

    let expected = vec![at("alice", "Alice", 3, 0), at("bob", "Bob", 0, 0), at("charlie", "Charlie", 0, 0)];
    for session in [&alice, &bob, &charlie] {
        assert_eq!(session.connected_clients(), expected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_cursor_follows_own_insert() {
    let broker = LocalBroker::from_config(&config());
    let (mut alice, mut bob, mut charlie) = trio(&broker);

    bob.dispatch(Command::SelectCell { col: 1, row: 0 }).unwrap();
    alice.dispatch(Command::SelectCell { col: 1, row: 0 }).unwrap();
    alice
        .dispatch(Command::InsertColumns {
            sheet: sheet1(),
            index: 1,
            count: 2,
        })
        .unwrap();
    wait().await;
    settle(&mut [&mut alice, &mut bob, &mut charlie]);

    let expected = vec![at("alice", "Alice", 3, 0), at("bob", "Bob", 3, 0), at("charlie", "Charlie", 0, 0)];
    for session in [&alice, &bob, &charlie] {
        assert_eq!(session.connected_clients(), expected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_leave_removes_presence() {
    let broker = LocalBroker::from_config(&config());
    let (mut alice, mut bob, mut charlie) = trio(&broker);

    charlie.leave().unwrap();
    let events = settle(&mut [&mut alice, &mut bob]);
    assert_eq!(
        events.iter().filter(|event| **event == Event::Left(ClientId::from("charlie"))).count(),
        2
    );
    let expected = vec![at("alice", "Alice", 0, 0), at("bob", "Bob", 0, 0)];
    assert_eq!(alice.connected_clients(), expected);
    assert_eq!(bob.connected_clients(), expected);
}

#[tokio::test(start_paused = true)]
async fn test_silent_client_expires() {
    let broker = LocalBroker::from_config(&config());
    let (mut alice, mut bob, _charlie) = trio(&broker);

    advance(Duration::from_secs(6)).await;
    alice.sync().unwrap();
    bob.sync().unwrap();

    advance(Duration::from_secs(6)).await;
    let events = alice.sync().unwrap();
    assert!(events.contains(&Event::Expired(ClientId::from("charlie"))));
    assert!(!events.contains(&Event::Expired(ClientId::from("bob"))));
    assert!(alice.peer(&ClientId::from("charlie")).is_none());
    assert!(alice.peer(&ClientId::from("bob")).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_late_joiner_is_greeted() {
    let broker = LocalBroker::from_config(&config());
    let (mut alice, mut bob, mut charlie) = trio(&broker);
    alice.dispatch(Command::SelectCell { col: 2, row: 2 }).unwrap();
    wait().await;
    settle(&mut [&mut alice, &mut bob, &mut charlie]);

    let checkpoint = alice.checkpoint().unwrap();
    let engine =
        SpreadsheetEngine::from_snapshot(ClientId::from("david"), EngineConfig::default(), &checkpoint.snapshot).unwrap();
    let transport = broker.connect_from(checkpoint.seq);
    let mut david = CollabSession::resume(engine, transport, "David", config(), checkpoint);
    david.join().unwrap();
    let events = settle(&mut [&mut alice, &mut bob, &mut charlie, &mut david]);
    assert_eq!(
        events.iter().filter(|event| **event == Event::Joined(ClientId::from("david"))).count(),
        3
    );

    let expected = vec![
        at("alice", "Alice", 2, 2),
        at("bob", "Bob", 0, 0),
        at("charlie", "Charlie", 0, 0),
        at("david", "David", 0, 0),
    ];
    for session in [&alice, &bob, &charlie, &david] {
        assert_eq!(session.connected_clients(), expected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_step_waits_for_debounce() {
    let broker = LocalBroker::from_config(&config());
    let mut alice = session(&broker, "alice", "Alice");

    alice.dispatch(Command::SelectCell { col: 1, row: 1 }).unwrap();
    let started = tokio::time::Instant::now();
    alice.step().await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(presence_from(&broker, "alice", 0), vec![Position::new(sheet1(), 1, 1)]);
}
