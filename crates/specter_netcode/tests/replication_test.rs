//! Integration tests for the replication session.

use bytemuck::{Pod, Zeroable};
use specter_netcode::schema::capture;
use specter_netcode::{
    Anomaly, ArchetypeId, ChannelSink, Component, EntityId, FieldDescriptor, FieldReader,
    FieldValue, FieldWriter, GhostArchetype, GhostMap, MessageBatch, NetId, PacketWriter,
    MessageKind, NetcodeError, PacketReader, ReplicationConfig, ReplicationSession, Tick,
    SERVER_OWNER,
};

// ============================================================================
// TEST ARCHETYPE
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct CharacterState {
    translation: [f32; 3],
    health: u32,
    target: EntityId,
}

impl Component for CharacterState {}

struct Character;

impl GhostArchetype for Character {
    type Components = CharacterState;
    const ID: ArchetypeId = ArchetypeId(1);
    const NAME: &'static str = "character";
    const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::vec3("translation"),
        FieldDescriptor::uint("health"),
        FieldDescriptor::ghost_ref("target"),
    ];

    fn apply(fields: &mut FieldReader<'_>, state: &mut CharacterState) {
        state.translation = fields.vec3(0);
        state.health = fields.uint(1);
        state.target = fields.entity(2);
    }

    fn capture(state: &CharacterState, fields: &mut FieldWriter<'_>) {
        fields.push_vec3(state.translation);
        fields.push_uint(state.health);
        fields.push_entity(state.target);
    }
}

const LOCAL_OWNER: u32 = 7;

fn session_with(config: ReplicationConfig) -> ReplicationSession {
    let mut session = ReplicationSession::connect(config, LOCAL_OWNER).unwrap();
    session.register::<Character>().unwrap();
    session
}

fn session() -> ReplicationSession {
    session_with(ReplicationConfig::default())
}

fn fields(x: f32, health: u32, target: Option<NetId>) -> Vec<FieldValue> {
    vec![
        FieldValue::Vec3([x, 0.0, 0.0]),
        FieldValue::UInt(health),
        FieldValue::GhostRef(target),
    ]
}

fn spawn(session: &mut ReplicationSession, net_id: NetId, owner: u32) -> EntityId {
    let mut batch = MessageBatch::new();
    batch.spawn(net_id, Character::ID, owner);
    session.receive(batch);
    session.resolve(net_id).unwrap()
}

fn snapshot(session: &mut ReplicationSession, tick: u32, net_id: NetId, x: f32) {
    let mut batch = MessageBatch::new();
    batch.snapshot(Tick::new(tick), net_id, fields(x, 100, None));
    session.receive(batch);
}

fn x_of(session: &ReplicationSession, entity: EntityId) -> f32 {
    session.component::<Character>(entity).unwrap().translation[0]
}

// ============================================================================
// INTERPOLATION
// ============================================================================

#[test]
fn test_interpolation_end_to_end() {
    let mut session = session();
    let ghost = spawn(&mut session, NetId(1), SERVER_OWNER);
    for (tick, x) in [(10, 0.0), (20, 10.0), (30, 20.0)] {
        snapshot(&mut session, tick, NetId(1), x);
    }

    let report = session.interpolate(Tick::new(20), 0.5);

    assert_eq!(report.applied, 1);
    assert_eq!(x_of(&session, ghost), 15.0);
    assert_eq!(
        session.sample_interpolated(ghost, Tick::new(20), 0.5),
        Some(fields(15.0, 100, None))
    );
    assert_eq!(session.latest_tick(ghost), Tick::new(30));
}

#[test]
fn test_interpolation_without_history_keeps_spawn_state() {
    let mut session = session();
    let ghost = spawn(&mut session, NetId(1), SERVER_OWNER);
    snapshot(&mut session, 50, NetId(1), 9.0);

    let report = session.interpolate(Tick::new(40), 0.0);

    assert_eq!(report.applied, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        session.component::<Character>(ghost),
        Some(&CharacterState::default())
    );
}

#[test]
fn test_interpolation_across_tick_wrap() {
    let mut session = session();
    let ghost = spawn(&mut session, NetId(1), SERVER_OWNER);
    snapshot(&mut session, u32::MAX - 1, NetId(1), 0.0);
    snapshot(&mut session, 1, NetId(1), 3.0);

    let report = session.interpolate(Tick::new(u32::MAX), 0.0);

    assert_eq!(report.latest.min(), Tick::new(1));
    assert!((x_of(&session, ghost) - 1.0).abs() < 1e-5);
}

// ============================================================================
// PREDICTION
// ============================================================================

#[test]
fn test_first_snapshot_sets_prediction_start() {
    let mut session = session();
    let ghost = spawn(&mut session, NetId(2), LOCAL_OWNER);
    assert!(session.is_predicted(ghost));
    assert_eq!(session.prediction_start_tick(ghost), Some(Tick::NONE));

    snapshot(&mut session, 100, NetId(2), 1.0);
    let report = session.predict(Tick::new(100), 1.0);

    assert_eq!(report.applied, 1);
    assert_eq!(session.prediction_start_tick(ghost), Some(Tick::new(100)));
    assert_eq!(session.oldest_prediction_start_tick(), Tick::new(100));
    assert_eq!(x_of(&session, ghost), 1.0);
}

#[test]
fn test_stable_snapshot_reapplies_server_value() {
    let mut session = session();
    let ghost = spawn(&mut session, NetId(2), LOCAL_OWNER);
    snapshot(&mut session, 100, NetId(2), 1.0);

    session.predict(Tick::new(100), 1.0);
    session.component_mut::<Character>(ghost).unwrap().translation[0] = 4.0;
    session.predict(Tick::new(100), 1.0);

    assert_eq!(session.prediction_start_tick(ghost), Some(Tick::new(100)));
    assert_eq!(x_of(&session, ghost), 1.0);
}

#[test]
fn test_prediction_runs_ahead_then_corrects() {
    let mut session = session();
    let ghost = spawn(&mut session, NetId(2), LOCAL_OWNER);
    snapshot(&mut session, 100, NetId(2), 1.0);

    session.predict(Tick::new(105), 1.0);
    session.component_mut::<Character>(ghost).unwrap().translation[0] = 6.0;

    // No new server data: keep the locally predicted state.
    let report = session.predict(Tick::new(106), 1.0);
    assert_eq!(report.applied, 0);
    assert_eq!(session.prediction_start_tick(ghost), Some(Tick::new(105)));
    assert_eq!(x_of(&session, ghost), 6.0);
    assert!(!session.should_predict(ghost, Tick::new(105)));
    assert!(session.should_predict(ghost, Tick::new(106)));

    // A newer server record arrives: roll back to it.
    snapshot(&mut session, 103, NetId(2), 2.5);
    let report = session.predict(Tick::new(107), 1.0);
    assert_eq!(report.applied, 1);
    assert_eq!(session.prediction_start_tick(ghost), Some(Tick::new(103)));
    assert_eq!(x_of(&session, ghost), 2.5);
    assert_eq!(session.rollback_base(ghost).map(|r| r.tick), Some(Tick::new(103)));

    let replay: Vec<u32> = session.replay_plan(Tick::new(107)).map(Tick::get).collect();
    assert_eq!(replay, vec![104, 105, 106, 107]);

    // Replay reads the last known input at each tick; 106 was never sent.
    let mut inputs = session.input_history::<i8>();
    for (tick, input) in [(103, 1), (104, 1), (105, -1), (107, 0)] {
        assert!(inputs.add(Tick::new(tick), input));
    }
    let replayed: Vec<Option<i8>> = session
        .replay_plan(Tick::new(107))
        .map(|tick| inputs.input_at(tick))
        .collect();
    assert_eq!(replayed, vec![Some(1), Some(-1), Some(-1), Some(0)]);
    assert_eq!(inputs.capacity(), ReplicationConfig::default().input_history_capacity);
}

#[test]
fn test_partial_step_restarts_from_server_record() {
    let mut session = session();
    let ghost = spawn(&mut session, NetId(2), LOCAL_OWNER);
    snapshot(&mut session, 100, NetId(2), 1.0);

    session.predict(Tick::new(104), 0.5);
    assert_eq!(session.last_predicted_tick(), Tick::NONE);

    session.component_mut::<Character>(ghost).unwrap().translation[0] = 9.0;
    session.predict(Tick::new(105), 1.0);

    assert_eq!(session.prediction_start_tick(ghost), Some(Tick::new(100)));
    assert_eq!(x_of(&session, ghost), 1.0);
}

#[test]
fn test_prediction_across_tick_wrap() {
    let mut session = session();
    let ghost = spawn(&mut session, NetId(2), LOCAL_OWNER);
    snapshot(&mut session, u32::MAX - 1, NetId(2), 1.0);

    session.predict(Tick::new(u32::MAX), 1.0);
    let report = session.predict(Tick::new(1), 1.0);

    assert_eq!(report.applied, 0);
    assert_eq!(session.prediction_start_tick(ghost), Some(Tick::new(u32::MAX)));
    let replay: Vec<u32> = session.replay_plan(Tick::new(1)).map(Tick::get).collect();
    assert_eq!(replay, vec![1]);
}

#[test]
fn test_missing_history_is_a_buffer_miss() {
    let mut session = session();
    let (sink, anomalies) = ChannelSink::unbounded();
    session.set_sink(sink);
    spawn(&mut session, NetId(2), LOCAL_OWNER);

    let report = session.predict(Tick::new(10), 1.0);

    assert_eq!(report.buffer_misses, 1);
    assert_eq!(report.oldest_prediction_start, Tick::NONE);
    assert!(anomalies
        .try_iter()
        .any(|a| matches!(a, Anomaly::BufferMiss { count: 1, .. })));
}

#[test]
fn test_remote_and_predicted_ghosts_are_separated() {
    let mut session = session();
    let remote = spawn(&mut session, NetId(1), SERVER_OWNER);
    let other_player = spawn(&mut session, NetId(3), LOCAL_OWNER + 1);
    let owned = spawn(&mut session, NetId(2), LOCAL_OWNER);
    for net_id in [NetId(1), NetId(2), NetId(3)] {
        snapshot(&mut session, 10, net_id, 2.0);
    }

    let predicted = session.predict(Tick::new(10), 1.0);
    let interpolated = session.interpolate(Tick::new(10), 0.0);

    assert_eq!(predicted.applied, 1);
    assert_eq!(interpolated.applied, 2);
    assert!(!session.is_predicted(remote));
    assert!(!session.is_predicted(other_player));
    assert!(session.is_predicted(owned));
}

// ============================================================================
// RECEIVE PATH
// ============================================================================

#[test]
fn test_packet_round_trip_through_session() {
    // Server side: two ghosts, one targeting the other.
    let mut server_map = GhostMap::new();
    let server_hero = EntityId::new(0, 1);
    let server_enemy = EntityId::new(1, 1);
    server_map.bind(NetId(10), server_hero).unwrap();
    server_map.bind(NetId(11), server_enemy).unwrap();

    let hero = CharacterState {
        translation: [1.0, 2.0, 3.0],
        health: 80,
        target: server_enemy,
    };
    let enemy = CharacterState {
        translation: [5.0, 0.0, 5.0],
        health: 40,
        target: EntityId::NULL,
    };

    let mut writer = PacketWriter::new();
    writer.write_spawn(NetId(10), Character::ID, SERVER_OWNER).unwrap();
    writer.write_spawn(NetId(11), Character::ID, SERVER_OWNER).unwrap();
    writer
        .write_snapshot(Tick::new(64), NetId(10), &capture::<Character>(&hero, &server_map))
        .unwrap();
    writer
        .write_snapshot(Tick::new(64), NetId(11), &capture::<Character>(&enemy, &server_map))
        .unwrap();

    // Client side.
    let mut session = session();
    let report = session.receive_packet(writer.as_slice()).unwrap();
    assert_eq!(report.spawned, 2);
    assert_eq!(report.inserted, 2);

    session.interpolate(Tick::new(64), 0.0);

    let client_hero = session.resolve(NetId(10)).unwrap();
    let client_enemy = session.resolve(NetId(11)).unwrap();
    let state = session.component::<Character>(client_hero).unwrap();
    assert_eq!(state.translation, [1.0, 2.0, 3.0]);
    assert_eq!(state.health, 80);
    assert_eq!(state.target, client_enemy);
    assert_eq!(
        session.component::<Character>(client_enemy).unwrap().target,
        EntityId::NULL
    );
}

#[test]
fn test_stale_and_unknown_snapshots_are_counted() {
    let mut session = session();
    spawn(&mut session, NetId(1), SERVER_OWNER);

    let mut batch = MessageBatch::new();
    batch
        .snapshot(Tick::new(7), NetId(1), fields(1.0, 1, None))
        .snapshot(Tick::new(5), NetId(1), fields(2.0, 1, None))
        .snapshot(Tick::new(8), NetId(42), fields(3.0, 1, None));
    let report = session.receive(batch);

    assert_eq!(report.inserted, 1);
    assert_eq!(report.stale, 1);
    assert_eq!(report.unknown, 1);
}

#[test]
fn test_despawn_is_applied_after_snapshots() {
    let mut session = session();
    let ghost = spawn(&mut session, NetId(1), SERVER_OWNER);

    let mut batch = MessageBatch::new();
    batch
        .despawn(NetId(1))
        .snapshot(Tick::new(3), NetId(1), fields(1.0, 1, None))
        .spawn(NetId(2), Character::ID, SERVER_OWNER)
        .snapshot(Tick::new(3), NetId(2), fields(2.0, 1, None));
    let report = session.receive(batch);

    assert_eq!(report.inserted, 2);
    assert_eq!(report.despawned, 1);
    assert_eq!(session.resolve(NetId(1)), None);
    assert!(session.component::<Character>(ghost).is_none());
    assert_eq!(session.latest_tick(ghost), Tick::NONE);

    snapshot(&mut session, 4, NetId(1), 1.0);
    assert_eq!(session.ghost_count(), 1);
}

#[test]
fn test_snapshot_for_unknown_ghost_does_not_break_packet() {
    let mut writer = PacketWriter::new();
    writer
        .write_snapshot(Tick::new(9), NetId(77), &fields(1.0, 1, None))
        .unwrap();
    writer.write_spawn(NetId(1), Character::ID, SERVER_OWNER).unwrap();
    writer
        .write_snapshot(Tick::new(9), NetId(1), &fields(4.0, 1, None))
        .unwrap();

    let mut session = session();
    let report = session.receive_packet(writer.as_slice()).unwrap();

    assert_eq!(report.unknown, 1);
    assert_eq!(report.inserted, 1);
}

#[test]
fn test_snapshot_ahead_of_spawn_lands_on_both_paths() {
    let mut batch = MessageBatch::new();
    batch
        .snapshot(Tick::new(9), NetId(1), fields(4.0, 1, None))
        .spawn(NetId(1), Character::ID, SERVER_OWNER);

    let mut writer = PacketWriter::new();
    for message in batch.messages() {
        writer.write_message(message).unwrap();
    }
    let decoded = PacketReader::new(writer.as_slice())
        .read_batch(&session())
        .unwrap();
    assert_eq!(decoded.messages(), batch.messages());

    let mut direct = session();
    let mut packet = session();
    let from_batch = direct.receive(batch);
    let from_packet = packet.receive_packet(writer.as_slice()).unwrap();

    assert_eq!(from_batch, from_packet);
    assert_eq!(from_packet.inserted, 1);
    assert_eq!(from_packet.unknown, 0);
    let ghost = packet.resolve(NetId(1)).unwrap();
    assert_eq!(packet.latest_tick(ghost), Tick::new(9));
}

#[test]
fn test_bad_spawn_does_not_drop_rest_of_packet() {
    let mut session = session();
    let (sink, anomalies) = ChannelSink::unbounded();
    session.set_sink(sink);
    let leaving = spawn(&mut session, NetId(1), SERVER_OWNER);
    let staying = spawn(&mut session, NetId(2), SERVER_OWNER);

    let mut writer = PacketWriter::new();
    writer.write_spawn(NetId(9), ArchetypeId(77), SERVER_OWNER).unwrap();
    writer
        .write_snapshot(Tick::new(12), NetId(2), &fields(3.0, 1, None))
        .unwrap();
    writer.write_despawn(NetId(1)).unwrap();
    let report = session.receive_packet(writer.as_slice()).unwrap();

    assert_eq!(report.rejected, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.despawned, 1);
    assert_eq!(session.resolve(NetId(1)), None);
    assert!(session.component::<Character>(leaving).is_none());
    assert_eq!(session.latest_tick(staying), Tick::new(12));
    assert_eq!(
        anomalies.try_recv(),
        Ok(Anomaly::RejectedMessage {
            kind: MessageKind::Spawn,
            net_id: NetId(9),
            reason: NetcodeError::UnknownArchetype(ArchetypeId(77)),
        })
    );
}

// ============================================================================
// DIAGNOSTICS
// ============================================================================

#[test]
fn test_unresolved_reference_reported_once() {
    let mut session = session();
    let (sink, anomalies) = ChannelSink::unbounded();
    session.set_sink(sink);

    let ghost = spawn(&mut session, NetId(1), SERVER_OWNER);
    let mut batch = MessageBatch::new();
    batch.snapshot(Tick::new(5), NetId(1), fields(0.0, 1, Some(NetId(99))));
    session.receive(batch);

    let first = session.interpolate(Tick::new(5), 0.0);
    let second = session.interpolate(Tick::new(5), 0.0);

    assert_eq!(first.unresolved, 1);
    assert_eq!(second.unresolved, 1);
    assert_eq!(
        session.component::<Character>(ghost).unwrap().target,
        EntityId::NULL
    );
    let reported: Vec<Anomaly> = anomalies
        .try_iter()
        .filter(|a| matches!(a, Anomaly::UnresolvedReference { .. }))
        .collect();
    assert_eq!(
        reported,
        vec![Anomaly::UnresolvedReference {
            archetype: "character",
            field: "target",
        }]
    );

    // Once the target is spawned the same record resolves.
    let target = spawn(&mut session, NetId(99), SERVER_OWNER);
    let third = session.interpolate(Tick::new(5), 0.0);
    assert_eq!(third.unresolved, 0);
    assert_eq!(session.component::<Character>(ghost).unwrap().target, target);
}

#[test]
fn test_desync_is_forwarded_to_sink() {
    let config = ReplicationConfig {
        desync_threshold_ticks: 5,
        ..ReplicationConfig::default()
    };
    let mut session = session_with(config);
    let (sink, anomalies) = ChannelSink::unbounded();
    session.set_sink(sink);

    spawn(&mut session, NetId(1), SERVER_OWNER);
    spawn(&mut session, NetId(2), SERVER_OWNER);
    snapshot(&mut session, 10, NetId(1), 0.0);
    snapshot(&mut session, 30, NetId(2), 0.0);

    let report = session.interpolate(Tick::new(10), 0.0);

    assert!(report.desync);
    assert_eq!(report.latest.spread(), 20);
    assert!(anomalies.try_iter().any(|a| a
        == Anomaly::DesyncDetected {
            min: Tick::new(10),
            max: Tick::new(30),
            spread: 20,
            threshold: 5,
        }));
}

#[test]
fn test_parallel_and_sequential_passes_agree() {
    let sequential = ReplicationConfig {
        parallel_threshold: usize::MAX,
        ..ReplicationConfig::default()
    };
    let parallel = ReplicationConfig {
        parallel_threshold: 0,
        chunk_size: 7,
        ..ReplicationConfig::default()
    };

    let mut results = Vec::new();
    for config in [sequential, parallel] {
        let mut session = session_with(config);
        let mut batch = MessageBatch::new();
        for id in 1..=500u32 {
            batch.spawn(NetId(id), Character::ID, SERVER_OWNER);
            batch.snapshot(Tick::new(id), NetId(id), fields(id as f32, id, None));
        }
        session.receive(batch);

        let report = session.interpolate(Tick::new(600), 0.0);
        let xs: Vec<f32> = (1..=500u32)
            .map(|id| x_of(&session, session.resolve(NetId(id)).unwrap()))
            .collect();
        results.push((report, xs));
    }

    assert_eq!(results[0].0, results[1].0);
    assert_eq!(results[0].1, results[1].1);
    assert_eq!(results[0].0.latest.min(), Tick::new(1));
    assert_eq!(results[0].0.latest.max(), Tick::new(500));
}
