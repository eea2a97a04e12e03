//! Session state and authoritative tick loop

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::chat;
use crate::config::Config;
use crate::util::time::{snapshot_interval, tick_delta, tick_duration, Timer};
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::authority::{Authority, AuthorityResolver, EntityId, ParticipantId, Role};
use super::combat::CombatSystem;
use super::input::InputRecord;
use super::physics::{ArenaWorld, MovementConfig};
use super::player::PlayerEntity;
use super::rpc::{RpcCall, RpcChannel, RpcEnvelope};
use super::snapshot::SnapshotBuilder;

/// Inbound queue depth
const INPUT_QUEUE: usize = 256;
/// Outbound fan-out depth
const OUTBOUND_QUEUE: usize = 64;

/// A message from a participant, stamped with its transport-verified sender
#[derive(Debug, Clone)]
pub struct SessionInput {
    pub participant: ParticipantId,
    pub msg: ClientMsg,
}

/// A message for everyone or for one participant
#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: Option<ParticipantId>,
    pub msg: ServerMsg,
}

impl Outbound {
    pub fn all(msg: ServerMsg) -> Self {
        Self { to: None, msg }
    }

    pub fn to(participant: ParticipantId, msg: ServerMsg) -> Self {
        Self {
            to: Some(participant),
            msg,
        }
    }

    pub fn is_for(&self, participant: ParticipantId) -> bool {
        self.to.map_or(true, |to| to == participant)
    }
}

/// Picks the team of a newly spawned avatar
pub trait TeamPolicy: Send {
    fn assign(&mut self, players: &BTreeMap<EntityId, PlayerEntity>) -> u8;
}

/// First joiner gets team 0, everyone after gets team 1
#[derive(Debug, Default)]
pub struct JoinOrderTeams {
    joined: u32,
}

impl TeamPolicy for JoinOrderTeams {
    fn assign(&mut self, _players: &BTreeMap<EntityId, PlayerEntity>) -> u8 {
        let team = if self.joined == 0 { 0 } else { 1 };
        self.joined += 1;
        team
    }
}

/// Joins the smaller of two teams, team 0 on a tie
#[derive(Debug, Default)]
pub struct BalancedTeams;

impl TeamPolicy for BalancedTeams {
    fn assign(&mut self, players: &BTreeMap<EntityId, PlayerEntity>) -> u8 {
        let on_zero = players.values().filter(|p| p.team == 0).count();
        let on_one = players.values().filter(|p| p.team == 1).count();
        if on_one < on_zero {
            1
        } else {
            0
        }
    }
}

/// Team-keyed spawn points with seeded jitter
pub struct SpawnPoints {
    points: Vec<Vec3>,
    rng: ChaCha8Rng,
}

impl SpawnPoints {
    pub fn new(points: Vec<Vec3>, seed: u64) -> Self {
        Self {
            points,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Default layout: two points facing each other across the origin
    pub fn two_teams(seed: u64) -> Self {
        Self::new(vec![Vec3::new(0.0, 0.0, -8.0), Vec3::new(0.0, 0.0, 8.0)], seed)
    }

    /// Spawn position for `team`, jittered ±0.5 on x/z and dropped from 2 units up
    pub fn pick(&mut self, team: u8) -> Vec3 {
        let base = self
            .points
            .get(team as usize)
            .or_else(|| self.points.first())
            .copied()
            .unwrap_or(Vec3::ZERO);
        let jitter_x = self.rng.gen_range(-0.5..=0.5);
        let jitter_z = self.rng.gen_range(-0.5..=0.5);
        base + Vec3::new(jitter_x, 2.0, jitter_z)
    }
}

/// Tunables for one session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub tick_rate: u32,
    pub snapshot_rate: u32,
    pub max_players: usize,
    pub seed: u64,
    pub movement: MovementConfig,
    pub world: ArenaWorld,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick_rate: config.tick_rate,
            snapshot_rate: config.snapshot_rate,
            max_players: config.max_players,
            seed: config.session_seed.unwrap_or_else(rand::random),
            movement: MovementConfig::default(),
            world: ArenaWorld::flat(0.0),
        }
    }
}

/// Handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    /// The state authority of every entity in the session
    pub host: ParticipantId,
    pub tick_rate: u32,
    pub input_tx: mpsc::Sender<SessionInput>,
    pub outbound_tx: broadcast::Sender<Outbound>,
    pub player_count: Arc<AtomicUsize>,
}

impl SessionHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.outbound_tx.subscribe()
    }

    /// Queue a message for the next tick. Fails only once the session is gone.
    pub async fn submit(
        &self,
        participant: ParticipantId,
        msg: ClientMsg,
    ) -> Result<(), mpsc::error::SendError<SessionInput>> {
        self.input_tx.send(SessionInput { participant, msg }).await
    }
}

/// The authoritative session, owned by one task
pub struct Session {
    host: ParticipantId,
    tick: u64,
    next_entity: u32,
    dt: f32,
    max_players: usize,
    players: BTreeMap<EntityId, PlayerEntity>,
    entity_of: HashMap<ParticipantId, EntityId>,
    movement: MovementConfig,
    world: ArenaWorld,
    teams: Box<dyn TeamPolicy>,
    spawns: SpawnPoints,
    tick_rate: u32,
    input_rx: mpsc::Receiver<SessionInput>,
    outbound_tx: broadcast::Sender<Outbound>,
    snapshot_builder: SnapshotBuilder,
    player_count: Arc<AtomicUsize>,
}

impl AuthorityResolver for Session {
    fn authority(&self, entity: EntityId) -> Option<Authority> {
        self.players.get(&entity).map(|p| p.authority)
    }
}

impl Session {
    /// Create a new session
    pub fn new(settings: SessionSettings) -> (Self, SessionHandle) {
        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE);
        let (outbound_tx, _) = broadcast::channel(OUTBOUND_QUEUE);
        let player_count = Arc::new(AtomicUsize::new(0));
        let host = ParticipantId::new_random();

        let handle = SessionHandle {
            host,
            tick_rate: settings.tick_rate,
            input_tx,
            outbound_tx: outbound_tx.clone(),
            player_count: player_count.clone(),
        };

        let session = Self {
            host,
            tick: 0,
            next_entity: 1,
            dt: tick_delta(settings.tick_rate),
            max_players: settings.max_players,
            players: BTreeMap::new(),
            entity_of: HashMap::new(),
            movement: settings.movement,
            world: settings.world,
            teams: Box::new(JoinOrderTeams::default()),
            spawns: SpawnPoints::two_teams(settings.seed),
            tick_rate: settings.tick_rate,
            input_rx,
            outbound_tx,
            snapshot_builder: SnapshotBuilder::new(snapshot_interval(
                settings.tick_rate,
                settings.snapshot_rate,
            )),
            player_count,
        };

        (session, handle)
    }

    pub fn with_team_policy(mut self, policy: impl TeamPolicy + 'static) -> Self {
        self.teams = Box::new(policy);
        self
    }

    pub fn with_spawn_points(mut self, spawns: SpawnPoints) -> Self {
        self.spawns = spawns;
        self
    }

    pub fn host(&self) -> ParticipantId {
        self.host
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn entity(&self, id: EntityId) -> Option<&PlayerEntity> {
        self.players.get(&id)
    }

    pub fn entity_of(&self, participant: ParticipantId) -> Option<EntityId> {
        self.entity_of.get(&participant).copied()
    }

    pub fn players(&self) -> &BTreeMap<EntityId, PlayerEntity> {
        &self.players
    }

    /// Run the authoritative tick loop until every handle is dropped
    pub async fn run(mut self) {
        info!(host = %self.host, tick_rate = self.tick_rate, "Session started");

        let mut tick_interval = interval(tick_duration(self.tick_rate));
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let budget_micros = tick_duration(self.tick_rate).as_micros() as u64;

        loop {
            tick_interval.tick().await;

            let timer = Timer::new();
            let open = self.step();
            let elapsed = timer.elapsed_micros();
            if elapsed > budget_micros {
                warn!(tick = self.tick, elapsed_micros = elapsed, budget_micros, "Tick over budget");
            }

            if !open {
                break;
            }
        }

        info!(host = %self.host, ticks = self.tick, "Session closed");
    }

    /// One full tick: drain inbound, simulate, publish. Returns false once
    /// the inbound channel is closed.
    pub fn step(&mut self) -> bool {
        let open = self.process_inputs();
        self.run_tick();
        self.publish_snapshot();
        open
    }

    /// Drain the inbound queue in arrival order
    fn process_inputs(&mut self) -> bool {
        loop {
            match self.input_rx.try_recv() {
                Ok(input) => self.handle_message(input.participant, input.msg),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// Apply one message from `participant`
    pub fn handle_message(&mut self, participant: ParticipantId, msg: ClientMsg) {
        match msg {
            ClientMsg::Join => {
                self.handle_join(participant);
            }
            ClientMsg::Input { tick, input } => self.handle_input(participant, tick, input),
            ClientMsg::Rpc(envelope) => self.handle_rpc(participant, envelope),
            ClientMsg::Ping { t } => self.send(Outbound::to(participant, ServerMsg::Pong { t })),
            ClientMsg::Leave => self.handle_leave(participant),
        }
    }

    fn send(&self, outbound: Outbound) {
        // No receivers is fine; nobody is connected yet
        let _ = self.outbound_tx.send(outbound);
    }

    fn send_error(&self, participant: ParticipantId, code: &str, message: &str) {
        self.send(Outbound::to(
            participant,
            ServerMsg::Error {
                code: code.to_string(),
                message: message.to_string(),
            },
        ));
    }

    /// Spawn an avatar for `participant`. Returns its id when spawned.
    pub fn handle_join(&mut self, participant: ParticipantId) -> Option<EntityId> {
        if self.entity_of.contains_key(&participant) {
            warn!(participant = %participant, "Participant already has an avatar");
            self.send_error(participant, "already_joined", "Already in session");
            return None;
        }

        if self.players.len() >= self.max_players {
            self.send_error(participant, "session_full", "Session is full");
            return None;
        }

        let id = EntityId(self.next_entity);
        self.next_entity += 1;

        let team = self.teams.assign(&self.players);
        let position = self.spawns.pick(team);
        let player = PlayerEntity::spawn(
            id,
            Authority::new(participant, self.host),
            position,
            team,
            format!("Player {}", id.0),
        );

        self.players.insert(id, player);
        self.entity_of.insert(participant, id);
        self.player_count.store(self.players.len(), Ordering::Relaxed);

        self.send(Outbound::all(ServerMsg::PlayerJoined {
            entity_id: id,
            input_authority: participant,
            team,
        }));
        self.snapshot_builder.force_next();

        info!(
            entity_id = %id,
            participant = %participant,
            team,
            player_count = self.players.len(),
            "Avatar spawned"
        );
        Some(id)
    }

    fn handle_input(&mut self, participant: ParticipantId, tick: u64, input: InputRecord) {
        let Some(id) = self.entity_of(participant) else {
            debug!(participant = %participant, "Input from participant without avatar");
            return;
        };
        if let Some(player) = self.players.get_mut(&id) {
            player.accept_input(tick, input);
        }
    }

    /// Despawn the participant's avatar; its id is retired
    pub fn handle_leave(&mut self, participant: ParticipantId) {
        let Some(id) = self.entity_of.remove(&participant) else {
            return;
        };
        self.players.remove(&id);
        self.player_count.store(self.players.len(), Ordering::Relaxed);

        self.send(Outbound::all(ServerMsg::PlayerLeft {
            entity_id: id,
            reason: "left".to_string(),
        }));
        self.snapshot_builder.force_next();

        info!(entity_id = %id, participant = %participant, "Avatar despawned");
    }

    /// Role check, then apply the call on canonical state
    pub fn handle_rpc(&mut self, sender: ParticipantId, envelope: RpcEnvelope) {
        let target = match RpcChannel::authorize(&envelope, sender, &*self) {
            Ok(target) => target,
            Err(e) => {
                warn!(error = %e, "RPC dropped");
                return;
            }
        };

        if target == Role::All {
            self.send(Outbound::all(ServerMsg::Rpc(envelope)));
            return;
        }

        let entity_id = envelope.entity_id;
        match envelope.call {
            RpcCall::RequestDamage { amount } => {
                if let Some(player) = self.players.get_mut(&entity_id) {
                    let (health, dead) = player.apply_damage(amount);
                    info!(entity_id = %entity_id, amount, health, dead, "Damage applied");
                    self.snapshot_builder.force_next();
                }
            }
            RpcCall::TogglePoison => {
                if let Some(player) = self.players.get_mut(&entity_id) {
                    let poisoned = player.toggle_poison();
                    info!(entity_id = %entity_id, poisoned, "Poison toggled");
                    self.snapshot_builder.force_next();
                }
            }
            RpcCall::RequestResurrect { target } => self.resurrect(entity_id, target),
            RpcCall::SetDetails { name, color_index } => {
                if let Some(player) = self.players.get_mut(&entity_id) {
                    player.set_details(&name, color_index);
                    debug!(
                        entity_id = %entity_id,
                        name = %player.display_name,
                        color_index = player.color_index,
                        "Details set"
                    );
                    self.snapshot_builder.force_next();
                }
            }
            RpcCall::SendChat { text } => self.relay_chat(entity_id, &text),
            RpcCall::ReceiveChat { .. } => {
                debug!(entity_id = %entity_id, "receive_chat is only delivered to replicas");
            }
        }
    }

    /// First valid request wins; everything else is a silent no-op
    fn resurrect(&mut self, requester: EntityId, target: EntityId) {
        if requester == target {
            debug!(requester = %requester, "Self resurrect rejected");
            return;
        }
        let Some(requester_pos) = self.players.get(&requester).map(PlayerEntity::position) else {
            return;
        };
        let Some(target_player) = self.players.get_mut(&target) else {
            debug!(requester = %requester, target = %target, "Resurrect target is gone");
            return;
        };

        if !CombatSystem::can_resurrect(requester_pos, target_player.position(), target_player.health) {
            debug!(
                requester = %requester,
                target = %target,
                target_health = target_player.health,
                "Resurrect rejected"
            );
            return;
        }

        if target_player.resurrect() {
            info!(requester = %requester, target = %target, "Avatar resurrected");
            self.snapshot_builder.force_next();
        }
    }

    fn relay_chat(&self, sender: EntityId, text: &str) {
        let Some(player) = self.players.get(&sender) else {
            return;
        };
        let Some(text) = chat::clean_line(text) else {
            return;
        };
        let line = chat::format_line(&player.display_name, &text);
        self.send(Outbound::all(ServerMsg::Rpc(RpcEnvelope::new(
            sender,
            RpcCall::ReceiveChat { text: line },
        ))));
    }

    /// Advance every avatar by one fixed step
    fn run_tick(&mut self) {
        self.tick += 1;
        let mut health_changed = false;

        for player in self.players.values_mut() {
            player.simulate(self.dt, &self.movement, &self.world);

            if let Some(poison) = player.poison_tick(self.dt) {
                health_changed = true;
                debug!(
                    entity_id = %player.id,
                    damage = poison.damage,
                    health = poison.health,
                    "Poison tick"
                );
                if poison.killed {
                    info!(entity_id = %player.id, "Avatar died of poison");
                }
            }
        }

        if health_changed {
            self.snapshot_builder.force_next();
        }
    }

    fn publish_snapshot(&mut self) {
        if self.snapshot_builder.should_send() {
            let snapshot = self.snapshot_builder.build(self.tick, &self.players);
            self.send(Outbound::all(snapshot));
        }
    }
}
