//! A participant's local view of the session
//!
//! Applies server messages to a read-only copy of the replicated state,
//! fires lifecycle effects through the [`PresentationSink`], routes the
//! spectate camera and turns local gestures into outgoing messages. Nothing
//! here writes canonical state: every mutation leaves as an RPC.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::{debug, warn};

use crate::chat::ChatBox;
use crate::ws::protocol::{ClientMsg, PlayerSnapshot, ServerMsg};

use super::authority::{EntityId, ParticipantId};
use super::combat::RESURRECT_RADIUS;
use super::input::{FocusGate, InputSampler, NoOverlay, RawControls};
use super::lifecycle::{
    CameraMode, LifeState, LifeTransition, LifecycleWatcher, PresentationSink, SpectateCursor,
    Watched,
};
use super::physics::{ArenaWorld, MotionState, MovementConfig};
use super::prediction::Predictor;
use super::rpc::{RpcCall, RpcEnvelope};

/// Local-only shadows for one remote or local entity
#[derive(Default)]
struct Shadow {
    life: LifecycleWatcher,
    name: Watched<String>,
    color: Watched<(u8, u8)>,
    health: Watched<u32>,
}

/// Name and color announced once the local avatar appears
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalProfile {
    pub name: String,
    pub color_index: u8,
}

pub struct ClientSession {
    local: ParticipantId,
    local_entity: Option<EntityId>,
    last_snapshot_tick: u64,
    entities: BTreeMap<EntityId, PlayerSnapshot>,
    shadows: HashMap<EntityId, Shadow>,
    spectate: SpectateCursor,
    sampler: InputSampler,
    predictor: Option<Predictor>,
    movement: MovementConfig,
    dt: f32,
    world: ArenaWorld,
    chat: Option<ChatBox>,
    sink: Option<Box<dyn PresentationSink + Send>>,
    warned_no_sink: bool,
    profile: Option<LocalProfile>,
    outgoing: VecDeque<ClientMsg>,
}

impl ClientSession {
    pub fn new(local: ParticipantId, movement: MovementConfig, dt: f32, world: ArenaWorld) -> Self {
        Self {
            local,
            local_entity: None,
            last_snapshot_tick: 0,
            entities: BTreeMap::new(),
            shadows: HashMap::new(),
            spectate: SpectateCursor::default(),
            sampler: InputSampler::new(),
            predictor: None,
            movement,
            dt,
            world,
            chat: None,
            sink: None,
            warned_no_sink: false,
            profile: None,
            outgoing: VecDeque::new(),
        }
    }

    pub fn with_chat(mut self, chat: ChatBox) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn PresentationSink + Send>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_profile(mut self, name: impl Into<String>, color_index: u8) -> Self {
        self.profile = Some(LocalProfile {
            name: name.into(),
            color_index,
        });
        self
    }

    /// Messages the replica queued on its own, such as the profile announcement
    pub fn take_outgoing(&mut self) -> Vec<ClientMsg> {
        self.outgoing.drain(..).collect()
    }

    pub fn local(&self) -> ParticipantId {
        self.local
    }

    pub fn local_entity(&self) -> Option<EntityId> {
        self.local_entity
    }

    pub fn entity(&self, id: EntityId) -> Option<&PlayerSnapshot> {
        self.entities.get(&id)
    }

    pub fn chat(&self) -> Option<&ChatBox> {
        self.chat.as_ref()
    }

    pub fn chat_mut(&mut self) -> Option<&mut ChatBox> {
        self.chat.as_mut()
    }

    pub fn spectating(&self) -> Option<EntityId> {
        self.spectate.current()
    }

    /// Life state of the local avatar as last observed
    pub fn local_life(&self) -> Option<LifeState> {
        let id = self.local_entity?;
        self.shadows.get(&id).map(|s| s.life.state())
    }

    /// Predicted motion when available, otherwise the last snapshot
    pub fn local_motion(&self) -> Option<MotionState> {
        if let Some(predictor) = &self.predictor {
            return Some(*predictor.motion());
        }
        let snapshot = self.entities.get(&self.local_entity?)?;
        Some(MotionState {
            position: snapshot.position,
            yaw: snapshot.yaw,
            vertical_velocity: snapshot.vertical_velocity,
            anim: snapshot.anim,
            ..MotionState::default()
        })
    }

    /// Apply one message from the host
    pub fn handle_server_msg(&mut self, msg: ServerMsg) {
        match msg {
            ServerMsg::Welcome { participant_id, .. } => {
                self.local = participant_id;
            }
            ServerMsg::PlayerJoined {
                entity_id,
                input_authority,
                ..
            } => {
                if input_authority == self.local {
                    self.bind_local(entity_id);
                }
            }
            ServerMsg::PlayerLeft { entity_id, .. } => self.forget_entity(entity_id),
            ServerMsg::Snapshot { tick, players } => self.apply_snapshot(tick, players),
            ServerMsg::Rpc(envelope) => self.handle_rpc(envelope),
            ServerMsg::Error { code, message } => {
                warn!(code = %code, message = %message, "Host reported an error");
            }
            ServerMsg::Pong { t } => {
                debug!(t, "Pong");
            }
        }
    }

    fn handle_rpc(&mut self, envelope: RpcEnvelope) {
        match envelope.call {
            RpcCall::ReceiveChat { text } => match self.chat.as_mut() {
                Some(chat) => chat.receive(text),
                None => warn!(entity_id = %envelope.entity_id, "Chat line received without a chat box"),
            },
            other => {
                debug!(call = other.name(), "Ignoring call not addressed to replicas");
            }
        }
    }

    fn apply_snapshot(&mut self, tick: u64, players: Vec<PlayerSnapshot>) {
        if tick <= self.last_snapshot_tick {
            debug!(tick, last = self.last_snapshot_tick, "Stale snapshot dropped");
            return;
        }
        self.last_snapshot_tick = tick;

        let departed: Vec<EntityId> = self
            .entities
            .keys()
            .filter(|id| !players.iter().any(|p| p.entity_id == **id))
            .copied()
            .collect();
        for id in departed {
            self.forget_entity(id);
        }

        for snapshot in players {
            if snapshot.input_authority == self.local {
                self.bind_local(snapshot.entity_id);
                self.reconcile_local(&snapshot);
            }
            self.entities.insert(snapshot.entity_id, snapshot);
        }

        self.render();
    }

    fn bind_local(&mut self, id: EntityId) {
        if self.local_entity == Some(id) {
            return;
        }
        self.local_entity = Some(id);
        if let Some(profile) = &self.profile {
            let msg = ClientMsg::Rpc(RpcEnvelope::new(
                id,
                RpcCall::SetDetails {
                    name: profile.name.clone(),
                    color_index: profile.color_index,
                },
            ));
            self.outgoing.push_back(msg);
        }
    }

    fn reconcile_local(&mut self, snapshot: &PlayerSnapshot) {
        let movement = &self.movement;
        let dt = self.dt;
        let predictor = self.predictor.get_or_insert_with(|| {
            let mut motion = MotionState::at(snapshot.position, snapshot.yaw);
            motion.vertical_velocity = snapshot.vertical_velocity;
            Predictor::new(movement.clone(), dt, motion)
        });
        predictor.reconcile(snapshot, &self.world);
    }

    /// Render pass: compare replicated state against local shadows and push
    /// every change to the sink exactly once
    fn render(&mut self) {
        if self.sink.is_none() && !self.warned_no_sink {
            warn!("No presentation sink attached; lifecycle effects are not shown");
            self.warned_no_sink = true;
        }

        let local_entity = self.local_entity;
        let mut local_transition = None;
        let mut sink = self.sink.as_deref_mut();

        for (id, snapshot) in &self.entities {
            let shadow = self.shadows.entry(*id).or_default();

            if let Some(transition) = shadow.life.observe(snapshot.health) {
                if let Some(sink) = sink.as_mut() {
                    match transition {
                        LifeTransition::Died => {
                            sink.set_model_visible(*id, false);
                            sink.spawn_death_marker(*id, snapshot.position);
                        }
                        LifeTransition::Revived => {
                            sink.set_model_visible(*id, true);
                            sink.remove_death_marker(*id);
                        }
                    }
                }
                if Some(*id) == local_entity {
                    local_transition = Some(transition);
                }
            }

            let name_changed = shadow.name.changed(&snapshot.display_name);
            let color_changed = shadow.color.changed(&(snapshot.color_index, snapshot.team));
            let health_changed = Some(*id) == local_entity && shadow.health.changed(&snapshot.health);

            if let Some(sink) = sink.as_mut() {
                if name_changed || color_changed {
                    sink.update_nameplate(*id, &snapshot.display_name, snapshot.color_index, snapshot.team);
                }
                if health_changed {
                    sink.update_health_bar(snapshot.health, snapshot.max_health);
                }
            }
        }

        if let (Some(transition), Some(id)) = (local_transition, local_entity) {
            self.on_local_transition(id, transition);
        }
    }

    fn on_local_transition(&mut self, local: EntityId, transition: LifeTransition) {
        self.spectate.reset();
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        match transition {
            LifeTransition::Died => {
                sink.show_death_screen(true);
                sink.set_camera(CameraMode::FreeLook);
            }
            LifeTransition::Revived => {
                sink.show_death_screen(false);
                sink.set_camera(CameraMode::Follow(local));
            }
        }
    }

    fn forget_entity(&mut self, id: EntityId) {
        self.entities.remove(&id);
        let had_shadow = self.shadows.remove(&id);

        if let Some(sink) = self.sink.as_mut() {
            if had_shadow.map_or(false, |s| s.life.state() == LifeState::Dead) {
                sink.remove_death_marker(id);
            }
        }

        if self.spectate.forget(id) {
            debug!(entity_id = %id, "Spectate target left");
            if let Some(sink) = self.sink.as_mut() {
                sink.set_camera(CameraMode::FreeLook);
            }
        }

        if self.local_entity == Some(id) {
            self.local_entity = None;
            self.predictor = None;
        }
    }

    /// Cycle the spectate camera to the next other avatar. Only available
    /// while the local avatar is dead.
    pub fn spectate_next(&mut self) -> Option<EntityId> {
        if self.local_life() != Some(LifeState::Dead) {
            return None;
        }
        let local = self.local_entity;
        let candidates: Vec<EntityId> = self
            .entities
            .keys()
            .copied()
            .filter(|id| Some(*id) != local)
            .collect();

        let target = self.spectate.advance(candidates);
        let mode = target.map_or(CameraMode::FreeLook, CameraMode::Spectate);
        match self.sink.as_mut() {
            Some(sink) => {
                if target.is_some() {
                    sink.show_death_screen(false);
                }
                sink.set_camera(mode);
            }
            None => warn!("No presentation sink attached; spectate camera not routed"),
        }
        target
    }

    /// Sample this tick's input, predict it locally and return the frame to send
    pub fn sample_input(&mut self, raw: &RawControls) -> ClientMsg {
        let focus: &dyn FocusGate = match &self.chat {
            Some(chat) => chat,
            None => &NoOverlay,
        };
        let (tick, input) = self.sampler.sample(raw, focus);
        if let Some(predictor) = self.predictor.as_mut() {
            predictor.push(tick, input, &self.world);
        }
        ClientMsg::Input { tick, input }
    }

    fn local_call(&self, call: RpcCall) -> Option<ClientMsg> {
        let Some(id) = self.local_entity else {
            debug!(call = call.name(), "No local avatar yet");
            return None;
        };
        Some(ClientMsg::Rpc(RpcEnvelope::new(id, call)))
    }

    /// Debug gesture: damage the local avatar
    pub fn damage_self(&self, amount: u32) -> Option<ClientMsg> {
        self.local_call(RpcCall::RequestDamage { amount })
    }

    pub fn toggle_poison(&self) -> Option<ClientMsg> {
        self.local_call(RpcCall::TogglePoison)
    }

    pub fn set_details(&self, name: &str, color_index: u8) -> Option<ClientMsg> {
        self.local_call(RpcCall::SetDetails {
            name: name.to_string(),
            color_index,
        })
    }

    /// Enter key on the chat box; returns the chat call when one is ready
    pub fn chat_enter(&mut self) -> Option<ClientMsg> {
        let call = match self.chat.as_mut() {
            Some(chat) => chat.press_enter()?,
            None => {
                warn!("No chat box attached");
                return None;
            }
        };
        self.local_call(call)
    }

    /// Interact gesture: ask to resurrect the nearest dead avatar in reach.
    /// The host re-checks everything; this only avoids pointless requests.
    pub fn resurrect_attempt(&self) -> Option<ClientMsg> {
        let local = self.local_entity?;
        let here = self.local_motion()?.position;

        let target = self
            .entities
            .values()
            .filter(|p| p.entity_id != local && !p.is_alive())
            .map(|p| (p.entity_id, p.position.distance(here)))
            .filter(|(_, distance)| *distance <= RESURRECT_RADIUS)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)?;

        self.local_call(RpcCall::RequestResurrect { target })
    }
}
