use std::fmt;
use std::sync::Arc;

use ocs_proto::coding::{Decode, Encode};
use ocs_proto::{
	AudioFormat, AudioPacket, Control, ControlId, DeviceId, InputBatch, InputValue, InvalidId, Packet, Subgroup,
	Timestamp, VideoFormat, VideoSample,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::{
	AudioPlayer, ClientConfig, ClientStats, DecodeOrchestrator, DecodedVideo, Error, MemberTable, Message,
	MessageConsumer, MessageProducer, PacketReceiver, PacketSender, PendingBatch, Renderer, SendPolicy, SessionConfig,
	Target, Ticker, Transport, VideoDecoder, queue, runtime,
};

/// The connection state of a [Client].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
	Disconnected,
	Connecting,
	Connected,
	Playing,
	Stopped,
}

impl SessionState {
	/// Whether the host accepted the session.
	pub fn is_connected(self) -> bool {
		matches!(self, Self::Connected | Self::Playing | Self::Stopped)
	}
}

impl fmt::Display for SessionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Disconnected => "disconnected",
			Self::Connecting => "connecting",
			Self::Connected => "connected",
			Self::Playing => "playing",
			Self::Stopped => "stopped",
		};
		f.write_str(name)
	}
}

struct Session {
	generation: u64,
	target: Target,
	outgoing: mpsc::Sender<Packet>,
	stats: ClientStats,

	// The sequence number of the next input batch.
	sequence: u64,

	// Dropped to cancel the session task.
	#[allow(dead_code)]
	closed: oneshot::Sender<()>,
}

impl Session {
	// Queue a packet for the send task without waiting on the transport.
	fn send(&self, packet: Packet) -> Result<(), Error> {
		self.outgoing.try_send(packet).map_err(|err| match err {
			mpsc::error::TrySendError::Full(packet) => {
				tracing::debug!(kind = ?packet.kind(), "transport is behind, dropping packet");
				self.stats.inc_packets_dropped();
				Error::Full
			}
			mpsc::error::TrySendError::Closed(_) => Error::Closed,
		})
	}
}

struct State {
	status: SessionState,

	// Incremented on every connect, so a finished task can tell whether it still owns the session.
	generation: u64,
	session: Option<Session>,

	subgroup: Subgroup,

	// Bumped by every subgroup change, so data sent before a change is dropped
	// even when the subgroup id is the same again.
	epoch: u64,

	joined: bool,
}

impl State {
	fn is_current(&self, generation: u64) -> bool {
		self.session.as_ref().is_some_and(|session| session.generation == generation)
	}

	fn is_current_subgroup(&self, subgroup: Subgroup, epoch: u64) -> bool {
		self.subgroup == subgroup && self.epoch == epoch
	}

	fn send(&self, control: Control) {
		let Some(session) = &self.session else {
			return;
		};

		if let Err(err) = session.send(Packet::Control(control)) {
			tracing::debug!(%err, "dropping control message");
		}
	}

	fn invalid(&self, operation: &'static str) -> Error {
		tracing::debug!(operation, state = %self.status, "invalid state");
		Error::InvalidState {
			operation,
			state: self.status,
		}
	}
}

struct Shared {
	config: ClientConfig,
	state: Mutex<State>,

	table: MemberTable,
	batch: PendingBatch,
	queue: MessageProducer,
	orchestrator: DecodeOrchestrator,
	stats: ClientStats,

	video: Mutex<Option<Box<dyn VideoDecoder>>>,
	audio: Mutex<Option<Box<dyn AudioPlayer>>>,
}

// The host accepted the session.
struct Accepted<T: Transport> {
	sender: T::Sender,
	receiver: T::Receiver,
	video: Option<VideoFormat>,
	audio: Option<AudioFormat>,
}

/// The session controller: owns the connection, batches local input and applies remote input.
///
/// Every operation returns immediately. Outcomes of long operations, like connecting,
/// arrive through the [MessageConsumer] returned by [Client::new].
pub struct Client<T: Transport> {
	transport: Arc<T>,
	shared: Arc<Shared>,
}

impl<T: Transport> Client<T> {
	pub fn new(transport: T, config: ClientConfig) -> (Self, MessageConsumer) {
		let stats = ClientStats::new();
		let (producer, consumer) = queue(config.queue_capacity, stats.clone());

		let shared = Shared {
			state: Mutex::new(State {
				status: SessionState::Disconnected,
				generation: 0,
				session: None,
				subgroup: config.subgroup,
				epoch: 0,
				joined: false,
			}),
			table: MemberTable::new(config.axis_threshold, config.direction_threshold, stats.clone()),
			batch: PendingBatch::new(config.member.as_str(), config.axis_threshold),
			orchestrator: DecodeOrchestrator::new(producer.clone(), stats.clone()),
			queue: producer,
			stats,
			video: Mutex::new(None),
			audio: Mutex::new(None),
			config,
		};

		let client = Self {
			transport: Arc::new(transport),
			shared: Arc::new(shared),
		};

		(client, consumer)
	}

	/// Decode video samples with `decoder`, starting with the next sample.
	pub fn set_video_decoder(&self, decoder: impl VideoDecoder) {
		*self.shared.video.lock() = Some(Box::new(decoder));
	}

	/// Play audio packets with `player`, starting with the next packet.
	pub fn set_audio_player(&self, player: impl AudioPlayer) {
		*self.shared.audio.lock() = Some(Box::new(player));
	}

	/// Start connecting to a host.
	///
	/// Returns an error without changing state if the address or port is malformed,
	/// or if a session already exists. The outcome is reported as [Message::Connected]
	/// or [Message::Disconnected].
	pub fn connect(&self, address: &str, port: u16, config: SessionConfig) -> Result<(), Error> {
		let target = Target::new(address, port).inspect_err(|err| tracing::debug!(%err, "connect rejected"))?;
		let runtime = runtime::handle()?;

		let mut state = self.shared.state.lock();
		if state.status != SessionState::Disconnected {
			return Err(state.invalid("connect"));
		}

		state.generation += 1;
		let generation = state.generation;

		let (outgoing, outgoing_rx) = mpsc::channel(self.shared.config.send_buffer.max(1));
		let (closed, closed_rx) = oneshot::channel();

		state.session = Some(Session {
			generation,
			target: target.clone(),
			outgoing,
			stats: self.shared.stats.clone(),
			sequence: 0,
			closed,
		});
		state.status = SessionState::Connecting;
		state.subgroup = self.shared.config.subgroup;
		state.epoch = 0;
		state.joined = false;
		drop(state);

		tracing::info!(%target, member = %self.shared.config.member, "connecting");

		let shared = self.shared.clone();
		let transport = self.transport.clone();
		runtime.spawn(shared.run(transport, target, config, generation, outgoing_rx, closed_rx));

		Ok(())
	}

	/// Tear down the session, if any.
	///
	/// Cancels a pending connect, forgets every member and the pending batch, and ignores
	/// decodes still in flight. Does nothing while disconnected.
	pub fn disconnect(&self) {
		let mut state = self.shared.state.lock();
		if state.status == SessionState::Disconnected {
			return;
		}

		if let Some(session) = &state.session {
			tracing::info!(target = %session.target, "disconnecting");
		}

		self.shared.teardown(&mut state, Error::Closed);
	}

	pub fn play(&self) -> Result<(), Error> {
		let mut state = self.shared.state.lock();
		if !matches!(state.status, SessionState::Connected | SessionState::Stopped) {
			return Err(state.invalid("play"));
		}

		state.status = SessionState::Playing;
		state.send(Control::Play);
		self.shared.queue.push(Message::PlayStateChanged(true));

		Ok(())
	}

	pub fn stop(&self) -> Result<(), Error> {
		let mut state = self.shared.state.lock();
		if state.status != SessionState::Playing {
			return Err(state.invalid("stop"));
		}

		state.status = SessionState::Stopped;
		state.send(Control::Stop);
		self.shared.queue.push(Message::PlayStateChanged(false));

		Ok(())
	}

	/// Target another subgroup.
	///
	/// Input and video sent before the change are dropped, as are decodes still in flight,
	/// even when switching back to a subgroup targeted earlier.
	pub fn set_subgroup(&self, subgroup: Subgroup) -> Result<(), Error> {
		let mut state = self.shared.state.lock();
		if !matches!(state.status, SessionState::Connected | SessionState::Playing) {
			return Err(state.invalid("set_subgroup"));
		}

		state.epoch += 1;
		tracing::debug!(from = %state.subgroup, to = %subgroup, epoch = state.epoch, "changing subgroup");
		state.subgroup = subgroup;

		self.shared.orchestrator.discard();
		state.send(Control::Subgroup {
			subgroup,
			epoch: state.epoch,
		});

		Ok(())
	}

	/// Announce the local member to the multicast group.
	pub fn join(&self) -> Result<(), Error> {
		let mut state = self.shared.state.lock();
		if !state.status.is_connected() {
			return Err(state.invalid("join"));
		}

		if !state.joined {
			state.joined = true;
			state.send(Control::Join);
		}

		Ok(())
	}

	/// Withdraw the local member from the multicast group, staying connected.
	pub fn leave(&self) -> Result<(), Error> {
		let mut state = self.shared.state.lock();
		if !state.status.is_connected() {
			return Err(state.invalid("leave"));
		}

		if state.joined {
			state.joined = false;
			state.send(Control::Leave);
		}

		Ok(())
	}

	/// Start a send cycle, returning the timestamp shared by its frames.
	pub fn begin_pend_input(&self) -> Timestamp {
		self.shared.batch.begin()
	}

	/// Add a control update to the current send cycle.
	pub fn pend<D, C>(&self, device: D, control: C, value: InputValue) -> Result<(), Error>
	where
		D: TryInto<DeviceId>,
		C: TryInto<ControlId>,
		InvalidId: From<D::Error> + From<C::Error>,
	{
		self.shared.batch.append(device, control, value)
	}

	/// Add a control update if `policy` deems it worth sending, returning whether it was kept.
	pub fn pend_with_policy<D, C>(&self, device: D, control: C, value: InputValue, policy: SendPolicy) -> Result<bool, Error>
	where
		D: TryInto<DeviceId>,
		C: TryInto<ControlId>,
		InvalidId: From<D::Error> + From<C::Error>,
	{
		self.shared.batch.append_with_policy(device, control, value, policy)
	}

	/// Send the cycle started by [Self::begin_pend_input], returning the number of frames sent.
	///
	/// The pending frames are cleared even if sending fails, unless `timestamp` is stale.
	/// Fails with [Error::Full] if the transport has fallen behind.
	pub fn send_pending_inputs(&self, timestamp: Timestamp) -> Result<usize, Error> {
		let frames = self.shared.batch.take(timestamp)?;

		let mut state = self.shared.state.lock();
		if !state.status.is_connected() {
			return Err(state.invalid("send_pending_inputs"));
		}

		if frames.is_empty() {
			return Ok(0);
		}

		let (subgroup, epoch) = (state.subgroup, state.epoch);
		let session = state.session.as_mut().ok_or(Error::Closed)?;

		let count = frames.len();
		let batch = InputBatch {
			subgroup,
			epoch,
			sequence: session.sequence,
			timestamp,
			frames,
		};
		session.sequence += 1;

		session.send(Packet::Input(batch))?;
		self.shared.stats.inc_batches_sent();

		Ok(count)
	}

	/// The latest value of a member's control, or None if it was never observed.
	pub fn query(&self, member: &str, device: DeviceId, control: ControlId) -> Option<InputValue> {
		self.shared.table.query(member, device, control)
	}

	/// The input state of every member, for detailed queries.
	pub fn table(&self) -> &MemberTable {
		&self.shared.table
	}

	/// A ticker pacing send cycles at the configured send rate.
	pub fn ticker(&self) -> Ticker {
		Ticker::new(self.shared.config.send_rate)
	}

	/// Capture the current input state for the activity queries; call once per frame.
	pub fn update_input_frame(&self) {
		self.shared.table.update_frame();
	}

	/// Draw an image from [Message::VideoReady].
	pub fn render<R: Renderer>(&self, renderer: &mut R, video: &DecodedVideo, target: &mut R::Target) {
		self.shared.orchestrator.render(renderer, video, target);
	}

	pub fn state(&self) -> SessionState {
		self.shared.state.lock().status
	}

	pub fn is_connected(&self) -> bool {
		self.state().is_connected()
	}

	pub fn is_playing(&self) -> bool {
		self.state() == SessionState::Playing
	}

	pub fn subgroup(&self) -> Subgroup {
		self.shared.state.lock().subgroup
	}

	pub fn is_joined(&self) -> bool {
		self.shared.state.lock().joined
	}

	pub fn config(&self) -> &ClientConfig {
		&self.shared.config
	}

	pub fn stats(&self) -> &ClientStats {
		&self.shared.stats
	}
}

impl<T: Transport> Drop for Client<T> {
	fn drop(&mut self) {
		self.disconnect();
	}
}

impl Shared {
	fn teardown(&self, state: &mut State, reason: Error) {
		// Dropping the session cancels its task.
		state.session = None;
		state.status = SessionState::Disconnected;
		state.joined = false;

		self.table.clear();
		self.batch.clear();
		self.orchestrator.reset();

		self.queue.push(Message::Disconnected { reason });
	}

	#[tracing::instrument("session", skip_all, fields(%target, generation = generation))]
	async fn run<T: Transport>(
		self: Arc<Self>,
		transport: Arc<T>,
		target: Target,
		config: SessionConfig,
		generation: u64,
		outgoing: mpsc::Receiver<Packet>,
		closed: oneshot::Receiver<()>,
	) {
		let reason = tokio::select! {
			// The session was torn down by disconnect.
			_ = closed => return,
			res = self.session(transport.as_ref(), &target, &config, generation, outgoing) => match res {
				Ok(()) => Error::Closed,
				Err(err) => err,
			},
		};

		tracing::warn!(%reason, "session ended");

		let mut state = self.state.lock();
		if state.is_current(generation) {
			self.teardown(&mut state, reason);
		}
	}

	async fn session<T: Transport>(
		self: &Arc<Self>,
		transport: &T,
		target: &Target,
		config: &SessionConfig,
		generation: u64,
		outgoing: mpsc::Receiver<Packet>,
	) -> Result<(), Error> {
		let accepted = tokio::time::timeout(self.config.connect_timeout, self.handshake(transport, target, config))
			.await
			.map_err(|_| Error::Timeout)??;

		self.configure(accepted.video.as_ref(), accepted.audio.as_ref());

		{
			let mut state = self.state.lock();
			if !state.is_current(generation) {
				return Ok(());
			}

			state.status = SessionState::Connected;
			self.queue.push(Message::Connected {
				video: accepted.video,
				audio: accepted.audio,
			});
		}

		tracing::info!("connected");

		// Media is handed off to separate tasks so a slow decoder never stalls input.
		let buffer = self.config.media_buffer.max(1);
		let (video, video_rx) = mpsc::channel(buffer);
		let (audio, audio_rx) = mpsc::channel(buffer);

		tokio::spawn(self.clone().run_video(video_rx));
		tokio::spawn(self.clone().run_audio(audio_rx, generation));

		tokio::select! {
			res = self.run_send(accepted.sender, outgoing) => res,
			res = self.run_recv(accepted.receiver, generation, video, audio) => res,
		}
	}

	async fn handshake<T: Transport>(
		&self,
		transport: &T,
		target: &Target,
		config: &SessionConfig,
	) -> Result<Accepted<T>, Error> {
		let (mut sender, mut receiver) = transport.open(target, config).await.map_err(Error::transport)?;

		let subgroup = self.state.lock().subgroup;
		let hello = Control::Hello {
			member: self.config.member.clone(),
			subgroup,
			config: config.to_json(),
		};
		self.send_packet(&mut sender, &Packet::Control(hello)).await?;

		loop {
			match self.recv_packet(&mut receiver).await?.ok_or(Error::Closed)? {
				Packet::Control(Control::Welcome { video, audio }) => {
					return Ok(Accepted {
						sender,
						receiver,
						video,
						audio,
					});
				}
				Packet::Control(Control::Bye { reason }) => return Err(Error::Remote(reason)),
				packet => tracing::debug!(kind = ?packet.kind(), "ignoring packet before welcome"),
			}
		}
	}

	fn configure(&self, video: Option<&VideoFormat>, audio: Option<&AudioFormat>) {
		if let Some(format) = video {
			tracing::debug!(codec = %format.codec, width = format.width, height = format.height, "video format");
			self.orchestrator.configure(format);

			if let Some(decoder) = self.video.lock().as_deref_mut()
				&& let Err(err) = decoder.configure(format)
			{
				tracing::warn!(?err, "failed to configure decoder");
				self.queue.push(Message::VideoError {
					timestamp: Timestamp::ZERO,
					error: Error::DecodeFailed(Arc::new(err)),
				});
			}
		}

		if let Some(format) = audio {
			tracing::debug!(codec = %format.codec, sample_rate = format.sample_rate, channels = format.channels, "audio format");

			if let Some(player) = self.audio.lock().as_deref_mut()
				&& let Err(err) = player.configure(format)
			{
				tracing::warn!(?err, "failed to configure audio player");
			}
		}
	}

	async fn send_packet<S: PacketSender>(&self, sender: &mut S, packet: &Packet) -> Result<(), Error> {
		let bytes = packet.encode_bytes();
		self.stats.record_bytes_sent(bytes.len() as u64);
		sender.send(bytes).await.map_err(Error::transport)
	}

	async fn recv_packet<R: PacketReceiver>(&self, receiver: &mut R) -> Result<Option<Packet>, Error> {
		let Some(mut bytes) = receiver.recv().await.map_err(Error::transport)? else {
			return Ok(None);
		};

		self.stats.record_bytes_received(bytes.len() as u64);
		Ok(Some(Packet::decode(&mut bytes)?))
	}

	async fn run_send<S: PacketSender>(
		&self,
		mut sender: S,
		mut outgoing: mpsc::Receiver<Packet>,
	) -> Result<(), Error> {
		while let Some(packet) = outgoing.recv().await {
			self.send_packet(&mut sender, &packet).await?;
		}

		Ok(())
	}

	async fn run_recv<R: PacketReceiver>(
		&self,
		mut receiver: R,
		generation: u64,
		video: mpsc::Sender<(VideoSample, u64)>,
		audio: mpsc::Sender<AudioPacket>,
	) -> Result<(), Error> {
		while let Some(packet) = self.recv_packet(&mut receiver).await? {
			match packet {
				Packet::Input(batch) => self.apply(batch, generation),
				Packet::Video(sample) => {
					// Captured under the state lock, so a subgroup change discards this sample's decode.
					let decodes = {
						let state = self.state.lock();
						match state.is_current_subgroup(sample.subgroup, sample.epoch) {
							true => Some(self.orchestrator.generation()),
							false => {
								tracing::trace!(expected = %state.subgroup, got = %sample.subgroup, epoch = sample.epoch, "dropping video for old subgroup");
								self.stats.inc_stale_subgroup();
								None
							}
						}
					};

					if let Some(decodes) = decodes
						&& video.try_send((sample, decodes)).is_err()
					{
						tracing::trace!("decoder is behind, dropping video");
						self.stats.inc_media_dropped();
					}
				}
				Packet::Audio(packet) => {
					if audio.try_send(packet).is_err() {
						tracing::trace!("player is behind, dropping audio");
						self.stats.inc_media_dropped();
					}
				}
				Packet::Control(Control::Bye { reason }) => return Err(Error::Remote(reason)),
				Packet::Control(control) => tracing::debug!(?control, "ignoring control message"),
			}
		}

		Ok(())
	}

	fn apply(&self, batch: InputBatch, generation: u64) {
		// Held while applying so a concurrent disconnect can't be undone by a late batch.
		let state = self.state.lock();
		if !state.is_current(generation) {
			return;
		}

		if !state.is_current_subgroup(batch.subgroup, batch.epoch) {
			tracing::trace!(expected = %state.subgroup, got = %batch.subgroup, epoch = batch.epoch, sequence = batch.sequence, "dropping input for old subgroup");
			self.stats.inc_stale_subgroup();
			return;
		}

		self.table.apply_batch(&batch);
	}

	async fn run_video(self: Arc<Self>, mut samples: mpsc::Receiver<(VideoSample, u64)>) {
		while let Some((sample, decodes)) = samples.recv().await {
			let mut decoder = self.video.lock();
			match decoder.as_deref_mut() {
				Some(decoder) => {
					self.orchestrator.submit(decoder, sample, decodes);
				}
				None => tracing::trace!(timestamp = %sample.timestamp, "no decoder, dropping video"),
			}
		}
	}

	async fn run_audio(self: Arc<Self>, mut packets: mpsc::Receiver<AudioPacket>, generation: u64) {
		while let Some(packet) = packets.recv().await {
			let timestamp = packet.timestamp;

			{
				let mut player = self.audio.lock();
				let Some(player) = player.as_deref_mut() else {
					tracing::trace!(%timestamp, "no player, dropping audio");
					continue;
				};
				player.play(packet);
			}

			let state = self.state.lock();
			if state.is_current(generation) {
				self.queue.push(Message::AudioReady { timestamp });
			}
		}
	}
}
