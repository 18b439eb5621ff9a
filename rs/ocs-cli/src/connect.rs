use std::time::Duration;

use clap::Args;
use ocs_client::{Client, Message, SendPolicy, SessionConfig, Ticker, Transport};
use ocs_proto::{ControlId, DeviceId, InputValue, Subgroup, Vec2};
use tokio::time::Instant;

#[derive(Args, Clone, Debug)]
pub struct ConnectArgs {
	/// The host to connect to.
	#[arg(long)]
	pub address: String,

	#[arg(long, default_value_t = 7777)]
	pub port: u16,

	/// The name announced to the other members.
	#[arg(long, default_value = "local")]
	pub member: String,

	#[arg(long, default_value_t = 0)]
	pub subgroup: u8,

	/// Session options as a JSON object, ex. `{"bitrate": 20000000}`.
	#[arg(long)]
	pub config: Option<String>,

	/// Disconnect after this long, ex. `30s`.
	#[arg(long, value_parser = humantime::parse_duration)]
	pub duration: Option<Duration>,

	/// Input send cycles per second.
	#[arg(long, default_value_t = 90.0)]
	pub send_rate: f32,

	/// Frame loop iterations per second.
	#[arg(long, default_value_t = 60.0)]
	pub frame_rate: f32,
}

const TRIGGER: ControlId = ControlId(0);
const STICK: ControlId = ControlId(1);

pub async fn connect(config: ocs_native::ClientConfig, args: ConnectArgs) -> anyhow::Result<()> {
	let transport = config.init()?;

	let session = match &args.config {
		Some(json) => SessionConfig::from_json(json)?,
		None => SessionConfig::new(),
	};

	let config = ocs_client::ClientConfig {
		member: args.member.clone(),
		subgroup: Subgroup(args.subgroup),
		send_rate: args.send_rate,
		..Default::default()
	};

	let (client, messages) = Client::new(transport, config);
	client.connect(&args.address, args.port, session)?;

	let deadline = async {
		match args.duration {
			Some(duration) => tokio::time::sleep(duration).await,
			None => std::future::pending().await,
		}
	};

	let frame_rate = args.frame_rate.max(1.0);
	let mut frames = FrameLoop {
		ticker: client.ticker(),
		client,
		messages,
		input: Synthetic::default(),
	};

	let mut interval = tokio::time::interval(Duration::from_secs_f32(1.0 / frame_rate));
	interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

	tokio::pin!(deadline);

	loop {
		tokio::select! {
			_ = interval.tick() => frames.frame()?,
			_ = &mut deadline => {
				tracing::info!("duration elapsed");
				break;
			}
			_ = tokio::signal::ctrl_c() => break,
		}
	}

	let stats = frames.client.stats().snapshot();
	frames.client.disconnect();
	tracing::info!(?stats, "disconnected");

	Ok(())
}

struct FrameLoop<T: Transport> {
	client: Client<T>,
	messages: ocs_client::MessageConsumer,
	ticker: Ticker,
	input: Synthetic,
}

impl<T: Transport> FrameLoop<T> {
	fn frame(&mut self) -> anyhow::Result<()> {
		while let Some(message) = self.messages.peek() {
			match message {
				Message::Connected { video, audio } => {
					tracing::info!(?video, ?audio, "connected");
					self.client.play()?;
					self.client.join()?;
				}
				Message::Disconnected { reason } => {
					return Err(anyhow::Error::new(reason.clone()).context("session ended"));
				}
				Message::PlayStateChanged(playing) => tracing::info!(playing, "play state changed"),
				Message::VideoReady(video) => tracing::debug!(timestamp = %video.timestamp, "video ready"),
				Message::VideoError { timestamp, error } => tracing::warn!(%timestamp, %error, "video error"),
				Message::AudioReady { timestamp } => tracing::trace!(%timestamp, "audio ready"),
			}

			self.messages.pop();
		}

		self.client.update_input_frame();
		self.report();

		if self.client.is_connected() && self.ticker.tick(Instant::now()) {
			let timestamp = self.client.begin_pend_input();
			self.input.pend(&self.client)?;

			match self.client.send_pending_inputs(timestamp) {
				Ok(count) => tracing::trace!(count, %timestamp, "sent input"),
				Err(err) => tracing::debug!(%err, "failed to send input"),
			}
		}

		Ok(())
	}

	// Log the edges of every remote member's trigger.
	fn report(&self) {
		let table = self.client.table();

		for member in table.members() {
			if table.activated(&member, DeviceId::CONTROLLER, TRIGGER) {
				tracing::info!(%member, "trigger pressed");
			} else if table.deactivated(&member, DeviceId::CONTROLLER, TRIGGER) {
				tracing::info!(%member, "trigger released");
			}
		}
	}
}

/// Generates a trigger pulse and a stick moving in a circle.
#[derive(Default)]
struct Synthetic {
	cycle: u64,
}

impl Synthetic {
	fn pend<T: Transport>(&mut self, client: &Client<T>) -> anyhow::Result<()> {
		self.cycle += 1;

		let pressed = (self.cycle / 90) % 2 == 0;
		client.pend_with_policy(
			DeviceId::CONTROLLER,
			TRIGGER,
			InputValue::State(pressed.into()),
			SendPolicy::NonzeroAlwaysZeroOnce,
		)?;

		let angle = self.cycle as f32 / 45.0;
		client.pend_with_policy(
			DeviceId::CONTROLLER,
			STICK,
			InputValue::Axis2D(Vec2::new(angle.cos(), angle.sin())),
			SendPolicy::OnChange,
		)?;

		Ok(())
	}
}
