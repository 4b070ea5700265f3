//! The client's protocol state machine.
//!
//! ```text
//! Joining ──▶ WaitingAccept ──▶ Active ──▶ Final
//! ```
//!
//! - **Joining**: log `Join`, push the log.
//! - **WaitingAccept**: poll until the last order is `Accepted` for this player, then log `Ready`.
//! - **Active**: poll for orders. `Sabotage`/`Delay` arms a delay for the next launch, `Assign`
//!   launches a game once per new `GameID`, and the `Final` stage launches the final game.
//! - **Final**: nothing left to do.
//!
//! Nothing but reaching `Final` ends the loop: unreachable hosts, malformed feeds and failing games
//! are reported and the client keeps polling.

use std::{path::PathBuf, time::Duration};

use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    catalog::{GameCatalog, GameId},
    configuration::Configuration,
    event_log::{EventLog, LogEntry},
    launcher::{GameLauncher, LaunchReport, ProcessRunner, ProgramRunner},
    logger::init_logger,
    order_feed::{parse_feed, OrderRecord, OrderValue},
    pacing::{Backoff, Sleeper, ThreadSleeper},
    sync_channel::{SftpChannel, SyncChannel},
};

/// Stage of the session during which the client waits in the lobby.
pub const LOBBY_STAGE: &str = "Lobby";
/// Stage announcing the last game of the session.
pub const FINAL_STAGE: &str = "Final";

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Where the client is in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Not announced to the host yet
    Joining,
    /// Announced, waiting for the host to accept this player
    WaitingAccept,
    /// Accepted, following round orders
    Active,
    /// Final game played, the client may exit
    Final,
}

/// Mutable protocol state, owned by the [`Dispatcher`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DispatcherState {
    /// The host accepted this player
    pub connected: bool,
    /// Last assigned game that was launched, `None` before the first one
    pub last_game_id_played: Option<GameId>,
    /// Delay to apply before the next launch
    pub sabotage_pending: Duration,
}

/// Drives one player through a session: polls the host, launches games, pushes logs.
pub struct Dispatcher<C: SyncChannel, R: ProgramRunner, S: Sleeper> {
    player_id: String,
    stage: Stage,
    state: DispatcherState,
    event_log: EventLog,
    mirror: PathBuf,
    channel: C,
    launcher: GameLauncher<R>,
    sleeper: S,
    accept_poll: Backoff,
    round_poll: Backoff,
    verbose: bool,
}

impl Dispatcher<SftpChannel, ProcessRunner, ThreadSleeper> {
    /// Build the real client described by `config`: SFTP to the host, games as processes.
    ///
    /// Starts file logging if `config.log` is set.
    ///
    /// # Errors
    /// Returned when the log file, the catalog or the event log cannot be set up.
    pub fn from_config(config: &Configuration) -> anyhow::Result<Self> {
        if config.log {
            init_logger(&config.log_dir)?;
        }
        trace!(?config);

        let catalog = match &config.catalog {
            Some(path) => GameCatalog::from_file(path)?,
            None => GameCatalog::builtin(&config.interpreter),
        };
        let event_log = EventLog::open(&config.event_log)?;

        Ok(Dispatcher::new(
            config,
            catalog,
            event_log,
            SftpChannel::new(config),
            ProcessRunner::new(config),
            ThreadSleeper,
        ))
    }
}

impl<C: SyncChannel, R: ProgramRunner, S: Sleeper> Dispatcher<C, R, S> {
    /// Assemble a dispatcher from its parts. It starts in [`Stage::Joining`].
    pub fn new(
        config: &Configuration,
        catalog: GameCatalog,
        event_log: EventLog,
        channel: C,
        runner: R,
        sleeper: S,
    ) -> Self {
        Dispatcher {
            player_id: config.player_id.clone(),
            stage: Stage::Joining,
            state: DispatcherState::default(),
            event_log,
            mirror: config.feed_mirror.clone(),
            channel,
            launcher: GameLauncher::new(catalog, runner, config.verbose),
            sleeper,
            accept_poll: Backoff::new(config.accept_poll, config.max_backoff),
            round_poll: Backoff::new(config.round_poll, config.max_backoff),
            verbose: config.verbose,
        }
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Current protocol state.
    pub fn state(&self) -> &DispatcherState {
        &self.state
    }

    /// The sync channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// The game runner.
    pub fn runner(&self) -> &R {
        self.launcher.runner()
    }

    /// The sleeper.
    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Play the whole session, returning once the final game is over.
    pub fn run(&mut self) {
        if self.verbose {
            println!("Client started as player '{}'", self.player_id);
        }
        while self.step() != Stage::Final {}
        if self.verbose {
            println!("{GREEN}Session over{RESET}");
        }
    }

    /// Do one unit of work of the current stage: one join, or one poll. Returns the new stage.
    #[instrument(skip(self), fields(stage = ?self.stage))]
    pub fn step(&mut self) -> Stage {
        self.stage = match self.stage {
            Stage::Joining => self.join(),
            Stage::WaitingAccept => self.wait_acceptance(),
            Stage::Active => self.play_round(),
            Stage::Final => Stage::Final,
        };
        self.stage
    }

    fn join(&mut self) -> Stage {
        self.log_event(LOBBY_STAGE, "Join");
        self.channel.push_log();
        if self.verbose {
            println!("Joined the lobby");
        }
        Stage::WaitingAccept
    }

    fn wait_acceptance(&mut self) -> Stage {
        let order = self.poll(Stage::WaitingAccept);
        match order {
            Some(order) if order.is_action("Accepted") && order.is_for(&self.player_id) => {
                info!("accepted by host");
                if self.verbose {
                    println!("{GREEN}Connection established{RESET}");
                }
                self.log_event(LOBBY_STAGE, "Ready");
                self.channel.push_log();
                self.state.connected = true;
                Stage::Active
            }
            _ => {
                if self.verbose {
                    println!("{YELLOW}Waiting for confirmation...{RESET}");
                }
                self.sleeper.sleep(self.accept_poll.delay());
                Stage::WaitingAccept
            }
        }
    }

    fn play_round(&mut self) -> Stage {
        self.sleeper.sleep(self.round_poll.delay());
        match self.poll(Stage::Active) {
            Some(order) => self.apply(&order),
            None => Stage::Active,
        }
    }

    /// Fetch the feed and read the last record of the mirror. When the host is unreachable the
    /// mirror keeps its previous content and is read all the same.
    fn poll(&mut self, stage: Stage) -> Option<OrderRecord> {
        let reached = self.channel.fetch_feed();
        let backoff = match stage {
            Stage::WaitingAccept => &mut self.accept_poll,
            _ => &mut self.round_poll,
        };
        backoff.record(reached);
        if !reached {
            debug!("host unreachable, next poll in {:?}", backoff.delay());
        }
        parse_feed(&self.mirror)
    }

    /// React to the latest order while playing rounds.
    fn apply(&mut self, order: &OrderRecord) -> Stage {
        if order.is_action("Sabotage") && order.get("Effect").is_some_and(|e| e.is("Delay")) {
            let secs = match order.get("Value") {
                None => 0,
                Some(OrderValue::Int(secs)) => u64::try_from(*secs).unwrap_or(0),
                Some(other) => {
                    warn!("ignoring sabotage value '{other}'");
                    0
                }
            };
            self.state.sabotage_pending = Duration::from_secs(secs);
            info!(pending = ?self.state.sabotage_pending, "sabotage received");
            if self.verbose && secs > 0 {
                println!("{YELLOW}Sabotage: {secs}s{RESET}");
            }
        }

        if order.is_action("Assign") {
            match order.get("GameID").map(game_id) {
                Some(Some(game)) if self.state.last_game_id_played != Some(game) => {
                    let delay = std::mem::take(&mut self.state.sabotage_pending);
                    let report = self.launch(game, delay);
                    trace!(?report);
                    self.state.last_game_id_played = Some(game);
                }
                Some(Some(game)) => trace!("game {game} already played"),
                Some(None) | None => {
                    self.state.sabotage_pending = Duration::ZERO;
                    error!("assignment without a valid GameID: {order:?}");
                    if self.verbose {
                        println!("{RED}Assignment without a valid game id{RESET}");
                    }
                }
            }
        }

        if order.stage().as_deref() == Some(FINAL_STAGE) {
            info!("final stage reached");
            if self.verbose {
                println!("{GREEN}FINAL ROUND{RESET}");
            }
            let final_game = self.launcher.catalog().final_game();
            self.launch(final_game, Duration::ZERO);
            return Stage::Final;
        }

        Stage::Active
    }

    fn launch(&mut self, game: GameId, delay: Duration) -> LaunchReport {
        self.launcher
            .launch(game, delay, &mut self.sleeper, &mut self.channel)
    }

    fn log_event(&mut self, stage: &str, action: &str) {
        let entry = LogEntry::now(stage, &self.player_id, action);
        if let Err(e) = self.event_log.append(&entry) {
            error!("{e:#}");
            if self.verbose {
                println!("{RED}Could not log '{action}': {e:#}{RESET}");
            }
        }
    }
}

fn game_id(value: &OrderValue) -> Option<GameId> {
    value
        .as_int()
        .and_then(|id| u32::try_from(id).ok())
        .map(GameId)
}
