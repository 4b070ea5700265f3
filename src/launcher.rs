//! Starting the game of a round.

use std::{
    path::PathBuf,
    process::{Command, Stdio},
    time::Duration,
};

use anyhow::{bail, Context};
use tracing::{error, info, instrument, warn};

use crate::{
    catalog::{GameCatalog, GameId, GameProgram},
    configuration::Configuration,
    pacing::Sleeper,
    sync_channel::SyncChannel,
};

/// Runs a game program to completion.
pub trait ProgramRunner {
    /// Run `program` for `game` and wait for it to exit.
    ///
    /// # Error
    /// Returned when the program cannot be started or exits unsuccessfully.
    fn run(&mut self, game: GameId, program: &GameProgram) -> anyhow::Result<()>;
}

/// Runs games as child processes sharing the client's terminal.
///
/// Children get `GAME_ID`, `PLAYER_ID` and `EVENT_LOG` in their environment.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    player_id: String,
    event_log: PathBuf,
}

impl ProcessRunner {
    /// A runner for the player and event log of `config`.
    pub fn new(config: &Configuration) -> ProcessRunner {
        ProcessRunner {
            player_id: config.player_id.clone(),
            event_log: config.event_log.clone(),
        }
    }
}

impl ProgramRunner for ProcessRunner {
    fn run(&mut self, game: GameId, program: &GameProgram) -> anyhow::Result<()> {
        let status = Command::new(&program.command)
            .args(&program.args)
            .env("GAME_ID", game.to_string())
            .env("PLAYER_ID", &self.player_id)
            .env("EVENT_LOG", &self.event_log)
            .stdin(Stdio::inherit())
            .status()
            .with_context(|| format!("command '{}' not found", program.command))?;
        if !status.success() {
            bail!("'{program}' exited with {status}");
        }
        Ok(())
    }
}

/// What happened to a launch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchReport {
    /// The catalog has no program for this id, nothing was done
    UnknownGame(GameId),
    /// The game ran and exited successfully
    Completed(GameId),
    /// The game could not start or exited with an error
    Failed(GameId, String),
}

/// Starts the game of a round, blocking until it is over.
#[derive(Debug)]
pub struct GameLauncher<R: ProgramRunner> {
    catalog: GameCatalog,
    runner: R,
    verbose: bool,
}

impl<R: ProgramRunner> GameLauncher<R> {
    /// A launcher picking programs from `catalog`.
    pub fn new(catalog: GameCatalog, runner: R, verbose: bool) -> Self {
        GameLauncher {
            catalog,
            runner,
            verbose,
        }
    }

    /// The game catalog in use.
    pub fn catalog(&self) -> &GameCatalog {
        &self.catalog
    }

    /// The runner, mostly for inspection.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Launch `game` after waiting `sabotage_delay`, then push the log whatever the outcome.
    ///
    /// Unknown ids are reported and have no side effect: no wait, no launch, no push.
    #[instrument(skip(self, sleeper, channel))]
    pub fn launch(
        &mut self,
        game: GameId,
        sabotage_delay: Duration,
        sleeper: &mut impl Sleeper,
        channel: &mut impl SyncChannel,
    ) -> LaunchReport {
        const RED: &str = "\x1b[31m";
        const GREEN: &str = "\x1b[32m";
        const YELLOW: &str = "\x1b[33m";
        const RESET: &str = "\x1b[0m";

        let Some(program) = self.catalog.get(game) else {
            error!("unknown game id {game}");
            if self.verbose {
                println!("{RED}Game {game} is not in the catalog{RESET}");
            }
            return LaunchReport::UnknownGame(game);
        };

        if !sabotage_delay.is_zero() {
            warn!(?sabotage_delay, "sabotaged");
            if self.verbose {
                println!("{YELLOW}Sabotage: waiting {sabotage_delay:?}...{RESET}");
            }
            sleeper.sleep(sabotage_delay);
        }

        info!(%program, "launching");
        if self.verbose {
            println!("Launching game {game}: {program}");
        }
        let report = match self.runner.run(game, program) {
            Ok(()) => {
                info!("game {game} over");
                if self.verbose {
                    println!("{GREEN}Game {game} over{RESET}");
                }
                LaunchReport::Completed(game)
            }
            Err(e) => {
                error!("game {game} failed: {e:#}");
                if self.verbose {
                    println!("{RED}Game {game} failed: {e:#}{RESET}");
                }
                LaunchReport::Failed(game, format!("{e:#}"))
            }
        };

        channel.push_log();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        sleeps: Vec<Duration>,
        pushes: usize,
        runs: Vec<GameId>,
        fail: bool,
    }

    struct Runner<'a>(&'a std::cell::RefCell<Recorder>);
    struct Channel<'a>(&'a std::cell::RefCell<Recorder>);
    struct Pause<'a>(&'a std::cell::RefCell<Recorder>);

    impl ProgramRunner for Runner<'_> {
        fn run(&mut self, game: GameId, _program: &GameProgram) -> anyhow::Result<()> {
            let mut rec = self.0.borrow_mut();
            rec.runs.push(game);
            if rec.fail {
                bail!("exit status: 1");
            }
            Ok(())
        }
    }

    impl SyncChannel for Channel<'_> {
        fn fetch_feed(&mut self) -> bool {
            false
        }

        fn push_log(&mut self) -> bool {
            self.0.borrow_mut().pushes += 1;
            true
        }
    }

    impl Sleeper for Pause<'_> {
        fn sleep(&mut self, duration: Duration) {
            self.0.borrow_mut().sleeps.push(duration);
        }
    }

    fn launch(rec: &std::cell::RefCell<Recorder>, game: u32, delay: u64) -> LaunchReport {
        let mut launcher =
            GameLauncher::new(GameCatalog::builtin("python3"), Runner(rec), false);
        launcher.launch(
            GameId(game),
            Duration::from_secs(delay),
            &mut Pause(rec),
            &mut Channel(rec),
        )
    }

    #[test]
    fn unknown_game_has_no_side_effect() {
        let rec = std::cell::RefCell::new(Recorder::default());
        assert_eq!(launch(&rec, 42, 5), LaunchReport::UnknownGame(GameId(42)));
        let rec = rec.into_inner();
        assert!(rec.sleeps.is_empty());
        assert!(rec.runs.is_empty());
        assert_eq!(rec.pushes, 0);
    }

    #[test]
    fn delay_then_run_then_push() {
        let rec = std::cell::RefCell::new(Recorder::default());
        assert_eq!(launch(&rec, 2, 4), LaunchReport::Completed(GameId(2)));
        let rec = rec.into_inner();
        assert_eq!(rec.sleeps, vec![Duration::from_secs(4)]);
        assert_eq!(rec.runs, vec![GameId(2)]);
        assert_eq!(rec.pushes, 1);
    }

    #[test]
    fn no_sleep_without_sabotage() {
        let rec = std::cell::RefCell::new(Recorder::default());
        launch(&rec, 1, 0);
        assert!(rec.into_inner().sleeps.is_empty());
    }

    #[test]
    fn failed_game_still_pushes() {
        let rec = std::cell::RefCell::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let report = launch(&rec, 3, 0);
        assert!(matches!(report, LaunchReport::Failed(GameId(3), ref msg) if msg.contains("exit status")));
        assert_eq!(rec.into_inner().pushes, 1);
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_reports_exit_status() {
        let mut runner = ProcessRunner::new(&Configuration::new("7"));
        let ok = GameProgram {
            command: "true".to_string(),
            args: vec![],
        };
        let ko = GameProgram {
            command: "false".to_string(),
            args: vec![],
        };
        let missing = GameProgram {
            command: "surely-not-an-installed-game".to_string(),
            args: vec![],
        };
        assert!(runner.run(GameId(1), &ok).is_ok());
        assert!(runner.run(GameId(1), &ko).is_err());
        assert!(runner
            .run(GameId(1), &missing)
            .unwrap_err()
            .to_string()
            .contains("not found"));
    }
}
