//! Which program to launch for each game id.
//!
//! The built-in catalog runs the classroom mini-games through an interpreter. It can be replaced by
//! a catalog file:
//!
//! ```yaml
//! final: 99
//! games:
//!   - 1: "python3 simon.py"
//!   - 2: "./flappy --fullscreen"
//!   - 99: "python3 survival.py"
//! ```
//!
//! > ⚠️ This file is manually parsed and supports only basic YAML. Comments are supported, but
//! > advanced YAML features (anchors, nesting, multi-line strings) may not parse correctly.
//!
//! The reserved `final` id must be present in `games`.

use std::{collections::BTreeMap, fmt::Display, path::Path};

use anyhow::{bail, Context};
use tracing::instrument;

/// Event log the built-in games append their results to.
pub const BUILTIN_GAMES_LOG: &str = "eventos_minijuego1.log";

/// Identifier of a round's game, as sent by the host in `GameID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GameId(pub u32);

impl Display for GameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id of the survival game played once the session reaches its final stage.
pub const DEFAULT_FINAL_GAME: GameId = GameId(99);

/// An external program: a command and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameProgram {
    /// Executable name or path
    pub command: String,
    /// Arguments given to `command`
    pub args: Vec<String>,
}

impl Display for GameProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Fixed mapping from game ids to programs, with one reserved final id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameCatalog {
    games: BTreeMap<GameId, GameProgram>,
    final_game: GameId,
}

impl GameCatalog {
    /// The classroom games, each run as `interpreter <script>`.
    pub fn builtin(interpreter: &str) -> GameCatalog {
        let script = |name: &str| GameProgram {
            command: interpreter.to_string(),
            args: vec![name.to_string()],
        };
        let games = BTreeMap::from([
            (GameId(1), script("simon.py")),
            (GameId(2), script("flappy_pkmn.py")),
            (GameId(3), script("lluvia_pkmn.py")),
            (GameId(4), script("supersonico.py")),
            (DEFAULT_FINAL_GAME, script("juego_supervivencia.py")),
        ]);
        GameCatalog {
            games,
            final_game: DEFAULT_FINAL_GAME,
        }
    }

    /// Read a catalog file.
    #[instrument]
    pub fn from_file(path: &Path) -> anyhow::Result<GameCatalog> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("could not read catalog {}", path.display()))?;
        parse_catalog(&yaml).with_context(|| format!("invalid catalog {}", path.display()))
    }

    /// Program of `id`, if the catalog knows it.
    pub fn get(&self, id: GameId) -> Option<&GameProgram> {
        self.games.get(&id)
    }

    /// The reserved id played at the final stage.
    pub fn final_game(&self) -> GameId {
        self.final_game
    }
}

fn get_args_from_command(line: &str) -> anyhow::Result<GameProgram> {
    if line.contains('"') || line.contains('\'') || line.contains('`') {
        bail!("arguments should not contain any quote")
    }
    let mut words = line.split(' ').filter(|w| !w.is_empty()).map(String::from);
    let command = words.next().context("empty command")?;
    Ok(GameProgram {
        command,
        args: words.collect(),
    })
}

fn parse_catalog(yaml: &str) -> anyhow::Result<GameCatalog> {
    let mut final_game = None;
    let mut games = BTreeMap::new();
    let mut in_games = false;

    for (i, line) in yaml.lines().enumerate() {
        let line = line.trim_end();

        // Skip empty lines and comments
        if line.trim().is_empty() || line.trim().starts_with('#') {
            continue;
        }

        if !in_games {
            if let Some(value) = line.strip_prefix("final:") {
                let value = value.trim();
                if value.is_empty() {
                    bail!("Line {}: 'final' value missing", i + 1);
                }
                let id = value
                    .parse()
                    .with_context(|| format!("Line {}: '{value}' is not a game id", i + 1))?;
                final_game = Some(GameId(id));
            } else if line.starts_with("games:") {
                in_games = true;
            } else {
                bail!("Line {}: Expected 'final:' or 'games:' key", i + 1);
            }
        } else {
            // Inside games list, expect lines like: '- 1: "command args"'
            let line = line.trim_start();
            let Some(rest) = line.strip_prefix('-') else {
                bail!("Line {}: Expected list item starting with '-'", i + 1);
            };
            let (key, value_part) = rest
                .split_once(':')
                .with_context(|| format!("Line {}: Missing ':' in game item", i + 1))?;
            let key = key.trim();
            let id = key
                .parse()
                .with_context(|| format!("Line {}: '{key}' is not a game id", i + 1))?;
            let value_part = value_part.trim();

            // Value should start and end with double quotes
            let Some(quoted) = value_part.strip_prefix('"') else {
                bail!("Line {}: Command must be quoted with double quotes", i + 1);
            };
            let Some(second_quote) = quoted.find('"') else {
                bail!("Line {}: Command must be quoted with double quotes", i + 1);
            };
            let program = get_args_from_command(&quoted[..second_quote])
                .with_context(|| format!("Line {}: invalid command", i + 1))?;

            if games.insert(GameId(id), program).is_some() {
                bail!("Line {}: game {id} listed twice", i + 1);
            }
        }
    }

    let final_game = final_game.context("Missing 'final' key")?;
    if !games.contains_key(&final_game) {
        bail!("final game {final_game} is not listed in 'games'");
    }

    Ok(GameCatalog { games, final_game })
}
