use anyhow::Context;
use captain::config::CaptainConfig;
use captain::engine::ProcessEngine;
use captain::session::Session;
use captain::store::Store;
use captain_core::{Game, Tournament};
use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "captain")]
#[command(about = "Swiss-system tournament manager")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "captain.toml")]
    config: PathBuf,

    /// Storage directory, overriding `tournaments_dir` from the configuration
    #[arg(short, long)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the stored tournaments
    List,
    /// Show players and rounds of a tournament
    View {
        /// Tournament name
        tournament: String,
    },
    /// Register a player
    AddPlayer {
        /// Tournament name
        tournament: String,
        /// Player name or other identity
        identity: String,
    },
    /// Record the results of a round, e.g. "1:2 1-0, 3:4 0.5-0.5"
    Results {
        /// Tournament name
        tournament: String,
        /// Round number
        round: u32,
        /// Results expression
        results: String,
    },
    /// Mark a player as inactive for a round
    Withdraw {
        /// Tournament name
        tournament: String,
        /// Start number of the player
        start_no: u32,
        /// Round number
        round: u32,
    },
    /// Change the number of planned rounds
    Configure {
        /// Tournament name
        tournament: String,
        /// New number of planned rounds
        #[arg(short, long)]
        rounds: u32,
    },
    /// Pair the next round with the configured pairing engine
    Pair {
        /// Tournament name
        tournament: String,
    },
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = CaptainConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let dir = cli.dir.unwrap_or_else(|| config.tournaments_dir.clone());
    let store = Store::new(dir, config.default_round_count);

    match cli.command {
        Commands::List => {
            for name in store.list()? {
                println!("{}", name);
            }
        }
        Commands::View { tournament } => {
            let (record, existed) = store.load(&tournament)?;
            if !existed {
                println!("No record for '{}' yet", tournament);
            }
            print!("{}", render(&tournament, &record));
        }
        Commands::AddPlayer {
            tournament,
            identity,
        } => {
            let mut session = open(&config, store, &tournament)?;
            let start_no = session.add_player(&identity)?;
            println!("Registered {} as start number {}", identity.trim(), start_no);
        }
        Commands::Results {
            tournament,
            round,
            results,
        } => {
            let mut session = open(&config, store, &tournament)?;
            session.record_results(round, &results)?;
            println!("Recorded results of round {}", round);
        }
        Commands::Withdraw {
            tournament,
            start_no,
            round,
        } => {
            let mut session = open(&config, store, &tournament)?;
            session.record_withdrawal(start_no, round)?;
            println!("Player {} withdrawn from round {}", start_no, round);
        }
        Commands::Configure { tournament, rounds } => {
            let mut session = open(&config, store, &tournament)?;
            session.set_round_count(rounds)?;
            println!("{} rounds planned", rounds);
        }
        Commands::Pair { tournament } => {
            let mut session = open(&config, store, &tournament)?;

            let cancel = session.cancel_token();
            ctrlc::set_handler(move || {
                tracing::warn!("interrupt received, cancelling pairing");
                cancel.cancel();
            })
            .context("installing the interrupt handler")?;

            let round_no = session.generate_pairing()?;
            let round = session
                .tournament()
                .round(round_no)
                .context("paired round missing from the record")?;
            println!("Round {}:", round_no);
            for game in &round.results {
                println!("  {}", describe_game(game));
            }
        }
    }

    Ok(())
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open(
    config: &CaptainConfig,
    store: Store,
    tournament: &str,
) -> anyhow::Result<Session<ProcessEngine>> {
    let engine = ProcessEngine::new(
        resolve_program(&config.engine.program),
        config.engine.args.clone(),
        config.engine.timeout(),
    );
    let session = Session::open(store, engine, tournament, config.duplicate_identities)?;
    Ok(session)
}

/// Prefers a bare program name installed next to this executable over a
/// lookup through `PATH`.
fn resolve_program(program: &Path) -> PathBuf {
    if program.components().count() != 1 {
        return program.to_path_buf();
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(program)))
        .filter(|sibling| sibling.is_file())
        .unwrap_or_else(|| program.to_path_buf())
}

fn describe_game(game: &Game) -> String {
    let white = game
        .white
        .map_or_else(|| "?".to_string(), |p| p.to_string());
    let pairing = match (game.white, game.black) {
        (_, Some(black)) => format!("{}:{}", white, black),
        (Some(_), None) => format!("{}:bye", white),
        (None, None) => "?:?".to_string(),
    };
    match game.score {
        Some(score) => format!("{} {}", pairing, score),
        None => pairing,
    }
}

fn render(name: &str, tournament: &Tournament) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} ({} of {} rounds recorded)",
        name,
        tournament.rounds().len(),
        tournament.configured_round_count()
    );

    let _ = writeln!(out, "Players:");
    for player in tournament.players() {
        let _ = write!(out, "  {:>3}  {}", player.start_no, player.identity);
        if !player.withdrawals.is_empty() {
            let rounds: Vec<String> = player.withdrawals.iter().map(|r| r.to_string()).collect();
            let _ = write!(out, "  (withdrawn: {})", rounds.join(", "));
        }
        out.push('\n');
    }

    for round in tournament.rounds() {
        let _ = writeln!(out, "Round {}:", round.round_no);
        for game in &round.results {
            let _ = writeln!(out, "  {}", describe_game(game));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use captain_core::DuplicateIdentities;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses_results_command() {
        let cli = Cli::try_parse_from(["captain", "results", "club", "2", "1:2 1-0, 3:4 0-1"])
            .unwrap();
        match cli.command {
            Commands::Results {
                tournament,
                round,
                results,
            } => {
                assert_eq!(tournament, "club");
                assert_eq!(round, 2);
                assert_eq!(results, "1:2 1-0, 3:4 0-1");
            }
            _ => panic!("Expected Results command"),
        }
        assert_eq!(cli.config, PathBuf::from("captain.toml"));
        assert!(cli.dir.is_none());
    }

    #[test]
    fn test_cli_parses_global_options() {
        let cli = Cli::try_parse_from([
            "captain",
            "--config",
            "other.toml",
            "--dir",
            "/tmp/events",
            "pair",
            "club",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        assert_eq!(cli.dir, Some(PathBuf::from("/tmp/events")));
        assert!(matches!(cli.command, Commands::Pair { tournament } if tournament == "club"));
    }

    #[test]
    fn test_cli_parses_configure_rounds() {
        let cli = Cli::try_parse_from(["captain", "configure", "club", "--rounds", "7"]).unwrap();
        assert!(matches!(cli.command, Commands::Configure { rounds: 7, .. }));

        assert!(Cli::try_parse_from(["captain", "configure", "club"]).is_err());
    }

    #[test]
    fn test_cli_parses_withdraw_and_add_player() {
        let cli = Cli::try_parse_from(["captain", "withdraw", "club", "3", "2"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Withdraw {
                start_no: 3,
                round: 2,
                ..
            }
        ));

        let cli = Cli::try_parse_from(["captain", "add-player", "club", "Magnus C"]).unwrap();
        assert!(matches!(cli.command, Commands::AddPlayer { identity, .. } if identity == "Magnus C"));
    }

    #[test]
    fn test_cli_rejects_negative_round() {
        assert!(Cli::try_parse_from(["captain", "withdraw", "club", "1", "-2"]).is_err());
    }

    #[test]
    fn test_cli_help_lists_commands() {
        let help = Cli::command().render_help().to_string();
        for command in ["list", "view", "add-player", "results", "withdraw", "configure", "pair"] {
            assert!(help.contains(command), "help is missing {}", command);
        }
    }

    #[test]
    fn test_describe_game() {
        assert_eq!(describe_game(&Game::pairing(1, 2)), "1:2");
        assert_eq!(describe_game(&Game::bye(5)), "5:bye");

        let mut t = Tournament::default();
        t.record_round_results(1, "1-0").unwrap();
        assert_eq!(describe_game(&t.round(1).unwrap().results[0]), "?:? 1-0");
    }

    #[test]
    fn test_render_lists_players_and_rounds() {
        let mut t = Tournament::default();
        for name in ["Alice", "Bob", "Carol"] {
            t.add_player(name, DuplicateIdentities::Reject).unwrap();
        }
        t.record_round_results(1, "1:2 0.5-0.5, 3:bye 1").unwrap();
        t.record_withdrawal(2, 2).unwrap();

        let text = render("club", &t);
        assert!(text.starts_with("club (1 of 5 rounds recorded)\n"));
        assert!(text.contains("    2  Bob  (withdrawn: 2)\n"));
        assert!(text.contains("Round 1:\n  1:2 0.5-0.5\n  3:bye 1\n"));
    }

    #[test]
    fn test_resolve_program_keeps_paths() {
        assert_eq!(
            resolve_program(Path::new("/opt/pairer")),
            PathBuf::from("/opt/pairer")
        );
        assert_eq!(
            resolve_program(Path::new("no-such-engine-anywhere")),
            PathBuf::from("no-such-engine-anywhere")
        );
    }
}
