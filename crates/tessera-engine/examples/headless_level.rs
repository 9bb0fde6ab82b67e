//! Headless walkthrough of the bundled `dungeon1` fixture.
//!
//! The player walks onto the pressure plate, which starts a chainer that opens
//! a door in the wall and conjures a treasure breakable, then shoots the
//! treasure open, collects the coins and leaves through the east exit.
//!
//! ```sh
//! RUST_LOG=tessera_engine=info cargo run -p tessera-engine --example headless_level
//! ```

use anyhow::Context;
use tessera_engine::prelude::*;

const DUNGEON1: &str = include_str!("../tests/fixtures/dungeon1.json");
const DUNGEON2: &str = include_str!("../tests/fixtures/dungeon2.json");

/// Walk toward `(dx, dy)` until the player stands on `goal` or `limit` ticks pass.
fn walk(session: &mut GameSession, (dx, dy): (f64, f64), goal: CellCoord, limit: u32) -> anyhow::Result<bool> {
    session.player_input().context("no player")?.set_direction(dx, dy);
    for _ in 0..limit {
        session.tick()?;
        if session.player_cell() == Some(goal) {
            break;
        }
    }
    if let Some(input) = session.player_input() {
        input.set_direction(0.0, 0.0);
    }
    Ok(session.player_cell() == Some(goal))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let mut levels = InMemoryLevels::new();
    levels.insert_json(DUNGEON1).context("dungeon1 fixture")?;
    levels.insert_json(DUNGEON2).context("dungeon2 fixture")?;

    let config = EngineConfig {
        tick: TickConfig {
            headless: true,
            ..TickConfig::default()
        },
        ..EngineConfig::default()
    };
    let mut session = GameSession::new(config, levels, WorldStateStore::new());
    let report = session.load_level("dungeon1", None)?;
    println!(
        "loaded dungeon1: {} spawned, {} deferred",
        report.spawned, report.deferred
    );

    // Onto the pressure plate, then wait for the door.
    walk(&mut session, (1.0, 0.0), CellCoord::new(3, 4), 120)?;
    session.run_ticks(60)?;
    let door_open = !session.grid().is_wall(6, 5);
    let treasure = session.registry().find_by_name("treasure").is_some();
    println!("door open: {door_open}, treasure present: {treasure}");

    // Through the gap in the wall and up to the treasure.
    walk(&mut session, (1.0, 0.0), CellCoord::new(7, 4), 240)?;
    for _ in 0..12 {
        if let Some(input) = session.player_input() {
            input.fire();
        }
        session.run_ticks(20)?;
    }
    println!(
        "treasure broken: {}, coins on the floor: {}",
        session.registry().find_by_name("treasure").is_none(),
        session.registry().get_by_kind("coin").len()
    );
    walk(&mut session, (1.0, 0.0), CellCoord::new(9, 4), 240)?;
    walk(&mut session, (-1.0, 0.0), CellCoord::new(8, 4), 240)?;
    session.run_ticks(30)?;
    println!("coins collected: {}", session.store().coins());

    // East exit.
    walk(&mut session, (0.0, -1.0), CellCoord::new(9, 3), 240)?;
    walk(&mut session, (1.0, 0.0), CellCoord::new(11, 3), 240)?;
    session.run_ticks(2)?;
    println!(
        "now in {}, player at {:?}",
        session.current_level().unwrap_or("?"),
        session.player_cell()
    );

    let path = std::env::temp_dir().join("tessera-headless-level.json");
    session.save_snapshot(&path)?;
    println!(
        "world state saved to {} (digest {})",
        path.display(),
        session.store().digest()?
    );
    Ok(())
}
