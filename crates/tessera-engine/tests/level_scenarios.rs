//! End-to-end scenarios: layered movement, world-state reconciliation on
//! reload, and a walkthrough of the bundled two-level fixture.

use tessera_engine::prelude::*;

const DUNGEON1: &str = include_str!("fixtures/dungeon1.json");
const DUNGEON2: &str = include_str!("fixtures/dungeon2.json");

fn walker(sim: &mut Simulation, name: &str, cell: CellCoord, velocity: Velocity) -> EntityId {
    let (x, y) = sim.grid().cell_center(cell.col, cell.row);
    let mut entity = Entity::new(name, "walker");
    entity.add(Transform::new(x, y));
    entity.add(velocity);
    entity.add(GridPosition::default());
    entity.add(GridMover::new());
    sim.registry_mut().add(entity)
}

fn position(sim: &Simulation, id: EntityId) -> GridPosition {
    sim.registry()
        .get(id)
        .and_then(|e| e.get::<GridPosition>())
        .copied()
        .unwrap()
}

// -- 1. Stairs ---------------------------------------------------------------

#[test]
fn layer_changes_only_on_the_stairs() {
    let mut grid = Grid::new(10, 10, 64.0);
    grid.set_cell(4, 1, CellPatch::default().layer(1).properties([CellProperty::Stairs]));
    for col in [3, 5] {
        grid.set_cell(col, 1, CellPatch::default().layer(1).properties([CellProperty::Platform]));
    }
    let mut sim = Simulation::new(grid, TickConfig::default());
    let climber = walker(&mut sim, "climber", CellCoord::new(4, 3), Velocity::new(0.0, -96.0));
    let blocked = walker(&mut sim, "blocked", CellCoord::new(6, 1), Velocity::new(-96.0, 0.0));

    let mut reached = false;
    for _ in 0..120 {
        sim.tick();
        let at = position(&sim, climber);
        if at.cell == Some(CellCoord::new(4, 1)) {
            assert_eq!(at.layer, 1);
            reached = true;
            break;
        }
        assert_eq!(at.layer, 0, "still on the ground at {:?}", at.cell);
    }
    assert!(reached, "climber reached the stairs");

    let stuck = position(&sim, blocked);
    assert_eq!(stuck.cell, Some(CellCoord::new(6, 1)));
    assert_eq!(stuck.layer, 0);
    let mover = sim.registry().get(blocked).and_then(|e| e.get::<GridMover>()).unwrap();
    assert!(mover.blocked_steps > 0);
    assert!(sim.registry().verify_occupancy(sim.grid()).is_ok());
}

// -- 2. Reconciliation -------------------------------------------------------

const OUTPOST: &str = r#"{
    "name": "dungeon1",
    "width": 10,
    "height": 10,
    "playerStart": { "x": 1, "y": 1 },
    "entities": [
        { "id": "bug_base0", "type": "bug_base", "data": { "col": 7, "row": 7 } },
        { "id": "crate0", "type": "breakable", "data": { "col": 4, "row": 4 } }
    ]
}"#;

#[test]
fn destroyed_bug_base_returns_as_its_husk() {
    let mut levels = InMemoryLevels::new();
    levels.insert_json(OUTPOST).unwrap();
    let mut session = GameSession::new(EngineConfig::default(), levels, WorldStateStore::new());

    let first = session.load_level("dungeon1", None).unwrap();
    assert_eq!(first.stand_ins, 0);
    assert!(session.registry().find_by_name("bug_base0").is_some());

    session.store().add_destroyed_entity("dungeon1", "bug_base0");
    let second = session.load_level("dungeon1", None).unwrap();
    assert_eq!(second.stand_ins, 1);
    assert!(session.registry().find_by_name("bug_base0").is_none());
    let husk = session.registry().find_by_name("bug_base0_exhausted").unwrap();
    assert_eq!(husk.kind(), "bug_base_exhausted");
    assert!(session.registry().find_by_name("crate0").is_some());
}

const KEEP: &str = r#"{
    "name": "keep",
    "width": 8,
    "height": 8,
    "playerStart": { "x": 1, "y": 1 },
    "entities": [
        { "id": "mod0", "type": "cellmodifier", "data": { "cellsToModify": [
            { "col": 3, "row": 3, "layer": 2, "properties": ["platform"] }
        ] } }
    ]
}"#;

const YARD: &str = r#"{ "name": "yard", "width": 4, "height": 4, "playerStart": { "x": 1, "y": 1 } }"#;

fn edited(session: &GameSession) -> bool {
    let Some(cell) = session.grid().get_cell(3, 3) else { return false };
    cell.layer == 2 && cell.properties.contains(&CellProperty::Platform)
}

#[test]
fn edited_terrain_survives_every_way_back_in() {
    let mut levels = InMemoryLevels::new();
    levels.insert_json(KEEP).unwrap();
    levels.insert_json(YARD).unwrap();
    let mut session = GameSession::new(EngineConfig::default(), levels, WorldStateStore::new());

    session.load_level("keep", None).unwrap();
    assert_eq!(session.grid().layer(3, 3), Some(0));
    session.run_ticks(2).unwrap();
    assert!(edited(&session));

    // Straight back into the level being played.
    session.load_level("keep", None).unwrap();
    assert!(edited(&session));
    assert!(session.registry().find_by_name("mod0").is_none(), "modifier is spent");
    session.run_ticks(2).unwrap();
    assert!(edited(&session));

    // Out and back through transitions.
    session.transition_to("yard", CellCoord::new(2, 2)).unwrap();
    assert_eq!(session.current_level(), Some("yard"));
    session.tick().unwrap();
    session.transition_to("keep", CellCoord::new(1, 1)).unwrap();
    assert!(edited(&session));
    assert_eq!(session.grid().layer(3, 3), Some(2));
    assert!(session.registry().find_by_name("mod0").is_none());

    // The yard was never edited.
    assert!(session.store().level("yard").modified_cells.is_empty());
}

// -- 3. Fixture walkthrough --------------------------------------------------

fn walk(session: &mut GameSession, (dx, dy): (f64, f64), goal: CellCoord, limit: u32) -> bool {
    session.player_input().unwrap().set_direction(dx, dy);
    let mut arrived = false;
    for _ in 0..limit {
        session.tick().unwrap();
        if session.player_cell() == Some(goal) {
            arrived = true;
            break;
        }
    }
    if let Some(input) = session.player_input() {
        input.set_direction(0.0, 0.0);
    }
    arrived
}

#[test]
fn plate_door_exit_and_return() {
    let mut levels = InMemoryLevels::new();
    levels.insert_json(DUNGEON1).unwrap();
    levels.insert_json(DUNGEON2).unwrap();
    let mut session = GameSession::new(EngineConfig::default(), levels, WorldStateStore::new());

    let report = session.load_level("dungeon1", None).unwrap();
    assert_eq!(report.deferred, 2, "door cells and treasure wait on events");
    assert!(session.grid().is_wall(6, 5));
    assert!(session.registry().find_by_name("treasure").is_none());

    // The plate starts the chainer; the door opens half a second later.
    assert!(walk(&mut session, (1.0, 0.0), CellCoord::new(3, 4), 120));
    session.run_ticks(60).unwrap();
    assert!(session.store().has_fired_trigger("dungeon1", "plate_pressed"));
    assert!(!session.grid().is_wall(6, 5));
    assert!(session.store().level("dungeon1").is_touched(CellCoord::new(6, 5)));
    assert!(session.store().is_live("dungeon1", "treasure"));
    assert!(session.registry().find_by_name("treasure").is_some());
    assert!(session.registry().find_by_name("lever_plate").is_none(), "one-shot plate is spent");

    // Up one row, then east to the exit.
    assert!(walk(&mut session, (0.0, -1.0), CellCoord::new(3, 3), 120));
    walk(&mut session, (1.0, 0.0), CellCoord::new(11, 3), 400);
    session.run_ticks(3).unwrap();
    assert_eq!(session.current_level(), Some("dungeon2"));
    assert_eq!(session.player_cell(), Some(CellCoord::new(1, 1)));

    // Back through the west exit of dungeon2.
    walk(&mut session, (-1.0, 0.0), CellCoord::new(0, 1), 120);
    session.run_ticks(3).unwrap();
    assert_eq!(session.current_level(), Some("dungeon1"));
    assert_eq!(session.player_cell(), Some(CellCoord::new(10, 3)));

    // The door stays open and nothing spent comes back.
    assert!(!session.grid().is_wall(6, 5));
    assert!(session.registry().find_by_name("lever_plate").is_none());
    assert!(session.registry().find_by_name("door_cells").is_none());
    assert!(session.registry().find_by_name("treasure").is_some());
    assert!(session.registry().find_by_name("crate0").is_some());
    assert_eq!(session.creators().pending_count(), 0);
}
