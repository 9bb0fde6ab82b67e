//! Cell modifiers rewrite grid cells once, then disappear.
//!
//! Each [`CellEdit`] describes the cell's new state: properties and texture
//! left out are cleared, a layer left out is kept. Edited cells are marked
//! touched in the owning level's journal so the edit survives a reload.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tessera_core::component::{Component, ComponentKind};
use tessera_core::context::TickContext;
use tessera_core::entity::Entity;
use tessera_core::grid::{CellCoord, CellPatch, CellProperty};
use tessera_state::world_state::WorldStateStore;
use tracing::{info, warn};

use super::CELL_MODIFIER_TAG;
use crate::level::EntityDef;
use crate::loader::{Blueprint, SpawnContext};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellEdit {
    pub col: i32,
    pub row: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<CellProperty>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_texture: Option<String>,
}

impl CellEdit {
    pub fn coord(&self) -> CellCoord {
        CellCoord::new(self.col, self.row)
    }

    fn to_patch(&self) -> CellPatch {
        let properties: BTreeSet<CellProperty> = self.properties.iter().flatten().copied().collect();
        CellPatch {
            layer: self.layer,
            properties: Some(properties),
            background_texture: Some(self.background_texture.clone().filter(|t| !t.is_empty())),
        }
    }
}

pub struct CellModifier {
    edits: Vec<CellEdit>,
    journal: Option<(WorldStateStore, String)>,
}

impl CellModifier {
    pub fn new(edits: Vec<CellEdit>) -> Self {
        Self { edits, journal: None }
    }

    pub fn journaled(mut self, store: WorldStateStore, level: impl Into<String>) -> Self {
        self.journal = Some((store, level.into()));
        self
    }
}

impl Component for CellModifier {
    fn update(&mut self, owner: &mut Entity, ctx: &mut TickContext<'_>) {
        let mut touched = Vec::with_capacity(self.edits.len());
        for edit in &self.edits {
            if !ctx.grid.set_cell(edit.col, edit.row, edit.to_patch()) {
                warn!(modifier = owner.name(), cell = %edit.coord(), "cell not found; edit skipped");
                continue;
            }
            touched.push(edit.coord());
        }
        info!(modifier = owner.name(), cells = touched.len(), "cells modified");
        if let Some((store, level)) = &self.journal {
            store.mark_cells_touched(level, touched);
        }
        owner.destroy();
    }
}

// ---------------------------------------------------------------------------
// Level data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CellModifierData {
    #[serde(default)]
    pub cells_to_modify: Vec<CellEdit>,
}

pub(crate) fn blueprint() -> Blueprint<CellModifierData> {
    Blueprint::new(build)
}

fn build(def: &EntityDef, data: CellModifierData, ctx: &SpawnContext) -> Vec<Entity> {
    let mut entity = Entity::new(def.id.clone(), def.kind.clone()).with_tag(CELL_MODIFIER_TAG);
    entity.add(CellModifier::new(data.cells_to_modify).journaled(ctx.store.clone(), ctx.level.clone()));
    entity.set_update_order(&[ComponentKind::of::<CellModifier>()]);
    vec![entity]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TickConfig;
    use crate::tick::Simulation;
    use tessera_core::grid::Grid;

    #[test]
    fn applies_once_and_marks_touched() {
        let mut grid = Grid::new(4, 4, 32.0);
        grid.set_cell(
            1,
            1,
            CellPatch::default()
                .layer(1)
                .properties([CellProperty::Wall])
                .texture(Some("brick".to_owned())),
        );
        let store = WorldStateStore::new();
        let mut sim = Simulation::new(grid, TickConfig::default());

        let edits: Vec<CellEdit> = serde_json::from_str(
            r#"[{ "col": 1, "row": 1, "properties": ["bridge"] },
                { "col": 2, "row": 0, "layer": 2, "backgroundTexture": "moss" },
                { "col": 9, "row": 9, "layer": 1 }]"#,
        )
        .unwrap();
        let mut entity = Entity::new("mod0", "cellmodifier");
        entity.add(CellModifier::new(edits).journaled(store.clone(), "dungeon1"));
        sim.registry_mut().add(entity);
        sim.tick();

        let bridged = sim.grid().get_cell(1, 1).unwrap();
        assert_eq!(bridged.layer, 1, "absent layer is kept");
        assert!(bridged.has(CellProperty::Bridge));
        assert!(!bridged.is_wall());
        assert_eq!(bridged.background_texture, None, "absent texture is cleared");

        let raised = sim.grid().get_cell(2, 0).unwrap();
        assert_eq!(raised.layer, 2);
        assert_eq!(raised.background_texture.as_deref(), Some("moss"));

        assert!(sim.registry().is_empty());
        let journal = store.level("dungeon1");
        assert!(journal.is_touched(CellCoord::new(1, 1)));
        assert!(journal.is_touched(CellCoord::new(2, 0)));
        assert!(!journal.is_touched(CellCoord::new(9, 9)));
    }
}
