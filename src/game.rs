use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::loot_gen::LootGeneratorParams;
use crate::session::{Dog, GameSession, SessionId, StateContent};
use crate::world::{Map, MapId};

// Registry of immutable maps and the live session per map. Sessions are
// created lazily on first lookup; snapshot restore inserts them with explicit
// ids instead.
#[derive(Debug, Default)]
pub struct Game {
    maps: Vec<Arc<Map>>,
    map_index: HashMap<MapId, usize>,
    sessions: HashMap<MapId, GameSession>,
    next_session_id: u64,
    random_spawn: bool,
    loot_params: LootGeneratorParams,
    retirement_time_ms: u64,
}

impl Game {
    pub fn add_map(&mut self, map: Map) -> Result<()> {
        if self.map_index.contains_key(map.id()) {
            bail!("map {} already exists", map.id());
        }
        self.map_index.insert(map.id().clone(), self.maps.len());
        self.maps.push(Arc::new(map));
        Ok(())
    }

    pub fn maps(&self) -> &[Arc<Map>] {
        &self.maps
    }

    pub fn find_map(&self, id: &MapId) -> Option<&Arc<Map>> {
        self.map_index.get(id).map(|idx| &self.maps[*idx])
    }

    pub fn set_random_spawn(&mut self, value: bool) {
        self.random_spawn = value;
    }

    pub fn set_loot_generator_params(&mut self, params: LootGeneratorParams) {
        self.loot_params = params;
    }

    pub fn set_dog_retirement_time(&mut self, retirement_time_ms: u64) {
        self.retirement_time_ms = retirement_time_ms;
    }

    pub fn session(&self, map_id: &MapId) -> Option<&GameSession> {
        self.sessions.get(map_id)
    }

    pub fn session_by_map_id(&mut self, map_id: &MapId) -> Option<&mut GameSession> {
        if !self.sessions.contains_key(map_id) {
            let map = Arc::clone(self.find_map(map_id)?);
            let session_id = SessionId(self.next_session_id);
            self.next_session_id += 1;
            self.sessions.insert(
                map_id.clone(),
                GameSession::new(
                    map,
                    session_id,
                    self.random_spawn,
                    self.loot_params,
                    self.retirement_time_ms,
                    0,
                    0,
                ),
            );
        }
        self.sessions.get_mut(map_id)
    }

    // Snapshot restore: the explicit session id bypasses autogeneration but
    // still advances the allocator so later sessions stay unique.
    pub fn add_game_session(
        &mut self,
        map_id: &MapId,
        session_id: SessionId,
        dog_start_id: u64,
        loot_start_id: u64,
    ) -> Result<&mut GameSession> {
        let Some(map) = self.find_map(map_id) else {
            bail!("map {map_id} not found");
        };
        let map = Arc::clone(map);
        self.next_session_id = self.next_session_id.max(session_id.value() + 1);
        self.sessions.insert(
            map_id.clone(),
            GameSession::new(
                map,
                session_id,
                self.random_spawn,
                self.loot_params,
                self.retirement_time_ms,
                dog_start_id,
                loot_start_id,
            ),
        );
        Ok(self
            .sessions
            .get_mut(map_id)
            .expect("session should exist right after insertion"))
    }

    pub fn on_tick(&mut self, delta_ms: u64) -> Vec<(MapId, Dog)> {
        let mut retired = Vec::new();
        for (map_id, session) in &mut self.sessions {
            let mut session_retired = Vec::new();
            session.on_tick(delta_ms, &mut session_retired);
            retired.extend(
                session_retired
                    .into_iter()
                    .map(|dog| (map_id.clone(), dog)),
            );
        }
        retired
    }

    pub fn state(&self) -> Vec<StateContent> {
        self.sessions
            .values()
            .map(GameSession::state_content)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::PointInt;
    use crate::world::Road;

    fn game_with_maps(ids: &[&str]) -> Game {
        let mut game = Game::default();
        game.set_loot_generator_params(LootGeneratorParams {
            period_ms: 5_000,
            probability: 0.0,
        });
        game.set_dog_retirement_time(60_000);
        for id in ids {
            let mut map = Map::new(MapId::new(*id), format!("Map {id}"), 3.0, 3);
            map.add_loot_worth(1);
            map.add_road(Road::horizontal(PointInt { x: 0, y: 0 }, 10));
            game.add_map(map).unwrap();
        }
        game
    }

    #[test]
    fn duplicate_map_is_rejected() {
        let mut game = game_with_maps(&["m1"]);
        let map = Map::new(MapId::new("m1"), "Again", 3.0, 3);
        assert!(game.add_map(map).is_err());
    }

    #[test]
    fn sessions_are_created_lazily_with_unique_ids() {
        let mut game = game_with_maps(&["m1", "m2"]);
        assert!(game.session(&MapId::new("m1")).is_none());

        let first = game.session_by_map_id(&MapId::new("m1")).unwrap().id();
        let again = game.session_by_map_id(&MapId::new("m1")).unwrap().id();
        let second = game.session_by_map_id(&MapId::new("m2")).unwrap().id();

        assert_eq!(first, again);
        assert_ne!(first, second);
        assert!(game.session_by_map_id(&MapId::new("missing")).is_none());
    }

    #[test]
    fn restored_session_id_advances_the_allocator() {
        let mut game = game_with_maps(&["m1", "m2"]);
        game.add_game_session(&MapId::new("m1"), SessionId(7), 3, 4)
            .unwrap();
        let next = game.session_by_map_id(&MapId::new("m2")).unwrap().id();
        assert_eq!(next, SessionId(8));
    }

    #[test]
    fn add_game_session_requires_known_map() {
        let mut game = game_with_maps(&["m1"]);
        assert!(game
            .add_game_session(&MapId::new("missing"), SessionId(0), 0, 0)
            .is_err());
    }

    #[test]
    fn tick_fans_out_and_collects_retirements() {
        let mut game = game_with_maps(&["m1", "m2"]);
        game.set_dog_retirement_time(1_000);
        game.session_by_map_id(&MapId::new("m1")).unwrap().new_dog("Rex");
        game.session_by_map_id(&MapId::new("m2")).unwrap().new_dog("Toby");

        let retired = game.on_tick(1_000);
        assert_eq!(retired.len(), 2);
        assert!(game.state().iter().all(|content| content.dogs.is_empty()));
    }
}
