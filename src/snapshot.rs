use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::app::{Application, PlayerTokenState, Token};
use crate::game::Game;
use crate::geom::Point;
use crate::session::{Direction, Dog, DogId, LootId, LootObject, SessionId, StateContent};
use crate::world::MapId;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct LootObjectRepr {
    id: LootId,
    #[serde(rename = "type")]
    loot_type: usize,
    worth: u64,
}

impl LootObjectRepr {
    fn of(obj: &LootObject) -> Self {
        Self {
            id: obj.id(),
            loot_type: obj.loot_type(),
            worth: obj.worth(),
        }
    }

    fn restore(&self) -> LootObject {
        LootObject::new(self.id, self.loot_type, self.worth)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct LootStateRepr {
    object: LootObjectRepr,
    coords: Point,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct DogRepr {
    id: DogId,
    name: String,
    direction: Direction,
    coords: Point,
    #[serde(rename = "prevCoords")]
    prev_coords: Point,
    speed: Point,
    bag: Vec<LootObjectRepr>,
    score: u64,
}

impl DogRepr {
    fn of(dog: &Dog) -> Self {
        Self {
            id: dog.id(),
            name: dog.name().to_string(),
            direction: dog.direction(),
            coords: dog.coords(),
            prev_coords: dog.prev_coords(),
            speed: dog.speed(),
            bag: dog.bag().iter().map(LootObjectRepr::of).collect(),
            score: dog.score(),
        }
    }

    fn restore(self) -> Dog {
        Dog::restore(
            self.id,
            self.name,
            self.direction,
            self.coords,
            self.prev_coords,
            self.speed,
            self.bag.iter().map(LootObjectRepr::restore).collect(),
            self.score,
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SessionRepr {
    #[serde(rename = "mapId")]
    map_id: MapId,
    #[serde(rename = "sessionId")]
    session_id: SessionId,
    dogs: Vec<DogRepr>,
    #[serde(rename = "lootObjects")]
    loot_objects: Vec<LootStateRepr>,
    #[serde(rename = "dogsJoin")]
    dogs_join: u64,
    #[serde(rename = "objectsSpawned")]
    objects_spawned: u64,
}

impl SessionRepr {
    fn of(content: &StateContent) -> Self {
        Self {
            map_id: content.map_id.clone(),
            session_id: content.session_id,
            dogs: content.dogs.iter().map(DogRepr::of).collect(),
            loot_objects: content
                .loot_objects
                .iter()
                .map(|(obj, coords)| LootStateRepr {
                    object: LootObjectRepr::of(obj),
                    coords: *coords,
                })
                .collect(),
            dogs_join: content.dogs_join,
            objects_spawned: content.objects_spawned,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PlayerRepr {
    token: Token,
    #[serde(rename = "mapId")]
    map_id: MapId,
    #[serde(rename = "sessionId")]
    session_id: SessionId,
    #[serde(rename = "dogId")]
    dog_id: DogId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SnapshotRepr {
    sessions: Vec<SessionRepr>,
    players: Vec<PlayerRepr>,
}

fn encode(sessions: &[StateContent], players: &[PlayerTokenState]) -> Result<String> {
    let repr = SnapshotRepr {
        sessions: sessions.iter().map(SessionRepr::of).collect(),
        players: players
            .iter()
            .map(|state| PlayerRepr {
                token: state.token.clone(),
                map_id: state.map_id.clone(),
                session_id: state.session_id,
                dog_id: state.dog_id,
            })
            .collect(),
    };
    serde_json::to_string(&repr).context("failed to serialize snapshot")
}

fn decode(text: &str) -> Result<SnapshotRepr> {
    serde_json::from_str(text).context("corrupt snapshot")
}

// Rebuilds sessions inside the game and hands back the token bindings for
// the caller to register.
fn apply(game: &mut Game, repr: SnapshotRepr) -> Result<Vec<PlayerTokenState>> {
    for session_repr in repr.sessions {
        let session = game.add_game_session(
            &session_repr.map_id,
            session_repr.session_id,
            session_repr.dogs_join,
            session_repr.objects_spawned,
        )?;
        for dog in session_repr.dogs {
            session.add_dog(dog.restore())?;
        }
        for loot in session_repr.loot_objects {
            session.add_loot_object(loot.object.restore(), loot.coords)?;
        }
    }
    Ok(repr
        .players
        .into_iter()
        .map(|player| PlayerTokenState {
            token: player.token,
            map_id: player.map_id,
            session_id: player.session_id,
            dog_id: player.dog_id,
        })
        .collect())
}

// Serialize to a sibling path, then atomically rename over the target; a
// crash mid-write leaves the last committed snapshot in place.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let mut buf_path = path.as_os_str().to_owned();
    buf_path.push(".tmp");
    let buf_path = PathBuf::from(buf_path);
    fs::write(&buf_path, contents)
        .with_context(|| format!("failed to write {}", buf_path.display()))?;
    fs::rename(&buf_path, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

pub fn save(app: &Application, path: &Path) -> Result<()> {
    let text = encode(&app.game().state(), &app.players_state())?;
    write_atomic(path, &text)
}

pub fn restore(app: &mut Application, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let repr = decode(&text)?;
    let bindings = apply(app.game_mut(), repr)?;
    for binding in bindings {
        app.add_player(
            binding.token,
            &binding.map_id,
            binding.session_id,
            binding.dog_id,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::PointInt;
    use crate::loot_gen::LootGeneratorParams;
    use crate::world::{Map, Road};

    fn fixture_game() -> Game {
        let mut game = Game::default();
        game.set_loot_generator_params(LootGeneratorParams {
            period_ms: 5_000,
            probability: 0.0,
        });
        game.set_dog_retirement_time(60_000);
        for id in ["m1", "m2"] {
            let mut map = Map::new(MapId::new(id), format!("Map {id}"), 3.0, 3);
            map.add_loot_worth(10);
            map.add_loot_worth(30);
            map.add_road(Road::horizontal(PointInt { x: 0, y: 0 }, 10));
            game.add_map(map).unwrap();
        }
        game
    }

    fn fixture_state() -> (Game, Vec<PlayerTokenState>) {
        let mut game = fixture_game();
        let mut players = Vec::new();
        for (idx, map_id) in [MapId::new("m1"), MapId::new("m2")].into_iter().enumerate() {
            let session = game.session_by_map_id(&map_id).unwrap();
            let dog_id = session.new_dog(format!("Dog{idx}"));
            let session_id = session.id();
            let dog = session.dog_mut(dog_id).unwrap();
            dog.set_direction(Direction::East);
            dog.set_speed(3.0);
            dog.add_to_bag(LootObject::new(LootId(90 + idx as u64), 1, 30));
            dog.add_score(12);
            session
                .add_loot_object(
                    LootObject::new(LootId(idx as u64), 0, 10),
                    Point::new(2.5, 0.1),
                )
                .unwrap();
            players.push(PlayerTokenState {
                token: Token::new(format!("{:f>16x}{:a>16x}", idx, idx)),
                map_id,
                session_id,
                dog_id,
            });
        }
        // Two ticks of motion so prev_coords differs from coords.
        game.on_tick(100);
        game.on_tick(100);
        (game, players)
    }

    #[test]
    fn snapshot_round_trips_sessions_and_players() {
        let (game, players) = fixture_state();
        let text = encode(&game.state(), &players).unwrap();

        let mut restored_game = fixture_game();
        let restored_players = apply(&mut restored_game, decode(&text).unwrap()).unwrap();

        assert_eq!(restored_players, players);

        let mut original = game.state();
        let mut restored = restored_game.state();
        original.sort_by(|a, b| a.map_id.cmp(&b.map_id));
        restored.sort_by(|a, b| a.map_id.cmp(&b.map_id));
        assert_eq!(original.len(), restored.len());
        for (lhs, rhs) in original.iter().zip(&restored) {
            assert_eq!(lhs.map_id, rhs.map_id);
            assert_eq!(lhs.session_id, rhs.session_id);
            assert_eq!(lhs.dogs_join, rhs.dogs_join);
            assert_eq!(lhs.objects_spawned, rhs.objects_spawned);
            assert_eq!(lhs.loot_objects, rhs.loot_objects);
            assert_eq!(lhs.dogs.len(), rhs.dogs.len());
            for (dog, restored_dog) in lhs.dogs.iter().zip(&rhs.dogs) {
                assert_eq!(dog.id(), restored_dog.id());
                assert_eq!(dog.name(), restored_dog.name());
                assert_eq!(dog.direction(), restored_dog.direction());
                assert_eq!(dog.coords(), restored_dog.coords());
                assert_eq!(dog.prev_coords(), restored_dog.prev_coords());
                assert_eq!(dog.speed(), restored_dog.speed());
                assert_eq!(dog.bag(), restored_dog.bag());
                assert_eq!(dog.score(), restored_dog.score());
            }
        }
    }

    #[test]
    fn idle_clocks_are_not_persisted() {
        let (game, players) = fixture_state();
        let text = encode(&game.state(), &players).unwrap();
        let mut restored_game = fixture_game();
        apply(&mut restored_game, decode(&text).unwrap()).unwrap();
        for content in restored_game.state() {
            for dog in &content.dogs {
                assert_eq!(dog.holding_time_ms(), 0);
                assert_eq!(dog.time_in_game_ms(), 0);
            }
        }
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        assert!(decode("not json at all").is_err());
        assert!(decode(r#"{"sessions": 7}"#).is_err());
    }

    #[test]
    fn snapshot_with_unknown_map_fails_to_apply() {
        let (game, players) = fixture_state();
        let text = encode(&game.state(), &players).unwrap();
        // A game without maps cannot host the restored sessions.
        let mut empty_game = Game::default();
        assert!(apply(&mut empty_game, decode(&text).unwrap()).is_err());
    }

    #[test]
    fn write_atomic_replaces_the_target() {
        let dir = std::env::temp_dir().join(format!(
            "loothound-snapshot-{}-{}",
            std::process::id(),
            rand::random::<u32>()
        ));
        fs::create_dir_all(&dir).unwrap();
        let target = dir.join("state.save");

        write_atomic(&target, "first").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "first");
        write_atomic(&target, "second").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "second");

        let _ = fs::remove_dir_all(&dir);
    }
}
