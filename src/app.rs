use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Database;
use crate::game::Game;
use crate::geom::Point;
use crate::logger;
use crate::session::{Direction, DogId, LootId, SessionId};
use crate::snapshot;
use crate::world::{Map, MapId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Two independently seeded generators, each contributing 16 hex characters.
// The pad fill differs per half so short draws stay distinguishable.
#[derive(Debug)]
struct TokenGenerator {
    first: StdRng,
    second: StdRng,
}

impl TokenGenerator {
    fn new() -> Self {
        Self {
            first: StdRng::from_os_rng(),
            second: StdRng::from_os_rng(),
        }
    }

    fn next_token(&mut self) -> Token {
        Token(format!(
            "{:f>16x}{:a>16x}",
            self.first.random::<u64>(),
            self.second.random::<u64>()
        ))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Player {
    pub map_id: MapId,
    pub session_id: SessionId,
    pub dog_id: DogId,
}

type PlayerKey = (DogId, MapId);

#[derive(Debug, Default)]
pub struct Players {
    players: HashMap<PlayerKey, Player>,
}

impl Players {
    pub fn add_player(&mut self, player: Player) -> Result<()> {
        let key = (player.dog_id, player.map_id.clone());
        if self.players.contains_key(&key) {
            bail!("player for dog {} on map {} already exists", key.0, key.1);
        }
        self.players.insert(key, player);
        Ok(())
    }

    pub fn find_by_dog_and_map(&self, dog_id: DogId, map_id: &MapId) -> Option<&Player> {
        self.players.get(&(dog_id, map_id.clone()))
    }

    pub fn erase_player(&mut self, dog_id: DogId, map_id: &MapId) -> Option<Player> {
        self.players.remove(&(dog_id, map_id.clone()))
    }
}

#[derive(Debug)]
pub struct PlayerTokens {
    token_to_player: HashMap<Token, PlayerKey>,
    player_to_token: HashMap<PlayerKey, Token>,
    generator: TokenGenerator,
}

impl Default for PlayerTokens {
    fn default() -> Self {
        Self {
            token_to_player: HashMap::new(),
            player_to_token: HashMap::new(),
            generator: TokenGenerator::new(),
        }
    }
}

impl PlayerTokens {
    pub fn add_player(&mut self, dog_id: DogId, map_id: MapId) -> Token {
        let key = (dog_id, map_id);
        let mut token = self.generator.next_token();
        while self.token_to_player.contains_key(&token) {
            token = self.generator.next_token();
        }
        self.token_to_player.insert(token.clone(), key.clone());
        self.player_to_token.insert(key, token.clone());
        token
    }

    pub fn bind(&mut self, token: Token, dog_id: DogId, map_id: MapId) -> Result<()> {
        if self.token_to_player.contains_key(&token) {
            bail!("token already bound");
        }
        let key = (dog_id, map_id);
        self.token_to_player.insert(token.clone(), key.clone());
        self.player_to_token.insert(key, token);
        Ok(())
    }

    pub fn find_by_token(&self, token: &Token) -> Option<&PlayerKey> {
        self.token_to_player.get(token)
    }

    pub fn erase_player(&mut self, dog_id: DogId, map_id: &MapId) {
        if let Some(token) = self.player_to_token.remove(&(dog_id, map_id.clone())) {
            self.token_to_player.remove(&token);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = (&Token, &PlayerKey)> {
        self.token_to_player.iter()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerTokenState {
    pub token: Token,
    pub map_id: MapId,
    pub session_id: SessionId,
    pub dog_id: DogId,
}

#[derive(Clone, Debug)]
pub struct RetiredPlayer {
    id: Uuid,
    name: String,
    score: u64,
    play_time_ms: u64,
}

impl RetiredPlayer {
    pub fn new(id: Uuid, name: impl Into<String>, score: u64, play_time_ms: u64) -> Self {
        Self {
            id,
            name: name.into(),
            score,
            play_time_ms,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn play_time_ms(&self) -> u64 {
        self.play_time_ms
    }
}

#[derive(Clone, Debug)]
pub struct BagItemView {
    pub id: LootId,
    pub loot_type: usize,
}

#[derive(Clone, Debug)]
pub struct PlayerStateView {
    pub id: DogId,
    pub pos: Point,
    pub speed: Point,
    pub dir: Direction,
    pub bag: Vec<BagItemView>,
    pub score: u64,
}

#[derive(Clone, Debug)]
pub struct LootStateView {
    pub id: LootId,
    pub loot_type: usize,
    pub pos: Point,
}

#[derive(Clone, Debug, Default)]
pub struct GameStateView {
    pub players: Vec<PlayerStateView>,
    pub loot_objects: Vec<LootStateView>,
}

#[derive(Debug)]
pub struct AppOptions {
    // The HTTP tick endpoint only works while the server runs no timer of
    // its own.
    pub manual_tick: bool,
    pub state_file: Option<PathBuf>,
    pub save_period_ms: Option<u64>,
}

#[derive(Debug)]
struct SaveTimer {
    period_ms: u64,
    accumulated_ms: u64,
}

// Use-case facade over the game registry, player registries and the
// persistence port. Callers serialize access; nothing here locks.
#[derive(Debug)]
pub struct Application {
    game: Game,
    players: Players,
    tokens: PlayerTokens,
    db: Database,
    manual_tick: bool,
    state_file: Option<PathBuf>,
    save_timer: Option<SaveTimer>,
}

impl Application {
    pub fn new(game: Game, db: Database, options: AppOptions) -> Self {
        let save_timer = options.save_period_ms.map(|period_ms| SaveTimer {
            period_ms,
            accumulated_ms: 0,
        });
        Self {
            game,
            players: Players::default(),
            tokens: PlayerTokens::default(),
            db,
            manual_tick: options.manual_tick,
            state_file: options.state_file,
            save_timer,
        }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut Game {
        &mut self.game
    }

    pub fn maps(&self) -> &[std::sync::Arc<Map>] {
        self.game.maps()
    }

    pub fn find_map(&self, id: &MapId) -> Option<&std::sync::Arc<Map>> {
        self.game.find_map(id)
    }

    pub fn join_player(&mut self, map_id: &MapId, dog_name: &str) -> Option<(Token, DogId)> {
        let session = self.game.session_by_map_id(map_id)?;
        let dog_id = session.new_dog(dog_name);
        let session_id = session.id();
        // Monotonic dog ids make the registry insert infallible here.
        let _ = self.players.add_player(Player {
            map_id: map_id.clone(),
            session_id,
            dog_id,
        });
        let token = self.tokens.add_player(dog_id, map_id.clone());
        Some((token, dog_id))
    }

    pub fn get_players(&self, token: &Token) -> Option<Vec<(DogId, String)>> {
        let (_, map_id) = self.tokens.find_by_token(token)?;
        let session = self.game.session(map_id)?;
        Some(
            session
                .dogs()
                .map(|dog| (dog.id(), dog.name().to_string()))
                .collect(),
        )
    }

    pub fn game_state(&self, token: &Token) -> Option<GameStateView> {
        let (_, map_id) = self.tokens.find_by_token(token)?;
        let session = self.game.session(map_id)?;
        let players = session
            .dogs()
            .map(|dog| PlayerStateView {
                id: dog.id(),
                pos: dog.coords(),
                speed: dog.speed(),
                dir: dog.direction(),
                bag: dog
                    .bag()
                    .iter()
                    .map(|obj| BagItemView {
                        id: obj.id(),
                        loot_type: obj.loot_type(),
                    })
                    .collect(),
                score: dog.score(),
            })
            .collect();
        let loot_objects = session
            .loot_objects()
            .iter()
            .map(|(id, (obj, pos))| LootStateView {
                id: *id,
                loot_type: obj.loot_type(),
                pos: *pos,
            })
            .collect();
        Some(GameStateView {
            players,
            loot_objects,
        })
    }

    pub fn move_player(&mut self, token: &Token, direction: Direction) -> bool {
        let Some((dog_id, map_id)) = self.tokens.find_by_token(token).cloned() else {
            return false;
        };
        let Some(session) = self.game.session_by_map_id(&map_id) else {
            return false;
        };
        let speed = session.map().dog_speed();
        let Some(dog) = session.dog_mut(dog_id) else {
            return false;
        };
        dog.set_direction(direction);
        dog.set_speed(speed);
        true
    }

    pub fn stop_player(&mut self, token: &Token) -> bool {
        let Some((dog_id, map_id)) = self.tokens.find_by_token(token).cloned() else {
            return false;
        };
        let Some(session) = self.game.session_by_map_id(&map_id) else {
            return false;
        };
        let Some(dog) = session.dog_mut(dog_id) else {
            return false;
        };
        dog.stop();
        true
    }

    pub async fn time_tick(&mut self, delta_ms: u64) -> Result<bool> {
        if !self.manual_tick {
            return Ok(false);
        }
        self.tick(delta_ms).await?;
        Ok(true)
    }

    pub async fn tick(&mut self, delta_ms: u64) -> Result<()> {
        let retired = self.game.on_tick(delta_ms);

        let mut rows = Vec::with_capacity(retired.len());
        for (map_id, dog) in retired {
            self.players.erase_player(dog.id(), &map_id);
            self.tokens.erase_player(dog.id(), &map_id);
            rows.push(RetiredPlayer::new(
                Uuid::new_v4(),
                dog.name(),
                dog.score(),
                dog.time_in_game_ms(),
            ));
        }
        for row in rows {
            self.persist_retired(&row).await?;
        }

        let snapshot_due = match &mut self.save_timer {
            Some(timer) => {
                timer.accumulated_ms += delta_ms;
                if timer.accumulated_ms >= timer.period_ms {
                    timer.accumulated_ms -= timer.period_ms;
                    true
                } else {
                    false
                }
            }
            None => false,
        };
        if snapshot_due {
            // A failed write is retried on the next interval.
            if let Err(error) = self.save_state() {
                logger::error("snapshot", &error.to_string());
            }
        }
        Ok(())
    }

    pub async fn retire_dog(&mut self, dog_id: DogId, map_id: &MapId) -> Result<()> {
        // Double retirement is a no-op.
        if self.players.find_by_dog_and_map(dog_id, map_id).is_none() {
            return Ok(());
        }
        let Some(session) = self.game.session_by_map_id(map_id) else {
            return Ok(());
        };
        let Some(dog) = session.extract_dog(dog_id) else {
            return Ok(());
        };
        let row = RetiredPlayer::new(Uuid::new_v4(), dog.name(), dog.score(), dog.time_in_game_ms());
        self.persist_retired(&row).await?;
        self.players.erase_player(dog_id, map_id);
        self.tokens.erase_player(dog_id, map_id);
        Ok(())
    }

    pub async fn records(&self, offset: i64, limit: i64) -> Result<Vec<RetiredPlayer>> {
        let mut unit = self.db.unit_of_work().await?;
        let players = unit
            .player_repository()
            .saved_retired_players(offset, limit)
            .await?;
        Ok(players)
    }

    pub fn players_state(&self) -> Vec<PlayerTokenState> {
        self.tokens
            .keys()
            .filter_map(|(token, (dog_id, map_id))| {
                let player = self.players.find_by_dog_and_map(*dog_id, map_id)?;
                Some(PlayerTokenState {
                    token: token.clone(),
                    map_id: map_id.clone(),
                    session_id: player.session_id,
                    dog_id: *dog_id,
                })
            })
            .collect()
    }

    // Snapshot restore: the session must already exist with a matching id
    // and own the dog being bound.
    pub fn add_player(
        &mut self,
        token: Token,
        map_id: &MapId,
        session_id: SessionId,
        dog_id: DogId,
    ) -> Result<()> {
        let session = self
            .game
            .session(map_id)
            .with_context(|| format!("game session for map {map_id} not found"))?;
        if session.id() != session_id {
            bail!("game session id mismatch for map {map_id}");
        }
        if session.dog(dog_id).is_none() {
            bail!("dog {dog_id} not found on map {map_id}");
        }
        self.players.add_player(Player {
            map_id: map_id.clone(),
            session_id,
            dog_id,
        })?;
        self.tokens.bind(token, dog_id, map_id.clone())?;
        Ok(())
    }

    pub fn save_state(&self) -> Result<()> {
        if let Some(path) = &self.state_file {
            snapshot::save(self, path)?;
        }
        Ok(())
    }

    pub fn restore_state(&mut self) -> Result<()> {
        if let Some(path) = self.state_file.clone() {
            snapshot::restore(self, &path)?;
        }
        Ok(())
    }

    async fn persist_retired(&self, row: &RetiredPlayer) -> Result<()> {
        let mut unit = self.db.unit_of_work().await?;
        unit.player_repository().save(row).await?;
        unit.commit().await?;
        Ok(())
    }
}
