use std::collections::{btree_map, BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::collision::{find_gather_events, ItemGathererProvider};
use crate::constants::{
    DOG_COLLISION_RADIUS, LOOT_COLLISION_RADIUS, OFFICE_COLLISION_RADIUS, TIME_FACTOR,
};
use crate::geom::{Point, PointInt};
use crate::loot_gen::{LootGenerator, LootGeneratorParams};
use crate::world::{Map, MapId, Road};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DogId(pub u64);

impl DogId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LootId(pub u64);

impl LootId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "U")]
    North,
    #[serde(rename = "D")]
    South,
    #[serde(rename = "L")]
    West,
    #[serde(rename = "R")]
    East,
}

impl Direction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "U" => Some(Self::North),
            "D" => Some(Self::South),
            "L" => Some(Self::West),
            "R" => Some(Self::East),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::North => "U",
            Self::South => "D",
            Self::West => "L",
            Self::East => "R",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LootObject {
    id: LootId,
    loot_type: usize,
    worth: u64,
}

impl LootObject {
    pub fn new(id: LootId, loot_type: usize, worth: u64) -> Self {
        Self {
            id,
            loot_type,
            worth,
        }
    }

    pub fn id(&self) -> LootId {
        self.id
    }

    pub fn loot_type(&self) -> usize {
        self.loot_type
    }

    pub fn worth(&self) -> u64 {
        self.worth
    }
}

#[derive(Clone, Debug)]
pub struct Dog {
    id: DogId,
    name: String,
    direction: Direction,
    coords: Point,
    prev_coords: Point,
    speed: Point,
    bag: Vec<LootObject>,
    score: u64,
    holding_time_ms: u64,
    time_in_game_ms: u64,
}

impl Dog {
    pub fn new(id: DogId, name: impl Into<String>, coords: Point) -> Self {
        Self {
            id,
            name: name.into(),
            direction: Direction::North,
            coords,
            prev_coords: coords,
            speed: Point::default(),
            bag: Vec::new(),
            score: 0,
            holding_time_ms: 0,
            time_in_game_ms: 0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: DogId,
        name: String,
        direction: Direction,
        coords: Point,
        prev_coords: Point,
        speed: Point,
        bag: Vec<LootObject>,
        score: u64,
    ) -> Self {
        Self {
            id,
            name,
            direction,
            coords,
            prev_coords,
            speed,
            bag,
            score,
            holding_time_ms: 0,
            time_in_game_ms: 0,
        }
    }

    pub fn id(&self) -> DogId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn coords(&self) -> Point {
        self.coords
    }

    pub fn prev_coords(&self) -> Point {
        self.prev_coords
    }

    pub fn speed(&self) -> Point {
        self.speed
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn bag(&self) -> &[LootObject] {
        &self.bag
    }

    pub fn holding_time_ms(&self) -> u64 {
        self.holding_time_ms
    }

    pub fn time_in_game_ms(&self) -> u64 {
        self.time_in_game_ms
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    // Velocity stays axis-aligned: the scalar speed is projected onto the
    // current direction.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed.x = match self.direction {
            Direction::North | Direction::South => 0.0,
            Direction::East => speed,
            Direction::West => -speed,
        };
        self.speed.y = match self.direction {
            Direction::West | Direction::East => 0.0,
            Direction::South => speed,
            Direction::North => -speed,
        };
    }

    pub fn set_coords(&mut self, move_to: Point) {
        self.prev_coords = self.coords;
        self.coords = move_to;
    }

    pub fn stop(&mut self) {
        self.speed = Point::default();
        self.holding_time_ms = 0;
    }

    pub fn is_stopped(&self) -> bool {
        self.speed.x == 0.0 && self.speed.y == 0.0
    }

    pub fn add_tick(&mut self, tick_ms: u64) {
        self.time_in_game_ms += tick_ms;
        if self.is_stopped() {
            self.holding_time_ms += tick_ms;
        }
    }

    pub fn add_to_bag(&mut self, obj: LootObject) {
        self.bag.push(obj);
    }

    pub fn add_score(&mut self, score: u64) {
        self.score += score;
    }

    pub fn drop_bag(&mut self) {
        self.score += self.bag.iter().map(LootObject::worth).sum::<u64>();
        self.bag.clear();
    }
}

#[derive(Clone, Debug)]
pub struct StateContent {
    pub map_id: MapId,
    pub session_id: SessionId,
    pub dogs: Vec<Dog>,
    pub loot_objects: Vec<(LootObject, Point)>,
    pub dogs_join: u64,
    pub objects_spawned: u64,
}

// Live per-map world state. All mutation happens through on_tick and the
// join/restore entry points; the caller serializes access.
#[derive(Debug)]
pub struct GameSession {
    map: Arc<Map>,
    id: SessionId,
    random_spawn: bool,
    loot_generator: LootGenerator,
    retirement_time_ms: u64,
    dogs_join: u64,
    objects_spawned: u64,
    dogs: BTreeMap<DogId, Dog>,
    loot: BTreeMap<LootId, (LootObject, Point)>,
    road_index: HashMap<(i32, i32), Vec<usize>>,
    rng: StdRng,
}

impl GameSession {
    pub fn new(
        map: Arc<Map>,
        id: SessionId,
        random_spawn: bool,
        loot_params: LootGeneratorParams,
        retirement_time_ms: u64,
        dog_start_id: u64,
        loot_start_id: u64,
    ) -> Self {
        let road_index = build_road_index(&map);
        Self {
            map,
            id,
            random_spawn,
            loot_generator: LootGenerator::new(loot_params),
            retirement_time_ms,
            dogs_join: dog_start_id,
            objects_spawned: loot_start_id,
            dogs: BTreeMap::new(),
            loot: BTreeMap::new(),
            road_index,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn map(&self) -> &Map {
        &self.map
    }

    pub fn is_random_spawn(&self) -> bool {
        self.random_spawn
    }

    pub fn dog(&self, id: DogId) -> Option<&Dog> {
        self.dogs.get(&id)
    }

    pub fn dog_mut(&mut self, id: DogId) -> Option<&mut Dog> {
        self.dogs.get_mut(&id)
    }

    pub fn dogs(&self) -> impl Iterator<Item = &Dog> {
        self.dogs.values()
    }

    pub fn dog_count(&self) -> usize {
        self.dogs.len()
    }

    pub fn loot_objects(&self) -> &BTreeMap<LootId, (LootObject, Point)> {
        &self.loot
    }

    pub fn new_dog(&mut self, name: impl Into<String>) -> DogId {
        let id = DogId(self.dogs_join);
        self.dogs_join += 1;
        let spawn = self.dog_spawn_point();
        self.dogs.insert(id, Dog::new(id, name, spawn));
        id
    }

    pub fn add_dog(&mut self, dog: Dog) -> Result<()> {
        match self.dogs.entry(dog.id()) {
            btree_map::Entry::Occupied(_) => bail!("dog {} already exists", dog.id()),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(dog);
                Ok(())
            }
        }
    }

    pub fn add_loot_object(&mut self, obj: LootObject, coords: Point) -> Result<()> {
        match self.loot.entry(obj.id()) {
            btree_map::Entry::Occupied(_) => bail!("loot object {} already exists", obj.id()),
            btree_map::Entry::Vacant(entry) => {
                entry.insert((obj, coords));
                Ok(())
            }
        }
    }

    pub fn extract_dog(&mut self, id: DogId) -> Option<Dog> {
        self.dogs.remove(&id)
    }

    // Retiring dogs are extracted into `retired` before collision detection
    // runs, so no gatherer is built for them this tick.
    pub fn on_tick(&mut self, delta_ms: u64, retired: &mut Vec<Dog>) {
        let mut to_retire = Vec::new();
        for dog in self.dogs.values_mut() {
            move_dog(&self.map, &self.road_index, dog, delta_ms);
            if dog.is_stopped() && dog.holding_time_ms() >= self.retirement_time_ms {
                to_retire.push(dog.id());
            }
        }
        for dog_id in to_retire {
            if let Some(dog) = self.dogs.remove(&dog_id) {
                retired.push(dog);
            }
        }
        self.handle_collisions();
        self.spawn_loot(delta_ms);
    }

    pub fn state_content(&self) -> StateContent {
        StateContent {
            map_id: self.map.id().clone(),
            session_id: self.id,
            dogs: self.dogs.values().cloned().collect(),
            loot_objects: self.loot.values().cloned().collect(),
            dogs_join: self.dogs_join,
            objects_spawned: self.objects_spawned,
        }
    }

    fn handle_collisions(&mut self) {
        let mut provider = ItemGathererProvider::with_capacity(
            self.dogs.len(),
            self.loot.len() + self.map.offices().len(),
        );

        let mut gatherer_to_dog = Vec::with_capacity(self.dogs.len());
        for dog in self.dogs.values() {
            provider.add_gatherer(dog.prev_coords(), dog.coords(), DOG_COLLISION_RADIUS);
            gatherer_to_dog.push(dog.id());
        }

        let mut item_to_loot = Vec::with_capacity(self.loot.len());
        for (loot_id, (_, coords)) in &self.loot {
            provider.add_item(*coords, LOOT_COLLISION_RADIUS);
            item_to_loot.push(*loot_id);
        }
        for office in self.map.offices() {
            provider.add_item(office.position.into(), OFFICE_COLLISION_RADIUS);
        }

        let bag_capacity = self.map.bag_capacity();
        for event in find_gather_events(&provider) {
            let Some(dog) = self.dogs.get_mut(&gatherer_to_dog[event.gatherer_idx]) else {
                continue;
            };
            if let Some(loot_id) = item_to_loot.get(event.item_idx) {
                // A full bag skips the pickup; a later gatherer may still
                // collect this item.
                if dog.bag().len() >= bag_capacity {
                    continue;
                }
                if let Some((obj, _)) = self.loot.remove(loot_id) {
                    dog.add_to_bag(obj);
                }
            } else {
                dog.drop_bag();
            }
        }
    }

    fn spawn_loot(&mut self, delta_ms: u64) {
        let count = self
            .loot_generator
            .generate(delta_ms, self.loot.len(), self.dogs.len());
        for _ in 0..count {
            self.spawn_loot_object();
        }
    }

    fn spawn_loot_object(&mut self) {
        let map = Arc::clone(&self.map);
        if map.loot_type_count() == 0 {
            return;
        }
        let id = LootId(self.objects_spawned);
        self.objects_spawned += 1;
        let loot_type = self.rng.random_range(0..map.loot_type_count());
        let coords = self.random_point_on_random_road();
        self.loot.insert(
            id,
            (LootObject::new(id, loot_type, map.loot_worth(loot_type)), coords),
        );
    }

    fn dog_spawn_point(&mut self) -> Point {
        if self.random_spawn {
            self.random_point_on_random_road()
        } else {
            self.map
                .roads()
                .first()
                .map(|road| road.start().into())
                .unwrap_or_default()
        }
    }

    fn random_point_on_random_road(&mut self) -> Point {
        let map = Arc::clone(&self.map);
        let roads = map.roads();
        if roads.is_empty() {
            return Point::default();
        }
        let road = &roads[self.rng.random_range(0..roads.len())];
        let rect = road.abs_rect();
        Point::new(
            self.rng.random_range(rect.p1.x..=rect.p2.x),
            self.rng.random_range(rect.p1.y..=rect.p2.y),
        )
    }
}

fn build_road_index(map: &Map) -> HashMap<(i32, i32), Vec<usize>> {
    let mut index: HashMap<(i32, i32), Vec<usize>> = HashMap::new();
    for (road_idx, road) in map.roads().iter().enumerate() {
        let (x0, x1) = road.range_x();
        let (y0, y1) = road.range_y();
        for x in x0..=x1 {
            for y in y0..=y1 {
                index.entry((x, y)).or_default().push(road_idx);
            }
        }
    }
    index
}

fn round_road_coord(coord: f64) -> i32 {
    if coord - coord.floor() < 0.5 {
        coord.floor() as i32
    } else {
        coord.ceil() as i32
    }
}

fn round_road_coords(coords: Point) -> PointInt {
    PointInt {
        x: round_road_coord(coords.x),
        y: round_road_coord(coords.y),
    }
}

// Signed distance from `from` to the far edge of the road's absolute
// rectangle along the axis of `dir`.
fn possible_move_dist(from: Point, road: &Road, dir: Direction) -> f64 {
    match dir {
        Direction::North => road.abs_rect().p1.y - from.y,
        Direction::South => road.abs_rect().p2.y - from.y,
        Direction::West => road.abs_rect().p1.x - from.x,
        Direction::East => road.abs_rect().p2.x - from.x,
    }
}

fn move_dog(map: &Map, road_index: &HashMap<(i32, i32), Vec<usize>>, dog: &mut Dog, delta_ms: u64) {
    dog.add_tick(delta_ms);
    if dog.is_stopped() {
        return;
    }

    let tile = round_road_coords(dog.coords());
    let Some(roads) = road_index.get(&(tile.x, tile.y)) else {
        dog.stop();
        return;
    };

    let direction = dog.direction();
    let mut dp = dog.speed() * (delta_ms as f64 / TIME_FACTOR);

    // A dog at a crossing sits inside several road rectangles; pick the one
    // allowing the longest travel along the motion axis.
    let mut best_dist = 0.0f64;
    for road_idx in roads {
        let dist = possible_move_dist(dog.coords(), &map.roads()[*road_idx], direction);
        if dist.abs() > best_dist.abs() {
            best_dist = dist;
        }
    }

    let border = match direction {
        Direction::West | Direction::East => best_dist.abs() <= dp.x.abs(),
        Direction::North | Direction::South => best_dist.abs() <= dp.y.abs(),
    };
    if border {
        match direction {
            Direction::West | Direction::East => dp.x = best_dist,
            Direction::North | Direction::South => dp.y = best_dist,
        }
        dog.stop();
    }
    dog.set_coords(dog.coords() + dp);
}
