use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use serde_json::Value;

use crate::constants::{DEFAULT_BAG_CAPACITY, DEFAULT_DOG_SPEED, DEFAULT_RETIREMENT_TIME_S};
use crate::game::Game;
use crate::geom::PointInt;
use crate::loot_gen::LootGeneratorParams;
use crate::world::{Building, Map, MapId, Office, OfficeId, Offset, Rectangle, Road, Size};

#[derive(Parser, Debug)]
#[command(author, version, about = "Authoritative dog-and-loot game server")]
pub struct Args {
    #[arg(short = 'c', long, value_name = "file", help = "set config file path")]
    pub config_file: PathBuf,

    #[arg(short = 'w', long, value_name = "dir", help = "set static files root")]
    pub www_root: PathBuf,

    #[arg(short = 't', long, value_name = "milliseconds", help = "set tick period")]
    pub tick_period: Option<u64>,

    #[arg(short = 'r', long, help = "spawn dogs at random positions")]
    pub randomize_spawn_points: bool,

    #[arg(short = 's', long, value_name = "file", help = "set game state file path")]
    pub state_file: Option<PathBuf>,

    #[arg(
        short = 'p',
        long,
        value_name = "milliseconds",
        requires = "state_file",
        help = "set game state save period"
    )]
    pub save_state_period: Option<u64>,
}

// Raw lootTypes entries are kept verbatim for the map detail endpoint; the
// model only stores each type's worth.
#[derive(Debug, Default)]
pub struct ExtraData {
    pub loot_types: HashMap<MapId, Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(rename = "defaultDogSpeed")]
    default_dog_speed: Option<f64>,
    #[serde(rename = "defaultBagCapacity")]
    default_bag_capacity: Option<usize>,
    #[serde(rename = "dogRetirementTime")]
    dog_retirement_time: Option<f64>,
    #[serde(rename = "lootGeneratorConfig")]
    loot_generator_config: LootGeneratorConfig,
    maps: Vec<MapConfig>,
}

#[derive(Debug, Deserialize)]
struct LootGeneratorConfig {
    period: f64,
    probability: f64,
}

#[derive(Debug, Deserialize)]
struct MapConfig {
    id: String,
    name: String,
    #[serde(rename = "dogSpeed")]
    dog_speed: Option<f64>,
    #[serde(rename = "bagCapacity")]
    bag_capacity: Option<usize>,
    #[serde(rename = "lootTypes")]
    loot_types: Vec<Value>,
    roads: Vec<RoadConfig>,
    #[serde(default)]
    buildings: Vec<BuildingConfig>,
    #[serde(default)]
    offices: Vec<OfficeConfig>,
}

#[derive(Debug, Deserialize)]
struct RoadConfig {
    x0: i32,
    y0: i32,
    x1: Option<i32>,
    y1: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct BuildingConfig {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
}

#[derive(Debug, Deserialize)]
struct OfficeConfig {
    id: String,
    x: i32,
    y: i32,
    #[serde(rename = "offsetX")]
    offset_x: i32,
    #[serde(rename = "offsetY")]
    offset_y: i32,
}

pub fn load_game(path: &Path) -> Result<(Game, ExtraData)> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_game(&text).with_context(|| format!("invalid config file {}", path.display()))
}

pub fn parse_game(text: &str) -> Result<(Game, ExtraData)> {
    let config: ConfigFile = serde_json::from_str(text)?;

    let default_dog_speed = config.default_dog_speed.unwrap_or(DEFAULT_DOG_SPEED);
    let default_bag_capacity = config.default_bag_capacity.unwrap_or(DEFAULT_BAG_CAPACITY);
    let retirement_time_s = config
        .dog_retirement_time
        .unwrap_or(DEFAULT_RETIREMENT_TIME_S);

    let mut game = Game::default();
    game.set_dog_retirement_time((retirement_time_s * 1000.0) as u64);
    game.set_loot_generator_params(LootGeneratorParams {
        period_ms: (config.loot_generator_config.period * 1000.0) as u64,
        probability: config.loot_generator_config.probability,
    });

    let mut extra = ExtraData::default();
    for map_config in config.maps {
        let map_id = MapId::new(map_config.id);
        let mut map = Map::new(
            map_id.clone(),
            map_config.name,
            map_config.dog_speed.unwrap_or(default_dog_speed),
            map_config.bag_capacity.unwrap_or(default_bag_capacity),
        );

        for loot_type in &map_config.loot_types {
            let worth = loot_type
                .get("value")
                .and_then(Value::as_u64)
                .with_context(|| format!("map {map_id}: loot type without integer value"))?;
            map.add_loot_worth(worth);
        }
        extra.loot_types.insert(map_id.clone(), map_config.loot_types);

        for road in map_config.roads {
            map.add_road(build_road(&map_id, road)?);
        }
        for building in map_config.buildings {
            map.add_building(Building {
                bounds: Rectangle {
                    position: PointInt {
                        x: building.x,
                        y: building.y,
                    },
                    size: Size {
                        width: building.w,
                        height: building.h,
                    },
                },
            });
        }
        for office in map_config.offices {
            map.add_office(Office {
                id: OfficeId::new(office.id),
                position: PointInt {
                    x: office.x,
                    y: office.y,
                },
                offset: Offset {
                    dx: office.offset_x,
                    dy: office.offset_y,
                },
            })?;
        }

        game.add_map(map)?;
    }

    Ok((game, extra))
}

fn build_road(map_id: &MapId, road: RoadConfig) -> Result<Road> {
    let start = PointInt {
        x: road.x0,
        y: road.y0,
    };
    match (road.x1, road.y1) {
        (Some(end_x), None) => Ok(Road::horizontal(start, end_x)),
        (None, Some(end_y)) => Ok(Road::vertical(start, end_y)),
        _ => bail!("map {map_id}: invalid road (exactly one of x1/y1 expected)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "defaultDogSpeed": 2.5,
        "dogRetirementTime": 15.5,
        "lootGeneratorConfig": { "period": 5.0, "probability": 0.5 },
        "maps": [
            {
                "id": "map1",
                "name": "Map 1",
                "dogSpeed": 4.0,
                "bagCapacity": 5,
                "lootTypes": [
                    { "name": "key", "value": 10, "file": "key.obj" },
                    { "name": "wallet", "value": 30 }
                ],
                "roads": [
                    { "x0": 0, "y0": 0, "x1": 40 },
                    { "x0": 40, "y0": 0, "y1": 30 }
                ],
                "buildings": [ { "x": 5, "y": 5, "w": 30, "h": 20 } ],
                "offices": [ { "id": "o0", "x": 40, "y": 30, "offsetX": 5, "offsetY": 0 } ]
            },
            {
                "id": "map2",
                "name": "Map 2",
                "lootTypes": [ { "value": 1 } ],
                "roads": [ { "x0": 0, "y0": 0, "y1": 10 } ],
                "buildings": [],
                "offices": []
            }
        ]
    }"#;

    #[test]
    fn parses_maps_with_overrides_and_defaults() {
        let (game, extra) = parse_game(SAMPLE).unwrap();
        assert_eq!(game.maps().len(), 2);

        let map1 = game.find_map(&MapId::new("map1")).unwrap();
        assert_eq!(map1.name(), "Map 1");
        assert_eq!(map1.dog_speed(), 4.0);
        assert_eq!(map1.bag_capacity(), 5);
        assert_eq!(map1.loot_type_count(), 2);
        assert_eq!(map1.loot_worth(1), 30);
        assert_eq!(map1.roads().len(), 2);
        assert!(map1.roads()[0].is_horizontal());
        assert!(map1.roads()[1].is_vertical());
        assert_eq!(map1.buildings().len(), 1);
        assert_eq!(map1.offices().len(), 1);

        let map2 = game.find_map(&MapId::new("map2")).unwrap();
        assert_eq!(map2.dog_speed(), 2.5);
        assert_eq!(map2.bag_capacity(), DEFAULT_BAG_CAPACITY);

        // Raw loot type objects are preserved for the map detail endpoint.
        let raw = extra.loot_types.get(&MapId::new("map1")).unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0]["file"], "key.obj");
    }

    #[test]
    fn road_with_both_or_neither_endpoints_is_rejected() {
        let bad = r#"{
            "lootGeneratorConfig": { "period": 5.0, "probability": 0.5 },
            "maps": [ {
                "id": "m", "name": "m",
                "lootTypes": [ { "value": 1 } ],
                "roads": [ { "x0": 0, "y0": 0, "x1": 5, "y1": 5 } ],
                "buildings": [], "offices": []
            } ]
        }"#;
        assert!(parse_game(bad).is_err());

        let bad = bad.replace(r#""x1": 5, "y1": 5"#, r#""x0": 0"#);
        assert!(parse_game(&bad).is_err());
    }

    #[test]
    fn loot_type_without_value_is_rejected() {
        let bad = r#"{
            "lootGeneratorConfig": { "period": 5.0, "probability": 0.5 },
            "maps": [ {
                "id": "m", "name": "m",
                "lootTypes": [ { "name": "key" } ],
                "roads": [ { "x0": 0, "y0": 0, "x1": 5 } ],
                "buildings": [], "offices": []
            } ]
        }"#;
        assert!(parse_game(bad).is_err());
    }

    #[test]
    fn missing_loot_generator_config_is_rejected() {
        let bad = r#"{ "maps": [] }"#;
        assert!(parse_game(bad).is_err());
    }
}
