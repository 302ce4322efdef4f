use std::collections::HashMap;
use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::constants::ROAD_SIDE;
use crate::geom::{Point, PointInt, Rect};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapId(String);

impl MapId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfficeId(String);

impl OfficeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// A road is an axis-aligned segment of integer tiles. Its absolute rectangle
// widens the tile span by ROAD_SIDE on every side; dogs may occupy any point
// of that rectangle.
#[derive(Clone, Debug)]
pub struct Road {
    start: PointInt,
    end: PointInt,
    range_x: (i32, i32),
    range_y: (i32, i32),
    abs_rect: Rect,
}

impl Road {
    pub fn horizontal(start: PointInt, end_x: i32) -> Self {
        Self::build(
            start,
            PointInt {
                x: end_x,
                y: start.y,
            },
        )
    }

    pub fn vertical(start: PointInt, end_y: i32) -> Self {
        Self::build(
            start,
            PointInt {
                x: start.x,
                y: end_y,
            },
        )
    }

    fn build(start: PointInt, end: PointInt) -> Self {
        let range_x = (start.x.min(end.x), start.x.max(end.x));
        let range_y = (start.y.min(end.y), start.y.max(end.y));
        let abs_rect = Rect {
            p1: Point::new(range_x.0 as f64 - ROAD_SIDE, range_y.0 as f64 - ROAD_SIDE),
            p2: Point::new(range_x.1 as f64 + ROAD_SIDE, range_y.1 as f64 + ROAD_SIDE),
        };
        Self {
            start,
            end,
            range_x,
            range_y,
            abs_rect,
        }
    }

    pub fn is_horizontal(&self) -> bool {
        self.start.y == self.end.y
    }

    pub fn is_vertical(&self) -> bool {
        self.start.x == self.end.x
    }

    pub fn start(&self) -> PointInt {
        self.start
    }

    pub fn end(&self) -> PointInt {
        self.end
    }

    pub fn range_x(&self) -> (i32, i32) {
        self.range_x
    }

    pub fn range_y(&self) -> (i32, i32) {
        self.range_y
    }

    pub fn abs_rect(&self) -> &Rect {
        &self.abs_rect
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

#[derive(Clone, Copy, Debug)]
pub struct Rectangle {
    pub position: PointInt,
    pub size: Size,
}

#[derive(Clone, Debug)]
pub struct Building {
    pub bounds: Rectangle,
}

#[derive(Clone, Copy, Debug)]
pub struct Offset {
    pub dx: i32,
    pub dy: i32,
}

#[derive(Clone, Debug)]
pub struct Office {
    pub id: OfficeId,
    pub position: PointInt,
    pub offset: Offset,
}

#[derive(Debug)]
pub struct Map {
    id: MapId,
    name: String,
    roads: Vec<Road>,
    buildings: Vec<Building>,
    offices: Vec<Office>,
    office_index: HashMap<OfficeId, usize>,
    dog_speed: f64,
    bag_capacity: usize,
    loot_worths: Vec<u64>,
}

impl Map {
    pub fn new(id: MapId, name: impl Into<String>, dog_speed: f64, bag_capacity: usize) -> Self {
        Self {
            id,
            name: name.into(),
            roads: Vec::new(),
            buildings: Vec::new(),
            offices: Vec::new(),
            office_index: HashMap::new(),
            dog_speed,
            bag_capacity,
            loot_worths: Vec::new(),
        }
    }

    pub fn id(&self) -> &MapId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roads(&self) -> &[Road] {
        &self.roads
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn offices(&self) -> &[Office] {
        &self.offices
    }

    pub fn dog_speed(&self) -> f64 {
        self.dog_speed
    }

    pub fn bag_capacity(&self) -> usize {
        self.bag_capacity
    }

    pub fn loot_type_count(&self) -> usize {
        self.loot_worths.len()
    }

    pub fn loot_worth(&self, loot_type: usize) -> u64 {
        self.loot_worths.get(loot_type).copied().unwrap_or_default()
    }

    pub fn add_road(&mut self, road: Road) {
        self.roads.push(road);
    }

    pub fn add_building(&mut self, building: Building) {
        self.buildings.push(building);
    }

    pub fn add_office(&mut self, office: Office) -> Result<()> {
        if self.office_index.contains_key(&office.id) {
            bail!("duplicate office {} on map {}", office.id.as_str(), self.id);
        }
        self.office_index
            .insert(office.id.clone(), self.offices.len());
        self.offices.push(office);
        Ok(())
    }

    pub fn add_loot_worth(&mut self, worth: u64) {
        self.loot_worths.push(worth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn road_ranges_are_normalized() {
        let road = Road::horizontal(PointInt { x: 10, y: 2 }, 0);
        assert!(road.is_horizontal());
        assert_eq!(road.range_x(), (0, 10));
        assert_eq!(road.range_y(), (2, 2));
    }

    #[test]
    fn road_abs_rect_extends_by_road_side() {
        let road = Road::horizontal(PointInt { x: 0, y: 0 }, 10);
        let rect = road.abs_rect();
        assert_eq!(rect.p1, Point::new(-0.4, -0.4));
        assert_eq!(rect.p2, Point::new(10.4, 0.4));

        let road = Road::vertical(PointInt { x: 3, y: 5 }, 1);
        let rect = road.abs_rect();
        assert_eq!(rect.p1, Point::new(2.6, 0.6));
        assert_eq!(rect.p2, Point::new(3.4, 5.4));
    }

    #[test]
    fn duplicate_office_is_rejected() {
        let mut map = Map::new(MapId::new("m1"), "Town", 4.0, 3);
        let office = Office {
            id: OfficeId::new("o1"),
            position: PointInt { x: 1, y: 1 },
            offset: Offset { dx: 5, dy: 0 },
        };
        assert!(map.add_office(office.clone()).is_ok());
        assert!(map.add_office(office).is_err());
    }

    #[test]
    fn loot_worth_lookup() {
        let mut map = Map::new(MapId::new("m1"), "Town", 4.0, 3);
        map.add_loot_worth(10);
        map.add_loot_worth(30);
        assert_eq!(map.loot_type_count(), 2);
        assert_eq!(map.loot_worth(1), 30);
        assert_eq!(map.loot_worth(7), 0);
    }
}
