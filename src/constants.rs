pub const TIME_FACTOR: f64 = 1000.0;

pub const ROAD_SIDE: f64 = 0.4;
pub const DOG_WIDTH: f64 = 0.6;
pub const OFFICE_WIDTH: f64 = 0.5;
pub const LOOT_WIDTH: f64 = 0.0;

pub const DOG_COLLISION_RADIUS: f64 = DOG_WIDTH / 2.0;
pub const OFFICE_COLLISION_RADIUS: f64 = OFFICE_WIDTH / 2.0;
pub const LOOT_COLLISION_RADIUS: f64 = LOOT_WIDTH / 2.0;

pub const DEFAULT_DOG_SPEED: f64 = 1.0;
pub const DEFAULT_BAG_CAPACITY: usize = 3;
pub const DEFAULT_RETIREMENT_TIME_S: f64 = 60.0;

pub const SERVER_ADDRESS: &str = "0.0.0.0";
pub const SERVER_PORT: u16 = 8080;
pub const HTTP_TIMEOUT_S: u64 = 120;

pub const MAX_RECORD_ITEMS: i64 = 100;
