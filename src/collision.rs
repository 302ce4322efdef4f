use std::cmp::Ordering;

use crate::geom::Point;

#[derive(Clone, Copy, Debug)]
pub struct Gatherer {
    pub start: Point,
    pub end: Point,
    pub radius: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct Item {
    pub position: Point,
    pub radius: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct GatheringEvent {
    pub item_idx: usize,
    pub gatherer_idx: usize,
    pub sq_distance: f64,
    pub time: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct CollectionResult {
    pub sq_distance: f64,
    pub proj_ratio: f64,
}

impl CollectionResult {
    pub fn is_collected(&self, collect_radius: f64) -> bool {
        self.proj_ratio >= 0.0
            && self.proj_ratio <= 1.0
            && self.sq_distance <= collect_radius * collect_radius
    }
}

// Projects item position c onto the segment a->b. proj_ratio is the position
// along the segment, sq_distance the squared perpendicular offset.
pub fn try_collect_point(a: Point, b: Point, c: Point) -> CollectionResult {
    let u_x = c.x - a.x;
    let u_y = c.y - a.y;
    let v_x = b.x - a.x;
    let v_y = b.y - a.y;
    let u_dot_v = u_x * v_x + u_y * v_y;
    let u_len2 = u_x * u_x + u_y * u_y;
    let v_len2 = v_x * v_x + v_y * v_y;

    CollectionResult {
        sq_distance: u_len2 - (u_dot_v * u_dot_v) / v_len2,
        proj_ratio: u_dot_v / v_len2,
    }
}

#[derive(Debug, Default)]
pub struct ItemGathererProvider {
    items: Vec<Item>,
    gatherers: Vec<Gatherer>,
}

impl ItemGathererProvider {
    pub fn with_capacity(gatherers: usize, items: usize) -> Self {
        Self {
            items: Vec::with_capacity(items),
            gatherers: Vec::with_capacity(gatherers),
        }
    }

    pub fn add_gatherer(&mut self, start: Point, end: Point, radius: f64) -> usize {
        self.gatherers.push(Gatherer { start, end, radius });
        self.gatherers.len() - 1
    }

    pub fn add_item(&mut self, position: Point, radius: f64) -> usize {
        self.items.push(Item { position, radius });
        self.items.len() - 1
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn gatherers(&self) -> &[Gatherer] {
        &self.gatherers
    }
}

// Events are sorted by time only; the sort is stable, so events at equal time
// keep insertion order. Zero-length gatherers emit nothing.
pub fn find_gather_events(provider: &ItemGathererProvider) -> Vec<GatheringEvent> {
    let mut detected = Vec::new();

    for (gatherer_idx, gatherer) in provider.gatherers().iter().enumerate() {
        if gatherer.start == gatherer.end {
            continue;
        }
        for (item_idx, item) in provider.items().iter().enumerate() {
            let result = try_collect_point(gatherer.start, gatherer.end, item.position);
            if result.is_collected(gatherer.radius + item.radius) {
                detected.push(GatheringEvent {
                    item_idx,
                    gatherer_idx,
                    sq_distance: result.sq_distance,
                    time: result.proj_ratio,
                });
            }
        }
    }

    detected.sort_by(|lhs, rhs| lhs.time.partial_cmp(&rhs.time).unwrap_or(Ordering::Equal));
    detected
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOG_WIDTH: f64 = 0.6;
    const ITEM_WIDTH: f64 = 0.1;
    const EPSILON: f64 = 1e-10;

    fn event_eq(lhs: &GatheringEvent, rhs: &GatheringEvent) -> bool {
        lhs.item_idx == rhs.item_idx
            && lhs.gatherer_idx == rhs.gatherer_idx
            && (lhs.sq_distance - rhs.sq_distance).abs() <= EPSILON
            && (lhs.time - rhs.time).abs() <= EPSILON
    }

    fn assert_events(actual: &[GatheringEvent], expected: &[GatheringEvent]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!(
                event_eq(a, e),
                "expected ({},{},{},{}), got ({},{},{},{})",
                e.item_idx,
                e.gatherer_idx,
                e.sq_distance,
                e.time,
                a.item_idx,
                a.gatherer_idx,
                a.sq_distance,
                a.time
            );
        }
    }

    fn event(item_idx: usize, gatherer_idx: usize, sq_distance: f64, time: f64) -> GatheringEvent {
        GatheringEvent {
            item_idx,
            gatherer_idx,
            sq_distance,
            time,
        }
    }

    #[test]
    fn no_items_no_events() {
        let mut provider = ItemGathererProvider::default();
        provider.add_gatherer(Point::default(), Point::new(0.0, 2.0), DOG_WIDTH);
        provider.add_gatherer(Point::new(0.0, 1.0), Point::new(0.0, 2.0), DOG_WIDTH);
        provider.add_gatherer(Point::default(), Point::new(5.0, 0.0), DOG_WIDTH);
        assert!(find_gather_events(&provider).is_empty());
    }

    #[test]
    fn no_gatherers_no_events() {
        let mut provider = ItemGathererProvider::default();
        provider.add_item(Point::default(), ITEM_WIDTH);
        provider.add_item(Point::new(0.0, 1.0), ITEM_WIDTH);
        provider.add_item(Point::new(5.0, 0.0), ITEM_WIDTH);
        assert!(find_gather_events(&provider).is_empty());
    }

    #[test]
    fn zero_length_gatherer_emits_nothing() {
        let mut provider = ItemGathererProvider::default();
        provider.add_gatherer(Point::new(1.0, 1.0), Point::new(1.0, 1.0), DOG_WIDTH);
        provider.add_item(Point::new(1.0, 1.0), ITEM_WIDTH);
        assert!(find_gather_events(&provider).is_empty());
    }

    #[test]
    fn single_gatherer_collects_single_item() {
        let mut provider = ItemGathererProvider::default();
        provider.add_gatherer(Point::default(), Point::new(0.0, 2.0), DOG_WIDTH);
        provider.add_item(Point::new(0.2, 1.0), ITEM_WIDTH);
        let events = find_gather_events(&provider);
        assert_events(&events, &[event(0, 0, 0.2 * 0.2, 0.5)]);
    }

    #[test]
    fn single_gatherer_collects_one_of_many_items() {
        let mut provider = ItemGathererProvider::default();
        provider.add_gatherer(Point::default(), Point::new(0.0, 2.0), DOG_WIDTH);
        provider.add_item(Point::new(5.0, 1.0), ITEM_WIDTH);
        provider.add_item(Point::new(0.0, 3.0), ITEM_WIDTH);
        provider.add_item(Point::new(0.2, 1.0), 1.0);
        let events = find_gather_events(&provider);
        assert_events(&events, &[event(2, 0, 0.2 * 0.2, 0.5)]);
    }

    #[test]
    fn collection_depends_on_radius_sum() {
        let mut provider = ItemGathererProvider::default();
        provider.add_gatherer(Point::default(), Point::new(0.0, 2.0), DOG_WIDTH);
        provider.add_item(Point::new(0.65, 1.0), ITEM_WIDTH);
        let events = find_gather_events(&provider);
        assert_events(&events, &[event(0, 0, 0.65 * 0.65, 0.5)]);

        let mut provider = ItemGathererProvider::default();
        provider.add_gatherer(Point::default(), Point::new(0.0, 2.0), DOG_WIDTH);
        provider.add_item(Point::new(0.65, 1.0), 0.0);
        assert!(find_gather_events(&provider).is_empty());
    }

    #[test]
    fn items_in_a_row_are_collected_in_time_order() {
        let mut provider = ItemGathererProvider::default();
        provider.add_gatherer(Point::default(), Point::new(0.0, 5.0), DOG_WIDTH);
        provider.add_item(Point::new(0.0, -1.0), ITEM_WIDTH);
        provider.add_item(Point::new(0.0, 3.0), ITEM_WIDTH);
        provider.add_item(Point::new(0.1, 2.0), ITEM_WIDTH);
        provider.add_item(Point::new(-0.2, 1.0), ITEM_WIDTH);
        let events = find_gather_events(&provider);
        assert_events(
            &events,
            &[
                event(3, 0, 0.2 * 0.2, 1.0 / 5.0),
                event(2, 0, 0.1 * 0.1, 2.0 / 5.0),
                event(1, 0, 0.0, 3.0 / 5.0),
            ],
        );
    }

    #[test]
    fn two_gatherers_collect_one_item_crossing() {
        let mut provider = ItemGathererProvider::default();
        provider.add_gatherer(Point::new(2.0, 4.0), Point::new(10.0, 4.0), DOG_WIDTH);
        provider.add_gatherer(Point::new(8.0, 6.0), Point::new(8.0, 2.0), DOG_WIDTH);
        provider.add_item(Point::new(8.5, 3.5), ITEM_WIDTH);
        let events = find_gather_events(&provider);
        assert_events(
            &events,
            &[
                event(0, 1, 0.5 * 0.5, (3.5 - 6.0) / (2.0 - 6.0)),
                event(0, 0, 0.5 * 0.5, (8.5 - 2.0) / (10.0 - 2.0)),
            ],
        );
    }

    #[test]
    fn diagonal_gatherer_collects_item() {
        let mut provider = ItemGathererProvider::default();
        provider.add_gatherer(Point::new(1.0, 1.0), Point::new(5.0, 5.0), DOG_WIDTH);
        provider.add_item(Point::new(3.0, 3.0), ITEM_WIDTH);
        let events = find_gather_events(&provider);
        assert_events(&events, &[event(0, 0, 0.0, 0.5)]);
    }

    #[test]
    fn two_gatherers_collect_four_items_in_global_time_order() {
        let mut provider = ItemGathererProvider::default();
        provider.add_gatherer(Point::new(0.0, 0.0), Point::new(0.0, 10.0), DOG_WIDTH);
        provider.add_gatherer(Point::new(-0.1, 20.0), Point::new(-0.1, 0.1), DOG_WIDTH);
        provider.add_item(Point::new(-0.2, 1.0), ITEM_WIDTH);
        provider.add_item(Point::new(0.2, 2.0), ITEM_WIDTH);
        provider.add_item(Point::new(-0.61, 3.0), ITEM_WIDTH);
        provider.add_item(Point::new(0.5, 19.0), ITEM_WIDTH);
        let events = find_gather_events(&provider);
        assert_events(
            &events,
            &[
                event(3, 1, 0.6 * 0.6, (20.0 - 19.0) / (20.0 - 0.1)),
                event(0, 0, 0.2 * 0.2, 1.0 / 10.0),
                event(1, 0, 0.2 * 0.2, 2.0 / 10.0),
                event(2, 0, 0.61 * 0.61, 3.0 / 10.0),
                event(2, 1, 0.51 * 0.51, (20.0 - 3.0) / (20.0 - 0.1)),
                event(1, 1, 0.3 * 0.3, (20.0 - 2.0) / (20.0 - 0.1)),
                event(0, 1, 0.1 * 0.1, (20.0 - 1.0) / (20.0 - 0.1)),
            ],
        );
    }
}
