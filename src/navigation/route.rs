//! Heuristic route generation.
//!
//! Produces the fixed six-step shape between two positions: the total
//! geodesic distance split into thirds for the distance-bearing steps, with
//! zero-distance turn and crossing steps between them. This is a placeholder
//! shape, not road-graph routing.

use crate::geo;
use crate::location::Position;
use rand::Rng;

/// Left/right choice for turn steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDirection {
    Left,
    Right,
}

impl TurnDirection {
    pub fn label(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl std::fmt::Display for TurnDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

fn random_turn<R: Rng>(rng: &mut R) -> TurnDirection {
    if rng.gen_bool(0.5) {
        TurnDirection::Left
    } else {
        TurnDirection::Right
    }
}

/// One instruction unit in a generated route.
#[derive(Debug, Clone)]
pub struct RouteStep {
    pub id: u32,
    /// Spoken instruction text.
    pub instruction: String,
    /// Distance covered by this step, in meters.
    pub distance_m: u32,
    /// Direction label: a compass point, "left"/"right", "straight", or
    /// "across".
    pub direction: String,
    /// Mutated in place as the session progresses.
    pub completed: bool,
}

fn step(id: u32, instruction: String, distance_m: u32, direction: &str) -> RouteStep {
    RouteStep {
        id,
        instruction,
        distance_m,
        direction: direction.to_owned(),
        completed: false,
    }
}

/// Generate the six-step route from `start` to `destination`.
///
/// Turn directions are chosen pseudo-randomly; the final step references
/// the first turn's direction. The shape is fixed regardless of distance.
pub fn generate_route<R: Rng>(
    start: &Position,
    destination: &Position,
    rng: &mut R,
) -> Vec<RouteStep> {
    let total = geo::distance_meters(start, destination);
    let third = (total / 3.0).round() as u32;
    let compass = geo::bearing_to_compass(geo::bearing_degrees(start, destination));
    let first_turn = random_turn(rng);
    let second_turn = random_turn(rng);

    vec![
        step(
            0,
            format!("Head {compass} for about {third} meters"),
            third,
            compass.label(),
        ),
        step(
            1,
            format!("Turn {first_turn} at the next intersection"),
            0,
            first_turn.label(),
        ),
        step(
            2,
            format!("Continue straight for about {third} meters"),
            third,
            "straight",
        ),
        step(3, "Cross the street when it is safe".to_owned(), 0, "across"),
        step(4, format!("Turn {second_turn}"), 0, second_turn.label()),
        step(
            5,
            format!("Your destination will be ahead on the {first_turn}"),
            third,
            first_turn.label(),
        ),
    ]
}
