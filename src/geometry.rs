//! Area Predicates
//!
//! Position conditions used by objectives and scripts, written as a single
//! line of text:
//!
//! - `world 0 0 0 > 10 10 10`: axis-aligned box, corners inclusive
//! - `world 0 0 0 ~ 10`: sphere around a center
//! - `world 0 0 0 & 1 1 1`: set of block positions
//!
//! The world token is omitted for box and sphere areas parsed as world-agnostic.
//! Point clauses carry their own optional world. Parsing never fails: malformed
//! text becomes [`Area::Unrecognized`], which rejects every position.

use thiserror::Error;
use tracing::warn;

/// A position in a named world
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// Block coordinates containing this position
    pub fn block(&self) -> (i64, i64, i64) {
        (
            self.x.floor() as i64,
            self.y.floor() as i64,
            self.z.floor() as i64,
        )
    }

    fn coords(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// A single block clause of a point set
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPoint {
    /// `None` matches any world
    pub world: Option<String>,
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

#[derive(Debug, Error)]
enum AreaError {
    #[error("expected {expected} tokens, found {found}")]
    TokenCount { expected: usize, found: usize },

    #[error("expected '{0}' separator")]
    Separator(&'static str),

    #[error("'{0}' is not a number")]
    Number(String),

    #[error("clause '{0}' is neither 'x y z' nor 'world x y z'")]
    Clause(String),
}

/// A parsed position condition
#[derive(Debug, Clone, PartialEq)]
pub enum Area {
    Box {
        world: Option<String>,
        min: [f64; 3],
        max: [f64; 3],
    },
    Sphere {
        world: Option<String>,
        center: [f64; 3],
        radius: f64,
    },
    Points(Vec<BlockPoint>),
    Unrecognized {
        source: String,
        message: String,
    },
}

impl Area {
    /// Parse an area condition.
    ///
    /// `no_world` declares box and sphere areas world-agnostic, in which case
    /// their world token must be left out.
    pub fn parse(source: &str, no_world: bool) -> Self {
        let parsed = if source.contains('>') {
            parse_box(source, no_world)
        } else if source.contains('~') {
            parse_sphere(source, no_world)
        } else {
            parse_points(source)
        };

        parsed.unwrap_or_else(|e| Area::Unrecognized {
            source: source.to_string(),
            message: e.to_string(),
        })
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Area::Unrecognized { .. })
    }

    /// Check whether a position lies inside this area
    pub fn contains(&self, position: &Position) -> bool {
        match self {
            Area::Box { world, min, max } => {
                world_matches(world.as_deref(), &position.world)
                    && position
                        .coords()
                        .iter()
                        .enumerate()
                        .all(|(axis, v)| *v >= min[axis] && *v <= max[axis])
            }
            Area::Sphere {
                world,
                center,
                radius,
            } => {
                let distance_sq: f64 = position
                    .coords()
                    .iter()
                    .zip(center)
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                world_matches(world.as_deref(), &position.world)
                    && *radius >= 0.0
                    && distance_sq <= radius * radius
            }
            Area::Points(points) => {
                let (x, y, z) = position.block();
                points.iter().any(|p| {
                    world_matches(p.world.as_deref(), &position.world)
                        && p.x == x
                        && p.y == y
                        && p.z == z
                })
            }
            Area::Unrecognized { source, message } => {
                warn!("Unrecognized area format: {} ({})", source, message);
                false
            }
        }
    }
}

fn world_matches(expected: Option<&str>, actual: &str) -> bool {
    expected.is_none_or(|w| w == actual)
}

fn number(token: &str) -> Result<f64, AreaError> {
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AreaError::Number(token.to_string()))
}

fn triple(tokens: &[&str]) -> Result<[f64; 3], AreaError> {
    Ok([number(tokens[0])?, number(tokens[1])?, number(tokens[2])?])
}

fn split_world<'a>(
    source: &'a str,
    no_world: bool,
    body_len: usize,
) -> Result<(Option<String>, Vec<&'a str>), AreaError> {
    let tokens: Vec<&str> = source.split_whitespace().collect();
    let offset = usize::from(!no_world);
    if tokens.len() != offset + body_len {
        return Err(AreaError::TokenCount {
            expected: offset + body_len,
            found: tokens.len(),
        });
    }
    let world = (!no_world).then(|| tokens[0].to_string());
    Ok((world, tokens[offset..].to_vec()))
}

fn parse_box(source: &str, no_world: bool) -> Result<Area, AreaError> {
    let (world, body) = split_world(source, no_world, 7)?;
    if body[3] != ">" {
        return Err(AreaError::Separator(">"));
    }
    let a = triple(&body[0..3])?;
    let b = triple(&body[4..7])?;

    Ok(Area::Box {
        world,
        min: [a[0].min(b[0]), a[1].min(b[1]), a[2].min(b[2])],
        max: [a[0].max(b[0]), a[1].max(b[1]), a[2].max(b[2])],
    })
}

fn parse_sphere(source: &str, no_world: bool) -> Result<Area, AreaError> {
    let (world, body) = split_world(source, no_world, 5)?;
    if body[3] != "~" {
        return Err(AreaError::Separator("~"));
    }

    Ok(Area::Sphere {
        world,
        center: triple(&body[0..3])?,
        radius: number(body[4])?,
    })
}

fn parse_points(source: &str) -> Result<Area, AreaError> {
    let points = source
        .split('&')
        .map(|clause| {
            let tokens: Vec<&str> = clause.split_whitespace().collect();
            let (world, coords) = match tokens.len() {
                3 => (None, triple(&tokens)?),
                4 => (Some(tokens[0].to_string()), triple(&tokens[1..])?),
                _ => return Err(AreaError::Clause(clause.trim().to_string())),
            };
            Ok(BlockPoint {
                world,
                x: coords[0].floor() as i64,
                y: coords[1].floor() as i64,
                z: coords[2].floor() as i64,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Area::Points(points))
}
