use glam::Vec2;
use rand::Rng;

/// A single drifting point. Position is normalized to [0,1] per axis of the
/// logical canvas, velocity is in normalized units per processed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub pos: Vec2,
    pub vel: Vec2,
}

impl Node {
    /// Uniform random position, drift velocity uniform in +/- drift/2 per axis.
    pub fn generate<R: Rng>(rng: &mut R, drift: f32) -> Self {
        Self {
            pos: Vec2::new(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)),
            vel: Vec2::new(
                rng.gen_range(-0.5..0.5) * drift,
                rng.gen_range(-0.5..0.5) * drift,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn generated_nodes_start_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let node = Node::generate(&mut rng, 0.025);
            assert!((0.0..=1.0).contains(&node.pos.x));
            assert!((0.0..=1.0).contains(&node.pos.y));
            assert!(node.vel.x.abs() <= 0.0125);
            assert!(node.vel.y.abs() <= 0.0125);
        }
    }
}
