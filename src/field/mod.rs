//! The particle field: a fixed set of drifting nodes plus the distance-based
//! link pass. Everything here is display-independent; positions are
//! normalized and only scaled to logical pixels at the edges, so the whole
//! module runs deterministically under a seeded RNG with no surface attached.

pub mod node;
pub mod pacing;
pub mod params;

use glam::Vec2;
use rand::Rng;

use node::Node;
use params::{FieldParams, Palette};

/// One link to draw: endpoints in logical px and the faded alpha.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkSegment {
    pub a: Vec2,
    pub b: Vec2,
    pub alpha: f32,
}

pub struct ParticleField {
    params: FieldParams,
    nodes: Vec<Node>,
}

impl ParticleField {
    /// Generate a field sized for the given viewport area. The node count is
    /// fixed from here on.
    pub fn generate<R: Rng>(params: FieldParams, viewport_area: f32, rng: &mut R) -> Self {
        let count = params.budget.resolve(viewport_area);
        let nodes = (0..count).map(|_| Node::generate(rng, params.drift)).collect();
        Self { params, nodes }
    }

    pub fn params(&self) -> &FieldParams {
        &self.params
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn set_palette(&mut self, palette: Palette) {
        self.params.palette = palette;
    }

    /// Update pass, in index order: drift, damping, elastic boundary
    /// reflection, then pointer attraction.
    ///
    /// The reflection inverts the velocity sign without clamping position, so
    /// a node may sit slightly out of bounds for a frame before the inverted
    /// velocity carries it back. `pointer` is in logical px; the most recent
    /// pointer event wins for the frame.
    pub fn step(&mut self, logical_size: Vec2, pointer: Option<Vec2>) {
        let damping = self.params.damping;
        let attraction = match self.params.pointer_gain {
            Some(gain) => pointer.map(|p| (p, gain)),
            None => None,
        };

        for n in &mut self.nodes {
            n.pos += n.vel;
            n.vel *= damping;
            if n.pos.x < 0.0 || n.pos.x > 1.0 {
                n.vel.x = -n.vel.x;
            }
            if n.pos.y < 0.0 || n.pos.y > 1.0 {
                n.vel.y = -n.vel.y;
            }
            if let Some((p, gain)) = attraction {
                let delta = p - n.pos * logical_size;
                n.vel += delta / logical_size * gain;
            }
        }
    }

    /// Connection pass over unordered pairs (i < j). Emits a segment for
    /// every pair closer than `max_link_dist`, alpha fading linearly with
    /// distance. O(n^2), kept tractable by the node budget.
    pub fn links(&self, logical_size: Vec2, out: &mut Vec<LinkSegment>) {
        out.clear();
        let max_dist = self.params.max_link_dist;
        let base_alpha = self.params.link_base_alpha;
        for i in 0..self.nodes.len() {
            let a = self.nodes[i].pos * logical_size;
            for j in (i + 1)..self.nodes.len() {
                let b = self.nodes[j].pos * logical_size;
                let dist = a.distance(b);
                if dist < max_dist {
                    out.push(LinkSegment {
                        a,
                        b,
                        alpha: base_alpha * (1.0 - dist / max_dist),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const SIZE: Vec2 = Vec2::new(1000.0, 1000.0);

    fn field_with(params: FieldParams, nodes: Vec<Node>) -> ParticleField {
        ParticleField { params, nodes }
    }

    fn still_node(x: f32, y: f32) -> Node {
        Node {
            pos: Vec2::new(x, y),
            vel: Vec2::ZERO,
        }
    }

    #[test]
    fn generate_respects_budget_and_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let field = ParticleField::generate(FieldParams::backdrop(), 1280.0 * 800.0, &mut rng);
        assert_eq!(field.len(), 36);
        for node in field.nodes() {
            assert!((0.0..=1.0).contains(&node.pos.x));
            assert!((0.0..=1.0).contains(&node.pos.y));
        }
    }

    #[test]
    fn boundary_crossing_flips_velocity_once() {
        let mut field = field_with(
            FieldParams::portrait(),
            vec![Node {
                pos: Vec2::new(0.999, 0.5),
                vel: Vec2::new(0.01, 0.0),
            }],
        );

        field.step(SIZE, None);
        let after_crossing = field.nodes()[0];
        assert!(after_crossing.pos.x > 1.0, "overshoots before correction");
        assert!(after_crossing.vel.x < 0.0, "x velocity inverted");

        // The inverted velocity carries it back inside; no second flip.
        field.step(SIZE, None);
        assert!(field.nodes()[0].pos.x <= 1.0);
        assert!(field.nodes()[0].vel.x < 0.0);
    }

    #[test]
    fn damping_never_increases_speed() {
        let mut field = field_with(
            FieldParams::backdrop(),
            vec![Node {
                pos: Vec2::new(0.5, 0.5),
                vel: Vec2::new(0.01, -0.008),
            }],
        );

        let mut previous = field.nodes()[0].vel.length();
        for _ in 0..50 {
            field.step(SIZE, None);
            let speed = field.nodes()[0].vel.length();
            assert!(speed <= previous);
            previous = speed;
        }
    }

    #[test]
    fn links_cut_off_at_max_distance() {
        // 80px apart: linked. 800px apart: not.
        let near = field_with(
            FieldParams::backdrop(),
            vec![still_node(0.10, 0.5), still_node(0.18, 0.5)],
        );
        let mut out = Vec::new();
        near.links(SIZE, &mut out);
        assert_eq!(out.len(), 1);

        let far = field_with(
            FieldParams::backdrop(),
            vec![still_node(0.1, 0.5), still_node(0.9, 0.5)],
        );
        far.links(SIZE, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn link_alpha_fades_with_distance() {
        let params = FieldParams::backdrop();
        // Coincident pair carries the full base alpha.
        let coincident = field_with(params, vec![still_node(0.3, 0.3), still_node(0.3, 0.3)]);
        let mut out = Vec::new();
        coincident.links(SIZE, &mut out);
        assert!((out[0].alpha - params.link_base_alpha).abs() < 1e-6);

        // 50px < 100px: the closer pair is the more opaque one.
        let spread = field_with(
            params,
            vec![
                still_node(0.0, 0.0),
                still_node(0.05, 0.0),
                still_node(0.15, 0.0),
            ],
        );
        spread.links(SIZE, &mut out);
        assert_eq!(out.len(), 2);
        assert!(out[0].alpha > out[1].alpha);
        for segment in &out {
            assert!(segment.alpha > 0.0 && segment.alpha < params.link_base_alpha);
        }
    }

    #[test]
    fn pointer_pulls_corner_node_toward_center() {
        let mut field = field_with(FieldParams::backdrop(), vec![still_node(0.05, 0.05)]);
        let center = SIZE * 0.5;

        field.step(SIZE, Some(center));
        let early_vel = field.nodes()[0].vel;
        assert!(early_vel.x > 0.0);
        assert!(early_vel.y > 0.0);

        // Few enough steps that the node is still short of the pointer, so
        // the pull keeps compounding. Verified by sign and trend, not
        // magnitude.
        for _ in 0..30 {
            field.step(SIZE, Some(center));
        }
        let node = field.nodes()[0];
        assert!(node.vel.x > early_vel.x);
        assert!(node.vel.y > early_vel.y);
        assert!(node.pos.x > 0.05);
        assert!(node.pos.y > 0.05);
        assert!(node.pos.x < 0.5, "still approaching, not past the pointer");
    }

    #[test]
    fn portrait_field_ignores_the_pointer() {
        let mut field = field_with(FieldParams::portrait(), vec![still_node(0.05, 0.05)]);
        field.step(SIZE, Some(SIZE * 0.5));
        assert_eq!(field.nodes()[0].vel, Vec2::ZERO);
    }

    #[test]
    fn resize_only_rescales_link_geometry() {
        // Same normalized state, different logical size: node state is
        // untouched, only the pixel mapping changes.
        let field = field_with(
            FieldParams::portrait(),
            vec![still_node(0.2, 0.5), still_node(0.25, 0.5)],
        );
        let mut small = Vec::new();
        let mut large = Vec::new();
        field.links(Vec2::new(400.0, 400.0), &mut small);
        field.links(Vec2::new(800.0, 800.0), &mut large);
        assert_eq!(small.len(), 1);
        assert_eq!(large.len(), 1);
        assert!(large[0].a.distance(large[0].b) > small[0].a.distance(small[0].b));
        assert!(small[0].alpha > large[0].alpha);
    }
}
