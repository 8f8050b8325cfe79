use glam::Vec2;
use serde::Deserialize;

/// How many nodes an instance gets. Resolved once at start; the count is
/// fixed for the instance's lifetime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeBudget {
    Fixed(usize),
    /// One node per `px_per_node` of viewport area, clamped to keep the
    /// O(n^2) connection pass tractable every frame.
    PerArea {
        px_per_node: f32,
        min: usize,
        max: usize,
    },
}

impl NodeBudget {
    pub fn resolve(&self, area_px: f32) -> usize {
        match *self {
            NodeBudget::Fixed(n) => n,
            NodeBudget::PerArea { px_per_node, min, max } => {
                ((area_px / px_per_node).floor().max(0.0) as usize).clamp(min, max)
            }
        }
    }
}

/// sRGB colors for the three drawn things. Deserializable so the host page
/// can re-theme a running instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Palette {
    pub link: [u8; 3],
    pub node: [u8; 3],
    pub background: [u8; 3],
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            link: [61, 220, 255],
            node: [0, 178, 255],
            background: [10, 15, 28],
        }
    }
}

/// Per-instance parameterization of the particle field.
#[derive(Debug, Clone, Copy)]
pub struct FieldParams {
    pub budget: NodeBudget,
    /// Full span of the initial drift velocity; each axis draws from
    /// +/- drift/2.
    pub drift: f32,
    /// Multiplicative velocity decay per processed frame.
    pub damping: f32,
    /// Links are drawn between pairs closer than this, in logical px.
    pub max_link_dist: f32,
    /// Link alpha at zero distance; fades linearly to zero at max_link_dist.
    pub link_base_alpha: f32,
    pub node_alpha: f32,
    /// Node dot radius in logical px.
    pub node_radius: f32,
    /// Pointer attraction gain per axis per frame. Continuous and uncapped:
    /// there is deliberately no distance falloff.
    pub pointer_gain: Option<f32>,
    pub palette: Palette,
}

impl FieldParams {
    /// The full-page background field.
    pub fn backdrop() -> Self {
        Self {
            budget: NodeBudget::PerArea {
                px_per_node: 45_000.0,
                min: 36,
                max: 56,
            },
            drift: 0.025,
            damping: 0.995,
            max_link_dist: 140.0,
            link_base_alpha: 0.12,
            node_alpha: 0.8,
            node_radius: 1.2,
            pointer_gain: Some(0.00035),
            palette: Palette::default(),
        }
    }

    /// The small field anchored behind the portrait image. Denser links,
    /// slower drift, no pointer coupling.
    pub fn portrait() -> Self {
        Self {
            budget: NodeBudget::Fixed(36),
            drift: 0.02,
            damping: 0.996,
            max_link_dist: 90.0,
            link_base_alpha: 0.18,
            node_alpha: 0.9,
            node_radius: 1.2,
            pointer_gain: None,
            palette: Palette::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_budget_clamps_small_viewports_to_floor() {
        let budget = FieldParams::backdrop().budget;
        // floor(1280*800 / 45000) = 22, clamped up to 36.
        assert_eq!(budget.resolve(1280.0 * 800.0), 36);
        assert_eq!(budget.resolve(0.0), 36);
    }

    #[test]
    fn area_budget_scales_then_saturates() {
        let budget = FieldParams::backdrop().budget;
        assert_eq!(budget.resolve(50.0 * 45_000.0), 50);
        assert_eq!(budget.resolve(1e9), 56);
    }

    #[test]
    fn fixed_budget_ignores_area() {
        assert_eq!(FieldParams::portrait().budget.resolve(1e9), 36);
    }

    #[test]
    fn palette_deserializes_from_host_json() {
        let palette: Palette =
            serde_json::from_str(r#"{"link":[255,255,255],"node":[0,0,0],"background":[10,15,28]}"#)
                .unwrap();
        assert_eq!(palette.link, [255, 255, 255]);
        assert_eq!(palette.background, Palette::default().background);
    }
}
