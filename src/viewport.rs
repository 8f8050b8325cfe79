// src/viewport.rs
// Logical-size bookkeeping and the logical-px -> NDC projection.
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2};

/// Device pixel ratios above this are not worth the fill cost for a
/// decorative layer.
pub const DPR_CAP: f32 = 1.5;

// Uniform data shared by both pipelines.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct ViewportUniform {
    pub view_proj: [[f32; 4]; 4],
    pub needs_srgb_output_conversion: u32, // 0 for false, 1 for true
    pub _padding: [u32; 3],                // pad to a 16-byte boundary (80 bytes total)
}

/// How an instance derives its logical size from the box it is handed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizePolicy {
    /// Logical size is the client box itself (backdrop).
    Window,
    /// Logical size is the parent box plus a fixed margin per axis, floored
    /// so layout hiccups never leave a degenerate canvas (portrait).
    ParentBox { pad: f32, min: Vec2 },
}

impl SizePolicy {
    pub fn portrait() -> Self {
        SizePolicy::ParentBox {
            pad: 28.0,
            min: Vec2::new(240.0, 320.0),
        }
    }

    pub fn apply(&self, box_size: Vec2) -> Vec2 {
        match *self {
            SizePolicy::Window => box_size,
            SizePolicy::ParentBox { pad, min } => Vec2::new(
                (box_size.x + pad).max(min.x),
                (box_size.y + pad).max(min.y),
            ),
        }
    }
}

/// Tracks logical (CSS-px) size and the capped backing resolution.
///
/// Node positions are stored normalized, so a resize only changes this pixel
/// mapping, never the simulation state.
#[derive(Debug)]
pub struct Viewport {
    policy: SizePolicy,
    logical: Vec2,
    scale_factor: f32,
}

impl Viewport {
    pub fn new(policy: SizePolicy, scale_factor: f64) -> Self {
        Self {
            policy,
            logical: Vec2::ONE,
            scale_factor: sanitize_scale(scale_factor),
        }
    }

    /// Recompute the logical size from a freshly measured box.
    pub fn resize_to_box(&mut self, box_size: Vec2) {
        self.logical = self.policy.apply(box_size).max(Vec2::ONE);
    }

    pub fn set_scale_factor(&mut self, scale_factor: f64) {
        self.scale_factor = sanitize_scale(scale_factor);
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    pub fn logical_size(&self) -> Vec2 {
        self.logical
    }

    pub fn area(&self) -> f32 {
        self.logical.x * self.logical.y
    }

    /// Backing resolution: logical size times the capped device pixel ratio.
    pub fn backing_size(&self) -> (u32, u32) {
        let scale = self.scale_factor.min(DPR_CAP);
        (
            ((self.logical.x * scale).floor() as u32).max(1),
            ((self.logical.y * scale).floor() as u32).max(1),
        )
    }

    /// Orthographic projection from logical px (origin top-left, y down) to
    /// NDC. Must be rebuilt after every resize: a backing change invalidates
    /// the previous transform.
    pub fn build_projection(&self) -> Mat4 {
        Mat4::orthographic_rh(0.0, self.logical.x, self.logical.y, 0.0, -1.0, 1.0)
    }
}

fn sanitize_scale(scale_factor: f64) -> f32 {
    let sf = scale_factor as f32;
    if sf.is_finite() && sf > 0.0 { sf } else { 1.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn backing_resolution_caps_device_pixel_ratio() {
        let mut viewport = Viewport::new(SizePolicy::Window, 2.0);
        viewport.resize_to_box(Vec2::new(800.0, 600.0));
        // DPR 2.0 is capped at 1.5.
        assert_eq!(viewport.backing_size(), (1200, 900));

        viewport.set_scale_factor(1.0);
        assert_eq!(viewport.backing_size(), (800, 600));
    }

    #[test]
    fn portrait_policy_pads_and_floors() {
        let mut viewport = Viewport::new(SizePolicy::portrait(), 1.0);
        viewport.resize_to_box(Vec2::new(300.0, 400.0));
        assert_eq!(viewport.logical_size(), Vec2::new(328.0, 428.0));

        // A collapsed parent box still yields the minimum canvas.
        viewport.resize_to_box(Vec2::ZERO);
        assert_eq!(viewport.logical_size(), Vec2::new(240.0, 320.0));
    }

    #[test]
    fn projection_maps_logical_corners_to_ndc() {
        let mut viewport = Viewport::new(SizePolicy::Window, 1.0);
        viewport.resize_to_box(Vec2::new(640.0, 480.0));
        let proj = viewport.build_projection();

        let top_left = proj.project_point3(Vec3::ZERO);
        assert!((top_left.x - -1.0).abs() < 1e-6);
        assert!((top_left.y - 1.0).abs() < 1e-6);

        let bottom_right = proj.project_point3(Vec3::new(640.0, 480.0, 0.0));
        assert!((bottom_right.x - 1.0).abs() < 1e-6);
        assert!((bottom_right.y - -1.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_scale_factor_falls_back_to_one() {
        let viewport = Viewport::new(SizePolicy::Window, 0.0);
        assert_eq!(viewport.scale_factor(), 1.0);
    }
}
