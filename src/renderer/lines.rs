//! Debug line primitives

use std::f32::consts::TAU;

use glam::{Vec2, Vec3, Vec4};

use crate::backend::RhiResult;
use crate::rhi::{RhiContext, VertexBuffer, VertexPosCol};
use crate::scene::BoundingBox;

const INITIAL_CAPACITY: u32 = 4096;

#[derive(Debug, Clone, Copy)]
struct Line {
    from: VertexPosCol,
    to: VertexPosCol,
    /// Seconds left; zero lasts a single frame
    remaining: f32,
}

/// Lines accumulated during a frame, with and without depth testing
pub struct LineRenderer {
    depth: Vec<Line>,
    no_depth: Vec<Line>,
    vertices: Vec<VertexPosCol>,
    buffer: VertexBuffer,
}

impl LineRenderer {
    pub fn new(ctx: &RhiContext) -> RhiResult<Self> {
        Ok(Self {
            depth: Vec::new(),
            no_depth: Vec::new(),
            vertices: Vec::new(),
            buffer: VertexBuffer::new_dynamic::<VertexPosCol>(ctx, "lines_vertices", INITIAL_CAPACITY)?,
        })
    }

    pub fn draw_line(
        &mut self,
        from: Vec3,
        to: Vec3,
        color_from: Vec4,
        color_to: Vec4,
        duration: f32,
        depth: bool,
    ) {
        let line = Line {
            from: VertexPosCol::new(from, color_from),
            to: VertexPosCol::new(to, color_to),
            remaining: duration.max(0.0),
        };
        if depth {
            self.depth.push(line);
        } else {
            self.no_depth.push(line);
        }
    }

    pub fn draw_triangle(&mut self, v0: Vec3, v1: Vec3, v2: Vec3, color: Vec4, duration: f32, depth: bool) {
        self.draw_line(v0, v1, color, color, duration, depth);
        self.draw_line(v1, v2, color, color, duration, depth);
        self.draw_line(v2, v0, color, color, duration, depth);
    }

    pub fn draw_box(&mut self, aabb: &BoundingBox, color: Vec4, duration: f32, depth: bool) {
        let (min, max) = (aabb.min, aabb.max);
        let corner = |x: bool, y: bool, z: bool| {
            Vec3::new(
                if x { max.x } else { min.x },
                if y { max.y } else { min.y },
                if z { max.z } else { min.z },
            )
        };

        for a in [false, true] {
            for b in [false, true] {
                self.draw_line(corner(false, a, b), corner(true, a, b), color, color, duration, depth);
                self.draw_line(corner(a, false, b), corner(a, true, b), color, color, duration, depth);
                self.draw_line(corner(a, b, false), corner(a, b, true), color, color, duration, depth);
            }
        }
    }

    pub fn draw_circle(
        &mut self,
        center: Vec3,
        axis: Vec3,
        radius: f32,
        segments: u32,
        color: Vec4,
        duration: f32,
        depth: bool,
    ) {
        let segments = segments.max(3);
        let (u, v) = axis.normalize_or_zero().any_orthonormal_pair();
        let point = |i: u32| {
            let angle = TAU * i as f32 / segments as f32;
            center + (u * angle.cos() + v * angle.sin()) * radius
        };
        for i in 0..segments {
            self.draw_line(point(i), point(i + 1), color, color, duration, depth);
        }
    }

    /// Screen aligned rectangle at depth `z`
    pub fn draw_rectangle(&mut self, min: Vec2, max: Vec2, z: f32, color: Vec4, duration: f32, depth: bool) {
        let corners = [
            Vec3::new(min.x, min.y, z),
            Vec3::new(max.x, min.y, z),
            Vec3::new(max.x, max.y, z),
            Vec3::new(min.x, max.y, z),
        ];
        for i in 0..corners.len() {
            let next = (i + 1) % corners.len();
            self.draw_line(corners[i], corners[next], color, color, duration, depth);
        }
    }

    /// Write this frame's lines into the vertex buffer, depth tested first
    pub fn upload(&mut self, ctx: &RhiContext) -> RhiResult<()> {
        self.vertices.clear();
        for line in self.depth.iter().chain(&self.no_depth) {
            self.vertices.push(line.from);
            self.vertices.push(line.to);
        }
        if self.vertices.is_empty() {
            return Ok(());
        }
        self.buffer.update(ctx, &self.vertices)
    }

    /// Age the lines and drop the expired ones
    pub fn advance(&mut self, delta_time: f32) {
        for lines in [&mut self.depth, &mut self.no_depth] {
            lines.retain_mut(|line| {
                line.remaining -= delta_time;
                line.remaining > 0.0
            });
        }
    }

    pub fn depth_vertex_count(&self) -> u32 {
        self.depth.len() as u32 * 2
    }

    pub fn no_depth_vertex_count(&self) -> u32 {
        self.no_depth.len() as u32 * 2
    }

    pub fn buffer(&self) -> &VertexBuffer {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.depth.is_empty() && self.no_depth.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyDevice;
    use std::sync::Arc;

    fn lines() -> LineRenderer {
        let ctx = RhiContext::new(Arc::new(DummyDevice::new())).unwrap();
        LineRenderer::new(&ctx).unwrap()
    }

    #[test]
    fn test_primitives_split_by_depth() {
        let mut lines = lines();
        lines.draw_box(&BoundingBox::new(Vec3::ZERO, Vec3::ONE), Vec4::ONE, 0.0, true);
        lines.draw_triangle(Vec3::ZERO, Vec3::X, Vec3::Y, Vec4::ONE, 0.0, false);
        assert_eq!(lines.depth_vertex_count(), 24);
        assert_eq!(lines.no_depth_vertex_count(), 6);
    }

    #[test]
    fn test_lines_expire() {
        let mut lines = lines();
        lines.draw_line(Vec3::ZERO, Vec3::X, Vec4::ONE, Vec4::ONE, 0.0, true);
        lines.draw_line(Vec3::ZERO, Vec3::Y, Vec4::ONE, Vec4::ONE, 1.0, true);
        lines.advance(0.5);
        assert_eq!(lines.depth_vertex_count(), 2);
        lines.advance(0.5);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_upload_grows_buffer() {
        let ctx = RhiContext::new(Arc::new(DummyDevice::new())).unwrap();
        let mut lines = LineRenderer::new(&ctx).unwrap();
        for i in 0..INITIAL_CAPACITY {
            let x = i as f32;
            lines.draw_line(Vec3::splat(x), Vec3::splat(x + 1.0), Vec4::ONE, Vec4::ONE, 0.0, false);
        }
        lines.upload(&ctx).unwrap();
        assert!(lines.buffer().capacity() >= INITIAL_CAPACITY * 2);
        assert_eq!(lines.buffer().vertex_count(), INITIAL_CAPACITY * 2);
    }
}
