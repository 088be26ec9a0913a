//! Derived geometry: bounding boxes and control handles.
//!
//! Nothing here is replicated. Peers recompute it from the synced fields
//! after every patch.

use crate::object::{ObjectProps, Shape};
use crate::{Point, Rect};

/// Handle order in [`DerivedGeometry::handles`].
pub const HANDLE_NAMES: [&str; 8] = ["tl", "tr", "br", "bl", "mt", "mr", "mb", "ml"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedGeometry {
    /// Axis-aligned bounds in scene coordinates, after scale and rotation.
    pub bounds: Rect,
    /// Corner and edge-midpoint handles, see [`HANDLE_NAMES`].
    pub handles: [Point; 8],
}

/// Unscaled size of the shape in its own coordinate space.
fn local_size(shape: &Shape) -> (f64, f64) {
    match shape {
        Shape::Rectangle(r) => (r.width, r.height),
        Shape::Ellipse(e) => (e.rx * 2.0, e.ry * 2.0),
        Shape::Path(p) => {
            let points: Vec<Point> = p
                .path
                .iter()
                .flat_map(|cmd| cmd.points())
                .map(|(x, y)| Point::new(x, y))
                .collect();
            Rect::enclosing(&points)
                .map(|r| (r.width, r.height))
                .unwrap_or((0.0, 0.0))
        }
        Shape::Text(t) => {
            let lines = t.text.lines().count().max(1) as f64;
            (t.width, t.font_size * t.line_height * lines)
        }
        Shape::Image(i) => (i.width, i.height),
        Shape::Group(g) => (g.width, g.height),
    }
}

pub fn compute(props: &ObjectProps) -> DerivedGeometry {
    let (w, h) = local_size(&props.shape);
    let sw = w * props.base.scale_x;
    let sh = h * props.base.scale_y;

    let local = [
        Point::new(0.0, 0.0),
        Point::new(sw, 0.0),
        Point::new(sw, sh),
        Point::new(0.0, sh),
        Point::new(sw / 2.0, 0.0),
        Point::new(sw, sh / 2.0),
        Point::new(sw / 2.0, sh),
        Point::new(0.0, sh / 2.0),
    ];

    let origin = Point::new(props.base.left, props.base.top);
    let radians = props.base.angle.to_radians();
    let handles = local.map(|p| p.rotated(radians).offset(origin));
    let bounds = Rect::enclosing(&handles[..4]).unwrap_or_default();

    DerivedGeometry { bounds, handles }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{DrawableObject, PathCommand};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_unrotated_rectangle_bounds() {
        let rect = DrawableObject::rectangle(10.0, 20.0, 100.0, 50.0);
        let g = rect.geometry();
        assert_eq!(g.bounds, Rect { x: 10.0, y: 20.0, width: 100.0, height: 50.0 });
        assert_eq!(g.handles[2], Point::new(110.0, 70.0));
        assert_eq!(g.handles[4], Point::new(60.0, 20.0));
    }

    #[test]
    fn test_scale_applies_to_bounds() {
        let mut props = DrawableObject::ellipse(0.0, 0.0, 10.0, 5.0).serialize();
        props.base.scale_x = 2.0;
        let g = compute(&props);
        assert!(close(g.bounds.width, 40.0));
        assert!(close(g.bounds.height, 10.0));
    }

    #[test]
    fn test_rotation_about_origin() {
        let mut props = DrawableObject::rectangle(0.0, 0.0, 10.0, 10.0).serialize();
        props.base.angle = 90.0;
        let g = compute(&props);
        assert!(close(g.bounds.x, -10.0));
        assert!(close(g.bounds.width, 10.0));
        assert!(close(g.bounds.height, 10.0));
    }

    #[test]
    fn test_path_extent_from_points() {
        let path = DrawableObject::path(
            5.0,
            5.0,
            vec![
                PathCommand::MoveTo { x: 0.0, y: 0.0 },
                PathCommand::LineTo { x: 30.0, y: 12.0 },
            ],
        );
        let g = path.geometry();
        assert!(close(g.bounds.width, 30.0));
        assert!(close(g.bounds.height, 12.0));
    }

    #[test]
    fn test_empty_path_is_a_point() {
        let path = DrawableObject::path(3.0, 4.0, Vec::new());
        assert_eq!(path.geometry().bounds, Rect { x: 3.0, y: 4.0, width: 0.0, height: 0.0 });
    }
}
