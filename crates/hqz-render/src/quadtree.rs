use crate::geometry::{object_bounds, Hit, SceneGeometry};
use crate::math::{Aabb, Ray};
use crate::sampler::Sampler;
use hqz_model::Object;

const LEAF_SIZE: usize = 4;
const MAX_DEPTH: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

#[derive(Debug)]
struct Node {
    bounds: Aabb,
    objects: Vec<usize>,
    split: Option<(Axis, Box<[Node; 2]>)>,
}

impl Node {
    fn leaf(bounds: Aabb, objects: Vec<usize>) -> Self {
        Self {
            bounds,
            objects,
            split: None,
        }
    }

    fn build(bounds: Aabb, objects: Vec<usize>, object_bounds: &[Aabb], depth: u32) -> Self {
        if objects.len() <= LEAF_SIZE || depth >= MAX_DEPTH {
            return Self::leaf(bounds, objects);
        }

        let axis = if bounds.width() >= bounds.height() {
            Axis::X
        } else {
            Axis::Y
        };
        let (first_box, second_box) = halve(&bounds, axis);

        let first: Vec<usize> = objects
            .iter()
            .copied()
            .filter(|&i| object_bounds[i].overlaps(&first_box))
            .collect();
        let second: Vec<usize> = objects
            .iter()
            .copied()
            .filter(|&i| object_bounds[i].overlaps(&second_box))
            .collect();

        // Splitting only helps if it separates something.
        if first.len() == objects.len() && second.len() == objects.len() {
            return Self::leaf(bounds, objects);
        }

        let children = Box::new([
            Node::build(first_box, first, object_bounds, depth + 1),
            Node::build(second_box, second, object_bounds, depth + 1),
        ]);

        Self {
            bounds,
            objects: Vec::new(),
            split: Some((axis, children)),
        }
    }

    fn intersect(
        &self,
        ray: &Ray,
        geometry: &mut SceneGeometry<'_>,
        sampler: &mut Sampler,
        closest: &mut Option<Hit>,
    ) {
        let t_max = closest.map_or(f64::INFINITY, |hit| hit.distance);
        if !self.bounds.hit(ray, 0.0, t_max) {
            return;
        }

        for &index in &self.objects {
            if let Some(hit) = geometry.intersect(index, ray, sampler) {
                keep_closest(closest, hit);
            }
        }

        if let Some((axis, children)) = &self.split {
            let towards_second = match axis {
                Axis::X => ray.direction.x >= 0.0,
                Axis::Y => ray.direction.y >= 0.0,
            };
            let (near, far) = if towards_second {
                (&children[0], &children[1])
            } else {
                (&children[1], &children[0])
            };
            near.intersect(ray, geometry, sampler, closest);
            far.intersect(ray, geometry, sampler, closest);
        }
    }

    fn visit<F: FnMut(&Aabb, u32)>(&self, depth: u32, f: &mut F) {
        f(&self.bounds, depth);
        if let Some((_, children)) = &self.split {
            children[0].visit(depth + 1, f);
            children[1].visit(depth + 1, f);
        }
    }

    fn count(&self) -> (usize, usize) {
        match &self.split {
            None => (1, 1),
            Some((_, children)) => {
                let (a_nodes, a_leaves) = children[0].count();
                let (b_nodes, b_leaves) = children[1].count();
                (1 + a_nodes + b_nodes, a_leaves + b_leaves)
            }
        }
    }
}

fn halve(bounds: &Aabb, axis: Axis) -> (Aabb, Aabb) {
    match axis {
        Axis::X => {
            let mid = 0.5 * (bounds.left + bounds.right);
            (
                Aabb::new(bounds.left, bounds.top, mid, bounds.bottom),
                Aabb::new(mid, bounds.top, bounds.right, bounds.bottom),
            )
        }
        Axis::Y => {
            let mid = 0.5 * (bounds.top + bounds.bottom);
            (
                Aabb::new(bounds.left, bounds.top, bounds.right, mid),
                Aabb::new(bounds.left, mid, bounds.right, bounds.bottom),
            )
        }
    }
}

/// Closest wins; equal distances go to the lower object index so the
/// result never depends on traversal order.
fn keep_closest(closest: &mut Option<Hit>, hit: Hit) {
    let better = match closest {
        None => true,
        Some(current) => {
            hit.distance < current.distance
                || (hit.distance == current.distance && hit.object < current.object)
        }
    };
    if better {
        *closest = Some(hit);
    }
}

/// Spatial index over the static bounds of every scene object.
///
/// Built once per render and read-only afterwards. Objects whose bounds are
/// not finite cannot be placed in the tree and are tested on every query.
#[derive(Debug)]
pub struct Quadtree {
    root: Option<Node>,
    unbounded: Vec<usize>,
}

impl Quadtree {
    pub fn build(objects: &[Object]) -> Self {
        let bounds: Vec<Aabb> = objects.iter().map(object_bounds).collect();
        Self::from_bounds(&bounds)
    }

    pub fn from_bounds(object_bounds: &[Aabb]) -> Self {
        let mut placed = Vec::new();
        let mut unbounded = Vec::new();
        let mut root_box = Aabb::empty();

        for (index, bounds) in object_bounds.iter().enumerate() {
            let finite = [bounds.left, bounds.top, bounds.right, bounds.bottom]
                .iter()
                .all(|v| v.is_finite());
            if finite {
                root_box = root_box.union(*bounds);
                placed.push(index);
            } else {
                unbounded.push(index);
            }
        }

        let root = if placed.is_empty() {
            None
        } else {
            Some(Node::build(root_box, placed, object_bounds, 0))
        };

        let tree = Self { root, unbounded };
        let (nodes, leaves) = tree.node_count();
        log::debug!(
            "quadtree: {} objects, {} nodes, {} leaves, {} unbounded",
            object_bounds.len(),
            nodes,
            leaves,
            tree.unbounded.len()
        );
        tree
    }

    /// Nearest hit along `ray` against this ray's sampled geometry.
    pub fn intersect(
        &self,
        ray: &Ray,
        geometry: &mut SceneGeometry<'_>,
        sampler: &mut Sampler,
    ) -> Option<Hit> {
        let mut closest = None;
        if let Some(root) = &self.root {
            root.intersect(ray, geometry, sampler, &mut closest);
        }
        for &index in &self.unbounded {
            if let Some(hit) = geometry.intersect(index, ray, sampler) {
                keep_closest(&mut closest, hit);
            }
        }
        closest
    }

    /// Walk every node box depth-first, first child before second.
    pub fn visit<F: FnMut(&Aabb, u32)>(&self, mut f: F) {
        if let Some(root) = &self.root {
            root.visit(0, &mut f);
        }
    }

    /// Total nodes and leaves.
    pub fn node_count(&self) -> (usize, usize) {
        self.root.as_ref().map_or((0, 0), Node::count)
    }

    pub fn bounds(&self) -> Option<Aabb> {
        self.root.as_ref().map(|root| root.bounds)
    }
}

/// Reference nearest-hit query that tests every object.
pub fn brute_force_intersect(
    ray: &Ray,
    geometry: &mut SceneGeometry<'_>,
    sampler: &mut Sampler,
) -> Option<Hit> {
    let mut closest = None;
    for index in 0..geometry.len() {
        if let Some(hit) = geometry.intersect(index, ray, sampler) {
            keep_closest(&mut closest, hit);
        }
    }
    closest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_never_hits() {
        let tree = Quadtree::build(&[]);
        let objects: Vec<Object> = Vec::new();
        let mut geometry = SceneGeometry::new(&objects);
        let mut sampler = Sampler::new(0);
        let ray = Ray::from_angle(crate::math::Vec2::zero(), 0.0);
        assert!(tree.intersect(&ray, &mut geometry, &mut sampler).is_none());
        assert_eq!(tree.node_count(), (0, 0));
    }

    #[test]
    fn node_boxes_contain_their_children() {
        let bounds: Vec<Aabb> = (0..40)
            .map(|i| {
                let x = (i % 8) as f64 * 10.0;
                let y = (i / 8) as f64 * 10.0;
                Aabb::new(x, y, x + 4.0, y + 3.0)
            })
            .collect();
        let tree = Quadtree::from_bounds(&bounds);
        assert!(tree.node_count().0 > 1);

        let mut stack: Vec<(Aabb, u32)> = Vec::new();
        tree.visit(|b, depth| {
            while let Some(&(_, d)) = stack.last() {
                if d >= depth {
                    stack.pop();
                } else {
                    break;
                }
            }
            if let Some(&(parent, _)) = stack.last() {
                assert!(parent.contains(b));
            }
            stack.push((*b, depth));
        });
    }

    #[test]
    fn visit_is_first_then_second() {
        let bounds = vec![
            Aabb::new(0.0, 0.0, 1.0, 1.0),
            Aabb::new(2.0, 0.0, 3.0, 1.0),
            Aabb::new(4.0, 0.0, 5.0, 1.0),
            Aabb::new(6.0, 0.0, 7.0, 1.0),
            Aabb::new(8.0, 0.0, 9.0, 1.0),
        ];
        let tree = Quadtree::from_bounds(&bounds);
        let mut seen = Vec::new();
        tree.visit(|b, depth| seen.push((b.left, depth)));
        assert_eq!(seen[0], (0.0, 0));
        assert_eq!(seen[1], (0.0, 1));
        assert!(seen.iter().any(|&(left, depth)| left == 4.5 && depth == 1));
    }
}
