use crate::block::Block;

/// Padding added to the half-extents on each axis
pub const NEIGHBOR_MARGIN: f64 = 10.0;

/// Padded bounding-box adjacency test
///
/// Two blocks are neighbors when, on both axes, the distance between their
/// centers is strictly below the sum of their half-extents plus
/// [`NEIGHBOR_MARGIN`]. Nearby blocks that do not touch still count.
/// Symmetric; callers never pass the same block twice.
pub fn is_neighbor(a: &Block, b: &Block) -> bool {
    let (ax, ay) = a.center();
    let (bx, by) = b.center();

    (ax - bx).abs() < a.width / 2.0 + b.width / 2.0 + NEIGHBOR_MARGIN
        && (ay - by).abs() < a.height / 2.0 + b.height / 2.0 + NEIGHBOR_MARGIN
}
