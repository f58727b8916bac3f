use serde::{Deserialize, Serialize};

/// Normalized rectangle on a page. Coordinates are fractions of the page
/// size with the origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BBox {
    /// Builds a box from normalized inputs, clamping the origin into `[0,1]`
    /// and negative or non-finite sizes to zero.
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        let x = clamp_unit(x);
        let y = clamp_unit(y);
        let w = clamp_size(w).min(1.0 - x);
        let h = clamp_size(h).min(1.0 - y);
        Self { x, y, w, h }
    }

    #[inline]
    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    /// Smallest box covering both `self` and `other`.
    pub fn union(&self, other: &BBox) -> BBox {
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        BBox {
            x: x0,
            y: y0,
            w: x1 - x0,
            h: y1 - y0,
        }
    }

    /// Union over an iterator of boxes; `None` when the iterator is empty.
    pub fn union_all<'a, I>(boxes: I) -> Option<BBox>
    where
        I: IntoIterator<Item = &'a BBox>,
    {
        boxes.into_iter().fold(None, |acc, b| match acc {
            Some(u) => Some(b.union(&u)),
            None => Some(*b),
        })
    }

    pub fn contains(&self, other: &BBox) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right() + f32::EPSILON
            && other.bottom() <= self.bottom() + f32::EPSILON
    }
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn clamp_size(v: f32) -> f32 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}
